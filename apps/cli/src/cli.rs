use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use dbview_export::{export_all_tables, export_table, export_workbook, ExportArtifact, ExportFormat};
use dbview_preview::PreviewBoard;
use dbview_storage::{
    EditOutcome, FsWorkingFileStore, Session, WorkingFileStore, DEFAULT_SAVE_FILE_NAME,
};

use crate::config::Config;
use crate::render;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
    Xlsx,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Xlsx => ExportFormat::Spreadsheet,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dbview",
    about = "View, filter, edit and export the tables of a SQLite file."
)]
pub struct Args {
    /// Config file (default: the platform config directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the working file between invocations.
    #[arg(long, global = true, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    /// Seconds of inactivity after which the working file is discarded.
    #[arg(long, global = true, value_name = "SECS")]
    session_ttl: Option<u64>,

    /// Seconds to wait for each link preview.
    #[arg(long, global = true, value_name = "SECS")]
    preview_timeout: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a database file and make it the working file.
    Open { path: PathBuf },

    /// Show the working file, its modified flag and when it expires.
    Status,

    /// List the user tables.
    Tables,

    /// Print one page of a table.
    View {
        table: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Keep rows where any column contains this text (case-insensitive).
        #[arg(long)]
        filter: Option<String>,
        /// Skip fetching titles and icons for URL cells.
        #[arg(long)]
        no_previews: bool,
    },

    /// Change one cell, addressed by its row number on a page.
    Edit {
        table: String,
        /// Row number as printed by `view` (1-based within the page).
        #[arg(long)]
        row: usize,
        #[arg(long)]
        column: String,
        #[arg(long)]
        value: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        filter: Option<String>,
    },

    /// Drop a table. Asks for confirmation unless `--yes` is given.
    DropTable {
        table: String,
        #[arg(long)]
        yes: bool,
    },

    /// Export one table.
    Export {
        table: String,
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        /// Output file or directory (default: current directory).
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Export every table as a zip archive, or as one workbook.
    ExportAll {
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        /// One sheet per table in a single XLSX instead of a zip.
        #[arg(long, conflicts_with = "format")]
        workbook: bool,
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Write the working database to a file.
    Save { path: Option<PathBuf> },

    /// Forget the working file.
    Discard,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    run_with_io(args, &mut stdin.lock(), &mut stdout.lock(), &mut stderr.lock())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.store_dir {
        config.store_dir = Some(dir.clone());
    }
    if let Some(ttl) = args.session_ttl {
        config.session_ttl_secs = ttl;
    }
    if let Some(timeout) = args.preview_timeout {
        config.preview_timeout_secs = timeout;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn init_logging(level: &str) {
    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

struct Io<'a> {
    input: &'a mut dyn BufRead,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
}

impl Io<'_> {
    fn flush_notifications(&mut self, session: &mut Session) -> Result<()> {
        render::write_notifications(self.err, &session.take_notifications())?;
        Ok(())
    }
}

pub fn run_with_io(
    args: Args,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<()> {
    let config = load_config(&args)?;
    init_logging(&config.log_level);

    let store_dir = config.store_dir()?;
    let store: Arc<dyn WorkingFileStore> =
        Arc::new(FsWorkingFileStore::new(&store_dir).with_ttl(config.session_ttl()));
    log::debug!("working file store at {}", store_dir.display());

    let mut io = Io { input, out, err };

    match args.command {
        Command::Open { path } => open(&mut io, store, &path),
        Command::Status => status(&mut io, store, &config),
        Command::Tables => {
            let mut session = restore(store)?;
            io.flush_notifications(&mut session)?;
            render::write_tables(io.out, session.tables())?;
            Ok(())
        }
        Command::View {
            table,
            page,
            filter,
            no_previews,
        } => {
            let mut session = restore(store)?;
            show(&mut io, &mut session, &table, page, filter)?;
            let Some(view) = session.current_view() else {
                return Ok(());
            };
            render::write_page(io.out, view)?;
            if config.link_previews && !no_previews && view.link_urls().next().is_some() {
                let previews = fetch_previews(&config, view)?;
                render::write_previews(io.out, view, &previews)?;
            }
            Ok(())
        }
        Command::Edit {
            table,
            row,
            column,
            value,
            page,
            filter,
        } => {
            let mut session = restore(store)?;
            show(&mut io, &mut session, &table, page, filter)?;
            let row_idx = row
                .checked_sub(1)
                .ok_or_else(|| anyhow!("rows are numbered from 1"))?;
            let outcome = session.edit_cell(row_idx, &column, &value);
            io.flush_notifications(&mut session)?;
            match outcome.with_context(|| format!("edit {table}.{column} on row {row}"))? {
                EditOutcome::Unchanged => writeln!(io.out, "No change.")?,
                EditOutcome::Updated => {
                    if let Some(view) = session.current_view() {
                        render::write_page(io.out, view)?;
                    }
                }
            }
            Ok(())
        }
        Command::DropTable { table, yes } => {
            let mut session = restore(store)?;
            let input = &mut *io.input;
            let out = &mut *io.out;
            let dropped = session.delete_table(&table, |name| {
                yes || confirm(input, out, &format!("Drop table {name}? [y/N] "))
            });
            io.flush_notifications(&mut session)?;
            if !dropped && session.tables().iter().any(|t| t.name == table) {
                writeln!(io.out, "Table {table} kept.")?;
            }
            Ok(())
        }
        Command::Export { table, format, out } => {
            let session = restore(store)?;
            let artifact = export_table(session.engine(), &table, format.into())
                .with_context(|| format!("export table {table}"))?;
            write_artifact(&mut io, &artifact, out.as_deref())
        }
        Command::ExportAll {
            format,
            workbook,
            out,
        } => {
            let session = restore(store)?;
            let artifact = if workbook {
                export_workbook(session.engine()).context("export workbook")?
            } else {
                export_all_tables(session.engine(), format.into()).context("export tables")?
            };
            write_artifact(&mut io, &artifact, out.as_deref())
        }
        Command::Save { path } => {
            let mut session = restore(store)?;
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_FILE_NAME));
            let saved = session.save_to(&path);
            io.flush_notifications(&mut session)?;
            saved.with_context(|| format!("save {}", path.display()))
        }
        Command::Discard => {
            // Read the slot without opening it: a corrupt image must still be
            // discardable.
            let existing = store.get_raw().unwrap_or_else(|err| {
                log::warn!("working file metadata unreadable: {err}");
                None
            });
            store.clear().context("clear working file")?;
            match existing {
                Some(file) => writeln!(io.out, "Discarded {}.", file.file_name)?,
                None => writeln!(io.out, "Nothing to discard.")?,
            }
            Ok(())
        }
    }
}

fn restore(store: Arc<dyn WorkingFileStore>) -> Result<Session> {
    Session::restore(store, Utc::now())
        .context("reopen working file")?
        .ok_or_else(|| {
            anyhow!("no open database (it may have expired); run `dbview open <file>` first")
        })
}

fn open(io: &mut Io<'_>, store: Arc<dyn WorkingFileStore>, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut session = Session::load(bytes, file_name, store)
        .with_context(|| format!("open {} as a SQLite database", path.display()))?;
    io.flush_notifications(&mut session)?;
    writeln!(
        io.out,
        "Opened {} ({} tables)",
        session.file_name(),
        session.tables().len()
    )?;
    render::write_tables(io.out, session.tables())?;
    Ok(())
}

fn status(io: &mut Io<'_>, store: Arc<dyn WorkingFileStore>, config: &Config) -> Result<()> {
    let Some(session) = Session::restore(store, Utc::now())? else {
        writeln!(io.out, "No open database.")?;
        return Ok(());
    };
    let expires_at = session.last_touched_at()
        + chrono::Duration::from_std(config.session_ttl()).unwrap_or_else(|_| chrono::Duration::zero());
    writeln!(io.out, "File:     {}", session.file_name())?;
    writeln!(
        io.out,
        "Modified: {}",
        if session.is_modified() { "yes" } else { "no" }
    )?;
    writeln!(io.out, "Tables:   {}", session.tables().len())?;
    writeln!(io.out, "Expires:  {}", expires_at.to_rfc3339())?;
    Ok(())
}

/// Render `table` at `page` with `filter`, surfacing any failure.
fn show(
    io: &mut Io<'_>,
    session: &mut Session,
    table: &str,
    page: usize,
    filter: Option<String>,
) -> Result<()> {
    let shown = session.show(table, page, filter);
    io.flush_notifications(session)?;
    if !shown {
        bail!("could not display table {table}");
    }
    Ok(())
}

fn confirm(input: &mut dyn BufRead, out: &mut dyn Write, prompt: &str) -> bool {
    if write!(out, "{prompt}").and_then(|()| out.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn write_artifact(io: &mut Io<'_>, artifact: &ExportArtifact, out: Option<&Path>) -> Result<()> {
    let path = match out {
        Some(dir) if dir.is_dir() => dir.join(&artifact.file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&artifact.file_name),
    };
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("write {}", path.display()))?;
    writeln!(
        io.out,
        "Wrote {} ({}, {} bytes)",
        path.display(),
        artifact.mime,
        artifact.bytes.len()
    )?;
    Ok(())
}

fn fetch_previews(
    config: &Config,
    page: &dbview_storage::TablePage,
) -> Result<std::collections::HashMap<String, dbview_preview::PreviewState>> {
    let client = reqwest::Client::builder()
        .timeout(config.preview_timeout())
        .build()
        .context("build http client")?;
    let board = PreviewBoard::new(client).with_timeout(config.preview_timeout());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start preview runtime")?;
    runtime.block_on(async {
        for handle in board.schedule(page) {
            if let Err(err) = handle.await {
                log::debug!("preview task failed: {err}");
            }
        }
    });
    Ok(board.snapshot())
}
