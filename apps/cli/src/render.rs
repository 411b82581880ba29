use std::collections::HashMap;
use std::io::Write;

use dbview_preview::PreviewState;
use dbview_storage::{Level, Notification, TableDescriptor, TablePage};

const MAX_CELL_WIDTH: usize = 40;

fn clip(text: &str) -> String {
    let flat = text.replace('\r', "").replace('\n', "\\n");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        return flat;
    }
    let mut clipped: String = flat.chars().take(MAX_CELL_WIDTH - 3).collect();
    clipped.push_str("...");
    clipped
}

pub fn write_tables(out: &mut dyn Write, tables: &[TableDescriptor]) -> std::io::Result<()> {
    if tables.is_empty() {
        return writeln!(out, "No tables.");
    }
    for table in tables {
        writeln!(out, "{}", table.name)?;
    }
    Ok(())
}

/// Plain-text grid for one page. The key column is marked with `*`;
/// `#` numbers rows within the page, which is what `edit --row` expects.
pub fn write_page(out: &mut dyn Write, page: &TablePage) -> std::io::Result<()> {
    let mut header = vec!["#".to_string()];
    header.extend(page.columns.iter().map(|c| {
        if c.is_primary_key {
            format!("{}*", c.name)
        } else {
            c.name.clone()
        }
    }));

    let body: Vec<Vec<String>> = page
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut line = vec![(idx + 1).to_string()];
            line.extend(row.cells.iter().map(|cell| clip(&cell.text())));
            line
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for line in &body {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", format_line(&header))?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(out, "{}", rule.join("-+-"))?;
    for line in &body {
        writeln!(out, "{}", format_line(line))?;
    }

    let pagination = page.pagination;
    if page.rows.is_empty() {
        writeln!(out, "No rows.")?;
    }
    if pagination.is_visible() {
        writeln!(
            out,
            "Page {} of {} ({} rows)",
            pagination.page, pagination.total_pages, pagination.total_rows
        )?;
    } else {
        writeln!(out, "{} rows", pagination.total_rows)?;
    }
    if let Some(filter) = &page.filter {
        writeln!(out, "Filter: {filter}")?;
    }
    Ok(())
}

pub fn write_previews(
    out: &mut dyn Write,
    page: &TablePage,
    previews: &HashMap<String, PreviewState>,
) -> std::io::Result<()> {
    let mut seen = Vec::new();
    for url in page.link_urls() {
        if seen.contains(&url) {
            continue;
        }
        seen.push(url);
        if let Some(PreviewState::Ready(preview)) = previews.get(url) {
            writeln!(out, "{url}")?;
            writeln!(out, "    title: {}", preview.title)?;
            writeln!(out, "    icon:  {}", preview.favicon)?;
        }
    }
    Ok(())
}

pub fn write_notifications(
    err: &mut dyn Write,
    notifications: &[Notification],
) -> std::io::Result<()> {
    for notification in notifications {
        let label = match notification.level {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        writeln!(err, "[{label}] {}", notification.message)?;
    }
    Ok(())
}
