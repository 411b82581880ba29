use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const STORE_DIR_NAME: &str = "session";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "dbview", "dbview")
}

/// User settings read from `config.json`. Every field is optional in the
/// file; command-line flags override whatever was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the working file is kept between invocations.
    pub store_dir: Option<PathBuf>,
    pub session_ttl_secs: u64,
    pub link_previews: bool,
    pub preview_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            session_ttl_secs: dbview_storage::SESSION_TTL.as_secs(),
            link_previews: true,
            preview_timeout_secs: 5,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("read config {}", path.display()))
            }
        };
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_local_dir().join(STORE_DIR_NAME))
            .context("could not determine a data directory for the working file")
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_secs(self.preview_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "link_previews": false, "session_ttl_secs": 60 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.link_previews);
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("parse config"), "{err:#}");
    }
}
