//! Configuration file discovery and generation.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! enable_citation_discovery = true
//! enable_pdf_download = true
//! enable_fulltext = true
//! download_concurrency = 5
//! download_retry_limit = 3
//! extraction_backend_order = ["pdf-extract", "lopdf"]
//! max_citing_papers = 100
//!
//! [sources]
//! citation_sources = ["semantic", "openalex"]
//! pdf_resolvers = ["semantic", "openalex", "unpaywall"]
//! unpaywall_email = "you@example.org"
//!
//! [store]
//! directory = "~/.cache/citation-harvest/artifacts"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CITATION_HARVEST_CONFIG";

const LOCAL_FILE_NAME: &str = "citation-harvest.toml";

/// Locate the configuration file
///
/// Checks `$CITATION_HARVEST_CONFIG`, then `./citation-harvest.toml`, then
/// `<config dir>/citation-harvest/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_ENV_VAR, path.display());
    }

    let local = PathBuf::from(LOCAL_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("citation-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Default configuration rendered as TOML
pub fn default_config_toml() -> Result<String, ConfigError> {
    toml::to_string_pretty(&Config::default()).map_err(|e| ConfigError::Serialize(e.to_string()))
}

/// Write the default configuration to `path`, refusing to overwrite
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::Invalid(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, default_config_toml()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_default_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.pipeline, Config::default().pipeline);
        assert_eq!(loaded.sources.citation_sources, vec!["semantic", "openalex"]);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine").unwrap();
        assert!(write_default_config(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
