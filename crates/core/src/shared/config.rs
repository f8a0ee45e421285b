use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub const DEFAULT_ENCODER_THREADS: usize = 4;
pub const DEFAULT_SIGNER_VALID_DAYS: i64 = 3650;

/// Settings the writer consults while building and finishing a package.
///
/// Passed explicitly to the writer; nothing reads it from global state.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DcpConfig {
    /// Written into the CPL; an empty string means "use the program name".
    pub dcp_creator: String,
    pub dcp_issuer: String,
    pub encoder_threads: usize,
    /// PKCS#8 PEM RSA key used when a film must be signed.
    pub signer_key: Option<PathBuf>,
    pub signer_subject: String,
    pub signer_valid_days: i64,
}

impl Default for DcpConfig {
    fn default() -> Self {
        Self {
            dcp_creator: String::new(),
            dcp_issuer: String::new(),
            encoder_threads: DEFAULT_ENCODER_THREADS,
            signer_key: None,
            signer_subject: "CN=DCP Writer".to_string(),
            signer_valid_days: DEFAULT_SIGNER_VALID_DAYS,
        }
    }
}

impl DcpConfig {
    /// Per-user config location, e.g. `~/.config/DCP Writer/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("DCP Writer").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the per-user config if there is one, otherwise the defaults.
    pub fn load_or_default() -> Self {
        Self::default_path()
            .filter(|path| path.exists())
            .and_then(|path| Self::load(&path).ok())
            .unwrap_or_default()
    }

    pub fn creator_or_default(&self) -> String {
        if self.dcp_creator.is_empty() {
            default_metadata_name()
        } else {
            self.dcp_creator.clone()
        }
    }

    pub fn issuer_or_default(&self) -> String {
        if self.dcp_issuer.is_empty() {
            default_metadata_name()
        } else {
            self.dcp_issuer.clone()
        }
    }
}

fn default_metadata_name() -> String {
    format!("DCP Writer {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "dcp_issuer": "ACME", "encoder_threads": 12 }"#).unwrap();

        let config = DcpConfig::load(&path).unwrap();
        assert_eq!(config.dcp_issuer, "ACME");
        assert_eq!(config.encoder_threads, 12);
        assert_eq!(config.dcp_creator, "");
        assert_eq!(config.signer_valid_days, DEFAULT_SIGNER_VALID_DAYS);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DcpConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_bad_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = DcpConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_creator_falls_back_to_program_name() {
        let config = DcpConfig::default();
        assert!(config.creator_or_default().starts_with("DCP Writer "));

        let named = DcpConfig {
            dcp_creator: "Studio".to_string(),
            ..DcpConfig::default()
        };
        assert_eq!(named.creator_or_default(), "Studio");
    }

    #[test]
    fn test_default_path_names_app() {
        if let Some(path) = DcpConfig::default_path() {
            assert!(path.to_string_lossy().contains("DCP Writer"));
        }
    }
}
