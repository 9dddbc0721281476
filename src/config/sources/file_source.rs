//! File-backed config source with SHA-256 change detection.
//!
//! The format is chosen from the file extension when the source is opened,
//! so an unsupported extension fails at startup rather than on first load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex};
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::TelltaleError;

/// Names probed in the working directory when no `--config` is given.
pub const AUTO_DETECT_CANDIDATES: [&str; 4] = [
    "telltale.yaml",
    "telltale.yml",
    "telltale.json",
    "telltale.toml",
];

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    format: &'static str,
}

impl FileSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TelltaleError> {
        let path = path.into();
        let format = match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => "yaml",
            #[cfg(feature = "json")]
            "json" => "json",
            #[cfg(feature = "toml")]
            "toml" => "toml",
            other => return Err(TelltaleError::UnsupportedFormat(other.to_string())),
        };
        Ok(Self { path, format })
    }

    /// First of [`AUTO_DETECT_CANDIDATES`] present in `dir`.
    pub async fn detect(dir: &Path) -> Result<Option<Self>, TelltaleError> {
        for name in AUTO_DETECT_CANDIDATES {
            let path = dir.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::info!(path = %path.display(), "auto-detected config file");
                return Self::open(path).map(Some);
            }
        }
        Ok(None)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String, TelltaleError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TelltaleError::ConfigFileNotFound {
                    path: self.path.clone(),
                },
                _ => TelltaleError::Io(e),
            })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.format
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), TelltaleError> {
        let content = self.read().await?;
        let config = parse_config_str(self.format, &content, &self.path.display().to_string())?;
        validate(&config).map_err(|errors| TelltaleError::ConfigValidation { errors })?;
        Ok((config, ConfigVersion::Hash(sha256_hex(content.as_bytes()))))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, TelltaleError> {
        let content = self.read().await?;
        Ok(*current != ConfigVersion::Hash(sha256_hex(content.as_bytes())))
    }
}
