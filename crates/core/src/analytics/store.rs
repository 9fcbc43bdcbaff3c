use super::AnalyticsSnapshot;
use crate::error::PersistenceError;
use std::path::{Path, PathBuf};

/// JSON file holding the analytics snapshot, rewritten wholesale on every save.
#[derive(Debug, Clone)]
pub struct AnalyticsStore {
    path: PathBuf,
}

impl AnalyticsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. `Ok(None)` means no file exists yet.
    pub async fn load(&self) -> Result<Option<AnalyticsSnapshot>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write the snapshot through a temporary file and rename it into place.
    pub async fn save(&self, snapshot: &AnalyticsSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp_path.clone(),
                source,
            })?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
