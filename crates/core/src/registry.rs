//! Durable registry of uploaded documents.
//!
//! The registry is always written wholesale. File-backed persistence writes a
//! sibling temp file and renames it over the target, so readers see either the
//! previous or the next complete registry.

use crate::{DocumentEntry, RagError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub type Registry = BTreeMap<String, DocumentEntry>;

#[async_trait]
pub trait RegistryRepository: Send + Sync {
    async fn load(&self) -> Result<Registry, RagError>;
    async fn save(&self, registry: &Registry) -> Result<(), RagError>;
}

pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryRepository for JsonFileRegistry {
    async fn load(&self) -> Result<Registry, RagError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::new()),
            Err(error) => return Err(error.into()),
        };

        serde_json::from_slice(&bytes).map_err(|error| {
            RagError::Registry(format!("{} is not a valid registry: {error}", self.path.display()))
        })
    }

    async fn save(&self, registry: &Registry) -> Result<(), RagError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(registry)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Non-durable registry for ephemeral runs.
#[derive(Default)]
pub struct InMemoryRegistry {
    saved: Mutex<Registry>,
}

#[async_trait]
impl RegistryRepository for InMemoryRegistry {
    async fn load(&self) -> Result<Registry, RagError> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, registry: &Registry) -> Result<(), RagError> {
        *self.saved.lock().await = registry.clone();
        Ok(())
    }
}
