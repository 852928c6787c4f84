//! EntryStore: persisted configuration entries
//!
//! Entries live in a single JSON document that is rewritten on every change
//! (temp file + rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::flow::ConfiguredEntries;
use crate::models::ConfigEntry;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    entries: Vec<ConfigEntry>,
}

pub struct EntryStore {
    path: PathBuf,
    entries: RwLock<Vec<ConfigEntry>>,
}

impl EntryStore {
    /// Load the store; a missing file is an empty store
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes)?;
                if doc.version != STORE_VERSION {
                    return Err(AppError::ConfigError(format!(
                        "Unsupported entry store version {} in {}",
                        doc.version,
                        path.display()
                    )));
                }
                doc.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!("[EntryStore] Loaded {} entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub async fn list(&self) -> Vec<ConfigEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned()
    }

    pub async fn find_by_unique_id(&self, unique_id: &str) -> Option<ConfigEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.unique_id == unique_id)
            .cloned()
    }

    /// Add an entry; a second entry for the same device is refused
    pub async fn add(&self, entry: ConfigEntry) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;

        if entries.iter().any(|e| e.unique_id == entry.unique_id) {
            return Err(AppError::Conflict(format!(
                "Device {} is already configured",
                entry.unique_id
            )));
        }

        entries.push(entry);
        if let Err(e) = self.persist(&entries).await {
            entries.pop();
            return Err(e);
        }
        Ok(())
    }

    pub async fn remove(&self, entry_id: &str) -> Result<ConfigEntry, AppError> {
        let mut entries = self.entries.write().await;

        let index = entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", entry_id)))?;

        let removed = entries.remove(index);
        if let Err(e) = self.persist(&entries).await {
            entries.insert(index, removed);
            return Err(e);
        }
        Ok(removed)
    }

    async fn persist(&self, entries: &[ConfigEntry]) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let doc = StoreDocument {
            version: STORE_VERSION,
            entries: entries.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfiguredEntries for EntryStore {
    async fn is_configured(&self, unique_id: &str) -> bool {
        self.find_by_unique_id(unique_id).await.is_some()
    }
}
