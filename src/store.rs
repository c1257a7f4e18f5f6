//! JSON-file store holding the processed email collection
//!
//! The whole collection is read and rewritten on every mutation. Writes go
//! to a sibling temp file that is renamed over the target, so readers never
//! observe a half-written document. Concurrent writers are last-writer-wins.

use std::path::{Path, PathBuf};

use crate::error::{MailError, Result};
use crate::models::{ensure_unique_ids, EmailDocument, EmailRecord};

#[derive(Debug, Clone)]
pub struct EmailStore {
    path: PathBuf,
}

impl EmailStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection, treating a missing, empty, or corrupt file as empty
    pub async fn load(&self) -> Vec<EmailRecord> {
        match self.try_load().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Treating email store {:?} as empty: {}", self.path, e);
                Vec::new()
            }
        }
    }

    /// Load the collection, surfacing unreadable or corrupt content as an error
    ///
    /// A file that does not exist (or is blank) is an empty collection.
    pub async fn try_load(&self) -> Result<Vec<EmailRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No email store at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: EmailDocument = serde_json::from_str(&content)
            .map_err(|e| MailError::StoreCorrupt(e.to_string()))?;

        tracing::debug!(
            "Loaded {} emails from {:?}",
            document.emails.len(),
            self.path
        );
        Ok(document.emails)
    }

    /// Overwrite the persisted collection
    pub async fn replace_all(&self, records: &[EmailRecord]) -> Result<()> {
        ensure_unique_ids(records.iter().map(|r| r.id.as_str()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let document = serde_json::json!({ "emails": records });
        let json = serde_json::to_string_pretty(&document)?;

        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Saved {} emails to {:?}", records.len(), self.path);
        Ok(())
    }

    /// Apply `mutator` to the record with `id` and persist the collection.
    ///
    /// Returns `false` without writing when no record matches.
    pub async fn update_one<F>(&self, id: &str, mutator: F) -> Result<bool>
    where
        F: FnOnce(&mut EmailRecord),
    {
        let mut records = self.try_load().await?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            tracing::debug!("update_one: no stored email with id {}", id);
            return Ok(false);
        };

        mutator(record);
        self.replace_all(&records).await?;
        Ok(true)
    }

    /// Look up a single stored record. A corrupt store is an error, not a miss.
    pub async fn get(&self, id: &str) -> Result<Option<EmailRecord>> {
        Ok(self.try_load().await?.into_iter().find(|r| r.id == id))
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "emails.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
    }
}
