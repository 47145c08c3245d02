//! Durable policy storage.
//!
//! The store owns timestamps: `created_at` is kept across upserts of the same
//! id and `updated_at` is refreshed on every write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::policy::model::{PolicyDraft, PolicyEntry};

#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    #[error("policy store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("policy store is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// CRUD contract for policy persistence.
#[async_trait::async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<PolicyEntry>, PolicyStoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<PolicyEntry>, PolicyStoreError>;

    /// Insert or replace by id. Returns the stored entry.
    async fn upsert(&self, draft: PolicyDraft) -> Result<PolicyEntry, PolicyStoreError>;

    /// Returns false when no entry had that id.
    async fn delete(&self, id: &str) -> Result<bool, PolicyStoreError>;
}

fn stamp(entries: &BTreeMap<String, PolicyEntry>, draft: PolicyDraft) -> PolicyEntry {
    let now = Utc::now();
    let created_at = entries.get(&draft.id).map(|e| e.created_at).unwrap_or(now);
    draft.into_entry(created_at, now)
}

/// Volatile store for tests and single-node development.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    entries: Mutex<BTreeMap<String, PolicyEntry>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_all(&self) -> Result<Vec<PolicyEntry>, PolicyStoreError> {
        let entries = self.entries.lock().expect("policy store mutex poisoned");
        Ok(entries.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PolicyEntry>, PolicyStoreError> {
        let entries = self.entries.lock().expect("policy store mutex poisoned");
        Ok(entries.get(id).cloned())
    }

    async fn upsert(&self, draft: PolicyDraft) -> Result<PolicyEntry, PolicyStoreError> {
        let mut entries = self.entries.lock().expect("policy store mutex poisoned");
        let entry = stamp(&entries, draft);
        entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: &str) -> Result<bool, PolicyStoreError> {
        let mut entries = self.entries.lock().expect("policy store mutex poisoned");
        Ok(entries.remove(id).is_some())
    }
}

/// JSON file store. Every write replaces the file through a temp file and rename.
#[derive(Debug)]
pub struct FilePolicyStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<BTreeMap<String, PolicyEntry>>,
}

impl FilePolicyStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PolicyStoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<PolicyEntry>>(&bytes)?
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = ?path, policies = entries.len(), "policy store opened");
        Ok(Self {
            path,
            entries: tokio::sync::Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &BTreeMap<String, PolicyEntry>) -> Result<(), PolicyStoreError> {
        let list: Vec<&PolicyEntry> = entries.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PolicyStore for FilePolicyStore {
    async fn get_all(&self) -> Result<Vec<PolicyEntry>, PolicyStoreError> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PolicyEntry>, PolicyStoreError> {
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn upsert(&self, draft: PolicyDraft) -> Result<PolicyEntry, PolicyStoreError> {
        let mut entries = self.entries.lock().await;
        let entry = stamp(&entries, draft);

        let mut next = entries.clone();
        next.insert(entry.id.clone(), entry.clone());
        self.persist(&next).await?;
        *entries = next;
        Ok(entry)
    }

    async fn delete(&self, id: &str) -> Result<bool, PolicyStoreError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(id) {
            return Ok(false);
        }

        let mut next = entries.clone();
        next.remove(id);
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }
}
