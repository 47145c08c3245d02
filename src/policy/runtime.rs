//! Write-through policy cache.
//!
//! # Design Decisions
//! - Writes go to the store first; the in-memory set is swapped only after the store accepted them
//! - The set is copy-on-write: readers hold an `Arc<PolicySet>` for the whole request
//! - Writes are serialized so two admins cannot interleave store and swap

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::validation::ValidationErrors;
use crate::policy::model::{PolicyDraft, PolicyEntry, PolicyInput, PolicyRule};
use crate::policy::store::{PolicyStore, PolicyStoreError};

/// An entry paired with its compiled rule.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub entry: PolicyEntry,
    pub rule: PolicyRule,
}

/// Immutable policy generation, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub(crate) policies: Vec<Arc<CompiledPolicy>>,
}

impl PolicySet {
    fn from_entries(entries: Vec<PolicyEntry>) -> Self {
        let mut policies: Vec<Arc<CompiledPolicy>> = entries
            .into_iter()
            .filter_map(|entry| match PolicyRule::compile(entry.policy_type, &entry.config) {
                Ok(rule) => Some(Arc::new(CompiledPolicy { entry, rule })),
                Err(errors) => {
                    tracing::warn!(policy_id = %entry.id, error = %errors, "skipping invalid stored policy");
                    None
                }
            })
            .collect();
        policies.sort_by(|a, b| a.entry.id.cmp(&b.entry.id));
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.policies.iter().map(|p| &p.entry)
    }

    pub fn get(&self, id: &str) -> Option<&PolicyEntry> {
        self.entries().find(|e| e.id == id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Store(#[from] PolicyStoreError),
}

pub struct PolicyRuntime {
    store: Arc<dyn PolicyStore>,
    current: ArcSwap<PolicySet>,
    write_lock: tokio::sync::Mutex<()>,
}

impl PolicyRuntime {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            current: ArcSwap::from_pointee(PolicySet::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Populate the cache from the store (startup).
    pub async fn load_from_store(&self) -> Result<usize, PolicyStoreError> {
        let _guard = self.write_lock.lock().await;
        let set = PolicySet::from_entries(self.store.get_all().await?);
        let count = set.len();
        self.current.store(Arc::new(set));
        tracing::info!(policies = count, "policies loaded");
        Ok(count)
    }

    /// Lock-free read of the current policy set.
    pub fn snapshot(&self) -> Arc<PolicySet> {
        self.current.load_full()
    }

    /// Validate, persist, then publish. Returns the entry and whether it was new.
    pub async fn upsert(&self, input: PolicyInput) -> Result<(PolicyEntry, bool), PolicyError> {
        let mut errors = ValidationErrors::new();
        if let Some(id) = &input.id {
            if id.trim().is_empty() || id.len() > 128 || id.contains('/') {
                errors.push("id", "must be 1-128 characters without '/'");
            }
        }
        let rule = match PolicyRule::compile(input.policy_type, &input.config) {
            Ok(rule) => Some(rule),
            Err(e) => {
                errors.extend(e);
                None
            }
        };
        let rule = match (errors.is_empty(), rule) {
            (true, Some(rule)) => rule,
            _ => return Err(errors.into()),
        };

        let draft = PolicyDraft {
            id: input.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            policy_type: input.policy_type,
            mode: input.mode,
            description: input.description,
            config: input.config,
            enabled: input.enabled,
        };

        let _guard = self.write_lock.lock().await;
        let created = self.current.load().get(&draft.id).is_none();
        let entry = self.store.upsert(draft).await?;

        let mut next = (*self.current.load_full()).clone();
        next.policies.retain(|p| p.entry.id != entry.id);
        next.policies.push(Arc::new(CompiledPolicy {
            entry: entry.clone(),
            rule,
        }));
        next.policies.sort_by(|a, b| a.entry.id.cmp(&b.entry.id));
        self.current.store(Arc::new(next));

        tracing::info!(
            policy_id = %entry.id,
            policy_type = entry.policy_type.as_str(),
            mode = entry.mode.as_str(),
            enabled = entry.enabled,
            created,
            "policy saved"
        );
        Ok((entry, created))
    }

    /// Delete through the store; false when the id was unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, PolicyStoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.store.delete(id).await? {
            return Ok(false);
        }

        let mut next = (*self.current.load_full()).clone();
        next.policies.retain(|p| p.entry.id != id);
        self.current.store(Arc::new(next));

        tracing::info!(policy_id = %id, "policy deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{PolicyMode, PolicyType};
    use crate::policy::store::InMemoryPolicyStore;
    use serde_json::json;

    fn input(id: Option<&str>) -> PolicyInput {
        PolicyInput {
            id: id.map(str::to_string),
            policy_type: PolicyType::IpDeny,
            mode: PolicyMode::Enforce,
            description: String::new(),
            config: json!({ "cidrs": ["10.0.0.0/8"] }),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_writes_through_and_swaps() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let runtime = PolicyRuntime::new(store.clone());

        let before = runtime.snapshot();
        let (entry, created) = runtime.upsert(input(None)).await.unwrap();
        assert!(created);
        assert!(uuid::Uuid::parse_str(&entry.id).is_ok());

        // Old snapshot is untouched; new one sees the entry.
        assert!(before.is_empty());
        assert_eq!(runtime.snapshot().len(), 1);
        assert!(store.get_by_id(&entry.id).await.unwrap().is_some());

        let (_, created) = runtime.upsert(input(Some(&entry.id))).await.unwrap();
        assert!(!created);
        assert_eq!(runtime.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_policy_is_not_stored() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let runtime = PolicyRuntime::new(store.clone());

        let mut bad = input(Some(""));
        bad.config = json!({ "cidrs": ["garbage"] });
        let err = runtime.upsert(bad).await.unwrap_err();
        let PolicyError::Validation(errors) = err else { panic!("expected validation error") };
        assert_eq!(errors.len(), 2);
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(runtime.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_load_and_delete() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let seeded = PolicyRuntime::new(store.clone());
        seeded.upsert(input(Some("a"))).await.unwrap();
        seeded.upsert(input(Some("b"))).await.unwrap();

        let runtime = PolicyRuntime::new(store);
        assert_eq!(runtime.load_from_store().await.unwrap(), 2);

        assert!(runtime.delete("a").await.unwrap());
        assert!(!runtime.delete("a").await.unwrap());
        let ids: Vec<_> = runtime.snapshot().entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["b"]);
    }
}
