//! Live route table with one-step rollback.
//!
//! # Design Decisions
//! - Readers load an `Arc<RouteSnapshot>` from an `ArcSwap` and never block
//! - Writers are serialized by a mutex; validation finishes before the swap
//! - Rollback reinstates the saved snapshot verbatim, version included

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::config::validation::ValidationErrors;
use crate::routing::matcher::RequestTarget;
use crate::routing::model::{ClusterEntry, RouteEntry};
use crate::routing::validation::{compile_route_table, CompiledRoute};

/// An immutable route table generation.
#[derive(Debug)]
pub struct RouteSnapshot {
    version: u64,
    routes: Vec<RouteEntry>,
    clusters: Vec<ClusterEntry>,
    table: Vec<CompiledRoute>,
}

/// The route and cluster a request resolved to.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteEntry,
    pub cluster: &'a ClusterEntry,
}

/// Position of a matched route inside the snapshot it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRef {
    route: usize,
    cluster: usize,
}

impl RouteSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            routes: Vec::new(),
            clusters: Vec::new(),
            table: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn clusters(&self) -> &[ClusterEntry] {
        &self.clusters
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterEntry> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// First route (by priority, then id) whose host and path conditions match.
    pub fn find(&self, host: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.lookup(host, path).map(|r| self.get(r))
    }

    pub fn lookup(&self, host: &str, path: &str) -> Option<RouteRef> {
        let target = RequestTarget { host, path };
        self.table.iter().find(|c| c.matches(&target)).map(|c| RouteRef {
            route: c.route,
            cluster: c.cluster,
        })
    }

    /// Resolve a reference obtained from `lookup` on this same snapshot.
    pub fn get(&self, r: RouteRef) -> RouteMatch<'_> {
        RouteMatch {
            route: &self.routes[r.route],
            cluster: &self.clusters[r.cluster],
        }
    }
}

impl PartialEq for RouteSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.routes == other.routes
            && self.clusters == other.clusters
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    #[error("nothing to rollback")]
    NothingToRollback,
}

/// Holds the current route snapshot and a single rollback slot.
pub struct RouteConfigStore {
    current: ArcSwap<RouteSnapshot>,
    previous: ArcSwapOption<RouteSnapshot>,
    next_version: AtomicU64,
    write_lock: Mutex<()>,
}

impl RouteConfigStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteSnapshot::empty()),
            previous: ArcSwapOption::empty(),
            next_version: AtomicU64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a store already holding `routes`/`clusters` (startup seeding).
    pub fn with_table(
        routes: Vec<RouteEntry>,
        clusters: Vec<ClusterEntry>,
    ) -> Result<Self, ValidationErrors> {
        let store = Self::new();
        store.update(routes, clusters)?;
        store.previous.store(None);
        Ok(store)
    }

    /// Lock-free read of the current snapshot.
    pub fn get_snapshot(&self) -> Arc<RouteSnapshot> {
        self.current.load_full()
    }

    /// Validate and install a new table. The replaced snapshot becomes the rollback target.
    pub fn update(
        &self,
        routes: Vec<RouteEntry>,
        clusters: Vec<ClusterEntry>,
    ) -> Result<Arc<RouteSnapshot>, ValidationErrors> {
        let _guard = self.write_lock.lock().expect("route store mutex poisoned");

        let table = compile_route_table(&routes, &clusters)?;
        let snapshot = Arc::new(RouteSnapshot {
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
            routes,
            clusters,
            table,
        });

        let old = self.current.swap(snapshot.clone());
        self.previous.store(Some(old));

        tracing::info!(
            version = snapshot.version,
            routes = snapshot.routes.len(),
            clusters = snapshot.clusters.len(),
            "route table updated"
        );
        Ok(snapshot)
    }

    /// Replace the rollback slot explicitly.
    pub fn save_as_previous(&self, snapshot: Arc<RouteSnapshot>) {
        let _guard = self.write_lock.lock().expect("route store mutex poisoned");
        self.previous.store(Some(snapshot));
    }

    /// Reinstate the rollback slot and clear it.
    pub fn rollback(&self) -> Result<Arc<RouteSnapshot>, RollbackError> {
        let _guard = self.write_lock.lock().expect("route store mutex poisoned");

        let previous = self.previous.swap(None).ok_or(RollbackError::NothingToRollback)?;
        self.current.store(previous.clone());

        tracing::warn!(version = previous.version, "route table rolled back");
        Ok(previous)
    }

    pub fn has_previous(&self) -> bool {
        self.previous.load().is_some()
    }
}

impl Default for RouteConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
