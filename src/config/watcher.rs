//! Configuration file watcher for hot reload of the route table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;
use crate::routing::RouteConfigStore;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current route table");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded route tables until shutdown.
///
/// Only `routes`/`clusters` are hot; other sections change through the admin API.
pub async fn apply_route_reloads(
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    store: Arc<RouteConfigStore>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match store.update(config.routes, config.clusters) {
                    Ok(snapshot) => tracing::info!(
                        version = snapshot.version(),
                        routes = snapshot.routes().len(),
                        "Route table reloaded from file"
                    ),
                    Err(errors) => tracing::error!(error = %errors, "Reloaded route table rejected"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{ClusterEntry, Destination, RouteEntry};

    #[tokio::test]
    async fn test_reload_applies_route_table() {
        let store = Arc::new(RouteConfigStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut config = GatewayConfig::default();
        config.clusters.push(ClusterEntry::new(
            "web",
            [("d1", Destination::new("http://127.0.0.1:9000"))],
        ));
        config.routes.push(RouteEntry::new("r1", "/{**rest}", "web"));
        tx.send(config).unwrap();

        let task = tokio::spawn(apply_route_reloads(rx, store.clone(), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(());
        task.await.unwrap();

        assert_eq!(store.get_snapshot().routes().len(), 1);
    }
}
