//! Configuration file watcher for hot route reload.
//!
//! Only `[[routes]]` take effect on reload. Listener, limits and admin
//! settings are read once at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::{load_config, ConfigError};
use crate::routing::{RouteError, RouteTable, SharedRouter};

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Re-reads `path` and swaps its routes into `router`.
///
/// On any error the live routes stay untouched. Returns the number of
/// routes now installed.
pub fn reload_routes(path: &Path, router: &SharedRouter) -> Result<usize, ReloadError> {
    let config = load_config(path)?;
    let table = RouteTable::from_config(&config.routes)?;
    let count = table.len();
    router.replace(table);
    Ok(count)
}

/// Watches the configuration file and reloads routes on change.
pub struct ConfigWatcher {
    path: PathBuf,
    router: Arc<SharedRouter>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, router: Arc<SharedRouter>) -> Self {
        Self {
            path: path.to_path_buf(),
            router,
        }
    }

    /// Starts watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let router = self.router;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = %path.display(), "Config file change detected");
                    match reload_routes(&path, &router) {
                        Ok(routes) => tracing::info!(routes, "Routes reloaded"),
                        Err(e) => {
                            tracing::error!(error = %e, "Reload failed, keeping current routes")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}
