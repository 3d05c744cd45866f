//! Route table reload.
//!
//! The live mux sits behind an [`ArcSwap`]; a reload builds a complete new
//! mux from the route file and swaps it in. A file that fails to build
//! leaves the current table serving.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use pathmux_telemetry::{log_reload_failed, log_routes_reloaded};

use crate::config::{ConfigError, RouteTable};
use crate::handler::BoxedHandler;
use crate::mux::{Mux, MuxConfig};

/// The live route table, shared by the server and the reloader.
pub type SharedMux = Arc<ArcSwap<Mux<BoxedHandler>>>;

/// Wrap a freshly built mux for sharing.
pub fn shared(mux: Mux<BoxedHandler>) -> SharedMux {
    Arc::new(ArcSwap::from_pointee(mux))
}

/// Rebuild the route table from `path` and swap it in.
///
/// Returns the number of patterns in the new table.
pub fn reload_routes(
    path: &Path,
    config: &MuxConfig,
    routes: &SharedMux,
) -> Result<usize, ConfigError> {
    let mux = RouteTable::load(path)?.build_mux(config)?;
    let patterns = mux.len();
    routes.store(Arc::new(mux));
    Ok(patterns)
}

/// Watches a route file and reloads the table when it changes.
pub struct RouteWatcher {
    path: PathBuf,
    config: MuxConfig,
    routes: SharedMux,
}

impl RouteWatcher {
    pub fn new(path: &Path, config: MuxConfig, routes: SharedMux) -> Self {
        Self {
            path: path.to_path_buf(),
            config,
            routes,
        }
    }

    /// Start watching in the background.
    ///
    /// The parent directory is watched so editors that replace the file
    /// are picked up too. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_file {
                        return;
                    }
                    match reload_routes(&self.path, &self.config, &self.routes) {
                        Ok(patterns) => log_routes_reloaded!(
                            path = %self.path.display(),
                            patterns,
                            "route table reloaded"
                        ),
                        Err(e) => log_reload_failed!(
                            path = %self.path.display(),
                            error = %e,
                            "keeping current route table"
                        ),
                    }
                }
                Err(e) => tracing::error!(error = %e, "route file watch error"),
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "watching route file");
        Ok(watcher)
    }
}
