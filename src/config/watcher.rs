//! Configuration file watcher for hot reload.
//!
//! Watches the directory holding the file rather than the file itself, so a
//! save that writes a temp file and renames it over the original keeps being
//! seen. Only the `[compiler]` section is hot; a change elsewhere is logged and
//! takes effect on restart.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::CompilerConfig;

/// Emits compiler settings each time the file's `[compiler]` section changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: CompilerConfig,
    update_tx: mpsc::UnboundedSender<CompilerConfig>,
}

impl ConfigWatcher {
    /// `current` is what the running compiler uses; only differences from it
    /// are sent.
    pub fn new(
        path: &Path,
        current: CompilerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CompilerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| notify::Error::path_not_found().add_path(self.path.clone()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let tx = self.update_tx;
        let path = self.path.clone();
        let mut current = self.current;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if !touches_config {
                        return;
                    }
                    // an in-place save is briefly empty after truncation
                    let empty = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
                    if empty {
                        return;
                    }
                    match load_config(&path) {
                        Ok(reloaded) if reloaded.compiler != current => {
                            tracing::info!(path = %path.display(), "Compiler settings changed on disk");
                            current = reloaded.compiler.clone();
                            let _ = tx.send(reloaded.compiler);
                        }
                        Ok(_) => {
                            tracing::debug!(
                                path = %path.display(),
                                "Config saved without compiler changes; other sections apply on restart"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                path = %path.display(),
                                error = %e,
                                "Failed to reload config, keeping current settings"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), dir = %dir.display(), "Config watcher started");
        Ok(watcher)
    }
}
