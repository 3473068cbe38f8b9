//! Plugin directory watching using notify-debouncer-full.

use crate::core::Result;
use crate::plugin::manifest::is_candidate_module;
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted by the plugin watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A module file appeared
    Created(PathBuf),
    /// A module file changed
    Modified(PathBuf),
}

impl WatchEvent {
    /// Path of the affected module.
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) => path,
        }
    }
}

/// Map one path of a filesystem event to a watch event.
///
/// Renames report both the old and new name; only paths that still exist
/// are forwarded. Removals keep the last loaded version.
fn classify(kind: &EventKind, path: &Path) -> Option<WatchEvent> {
    if !is_candidate_module(path) {
        return None;
    }
    match kind {
        EventKind::Remove(_) => {
            debug!(path = %path.display(), "module removed, keeping last loaded version");
            None
        }
        EventKind::Create(_) | EventKind::Modify(_) if !path.exists() => {
            debug!(path = %path.display(), "module path no longer exists, ignoring");
            None
        }
        EventKind::Create(_) => Some(WatchEvent::Created(path.to_path_buf())),
        EventKind::Modify(_) => Some(WatchEvent::Modified(path.to_path_buf())),
        _ => None,
    }
}

/// Watches the plugin directory for module changes with debouncing.
pub struct PluginWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl PluginWatcher {
    /// Start watching `dir`. Returns the watcher and a receiver for events.
    ///
    /// Dropping the watcher stops the watch and closes the receiver.
    pub fn start(
        dir: &Path,
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for path in &event.paths {
                            let Some(watch_event) = classify(&event.kind, path) else {
                                continue;
                            };

                            debug!(path = %path.display(), "plugin watcher event");
                            if tx.send(watch_event).is_err() {
                                return; // receiver dropped
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "plugin watcher error");
                    }
                }
            }
        })?;

        debouncer.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "watching plugin directory");

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}
