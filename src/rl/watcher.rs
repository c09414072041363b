//! Model directory watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::rl::model::{ModelStore, ACTION_MAPPINGS_FILE, Q_TABLE_FILE};

/// Reloads the model when one of its files changes.
pub struct ModelWatcher {
    store: Arc<ModelStore>,
}

impl ModelWatcher {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    /// Start watching the model directory.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<Option<RecommendedWatcher>, notify::Error> {
        let Some(dir) = self.store.dir().map(Path::to_path_buf) else {
            return Ok(None);
        };
        let store = self.store.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| is_model_file(p))
                    {
                        tracing::info!("Model file change detected, reloading...");
                        // Errors are logged and kept by the store.
                        let _ = store.reload();
                    }
                }
                Err(e) => tracing::error!("Model watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?dir, "Model watcher started");
        Ok(Some(watcher))
    }
}

fn is_model_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(ACTION_MAPPINGS_FILE) | Some(Q_TABLE_FILE)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_model_files_trigger_reload() {
        assert!(is_model_file(Path::new("/models/q_table.json")));
        assert!(is_model_file(Path::new("action_mappings.json")));
        assert!(!is_model_file(Path::new("/models/notes.txt")));
        assert!(!is_model_file(Path::new("/models")));
    }

    #[test]
    fn no_directory_means_no_watcher() {
        let watcher = ModelWatcher::new(Arc::new(ModelStore::new(None)));
        assert!(watcher.run().unwrap().is_none());
    }
}
