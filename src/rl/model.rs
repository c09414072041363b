//! Static RL model: action mappings and Q-table loaded from disk.
//!
//! # Layout
//! ```text
//! <model_dir>/action_mappings.json   {"<instanceId>": <action index>, ...}   (required, non-empty)
//! <model_dir>/q_table.json           {"<state>": {"<instanceId>": q, ...}}  (optional)
//! ```
//!
//! Q-table entries may also be keyed by action index (`"0"`, `"1"`, ...), as
//! offline training writes them; those are resolved to instance ids through
//! the action mappings when the model is built.
//!
//! Readers never block on reload: the loaded model is swapped atomically.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::instance::unix_millis;

pub const ACTION_MAPPINGS_FILE: &str = "action_mappings.json";
pub const Q_TABLE_FILE: &str = "q_table.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no model directory configured")]
    NotConfigured,
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("action mappings in {} are empty", .0.display())]
    EmptyActions(PathBuf),
}

/// A loaded decision table.
#[derive(Debug, Clone)]
pub struct RlModel {
    actions: BTreeMap<String, u32>,
    q_table: HashMap<String, BTreeMap<String, f64>>,
    loaded_at_ms: u64,
}

impl RlModel {
    pub fn new(
        actions: BTreeMap<String, u32>,
        q_table: HashMap<String, BTreeMap<String, f64>>,
    ) -> Self {
        let by_index: HashMap<u32, &str> = actions
            .iter()
            .map(|(pod, index)| (*index, pod.as_str()))
            .collect();
        let q_table = q_table
            .into_iter()
            .map(|(state, values)| {
                let values = values
                    .into_iter()
                    .map(|(action, q)| (resolve_action(&actions, &by_index, action), q))
                    .collect();
                (state, values)
            })
            .collect();

        Self {
            actions,
            q_table,
            loaded_at_ms: unix_millis(),
        }
    }

    /// Load a model from `dir`.
    ///
    /// A missing or unreadable Q-table yields an empty table with a warning;
    /// action mappings are mandatory.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let actions_path = dir.join(ACTION_MAPPINGS_FILE);
        let raw = fs::read_to_string(&actions_path).map_err(|source| ModelError::Io {
            path: actions_path.clone(),
            source,
        })?;
        let actions: BTreeMap<String, u32> =
            serde_json::from_str(&raw).map_err(|source| ModelError::Parse {
                path: actions_path.clone(),
                source,
            })?;
        if actions.is_empty() {
            return Err(ModelError::EmptyActions(actions_path));
        }

        let q_path = dir.join(Q_TABLE_FILE);
        let q_table = match fs::read_to_string(&q_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %q_path.display(), error = %e, "Invalid Q-table, using empty table");
                HashMap::new()
            }),
            Err(e) => {
                tracing::warn!(path = %q_path.display(), error = %e, "Q-table not found, using empty table");
                HashMap::new()
            }
        };

        Ok(Self::new(actions, q_table))
    }

    /// Highest-valued instance for `state` among those accepted by `allowed`.
    pub fn best_instance<F>(&self, state: &str, allowed: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        self.q_table
            .get(state)?
            .iter()
            .filter(|(pod, _)| allowed(pod))
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(pod, _)| pod.as_str())
    }

    pub fn available_instances(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn state_count(&self) -> usize {
        self.q_table.len()
    }
}

/// Instance id for a Q-table action key. Known instance ids win over indices.
fn resolve_action(
    actions: &BTreeMap<String, u32>,
    by_index: &HashMap<u32, &str>,
    action: String,
) -> String {
    if actions.contains_key(&action) {
        return action;
    }
    match action.parse::<u32>().ok().and_then(|i| by_index.get(&i)) {
        Some(pod) => (*pod).to_string(),
        None => action,
    }
}

/// Model statistics for `/rl/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub enabled: bool,
    pub loaded: bool,
    pub error: Option<String>,
    pub action_mappings_size: usize,
    pub q_table_size: usize,
    pub available_pods: Vec<String>,
    pub loaded_at: Option<u64>,
}

/// Holder of the current model, swapped atomically on reload.
pub struct ModelStore {
    dir: Option<PathBuf>,
    current: ArcSwapOption<RlModel>,
    last_error: ArcSwapOption<String>,
}

impl ModelStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            current: ArcSwapOption::empty(),
            last_error: ArcSwapOption::empty(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Load or reload from the model directory.
    ///
    /// On failure the previous model, if any, stays in service and the
    /// error is kept for introspection.
    pub fn reload(&self) -> Result<Arc<RlModel>, ModelError> {
        let result = match &self.dir {
            Some(dir) => RlModel::load(dir),
            None => Err(ModelError::NotConfigured),
        };

        match result {
            Ok(model) => {
                let model = Arc::new(model);
                tracing::info!(
                    actions = model.action_count(),
                    states = model.state_count(),
                    "RL model loaded"
                );
                self.current.store(Some(model.clone()));
                self.last_error.store(None);
                Ok(model)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load RL model");
                self.last_error.store(Some(Arc::new(e.to_string())));
                Err(e)
            }
        }
    }

    /// Install a model directly.
    pub fn install(&self, model: RlModel) {
        self.current.store(Some(Arc::new(model)));
        self.last_error.store(None);
    }

    pub fn current(&self) -> Option<Arc<RlModel>> {
        self.current.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.load_full().map(|e| e.as_ref().clone())
    }

    pub fn stats(&self) -> ModelStats {
        let model = self.current();
        ModelStats {
            enabled: self.dir.is_some(),
            loaded: model.is_some(),
            error: self.last_error(),
            action_mappings_size: model.as_ref().map_or(0, |m| m.action_count()),
            q_table_size: model.as_ref().map_or(0, |m| m.state_count()),
            available_pods: model
                .as_ref()
                .map(|m| m.available_instances())
                .unwrap_or_default(),
            loaded_at: model.as_ref().map(|m| m.loaded_at_ms),
        }
    }
}
