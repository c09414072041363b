//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::BalancerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override and validate configuration from a TOML file.
///
/// A missing file is only accepted when `path` is `None`; then the built-in
/// defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<BalancerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => BalancerConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `LB_*` environment overrides on top of the file values.
pub fn apply_env_overrides<F>(config: &mut BalancerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LB_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("LB_ROUTING_STRATEGY") {
        config.routing.strategy = v;
    }
    if let Some(v) = lookup("LB_REDIS_URL") {
        config.discovery.redis_url = v;
    }
    if let Some(v) = lookup("LB_RL_API_URL") {
        config.rl_remote.base_url = v;
    }
    if let Some(v) = lookup("LB_MODEL_DIR") {
        config.rl_static.model_dir = Some(v);
    }
    if let Some(v) = lookup("LB_ADMIN_API_KEY") {
        config.admin.api_key = Some(v);
    }
    if let Some(v) = lookup("LB_COLLECTOR_ENABLED") {
        match v.trim().parse::<bool>() {
            Ok(enabled) => config.collector.enabled = enabled,
            Err(_) => tracing::warn!(value = %v, "Ignoring non-boolean LB_COLLECTOR_ENABLED"),
        }
    }
    if let Some(v) = lookup("LB_COLLECTOR_URL") {
        config.collector.endpoint_url = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_win_over_file() {
        let mut config: BalancerConfig = toml::from_str(
            r#"
            [routing]
            strategy = "round-robin"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("LB_ROUTING_STRATEGY", "rl-based"),
            ("LB_RL_API_URL", "http://rl:9000"),
            ("LB_MODEL_DIR", "/models"),
            ("LB_COLLECTOR_ENABLED", "true"),
            ("LB_COLLECTOR_URL", "http://collector:8000"),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.routing.strategy, "rl-based");
        assert_eq!(config.rl_remote.base_url, "http://rl:9000");
        assert_eq!(config.rl_static.model_dir.as_deref(), Some("/models"));
        assert_eq!(config.discovery.redis_url, "redis://127.0.0.1:6379");
        assert!(config.collector.enabled);
        assert_eq!(config.collector.endpoint_url, "http://collector:8000");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "a",
                message: "bad".into(),
            },
            ValidationError {
                field: "b",
                message: "worse".into(),
            },
        ]);
        assert_eq!(err.to_string(), "Validation failed: a: bad, b: worse");
    }
}
