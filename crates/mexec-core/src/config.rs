use std::env;

use thiserror::Error;

/// Environment variable naming the workspace that owns the target container.
pub const WORKSPACE_ID_ENV: &str = "CHE_WORKSPACE_ID";

/// Required input missing before any connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} is not defined as environment variable")]
    MissingEnv { name: &'static str },
}

/// Resolves the workspace id through `lookup`, treating blank values as missing.
pub fn workspace_id_from<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(WORKSPACE_ID_ENV) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnv {
            name: WORKSPACE_ID_ENV,
        }),
    }
}

/// Resolves the workspace id from the process environment.
pub fn workspace_id_from_env() -> Result<String, ConfigError> {
    workspace_id_from(|name| env::var(name).ok())
}
