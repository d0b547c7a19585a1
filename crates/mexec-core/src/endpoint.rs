use std::env;

use crate::ChannelId;

/// Base URL of the local machine-exec service.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:4444";

/// Environment variable overriding [`DEFAULT_ENDPOINT`].
pub const ENDPOINT_ENV: &str = "MEXEC_ENDPOINT";

/// Path of the control channel.
pub const CONNECT_PATH: &str = "/connect";

/// Base address of a machine-exec service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    /// Creates an endpoint from a base URL such as `ws://127.0.0.1:4444`.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// URL of the control channel.
    pub fn connect_url(&self) -> String {
        format!("{}{CONNECT_PATH}", self.base)
    }

    /// Path of the data channel for an assigned exec.
    pub fn attach_path(channel_id: ChannelId) -> String {
        format!("/attach/{channel_id}")
    }

    /// URL of the data channel for an assigned exec.
    pub fn attach_url(&self, channel_id: ChannelId) -> String {
        format!("{}{}", self.base, Self::attach_path(channel_id))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Resolves the service endpoint from environment and built-in defaults.
pub fn default_endpoint() -> Endpoint {
    match env::var(ENDPOINT_ENV) {
        Ok(value) if !value.trim().is_empty() => Endpoint::new(value.trim()),
        _ => Endpoint::default(),
    }
}
