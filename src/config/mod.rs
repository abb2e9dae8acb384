//! Dispatcher configuration.

use serde::Deserialize;

/// Largest request body the dispatcher will buffer by default (8 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Settings for a [`Dispatcher`](crate::dispatcher::Dispatcher).
///
/// Deserializable so it can sit inside an application's own config file; missing
/// keys fall back to their defaults.
///
/// ```rust
/// use muzu::config::DispatcherConfig;
///
/// let config: DispatcherConfig = serde_json::from_str(r#"{ "max_body_size": 1024 }"#).unwrap();
/// assert_eq!(config.max_body_size, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Bodies longer than this are rejected with 413 before parsing.
    pub max_body_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}
