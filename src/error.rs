use thiserror::Error;

/// Lifecycle errors raised by the plugin manager.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The dependency graph contains a cycle; nothing past the point of
    /// detection is initialized. Fatal to the whole batch.
    #[error("dependency cycle among plugins: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("unknown plugin class '{0}'")]
    UnknownPlugin(String),

    #[error("plugin '{0}' already instantiated")]
    AlreadyExists(String),

    /// Isolated to one module; siblings keep initializing.
    #[error("plugin '{name}' failed to initialize: {reason}")]
    InitializationFailed { name: String, reason: String },

    #[error("plugin '{name}' failed to clean up: {reason}")]
    CleanupFailed { name: String, reason: String },
}

/// Scan-path errors. Isolated per strategy inside a fan-out batch.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("market data provider error: {0}")]
    Provider(String),

    #[error("strategy '{strategy}' scan failed: {reason}")]
    Strategy { strategy: String, reason: String },

    #[error("strategy '{0}' has no live instance")]
    NotInstantiated(String),
}

impl ScanError {
    pub fn provider(err: impl std::fmt::Display) -> Self {
        Self::Provider(err.to_string())
    }
}

/// Durable-tier errors. The cache treats these as a tier being unavailable
/// and degrades to live-scan-only rather than surfacing them to readers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
