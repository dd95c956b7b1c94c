//! Error types shared by all TaskPing crates.

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, TaskPingError>;

/// All failure modes the reminder system distinguishes.
#[derive(Debug, thiserror::Error)]
pub enum TaskPingError {
    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    /// Task store read/write failure.
    #[error("store error: {0}")]
    Store(String),

    /// Delivery channel failure (Telegram, webhook).
    #[error("channel error: {0}")]
    Channel(String),

    /// Serialization failure (JSON columns, config).
    #[error("serialization error: {0}")]
    Serde(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
