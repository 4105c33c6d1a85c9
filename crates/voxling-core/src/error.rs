use thiserror::Error;

/// Error taxonomy shared by every Voxling crate.
///
/// `Protocol` and `Upstream` are always fatal to the stage that raised
/// them; `Transport` is fatal to the stage but recoverable at the turn
/// level; `Validation` is rejected before any upstream call is made.
#[derive(Debug, Error)]
pub enum VoxlingError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream error {code}: {message}")]
    Upstream { code: u32, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VoxlingError>;
