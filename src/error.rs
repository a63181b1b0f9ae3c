use std::path::PathBuf;

/// Errors raised while configuring, running or persisting a simulation.
#[derive(Debug, thiserror::Error)]
pub enum GlauberError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Checkpoint file not found: {}", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("Malformed checkpoint name {name:?}, expected `<prefix>-<iteration>.<ext>`")]
    MalformedCheckpointName { name: String },

    #[error("Checkpoint {} holds {found} bytes, expected at least {expected}", .path.display())]
    CheckpointTruncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Index ({row}, {col}) out of range for {nrow}x{ncol} matrix")]
    OutOfRange {
        row: isize,
        col: isize,
        nrow: usize,
        ncol: usize,
    },

    #[error("Vertex {0} is not in the active set")]
    AbsentVertex(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GlauberError>;
