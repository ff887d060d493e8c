use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EphemkvError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A statement touched more rows than the primary key allows.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A callback failed and the rollback that followed failed too.
    #[error("{source}; rollback also failed: {rollback}")]
    Rollback {
        source: Box<EphemkvError>,
        rollback: rusqlite::Error,
    },

    #[error("{}", join_messages(.0))]
    Multiple(Vec<EphemkvError>),

    #[error("Store is closed")]
    Closed,

    #[error("Store re-entered from inside its own transaction callback")]
    Reentrant,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EphemkvError>;

impl EphemkvError {
    /// Collapse a list of errors collected during a multi-step operation.
    ///
    /// Returns `None` when the list is empty and the single error unchanged
    /// when only one step failed.
    pub fn join(mut errors: Vec<EphemkvError>) -> Option<EphemkvError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(EphemkvError::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[EphemkvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
