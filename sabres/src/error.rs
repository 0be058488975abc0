use thiserror::Error;

/// The five failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    SchemaConflict,
    NotFound,
    IllegalState,
    Storage,
}

#[derive(Error, Debug)]
pub enum SabresError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot set key {key} of class {class} to type {attempted}. Already set to type {existing}")]
    SchemaConflict {
        class: String,
        key: String,
        existing: String,
        attempted: String,
    },

    #[error("Object not found: table {class} has no object with key {id}")]
    NotFound { class: String, id: i64 },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Class {0} is not registered")]
    UnregisteredClass(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Cannot decode column {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SabresError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SabresError::Validation(_) | SabresError::UnregisteredClass(_) => ErrorKind::Validation,
            SabresError::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            SabresError::NotFound { .. } => ErrorKind::NotFound,
            SabresError::IllegalState(_) => ErrorKind::IllegalState,
            SabresError::Storage(_)
            | SabresError::Decode { .. }
            | SabresError::Io(_)
            | SabresError::Yaml(_)
            | SabresError::Json(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, SabresError>;
