use crate::config_manager::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single Remote Account Directory call.
///
/// These never abort a traversal on their own: the engine records them
/// against the branch that issued the call and moves on to its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Account not found or inaccessible: {0}")]
    NotFound(String),
}

impl DirectoryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DirectoryError::Unavailable(_) => FailureKind::Unavailable,
            DirectoryError::NotFound(_) => FailureKind::NotFound,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DirectoryError::Unavailable(msg) | DirectoryError::NotFound(msg) => msg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Unavailable,
    NotFound,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Unavailable => write!(f, "unavailable"),
            FailureKind::NotFound => write!(f, "not found"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Setup failure: {0}")]
    SetupFailure(String),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HierarchyError>;

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;
