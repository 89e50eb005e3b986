use thiserror::Error;

use crate::path::PathError;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    PathTraversal(#[from] PathError),

    #[error("preview unavailable: {0}")]
    SyncUnavailable(String),

    #[error("a generation request is already in flight")]
    Busy,

    #[error("generation service failed: {0}")]
    GenerationFailed(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedResponse,
    PathTraversal,
    SyncUnavailable,
    Busy,
    Generation,
    Persistence,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::MalformedResponse => "malformed-response",
            Self::PathTraversal => "path-traversal",
            Self::SyncUnavailable => "sync-unavailable",
            Self::Busy => "busy",
            Self::Generation => "generation",
            Self::Persistence => "persistence",
        }
    }
}

impl WorkspaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::PathTraversal(_) => ErrorKind::PathTraversal,
            Self::SyncUnavailable(_) => ErrorKind::SyncUnavailable,
            Self::Busy => ErrorKind::Busy,
            Self::GenerationFailed(_) => ErrorKind::Generation,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}
