use ulid::Ulid;

use crate::model::Day;

/// Coarse classification used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something it never should have.
    Invalid,
    /// A clean "no": the room is taken.
    Rejected,
    /// Storage or lock failure; nothing was committed.
    Infrastructure,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidInterval { from: Day, until: Day },
    LimitExceeded(&'static str),
    RoomNotAvailable(Ulid),
    RoomNotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateId(Ulid),
    LockTimeout(Ulid),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInterval { .. } | EngineError::LimitExceeded(_) => {
                ErrorKind::Invalid
            }
            EngineError::RoomNotAvailable(_) => ErrorKind::Rejected,
            EngineError::RoomNotFound(_)
            | EngineError::AlreadyExists(_)
            | EngineError::DuplicateId(_)
            | EngineError::LockTimeout(_)
            | EngineError::WalError(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.kind() == ErrorKind::Rejected
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { from, until } => {
                write!(f, "invalid interval [{from}, {until}): start must be before end")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::RoomNotAvailable(id) => write!(f, "room not available: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateId(id) => write!(f, "duplicate reservation id: {id}"),
            EngineError::LockTimeout(id) => write!(f, "timed out waiting for lock on room {id}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
