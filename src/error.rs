//! Error types for the progress engine
//!
//! Most failure modes here are recovered locally (a corrupt blob is dropped,
//! a mirror write is logged and forgotten). The variants below are the ones
//! that reach a caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A persisted blob could not be parsed. Callers normally never see this;
    /// the store discards the key and continues with a default.
    #[error("persisted blob at key '{key}' is corrupt: {reason}")]
    StorageCorruption { key: String, reason: String },

    /// Read or write against the remote progress mirror failed
    #[error("remote progress sync failed: {0}")]
    RemoteSync(String),

    /// Zero, negative or non-finite media duration
    #[error("invalid media metadata for lesson '{lesson_id}': duration {duration}")]
    InvalidMediaMetadata { lesson_id: String, duration: f64 },

    #[error("unknown course '{0}'")]
    UnknownCourse(String),

    #[error("unknown lesson '{lesson_id}' in course '{course_id}'")]
    UnknownLesson { course_id: String, lesson_id: String },

    #[error("lesson '{0}' has no quiz")]
    NoQuiz(String),

    #[error("quiz for lesson '{0}' has no questions")]
    EmptyQuiz(String),

    #[error("lesson '{0}' is locked")]
    LessonLocked(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
