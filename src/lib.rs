//! coursegate - learner progress and lesson gating for video courses
//!
//! Decides from playback telemetry when a lesson counts as watched, gates
//! each lesson on its predecessor, grades one-shot quizzes, issues
//! certificates and keeps a local-first progress store mirrored to a remote
//! copy on a best-effort basis.

pub mod catalog;
pub mod certificate;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod integrity;
pub mod notifications;
pub mod progress;
pub mod quiz;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use catalog::{Catalog, Course, Lesson};
pub use config::Config;
pub use engine::LearnerEngine;
pub use error::{EngineError, Result};
pub use store::{ProgressStore, SqliteAdapter};
