//! Learner state store
//!
//! One `ProgressStore` holds everything the engine persists for a learner:
//! playback positions, watch latches, course progress, certificates and the
//! integrity log. Reads go through getters, writes through the merge helpers
//! in [`merge`], and every change is broadcast to subscribers.
//!
//! Each key is loaded independently. A blob that fails to parse is logged,
//! dropped, and replaced with an empty default so one bad key never blocks
//! the rest of the state from loading.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod merge;
pub mod sqlite;

pub use sqlite::SqliteAdapter;

use crate::certificate::Certificate;
use crate::error::{EngineError, Result};
use crate::integrity::IntegrityEvent;
use crate::progress::CourseProgress;

/// Persisted blob keys
pub mod keys {
    pub const WATCHED_LESSONS: &str = "watched_lessons";
    pub const WATCHED_POSITIONS: &str = "watched_positions";
    pub const LESSON_DURATIONS: &str = "lesson_durations";
    pub const MIN_WATCH_TIME: &str = "min_watch_time";
    pub const COURSE_PROGRESS: &str = "course_progress";
    pub const CERTIFICATES: &str = "certificates";
    pub const INTEGRITY_LOG: &str = "integrity_log";

    pub const ALL: [&str; 7] = [
        WATCHED_LESSONS,
        WATCHED_POSITIONS,
        LESSON_DURATIONS,
        MIN_WATCH_TIME,
        COURSE_PROGRESS,
        CERTIFICATES,
        INTEGRITY_LOG,
    ];
}

/// Keyed blob persistence
pub trait PersistenceAdapter: Send {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Volatile adapter for tests and local-only previews
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    blobs: HashMap<String, String>,
}

impl MemoryAdapter {
    pub fn with_blob(mut self, key: &str, value: &str) -> Self {
        self.blobs.insert(key.to_string(), value.to_string());
        self
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// How a course reached 100%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPath {
    Quiz,
    Watch,
    Sync,
}

/// Change notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A lesson's watched-completion latch flipped on
    CompletionAchieved { lesson_id: String },
    LessonCompleted { course_id: String, lesson_id: String },
    ProgressChanged { course_id: String, percentage: u8 },
    CourseCompleted { course_id: String, via: CompletionPath },
    CertificateIssued { course_id: String, certificate_id: String },
    IntegrityFlagged { reason: String },
    Reset,
}

/// In-memory view of everything persisted for the learner
#[derive(Debug, Default, Clone)]
pub struct LearnerState {
    pub watched: HashMap<String, bool>,
    pub positions: HashMap<String, f64>,
    pub durations: HashMap<String, f64>,
    pub min_watch: HashMap<String, bool>,
    pub courses: HashMap<String, CourseProgress>,
    pub certificates: Vec<Certificate>,
    pub integrity_log: Vec<IntegrityEvent>,
}

pub struct ProgressStore {
    adapter: Box<dyn PersistenceAdapter>,
    state: LearnerState,
    events: broadcast::Sender<StoreEvent>,
}

impl ProgressStore {
    /// Load every key from the adapter, recovering from corrupt blobs
    pub fn open(adapter: Box<dyn PersistenceAdapter>) -> Result<Self> {
        let mut adapter = adapter;
        let state = LearnerState {
            watched: load_key(adapter.as_mut(), keys::WATCHED_LESSONS)?,
            positions: load_key(adapter.as_mut(), keys::WATCHED_POSITIONS)?,
            durations: load_key(adapter.as_mut(), keys::LESSON_DURATIONS)?,
            min_watch: load_key(adapter.as_mut(), keys::MIN_WATCH_TIME)?,
            courses: load_key(adapter.as_mut(), keys::COURSE_PROGRESS)?,
            certificates: load_key(adapter.as_mut(), keys::CERTIFICATES)?,
            integrity_log: load_key(adapter.as_mut(), keys::INTEGRITY_LOG)?,
        };

        info!(
            "Loaded learner state: {} lessons tracked, {} courses, {} certificates",
            state.positions.len(),
            state.courses.len(),
            state.certificates.len()
        );

        let (events, _) = broadcast::channel(64);
        Ok(Self { adapter, state, events })
    }

    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            adapter: Box::new(MemoryAdapter::default()),
            state: LearnerState::default(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn state(&self) -> &LearnerState {
        &self.state
    }

    pub fn position(&self, lesson_id: &str) -> f64 {
        self.state.positions.get(lesson_id).copied().unwrap_or(0.0)
    }

    pub fn duration(&self, lesson_id: &str) -> Option<f64> {
        self.state.durations.get(lesson_id).copied()
    }

    pub fn is_watched(&self, lesson_id: &str) -> bool {
        self.state.watched.get(lesson_id).copied().unwrap_or(false)
    }

    pub fn min_watch_met(&self, lesson_id: &str) -> bool {
        self.state.min_watch.get(lesson_id).copied().unwrap_or(false)
    }

    pub fn course(&self, course_id: &str) -> Option<&CourseProgress> {
        self.state.courses.get(course_id)
    }

    pub fn courses(&self) -> &HashMap<String, CourseProgress> {
        &self.state.courses
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.state.certificates
    }

    pub fn integrity_log(&self) -> &[IntegrityEvent] {
        &self.state.integrity_log
    }

    /// Max-merge a position. Returns true if the stored value grew.
    pub fn merge_position(&mut self, lesson_id: &str, position: f64) -> Result<bool> {
        let grew = merge::max_merge(&mut self.state.positions, lesson_id.to_string(), position);
        if grew {
            persist(self.adapter.as_mut(), keys::WATCHED_POSITIONS, &self.state.positions)?;
        }
        Ok(grew)
    }

    /// OR-merge the watched latch. Returns true on the false -> true flip.
    pub fn merge_watched(&mut self, lesson_id: &str, watched: bool) -> Result<bool> {
        let flipped = merge::or_merge(&mut self.state.watched, lesson_id.to_string(), watched);
        if flipped {
            persist(self.adapter.as_mut(), keys::WATCHED_LESSONS, &self.state.watched)?;
            self.publish(StoreEvent::CompletionAchieved { lesson_id: lesson_id.to_string() });
        }
        Ok(flipped)
    }

    pub fn merge_min_watch(&mut self, lesson_id: &str, met: bool) -> Result<bool> {
        let flipped = merge::or_merge(&mut self.state.min_watch, lesson_id.to_string(), met);
        if flipped {
            persist(self.adapter.as_mut(), keys::MIN_WATCH_TIME, &self.state.min_watch)?;
        }
        Ok(flipped)
    }

    pub fn set_duration(&mut self, lesson_id: &str, duration: f64) -> Result<()> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::InvalidMediaMetadata {
                lesson_id: lesson_id.to_string(),
                duration,
            });
        }
        let previous = self.state.durations.insert(lesson_id.to_string(), duration);
        if previous != Some(duration) {
            persist(self.adapter.as_mut(), keys::LESSON_DURATIONS, &self.state.durations)?;
        }
        Ok(())
    }

    /// Apply `f` to a course's progress (created on first use) and persist
    pub fn update_course<R>(
        &mut self,
        course_id: &str,
        f: impl FnOnce(&mut CourseProgress) -> R,
    ) -> Result<R> {
        let progress = self
            .state
            .courses
            .entry(course_id.to_string())
            .or_insert_with(|| CourseProgress::new(course_id));

        let before = progress.percentage;
        let result = f(progress);
        let after = progress.percentage;

        persist(self.adapter.as_mut(), keys::COURSE_PROGRESS, &self.state.courses)?;
        if before != after {
            self.publish(StoreEvent::ProgressChanged {
                course_id: course_id.to_string(),
                percentage: after,
            });
        }
        Ok(result)
    }

    /// Replace the course map wholesale after reconciliation
    pub fn replace_courses(&mut self, courses: HashMap<String, CourseProgress>) -> Result<()> {
        self.state.courses = courses;
        persist(self.adapter.as_mut(), keys::COURSE_PROGRESS, &self.state.courses)
    }

    pub fn append_certificate(&mut self, certificate: Certificate) -> Result<()> {
        let event = StoreEvent::CertificateIssued {
            course_id: certificate.course_id.clone(),
            certificate_id: certificate.id.clone(),
        };
        self.state.certificates.push(certificate);
        persist(self.adapter.as_mut(), keys::CERTIFICATES, &self.state.certificates)?;
        self.publish(event);
        Ok(())
    }

    pub fn append_integrity_event(&mut self, event: IntegrityEvent) -> Result<()> {
        let reason = event.reason.clone();
        self.state.integrity_log.push(event);
        persist(self.adapter.as_mut(), keys::INTEGRITY_LOG, &self.state.integrity_log)?;
        self.publish(StoreEvent::IntegrityFlagged { reason });
        Ok(())
    }

    /// Explicit data reset: playback state and course progress are dropped.
    /// Certificates and the integrity log are append-only and survive.
    pub fn reset(&mut self) -> Result<()> {
        for key in [
            keys::WATCHED_LESSONS,
            keys::WATCHED_POSITIONS,
            keys::LESSON_DURATIONS,
            keys::MIN_WATCH_TIME,
            keys::COURSE_PROGRESS,
        ] {
            self.adapter.remove(key)?;
        }

        let certificates = std::mem::take(&mut self.state.certificates);
        let integrity_log = std::mem::take(&mut self.state.integrity_log);
        self.state = LearnerState {
            certificates,
            integrity_log,
            ..Default::default()
        };

        info!("Learner progress reset");
        self.publish(StoreEvent::Reset);
        Ok(())
    }

    /// Keys that currently hold a blob in the backing adapter
    pub fn stored_keys(&self) -> Result<Vec<&'static str>> {
        let mut present = Vec::new();
        for key in keys::ALL {
            if self.adapter.read(key)?.is_some() {
                present.push(key);
            }
        }
        Ok(present)
    }
}

fn persist<T: Serialize + ?Sized>(
    adapter: &mut dyn PersistenceAdapter,
    key: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_string(value)?;
    adapter.write(key, &json)
}

/// Load and parse one key; a malformed blob is removed and defaulted
fn load_key<T: DeserializeOwned + Default>(
    adapter: &mut dyn PersistenceAdapter,
    key: &str,
) -> Result<T> {
    let raw = match adapter.read(key)? {
        Some(raw) => raw,
        None => return Ok(T::default()),
    };

    match serde_json::from_str(&raw) {
        Ok(value) => {
            debug!("Loaded key {}", key);
            Ok(value)
        }
        Err(e) => {
            let err = EngineError::StorageCorruption {
                key: key.to_string(),
                reason: e.to_string(),
            };
            warn!("{}; discarding and starting empty", err);
            adapter.remove(key)?;
            Ok(T::default())
        }
    }
}
