//! Playback telemetry tracking
//!
//! Turns coalesced player samples into playback state: the furthest
//! position per lesson, the known duration, and the watched latches. The
//! first time a lesson's watched flag flips, `apply` reports a
//! `CompletionAchieved`; every later sample for that lesson reports nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod coalescer;

pub use coalescer::{spawn_coalescer, Coalescer};

use crate::completion::CompletionRule;
use crate::error::Result;
use crate::store::ProgressStore;

/// One player event, as read from the telemetry stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    Position { lesson_id: String, position: f64 },
    Duration { lesson_id: String, duration: f64 },
    Ended { lesson_id: String },
}

impl Sample {
    pub fn lesson_id(&self) -> &str {
        match self {
            Sample::Position { lesson_id, .. }
            | Sample::Duration { lesson_id, .. }
            | Sample::Ended { lesson_id } => lesson_id,
        }
    }
}

/// Transition emitted once per lesson
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionAchieved {
    pub lesson_id: String,
}

pub struct TelemetryTracker {
    rule: CompletionRule,
}

impl TelemetryTracker {
    pub fn new(rule: CompletionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &CompletionRule {
        &self.rule
    }

    /// Apply one (already coalesced) sample to the store
    pub fn apply(&self, store: &mut ProgressStore, sample: &Sample) -> Result<Option<CompletionAchieved>> {
        let lesson_id = sample.lesson_id();
        match sample {
            Sample::Position { position, .. } => {
                if store.merge_position(lesson_id, *position)? {
                    debug!("Lesson {} position now {:.1}s", lesson_id, store.position(lesson_id));
                }
            }
            Sample::Duration { duration, .. } => {
                store.set_duration(lesson_id, *duration)?;
            }
            Sample::Ended { .. } => match store.duration(lesson_id) {
                Some(duration) => {
                    store.merge_position(lesson_id, duration)?;
                }
                None => debug!("Lesson {} ended before metadata loaded", lesson_id),
            },
        }

        self.evaluate(store, lesson_id)
    }

    fn evaluate(&self, store: &mut ProgressStore, lesson_id: &str) -> Result<Option<CompletionAchieved>> {
        let position = store.position(lesson_id);
        let duration = store.duration(lesson_id);

        let Some(done) = self.rule.evaluate(position, duration) else {
            debug!("Completion for lesson {} deferred until duration is known", lesson_id);
            return Ok(None);
        };

        if let Some(d) = duration {
            store.merge_min_watch(lesson_id, self.rule.meets_minimum_watch(position, d))?;
        }

        if store.merge_watched(lesson_id, done)? {
            info!("Lesson {} watched ({:.0}s)", lesson_id, position);
            return Ok(Some(CompletionAchieved { lesson_id: lesson_id.to_string() }));
        }
        Ok(None)
    }

    /// Cold-start check over persisted positions.
    ///
    /// Flags can only move up: a lesson already marked watched stays watched
    /// even if its stored position no longer qualifies.
    pub fn revalidate(&self, store: &mut ProgressStore) -> Result<Vec<CompletionAchieved>> {
        let mut lessons: Vec<String> = store.state().positions.keys().cloned().collect();
        lessons.sort();

        let mut achieved = Vec::new();
        for lesson_id in lessons {
            if store.is_watched(&lesson_id) {
                continue;
            }
            if let Some(done) = self.evaluate(store, &lesson_id)? {
                achieved.push(done);
            }
        }
        Ok(achieved)
    }
}
