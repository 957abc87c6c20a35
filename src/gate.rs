//! Lesson gating
//!
//! Lesson 0 is always open. Lesson `i` opens when lesson `i-1` is done:
//! a passing quiz score if it has a quiz, otherwise its watched latch or
//! membership in the course's completed set (progress merged in from the
//! mirror counts too).

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::{Course, Lesson};
use crate::progress::CourseProgress;
use crate::store::ProgressStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonState {
    Locked,
    Unlocked,
}

/// Does `prev` satisfy the gate for the lesson after it?
pub fn gate_satisfied(prev: &Lesson, progress: Option<&CourseProgress>, watched: bool) -> bool {
    match &prev.quiz {
        Some(quiz) => progress
            .and_then(|p| p.quiz_scores.get(&prev.id))
            .is_some_and(|score| quiz.passes(*score)),
        None => watched || progress.is_some_and(|p| p.completed_lessons.contains(&prev.id)),
    }
}

pub fn lesson_state(course: &Course, index: usize, store: &ProgressStore) -> LessonState {
    if index == 0 {
        return LessonState::Unlocked;
    }
    let Some(prev) = course.lessons.get(index - 1) else {
        return LessonState::Locked;
    };

    if gate_satisfied(prev, store.course(&course.id), store.is_watched(&prev.id)) {
        LessonState::Unlocked
    } else {
        LessonState::Locked
    }
}

pub fn lesson_states(course: &Course, store: &ProgressStore) -> Vec<LessonState> {
    (0..course.lessons.len())
        .map(|i| lesson_state(course, i, store))
        .collect()
}

/// A fired auto-advance, tagged with the lesson that scheduled it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAdvance {
    pub course_id: String,
    pub from_lesson: String,
    pub to_lesson: String,
}

/// Cancellable delayed jump to the next lesson.
///
/// At most one advance is pending. Scheduling a new one, calling `cancel`,
/// or dropping the scheduler aborts the previous timer.
pub struct AutoAdvance {
    delay: Duration,
    tx: mpsc::UnboundedSender<ScheduledAdvance>,
    pending: Option<JoinHandle<()>>,
}

impl AutoAdvance {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<ScheduledAdvance>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { delay, tx, pending: None }, rx)
    }

    /// Schedule an advance. Without a tokio runtime this does nothing.
    pub fn schedule(&mut self, advance: ScheduledAdvance) -> bool {
        self.cancel();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, skipping auto-advance to {}", advance.to_lesson);
            return false;
        };

        let tx = self.tx.clone();
        let delay = self.delay;
        debug!("Auto-advance to {} in {:?}", advance.to_lesson, delay);
        self.pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(advance);
        }));
        true
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutoAdvance {
    fn drop(&mut self) {
        self.cancel();
    }
}
