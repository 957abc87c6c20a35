//! Watched-completion rule
//!
//! Both thresholds are measured against the furthest position reached, so
//! the minimum-watch check is implied by the completion check today. It is
//! kept as its own comparator so it can move to accumulated watch time
//! without touching callers.

use crate::config::CompletionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRule {
    pub min_watch_percent: u32,
    pub completion_percent: u32,
}

impl Default for CompletionRule {
    fn default() -> Self {
        CompletionConfig::default().into()
    }
}

impl From<CompletionConfig> for CompletionRule {
    fn from(c: CompletionConfig) -> Self {
        Self {
            min_watch_percent: c.min_watch_percent,
            completion_percent: c.completion_percent,
        }
    }
}

/// `position >= duration * percent / 100` without dividing
fn reaches(position: f64, duration: f64, percent: u32) -> bool {
    position * 100.0 >= duration * percent as f64
}

fn usable(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

impl CompletionRule {
    pub fn meets_minimum_watch(&self, position: f64, duration: f64) -> bool {
        reaches(position, duration, self.min_watch_percent)
    }

    pub fn meets_completion_threshold(&self, position: f64, duration: f64) -> bool {
        reaches(position, duration, self.completion_percent)
    }

    /// `None` while the duration is unknown or unusable
    pub fn evaluate(&self, position: f64, duration: Option<f64>) -> Option<bool> {
        let duration = duration.filter(|d| usable(*d))?;
        Some(
            self.meets_minimum_watch(position, duration)
                && self.meets_completion_threshold(position, duration),
        )
    }
}
