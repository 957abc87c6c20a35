//! Per-course progress and local/remote reconciliation
//!
//! `percentage` is always derived from the completed-lesson set; the stored
//! value is a cache for readers that do not have the catalog at hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::quiz::percent;
use crate::store::merge;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: String,
    #[serde(default)]
    pub completed_lessons: BTreeSet<String>,
    #[serde(default)]
    pub quiz_scores: BTreeMap<String, u8>,
    #[serde(default)]
    pub percentage: u8,
    pub started_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Set once on the first transition to 100%, never cleared
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    pub fn new(course_id: &str) -> Self {
        Self::started_at(course_id, Utc::now())
    }

    pub fn started_at(course_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            course_id: course_id.to_string(),
            completed_lessons: BTreeSet::new(),
            quiz_scores: BTreeMap::new(),
            percentage: 0,
            started_at: now,
            last_accessed: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn recompute_percentage(&mut self, lesson_count: usize) {
        self.percentage = percent(self.completed_lessons.len(), lesson_count);
    }

    /// Union a lesson into the completed set and recompute.
    ///
    /// Returns true when this call is the course's completion transition.
    pub fn complete_lesson(&mut self, lesson_id: &str, lesson_count: usize) -> bool {
        merge::union(&mut self.completed_lessons, [lesson_id.to_string()]);
        self.recompute_percentage(lesson_count);
        self.mark_completed_if_full(Utc::now())
    }

    /// Stamp `completed_at` the first time the course reaches 100%
    fn mark_completed_if_full(&mut self, now: DateTime<Utc>) -> bool {
        if self.percentage >= 100 && self.completed_at.is_none() {
            self.completed_at = Some(now);
            info!("Course {} completed", self.course_id);
            return true;
        }
        false
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }
}

/// Progress record as exchanged with the remote mirror. Every field except
/// the course id is optional so partial remote rows merge cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteProgress {
    pub course_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    #[serde(default)]
    pub quiz_scores: BTreeMap<String, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&CourseProgress> for RemoteProgress {
    fn from(p: &CourseProgress) -> Self {
        RemoteProgress {
            course_id: p.course_id.clone(),
            percentage: Some(p.percentage),
            completed_lessons: p.completed_lessons.iter().cloned().collect(),
            quiz_scores: p.quiz_scores.clone(),
            started_at: Some(p.started_at),
            last_accessed: Some(p.last_accessed),
            completed_at: p.completed_at,
        }
    }
}

/// What a reconciliation pass changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub courses_merged: usize,
    pub courses_created: usize,
    /// Lessons the remote says are complete; their local watched flags must
    /// be forced on
    pub forced_watched: Vec<String>,
}

/// Merge remote progress rows into the local cache.
///
/// Remote values overwrite local ones for matching quiz keys, local-only keys
/// survive, completed sets union, and timestamps only move the way their
/// invariants allow (`started_at` earliest, `last_accessed` latest,
/// `completed_at` first one wins).
pub fn reconcile(
    local: &mut HashMap<String, CourseProgress>,
    remote: Vec<RemoteProgress>,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for row in remote {
        let course = catalog.course(&row.course_id);

        let incoming: Vec<String> = match course {
            Some(course) => row
                .completed_lessons
                .iter()
                .filter(|id| course.lesson(id).is_some())
                .cloned()
                .collect(),
            None => row.completed_lessons.clone(),
        };

        if local.contains_key(&row.course_id) {
            report.courses_merged += 1;
        } else {
            report.courses_created += 1;
        }
        let started = row.started_at.unwrap_or(now);
        let entry = local
            .entry(row.course_id.clone())
            .or_insert_with(|| CourseProgress::started_at(&row.course_id, started));

        let added = merge::union(&mut entry.completed_lessons, incoming.iter().cloned());
        for (lesson_id, score) in &row.quiz_scores {
            entry.quiz_scores.insert(lesson_id.clone(), *score);
        }
        if let Some(started) = row.started_at {
            if started < entry.started_at {
                entry.started_at = started;
            }
        }
        if let Some(accessed) = row.last_accessed {
            entry.touch(accessed);
        }
        if entry.completed_at.is_none() {
            entry.completed_at = row.completed_at;
        }

        match course {
            Some(course) => {
                entry.recompute_percentage(course.lessons.len());
                entry.mark_completed_if_full(now);
            }
            None => {
                if let Some(pct) = row.percentage {
                    entry.percentage = entry.percentage.max(pct);
                }
            }
        }

        debug!(
            "Reconciled course {}: {} lessons added from remote, now {}%",
            row.course_id, added, entry.percentage
        );
        report.forced_watched.extend(incoming);
    }

    report
}
