//! Reminder notifications derived from a progress snapshot

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::Course;
use crate::config::NotificationConfig;
use crate::progress::CourseProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewCourse,
    IncompleteCourse,
    InactiveCourse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub course_id: String,
    pub message: String,
}

/// Derive reminders for every course.
///
/// Pure: the output depends only on the arguments. The incomplete and
/// inactive checks are independent, so one course can produce both.
pub fn generate(
    courses: &[Course],
    progress: &HashMap<String, CourseProgress>,
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> Vec<Notification> {
    let mut out = Vec::new();
    let inactive_after = Duration::days(config.inactive_after_days);

    for course in courses {
        let Some(p) = progress.get(&course.id) else {
            out.push(Notification {
                kind: NotificationKind::NewCourse,
                course_id: course.id.clone(),
                message: format!("New course available: {}", course.title),
            });
            continue;
        };

        if p.is_completed() {
            continue;
        }

        if p.percentage >= config.incomplete_min_percent && p.percentage < 100 {
            out.push(Notification {
                kind: NotificationKind::IncompleteCourse,
                course_id: course.id.clone(),
                message: format!(
                    "You're {}% through {}. Keep going!",
                    p.percentage, course.title
                ),
            });
        }

        if now - p.last_accessed > inactive_after {
            out.push(Notification {
                kind: NotificationKind::InactiveCourse,
                course_id: course.id.clone(),
                message: format!(
                    "You haven't opened {} in {} days",
                    course.title,
                    (now - p.last_accessed).num_days()
                ),
            });
        }
    }

    out
}
