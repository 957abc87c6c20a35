//! Completion certificates
//!
//! Issued only from the quiz pass path when it carries a course to 100% for
//! the first time. A course finished purely by watching reaches 100% without
//! a certificate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const PLACEHOLDER_NAME: &str = "Learner";

/// Identity data as supplied by the identity collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerIdentity {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl LearnerIdentity {
    /// first + last, then whichever exists, then a placeholder
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let last = self.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty());

        match (first, last) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => PLACEHOLDER_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub course_id: String,
    pub course_title: String,
    pub learner_name: String,
    pub score: u8,
    pub issued_at: DateTime<Utc>,
}

impl Certificate {
    pub fn issue(course_id: &str, course_title: &str, identity: &LearnerIdentity, score: u8) -> Self {
        let certificate = Self {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            course_title: course_title.to_string(),
            learner_name: identity.display_name(),
            score,
            issued_at: Utc::now(),
        };
        info!(
            "Issued certificate {} for course {} to {}",
            certificate.id, course_id, certificate.learner_name
        );
        certificate
    }

    /// One-line text for share sheets
    pub fn summary(&self) -> String {
        format!(
            "{} completed \"{}\" with a score of {}% on {}",
            self.learner_name,
            self.course_title,
            self.score,
            self.issued_at.format("%Y-%m-%d")
        )
    }
}
