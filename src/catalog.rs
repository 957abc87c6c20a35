//! Course catalog supplied by the content collaborator
//!
//! Read-only from the engine's point of view. A remote catalog is merged over
//! a static fallback set so the engine can still gate lessons offline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::quiz::Quiz;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Seconds; usually unknown until the player reports media metadata
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub quiz: Option<Quiz>,
}

/// How a lesson gates its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Quiz,
    Watch,
}

impl Lesson {
    pub fn gate_kind(&self) -> GateKind {
        if self.quiz.is_some() {
            GateKind::Quiz
        } else {
            GateKind::Watch
        }
    }
}

impl Course {
    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == lesson_id)
    }

    pub fn lesson_index(&self, lesson_id: &str) -> Option<usize> {
        self.lessons.iter().position(|l| l.id == lesson_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub courses: Vec<Course>,
}

impl Catalog {
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }

    /// Load a catalog from a JSON file (`{"courses": [...]}`)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog from {:?}", path))?;
        let catalog: Catalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog {:?}", path))?;
        info!("Loaded {} courses from {:?}", catalog.courses.len(), path);
        Ok(catalog)
    }

    /// Merge a remote catalog over the static fallback set.
    ///
    /// Remote courses win by id; fallback courses missing remotely are
    /// appended in their original order.
    pub fn merge(remote: Catalog, fallback: Catalog) -> Catalog {
        let remote_ids: HashSet<String> = remote.courses.iter().map(|c| c.id.clone()).collect();
        let mut courses = remote.courses;

        for course in fallback.courses {
            if remote_ids.contains(&course.id) {
                debug!("Remote catalog overrides fallback course {}", course.id);
                continue;
            }
            courses.push(course);
        }

        Catalog { courses }
    }

    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == course_id)
    }

    /// Find the course that contains a lesson
    pub fn course_for_lesson(&self, lesson_id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.lesson(lesson_id).is_some())
    }
}
