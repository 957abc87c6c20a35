//! Advisory integrity heuristics for assessments
//!
//! The monitor watches clipboard, screenshot and pacing signals while a quiz
//! is open and turns suspicious patterns into warnings. Warnings are logged
//! and recorded; they never block a submission or touch progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::IntegrityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    Screenshot,
    Paste,
    Copy,
    /// Running average while the quiz is open
    Pace,
    /// A single answer given too quickly
    AnswerPace,
    /// Average at submission time
    SubmissionPace,
}

/// Raw signals reported by the assessment view
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// Screenshot key combination
    ScreenshotKey,
    /// Canvas export (toDataURL and friends)
    CanvasExport,
    Paste,
    Copy,
    /// A question was answered after `elapsed` on it
    AnswerRecorded { elapsed: Duration },
    Submitted { question_count: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityWarning {
    pub kind: HeuristicKind,
    pub reason: String,
}

/// Append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub kind: HeuristicKind,
    pub reason: String,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct OpenAssessment {
    course_id: String,
    lesson_id: String,
    opened_at: DateTime<Utc>,
    answered: usize,
}

pub struct IntegrityMonitor {
    config: IntegrityConfig,
    open: Option<OpenAssessment>,
    last_screenshot: Option<DateTime<Utc>>,
    paste_count: u32,
    copy_count: u32,
}

impl IntegrityMonitor {
    pub fn new(config: IntegrityConfig) -> Self {
        Self {
            config,
            open: None,
            last_screenshot: None,
            paste_count: 0,
            copy_count: 0,
        }
    }

    pub fn open_assessment(&mut self, course_id: &str, lesson_id: &str, at: DateTime<Utc>) {
        self.open = Some(OpenAssessment {
            course_id: course_id.to_string(),
            lesson_id: lesson_id.to_string(),
            opened_at: at,
            answered: 0,
        });
        self.paste_count = 0;
        self.copy_count = 0;
    }

    pub fn close_assessment(&mut self) {
        self.open = None;
        self.paste_count = 0;
        self.copy_count = 0;
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Feed one signal; returns any warnings it triggered
    pub fn observe(&mut self, signal: Signal, at: DateTime<Utc>) -> Vec<IntegrityWarning> {
        let mut warnings = Vec::new();

        match signal {
            Signal::ScreenshotKey | Signal::CanvasExport => {
                let window = chrono::Duration::seconds(self.config.screenshot_window_secs);
                if let Some(previous) = self.last_screenshot {
                    if at - previous <= window {
                        warnings.push(IntegrityWarning {
                            kind: HeuristicKind::Screenshot,
                            reason: format!(
                                "Repeated screenshot attempts within {} seconds",
                                self.config.screenshot_window_secs
                            ),
                        });
                    }
                }
                self.last_screenshot = Some(at);
            }
            Signal::Paste if self.open.is_some() => {
                self.paste_count += 1;
                if self.paste_count >= self.config.paste_threshold {
                    warnings.push(IntegrityWarning {
                        kind: HeuristicKind::Paste,
                        reason: format!("{} paste events during assessment", self.paste_count),
                    });
                    self.paste_count = 0;
                }
            }
            Signal::Copy if self.open.is_some() => {
                self.copy_count += 1;
                if self.copy_count >= self.config.copy_threshold {
                    warnings.push(IntegrityWarning {
                        kind: HeuristicKind::Copy,
                        reason: format!("{} copy events during assessment", self.copy_count),
                    });
                    self.copy_count = 0;
                }
            }
            Signal::Paste | Signal::Copy => {}
            Signal::AnswerRecorded { elapsed } => {
                if let Some(open) = self.open.as_mut() {
                    open.answered += 1;

                    if elapsed.as_secs_f64() < self.config.answer_floor_secs {
                        warnings.push(IntegrityWarning {
                            kind: HeuristicKind::AnswerPace,
                            reason: format!(
                                "Question answered in {:.1}s",
                                elapsed.as_secs_f64()
                            ),
                        });
                    }

                    let average = seconds_between(open.opened_at, at) / open.answered as f64;
                    if average < self.config.pace_floor_secs {
                        warnings.push(IntegrityWarning {
                            kind: HeuristicKind::Pace,
                            reason: format!("Averaging {:.1}s per question", average),
                        });
                    }
                }
            }
            Signal::Submitted { question_count } => {
                if let Some(open) = self.open.as_ref() {
                    let counted = question_count.max(open.answered).max(1);
                    let average = seconds_between(open.opened_at, at) / counted as f64;
                    if average < self.config.submission_floor_secs {
                        warnings.push(IntegrityWarning {
                            kind: HeuristicKind::SubmissionPace,
                            reason: format!(
                                "Submitted after {:.1}s per question on average",
                                average
                            ),
                        });
                    }
                }
            }
        }

        for w in &warnings {
            warn!("Integrity warning ({:?}): {}", w.kind, w.reason);
        }
        warnings
    }

    /// Turn a warning into a log entry tagged with the open assessment
    pub fn to_event(&self, warning: &IntegrityWarning, at: DateTime<Utc>) -> IntegrityEvent {
        IntegrityEvent {
            kind: warning.kind,
            reason: warning.reason.clone(),
            course_id: self.open.as_ref().map(|o| o.course_id.clone()),
            lesson_id: self.open.as_ref().map(|o| o.lesson_id.clone()),
            at,
        }
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_milliseconds().max(0)) as f64 / 1000.0
}
