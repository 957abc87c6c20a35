//! Quiz model and one-shot grading
//!
//! A lesson's quiz can be submitted exactly once. The score is recorded
//! permanently whether the learner passes or fails, and every later
//! submission comes back as `AlreadyAttempted` without touching state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::error::{EngineError, Result};
use crate::progress::CourseProgress;

pub const DEFAULT_PASSING_SCORE: u8 = 70;

fn default_passing_score() -> u8 {
    DEFAULT_PASSING_SCORE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default = "default_passing_score")]
    pub passing_score: u8,
    pub questions: Vec<Question>,
}

/// Question variants. Only multiple choice is auto-graded; the others are
/// carried as data and always count as incorrect here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    MultipleChoice {
        prompt: String,
        options: Vec<String>,
        correct: usize,
    },
    TrueFalse {
        prompt: String,
        answer: bool,
    },
    FreeText {
        prompt: String,
    },
}

impl Question {
    pub fn prompt(&self) -> &str {
        match self {
            Question::MultipleChoice { prompt, .. }
            | Question::TrueFalse { prompt, .. }
            | Question::FreeText { prompt } => prompt,
        }
    }

    pub fn is_auto_graded(&self) -> bool {
        matches!(self, Question::MultipleChoice { .. })
    }

    fn is_correct(&self, selected: Option<usize>) -> bool {
        match self {
            Question::MultipleChoice { correct, .. } => selected == Some(*correct),
            _ => false,
        }
    }
}

/// Result of grading a set of answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub correct: usize,
    pub total: usize,
    pub score: u8,
}

impl Quiz {
    /// Grade answers positionally; `answers[i]` is the option picked for
    /// question `i`. Missing answers are incorrect.
    pub fn grade(&self, answers: &[Option<usize>]) -> Grade {
        let total = self.questions.len();
        let correct = self
            .questions
            .iter()
            .enumerate()
            .filter(|(i, q)| q.is_correct(answers.get(*i).copied().flatten()))
            .count();

        Grade {
            correct,
            total,
            score: percent(correct, total),
        }
    }

    pub fn passes(&self, score: u8) -> bool {
        score >= self.passing_score
    }
}

/// `round(100 * part / whole)`, 0 when `whole` is 0
pub(crate) fn percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((100.0 * part as f64) / whole as f64).round().min(100.0) as u8
}

/// Outcome of a quiz submission at the API boundary
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Passed {
        score: u8,
        /// The submission moved the course to 100% for the first time
        course_completed: bool,
        certificate: Option<Certificate>,
    },
    Failed {
        score: u8,
        passing_score: u8,
    },
    /// A score already exists; nothing was changed
    AlreadyAttempted {
        score: u8,
    },
}

impl SubmissionOutcome {
    pub fn score(&self) -> u8 {
        match self {
            SubmissionOutcome::Passed { score, .. }
            | SubmissionOutcome::Failed { score, .. }
            | SubmissionOutcome::AlreadyAttempted { score } => *score,
        }
    }

    /// User-facing message for the outcome
    pub fn message(&self) -> String {
        match self {
            SubmissionOutcome::Passed { score, course_completed: true, .. } => {
                format!("Passed with {}%. Course complete!", score)
            }
            SubmissionOutcome::Passed { score, .. } => {
                format!("Passed with {}%. The next lesson is unlocked.", score)
            }
            SubmissionOutcome::Failed { score, passing_score } => format!(
                "Scored {}% (passing score is {}%). This quiz cannot be retaken.",
                score, passing_score
            ),
            SubmissionOutcome::AlreadyAttempted { score } => format!(
                "You have already taken this quiz (score {}%). Each quiz can only be attempted once.",
                score
            ),
        }
    }
}

/// Grade a submission and apply it to the course's progress.
///
/// Records the score unconditionally, then marks the lesson complete only on
/// a pass. `lesson_count` is the course's total number of lessons. The
/// certificate is left empty; issuing it is the caller's job.
pub fn submit(
    quiz: &Quiz,
    lesson_id: &str,
    answers: &[Option<usize>],
    progress: &mut CourseProgress,
    lesson_count: usize,
) -> Result<SubmissionOutcome> {
    if let Some(&score) = progress.quiz_scores.get(lesson_id) {
        debug!("Rejecting resubmission for lesson {} (score {})", lesson_id, score);
        return Ok(SubmissionOutcome::AlreadyAttempted { score });
    }

    if quiz.questions.is_empty() {
        return Err(EngineError::EmptyQuiz(lesson_id.to_string()));
    }

    let grade = quiz.grade(answers);
    progress.quiz_scores.insert(lesson_id.to_string(), grade.score);

    info!(
        "Quiz for lesson {} graded: {}/{} correct, score {}",
        lesson_id, grade.correct, grade.total, grade.score
    );

    if !quiz.passes(grade.score) {
        return Ok(SubmissionOutcome::Failed {
            score: grade.score,
            passing_score: quiz.passing_score,
        });
    }

    let course_completed = progress.complete_lesson(lesson_id, lesson_count);

    Ok(SubmissionOutcome::Passed {
        score: grade.score,
        course_completed,
        certificate: None,
    })
}
