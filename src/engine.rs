//! Learner engine
//!
//! `LearnerEngine` owns everything for one learner (catalog, store,
//! telemetry tracker, integrity monitor, optional mirror) and is the single
//! entry point the CLI drives. Every method takes `&mut self`; there is no
//! shared mutable state outside it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Course, GateKind};
use crate::certificate::Certificate;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::gate::{self, AutoAdvance, LessonState, ScheduledAdvance};
use crate::integrity::{IntegrityMonitor, IntegrityWarning, Signal};
use crate::notifications::{self, Notification};
use crate::progress::{reconcile, ReconcileReport, RemoteProgress};
use crate::quiz::{self, SubmissionOutcome};
use crate::store::{CompletionPath, ProgressStore, StoreEvent};
use crate::sync::{self, RemoteMirror};
use crate::telemetry::{CompletionAchieved, Sample, TelemetryTracker};

/// The lesson currently open in the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub course_id: String,
    pub lesson_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseStatus {
    pub course_id: String,
    pub title: String,
    pub percentage: u8,
    pub completed: usize,
    pub total: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub courses: Vec<CourseStatus>,
    pub certificates: usize,
    pub integrity_events: usize,
}

pub struct LearnerEngine {
    catalog: Catalog,
    config: Config,
    store: ProgressStore,
    tracker: TelemetryTracker,
    monitor: IntegrityMonitor,
    mirror: Option<Arc<dyn RemoteMirror>>,
    /// In-flight write-throughs, drained by `flush_writes`
    pending_writes: Vec<JoinHandle<()>>,
    selection: Option<Selection>,
    auto_advance: AutoAdvance,
    advances: mpsc::UnboundedReceiver<ScheduledAdvance>,
}

impl LearnerEngine {
    /// Wire the engine up and run the cold-start checks.
    ///
    /// Durations the catalog already knows are seeded into the store, then
    /// persisted positions are revalidated (upward only).
    pub fn new(
        catalog: Catalog,
        config: Config,
        store: ProgressStore,
        mirror: Option<Arc<dyn RemoteMirror>>,
    ) -> Result<Self> {
        let tracker = TelemetryTracker::new(config.completion.into());
        let monitor = IntegrityMonitor::new(config.integrity.clone());
        let (auto_advance, advances) =
            AutoAdvance::new(Duration::from_millis(config.gate.auto_advance_delay_ms));

        let mut engine = Self {
            catalog,
            config,
            store,
            tracker,
            monitor,
            mirror,
            pending_writes: Vec::new(),
            selection: None,
            auto_advance,
            advances,
        };

        engine.seed_durations();
        for achieved in engine.tracker.revalidate(&mut engine.store)? {
            engine.on_watched(&achieved.lesson_id, false)?;
        }
        Ok(engine)
    }

    fn seed_durations(&mut self) {
        let known: Vec<(String, f64)> = self
            .catalog
            .courses
            .iter()
            .flat_map(|c| c.lessons.iter())
            .filter_map(|l| l.duration.map(|d| (l.id.clone(), d)))
            .collect();

        for (lesson_id, duration) in known {
            if self.store.duration(&lesson_id).is_some() {
                continue;
            }
            if let Err(e) = self.store.set_duration(&lesson_id, duration) {
                warn!("Ignoring catalog duration: {}", e);
            }
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    fn course(&self, course_id: &str) -> Result<&Course> {
        self.catalog
            .course(course_id)
            .ok_or_else(|| EngineError::UnknownCourse(course_id.to_string()))
    }

    fn lesson_index(&self, course_id: &str, lesson_id: &str) -> Result<usize> {
        self.course(course_id)?
            .lesson_index(lesson_id)
            .ok_or_else(|| EngineError::UnknownLesson {
                course_id: course_id.to_string(),
                lesson_id: lesson_id.to_string(),
            })
    }

    pub fn lesson_states(&self, course_id: &str) -> Result<Vec<LessonState>> {
        Ok(gate::lesson_states(self.course(course_id)?, &self.store))
    }

    /// Select a lesson. Selecting a locked lesson changes nothing and
    /// reports `Locked`.
    pub fn select_lesson(&mut self, course_id: &str, lesson_id: &str) -> Result<LessonState> {
        let index = self.lesson_index(course_id, lesson_id)?;
        let state = gate::lesson_state(self.course(course_id)?, index, &self.store);
        if state == LessonState::Locked {
            debug!("Lesson {} is locked, ignoring selection", lesson_id);
            return Ok(state);
        }

        self.auto_advance.cancel();
        self.selection = Some(Selection {
            course_id: course_id.to_string(),
            lesson_id: lesson_id.to_string(),
        });
        self.store.update_course(course_id, |p| p.touch(Utc::now()))?;
        self.write_through(course_id);

        info!("Selected {} / {}", course_id, lesson_id);
        Ok(state)
    }

    /// The course a lesson belongs to, preferring the selected course when
    /// several courses share the lesson id
    fn owning_course(&self, lesson_id: &str) -> Option<&Course> {
        self.selection
            .as_ref()
            .and_then(|s| self.catalog.course(&s.course_id))
            .filter(|c| c.lesson_index(lesson_id).is_some())
            .or_else(|| self.catalog.course_for_lesson(lesson_id))
    }

    fn is_locked(&self, lesson_id: &str) -> bool {
        self.owning_course(lesson_id)
            .and_then(|c| c.lesson_index(lesson_id).map(|i| gate::lesson_state(c, i, &self.store)))
            == Some(LessonState::Locked)
    }

    /// Apply one coalesced telemetry sample.
    ///
    /// Samples for a locked lesson are rejected with `LessonLocked` and
    /// leave the store untouched.
    pub fn apply_sample(&mut self, sample: &Sample) -> Result<Option<CompletionAchieved>> {
        if self.is_locked(sample.lesson_id()) {
            return Err(EngineError::LessonLocked(sample.lesson_id().to_string()));
        }
        let achieved = self.tracker.apply(&mut self.store, sample)?;
        if let Some(done) = &achieved {
            self.on_watched(&done.lesson_id, true)?;
        }
        Ok(achieved)
    }

    pub fn record_duration(&mut self, lesson_id: &str, duration: f64) -> Result<Option<CompletionAchieved>> {
        self.apply_sample(&Sample::Duration {
            lesson_id: lesson_id.to_string(),
            duration,
        })
    }

    pub fn media_ended(&mut self, lesson_id: &str) -> Result<Option<CompletionAchieved>> {
        self.apply_sample(&Sample::Ended {
            lesson_id: lesson_id.to_string(),
        })
    }

    /// A lesson's watched latch just flipped. Watch-gated lessons count as
    /// complete; quiz-gated lessons still need their quiz.
    fn on_watched(&mut self, lesson_id: &str, schedule_advance: bool) -> Result<()> {
        let Some(course) = self.owning_course(lesson_id) else {
            debug!("Watched lesson {} is not in the catalog", lesson_id);
            return Ok(());
        };
        let Some(index) = course.lesson_index(lesson_id) else {
            return Ok(());
        };
        if course.lessons[index].gate_kind() != GateKind::Watch {
            return Ok(());
        }
        if gate::lesson_state(course, index, &self.store) == LessonState::Locked {
            debug!("Lesson {} is locked, not counting it as complete", lesson_id);
            return Ok(());
        }

        let course_id = course.id.clone();
        let lesson_count = course.lessons.len();
        let next = course.lessons.get(index + 1).map(|l| l.id.clone());

        let completed = self.store.update_course(&course_id, |p| {
            p.touch(Utc::now());
            p.complete_lesson(lesson_id, lesson_count)
        })?;
        self.store.publish(StoreEvent::LessonCompleted {
            course_id: course_id.clone(),
            lesson_id: lesson_id.to_string(),
        });
        if completed {
            // No certificate on this path
            info!("Course {} completed by watching", course_id);
            self.store.publish(StoreEvent::CourseCompleted {
                course_id: course_id.clone(),
                via: CompletionPath::Watch,
            });
        }
        self.write_through(&course_id);

        let selected = self
            .selection
            .as_ref()
            .is_some_and(|s| s.course_id == course_id && s.lesson_id == lesson_id);
        if let Some(to_lesson) = next {
            if schedule_advance && selected && self.config.gate.auto_advance {
                self.auto_advance.schedule(ScheduledAdvance {
                    course_id,
                    from_lesson: lesson_id.to_string(),
                    to_lesson,
                });
            }
        }
        Ok(())
    }

    /// Wait for the next fired auto-advance
    pub async fn next_advance(&mut self) -> Option<ScheduledAdvance> {
        self.advances.recv().await
    }

    /// Act on a fired advance if the learner is still on the lesson that
    /// scheduled it. Returns true if the selection moved.
    pub fn handle_advance(&mut self, advance: ScheduledAdvance) -> Result<bool> {
        let still_there = self.selection.as_ref().is_some_and(|s| {
            s.course_id == advance.course_id && s.lesson_id == advance.from_lesson
        });
        if !still_there {
            debug!("Dropping stale auto-advance to {}", advance.to_lesson);
            return Ok(false);
        }

        let state = self.select_lesson(&advance.course_id, &advance.to_lesson)?;
        Ok(state == LessonState::Unlocked)
    }

    /// Start integrity monitoring for a quiz
    pub fn open_assessment(&mut self, course_id: &str, lesson_id: &str) -> Result<()> {
        let index = self.lesson_index(course_id, lesson_id)?;
        if self.course(course_id)?.lessons[index].quiz.is_none() {
            return Err(EngineError::NoQuiz(lesson_id.to_string()));
        }
        self.monitor.open_assessment(course_id, lesson_id, Utc::now());
        Ok(())
    }

    /// Feed an integrity signal. Warnings are logged and recorded; nothing
    /// here can fail the caller.
    pub fn observe_integrity(&mut self, signal: Signal) -> Vec<IntegrityWarning> {
        self.observe_integrity_at(signal, Utc::now())
    }

    pub fn observe_integrity_at(&mut self, signal: Signal, at: DateTime<Utc>) -> Vec<IntegrityWarning> {
        let warnings = self.monitor.observe(signal, at);
        for warning in &warnings {
            let event = self.monitor.to_event(warning, at);
            if let Err(e) = self.store.append_integrity_event(event) {
                warn!("Failed to record integrity event: {}", e);
            }
        }
        warnings
    }

    /// Grade and record a one-shot quiz submission.
    ///
    /// `answers[i]` is the option index picked for question `i`.
    pub fn submit_quiz(
        &mut self,
        course_id: &str,
        lesson_id: &str,
        answers: &[Option<usize>],
    ) -> Result<SubmissionOutcome> {
        let index = self.lesson_index(course_id, lesson_id)?;
        let course = self.course(course_id)?;
        let quiz = course.lessons[index]
            .quiz
            .clone()
            .ok_or_else(|| EngineError::NoQuiz(lesson_id.to_string()))?;
        let title = course.title.clone();
        let lesson_count = course.lessons.len();

        if gate::lesson_state(course, index, &self.store) == LessonState::Locked {
            return Err(EngineError::LessonLocked(lesson_id.to_string()));
        }
        if let Some(&score) = self.store.course(course_id).and_then(|p| p.quiz_scores.get(lesson_id)) {
            debug!("Lesson {} already has a score, rejecting resubmission", lesson_id);
            return Ok(SubmissionOutcome::AlreadyAttempted { score });
        }
        if quiz.questions.is_empty() {
            return Err(EngineError::EmptyQuiz(lesson_id.to_string()));
        }

        if self.monitor.is_open() {
            self.observe_integrity(Signal::Submitted {
                question_count: quiz.questions.len(),
            });
            self.monitor.close_assessment();
        }

        let mut outcome = self.store.update_course(course_id, |p| {
            let outcome = quiz::submit(&quiz, lesson_id, answers, p, lesson_count)?;
            p.touch(Utc::now());
            Ok::<_, EngineError>(outcome)
        })??;

        if let SubmissionOutcome::Passed {
            score,
            course_completed,
            certificate,
        } = &mut outcome
        {
            self.store.publish(StoreEvent::LessonCompleted {
                course_id: course_id.to_string(),
                lesson_id: lesson_id.to_string(),
            });
            if *course_completed {
                *certificate = self.issue_certificate(course_id, &title, *score)?;
                self.store.publish(StoreEvent::CourseCompleted {
                    course_id: course_id.to_string(),
                    via: CompletionPath::Quiz,
                });
            }
        }

        self.write_through(course_id);
        Ok(outcome)
    }

    /// One certificate per course; an existing one is returned as-is
    fn issue_certificate(&mut self, course_id: &str, title: &str, score: u8) -> Result<Option<Certificate>> {
        if let Some(existing) = self.store.certificates().iter().find(|c| c.course_id == course_id) {
            debug!("Course {} already has certificate {}", course_id, existing.id);
            return Ok(Some(existing.clone()));
        }

        let certificate = Certificate::issue(course_id, title, &self.config.identity, score);
        self.store.append_certificate(certificate.clone())?;
        Ok(Some(certificate))
    }

    pub fn notifications(&self, now: DateTime<Utc>) -> Vec<Notification> {
        notifications::generate(
            &self.catalog.courses,
            self.store.courses(),
            now,
            &self.config.notifications,
        )
    }

    pub fn status(&self) -> StatusReport {
        let courses = self
            .catalog
            .courses
            .iter()
            .map(|course| {
                let progress = self.store.course(&course.id);
                CourseStatus {
                    course_id: course.id.clone(),
                    title: course.title.clone(),
                    percentage: progress.map(|p| p.percentage).unwrap_or(0),
                    completed: progress.map(|p| p.completed_lessons.len()).unwrap_or(0),
                    total: course.lessons.len(),
                    completed_at: progress.and_then(|p| p.completed_at),
                }
            })
            .collect();

        StatusReport {
            courses,
            certificates: self.store.certificates().len(),
            integrity_events: self.store.integrity_log().len(),
        }
    }

    /// Merge remote rows into local progress
    pub fn reconcile_remote(&mut self, remote: Vec<RemoteProgress>) -> Result<ReconcileReport> {
        let mut courses = self.store.courses().clone();
        let report = reconcile(&mut courses, remote, &self.catalog, Utc::now());

        let newly_completed: Vec<String> = courses
            .values()
            .filter(|p| p.is_completed())
            .filter(|p| !self.store.course(&p.course_id).is_some_and(|old| old.is_completed()))
            .map(|p| p.course_id.clone())
            .collect();

        for lesson_id in &report.forced_watched {
            self.store.merge_watched(lesson_id, true)?;
        }
        self.store.replace_courses(courses)?;

        for course_id in newly_completed {
            self.store.publish(StoreEvent::CourseCompleted {
                course_id,
                via: CompletionPath::Sync,
            });
        }

        info!(
            "Reconciled with mirror: {} merged, {} created, {} lessons forced watched",
            report.courses_merged,
            report.courses_created,
            report.forced_watched.len()
        );
        Ok(report)
    }

    /// Fetch and reconcile, surfacing mirror errors
    pub async fn pull_remote(&mut self) -> Result<ReconcileReport> {
        let Some(mirror) = self.mirror.clone() else {
            return Ok(ReconcileReport::default());
        };
        let rows = mirror.get_progress().await?;
        self.reconcile_remote(rows)
    }

    /// Load-time reconciliation: a mirror failure leaves local state as is
    pub async fn load_remote(&mut self) -> ReconcileReport {
        match self.pull_remote().await {
            Ok(report) => report,
            Err(e) => {
                warn!("Remote progress unavailable, continuing with local state: {}", e);
                ReconcileReport::default()
            }
        }
    }

    /// Push every local course to the mirror
    pub async fn push_remote(&self) -> Result<usize> {
        let Some(mirror) = &self.mirror else {
            return Ok(0);
        };
        let mut updates: Vec<RemoteProgress> =
            self.store.courses().values().map(RemoteProgress::from).collect();
        updates.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        sync::push_all(mirror.as_ref(), &updates).await
    }

    fn write_through(&mut self, course_id: &str) {
        let (Some(mirror), Some(progress)) = (&self.mirror, self.store.course(course_id)) else {
            return;
        };
        let handle = sync::spawn_write_through(mirror.clone(), RemoteProgress::from(progress));

        self.pending_writes.retain(|h| !h.is_finished());
        self.pending_writes.extend(handle);
    }

    /// Wait for outstanding mirror writes. Short-lived processes call this
    /// before the runtime shuts down.
    pub async fn flush_writes(&mut self) {
        for handle in self.pending_writes.drain(..) {
            let _ = handle.await;
        }
    }

    /// Drop playback state and progress; certificates and the integrity log
    /// are kept
    pub fn reset(&mut self) -> Result<()> {
        self.auto_advance.cancel();
        self.selection = None;
        self.monitor.close_assessment();
        self.store.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Lesson;
    use crate::certificate::LearnerIdentity;
    use crate::config::Config;
    use crate::quiz::{Question, Quiz};
    use crate::sync::FileMirror;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn watch_lesson(id: &str) -> Lesson {
        Lesson {
            id: id.to_string(),
            title: format!("Lesson {}", id),
            duration: None,
            quiz: None,
        }
    }

    fn quiz_lesson(id: &str, questions: usize) -> Lesson {
        Lesson {
            quiz: Some(Quiz {
                passing_score: 70,
                questions: (0..questions)
                    .map(|i| Question::MultipleChoice {
                        prompt: format!("q{}", i),
                        options: vec!["a".into(), "b".into()],
                        correct: 0,
                    })
                    .collect(),
            }),
            ..watch_lesson(id)
        }
    }

    fn course(id: &str, lessons: Vec<Lesson>) -> Course {
        Course {
            id: id.to_string(),
            title: format!("Course {}", id),
            lessons,
            premium: false,
        }
    }

    fn engine_with(courses: Vec<Course>, config: Config) -> LearnerEngine {
        LearnerEngine::new(Catalog::new(courses), config, ProgressStore::in_memory(), None).unwrap()
    }

    fn engine(courses: Vec<Course>) -> LearnerEngine {
        engine_with(courses, Config::default())
    }

    fn watch(engine: &mut LearnerEngine, lesson_id: &str) {
        engine.record_duration(lesson_id, 600.0).unwrap();
        engine
            .apply_sample(&Sample::Position {
                lesson_id: lesson_id.to_string(),
                position: 600.0,
            })
            .unwrap();
    }

    fn mixed_course() -> Course {
        course(
            "c1",
            vec![watch_lesson("l0"), quiz_lesson("l1", 5), watch_lesson("l2")],
        )
    }

    #[test]
    fn test_watching_unlocks_next_lesson() {
        let mut e = engine(vec![mixed_course()]);
        assert_eq!(e.select_lesson("c1", "l1").unwrap(), LessonState::Locked);

        e.select_lesson("c1", "l0").unwrap();
        e.record_duration("l0", 600.0).unwrap();
        let before = e
            .apply_sample(&Sample::Position { lesson_id: "l0".into(), position: 539.0 })
            .unwrap();
        assert!(before.is_none());
        assert_eq!(e.select_lesson("c1", "l1").unwrap(), LessonState::Locked);

        let achieved = e
            .apply_sample(&Sample::Position { lesson_id: "l0".into(), position: 540.0 })
            .unwrap();
        assert!(achieved.is_some());
        assert_eq!(e.store().course("c1").unwrap().percentage, 33);
        assert_eq!(e.select_lesson("c1", "l1").unwrap(), LessonState::Unlocked);
    }

    #[test]
    fn test_failed_quiz_locks_forever() {
        let mut e = engine(vec![mixed_course()]);
        watch(&mut e, "l0");

        // 3 of 5 = 60
        let answers = [Some(0), Some(0), Some(0), Some(1), Some(1)];
        let outcome = e.submit_quiz("c1", "l1", &answers).unwrap();
        assert_eq!(outcome, SubmissionOutcome::Failed { score: 60, passing_score: 70 });
        assert_eq!(e.lesson_states("c1").unwrap()[2], LessonState::Locked);

        let before = e.store().course("c1").cloned();
        let retry = e.submit_quiz("c1", "l1", &[Some(0); 5]).unwrap();
        assert_eq!(retry, SubmissionOutcome::AlreadyAttempted { score: 60 });
        assert_eq!(e.store().course("c1").cloned(), before);
        assert_eq!(e.lesson_states("c1").unwrap()[2], LessonState::Locked);
    }

    #[test]
    fn test_resubmission_leaves_progress_and_integrity_alone() {
        let mut e = engine(vec![mixed_course()]);
        watch(&mut e, "l0");
        e.submit_quiz("c1", "l1", &[Some(1); 5]).unwrap();

        e.open_assessment("c1", "l1").unwrap();
        let before = e.store().course("c1").cloned();
        let events = e.store().integrity_log().len();

        // An instant resubmission would trip the pace check if it were graded
        let retry = e.submit_quiz("c1", "l1", &[Some(0); 5]).unwrap();
        assert_eq!(retry, SubmissionOutcome::AlreadyAttempted { score: 0 });
        assert_eq!(e.store().course("c1").cloned(), before);
        assert_eq!(e.store().integrity_log().len(), events);
        assert!(e.monitor.is_open());
    }

    #[test]
    fn test_locked_lesson_rejects_telemetry() {
        let lessons = vec![quiz_lesson("l0", 2), watch_lesson("l1"), watch_lesson("l2")];
        let mut e = engine(vec![course("c1", lessons)]);
        let outcome = e.submit_quiz("c1", "l0", &[Some(1), Some(1)]).unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Failed { score: 0, .. }));
        let states = e.lesson_states("c1").unwrap();
        assert_eq!(states, vec![LessonState::Unlocked, LessonState::Locked, LessonState::Locked]);

        assert!(matches!(e.record_duration("l1", 600.0), Err(EngineError::LessonLocked(_))));
        assert!(matches!(
            e.apply_sample(&Sample::Position { lesson_id: "l1".into(), position: 600.0 }),
            Err(EngineError::LessonLocked(_))
        ));
        assert!(matches!(e.media_ended("l1"), Err(EngineError::LessonLocked(_))));

        assert_eq!(e.store().position("l1"), 0.0);
        assert_eq!(e.store().duration("l1"), None);
        assert!(!e.store().is_watched("l1"));
        let progress = e.store().course("c1").unwrap();
        assert!(progress.completed_lessons.is_empty());
        assert_eq!(progress.percentage, 0);
        assert_eq!(e.lesson_states("c1").unwrap(), states);
    }

    #[test]
    fn test_shared_lesson_id_completes_selected_course() {
        let a = course("a", vec![watch_lesson("a0"), watch_lesson("shared")]);
        let b = course("b", vec![watch_lesson("shared"), watch_lesson("b1")]);
        let mut e = engine(vec![a, b]);

        e.select_lesson("b", "shared").unwrap();
        watch(&mut e, "shared");

        assert!(e.store().course("b").unwrap().completed_lessons.contains("shared"));
        assert!(e.store().course("a").is_none());
        assert_eq!(e.select_lesson("b", "b1").unwrap(), LessonState::Unlocked);
    }

    #[test]
    fn test_watch_only_course_completes_without_certificate() {
        let lessons = (1..=5).map(|i| watch_lesson(&format!("l{}", i))).collect();
        let mut e = engine(vec![course("c1", lessons)]);
        let mut rx = e.subscribe();

        let mut seen = Vec::new();
        for i in 1..=5 {
            watch(&mut e, &format!("l{}", i));
            seen.push(e.store().course("c1").unwrap().percentage);
        }
        assert_eq!(seen, vec![20, 40, 60, 80, 100]);
        assert!(e.store().course("c1").unwrap().completed_at.is_some());
        assert!(e.store().certificates().is_empty());

        let mut completions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StoreEvent::CourseCompleted { via, .. } = event {
                completions.push(via);
            }
        }
        assert_eq!(completions, vec![CompletionPath::Watch]);
    }

    #[test]
    fn test_quiz_completion_issues_one_certificate() {
        let mut config = Config::default();
        config.identity = LearnerIdentity {
            first_name: Some("Ada".to_string()),
            last_name: None,
        };
        let mut e = engine_with(vec![course("c1", vec![watch_lesson("l0"), quiz_lesson("l1", 2)])], config);
        watch(&mut e, "l0");

        let outcome = e.submit_quiz("c1", "l1", &[Some(0), Some(0)]).unwrap();
        let SubmissionOutcome::Passed { course_completed, certificate, .. } = &outcome else {
            panic!("expected pass, got {:?}", outcome);
        };
        assert!(*course_completed);
        let certificate = certificate.as_ref().unwrap();
        assert_eq!(certificate.learner_name, "Ada");
        assert_eq!(certificate.score, 100);

        let again = e.submit_quiz("c1", "l1", &[Some(0), Some(0)]).unwrap();
        assert!(matches!(again, SubmissionOutcome::AlreadyAttempted { .. }));
        assert_eq!(e.store().certificates().len(), 1);
    }

    #[test]
    fn test_locked_selection_changes_nothing() {
        let mut e = engine(vec![mixed_course()]);
        assert_eq!(e.select_lesson("c1", "l2").unwrap(), LessonState::Locked);
        assert!(e.selection().is_none());
        assert!(e.store().course("c1").is_none());
    }

    #[test]
    fn test_locked_quiz_rejects_submission() {
        let mut e = engine(vec![mixed_course()]);
        assert!(matches!(
            e.submit_quiz("c1", "l1", &[Some(0); 5]),
            Err(EngineError::LessonLocked(_))
        ));
        assert!(e.store().course("c1").is_none());
    }

    #[test]
    fn test_no_quiz_and_unknown_ids() {
        let mut e = engine(vec![mixed_course()]);
        assert!(matches!(e.submit_quiz("c1", "l0", &[]), Err(EngineError::NoQuiz(_))));
        assert!(matches!(e.select_lesson("nope", "l0"), Err(EngineError::UnknownCourse(_))));
        assert!(matches!(
            e.select_lesson("c1", "nope"),
            Err(EngineError::UnknownLesson { .. })
        ));
    }

    #[test]
    fn test_seek_back_keeps_max_position() {
        let mut e = engine(vec![mixed_course()]);
        for position in [550.0, 500.0] {
            e.apply_sample(&Sample::Position { lesson_id: "l0".into(), position })
                .unwrap();
        }
        assert_eq!(e.store().position("l0"), 550.0);
    }

    #[test]
    fn test_two_notifications_for_stale_half_done_course() {
        let lessons = (1..=5).map(|i| watch_lesson(&format!("l{}", i))).collect();
        let mut e = engine(vec![course("x", lessons)]);
        for i in 1..=3 {
            watch(&mut e, &format!("l{}", i));
        }
        assert_eq!(e.store().course("x").unwrap().percentage, 60);

        let later = Utc::now() + ChronoDuration::days(20);
        let kinds: Vec<_> = e.notifications(later).into_iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                notifications::NotificationKind::IncompleteCourse,
                notifications::NotificationKind::InactiveCourse,
            ]
        );
    }

    #[test]
    fn test_integrity_never_blocks_submission() {
        let mut e = engine(vec![mixed_course()]);
        watch(&mut e, "l0");
        e.open_assessment("c1", "l1").unwrap();

        let t0 = Utc::now();
        let mut warned = 0;
        for signal in [Signal::ScreenshotKey, Signal::CanvasExport] {
            warned += e.observe_integrity_at(signal, t0).len();
        }
        for _ in 0..3 {
            warned += e.observe_integrity_at(Signal::Paste, t0).len();
        }
        for _ in 0..5 {
            warned += e.observe_integrity_at(Signal::Copy, t0).len();
        }
        warned += e
            .observe_integrity_at(
                Signal::AnswerRecorded { elapsed: std::time::Duration::from_millis(100) },
                t0,
            )
            .len();
        assert!(warned >= 5);

        // Submitted immediately, which trips the submission pace check too
        let outcome = e.submit_quiz("c1", "l1", &[Some(0); 5]).unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Passed { score: 100, .. }));
        assert!(e.store().integrity_log().len() > warned);
        assert!(!e.monitor.is_open());
        assert_eq!(e.lesson_states("c1").unwrap()[2], LessonState::Unlocked);
    }

    #[test]
    fn test_remote_completion_forces_watched() {
        let mut e = engine(vec![mixed_course()]);
        let report = e
            .reconcile_remote(vec![RemoteProgress {
                course_id: "c1".to_string(),
                completed_lessons: vec!["l0".to_string()],
                ..Default::default()
            }])
            .unwrap();

        assert_eq!(report.courses_created, 1);
        assert!(e.store().is_watched("l0"));
        assert_eq!(e.store().course("c1").unwrap().percentage, 33);
        assert_eq!(e.select_lesson("c1", "l1").unwrap(), LessonState::Unlocked);
    }

    #[test]
    fn test_reset_clears_progress_keeps_certificates() {
        let mut e = engine(vec![course("c1", vec![quiz_lesson("l0", 1)])]);
        e.submit_quiz("c1", "l0", &[Some(0)]).unwrap();
        assert_eq!(e.store().certificates().len(), 1);

        e.reset().unwrap();
        assert!(e.store().courses().is_empty());
        assert_eq!(e.store().certificates().len(), 1);

        // Completing again after a reset does not mint a second certificate
        e.submit_quiz("c1", "l0", &[Some(0)]).unwrap();
        assert_eq!(e.store().certificates().len(), 1);
    }

    #[test]
    fn test_catalog_durations_seed_store() {
        let mut lesson = watch_lesson("l0");
        lesson.duration = Some(120.0);
        let e = engine(vec![course("c1", vec![lesson])]);
        assert_eq!(e.store().duration("l0"), Some(120.0));
    }

    #[tokio::test]
    async fn test_auto_advance_moves_selection() {
        let mut config = Config::default();
        config.gate.auto_advance_delay_ms = 10;
        let lessons = vec![watch_lesson("l0"), watch_lesson("l1")];
        let mut e = engine_with(vec![course("c1", lessons)], config);

        e.select_lesson("c1", "l0").unwrap();
        watch(&mut e, "l0");

        let advance = tokio::time::timeout(std::time::Duration::from_secs(2), e.next_advance())
            .await
            .unwrap()
            .unwrap();
        assert!(e.handle_advance(advance).unwrap());
        assert_eq!(e.selection().unwrap().lesson_id, "l1");
    }

    #[tokio::test]
    async fn test_navigation_cancels_auto_advance() {
        let mut config = Config::default();
        config.gate.auto_advance_delay_ms = 20;
        let lessons = vec![watch_lesson("l0"), watch_lesson("l1")];
        let mut e = engine_with(vec![course("c1", lessons)], config);

        e.select_lesson("c1", "l0").unwrap();
        watch(&mut e, "l0");
        // Learner navigates back to l0 before the timer fires
        e.select_lesson("c1", "l0").unwrap();

        let fired = tokio::time::timeout(std::time::Duration::from_millis(100), e.next_advance()).await;
        assert!(fired.is_err());
        assert_eq!(e.selection().unwrap().lesson_id, "l0");
    }

    #[test]
    fn test_auto_advance_disabled() {
        let mut config = Config::default();
        config.gate.auto_advance = false;
        let lessons = vec![watch_lesson("l0"), watch_lesson("l1")];
        let mut e = engine_with(vec![course("c1", lessons)], config);
        e.select_lesson("c1", "l0").unwrap();
        watch(&mut e, "l0");
        assert!(!e.auto_advance.is_pending());
    }

    #[tokio::test]
    async fn test_file_mirror_round_trip() {
        let temp = TempDir::new().unwrap();
        let mirror: Arc<dyn RemoteMirror> = Arc::new(FileMirror::new(temp.path().join("mirror.json")));

        let mut first = LearnerEngine::new(
            Catalog::new(vec![mixed_course()]),
            Config::default(),
            ProgressStore::in_memory(),
            Some(mirror.clone()),
        )
        .unwrap();
        watch(&mut first, "l0");
        assert_eq!(first.push_remote().await.unwrap(), 1);

        // A fresh device pulls the mirrored progress
        let mut second = LearnerEngine::new(
            Catalog::new(vec![mixed_course()]),
            Config::default(),
            ProgressStore::in_memory(),
            Some(mirror),
        )
        .unwrap();
        let report = second.load_remote().await;
        assert_eq!(report.forced_watched, vec!["l0".to_string()]);
        assert_eq!(second.select_lesson("c1", "l1").unwrap(), LessonState::Unlocked);
    }
}
