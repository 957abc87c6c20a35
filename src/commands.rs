//! CLI command implementations
//!
//! Each command opens the engine against the data directory, does one thing
//! and waits for outstanding mirror writes before returning.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use coursegate::catalog::Catalog;
use coursegate::config::{Config, SyncBackend};
use coursegate::engine::LearnerEngine;
use coursegate::error::EngineError;
use coursegate::gate::LessonState;
use coursegate::quiz::SubmissionOutcome;
use coursegate::store::{ProgressStore, SqliteAdapter};
use coursegate::sync::mirror_from_config;
use coursegate::telemetry::{spawn_coalescer, CompletionAchieved, Sample};

const CONFIG_FILE: &str = "config.toml";
const STATE_DB: &str = "state.sqlite";
/// Static fallback catalog
const CATALOG_FILE: &str = "catalog.json";
/// Catalog fetched by the content service; merged over the fallback
const REMOTE_CATALOG_FILE: &str = "catalog.remote.json";

pub fn init(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;

    let config_path = data_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        Config::default().save(&config_path)?;
    }

    let catalog_path = data_dir.join(CATALOG_FILE);
    if !catalog_path.exists() {
        std::fs::write(&catalog_path, serde_json::to_string_pretty(&Catalog::default())?)?;
    }

    SqliteAdapter::open(&data_dir.join(STATE_DB)).context("Failed to create state database")?;

    info!("coursegate initialized at {:?}", data_dir);
    println!("coursegate initialized");
    println!("   Data directory: {:?}", data_dir);
    println!("   Config: {:?}", config_path);
    println!("   Catalog: {:?}", catalog_path);
    Ok(())
}

fn load_catalog(data_dir: &Path) -> Result<Catalog> {
    let fallback_path = data_dir.join(CATALOG_FILE);
    let fallback = if fallback_path.exists() {
        Catalog::load(&fallback_path)?
    } else {
        Catalog::default()
    };

    let remote_path = data_dir.join(REMOTE_CATALOG_FILE);
    if !remote_path.exists() {
        return Ok(fallback);
    }
    match Catalog::load(&remote_path) {
        Ok(remote) => Ok(Catalog::merge(remote, fallback)),
        Err(e) => {
            warn!("Ignoring remote catalog: {:#}", e);
            Ok(fallback)
        }
    }
}

fn open_store(data_dir: &Path) -> Result<ProgressStore> {
    if !data_dir.exists() {
        bail!("Not initialized. Run 'coursegate init' first");
    }
    let adapter = SqliteAdapter::open(&data_dir.join(STATE_DB))
        .context("Failed to open state database")?;
    Ok(ProgressStore::open(Box::new(adapter))?)
}

/// Open the engine; `pull` runs load-time reconciliation with the mirror
async fn open_engine(data_dir: &Path, pull: bool) -> Result<LearnerEngine> {
    let store = open_store(data_dir)?;
    let config = Config::load(&data_dir.join(CONFIG_FILE))?;
    let catalog = load_catalog(data_dir)?;
    let mirror = mirror_from_config(&config.sync.backend, data_dir)?;

    let mut engine = LearnerEngine::new(catalog, config, store, mirror)?;
    if pull {
        engine.load_remote().await;
    }
    Ok(engine)
}

pub async fn status(data_dir: &Path, json: bool) -> Result<()> {
    let engine = open_engine(data_dir, true).await?;
    let report = engine.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("coursegate Status");
    println!("=================");
    println!();
    if report.courses.is_empty() {
        println!("No courses in catalog ({:?})", data_dir.join(CATALOG_FILE));
    }
    for course in &report.courses {
        let done = match course.completed_at {
            Some(at) => format!(", completed {}", at.format("%Y-%m-%d")),
            None => String::new(),
        };
        println!(
            "{} ({}): {}% ({}/{} lessons{})",
            course.title, course.course_id, course.percentage, course.completed, course.total, done
        );
    }
    println!();
    println!("Certificates: {}", report.certificates);
    println!("Integrity events: {}", report.integrity_events);
    Ok(())
}

pub async fn lessons(data_dir: &Path, course_id: &str) -> Result<()> {
    let engine = open_engine(data_dir, true).await?;
    let states = engine.lesson_states(course_id)?;
    let Some(course) = engine.catalog().course(course_id) else {
        bail!("Unknown course {}", course_id);
    };
    let progress = engine.store().course(course_id);

    println!("{} ({})", course.title, course.id);
    for (lesson, state) in course.lessons.iter().zip(states) {
        let marker = match state {
            LessonState::Locked => "locked",
            LessonState::Unlocked => "open",
        };
        let done = progress.is_some_and(|p| p.completed_lessons.contains(&lesson.id));
        let score = progress
            .and_then(|p| p.quiz_scores.get(&lesson.id))
            .map(|s| format!(", quiz {}%", s))
            .unwrap_or_default();
        println!(
            "  [{}] {:<8} {} {}{}{}",
            if done { "x" } else { " " },
            marker,
            lesson.id,
            lesson.title,
            if lesson.quiz.is_some() { " (quiz)" } else { "" },
            score
        );
    }
    Ok(())
}

pub async fn select(data_dir: &Path, course_id: &str, lesson_id: &str) -> Result<()> {
    let mut engine = open_engine(data_dir, true).await?;
    match engine.select_lesson(course_id, lesson_id)? {
        LessonState::Locked => {
            println!("Lesson {} is locked. Finish the previous lesson first.", lesson_id)
        }
        LessonState::Unlocked => println!("Selected {}", lesson_id),
    }
    engine.flush_writes().await;
    Ok(())
}

fn report_completion(achieved: Option<CompletionAchieved>) {
    if let Some(done) = achieved {
        println!("Lesson {} watched", done.lesson_id);
    }
}

pub async fn duration(data_dir: &Path, lesson_id: &str, seconds: f64) -> Result<()> {
    let mut engine = open_engine(data_dir, false).await?;
    report_completion(engine.record_duration(lesson_id, seconds)?);
    engine.flush_writes().await;
    Ok(())
}

pub async fn ended(data_dir: &Path, lesson_id: &str) -> Result<()> {
    let mut engine = open_engine(data_dir, false).await?;
    report_completion(engine.media_ended(lesson_id)?);
    engine.flush_writes().await;
    Ok(())
}

/// Stream samples from stdin through the coalescer until EOF or Ctrl-C
pub async fn watch(data_dir: &Path, course_id: &str, lesson_id: &str) -> Result<()> {
    let mut engine = open_engine(data_dir, true).await?;
    if engine.select_lesson(course_id, lesson_id)? == LessonState::Locked {
        bail!("Lesson {} is locked", lesson_id);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let window = Duration::from_millis(engine.config().telemetry.debounce_ms);
    let (tx, rx) = mpsc::channel(256);
    let (mut samples, coalescer) = spawn_coalescer(window, rx);

    // Blocking stdin reads live on their own thread; a read in progress
    // cannot hold up shutdown after Ctrl-C
    let (line_tx, mut line_rx) = mpsc::channel::<Sample>(256);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Sample>(line) {
                Ok(sample) => {
                    if line_tx.blocking_send(sample).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Skipping malformed sample: {}", e),
            }
        }
        debug!("Telemetry input finished");
    });

    // Owns the coalescer's sender so aborting it closes the coalescer
    let reader = tokio::spawn(async move {
        while let Some(sample) = line_rx.recv().await {
            if tx.send(sample).await.is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let mut applied = 0usize;

    loop {
        tokio::select! {
            maybe = samples.recv() => {
                let Some(sample) = maybe else { break };
                applied += 1;
                match engine.apply_sample(&sample) {
                    Ok(achieved) => report_completion(achieved),
                    Err(e @ EngineError::InvalidMediaMetadata { .. }) => warn!("{}", e),
                    Err(e @ EngineError::LessonLocked(_)) => warn!("Skipping sample: {}", e),
                    Err(e) => return Err(e.into()),
                }
            }
            Some(advance) = engine.next_advance() => {
                let to = advance.to_lesson.clone();
                if engine.handle_advance(advance)? {
                    println!("Advanced to {}", to);
                }
            }
            _ = ticker.tick() => {
                if !running.load(Ordering::SeqCst) && !reader.is_finished() {
                    info!("Interrupted, flushing telemetry");
                    // Dropping the sender lets the coalescer drain and stop
                    reader.abort();
                }
            }
        }
    }

    let _ = coalescer.await;
    engine.flush_writes().await;
    info!("Applied {} coalesced samples", applied);
    Ok(())
}

/// `2` picks option 2, `-` leaves the question unanswered
fn parse_answers(raw: &[String]) -> Result<Vec<Option<usize>>> {
    raw.iter()
        .map(|a| match a.as_str() {
            "-" | "_" => Ok(None),
            n => n
                .parse::<usize>()
                .map(Some)
                .with_context(|| format!("Invalid answer '{}': expected an option index or '-'", n)),
        })
        .collect()
}

pub async fn submit(data_dir: &Path, course_id: &str, lesson_id: &str, answers: &[String]) -> Result<()> {
    let answers = parse_answers(answers)?;
    let mut engine = open_engine(data_dir, true).await?;

    let outcome = engine.submit_quiz(course_id, lesson_id, &answers)?;
    println!("{}", outcome.message());
    if let SubmissionOutcome::Passed { certificate: Some(certificate), .. } = &outcome {
        println!("Certificate {}: {}", certificate.id, certificate.summary());
    }

    engine.flush_writes().await;
    Ok(())
}

pub async fn notify(data_dir: &Path) -> Result<()> {
    let engine = open_engine(data_dir, true).await?;
    let notifications = engine.notifications(Utc::now());
    if notifications.is_empty() {
        println!("No reminders");
    }
    for n in notifications {
        println!("[{:?}] {}", n.kind, n.message);
    }
    Ok(())
}

pub fn certificates(data_dir: &Path, export: Option<&Path>) -> Result<()> {
    let store = open_store(data_dir)?;

    if let Some(path) = export {
        std::fs::write(path, serde_json::to_string_pretty(store.certificates())?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("Exported {} certificates to {:?}", store.certificates().len(), path);
        return Ok(());
    }

    if store.certificates().is_empty() {
        println!("No certificates yet");
    }
    for c in store.certificates() {
        println!("{}  {}", c.id, c.summary());
    }
    Ok(())
}

pub fn integrity(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    if store.integrity_log().is_empty() {
        println!("No integrity events");
    }
    for event in store.integrity_log() {
        let context = match (&event.course_id, &event.lesson_id) {
            (Some(c), Some(l)) => format!(" [{} / {}]", c, l),
            _ => String::new(),
        };
        println!(
            "{} {:?}{}: {}",
            event.at.format("%Y-%m-%d %H:%M:%S"),
            event.kind,
            context,
            event.reason
        );
    }
    Ok(())
}

fn has_mirror(engine: &LearnerEngine) -> bool {
    if engine.config().sync.backend == SyncBackend::None {
        println!("No mirror configured. Set [sync.backend] in {}", CONFIG_FILE);
        return false;
    }
    true
}

pub async fn sync_pull(data_dir: &Path) -> Result<()> {
    let mut engine = open_engine(data_dir, false).await?;
    if !has_mirror(&engine) {
        return Ok(());
    }

    let report = engine.pull_remote().await?;
    println!("Pulled remote progress");
    println!("   Courses merged: {}", report.courses_merged);
    println!("   Courses created: {}", report.courses_created);
    println!("   Lessons marked watched: {}", report.forced_watched.len());
    Ok(())
}

pub async fn sync_push(data_dir: &Path) -> Result<()> {
    let engine = open_engine(data_dir, false).await?;
    if !has_mirror(&engine) {
        return Ok(());
    }

    let count = engine.push_remote().await?;
    println!("Pushed {} courses", count);
    Ok(())
}

pub async fn reset(data_dir: &Path, yes: bool) -> Result<()> {
    if !yes {
        println!("This clears playback state and course progress.");
        println!("Certificates and the integrity log are kept.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    let mut engine = open_engine(data_dir, false).await?;
    engine.reset()?;
    println!("Progress reset");
    Ok(())
}
