//! Time-window coalescing of playback samples
//!
//! Players report positions many times a second. Within a window only the
//! latest position per lesson survives; duration and media-ended samples
//! pass straight through.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::Sample;

pub struct Coalescer {
    window: Duration,
    pending: BTreeMap<String, f64>,
    window_start: Option<Instant>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
            window_start: None,
        }
    }

    /// Offer one sample at `now`; returns whatever is ready to apply
    pub fn offer(&mut self, sample: Sample, now: Instant) -> Vec<Sample> {
        match sample {
            Sample::Position { lesson_id, position } => {
                self.pending.insert(lesson_id, position);
                self.window_start.get_or_insert(now);
                self.flush_due(now)
            }
            other => vec![other],
        }
    }

    /// Flush if the current window has elapsed
    pub fn flush_due(&mut self, now: Instant) -> Vec<Sample> {
        match self.window_start {
            Some(start) if now.duration_since(start) >= self.window => self.drain(),
            _ => Vec::new(),
        }
    }

    /// Flush everything pending regardless of the window
    pub fn drain(&mut self) -> Vec<Sample> {
        self.window_start = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(lesson_id, position)| Sample::Position { lesson_id, position })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Run a coalescer as an actor between two channels.
///
/// Flushes on a fixed tick and drains once the input closes, then ends.
pub fn spawn_coalescer(
    window: Duration,
    mut input: mpsc::Receiver<Sample>,
) -> (mpsc::Receiver<Sample>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);

    let handle = tokio::spawn(async move {
        let mut coalescer = Coalescer::new(window);
        // interval() panics on a zero period
        let mut ticker = tokio::time::interval(window.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let ready = tokio::select! {
                maybe = input.recv() => match maybe {
                    Some(sample) => coalescer.offer(sample, Instant::now()),
                    None => {
                        for sample in coalescer.drain() {
                            if tx.send(sample).await.is_err() {
                                return;
                            }
                        }
                        debug!("Telemetry input closed, coalescer stopping");
                        return;
                    }
                },
                _ = ticker.tick() => coalescer.flush_due(Instant::now()),
            };

            for sample in ready {
                if tx.send(sample).await.is_err() {
                    return;
                }
            }
        }
    });

    (rx, handle)
}
