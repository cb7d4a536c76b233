// SPDX-License-Identifier: MPL-2.0

//! Fixed-rate frame production.
//!
//! Each iteration takes the engine lock once to advance every track and copy
//! out the frame inputs, composes without the lock, hands the frame to the
//! sink and the preview queue, then sleeps off the rest of the frame interval.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

use eyre::eyre;
use tracing::{debug, error, trace, warn};

use crate::{engine::Shared, frame_queue::PreviewFrame, sink::CameraSink};

/// Iterations averaged for the achieved rate.
const FPS_WINDOW: usize = 30;

/// Pump counters, readable while the pump runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpStats {
    pub frames_produced: u64,
    pub frames_failed: u64,
    /// Achieved output rate over the last iterations.
    pub average_fps: f64,
    /// Time the last sink call took.
    pub last_send: Option<Duration>,
}

/// Rolling achieved-rate estimate.
#[derive(Debug, Default)]
pub struct FpsCounter {
    stamps: VecDeque<Instant>,
}

impl FpsCounter {
    /// Record a frame at `now` and return the current estimate.
    pub fn tick(&mut self, now: Instant) -> f64 {
        if self.stamps.len() == FPS_WINDOW {
            self.stamps.pop_front();
        }
        self.stamps.push_back(now);

        match (self.stamps.front(), self.stamps.back()) {
            (Some(first), Some(last)) if self.stamps.len() > 1 => {
                let span = last.saturating_duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (self.stamps.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

/// Time to sleep after an iteration that took `elapsed`.
#[must_use]
pub fn pacing_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Produce, send and publish one frame. Returns the sink call duration.
fn produce(
    shared: &Shared,
    sink: &mut dyn CameraSink,
    now: Instant,
    sequence: u64,
) -> eyre::Result<Duration> {
    let inputs = {
        let mut state = shared.state();
        let state = state
            .as_mut()
            .ok_or_else(|| eyre!("engine state released while pumping"))?;
        state.frame_inputs(now)?
    };

    let frame = inputs.compose();

    let send_started = Instant::now();
    sink.send_frame(&frame)?;
    let send = send_started.elapsed();

    shared.preview.push(PreviewFrame::new(frame, sequence));
    Ok(send)
}

/// Run until the engine's running flag is cleared, then hand the sink back.
pub(crate) fn run(shared: &Shared, mut sink: Box<dyn CameraSink>, fps: u32) -> Box<dyn CameraSink> {
    let interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let mut fps_counter = FpsCounter::default();
    let mut sequence = 1;

    debug!(?interval, sink = sink.name(), "frame pump running");

    while shared.running.load(Ordering::Acquire) {
        let started = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| {
            produce(shared, sink.as_mut(), started, sequence)
        }));

        let mut stats = shared.stats();
        match result {
            Ok(Ok(send)) => {
                stats.frames_produced += 1;
                stats.last_send = Some(send);
                stats.average_fps = fps_counter.tick(started);
                if stats.frames_produced % FPS_WINDOW as u64 == 0 {
                    debug!(
                        fps = stats.average_fps,
                        frames = stats.frames_produced,
                        failed = stats.frames_failed,
                        "pump rate"
                    );
                }
            }
            Ok(Err(why)) => {
                stats.frames_failed += 1;
                warn!(?why, sequence, "frame skipped");
            }
            Err(_) => {
                stats.frames_failed += 1;
                error!(sequence, "frame panicked, skipped");
            }
        }
        drop(stats);
        sequence += 1;

        let elapsed = started.elapsed();
        trace!(?elapsed, sequence, "frame done");
        let delay = pacing_delay(interval, elapsed);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    debug!(frames = sequence - 1, "frame pump exiting");
    sink
}
