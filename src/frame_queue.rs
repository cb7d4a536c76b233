// SPDX-License-Identifier: MPL-2.0

//! Single-slot preview queue between the frame pump and the UI.
//!
//! ```text
//! ┌─────────────┐
//! │ Frame pump  │
//! └─────┬───────┘
//!       │ push() - replaces the pending frame
//!       ▼
//! ┌─────────────┐
//! │ Preview     │  ← one slot
//! └─────┬───────┘
//!       │ latest() - reuses last frame if empty
//!       ▼
//! ┌─────────────┐
//! │ UI          │
//! └─────────────┘
//! ```
//!
//! # Key Guarantees
//!
//! - **Drop oldest**: an unread frame is replaced, never queued behind
//! - **Consumer never blocks**: returns immediately, reusing the last frame if empty
//! - **Never grows**: at most one pending frame

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use image::RgbImage;

/// A composited frame waiting for the UI.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub image: Arc<RgbImage>,
    /// Position in the pump's output sequence.
    pub sequence: u64,
    pub queued_at: Instant,
}

impl PreviewFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            queued_at: Instant::now(),
        }
    }
}

/// Preview queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames accepted by `push`.
    pub frames_pushed: u64,
    /// Pending frames replaced before anyone read them.
    pub frames_dropped: u64,
    /// Frames taken from the slot.
    pub frames_popped: u64,
    /// Times the consumer got the previous frame again.
    pub frames_reused: u64,
}

/// A thread-safe, single-slot, drop-oldest frame queue.
#[derive(Debug, Default)]
pub struct PreviewQueue {
    slot: Mutex<Option<PreviewFrame>>,
    last_frame: Mutex<Option<PreviewFrame>>,
    stopped: AtomicBool,
    stats_pushed: AtomicU64,
    stats_dropped: AtomicU64,
    stats_popped: AtomicU64,
    stats_reused: AtomicU64,
}

impl PreviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a frame, replacing any frame still pending.
    ///
    /// Returns `false` if the queue is stopped.
    pub fn push(&self, frame: PreviewFrame) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(frame) {
            self.stats_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                sequence = old.sequence,
                age_ms = old.queued_at.elapsed().as_millis(),
                "preview dropped: not consumed"
            );
        }
        self.stats_pushed.fetch_add(1, Ordering::Relaxed);

        true
    }

    /// Take the pending frame, if any. Never blocks.
    pub fn try_pop(&self) -> Option<PreviewFrame> {
        let frame = self.slot.try_lock().ok()?.take()?;
        self.stats_popped.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut last) = self.last_frame.try_lock() {
            *last = Some(frame.clone());
        }

        Some(frame)
    }

    /// Newest available frame: the pending one, else the last one handed out.
    ///
    /// Returns `None` only if no frame has ever been received.
    pub fn latest(&self) -> Option<PreviewFrame> {
        if let Some(frame) = self.try_pop() {
            return Some(frame);
        }

        let last = self.last_frame.try_lock().ok()?.clone()?;
        self.stats_reused.fetch_add(1, Ordering::Relaxed);
        Some(last)
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Refuse further frames.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Accept frames again and drop anything pending; the last frame is kept.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slot
            .try_lock()
            .map_or(0, |slot| usize::from(slot.is_some()))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            frames_pushed: self.stats_pushed.load(Ordering::Relaxed),
            frames_dropped: self.stats_dropped.load(Ordering::Relaxed),
            frames_popped: self.stats_popped.load(Ordering::Relaxed),
            frames_reused: self.stats_reused.load(Ordering::Relaxed),
        }
    }
}
