// SPDX-License-Identifier: MPL-2.0

//! Wall-clock driven playback of a decoded frame sequence.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use super::types::{LoadedAsset, frame_duration_at};

/// Playback position within a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Frame currently displayed.
    pub index: usize,
    /// Time already spent on `index`, always below its duration.
    pub elapsed: Duration,
    /// Instant of the last advance.
    pub last_tick: Instant,
}

impl Cursor {
    fn start(now: Instant) -> Self {
        Self {
            index: 0,
            elapsed: Duration::ZERO,
            last_tick: now,
        }
    }
}

/// A looping frame sequence with its own playback cursor.
///
/// Frames are shared, so cloning a track is cheap and yields an independent
/// cursor over the same frames.
#[derive(Debug)]
pub struct AnimationTrack<I> {
    frames: Arc<[I]>,
    durations: Arc<[Duration]>,
    loop_duration: Duration,
    source_fps: f64,
    cursor: Cursor,
}

impl<I> Clone for AnimationTrack<I> {
    fn clone(&self) -> Self {
        Self {
            frames: Arc::clone(&self.frames),
            durations: Arc::clone(&self.durations),
            loop_duration: self.loop_duration,
            source_fps: self.source_fps,
            cursor: self.cursor,
        }
    }
}

impl<I> AnimationTrack<I> {
    /// Build a track from a decoded asset, positioned at frame zero.
    ///
    /// Missing or zero durations are replaced by one period of the source rate.
    pub fn new(asset: LoadedAsset<I>, now: Instant) -> Self {
        let fallback = frame_duration_at(asset.source_fps);
        let durations: Arc<[Duration]> = (0..asset.frames.len())
            .map(|i| {
                asset
                    .durations
                    .get(i)
                    .copied()
                    .filter(|d| !d.is_zero())
                    .unwrap_or(fallback)
            })
            .collect();

        Self {
            loop_duration: durations.iter().sum(),
            frames: asset.frames.into(),
            durations,
            source_fps: asset.source_fps,
            cursor: Cursor::start(now),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }

    #[cfg(test)]
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn first_frame(&self) -> Option<&I> {
        self.frames.first()
    }

    /// Move the cursor forward by the wall time since the last advance and
    /// return the frame now under it.
    ///
    /// Returns `None` only for a track without frames.
    pub fn advance(&mut self, now: Instant) -> Option<&I> {
        if self.frames.is_empty() {
            return None;
        }

        let cursor = &mut self.cursor;
        cursor.elapsed += now.saturating_duration_since(cursor.last_tick);
        cursor.last_tick = cursor.last_tick.max(now);

        // Whole loops land on the same frame.
        if cursor.elapsed >= self.loop_duration {
            let nanos = cursor.elapsed.as_nanos() % self.loop_duration.as_nanos();
            cursor.elapsed = Duration::from_nanos(nanos as u64);
        }

        while cursor.elapsed >= self.durations[cursor.index] {
            cursor.elapsed -= self.durations[cursor.index];
            cursor.index = (cursor.index + 1) % self.frames.len();
        }

        self.frames.get(cursor.index)
    }

    /// Rewind to frame zero.
    pub fn reset(&mut self, now: Instant) {
        self.cursor = Cursor::start(now);
    }

    /// Keep the position but discard time spent while inactive.
    pub fn resume(&mut self, now: Instant) {
        self.cursor.last_tick = now;
    }

    /// Independent copy whose cursor continues from the current position.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> Self {
        let mut copy = self.clone();
        copy.resume(now);
        copy
    }

    /// Whether both tracks play the same frames.
    #[cfg(test)]
    pub fn shares_frames(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(durations_ms: &[u64]) -> AnimationTrack<usize> {
        let asset = LoadedAsset {
            frames: (0..durations_ms.len()).collect(),
            durations: durations_ms.iter().copied().map(Duration::from_millis).collect(),
            source_fps: 10.0,
            path: None,
        };
        AnimationTrack::new(asset, Instant::now())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn advance_moves_by_elapsed_time() {
        let mut track = track(&[100, 100, 100, 100]);
        let start = track.cursor().last_tick;

        assert_eq!(track.advance(start + ms(50)), Some(&0));
        assert_eq!(track.advance(start + ms(250)), Some(&2));
        assert_eq!(track.cursor().elapsed, ms(50));
        assert_eq!(track.advance(start + ms(399)), Some(&3));
    }

    #[test]
    fn advance_wraps_around() {
        let mut track = track(&[100, 100, 100]);
        let start = track.cursor().last_tick;

        assert_eq!(track.advance(start + ms(300)), Some(&0));
        assert_eq!(track.advance(start + ms(3_150)), Some(&1));
        assert!(track.cursor().elapsed < ms(100));
    }

    #[test]
    fn uneven_durations_are_respected() {
        let mut track = track(&[20, 200]);
        let start = track.cursor().last_tick;

        assert_eq!(track.advance(start + ms(20)), Some(&1));
        assert_eq!(track.advance(start + ms(219)), Some(&1));
        assert_eq!(track.advance(start + ms(220)), Some(&0));
    }

    #[test]
    fn zero_durations_use_source_rate() {
        let mut track = track(&[0, 0]);
        let start = track.cursor().last_tick;

        // 10 fps source
        assert_eq!(track.advance(start + ms(99)), Some(&0));
        assert_eq!(track.advance(start + ms(100)), Some(&1));
    }

    #[test]
    fn single_frame_never_moves() {
        let mut track = track(&[1_000]);
        let start = track.cursor().last_tick;

        for secs in [1, 5, 60] {
            assert_eq!(track.advance(start + Duration::from_secs(secs)), Some(&0));
            assert!(track.cursor().elapsed < ms(1_000));
        }
    }

    #[test]
    fn empty_track_yields_nothing() {
        let mut track = track(&[]);
        assert!(track.is_empty());
        assert_eq!(track.advance(Instant::now()), None);
    }

    #[test]
    fn earlier_instant_does_not_rewind() {
        let mut track = track(&[100, 100]);
        let start = track.cursor().last_tick;

        track.advance(start + ms(150));
        assert_eq!(track.advance(start + ms(50)), Some(&1));
        assert_eq!(track.cursor().last_tick, start + ms(150));
    }

    #[test]
    fn resume_skips_inactive_time() {
        let mut track = track(&[100, 100, 100]);
        let start = track.cursor().last_tick;

        track.advance(start + ms(120));
        track.resume(start + ms(5_000));
        assert_eq!(track.advance(start + ms(5_010)), Some(&1));
        assert_eq!(track.cursor().elapsed, ms(30));
    }

    #[test]
    fn snapshot_has_independent_cursor() {
        let mut track = track(&[100, 100]);
        let start = track.cursor().last_tick;
        track.advance(start + ms(120));

        let mut copy = track.snapshot(start + ms(120));
        assert!(copy.shares_frames(&track));

        track.reset(start + ms(120));
        assert_eq!(copy.advance(start + ms(200)), Some(&0));
        assert_eq!(track.advance(start + ms(200)), Some(&0));
        assert_eq!(copy.advance(start + ms(250)), Some(&0));
        assert_eq!(copy.cursor().index, 0);
    }

    #[test]
    fn source_frames_shown_follow_source_rate() {
        const SECONDS: u32 = 3;

        for (source_fps, output_fps) in [(10, 60), (15, 30), (24, 10), (30, 7), (60, 60)] {
            let period = Duration::from_secs_f64(1.0 / f64::from(source_fps));
            let frames = 1_000;
            let asset = LoadedAsset {
                frames: (0..frames).collect(),
                durations: vec![period; frames],
                source_fps: f64::from(source_fps),
                path: None,
            };
            let start = Instant::now();
            let mut track = AnimationTrack::new(asset, start);

            let mut shown = 0;
            let mut last = 0;
            for tick in 1..=SECONDS * output_fps {
                let now = start + Duration::from_secs_f64(f64::from(tick) / f64::from(output_fps));
                let index = *track.advance(now).unwrap();
                if index != last {
                    shown += 1;
                    last = index;
                }
            }

            let advanced = track.cursor().index as u32;
            let expected = SECONDS * source_fps;
            assert!(
                advanced.abs_diff(expected) <= 1,
                "S={source_fps} F={output_fps}: advanced {advanced}, expected {expected}"
            );

            let visible = SECONDS * source_fps.min(output_fps);
            assert!(
                u32::abs_diff(shown, visible) <= 1,
                "S={source_fps} F={output_fps}: shown {shown}, expected {visible}"
            );
        }
    }
}
