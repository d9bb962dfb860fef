// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Newest-first sample ring with FIFO eviction.

use super::stats::{BufferStats, CachedState};
use super::{BufferPolicy, EvaluationMode};
use crate::error::{Error, Result};
use crate::time::SampleTime;
use std::collections::VecDeque;
use std::ops::Range;

/// One buffered sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub time: SampleTime,
    /// Validity span in seconds; zero means an instantaneous sample
    pub duration: f64,
    pub payload: T,
}

impl<T> Sample<T> {
    pub fn new(time: SampleTime, payload: T) -> Self {
        Self {
            time,
            duration: 0.0,
            payload,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }
}

/// Bounded, time-ordered sample store.
///
/// Not internally synchronized: the owner (a link's subject table) guards it.
#[derive(Debug)]
pub struct SampleBuffer<T> {
    /// Front is newest
    samples: VecDeque<Sample<T>>,
    max_size: usize,
    mode: EvaluationMode,
    stats_enabled: bool,
    stats: BufferStats,
    cached: CachedState,
}

impl<T> SampleBuffer<T> {
    /// Create a buffer holding at most `max_size` samples (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            samples: VecDeque::with_capacity(max_size),
            max_size,
            mode: EvaluationMode::default(),
            stats_enabled: true,
            stats: BufferStats::default(),
            cached: CachedState::default(),
        }
    }

    /// Builder: select the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: enable or disable under/overflow accounting.
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    fn key(&self, sample: &Sample<T>) -> f64 {
        sample
            .time
            .seconds(self.mode)
            .unwrap_or(sample.time.platform_seconds)
    }

    /// Insert a sample in time order. Evicts the oldest sample when full.
    pub fn add(&mut self, sample: Sample<T>) {
        let key = self.key(&sample);
        let pos = self
            .samples
            .iter()
            .position(|s| self.key(s) <= key)
            .unwrap_or(self.samples.len());
        self.samples.insert(pos, sample);

        while self.samples.len() > self.max_size {
            self.samples.pop_back();
            self.stats.frame_drop += 1;
        }
    }

    /// Remove and return the newest sample whose `[time, time + duration)`
    /// overlaps `range`.
    pub fn fetch(&mut self, range: Range<f64>) -> Result<Sample<T>> {
        let idx = self
            .samples
            .iter()
            .position(|s| {
                let start = self.key(s);
                if s.duration > 0.0 {
                    start < range.end && start + s.duration > range.start
                } else {
                    start >= range.start && start < range.end
                }
            })
            .ok_or(Error::NotFound)?;
        self.samples.remove(idx).ok_or(Error::NotFound)
    }

    /// Snapshot sample timestamps at `evaluation_time` and update statistics.
    pub fn cache_state(&mut self, evaluation_time: f64) -> &CachedState {
        let sample_times: Vec<f64> = self.samples.iter().map(|s| self.key(s)).collect();
        let mut state = CachedState {
            evaluation_time,
            distance_to_newest: None,
            distance_to_oldest: None,
            sample_times,
        };

        if self.stats_enabled {
            if let (Some(&newest), Some(&oldest)) =
                (state.sample_times.first(), state.sample_times.last())
            {
                let to_newest = newest - evaluation_time;
                let to_oldest = evaluation_time - oldest;
                if to_newest < 0.0 {
                    self.stats.overflow += 1;
                }
                if to_oldest < 0.0 {
                    self.stats.underflow += 1;
                }
                state.distance_to_newest = Some(to_newest);
                state.distance_to_oldest = Some(to_oldest);
            }
        }

        self.cached = state;
        &self.cached
    }

    /// Sample to present at `evaluation_time`.
    ///
    /// Mode `None` ignores the time and returns the newest sample. Otherwise
    /// returns the newest sample at or before `evaluation_time`, falling back
    /// to the oldest one when the evaluation time precedes the whole buffer.
    pub fn evaluate(&mut self, evaluation_time: f64) -> Option<&Sample<T>> {
        if self.mode == EvaluationMode::None {
            return self.samples.front();
        }
        self.cache_state(evaluation_time);
        let idx = self
            .samples
            .iter()
            .position(|s| self.key(s) <= evaluation_time)
            .unwrap_or_else(|| self.samples.len().saturating_sub(1));
        self.samples.get(idx)
    }

    pub fn latest(&self) -> Option<&Sample<T>> {
        self.samples.front()
    }

    pub fn oldest(&self) -> Option<&Sample<T>> {
        self.samples.back()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample<T>> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Resize within `policy`. Shrinking evicts the oldest samples.
    ///
    /// Returns the size actually applied.
    pub fn set_max_size(&mut self, size: usize, policy: &BufferPolicy) -> usize {
        self.max_size = policy.clamp(size).max(1);
        while self.samples.len() > self.max_size {
            self.samples.pop_back();
            self.stats.frame_drop += 1;
        }
        self.max_size
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Change the evaluation mode and re-sort on the new axis.
    pub fn set_mode(&mut self, mode: EvaluationMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        let mut samples: Vec<Sample<T>> = self.samples.drain(..).collect();
        samples.sort_by(|a, b| self.key(b).total_cmp(&self.key(a)));
        self.samples = samples.into();
    }

    pub fn set_stats_enabled(&mut self, enabled: bool) {
        self.stats_enabled = enabled;
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Last state captured by [`cache_state`](Self::cache_state).
    pub fn cached_state(&self) -> &CachedState {
        &self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{FrameRate, QualifiedFrameTime};

    fn at(t: f64) -> Sample<u32> {
        Sample::new(SampleTime::from_platform(t), (t * 10.0) as u32)
    }

    #[test]
    fn test_add_keeps_newest_first() {
        let mut buf = SampleBuffer::new(8);
        buf.add(at(1.0));
        buf.add(at(3.0));
        buf.add(at(2.0));
        let times: Vec<f64> = buf.iter().map(|s| s.time.platform_seconds).collect();
        assert_eq!(times, vec![3.0, 2.0, 1.0]);
        assert_eq!(buf.latest().map(|s| s.payload), Some(30));
    }

    #[test]
    fn test_eviction_drops_exactly_oldest() {
        let n = 4;
        let mut buf = SampleBuffer::new(n);
        for i in 0..=n {
            buf.add(at(i as f64));
        }
        assert_eq!(buf.len(), n);
        assert_eq!(buf.stats().frame_drop, 1);
        assert_eq!(buf.oldest().map(|s| s.time.platform_seconds), Some(1.0));
    }

    #[test]
    fn test_late_sample_older_than_everything_is_dropped() {
        let mut buf = SampleBuffer::new(2);
        buf.add(at(5.0));
        buf.add(at(6.0));
        buf.add(at(1.0));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.stats().frame_drop, 1);
        assert_eq!(buf.oldest().map(|s| s.time.platform_seconds), Some(5.0));
    }

    #[test]
    fn test_fetch_overlap_removes_newest_match() {
        let mut buf = SampleBuffer::new(8);
        buf.add(at(1.0).with_duration(1.0));
        buf.add(at(2.0).with_duration(1.0));
        buf.add(at(4.0).with_duration(1.0));

        let hit = buf.fetch(1.5..2.5).unwrap();
        assert_eq!(hit.time.platform_seconds, 2.0);
        assert_eq!(buf.len(), 2);

        let hit = buf.fetch(1.5..2.5).unwrap();
        assert_eq!(hit.time.platform_seconds, 1.0);

        assert!(matches!(buf.fetch(10.0..11.0), Err(Error::NotFound)));
    }

    #[test]
    fn test_fetch_instantaneous_sample() {
        let mut buf = SampleBuffer::new(4);
        buf.add(at(2.0));
        assert!(buf.fetch(2.5..3.0).is_err());
        assert!(buf.fetch(2.0..2.1).is_ok());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_cache_state_counts_overflow_and_underflow() {
        let mut buf = SampleBuffer::new(8);
        buf.add(at(10.0));
        buf.add(at(11.0));

        let state = buf.cache_state(10.5).clone();
        assert_eq!(state.sample_times, vec![11.0, 10.0]);
        assert_eq!(state.distance_to_newest, Some(0.5));
        assert!(buf.stats().is_clean());

        buf.cache_state(12.0);
        assert_eq!(buf.stats().overflow, 1);
        assert_eq!(buf.stats().underflow, 0);

        buf.cache_state(9.0);
        assert_eq!(buf.stats().underflow, 1);

        buf.reset_stats();
        assert!(buf.stats().is_clean());
    }

    #[test]
    fn test_cache_state_without_stats() {
        let mut buf = SampleBuffer::new(8).with_stats(false);
        buf.add(at(1.0));
        let state = buf.cache_state(5.0);
        assert_eq!(state.distance_to_newest, None);
        assert!(buf.stats().is_clean());
    }

    #[test]
    fn test_cache_state_empty_buffer_does_not_count() {
        let mut buf: SampleBuffer<u32> = SampleBuffer::new(8);
        buf.cache_state(5.0);
        assert!(buf.stats().is_clean());
    }

    #[test]
    fn test_evaluate_by_time() {
        let mut buf = SampleBuffer::new(8);
        for t in [1.0, 2.0, 3.0] {
            buf.add(at(t));
        }
        assert_eq!(buf.evaluate(2.5).map(|s| s.payload), Some(20));
        assert_eq!(buf.evaluate(0.5).map(|s| s.payload), Some(10));
        assert_eq!(buf.stats().underflow, 1);
    }

    #[test]
    fn test_evaluate_mode_none_returns_newest() {
        let mut buf = SampleBuffer::new(8).with_mode(EvaluationMode::None);
        buf.add(at(1.0));
        buf.add(at(2.0));
        assert_eq!(buf.evaluate(0.0).map(|s| s.payload), Some(20));
        assert!(buf.stats().is_clean());
    }

    #[test]
    fn test_timecode_axis() {
        let rate = FrameRate::FPS_30;
        let mut buf = SampleBuffer::new(8).with_mode(EvaluationMode::Timecode);
        // platform order disagrees with timecode order
        let a = SampleTime::from_platform(5.0).with_timecode(QualifiedFrameTime::new(30.0, rate));
        let b = SampleTime::from_platform(1.0).with_timecode(QualifiedFrameTime::new(60.0, rate));
        buf.add(Sample::new(a, 1u32));
        buf.add(Sample::new(b, 2u32));
        assert_eq!(buf.latest().map(|s| s.payload), Some(2));

        buf.set_mode(EvaluationMode::PlatformTime);
        assert_eq!(buf.latest().map(|s| s.payload), Some(1));
    }

    #[test]
    fn test_set_max_size_clamps_and_trims() {
        let policy = BufferPolicy::new(2, 5);
        let mut buf = SampleBuffer::new(5);
        for t in 0..5 {
            buf.add(at(t as f64));
        }
        assert_eq!(buf.set_max_size(1, &policy), 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.stats().frame_drop, 3);
        assert_eq!(buf.set_max_size(100, &policy), 5);
    }
}
