// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Group views and bulk operations over a [`LinkCollection`].

use super::{CalibrationOutcome, GroupEnabled, LinkCollection};
use crate::link::{ConnectionMonitor, LinkId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Views {
    generation: Option<u64>,
    links: Vec<LinkId>,
    groups: BTreeMap<String, Vec<LinkId>>,
}

/// Named groups and bulk settings.
pub struct Aggregator {
    links: Arc<LinkCollection>,
    views: Mutex<Views>,
    rebuilds: AtomicU64,
}

impl Aggregator {
    pub fn new(links: Arc<LinkCollection>) -> Self {
        Self {
            links,
            views: Mutex::new(Views::default()),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn collection(&self) -> &Arc<LinkCollection> {
        &self.links
    }

    fn refresh<R>(&self, f: impl FnOnce(&Views) -> R) -> R {
        let generation = self.links.generation();
        let mut views = self.views.lock();
        if views.generation != Some(generation) {
            let mut links = Vec::new();
            let mut groups: BTreeMap<String, Vec<LinkId>> = BTreeMap::new();
            self.links.for_each(|monitor| {
                links.push(monitor.id());
                if let Some(group) = monitor.group() {
                    groups.entry(group).or_default().push(monitor.id());
                }
            });
            *views = Views {
                generation: Some(generation),
                links,
                groups,
            };
            self.rebuilds.fetch_add(1, Ordering::Relaxed);
            log::trace!("[aggregator] views rebuilt at generation {}", generation);
        }
        f(&views)
    }

    /// View rebuilds so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub fn links(&self) -> Vec<LinkId> {
        self.refresh(|v| v.links.clone())
    }

    pub fn groups(&self) -> Vec<String> {
        self.refresh(|v| v.groups.keys().cloned().collect())
    }

    pub fn group_members(&self, group: &str) -> Vec<LinkId> {
        self.refresh(|v| v.groups.get(group).cloned().unwrap_or_default())
    }

    fn each_member(&self, group: &str, mut f: impl FnMut(&ConnectionMonitor)) -> usize {
        let members = self.group_members(group);
        let mut applied = 0;
        for id in members {
            if self.links.with_link(id, &mut f).is_some() {
                applied += 1;
            }
        }
        applied
    }

    // ------------------------------------------------------------------
    // Group writes
    // ------------------------------------------------------------------

    /// Returns the number of links updated.
    pub fn set_group_enabled(&self, group: &str, enabled: bool) -> usize {
        self.each_member(group, |m| m.set_enabled(enabled))
    }

    /// Each link clamps `size` by the global policy.
    pub fn set_group_buffer_size(&self, group: &str, size: usize) -> usize {
        self.each_member(group, |m| {
            m.set_buffer_size(size);
        })
    }

    pub fn set_group_evaluation_offset(&self, group: &str, offset: f64) -> usize {
        self.each_member(group, |m| m.set_evaluation_offset(offset))
    }

    // ------------------------------------------------------------------
    // Group reads
    // ------------------------------------------------------------------

    pub fn group_enabled(&self, group: &str) -> GroupEnabled {
        let mut values = Vec::new();
        self.each_member(group, |m| values.push(m.is_enabled()));
        GroupEnabled::from_values(values)
    }

    /// `(min, max)` buffer size across the group, `None` if empty.
    pub fn group_buffer_size(&self, group: &str) -> Option<(usize, usize)> {
        let mut range: Option<(usize, usize)> = None;
        self.each_member(group, |m| {
            let size = m.buffer_size();
            range = Some(match range {
                Some((lo, hi)) => (lo.min(size), hi.max(size)),
                None => (size, size),
            });
        });
        range
    }

    /// `(min, max)` evaluation offset across the group, `None` if empty.
    pub fn group_evaluation_offset(&self, group: &str) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        self.each_member(group, |m| {
            let offset = m.evaluation_offset();
            range = Some(match range {
                Some((lo, hi)) => (lo.min(offset), hi.max(offset)),
                None => (offset, offset),
            });
        });
        range
    }

    // ------------------------------------------------------------------
    // Calibration
    // ------------------------------------------------------------------

    /// Check whether `id` has what timecode calibration needs.
    ///
    /// When a subject's buffer is full the link's buffer is doubled (within
    /// policy) and the caller should retry. `None` for an unknown link.
    pub fn check_calibration(&self, id: LinkId) -> Option<CalibrationOutcome> {
        self.links.with_link(id, check_link)
    }
}

fn check_link(monitor: &ConnectionMonitor) -> CalibrationOutcome {
    if !monitor.is_valid() {
        return CalibrationOutcome::FailedUnresponsiveInput;
    }

    let names: Vec<String> = monitor
        .subjects()
        .into_iter()
        .map(|key| key.subject_name)
        .collect();
    let buffered: Vec<usize> = names.iter().map(|n| monitor.buffered(n)).collect();
    if buffered.iter().all(|&n| n == 0) {
        return CalibrationOutcome::FailedNoDataBuffered;
    }

    let timecodes: Vec<_> = names
        .iter()
        .filter_map(|n| monitor.latest_frame(n))
        .filter_map(|frame| frame.time.timecode)
        .collect();
    if timecodes.is_empty() {
        return CalibrationOutcome::FailedNoTimecode;
    }
    if timecodes.iter().any(|tc| !tc.rate.is_valid()) {
        return CalibrationOutcome::FailedInvalidFrameRate;
    }

    let size = monitor.buffer_size();
    if buffered.iter().any(|&n| n >= size) {
        let grown = monitor.set_buffer_size(size.saturating_mul(2));
        if grown > size {
            log::debug!(
                "[aggregator] {} buffer grown {} -> {} for calibration",
                monitor.id(),
                size,
                grown
            );
            return CalibrationOutcome::RetryBufferSizeIncreased;
        }
    }
    CalibrationOutcome::Succeeded
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("links", &self.links)
            .field("rebuilds", &self.rebuilds())
            .finish()
    }
}
