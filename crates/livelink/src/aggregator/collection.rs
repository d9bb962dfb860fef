// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owner of every live link.

use crate::link::{ConnectionMonitor, LinkId, LinkState};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owns the process's [`ConnectionMonitor`]s and drives them.
///
/// The generation counter changes whenever membership or group
/// assignment changes, so readers can cache derived views.
#[derive(Default)]
pub struct LinkCollection {
    links: Mutex<BTreeMap<LinkId, ConnectionMonitor>>,
    removed: Arc<Mutex<Vec<LinkId>>>,
    generation: AtomicU64,
}

impl LinkCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `monitor`. Dead links are dropped on the next tick.
    pub fn add(&self, mut monitor: ConnectionMonitor) -> LinkId {
        let id = monitor.id();
        let removed = Arc::clone(&self.removed);
        monitor.on_removed(Box::new(move |id| removed.lock().push(id)));

        log::debug!(
            "[links] added {} for '{}'",
            id,
            monitor.provider_name()
        );
        self.links.lock().insert(id, monitor);
        self.bump();
        id
    }

    /// Remove a link explicitly. Dropping the monitor closes its endpoint.
    pub fn remove(&self, id: LinkId) -> Option<ConnectionMonitor> {
        let monitor = self.links.lock().remove(&id);
        if monitor.is_some() {
            self.bump();
        }
        monitor
    }

    /// Update every link and drop the ones that died.
    ///
    /// Returns the ids removed during this tick.
    pub fn tick(&self) -> Vec<LinkId> {
        let mut links = self.links.lock();
        for monitor in links.values_mut() {
            monitor.update();
        }

        let dead: Vec<LinkId> = std::mem::take(&mut *self.removed.lock());
        let mut removed = Vec::with_capacity(dead.len());
        for id in dead {
            if links.remove(&id).is_some() {
                log::info!("[links] {} removed after provider timeout", id);
                removed.push(id);
            }
        }
        drop(links);

        if !removed.is_empty() {
            self.bump();
        }
        removed
    }

    /// Assign `id` to a named group (or none).
    ///
    /// Prefer this over [`ConnectionMonitor::set_group`] so aggregated views
    /// notice the change.
    pub fn set_group(&self, id: LinkId, group: Option<String>) -> bool {
        let found = self
            .links
            .lock()
            .get(&id)
            .map(|monitor| monitor.set_group(group))
            .is_some();
        if found {
            self.bump();
        }
        found
    }

    /// Run `f` against one link.
    pub fn with_link<R>(&self, id: LinkId, f: impl FnOnce(&ConnectionMonitor) -> R) -> Option<R> {
        self.links.lock().get(&id).map(f)
    }

    /// Run `f` against every link, in id order.
    pub fn for_each(&self, mut f: impl FnMut(&ConnectionMonitor)) {
        for monitor in self.links.lock().values() {
            f(monitor);
        }
    }

    pub fn ids(&self) -> Vec<LinkId> {
        self.links.lock().keys().copied().collect()
    }

    pub fn states(&self) -> Vec<(LinkId, LinkState)> {
        self.links
            .lock()
            .iter()
            .map(|(id, monitor)| (*id, monitor.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    /// Membership generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for LinkCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkCollection")
            .field("links", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}
