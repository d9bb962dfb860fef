// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ping broadcaster and Pong collector.

use super::ProviderDescriptor;
use crate::clock_sync::one_shot_offset;
use crate::error::Result;
use crate::protocol::{Annotations, LinkMessage, PROTOCOL_VERSION};
use crate::time::Clock;
use crate::transport::{Delivery, Endpoint, EndpointAddress, EndpointKind, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shutdown check granularity of the background loop.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct DiscoveryState {
    interest: usize,
    /// Request id of the outstanding Ping, if any
    current_request: Option<u64>,
    last_request: u64,
    results: Vec<ProviderDescriptor>,
}

/// State reachable from the endpoint's receive handler.
struct Shared {
    state: Mutex<DiscoveryState>,
    clock: Arc<dyn Clock>,
    pongs_rejected: AtomicU64,
}

impl Shared {
    fn handle_pong(&self, message: &LinkMessage, sender: &EndpointAddress, sent_at: f64) -> bool {
        let LinkMessage::Pong {
            provider_name,
            machine_name,
            request_id,
            protocol_version,
            creation_platform_time,
        } = message
        else {
            log::trace!("[discovery] ignoring {} from {}", message.kind(), sender);
            return false;
        };

        if *protocol_version != PROTOCOL_VERSION {
            log::warn!(
                "[discovery] pong from '{}' ({}) has protocol version {} (expected {}), ignored",
                provider_name,
                sender,
                protocol_version,
                PROTOCOL_VERSION
            );
            self.pongs_rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let offset = one_shot_offset(
            self.clock.platform_seconds(),
            *creation_platform_time,
            self.clock.wall_seconds(),
            sent_at,
        );

        let mut state = self.state.lock();
        if state.current_request != Some(*request_id) {
            log::trace!(
                "[discovery] stale pong {} from '{}' (current {:?})",
                request_id,
                provider_name,
                state.current_request
            );
            self.pongs_rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let descriptor = ProviderDescriptor {
            display_name: provider_name.clone(),
            machine_name: machine_name.clone(),
            address: sender.clone(),
            machine_time_offset: offset,
        };
        match state.results.iter_mut().find(|d| d.address == *sender) {
            Some(existing) => *existing = descriptor,
            None => {
                log::debug!(
                    "[discovery] found '{}' on {} at {} (offset {:.6}s)",
                    provider_name,
                    machine_name,
                    sender,
                    offset
                );
                state.results.push(descriptor);
            }
        }
        true
    }

    fn release_interest(&self) {
        let mut state = self.state.lock();
        state.interest = state.interest.saturating_sub(1);
        if state.interest == 0 {
            state.current_request = None;
            log::debug!("[discovery] no interest left, pings paused");
        }
    }
}

/// Periodically broadcasts Ping while interest is held; collects Pongs.
///
/// Explicitly constructed and shared (`Arc`) by whatever creates links.
/// The background loop is optional: [`tick`](Self::tick) runs one cycle.
pub struct DiscoveryBroadcaster {
    shared: Arc<Shared>,
    endpoint: Arc<dyn Endpoint>,
    ping_interval: Duration,
    pings_sent: AtomicU64,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryBroadcaster {
    /// Open a private endpoint on `transport` for Ping/Pong traffic.
    pub fn new(
        transport: &dyn Transport,
        clock: Arc<dyn Clock>,
        ping_interval: Duration,
    ) -> Result<Arc<Self>> {
        let shared = Arc::new(Shared {
            state: Mutex::new(DiscoveryState::default()),
            clock,
            pongs_rejected: AtomicU64::new(0),
        });

        let handler_shared = Arc::clone(&shared);
        let handler = move |d: Delivery| {
            handler_shared.handle_pong(&d.message, &d.sender, d.sent_at);
        };
        let endpoint = transport.open(EndpointKind::Private, Arc::new(handler))?;

        Ok(Arc::new(Self {
            shared,
            endpoint,
            ping_interval,
            pings_sent: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }))
    }

    /// Register one unit of interest. Pings are sent while any handle lives.
    pub fn subscribe(&self) -> DiscoveryInterest {
        let mut state = self.shared.state.lock();
        state.interest += 1;
        if state.interest == 1 {
            state.results.clear();
            log::debug!("[discovery] interest registered, pings resumed");
        }
        DiscoveryInterest {
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    pub fn interest_count(&self) -> usize {
        self.shared.state.lock().interest
    }

    /// Run one discovery cycle.
    ///
    /// With interest held: new request id, clear results, broadcast Ping.
    /// Returns `true` if a Ping was sent.
    pub fn tick(&self) -> bool {
        let request_id = {
            let mut state = self.shared.state.lock();
            if state.interest == 0 {
                return false;
            }
            state.last_request = state.last_request.wrapping_add(1);
            let id = state.last_request;
            state.current_request = Some(id);
            state.results.clear();
            id
        };

        let ping = LinkMessage::Ping {
            request_id,
            protocol_version: PROTOCOL_VERSION,
        };
        match self.endpoint.broadcast(ping, Annotations::new()) {
            Ok(()) => {
                self.pings_sent.fetch_add(1, Ordering::Relaxed);
                log::trace!("[discovery] ping {} sent", request_id);
                true
            }
            Err(e) => {
                log::debug!("[discovery] ping {} failed: {}", request_id, e);
                false
            }
        }
    }

    /// Feed a Pong received outside the broadcaster's own endpoint.
    ///
    /// Returns `true` if it matched the current cycle and was recorded.
    pub fn handle_pong(
        &self,
        message: &LinkMessage,
        sender: &EndpointAddress,
        sent_at: f64,
    ) -> bool {
        self.shared.handle_pong(message, sender, sent_at)
    }

    /// Snapshot of providers that answered the current cycle.
    pub fn results(&self) -> Vec<ProviderDescriptor> {
        self.shared.state.lock().results.clone()
    }

    /// First result whose display name equals `name`.
    pub fn find(&self, name: &str) -> Option<ProviderDescriptor> {
        self.shared
            .state
            .lock()
            .results
            .iter()
            .find(|d| d.display_name == name)
            .cloned()
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    /// Pongs dropped for a stale request id or a version mismatch.
    pub fn pongs_rejected(&self) -> u64 {
        self.shared.pongs_rejected.load(Ordering::Relaxed)
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Start the background ping loop. No-op if already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let running = Arc::clone(&self.running);
        let interval = self.ping_interval;

        let spawned = thread::Builder::new()
            .name("livelink-discovery".into())
            .spawn(move || discovery_loop(weak, running, interval));
        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                log::debug!("[discovery] started (interval {:?})", interval);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop the background loop and wait for it.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            // The loop may hold the last strong reference while ticking.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        log::debug!("[discovery] stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for DiscoveryBroadcaster {
    fn drop(&mut self) {
        self.stop();
        self.endpoint.close();
    }
}

fn discovery_loop(weak: Weak<DiscoveryBroadcaster>, running: Arc<AtomicBool>, interval: Duration) {
    while running.load(Ordering::Relaxed) {
        match weak.upgrade() {
            Some(broadcaster) => {
                broadcaster.tick();
            }
            None => break,
        }

        let deadline = Instant::now() + interval;
        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Handle keeping discovery pings alive. Dropping it releases the interest.
pub struct DiscoveryInterest {
    shared: Option<Arc<Shared>>,
}

impl DiscoveryInterest {
    /// Release explicitly. Equivalent to dropping.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release_interest();
        }
    }
}

impl Drop for DiscoveryInterest {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for DiscoveryInterest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryInterest")
            .field("active", &self.shared.is_some())
            .finish()
    }
}
