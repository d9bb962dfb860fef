// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic Heartbeat emission to every bound provider.
//!
//! Each link registers its own endpoint so the heartbeat leaves from the
//! address the provider knows it by.

use super::LinkId;
use crate::protocol::{Annotations, LinkMessage};
use crate::transport::{Endpoint, EndpointAddress};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct Target {
    endpoint: Arc<dyn Endpoint>,
    provider: EndpointAddress,
}

/// Sends Heartbeat from each registered link to its provider.
pub struct HeartbeatEmitter {
    targets: Mutex<HashMap<LinkId, Target>>,
    interval: Duration,
    sent: AtomicU64,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatEmitter {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            targets: Mutex::new(HashMap::new()),
            interval,
            sent: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    /// Start heartbeats for `link`, sent from `endpoint` to `provider`.
    pub fn register(&self, link: LinkId, endpoint: Arc<dyn Endpoint>, provider: EndpointAddress) {
        log::debug!("[heartbeat] {} -> {}", link, provider);
        self.targets
            .lock()
            .insert(link, Target { endpoint, provider });
    }

    /// Stop heartbeats for `link`. Returns `false` if it was not registered.
    pub fn unregister(&self, link: LinkId) -> bool {
        self.targets.lock().remove(&link).is_some()
    }

    pub fn is_registered(&self, link: LinkId) -> bool {
        self.targets.lock().contains_key(&link)
    }

    pub fn target_count(&self) -> usize {
        self.targets.lock().len()
    }

    /// Send one Heartbeat to every target now. Returns the number sent.
    pub fn emit_now(&self) -> usize {
        let targets: Vec<(LinkId, Target)> = self
            .targets
            .lock()
            .iter()
            .map(|(id, t)| (*id, t.clone()))
            .collect();

        let mut sent = 0;
        for (link, target) in targets {
            match target
                .endpoint
                .send(&target.provider, LinkMessage::Heartbeat, Annotations::new())
            {
                Ok(()) => sent += 1,
                Err(e) => log::debug!("[heartbeat] {} send failed: {}", link, e),
            }
        }
        self.sent.fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    /// Heartbeats sent since creation.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Start the background emitter. No-op if already running.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        match thread::Builder::new()
            .name("livelink-heartbeat".into())
            .spawn(move || heartbeat_loop(weak, running, interval))
        {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn heartbeat_loop(weak: Weak<HeartbeatEmitter>, running: Arc<AtomicBool>, interval: Duration) {
    let mut next = Instant::now() + interval;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep(SLEEP_SLICE.min(next - now));
            continue;
        }
        next = now + interval;
        match weak.upgrade() {
            Some(emitter) => {
                emitter.emit_now();
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;
    use crate::transport::{Delivery, EndpointKind, MessageHandler, Transport};
    use crossbeam::channel::unbounded;

    #[test]
    fn test_emit_now_from_link_endpoint() {
        let bus = MemoryBus::new();
        let (tx, rx) = unbounded();
        let sink: Arc<dyn MessageHandler> = Arc::new(move |d: Delivery| {
            let _ = tx.send(d);
        });
        let provider = bus.open(EndpointKind::Discoverable, sink).unwrap();
        let noop: Arc<dyn MessageHandler> = Arc::new(|_d: Delivery| {});
        let link_ep = bus.open(EndpointKind::Private, noop).unwrap();

        let emitter = HeartbeatEmitter::new(Duration::from_secs(1));
        emitter.register(LinkId(1), Arc::clone(&link_ep), provider.address());
        assert_eq!(emitter.emit_now(), 1);
        assert!(bus.wait_idle(Duration::from_secs(2)));

        let d = rx.try_recv().unwrap();
        assert_eq!(d.sender, link_ep.address());
        assert_eq!(d.message, LinkMessage::Heartbeat);

        assert!(emitter.unregister(LinkId(1)));
        assert!(!emitter.unregister(LinkId(1)));
        assert_eq!(emitter.emit_now(), 0);
        assert_eq!(emitter.sent(), 1);
    }

    #[test]
    fn test_background_loop() {
        let bus = MemoryBus::new();
        let noop: Arc<dyn MessageHandler> = Arc::new(|_d: Delivery| {});
        let provider = bus.open(EndpointKind::Discoverable, Arc::clone(&noop)).unwrap();
        let link_ep = bus.open(EndpointKind::Private, noop).unwrap();

        let emitter = HeartbeatEmitter::new(Duration::from_millis(20));
        emitter.register(LinkId(7), link_ep, provider.address());
        emitter.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while emitter.sent() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        emitter.stop();
        assert!(emitter.sent() >= 2);
        assert!(!emitter.is_running());
    }
}
