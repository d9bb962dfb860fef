// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Every send is queued on a crossbeam channel and delivered by a single
//! dispatcher thread, so handlers never run on the sender's stack and never
//! see the sender's locks. Used by the test suite and by single-process
//! setups (provider and consumer in one binary).
//!
//! Test helpers:
//! - [`MemoryBus::wait_idle`] blocks until every queued message was handled
//! - [`MemoryBus::sent_count`] counts messages by kind
//! - [`MemoryBus::partition`] silently drops traffic to and from an endpoint

use super::{Delivery, Endpoint, EndpointAddress, EndpointKind, MessageHandler, Transport};
use crate::error::{Error, Result};
use crate::protocol::{Annotations, Envelope, LinkMessage};
use crate::time::{Clock, SystemClock};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DISPATCH_POLL: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct Registered {
    kind: EndpointKind,
    handler: Arc<dyn MessageHandler>,
}

struct Queued {
    to: u64,
    sender: EndpointAddress,
    envelope: Envelope,
}

/// State shared with the dispatcher thread.
struct BusShared {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    endpoints: RwLock<HashMap<u64, Registered>>,
    partitioned: RwLock<HashSet<u64>>,
    pending: AtomicUsize,
    shutdown: AtomicBool,
    sent: Mutex<HashMap<&'static str, u64>>,
}

impl BusShared {
    fn deliver(&self, queued: Queued) {
        let handler = self
            .endpoints
            .read()
            .get(&queued.to)
            .map(|r| Arc::clone(&r.handler));
        match handler {
            Some(handler) => {
                handler.handle(Delivery::from_envelope(queued.envelope, queued.sender));
            }
            None => log::trace!(
                "[memory-bus] drop {} for closed endpoint",
                queued.envelope.message.kind()
            ),
        }
    }

    fn is_partitioned(&self, a: u64, b: u64) -> bool {
        let set = self.partitioned.read();
        set.contains(&a) || set.contains(&b)
    }
}

struct BusInner {
    shared: Arc<BusShared>,
    tx: Sender<Queued>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl BusInner {
    fn enqueue(&self, queued: Queued) -> Result<()> {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(queued).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::SendFailed("memory bus dispatcher stopped".into()));
        }
        Ok(())
    }

    fn count(&self, message: &LinkMessage) {
        *self.shared.sent.lock().entry(message.kind()).or_insert(0) += 1;
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.dispatcher.lock().take() {
            // The last reference may be released by a handler on the dispatcher itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// In-process pub/sub bus. Clones share the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    /// Create a bus stamping sends with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a bus stamping sends with `clock`'s wall time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(BusShared {
            clock,
            next_id: AtomicU64::new(1),
            endpoints: RwLock::new(HashMap::new()),
            partitioned: RwLock::new(HashSet::new()),
            pending: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            sent: Mutex::new(HashMap::new()),
        });
        let (tx, rx) = unbounded();

        let shared_clone = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("livelink-memory-bus".into())
            .spawn(move || dispatch_loop(shared_clone, rx))
            .map_err(|e| log::error!("[memory-bus] failed to spawn dispatcher: {}", e))
            .ok();

        Self {
            inner: Arc::new(BusInner {
                shared,
                tx,
                dispatcher: Mutex::new(handle),
            }),
        }
    }

    /// Wait until no message is queued or being handled.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.shared.pending.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Number of messages of `kind` (e.g. `"Ping"`) sent so far.
    ///
    /// A broadcast counts once.
    pub fn sent_count(&self, kind: &str) -> u64 {
        self.inner.shared.sent.lock().get(kind).copied().unwrap_or(0)
    }

    /// Drop all traffic to and from `addr` until [`heal`](Self::heal).
    pub fn partition(&self, addr: &EndpointAddress) {
        if let Some(id) = addr.local_id() {
            self.inner.shared.partitioned.write().insert(id);
        }
    }

    pub fn heal(&self, addr: &EndpointAddress) {
        if let Some(id) = addr.local_id() {
            self.inner.shared.partitioned.write().remove(&id);
        }
    }

    /// Number of open endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.inner.shared.endpoints.read().len()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryBus {
    fn open(
        &self,
        kind: EndpointKind,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<dyn Endpoint>> {
        let id = self.inner.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .shared
            .endpoints
            .write()
            .insert(id, Registered { kind, handler });
        log::debug!("[memory-bus] opened local:{} ({:?})", id, kind);

        Ok(Arc::new(MemoryEndpoint {
            id,
            bus: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryEndpoint {
    id: u64,
    bus: Arc<BusInner>,
    closed: AtomicBool,
}

impl MemoryEndpoint {
    fn envelope(&self, message: LinkMessage, annotations: Annotations) -> Envelope {
        Envelope {
            sent_at: self.bus.shared.clock.wall_seconds(),
            annotations,
            message,
        }
    }
}

impl Endpoint for MemoryEndpoint {
    fn address(&self) -> EndpointAddress {
        EndpointAddress::local(self.id)
    }

    fn send(
        &self,
        to: &EndpointAddress,
        message: LinkMessage,
        annotations: Annotations,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::EndpointClosed);
        }
        let to_id = to
            .local_id()
            .ok_or_else(|| Error::SendFailed(format!("{} is not a memory bus address", to)))?;

        self.bus.count(&message);
        if self.bus.shared.is_partitioned(self.id, to_id) {
            return Ok(());
        }
        let envelope = self.envelope(message, annotations);
        self.bus.enqueue(Queued {
            to: to_id,
            sender: self.address(),
            envelope,
        })
    }

    fn broadcast(&self, message: LinkMessage, annotations: Annotations) -> Result<()> {
        if self.is_closed() {
            return Err(Error::EndpointClosed);
        }
        self.bus.count(&message);

        let targets: Vec<u64> = self
            .bus
            .shared
            .endpoints
            .read()
            .iter()
            .filter(|(id, r)| **id != self.id && r.kind == EndpointKind::Discoverable)
            .map(|(id, _)| *id)
            .collect();

        let envelope = self.envelope(message, annotations);
        for to in targets {
            if self.bus.shared.is_partitioned(self.id, to) {
                continue;
            }
            self.bus.enqueue(Queued {
                to,
                sender: self.address(),
                envelope: envelope.clone(),
            })?;
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.shared.endpoints.write().remove(&self.id);
        log::debug!("[memory-bus] closed local:{}", self.id);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch_loop(shared: Arc<BusShared>, rx: Receiver<Queued>) {
    loop {
        match rx.recv_timeout(DISPATCH_POLL) {
            Ok(queued) => {
                shared.deliver(queued);
                shared.pending.fetch_sub(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::trace!("[memory-bus] dispatcher stopped");
}
