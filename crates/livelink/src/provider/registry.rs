// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider registry: roster, subject cache and fan-out.

use super::cache::{CachedSubject, SubjectCache};
use super::roster::{ConnectionRecord, Roster};
use super::ProviderEvent;
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    Annotations, FrameData, LinkMessage, RoleRegistry, StaticData, SubjectKey,
    SubjectSnapshot, ANNOTATION_ROLE, ANNOTATION_SUBJECT_NAME, PROTOCOL_VERSION,
};
use crate::time::Clock;
use crate::transport::{Delivery, Endpoint, EndpointAddress, EndpointKind, Transport};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

const EVENT_QUEUE_DEPTH: usize = 256;

/// Names a provider advertises in its Pong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub provider_name: String,
    pub machine_name: String,
}

impl ProviderInfo {
    /// Use the host name from the environment as machine name.
    pub fn new(provider_name: impl Into<String>) -> Self {
        let machine_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            provider_name: provider_name.into(),
            machine_name,
        }
    }

    pub fn with_machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = machine_name.into();
        self
    }
}

/// State shared with the endpoint's receive handler.
struct Inner {
    info: ProviderInfo,
    clock: Arc<dyn Clock>,
    roles: RoleRegistry,
    connection_timeout: f64,
    roster: Mutex<Roster>,
    cache: Mutex<SubjectCache>,
    endpoint: OnceLock<Arc<dyn Endpoint>>,
    events: Sender<ProviderEvent>,
    accepting: AtomicBool,
}

impl Inner {
    fn endpoint(&self) -> Result<&Arc<dyn Endpoint>> {
        self.endpoint.get().ok_or(Error::EndpointClosed)
    }

    fn on_delivery(&self, delivery: Delivery) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        match delivery.message {
            LinkMessage::Ping {
                request_id,
                protocol_version,
            } => self.handle_ping(request_id, protocol_version, &delivery.sender),
            LinkMessage::Connect { protocol_version } => {
                self.handle_connect(protocol_version, &delivery.sender);
            }
            LinkMessage::Heartbeat => {
                self.handle_heartbeat(&delivery.sender);
            }
            other => log::trace!(
                "[provider] ignoring {} from {}",
                other.kind(),
                delivery.sender
            ),
        }
    }

    fn version_ok(&self, kind: &str, version: u32, sender: &EndpointAddress) -> bool {
        if version == PROTOCOL_VERSION {
            return true;
        }
        log::warn!(
            "[provider] {} from {} has protocol version {} (expected {}), dropped",
            kind,
            sender,
            version,
            PROTOCOL_VERSION
        );
        false
    }

    fn handle_ping(&self, request_id: u64, protocol_version: u32, sender: &EndpointAddress) {
        if !self.version_ok("Ping", protocol_version, sender) {
            return;
        }
        let pong = LinkMessage::Pong {
            provider_name: self.info.provider_name.clone(),
            machine_name: self.info.machine_name.clone(),
            request_id,
            protocol_version: PROTOCOL_VERSION,
            creation_platform_time: self.clock.platform_seconds(),
        };
        if let Err(e) = self
            .endpoint()
            .and_then(|ep| ep.send(sender, pong, Annotations::new()))
        {
            log::debug!("[provider] pong to {} failed: {}", sender, e);
        }
    }

    fn handle_connect(&self, protocol_version: u32, sender: &EndpointAddress) -> bool {
        if !self.version_ok("Connect", protocol_version, sender) {
            return false;
        }
        let now = self.clock.platform_seconds();
        let (added, count) = {
            let mut roster = self.roster.lock();
            let added = roster.add(sender.clone(), now);
            (added, roster.len())
        };
        if !added {
            log::debug!("[provider] {} reconnected, no replay", sender);
            return false;
        }

        let subjects = self.cache.lock().snapshot();
        let total = subjects.len();
        let replayed = self.replay(sender, subjects);
        log::info!(
            "[provider] '{}' accepted {} ({}/{} subjects replayed)",
            self.info.provider_name,
            sender,
            replayed,
            total
        );
        self.emit(ProviderEvent::ConnectionsChanged { count });
        true
    }

    /// Send each cached subject as its own snapshot, static data before frame.
    ///
    /// A subject too large to travel with its frame is retried without it.
    /// An empty cache still sends one empty snapshot so the consumer sees
    /// traffic. Returns the number of subjects delivered.
    fn replay(&self, target: &EndpointAddress, subjects: Vec<SubjectSnapshot>) -> usize {
        let Ok(endpoint) = self.endpoint() else {
            return 0;
        };
        if subjects.is_empty() {
            let empty = LinkMessage::StateSnapshot {
                subjects: Vec::new(),
            };
            if let Err(e) = endpoint.send(target, empty, Annotations::new()) {
                log::warn!("[provider] replay to {} failed: {}", target, e);
            }
            return 0;
        }
        let mut delivered = 0;
        for subject in subjects {
            let name = subject.subject_name.clone();
            let static_only = subject.frame.as_ref().map(|_| SubjectSnapshot {
                subject_name: subject.subject_name.clone(),
                role: subject.role.clone(),
                static_data: subject.static_data.clone(),
                frame: None,
            });
            let message = LinkMessage::StateSnapshot {
                subjects: vec![subject],
            };
            let result = match (endpoint.send(target, message, Annotations::new()), static_only) {
                (Err(Error::MessageTooLarge(size)), Some(static_only)) => {
                    log::debug!(
                        "[provider] replay of '{}' is {} bytes, retrying without frame",
                        name,
                        size
                    );
                    let message = LinkMessage::StateSnapshot {
                        subjects: vec![static_only],
                    };
                    endpoint.send(target, message, Annotations::new())
                }
                (result, _) => result,
            };
            match result {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("[provider] replay of '{}' to {} failed: {}", name, target, e),
            }
        }
        delivered
    }

    fn handle_heartbeat(&self, sender: &EndpointAddress) -> bool {
        let now = self.clock.platform_seconds();
        if !self.roster.lock().touch(sender, now) {
            log::debug!("[provider] heartbeat from unregistered {}, ignored", sender);
            return false;
        }
        if let Err(e) = self
            .endpoint()
            .and_then(|ep| ep.send(sender, LinkMessage::Heartbeat, Annotations::new()))
        {
            log::debug!("[provider] heartbeat echo to {} failed: {}", sender, e);
        }
        true
    }

    fn fan_out(&self, message: &LinkMessage, annotations: &Annotations) -> usize {
        let targets = self.roster.lock().addresses();
        let Ok(endpoint) = self.endpoint() else {
            return 0;
        };
        let mut sent = 0;
        for target in &targets {
            match endpoint.send(target, message.clone(), annotations.clone()) {
                Ok(()) => sent += 1,
                Err(e) => log::debug!("[provider] {} to {} failed: {}", message.kind(), target, e),
            }
        }
        sent
    }

    fn emit(&self, event: ProviderEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            log::debug!("[provider] event queue full, dropped {:?}", event);
        }
    }
}

/// Provider-side endpoint, roster and subject cache.
pub struct ProviderRegistry {
    inner: Arc<Inner>,
    events: Receiver<ProviderEvent>,
}

impl ProviderRegistry {
    /// Open a discoverable endpoint on `transport` and start answering.
    pub fn new(
        transport: &dyn Transport,
        info: ProviderInfo,
        clock: Arc<dyn Clock>,
        roles: RoleRegistry,
        config: &LinkConfig,
    ) -> Result<Self> {
        let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
        let inner = Arc::new(Inner {
            info,
            clock,
            roles,
            connection_timeout: config.provider_connection_timeout_secs,
            roster: Mutex::new(Roster::new()),
            cache: Mutex::new(SubjectCache::default()),
            endpoint: OnceLock::new(),
            events: tx,
            accepting: AtomicBool::new(true),
        });

        let handler_inner = Arc::clone(&inner);
        let handler = move |d: Delivery| handler_inner.on_delivery(d);
        let endpoint = transport.open(EndpointKind::Discoverable, Arc::new(handler))?;
        log::info!(
            "[provider] '{}' on {} listening at {}",
            inner.info.provider_name,
            inner.info.machine_name,
            endpoint.address()
        );
        let _ = inner.endpoint.set(endpoint);

        Ok(Self { inner, events: rx })
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.inner.info
    }

    /// Address consumers see as the sender of this provider's traffic.
    pub fn address(&self) -> Option<EndpointAddress> {
        self.inner.endpoint.get().map(|ep| ep.address())
    }

    /// Subject key scoped to this provider.
    pub fn subject_key(&self, subject_name: &str) -> SubjectKey {
        SubjectKey::new(self.inner.info.provider_name.clone(), subject_name)
    }

    /// Answer a Ping (normally invoked by the endpoint handler).
    pub fn handle_ping(&self, request_id: u64, protocol_version: u32, sender: &EndpointAddress) {
        self.inner.handle_ping(request_id, protocol_version, sender);
    }

    /// Admit a consumer. Returns `true` if it was new and got a replay.
    pub fn handle_connect(&self, protocol_version: u32, sender: &EndpointAddress) -> bool {
        self.inner.handle_connect(protocol_version, sender)
    }

    /// Refresh and echo. Returns `false` for addresses not in the roster.
    pub fn handle_heartbeat(&self, sender: &EndpointAddress) -> bool {
        self.inner.handle_heartbeat(sender)
    }

    /// Define (or redefine) a subject.
    ///
    /// `data.shape` must equal the role's static shape. Any cached frame is
    /// discarded; the new static data goes to every subscribed consumer.
    pub fn update_subject_static_data(
        &self,
        key: &SubjectKey,
        role: &str,
        data: StaticData,
    ) -> Result<()> {
        let schema = self
            .inner
            .roles
            .get(role)
            .ok_or_else(|| Error::UnknownRole(role.to_string()))?;
        if data.shape != schema.static_shape {
            return Err(Error::ShapeMismatch {
                expected: schema.static_shape,
                found: data.shape,
            });
        }

        let discarded = self.inner.cache.lock().set_static(
            key.clone(),
            CachedSubject {
                role: schema.name.clone(),
                frame_shape: schema.frame_shape.clone(),
                static_data: data.clone(),
                frame: None,
            },
        );
        if discarded {
            log::debug!("[provider] {} redefined, cached frame discarded", key);
        }

        let mut annotations = Annotations::new();
        annotations.insert(ANNOTATION_SUBJECT_NAME.into(), key.subject_name.clone());
        annotations.insert(ANNOTATION_ROLE.into(), schema.name);
        self.inner
            .fan_out(&LinkMessage::StaticData(data), &annotations);
        Ok(())
    }

    /// Publish a frame for a subject with static data.
    pub fn push_frame(&self, key: &SubjectKey, frame: FrameData) -> Result<()> {
        {
            let mut cache = self.inner.cache.lock();
            let subject = cache
                .get_mut(key)
                .ok_or_else(|| Error::MissingStaticData(key.to_string()))?;
            if frame.shape != subject.frame_shape {
                return Err(Error::ShapeMismatch {
                    expected: subject.frame_shape.clone(),
                    found: frame.shape,
                });
            }
            subject.frame = Some(frame.clone());
        }

        let mut annotations = Annotations::new();
        annotations.insert(ANNOTATION_SUBJECT_NAME.into(), key.subject_name.clone());
        self.inner
            .fan_out(&LinkMessage::FrameData(frame), &annotations);
        Ok(())
    }

    /// Drop a subject and tell every consumer. Returns `false` if unknown.
    pub fn remove_subject(&self, key: &SubjectKey) -> bool {
        if self.inner.cache.lock().remove(key).is_none() {
            return false;
        }
        let clear = LinkMessage::ClearSubject {
            subject_name: key.subject_name.clone(),
        };
        self.inner.fan_out(&clear, &Annotations::new());
        true
    }

    /// Evict consumers silent for the validity window. Run once per tick.
    ///
    /// Returns the evicted addresses.
    pub fn housekeeping(&self) -> Vec<EndpointAddress> {
        let now = self.inner.clock.platform_seconds();
        let (expired, count) = {
            let mut roster = self.inner.roster.lock();
            let expired = roster.remove_expired(now, self.inner.connection_timeout);
            (expired, roster.len())
        };
        if !expired.is_empty() {
            for address in &expired {
                log::info!("[provider] consumer {} timed out", address);
            }
            self.inner.emit(ProviderEvent::ConnectionsChanged { count });
        }
        expired
    }

    pub fn connections(&self) -> Vec<ConnectionRecord> {
        self.inner.roster.lock().records()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.roster.lock().len()
    }

    pub fn subjects(&self) -> Vec<SubjectKey> {
        self.inner.cache.lock().keys()
    }

    /// Receiver for [`ProviderEvent`]s. Clones share one queue.
    pub fn events(&self) -> Receiver<ProviderEvent> {
        self.events.clone()
    }

    /// Stop handling traffic and release the endpoint. Idempotent.
    pub fn close(&self) {
        if !self.inner.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(endpoint) = self.inner.endpoint.get() {
            endpoint.close();
        }
        log::debug!("[provider] '{}' closed", self.inner.info.provider_name);
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.accepting.load(Ordering::Acquire)
    }
}

impl Drop for ProviderRegistry {
    fn drop(&mut self) {
        self.close();
    }
}
