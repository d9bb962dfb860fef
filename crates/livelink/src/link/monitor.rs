// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-side connection monitor: one per link.

use super::context::{LinkContext, LinkServices};
use super::subject::SubjectState;
use super::{LinkId, LinkSettings, LinkState};
use crate::buffer::{BufferPolicy, BufferStats, EvaluationMode, Sample};
use crate::clock_sync::ClockSynchronizer;
use crate::discovery::DiscoveryInterest;
use crate::error::{Error, Result};
use crate::logging::LogOnce;
use crate::protocol::{
    Annotations, FrameData, LinkMessage, RoleRegistry, RoleSchema, StaticData, SubjectKey,
    SubjectSnapshot, ANNOTATION_ROLE, ANNOTATION_SUBJECT_NAME, PROTOCOL_VERSION,
};
use crate::provider::ConnectionRecord;
use crate::time::Clock;
use crate::transport::{Delivery, Endpoint, EndpointAddress, EndpointKind};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Invoked once when a link is torn down after the dead-source timeout.
pub type RemovalCallback = Box<dyn FnOnce(LinkId) + Send>;

/// Mutable link state, guarded by one lock.
struct LinkData {
    provider: Option<ConnectionRecord>,
    traffic_seen: bool,
    clock_sync: ClockSynchronizer,
    subjects: BTreeMap<String, SubjectState>,
    settings: LinkSettings,
}

/// State shared with the endpoint's receive handler.
struct Shared {
    id: LinkId,
    clock: Arc<dyn Clock>,
    roles: RoleRegistry,
    policy: BufferPolicy,
    accepting: AtomicBool,
    received: AtomicU64,
    data: Mutex<LinkData>,
    log_once: LogOnce,
}

impl Shared {
    fn on_delivery(&self, delivery: Delivery) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        let now = self.clock.platform_seconds();
        let mut data = self.data.lock();

        match &data.provider {
            Some(record) if record.address == delivery.sender => {}
            _ => {
                log::trace!(
                    "[link] {} ignoring {} from {}",
                    self.id,
                    delivery.message.kind(),
                    delivery.sender
                );
                return;
            }
        }

        let latency = self.clock.wall_seconds() - delivery.sent_at;
        match delivery.message {
            LinkMessage::Heartbeat => {}
            LinkMessage::StaticData(static_data) => {
                self.handle_static_data(&mut data, &delivery.annotations, static_data);
            }
            LinkMessage::FrameData(frame) => {
                let live = Some((now, latency));
                self.handle_frame_data(&mut data, &delivery.annotations, frame, live);
            }
            LinkMessage::ClearSubject { subject_name } => {
                self.handle_clear_subject(&mut data, &subject_name);
            }
            LinkMessage::StateSnapshot { subjects } => {
                self.handle_snapshot(&mut data, subjects);
            }
            other => {
                log::trace!("[link] {} ignoring {}", self.id, other.kind());
                return;
            }
        }

        data.traffic_seen = true;
        if let Some(record) = data.provider.as_mut() {
            record.touch(now);
        }
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn subject_name<'a>(&self, annotations: &'a Annotations, kind: &str) -> Option<&'a str> {
        match annotations.get(ANNOTATION_SUBJECT_NAME) {
            Some(name) if !name.is_empty() => Some(name.as_str()),
            _ => {
                self.log_once.error(
                    &format!("{}:{}:missing-subject", self.id, kind),
                    format_args!(
                        "[link] {} received {} without a subject name, dropped",
                        self.id, kind
                    ),
                );
                None
            }
        }
    }

    /// Explicit role annotation first, then the first role matching `shape`.
    fn resolve_role(
        &self,
        annotations: &Annotations,
        shape: &str,
        by_shape: impl Fn(&RoleRegistry, &str) -> Option<RoleSchema>,
    ) -> Option<RoleSchema> {
        annotations
            .get(ANNOTATION_ROLE)
            .and_then(|name| self.roles.get(name))
            .or_else(|| by_shape(&self.roles, shape))
    }

    fn handle_static_data(
        &self,
        data: &mut LinkData,
        annotations: &Annotations,
        static_data: StaticData,
    ) {
        let Some(name) = self.subject_name(annotations, "StaticData") else {
            return;
        };
        let role = self
            .resolve_role(annotations, &static_data.shape, RoleRegistry::resolve_static)
            .filter(|r| r.static_shape == static_data.shape);
        let Some(role) = role else {
            self.log_once.error(
                &format!("{}:{}:static-role", self.id, name),
                format_args!(
                    "[link] {} no role for static data of '{}' (shape {}), dropped",
                    self.id, name, static_data.shape
                ),
            );
            return;
        };

        log::debug!("[link] {} subject '{}' defined as {}", self.id, name, role.name);
        let subject = SubjectState::new(role, static_data, &data.settings.buffer);
        data.subjects.insert(name.to_string(), subject);
    }

    /// `live` carries the local receive time and transport latency of a frame
    /// that just arrived. Replayed frames pass `None`: they may be arbitrarily
    /// old and are converted with the current offset without feeding it.
    fn handle_frame_data(
        &self,
        data: &mut LinkData,
        annotations: &Annotations,
        frame: FrameData,
        live: Option<(f64, f64)>,
    ) {
        let Some(name) = self.subject_name(annotations, "FrameData") else {
            return;
        };
        if !data.settings.enabled {
            return;
        }

        let LinkData {
            subjects,
            clock_sync,
            ..
        } = data;
        let Some(subject) = subjects.get_mut(name) else {
            self.log_once.warn(
                &format!("{}:{}:no-static", self.id, name),
                format_args!(
                    "[link] {} frame for '{}' before its static data, dropped",
                    self.id, name
                ),
            );
            return;
        };

        if frame.shape != subject.role.frame_shape {
            let resolved = self
                .resolve_role(annotations, &frame.shape, RoleRegistry::resolve_frame)
                .map(|r| r.name)
                .unwrap_or_else(|| "no role".to_string());
            self.log_once.error(
                &format!("{}:{}:frame-role", self.id, name),
                format_args!(
                    "[link] {} frame shape {} ({}) does not match role {} of '{}', dropped",
                    self.id, frame.shape, resolved, subject.role.name, name
                ),
            );
            return;
        }

        if let Some((now, latency)) = live {
            clock_sync.observe(&frame.time, now, self.clock.timecode(), latency);
        }
        let mut local = frame;
        local.time = clock_sync.convert(&local.time);
        subject.push(local);
    }

    fn handle_clear_subject(&self, data: &mut LinkData, subject_name: &str) {
        if data.subjects.remove(subject_name).is_some() {
            log::debug!("[link] {} subject '{}' cleared", self.id, subject_name);
        }
    }

    fn handle_snapshot(&self, data: &mut LinkData, subjects: Vec<SubjectSnapshot>) {
        log::debug!("[link] {} replay of {} subjects", self.id, subjects.len());
        for snapshot in subjects {
            let mut annotations = Annotations::new();
            annotations.insert(ANNOTATION_SUBJECT_NAME.into(), snapshot.subject_name);
            annotations.insert(ANNOTATION_ROLE.into(), snapshot.role);
            self.handle_static_data(data, &annotations, snapshot.static_data);
            if let Some(frame) = snapshot.frame {
                self.handle_frame_data(data, &annotations, frame, None);
            }
        }
    }
}

/// Consumer end of one provider link.
///
/// `update()` drives the state machine and must be called regularly by the
/// single owner (normally a [`LinkCollection`](crate::LinkCollection)).
/// Inbound traffic is handled on transport threads.
pub struct ConnectionMonitor {
    shared: Arc<Shared>,
    services: Arc<LinkServices>,
    endpoint: Arc<dyn Endpoint>,
    provider_name: String,
    interest: Option<DiscoveryInterest>,
    state: LinkState,
    /// Platform seconds of the last Connect sent
    last_connect: f64,
    on_removed: Option<RemovalCallback>,
}

impl ConnectionMonitor {
    fn open(ctx: &LinkContext, provider_name: &str) -> Result<Self> {
        let services = ctx.services();
        let id = ctx.next_link_id();
        let shared = Arc::new(Shared {
            id,
            clock: Arc::clone(&services.clock),
            roles: services.roles.clone(),
            policy: services.config.buffer_policy,
            accepting: AtomicBool::new(true),
            received: AtomicU64::new(0),
            data: Mutex::new(LinkData {
                provider: None,
                traffic_seen: false,
                clock_sync: ClockSynchronizer::new(services.config.clock_smoothing),
                subjects: BTreeMap::new(),
                settings: LinkSettings::from_config(&services.config),
            }),
            log_once: LogOnce::new(),
        });

        let handler_shared = Arc::clone(&shared);
        let handler = move |d: Delivery| handler_shared.on_delivery(d);
        let endpoint = services
            .transport
            .open(EndpointKind::Private, Arc::new(handler))?;

        Ok(Self {
            shared,
            services,
            endpoint,
            provider_name: provider_name.to_string(),
            interest: None,
            state: LinkState::AwaitingDiscovery,
            last_connect: 0.0,
            on_removed: None,
        })
    }

    /// Link to a provider at a known address, skipping discovery.
    pub fn connect_to(
        ctx: &LinkContext,
        address: EndpointAddress,
        provider_name: &str,
    ) -> Result<Self> {
        let mut monitor = Self::open(ctx, provider_name)?;
        monitor.bind(address, None);
        Ok(monitor)
    }

    /// Link to the provider whose display name is `provider_name`, once
    /// discovery finds it.
    pub fn discover(ctx: &LinkContext, provider_name: &str) -> Result<Self> {
        let mut monitor = Self::open(ctx, provider_name)?;
        monitor.interest = Some(monitor.services.discovery.subscribe());
        log::debug!(
            "[link] {} waiting for provider '{}'",
            monitor.id(),
            provider_name
        );
        Ok(monitor)
    }

    /// Register a callback run once when the link dies.
    pub fn on_removed(&mut self, callback: RemovalCallback) {
        self.on_removed = Some(callback);
    }

    fn bind(&mut self, address: EndpointAddress, machine_time_offset: Option<f64>) {
        let now = self.shared.clock.platform_seconds();
        {
            let mut data = self.shared.data.lock();
            data.provider = Some(ConnectionRecord::new(address.clone(), now));
            data.traffic_seen = false;
            if let Some(offset) = machine_time_offset {
                data.clock_sync.seed(offset);
            }
        }
        self.state = LinkState::Connecting;

        self.send_connect(&address, now);
        self.services
            .heartbeats
            .register(self.id(), Arc::clone(&self.endpoint), address.clone());
        log::info!(
            "[link] {} bound to '{}' at {}",
            self.id(),
            self.provider_name,
            address
        );
    }

    fn send_connect(&mut self, address: &EndpointAddress, now: f64) {
        self.last_connect = now;
        let connect = LinkMessage::Connect {
            protocol_version: PROTOCOL_VERSION,
        };
        if let Err(e) = self.endpoint.send(address, connect, Annotations::new()) {
            log::warn!("[link] {} connect to {} failed: {}", self.id(), address, e);
        }
    }

    /// Advance the state machine. Returns the new state.
    ///
    /// While not responding, Connect is resent once per heartbeat interval so
    /// a provider that evicted this link takes it back when traffic resumes.
    pub fn update(&mut self) -> LinkState {
        match self.state {
            LinkState::Dead => return LinkState::Dead,
            LinkState::AwaitingDiscovery => {
                match self.services.discovery.find(&self.provider_name) {
                    Some(found) => {
                        if let Some(interest) = self.interest.take() {
                            interest.release();
                        }
                        self.bind(found.address, Some(found.machine_time_offset));
                    }
                    None => return self.state,
                }
            }
            _ => {}
        }

        let now = self.shared.clock.platform_seconds();
        let (silence, traffic_seen, address) = {
            let data = self.shared.data.lock();
            let silence = data.provider.as_ref().map(|r| r.silence(now)).unwrap_or(0.0);
            let address = data.provider.as_ref().map(|r| r.address.clone());
            (silence, data.traffic_seen, address)
        };

        let config = &self.services.config;
        let (dead_timeout, soft_timeout, reconnect_interval) = (
            config.dead_source_timeout_secs,
            config.heartbeat_timeout_secs,
            config.heartbeat_interval_secs,
        );
        if silence >= dead_timeout {
            log::warn!(
                "[link] {} provider '{}' silent for {:.1}s, removing",
                self.id(),
                self.provider_name,
                silence
            );
            self.shutdown();
            return self.state;
        }

        let next = if silence >= soft_timeout {
            LinkState::SoftInvalid
        } else if traffic_seen {
            LinkState::Active
        } else {
            LinkState::Connecting
        };
        if next != self.state {
            match next {
                LinkState::SoftInvalid => log::warn!(
                    "[link] {} provider '{}' not responding",
                    self.id(),
                    self.provider_name
                ),
                _ => log::debug!("[link] {} {} -> {}", self.id(), self.state, next),
            }
            self.state = next;
        }

        if self.state == LinkState::SoftInvalid
            && now - self.last_connect >= reconnect_interval
        {
            if let Some(address) = address {
                log::debug!("[link] {} resending connect to {}", self.id(), address);
                self.send_connect(&address, now);
            }
        }
        self.state
    }

    /// Tear down: stop heartbeats, disable the handler, close the endpoint,
    /// then notify the owner once.
    fn shutdown(&mut self) {
        self.release();
        self.state = LinkState::Dead;
        if let Some(callback) = self.on_removed.take() {
            callback(self.id());
        }
    }

    fn release(&mut self) {
        self.services.heartbeats.unregister(self.id());
        self.shared.accepting.store(false, Ordering::Release);
        self.endpoint.close();
        self.interest = None;
    }

    pub fn id(&self) -> LinkId {
        self.shared.id
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn provider_address(&self) -> Option<EndpointAddress> {
        self.shared
            .data
            .lock()
            .provider
            .as_ref()
            .map(|r| r.address.clone())
    }

    /// Address the provider sees this link's traffic from.
    pub fn local_address(&self) -> EndpointAddress {
        self.endpoint.address()
    }

    /// State as of the last [`update`](Self::update).
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == LinkState::Active
    }

    pub fn status(&self) -> &'static str {
        self.state.status_text()
    }

    /// Platform seconds of the last recognized inbound message.
    pub fn last_active(&self) -> Option<f64> {
        self.shared
            .data
            .lock()
            .provider
            .as_ref()
            .map(|r| r.last_heartbeat_time)
    }

    /// Recognized messages handled since creation.
    pub fn messages_received(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Current platform offset (provider to local, seconds).
    pub fn clock_offset(&self) -> f64 {
        self.shared.data.lock().clock_sync.platform_offset()
    }

    /// Current timecode offset, once timecode frames have been observed.
    pub fn timecode_offset(&self) -> Option<f64> {
        self.shared.data.lock().clock_sync.timecode_offset()
    }

    // ------------------------------------------------------------------
    // Subject access
    // ------------------------------------------------------------------

    pub fn subjects(&self) -> Vec<SubjectKey> {
        self.shared
            .data
            .lock()
            .subjects
            .keys()
            .map(|name| SubjectKey::new(self.provider_name.clone(), name.clone()))
            .collect()
    }

    pub fn subject_role(&self, subject: &str) -> Option<String> {
        self.shared
            .data
            .lock()
            .subjects
            .get(subject)
            .map(|s| s.role.name.clone())
    }

    pub fn static_data(&self, subject: &str) -> Option<StaticData> {
        self.shared
            .data
            .lock()
            .subjects
            .get(subject)
            .map(|s| s.static_data.clone())
    }

    /// Most recent frame, in local time.
    pub fn latest_frame(&self, subject: &str) -> Option<FrameData> {
        self.shared
            .data
            .lock()
            .subjects
            .get(subject)
            .and_then(|s| s.latest.clone())
    }

    /// Frame to present now, per the link's evaluation mode and offset.
    ///
    /// Updates the subject's buffer statistics. Returns `None` when the
    /// subject has no frames or timecode mode has no local timecode.
    pub fn evaluate(&self, subject: &str) -> Option<FrameData> {
        let mut data = self.shared.data.lock();
        let buffer_settings = data.settings.buffer.clone();
        let state = data.subjects.get_mut(subject)?;

        let now = match buffer_settings.evaluation_mode {
            EvaluationMode::None | EvaluationMode::PlatformTime => {
                self.shared.clock.platform_seconds()
            }
            EvaluationMode::Timecode => match self.shared.clock.timecode() {
                Some(tc) => tc.as_seconds(),
                None => {
                    self.shared.log_once.warn(
                        &format!("{}:no-timecode", self.id()),
                        format_args!(
                            "[link] {} timecode evaluation without a local timecode source",
                            self.id()
                        ),
                    );
                    return None;
                }
            },
        };
        let evaluation_time = now - buffer_settings.evaluation_offset;
        state
            .buffer
            .evaluate(evaluation_time)
            .map(|sample| sample.payload.clone())
    }

    /// Remove and return the newest sample overlapping `range`.
    pub fn fetch(&self, subject: &str, range: Range<f64>) -> Result<Sample<FrameData>> {
        let mut data = self.shared.data.lock();
        let state = data.subjects.get_mut(subject).ok_or(Error::NotFound)?;
        state.buffer.fetch(range)
    }

    pub fn buffer_stats(&self, subject: &str) -> Option<BufferStats> {
        self.shared
            .data
            .lock()
            .subjects
            .get(subject)
            .map(|s| s.buffer.stats())
    }

    pub fn reset_buffer_stats(&self) {
        for subject in self.shared.data.lock().subjects.values_mut() {
            subject.buffer.reset_stats();
        }
    }

    /// Samples currently buffered for `subject`.
    pub fn buffered(&self, subject: &str) -> usize {
        self.shared
            .data
            .lock()
            .subjects
            .get(subject)
            .map(|s| s.buffer.len())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> LinkSettings {
        self.shared.data.lock().settings.clone()
    }

    /// Replace every setting. The buffer size is clamped by the global policy.
    pub fn set_settings(&self, mut settings: LinkSettings) {
        let policy = self.shared.policy;
        settings.buffer.max_size = policy.clamp(settings.buffer.max_size);
        let mut data = self.shared.data.lock();
        for subject in data.subjects.values_mut() {
            subject.apply(&settings.buffer, &policy);
        }
        data.settings = settings;
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.data.lock().settings.enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.data.lock().settings.enabled = enabled;
    }

    pub fn group(&self) -> Option<String> {
        self.shared.data.lock().settings.group.clone()
    }

    pub fn set_group(&self, group: Option<String>) {
        self.shared.data.lock().settings.group = group;
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.data.lock().settings.buffer.max_size
    }

    /// Returns the size actually applied.
    pub fn set_buffer_size(&self, size: usize) -> usize {
        let mut settings = self.settings();
        settings.buffer.max_size = size;
        self.set_settings(settings);
        self.buffer_size()
    }

    pub fn evaluation_offset(&self) -> f64 {
        self.shared.data.lock().settings.buffer.evaluation_offset
    }

    pub fn set_evaluation_offset(&self, offset: f64) {
        self.shared.data.lock().settings.buffer.evaluation_offset = offset;
    }

    pub fn evaluation_mode(&self) -> EvaluationMode {
        self.shared.data.lock().settings.buffer.evaluation_mode
    }

    pub fn set_evaluation_mode(&self, mode: EvaluationMode) {
        let mut settings = self.settings();
        settings.buffer.evaluation_mode = mode;
        self.set_settings(settings);
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        if self.state != LinkState::Dead {
            self.release();
        }
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("id", &self.id())
            .field("provider_name", &self.provider_name)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::protocol::shapes;
    use crate::time::{ManualClock, SampleTime};
    use crate::transport::memory::MemoryBus;
    use crate::transport::{MessageHandler, Transport};
    use std::time::Duration;

    struct Harness {
        bus: MemoryBus,
        clock: ManualClock,
        ctx: LinkContext,
        provider: Arc<dyn Endpoint>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::new(100.0, 5_000.0);
            let bus = MemoryBus::with_clock(Arc::new(clock.clone()));
            let ctx = LinkContext::builder(Arc::new(bus.clone()))
                .config(LinkConfig {
                    heartbeat_timeout_secs: 2.0,
                    dead_source_timeout_secs: 5.0,
                    provider_connection_timeout_secs: 4.0,
                    ..Default::default()
                })
                .clock(Arc::new(clock.clone()))
                .build()
                .unwrap();
            let noop: Arc<dyn MessageHandler> = Arc::new(|_d: Delivery| {});
            let provider = bus.open(EndpointKind::Discoverable, noop).unwrap();
            Self {
                bus,
                clock,
                ctx,
                provider,
            }
        }

        fn link(&self) -> ConnectionMonitor {
            self.ctx
                .connect_link(self.provider.address(), "Rig")
                .unwrap()
        }

        fn send(&self, link: &ConnectionMonitor, message: LinkMessage, subject: Option<&str>) {
            let mut annotations = Annotations::new();
            if let Some(name) = subject {
                annotations.insert(ANNOTATION_SUBJECT_NAME.into(), name.into());
            }
            self.provider
                .send(&link.local_address(), message, annotations)
                .unwrap();
            assert!(self.bus.wait_idle(Duration::from_secs(2)));
        }

        fn define(&self, link: &ConnectionMonitor, subject: &str) {
            self.send(
                link,
                LinkMessage::StaticData(StaticData::new(shapes::ANIMATION_STATIC)),
                Some(subject),
            );
        }

        fn frame(&self, link: &ConnectionMonitor, subject: &str, t: f64) {
            self.send(
                link,
                LinkMessage::FrameData(FrameData::new(
                    shapes::ANIMATION_FRAME,
                    SampleTime::from_platform(t),
                )),
                Some(subject),
            );
        }
    }

    #[test]
    fn test_connect_to_sends_connect_and_registers_heartbeat() {
        let h = Harness::new();
        let link = h.link();
        assert_eq!(link.state(), LinkState::Connecting);
        assert_eq!(link.provider_address(), Some(h.provider.address()));
        assert!(h.ctx.heartbeats().is_registered(link.id()));
        assert!(!link.is_valid());
    }

    #[test]
    fn test_first_traffic_activates() {
        let h = Harness::new();
        let mut link = h.link();
        h.send(&link, LinkMessage::Heartbeat, None);
        assert_eq!(link.update(), LinkState::Active);
        assert!(link.is_valid());
        assert_eq!(link.status(), "Active");
        assert_eq!(link.messages_received(), 1);
    }

    #[test]
    fn test_soft_invalid_then_recovers() {
        let h = Harness::new();
        let mut link = h.link();
        h.send(&link, LinkMessage::Heartbeat, None);
        link.update();

        h.clock.advance(2.5);
        assert_eq!(link.update(), LinkState::SoftInvalid);
        assert_eq!(link.status(), "Not responding");
        assert!(!link.is_valid());

        h.send(&link, LinkMessage::Heartbeat, None);
        assert_eq!(link.update(), LinkState::Active);
    }

    #[test]
    fn test_dead_link_notifies_once() {
        let h = Harness::new();
        let mut link = h.link();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        link.on_removed(Box::new(move |_id| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        h.clock.advance(5.1);
        assert_eq!(link.update(), LinkState::Dead);
        assert_eq!(link.update(), LinkState::Dead);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!h.ctx.heartbeats().is_registered(link.id()));
    }

    #[test]
    fn test_static_then_frame_converted_to_local_time() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        h.frame(&link, "Hero", 40.0);

        assert_eq!(link.subject_role("Hero").as_deref(), Some("Animation"));
        let frame = link.latest_frame("Hero").unwrap();
        // remote 40 at local 100 with zero latency: offset 60
        assert!((frame.time.platform_seconds - 100.0).abs() < 1e-9);
        assert!((link.clock_offset() - 60.0).abs() < 1e-9);
        assert_eq!(link.buffered("Hero"), 1);
    }

    #[test]
    fn test_frame_without_static_dropped() {
        let h = Harness::new();
        let link = h.link();
        h.frame(&link, "Ghost", 1.0);
        assert!(link.subjects().is_empty());
        assert!(link.latest_frame("Ghost").is_none());
    }

    #[test]
    fn test_missing_subject_name_dropped() {
        let h = Harness::new();
        let link = h.link();
        h.send(
            &link,
            LinkMessage::StaticData(StaticData::new(shapes::BASE_STATIC)),
            None,
        );
        assert!(link.subjects().is_empty());
    }

    #[test]
    fn test_unknown_shape_dropped() {
        let h = Harness::new();
        let link = h.link();
        h.send(
            &link,
            LinkMessage::StaticData(StaticData::new("MysteryStaticData")),
            Some("X"),
        );
        assert!(link.subjects().is_empty());
    }

    #[test]
    fn test_frame_with_wrong_shape_dropped() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        h.send(
            &link,
            LinkMessage::FrameData(FrameData::new(
                shapes::CAMERA_FRAME,
                SampleTime::from_platform(1.0),
            )),
            Some("Hero"),
        );
        assert!(link.latest_frame("Hero").is_none());
    }

    #[test]
    fn test_clear_subject() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        h.send(
            &link,
            LinkMessage::ClearSubject {
                subject_name: "Hero".into(),
            },
            None,
        );
        assert!(link.subjects().is_empty());
    }

    #[test]
    fn test_snapshot_applies_static_before_frame() {
        let h = Harness::new();
        let link = h.link();
        let snapshot = SubjectSnapshot {
            subject_name: "Cam".into(),
            role: "Camera".into(),
            static_data: StaticData::new(shapes::CAMERA_STATIC),
            frame: Some(FrameData::new(
                shapes::CAMERA_FRAME,
                SampleTime::from_platform(100.0),
            )),
        };
        h.send(
            &link,
            LinkMessage::StateSnapshot {
                subjects: vec![snapshot],
            },
            None,
        );
        assert_eq!(link.subject_role("Cam").as_deref(), Some("Camera"));
        assert!(link.latest_frame("Cam").is_some());
    }

    #[test]
    fn test_snapshot_frame_does_not_feed_clock_offset() {
        let h = Harness::new();
        let link = h.link();
        let snapshot = SubjectSnapshot {
            subject_name: "Hero".into(),
            role: "Animation".into(),
            static_data: StaticData::new(shapes::ANIMATION_STATIC),
            frame: Some(FrameData::new(
                shapes::ANIMATION_FRAME,
                SampleTime::from_platform(40.0),
            )),
        };
        h.send(
            &link,
            LinkMessage::StateSnapshot {
                subjects: vec![snapshot],
            },
            None,
        );
        // converted with the current (zero) offset, not observed
        let frame = link.latest_frame("Hero").unwrap();
        assert!((frame.time.platform_seconds - 40.0).abs() < 1e-9);
        assert_eq!(link.clock_offset(), 0.0);

        h.frame(&link, "Hero", 99.0);
        assert!((link.clock_offset() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_soft_invalid_resends_connect_each_interval() {
        let h = Harness::new();
        let mut link = h.link();
        assert_eq!(h.bus.sent_count("Connect"), 1);

        h.clock.advance(2.5);
        assert_eq!(link.update(), LinkState::SoftInvalid);
        assert_eq!(h.bus.sent_count("Connect"), 2);

        // same instant: nothing more until a heartbeat interval passes
        assert_eq!(link.update(), LinkState::SoftInvalid);
        assert_eq!(h.bus.sent_count("Connect"), 2);

        h.clock.advance(1.0);
        link.update();
        assert_eq!(h.bus.sent_count("Connect"), 3);
    }

    #[test]
    fn test_disabled_link_drops_frames_but_stays_alive() {
        let h = Harness::new();
        let mut link = h.link();
        h.define(&link, "Hero");
        link.set_enabled(false);
        h.frame(&link, "Hero", 1.0);
        assert!(link.latest_frame("Hero").is_none());
        assert_eq!(link.update(), LinkState::Active);
    }

    #[test]
    fn test_traffic_from_other_sender_ignored() {
        let h = Harness::new();
        let mut link = h.link();
        let noop: Arc<dyn MessageHandler> = Arc::new(|_d: Delivery| {});
        let stranger = h.bus.open(EndpointKind::Private, noop).unwrap();
        stranger
            .send(&link.local_address(), LinkMessage::Heartbeat, Annotations::new())
            .unwrap();
        assert!(h.bus.wait_idle(Duration::from_secs(2)));
        assert_eq!(link.update(), LinkState::Connecting);
        assert_eq!(link.messages_received(), 0);
    }

    #[test]
    fn test_evaluate_with_offset() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        // first frame fixes the offset at 0 (remote == local)
        h.frame(&link, "Hero", 100.0);
        h.clock.advance(0.5);
        h.frame(&link, "Hero", 100.5);

        link.set_evaluation_offset(0.3);
        let frame = link.evaluate("Hero").unwrap();
        assert!((frame.time.platform_seconds - 100.0).abs() < 1e-9);

        link.set_evaluation_offset(0.0);
        let frame = link.evaluate("Hero").unwrap();
        assert!((frame.time.platform_seconds - 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_timecode_evaluation_without_source() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        h.frame(&link, "Hero", 100.0);
        link.set_evaluation_mode(EvaluationMode::Timecode);
        assert!(link.evaluate("Hero").is_none());
    }

    #[test]
    fn test_buffer_size_clamped() {
        let h = Harness::new();
        let link = h.link();
        assert_eq!(link.set_buffer_size(0), 1);
        assert_eq!(link.set_buffer_size(5_000), 1_000);
    }

    #[test]
    fn test_fetch_removes_sample() {
        let h = Harness::new();
        let link = h.link();
        h.define(&link, "Hero");
        h.frame(&link, "Hero", 100.0);
        let sample = link.fetch("Hero", 99.0..101.0).unwrap();
        assert_eq!(sample.payload.shape, shapes::ANIMATION_FRAME);
        assert!(matches!(link.fetch("Hero", 99.0..101.0), Err(Error::NotFound)));
        assert!(matches!(link.fetch("Nobody", 0.0..1.0), Err(Error::NotFound)));
    }
}
