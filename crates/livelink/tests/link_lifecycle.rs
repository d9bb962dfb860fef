// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! End-to-end link lifecycle over the in-memory bus.
//!
//! One process-wide `ManualClock` drives the bus stamps, the provider and the
//! consumer, so every timeout is stepped explicitly.

use livelink::provider::ProviderInfo;
use livelink::protocol::{shapes, Annotations};
use livelink::{
    Clock, Delivery, Endpoint, EndpointKind, FrameData, LinkCollection, LinkConfig, LinkContext,
    LinkMessage, LinkState, ManualClock, MemoryBus, MessageHandler, ProviderRegistry,
    SampleTime, StaticData, Transport, PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDLE: Duration = Duration::from_secs(2);

struct World {
    clock: ManualClock,
    bus: MemoryBus,
    ctx: LinkContext,
}

impl World {
    fn new() -> Self {
        Self::with_config(LinkConfig {
            heartbeat_timeout_secs: 2.0,
            dead_source_timeout_secs: 5.0,
            provider_connection_timeout_secs: 4.0,
            ..Default::default()
        })
    }

    fn with_config(config: LinkConfig) -> Self {
        let clock = ManualClock::new(1_000.0, 1_700_000_000.0);
        let bus = MemoryBus::with_clock(Arc::new(clock.clone()));
        let ctx = LinkContext::builder(Arc::new(bus.clone()))
            .config(config)
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        Self { clock, bus, ctx }
    }

    fn provider(&self, name: &str) -> ProviderRegistry {
        self.ctx
            .open_provider(ProviderInfo::new(name).with_machine_name("stage-pc"))
            .unwrap()
    }

    fn settle(&self) {
        assert!(self.bus.wait_idle(IDLE), "bus did not drain");
    }

    fn raw_endpoint(&self) -> Arc<dyn Endpoint> {
        let noop: Arc<dyn MessageHandler> = Arc::new(|_d: Delivery| {});
        self.bus.open(EndpointKind::Private, noop).unwrap()
    }
}

fn define_hero(provider: &ProviderRegistry) {
    provider
        .update_subject_static_data(
            &provider.subject_key("Hero"),
            "Animation",
            StaticData::new(shapes::ANIMATION_STATIC).with_properties(["blink"]),
        )
        .unwrap();
}

fn hero_frame(t: f64) -> FrameData {
    FrameData::new(shapes::ANIMATION_FRAME, SampleTime::from_platform(t)).with_values(vec![0.5])
}

#[test]
fn test_discovery_then_connect_and_stream() {
    let world = World::new();
    let provider = world.provider("RigA");
    let _other = world.provider("RigB");

    let links = LinkCollection::new();
    let id = links.add(world.ctx.discover_link("RigA").unwrap());
    assert_eq!(links.states(), vec![(id, LinkState::AwaitingDiscovery)]);

    assert!(world.ctx.discovery().tick());
    world.settle();
    let mut names: Vec<String> = world
        .ctx
        .discovery()
        .results()
        .into_iter()
        .map(|d| d.display_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["RigA", "RigB"]);

    links.tick();
    world.settle();
    assert_eq!(world.ctx.discovery().interest_count(), 0);
    assert_eq!(provider.connection_count(), 1);

    links.tick();
    assert_eq!(links.states(), vec![(id, LinkState::Active)]);

    define_hero(&provider);
    provider
        .push_frame(&provider.subject_key("Hero"), hero_frame(1_000.0))
        .unwrap();
    world.settle();

    links.with_link(id, |link| {
        assert_eq!(link.subject_role("Hero").as_deref(), Some("Animation"));
        let frame = link.latest_frame("Hero").unwrap();
        assert_eq!(frame.property_values, vec![0.5]);
        assert!((frame.time.platform_seconds - 1_000.0).abs() < 1e-9);
    });
}

#[test]
fn test_discovery_on_default_interval_finds_single_provider() {
    let world = World::new();
    let _provider = world.provider("RigA");
    assert_eq!(
        world.ctx.discovery().ping_interval(),
        Duration::from_secs_f64(1.0)
    );

    let interest = world.ctx.discovery().subscribe();
    world.ctx.start().unwrap();

    // results are rebuilt every cycle; poll until the pong of a cycle is in
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut results = Vec::new();
    while Instant::now() < deadline {
        results = world.ctx.discovery().results();
        if !results.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    world.ctx.stop();
    interest.release();

    assert_eq!(results.len(), 1, "results: {:?}", results);
    assert_eq!(results[0].display_name, "RigA");
    assert_eq!(results[0].machine_name, "stage-pc");
    assert!(world.ctx.discovery().pings_sent() >= 1);
}

#[test]
fn test_replay_delivers_static_before_frame() {
    let world = World::new();
    let provider = world.provider("RigA");
    define_hero(&provider);
    provider
        .push_frame(&provider.subject_key("Hero"), hero_frame(999.0))
        .unwrap();

    let link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();

    assert_eq!(link.subject_role("Hero").as_deref(), Some("Animation"));
    assert!(link.latest_frame("Hero").is_some());
    assert_eq!(link.buffered("Hero"), 1);
    assert_eq!(world.bus.sent_count("StateSnapshot"), 1);
}

#[test]
fn test_reconnect_from_known_address_does_not_replay() {
    let world = World::new();
    let provider = world.provider("RigA");
    let raw = world.raw_endpoint();
    let target = provider.address().unwrap();

    for _ in 0..2 {
        raw.send(
            &target,
            LinkMessage::Connect {
                protocol_version: PROTOCOL_VERSION,
            },
            Annotations::new(),
        )
        .unwrap();
        world.settle();
    }
    assert_eq!(provider.connection_count(), 1);
    assert_eq!(world.bus.sent_count("StateSnapshot"), 1);
}

#[test]
fn test_version_mismatch_changes_nothing() {
    let world = World::new();
    let provider = world.provider("RigA");
    let raw = world.raw_endpoint();
    let target = provider.address().unwrap();

    raw.send(
        &target,
        LinkMessage::Connect {
            protocol_version: PROTOCOL_VERSION + 1,
        },
        Annotations::new(),
    )
    .unwrap();
    raw.send(
        &target,
        LinkMessage::Ping {
            request_id: 7,
            protocol_version: PROTOCOL_VERSION - 1,
        },
        Annotations::new(),
    )
    .unwrap();
    world.settle();

    assert_eq!(provider.connection_count(), 0);
    assert_eq!(world.bus.sent_count("Pong"), 0);
    assert_eq!(world.bus.sent_count("StateSnapshot"), 0);
}

#[test]
fn test_unresponsive_provider_scenario() {
    let world = World::new();
    let removals = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&removals);

    let silent = world.raw_endpoint();
    let mut link = world.ctx.connect_link(silent.address(), "Ghost").unwrap();
    link.on_removed(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    world.clock.advance(2.1);
    link.update();
    assert!(!link.is_valid());
    assert_eq!(link.state(), LinkState::SoftInvalid);
    assert_eq!(removals.load(Ordering::SeqCst), 0);

    world.clock.advance(3.0);
    assert_eq!(link.update(), LinkState::Dead);
    link.update();
    assert_eq!(removals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_soft_invalid_recovers_through_heartbeat_echo() {
    let world = World::new();
    let provider = world.provider("RigA");
    let mut link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();
    assert_eq!(link.update(), LinkState::Active);

    world.clock.advance(2.5);
    assert_eq!(link.update(), LinkState::SoftInvalid);
    assert_eq!(link.status(), "Not responding");

    assert_eq!(world.ctx.heartbeats().emit_now(), 1);
    world.settle();
    assert_eq!(link.update(), LinkState::Active);
}

#[test]
fn test_provider_evicts_silent_consumer() {
    let world = World::new();
    let provider = world.provider("RigA");
    let events = provider.events();
    let link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();
    assert_eq!(provider.connection_count(), 1);

    world.clock.advance(3.5);
    assert!(provider.housekeeping().is_empty());
    world.clock.advance(1.0);
    assert_eq!(provider.housekeeping(), vec![link.local_address()]);
    assert_eq!(provider.connection_count(), 0);

    let counts: Vec<usize> = events
        .try_iter()
        .map(|livelink::ProviderEvent::ConnectionsChanged { count }| count)
        .collect();
    assert_eq!(counts, vec![1, 0]);
}

#[test]
fn test_clear_subject_and_redefinition() {
    let world = World::new();
    let provider = world.provider("RigA");
    let link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();

    define_hero(&provider);
    provider
        .push_frame(&provider.subject_key("Hero"), hero_frame(1_000.0))
        .unwrap();
    world.settle();
    assert_eq!(link.buffered("Hero"), 1);

    // new static data resets the subject
    define_hero(&provider);
    world.settle();
    assert_eq!(link.buffered("Hero"), 0);
    assert!(link.latest_frame("Hero").is_none());

    assert!(provider.remove_subject(&provider.subject_key("Hero")));
    world.settle();
    assert!(link.subjects().is_empty());
}

#[test]
fn test_provider_rejects_bad_frames() {
    let world = World::new();
    let provider = world.provider("RigA");
    let key = provider.subject_key("Hero");

    assert!(provider.push_frame(&key, hero_frame(1.0)).is_err());
    define_hero(&provider);
    let wrong = FrameData::new(shapes::CAMERA_FRAME, SampleTime::from_platform(1.0));
    assert!(provider.push_frame(&key, wrong).is_err());
    assert!(provider.push_frame(&key, hero_frame(1.0)).is_ok());
}

#[test]
fn test_clock_offset_tracks_provider_timeline() {
    let world = World::new();
    let provider = world.provider("RigA");
    let link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();
    define_hero(&provider);

    // provider stamps frames on its own timeline, 250 s behind ours
    for _ in 0..5 {
        let local = world.clock.platform_seconds();
        provider
            .push_frame(&provider.subject_key("Hero"), hero_frame(local - 250.0))
            .unwrap();
        world.settle();
        world.clock.advance(0.1);
    }

    assert!((link.clock_offset() - 250.0).abs() < 1e-6);
    let latest = link.latest_frame("Hero").unwrap();
    let expected = world.clock.platform_seconds() - 0.1;
    assert!((latest.time.platform_seconds - expected).abs() < 1e-6);
}

#[test]
fn test_replayed_stale_frame_keeps_clock_aligned() {
    // provider and consumer share one clock: the true offset is zero
    let world = World::new();
    let provider = world.provider("RigA");
    define_hero(&provider);
    let cached_at = world.clock.platform_seconds();
    provider
        .push_frame(&provider.subject_key("Hero"), hero_frame(cached_at))
        .unwrap();

    world.clock.advance(20.0);
    let link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();

    let replayed = link.latest_frame("Hero").unwrap();
    assert!((replayed.time.platform_seconds - cached_at).abs() < 1e-6);
    assert!(link.clock_offset().abs() < 1e-6);

    let now = world.clock.platform_seconds();
    provider
        .push_frame(&provider.subject_key("Hero"), hero_frame(now))
        .unwrap();
    world.settle();

    let live = link.latest_frame("Hero").unwrap();
    assert!(
        (live.time.platform_seconds - now).abs() < 1e-3,
        "live frame at {} for local {}",
        live.time.platform_seconds,
        now
    );
}

#[test]
fn test_link_recovers_after_provider_eviction() {
    let world = World::with_config(LinkConfig::default());
    let provider = world.provider("RigA");
    let mut link = world
        .ctx
        .connect_link(provider.address().unwrap(), "RigA")
        .unwrap();
    world.settle();
    assert_eq!(link.update(), LinkState::Active);

    // outage longer than the provider's window, shorter than the dead timeout
    world.bus.partition(&link.local_address());
    world.clock.advance(12.0);
    assert_eq!(link.update(), LinkState::SoftInvalid);
    world.settle();
    assert_eq!(provider.housekeeping(), vec![link.local_address()]);
    assert_eq!(provider.connection_count(), 0);

    // heartbeats alone are ignored by the provider
    world.bus.heal(&link.local_address());
    assert_eq!(world.ctx.heartbeats().emit_now(), 1);
    world.settle();
    assert_eq!(link.update(), LinkState::SoftInvalid);

    // the next interval resends Connect and the provider takes the link back
    world.clock.advance(1.0);
    assert_eq!(link.update(), LinkState::SoftInvalid);
    world.settle();
    assert_eq!(provider.connection_count(), 1);
    assert_eq!(link.update(), LinkState::Active);

    world.ctx.heartbeats().emit_now();
    world.settle();
    assert_eq!(link.update(), LinkState::Active);
}
