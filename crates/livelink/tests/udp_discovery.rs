// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![cfg(feature = "udp")]
#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic

//! Discovery and streaming over real loopback sockets.

use livelink::protocol::shapes;
use livelink::provider::ProviderInfo;
use livelink::{
    FrameData, LinkCollection, LinkConfig, LinkContext, LinkState, SampleTime, StaticData,
    UdpTransport, UdpTransportConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn loopback_context() -> LinkContext {
    let port = fastrand::u16(40_000..60_000);
    let transport = Arc::new(UdpTransport::new(UdpTransportConfig::loopback(port)));
    LinkContext::builder(transport).build().unwrap()
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_discover_and_stream_over_loopback() {
    let port = fastrand::u16(40_000..60_000);
    let transport = Arc::new(UdpTransport::new(UdpTransportConfig::loopback(port)));
    let ctx = LinkContext::builder(transport)
        .config(LinkConfig {
            ping_interval_secs: 0.05,
            heartbeat_interval_secs: 0.05,
            ..Default::default()
        })
        .build()
        .unwrap();
    let provider = ctx.open_provider(ProviderInfo::new("LoopRig")).unwrap();
    ctx.start().unwrap();

    let links = LinkCollection::new();
    let id = links.add(ctx.discover_link("LoopRig").unwrap());

    assert!(
        wait_for(Duration::from_secs(5), || {
            links.tick();
            links.states() == vec![(id, LinkState::Active)]
        }),
        "link never became active: {:?}",
        links.states()
    );
    assert!(wait_for(Duration::from_secs(2), || provider.connection_count() == 1));

    let key = provider.subject_key("Cam");
    provider
        .update_subject_static_data(&key, "Camera", StaticData::new(shapes::CAMERA_STATIC))
        .unwrap();
    provider
        .push_frame(
            &key,
            FrameData::new(shapes::CAMERA_FRAME, SampleTime::from_platform(1.0))
                .with_values(vec![35.0]),
        )
        .unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        links
            .with_link(id, |link| link.latest_frame("Cam").is_some())
            .unwrap_or(false)
    }));
    let values = links
        .with_link(id, |link| link.latest_frame("Cam").map(|f| f.property_values))
        .flatten();
    assert_eq!(values, Some(vec![35.0]));

    ctx.stop();
}

#[test]
fn test_replay_larger_than_one_datagram() {
    let ctx = loopback_context();
    let provider = ctx.open_provider(ProviderInfo::new("BigRig")).unwrap();

    let bones: Vec<String> = (0..60).map(|i| format!("bone_{:02}_rotation", i)).collect();
    for i in 0..120 {
        let key = provider.subject_key(&format!("Actor{:03}", i));
        provider
            .update_subject_static_data(
                &key,
                "Animation",
                StaticData::new(shapes::ANIMATION_STATIC).with_properties(bones.iter().cloned()),
            )
            .unwrap();
        provider
            .push_frame(
                &key,
                FrameData::new(shapes::ANIMATION_FRAME, SampleTime::from_platform(1.0))
                    .with_values(vec![0.25; 60]),
            )
            .unwrap();
    }

    let links = LinkCollection::new();
    let id = links.add(ctx.connect_link(provider.address().unwrap(), "BigRig").unwrap());

    assert!(
        wait_for(Duration::from_secs(5), || {
            links.with_link(id, |link| link.subjects().len()) == Some(120)
        }),
        "replayed subjects: {:?}",
        links.with_link(id, |link| link.subjects().len())
    );
    links.with_link(id, |link| {
        assert_eq!(link.subject_role("Actor119").as_deref(), Some("Animation"));
        let frame = link.latest_frame("Actor000").unwrap();
        assert_eq!(frame.property_values.len(), 60);
    });
}

#[test]
fn test_oversized_frame_replayed_as_static_only() {
    let ctx = loopback_context();
    let provider = ctx.open_provider(ProviderInfo::new("WideRig")).unwrap();

    let wide = provider.subject_key("Wide");
    provider
        .update_subject_static_data(&wide, "Basic", StaticData::new(shapes::BASE_STATIC))
        .unwrap();
    // far beyond one datagram once encoded
    provider
        .push_frame(
            &wide,
            FrameData::new(shapes::BASE_FRAME, SampleTime::from_platform(1.0))
                .with_values(vec![0.5; 20_000]),
        )
        .unwrap();

    let cam = provider.subject_key("Cam");
    provider
        .update_subject_static_data(&cam, "Camera", StaticData::new(shapes::CAMERA_STATIC))
        .unwrap();
    provider
        .push_frame(
            &cam,
            FrameData::new(shapes::CAMERA_FRAME, SampleTime::from_platform(1.0))
                .with_values(vec![35.0]),
        )
        .unwrap();

    let links = LinkCollection::new();
    let id = links.add(ctx.connect_link(provider.address().unwrap(), "WideRig").unwrap());

    assert!(wait_for(Duration::from_secs(3), || {
        links.with_link(id, |link| link.subjects().len()) == Some(2)
    }));
    links.with_link(id, |link| {
        assert_eq!(link.subject_role("Wide").as_deref(), Some("Basic"));
        assert!(link.latest_frame("Wide").is_none());
        assert!(link.latest_frame("Cam").is_some());
    });
}
