// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with constants

//! Group operations and calibration checks against live links.

use livelink::protocol::shapes;
use livelink::provider::ProviderInfo;
use livelink::{
    Aggregator, CalibrationOutcome, FrameData, FrameRate, GroupEnabled, LinkCollection,
    LinkConfig, LinkContext, LinkId, ManualClock, MemoryBus, ProviderRegistry,
    QualifiedFrameTime, SampleTime, StaticData,
};
use std::sync::Arc;
use std::time::Duration;

struct Stage {
    bus: MemoryBus,
    ctx: LinkContext,
    links: Arc<LinkCollection>,
    aggregator: Aggregator,
}

impl Stage {
    fn new() -> Self {
        let clock = ManualClock::new(10.0, 1_700_000_000.0);
        let bus = MemoryBus::with_clock(Arc::new(clock.clone()));
        let ctx = LinkContext::builder(Arc::new(bus.clone()))
            .config(LinkConfig {
                default_buffer_size: 4,
                ..Default::default()
            })
            .clock(Arc::new(clock))
            .build()
            .unwrap();
        let links = Arc::new(LinkCollection::new());
        let aggregator = Aggregator::new(Arc::clone(&links));
        Self {
            bus,
            ctx,
            links,
            aggregator,
        }
    }

    fn settle(&self) {
        assert!(self.bus.wait_idle(Duration::from_secs(2)));
    }

    fn connect(&self, provider: &ProviderRegistry, group: &str) -> LinkId {
        let link = self
            .ctx
            .connect_link(provider.address().unwrap(), &provider.info().provider_name)
            .unwrap();
        let id = self.links.add(link);
        self.links.set_group(id, Some(group.to_string()));
        self.settle();
        self.links.tick();
        id
    }
}

fn define(provider: &ProviderRegistry) {
    provider
        .update_subject_static_data(
            &provider.subject_key("Body"),
            "Transform",
            StaticData::new(shapes::TRANSFORM_STATIC),
        )
        .unwrap();
}

fn push(provider: &ProviderRegistry, t: f64, timecode: Option<QualifiedFrameTime>) {
    let mut time = SampleTime::from_platform(t);
    time.timecode = timecode;
    provider
        .push_frame(
            &provider.subject_key("Body"),
            FrameData::new(shapes::TRANSFORM_FRAME, time),
        )
        .unwrap();
}

#[test]
fn test_group_settings_fan_out() {
    let stage = Stage::new();
    let a = stage.ctx.open_provider(ProviderInfo::new("A")).unwrap();
    let b = stage.ctx.open_provider(ProviderInfo::new("B")).unwrap();
    let c = stage.ctx.open_provider(ProviderInfo::new("C")).unwrap();
    let ia = stage.connect(&a, "stage");
    let ib = stage.connect(&b, "stage");
    let ic = stage.connect(&c, "booth");

    assert_eq!(stage.aggregator.groups(), vec!["booth", "stage"]);
    assert_eq!(stage.aggregator.group_members("stage"), vec![ia, ib]);

    assert_eq!(stage.aggregator.set_group_buffer_size("stage", 8), 2);
    assert_eq!(stage.aggregator.group_buffer_size("stage"), Some((8, 8)));
    assert_eq!(stage.aggregator.group_buffer_size("booth"), Some((4, 4)));

    stage.aggregator.set_group_evaluation_offset("booth", 0.25);
    assert_eq!(
        stage.aggregator.group_evaluation_offset("booth"),
        Some((0.25, 0.25))
    );

    stage.links.with_link(ia, |m| m.set_enabled(false));
    assert_eq!(
        stage.aggregator.group_enabled("stage"),
        GroupEnabled::MultipleValues
    );
    assert_eq!(stage.aggregator.group_enabled("booth"), GroupEnabled::Enabled);

    // membership change picked up without touching the aggregator
    stage.links.remove(ic);
    assert_eq!(stage.aggregator.groups(), vec!["stage"]);
}

#[test]
fn test_calibration_outcomes() {
    let stage = Stage::new();
    let provider = stage.ctx.open_provider(ProviderInfo::new("Rig")).unwrap();
    let id = stage.connect(&provider, "g");

    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::FailedNoDataBuffered)
    );

    define(&provider);
    push(&provider, 10.0, None);
    stage.settle();
    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::FailedNoTimecode)
    );

    push(
        &provider,
        10.1,
        Some(QualifiedFrameTime::new(3.0, FrameRate::new(0, 1))),
    );
    stage.settle();
    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::FailedInvalidFrameRate)
    );

    push(
        &provider,
        10.2,
        Some(QualifiedFrameTime::new(4.0, FrameRate::FPS_24)),
    );
    stage.settle();
    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::Succeeded)
    );

    push(
        &provider,
        10.3,
        Some(QualifiedFrameTime::new(5.0, FrameRate::FPS_24)),
    );
    stage.settle();
    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::RetryBufferSizeIncreased)
    );
    assert_eq!(stage.links.with_link(id, |m| m.buffer_size()), Some(8));
    assert_eq!(
        stage.aggregator.check_calibration(id),
        Some(CalibrationOutcome::Succeeded)
    );
}
