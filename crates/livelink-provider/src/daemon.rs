// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider daemon core: frame pump and roster housekeeping.

use crate::config::ProviderConfig;
use crate::source::SyntheticSource;
use livelink::{
    Clock, LinkContext, ProviderEvent, ProviderInfo, ProviderRegistry, Transport, UdpTransport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Publishes the configured subjects until shut down.
#[derive(Clone)]
pub struct ProviderDaemon {
    config: Arc<ProviderConfig>,
    ctx: Arc<LinkContext>,
    provider: Arc<ProviderRegistry>,
    source: Arc<Mutex<SyntheticSource>>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl ProviderDaemon {
    /// Create a daemon on the UDP transport described by `config.transport`.
    pub fn new(config: ProviderConfig) -> Result<Self, DaemonError> {
        let transport = Arc::new(UdpTransport::new(config.transport.clone()));
        Self::with_transport(config, transport, None)
    }

    /// Create a daemon on an explicit transport and clock.
    pub fn with_transport(
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, DaemonError> {
        config
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        let mut builder = LinkContext::builder(transport).config(config.link.clone());
        if let Some(clock) = clock {
            builder = builder.clock(clock);
        }
        let ctx = builder.build().map_err(DaemonError::Link)?;

        let mut info = ProviderInfo::new(config.provider_name.clone());
        if let Some(machine) = &config.machine_name {
            info = info.with_machine_name(machine.clone());
        }
        let provider = ctx.open_provider(info).map_err(DaemonError::Link)?;
        let source = SyntheticSource::new(
            &provider,
            ctx.roles(),
            &config.subjects,
            config.timecode_fps,
        );

        Ok(Self {
            config: Arc::new(config),
            ctx: Arc::new(ctx),
            provider: Arc::new(provider),
            source: Arc::new(Mutex::new(source)),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), DaemonError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::AlreadyRunning);
        }

        self.ctx.start().map_err(DaemonError::Link)?;
        self.source
            .lock()
            .await
            .define(&self.provider)
            .map_err(DaemonError::Link)?;

        let events = self.provider.events();
        let mut frames = tokio::time::interval(self.config.frame_interval());
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);

        info!(
            "Publishing {} subject(s) at {} Hz",
            self.source.lock().await.subject_count(),
            self.config.frame_rate_hz
        );

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let now = self.ctx.clock().platform_seconds();
                    self.source.lock().await.tick(&self.provider, now);
                }
                _ = housekeeping.tick() => {
                    let evicted = self.provider.housekeeping();
                    if !evicted.is_empty() {
                        info!("Evicted {} silent consumer(s)", evicted.len());
                    }
                    for event in events.try_iter() {
                        match event {
                            ProviderEvent::ConnectionsChanged { count } => {
                                info!("Connected consumers: {}", count);
                            }
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    debug!("Frame pump shutting down");
                    break;
                }
            }
        }

        self.ctx.stop();
        self.provider.close();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Signal the daemon to stop. A signal sent before `run` starts waiting is kept.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn provider(&self) -> &ProviderRegistry {
        &self.provider
    }

    pub fn context(&self) -> &LinkContext {
        &self.ctx
    }

    pub async fn frames_pushed(&self) -> u64 {
        self.source.lock().await.frames_pushed()
    }
}

/// Daemon error types.
#[derive(Debug)]
pub enum DaemonError {
    Config(String),
    Link(livelink::Error),
    AlreadyRunning,
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "Configuration error: {}", s),
            Self::Link(e) => write!(f, "Link error: {}", e),
            Self::AlreadyRunning => write!(f, "Daemon already running"),
        }
    }
}

impl std::error::Error for DaemonError {}
