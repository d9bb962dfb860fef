// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Services shared by every link of a process.

use super::{ConnectionMonitor, HeartbeatEmitter, LinkId};
use crate::config::LinkConfig;
use crate::discovery::DiscoveryBroadcaster;
use crate::error::Result;
use crate::protocol::RoleRegistry;
use crate::provider::{ProviderInfo, ProviderRegistry};
use crate::time::{Clock, SystemClock};
use crate::transport::{EndpointAddress, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) struct LinkServices {
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub roles: RoleRegistry,
    pub config: LinkConfig,
    pub discovery: Arc<DiscoveryBroadcaster>,
    pub heartbeats: Arc<HeartbeatEmitter>,
}

/// Entry point for consumers (and in-process providers).
///
/// Owns one [`DiscoveryBroadcaster`] and one [`HeartbeatEmitter`]; every link
/// created from the context shares them.
pub struct LinkContext {
    services: Arc<LinkServices>,
    next_link: AtomicU64,
}

impl LinkContext {
    pub fn builder(transport: Arc<dyn Transport>) -> LinkContextBuilder {
        LinkContextBuilder {
            transport,
            config: LinkConfig::default(),
            clock: None,
            roles: None,
        }
    }

    /// Start the discovery and heartbeat threads.
    pub fn start(&self) -> Result<()> {
        self.services.discovery.start()?;
        self.services.heartbeats.start()?;
        log::debug!("[context] discovery and heartbeat threads started");
        Ok(())
    }

    /// Stop both background threads. Links stay open.
    pub fn stop(&self) {
        self.services.discovery.stop();
        self.services.heartbeats.stop();
    }

    /// Link to a provider at a known address.
    pub fn connect_link(
        &self,
        address: EndpointAddress,
        provider_name: &str,
    ) -> Result<ConnectionMonitor> {
        ConnectionMonitor::connect_to(self, address, provider_name)
    }

    /// Link to the provider advertising `provider_name`, found by discovery.
    pub fn discover_link(&self, provider_name: &str) -> Result<ConnectionMonitor> {
        ConnectionMonitor::discover(self, provider_name)
    }

    /// Open a provider on the same transport, clock and roles.
    pub fn open_provider(&self, info: ProviderInfo) -> Result<ProviderRegistry> {
        ProviderRegistry::new(
            self.services.transport.as_ref(),
            info,
            Arc::clone(&self.services.clock),
            self.services.roles.clone(),
            &self.services.config,
        )
    }

    pub fn config(&self) -> &LinkConfig {
        &self.services.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.services.clock
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.services.roles
    }

    pub fn discovery(&self) -> &Arc<DiscoveryBroadcaster> {
        &self.services.discovery
    }

    pub fn heartbeats(&self) -> &Arc<HeartbeatEmitter> {
        &self.services.heartbeats
    }

    pub(crate) fn services(&self) -> Arc<LinkServices> {
        Arc::clone(&self.services)
    }

    pub(crate) fn next_link_id(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Drop for LinkContext {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`LinkContext`].
pub struct LinkContextBuilder {
    transport: Arc<dyn Transport>,
    config: LinkConfig,
    clock: Option<Arc<dyn Clock>>,
    roles: Option<RoleRegistry>,
}

impl LinkContextBuilder {
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to [`RoleRegistry::with_defaults`].
    pub fn roles(mut self, roles: RoleRegistry) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Validate the configuration and open the discovery endpoint.
    pub fn build(self) -> Result<LinkContext> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        let roles = self.roles.unwrap_or_else(RoleRegistry::with_defaults);

        let discovery = DiscoveryBroadcaster::new(
            self.transport.as_ref(),
            Arc::clone(&clock),
            self.config.ping_interval(),
        )?;
        let heartbeats = HeartbeatEmitter::new(self.config.heartbeat_interval());

        Ok(LinkContext {
            services: Arc::new(LinkServices {
                transport: self.transport,
                clock,
                roles,
                config: self.config,
                discovery,
                heartbeats,
            }),
            next_link: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use crate::transport::memory::MemoryBus;

    #[test]
    fn test_build_rejects_invalid_config() {
        let bus = MemoryBus::new();
        let result = LinkContext::builder(Arc::new(bus))
            .config(LinkConfig {
                heartbeat_timeout_secs: 0.0,
                ..Default::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_link_ids_unique() {
        let bus = MemoryBus::new();
        let ctx = LinkContext::builder(Arc::new(bus)).build().unwrap();
        let a = ctx.discover_link("A").unwrap();
        let b = ctx.discover_link("B").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(ctx.discovery().interest_count(), 2);
        drop(a);
        assert_eq!(ctx.discovery().interest_count(), 1);
    }

    #[test]
    fn test_start_stop() {
        let bus = MemoryBus::new();
        let ctx = LinkContext::builder(Arc::new(bus))
            .clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap();
        ctx.start().unwrap();
        assert!(ctx.discovery().is_running());
        assert!(ctx.heartbeats().is_running());
        ctx.stop();
        assert!(!ctx.discovery().is_running());
        assert!(!ctx.heartbeats().is_running());
    }

    #[test]
    fn test_open_provider_shares_transport() {
        let bus = MemoryBus::new();
        let ctx = LinkContext::builder(Arc::new(bus.clone())).build().unwrap();
        let before = bus.endpoint_count();
        let provider = ctx.open_provider(ProviderInfo::new("Rig")).unwrap();
        assert_eq!(bus.endpoint_count(), before + 1);
        assert_eq!(provider.info().provider_name, "Rig");
    }
}
