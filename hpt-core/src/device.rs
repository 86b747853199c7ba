// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Device entry point and per-consumer handles.
//!
//! A `Device` ties the registry to a network stack and a block allocator.
//! Each consumer opens a `DeviceHandle`, creates at most one endpoint on it
//! and maps it at most once. Dropping the handle destroys the endpoint.

use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::endpoint::{ConsumerMapping, EndpointInfo};
use crate::error::{HptError, HptResult};
use crate::registry::{BlockBudget, EndpointRegistry};
use crate::shm::{BlockAllocator, ShmBlockAllocator};
use crate::stack::NetStack;
use crate::stats::{DeviceStats, StatsSnapshot};
use crate::types::{EndpointName, RingCapacity};

struct DeviceInner {
    config: DeviceConfig,
    stack: Arc<dyn NetStack>,
    allocator: Arc<dyn BlockAllocator>,
    registry: EndpointRegistry,
}

/// Shared device. Cheap to clone.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Device backed by memfd shared memory.
    pub fn new(config: DeviceConfig, stack: Arc<dyn NetStack>) -> Self {
        Self::with_allocator(config, stack, Arc::new(ShmBlockAllocator))
    }

    pub fn with_allocator(
        config: DeviceConfig,
        stack: Arc<dyn NetStack>,
        allocator: Arc<dyn BlockAllocator>,
    ) -> Self {
        let registry = EndpointRegistry::new(config.max_blocks);
        Self {
            inner: Arc::new(DeviceInner {
                config,
                stack,
                allocator,
                registry,
            }),
        }
    }

    /// Open a fresh handle with no endpoint yet.
    pub fn open(&self) -> DeviceHandle {
        DeviceHandle {
            device: self.clone(),
            endpoint: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> DeviceStats {
        self.inner.registry.snapshot()
    }

    pub fn endpoint_stats(&self, name: &EndpointName) -> HptResult<StatsSnapshot> {
        self.inner.registry.stats(name)
    }

    pub fn budget(&self) -> BlockBudget {
        self.inner.registry.budget()
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.registry.len()
    }
}

/// One consumer's open handle on the device.
pub struct DeviceHandle {
    device: Device,
    endpoint: Option<EndpointName>,
}

impl DeviceHandle {
    /// Create the endpoint for this handle.
    pub fn create(&mut self, name: &str, capacity: usize) -> HptResult<EndpointInfo> {
        if self.endpoint.is_some() {
            return Err(HptError::AlreadyCreated);
        }

        let inner = &self.device.inner;
        let capacity = RingCapacity::new(capacity, inner.config.max_items)?;
        let name = EndpointName::new(name)?;

        let info = inner.registry.create(
            name,
            capacity,
            &inner.config,
            inner.stack.clone(),
            inner.allocator.clone(),
        )?;

        self.endpoint = Some(info.name.clone());
        Ok(info)
    }

    /// Map the endpoint's region. `size` must match the created region size
    /// after page alignment.
    pub fn map(&mut self, size: usize) -> HptResult<ConsumerMapping> {
        let name = self.endpoint.as_ref().ok_or(HptError::NotCreated)?;
        self.device.inner.registry.map(name, size)
    }

    pub fn endpoint(&self) -> Option<&EndpointName> {
        self.endpoint.as_ref()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Destroy the endpoint now instead of at drop.
    pub fn close(mut self) -> HptResult<()> {
        match self.endpoint.take() {
            Some(name) => self.device.inner.registry.destroy(&name),
            None => Ok(()),
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(name) = self.endpoint.take() {
            if let Err(e) = self.device.inner.registry.destroy(&name) {
                tracing::warn!(endpoint = %name, error = %e, "Failed to destroy endpoint on close");
            }
        }
    }
}
