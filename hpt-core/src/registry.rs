//! Thread-safe endpoint registry using DashMap.
//!
//! Owns every live endpoint of a device and the global block budget.
//! Create and destroy are serialised by the allocation lock; lookups
//! (map, stats) only touch the map.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::config::DeviceConfig;
use crate::endpoint::{ConsumerMapping, Endpoint, EndpointInfo};
use crate::error::{HptError, HptResult, RegionError};
use crate::shm::{BlockAllocator, RingLayout};
use crate::stack::NetStack;
use crate::stats::{DeviceStats, StatsSnapshot};
use crate::types::{EndpointName, RingCapacity};

/// Blocks held by all endpoints together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBudget {
    pub in_use: usize,
    pub limit: usize,
}

pub struct EndpointRegistry {
    /// Map of interface name to endpoint.
    endpoints: DashMap<EndpointName, Endpoint>,
    /// Allocation lock. Held for the whole of create and destroy.
    budget: Mutex<BlockBudget>,
}

impl EndpointRegistry {
    /// Create a new empty registry with a budget of `limit` blocks.
    pub fn new(limit: usize) -> Self {
        Self {
            endpoints: DashMap::new(),
            budget: Mutex::new(BlockBudget { in_use: 0, limit }),
        }
    }

    fn lock_budget(&self) -> MutexGuard<'_, BlockBudget> {
        self.budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create and register an endpoint.
    pub fn create(
        &self,
        name: EndpointName,
        capacity: RingCapacity,
        config: &DeviceConfig,
        stack: Arc<dyn NetStack>,
        allocator: Arc<dyn BlockAllocator>,
    ) -> HptResult<EndpointInfo> {
        let mut budget = self.lock_budget();

        if self.endpoints.contains_key(&name) {
            return Err(HptError::NameInUse(name));
        }

        let blocks = RingLayout::new(capacity).block_count();
        if budget.in_use + blocks > budget.limit {
            return Err(RegionError::OutOfMemory {
                requested: blocks,
                allocated: 0,
                reason: format!(
                    "block budget exhausted ({} of {} in use)",
                    budget.in_use, budget.limit
                ),
            }
            .into());
        }

        let endpoint = Endpoint::create(name.clone(), capacity, config, stack, allocator)?;
        let info = endpoint.info();

        budget.in_use += blocks;
        self.endpoints.insert(name, endpoint);

        tracing::info!(
            endpoint = %info.name,
            capacity = info.capacity.get(),
            blocks_in_use = budget.in_use,
            "Endpoint registered"
        );

        Ok(info)
    }

    /// Map an endpoint's region for its consumer.
    pub fn map(&self, name: &EndpointName, requested_size: usize) -> HptResult<ConsumerMapping> {
        let mut entry = self
            .endpoints
            .get_mut(name)
            .ok_or_else(|| HptError::EndpointNotFound(name.clone()))?;
        entry.value_mut().map(requested_size)
    }

    /// Tear down and remove an endpoint, returning its blocks to the budget.
    pub fn destroy(&self, name: &EndpointName) -> HptResult<()> {
        let mut budget = self.lock_budget();

        let (_, mut endpoint) = self
            .endpoints
            .remove(name)
            .ok_or_else(|| HptError::EndpointNotFound(name.clone()))?;

        endpoint.destroy();
        budget.in_use = budget.in_use.saturating_sub(endpoint.layout().block_count());

        tracing::info!(endpoint = %name, blocks_in_use = budget.in_use, "Endpoint removed");

        Ok(())
    }

    pub fn stats(&self, name: &EndpointName) -> HptResult<StatsSnapshot> {
        self.endpoints
            .get(name)
            .map(|entry| entry.stats())
            .ok_or_else(|| HptError::EndpointNotFound(name.clone()))
    }

    /// Report every endpoint and the budget.
    pub fn snapshot(&self) -> DeviceStats {
        let budget = *self.lock_budget();
        let endpoints = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().report()))
            .collect();

        DeviceStats {
            endpoints,
            blocks_in_use: budget.in_use,
            block_limit: budget.limit,
        }
    }

    pub fn budget(&self) -> BlockBudget {
        *self.lock_budget()
    }

    pub fn contains(&self, name: &EndpointName) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::ShmBlockAllocator;
    use crate::stack::{LoopbackMode, LoopbackStack};
    use crate::types::MAX_ITEMS;

    fn create(
        registry: &EndpointRegistry,
        stack: &Arc<LoopbackStack>,
        name: &str,
        capacity: usize,
    ) -> HptResult<EndpointInfo> {
        registry.create(
            EndpointName::new(name).unwrap(),
            RingCapacity::new(capacity, MAX_ITEMS).unwrap(),
            &DeviceConfig::default(),
            stack.clone(),
            Arc::new(ShmBlockAllocator),
        )
    }

    #[test]
    fn test_create_and_destroy() {
        let registry = EndpointRegistry::new(100);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);

        let info = create(&registry, &stack, "hpt0", 4).unwrap();
        assert_eq!(info.region_size, 20480);
        assert_eq!(registry.budget().in_use, 5);
        assert!(registry.contains(&info.name));

        registry.destroy(&info.name).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.budget().in_use, 0);
        assert!(!stack.contains(&info.name));
    }

    #[test]
    fn test_name_in_use() {
        let registry = EndpointRegistry::new(100);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);

        create(&registry, &stack, "hpt0", 1).unwrap();
        assert!(matches!(
            create(&registry, &stack, "hpt0", 1),
            Err(HptError::NameInUse(_))
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.budget().in_use, 2);
    }

    #[test]
    fn test_budget_exhausted() {
        // cap 4 needs 5 blocks
        let registry = EndpointRegistry::new(9);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);

        create(&registry, &stack, "hpt0", 4).unwrap();
        let err = create(&registry, &stack, "hpt1", 4).unwrap_err();
        assert!(matches!(
            err,
            HptError::Region(RegionError::OutOfMemory { requested: 5, .. })
        ));
        assert!(!stack.contains(&EndpointName::new("hpt1").unwrap()));

        registry.destroy(&EndpointName::new("hpt0").unwrap()).unwrap();
        assert!(create(&registry, &stack, "hpt1", 4).is_ok());
    }

    #[test]
    fn test_map_through_registry() {
        let registry = EndpointRegistry::new(100);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);
        let info = create(&registry, &stack, "hpt0", 4).unwrap();

        let mapping = registry.map(&info.name, info.region_size).unwrap();
        assert_eq!(mapping.span().len(), info.region_size);
        assert_eq!(mapping.layout().capacity(), 4);
        assert!(matches!(
            registry.map(&info.name, info.region_size),
            Err(HptError::AlreadyMapped)
        ));
    }

    #[test]
    fn test_unknown_endpoint() {
        let registry = EndpointRegistry::new(10);
        let name = EndpointName::new("nope").unwrap();

        assert!(matches!(registry.destroy(&name), Err(HptError::EndpointNotFound(_))));
        assert!(matches!(registry.map(&name, 4096), Err(HptError::EndpointNotFound(_))));
        assert!(registry.stats(&name).is_err());
    }

    #[test]
    fn test_snapshot() {
        let registry = EndpointRegistry::new(100);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);
        create(&registry, &stack, "a0", 1).unwrap();
        create(&registry, &stack, "b0", 2).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.endpoints.len(), 2);
        assert_eq!(snap.endpoints["b0"].capacity, 2);
        assert_eq!(snap.blocks_in_use, 2 + 3);
        assert_eq!(snap.block_limit, 100);
    }
}
