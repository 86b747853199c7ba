// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! One tunnel endpoint: region, rings, pump worker and stack registration.
//!
//! Setup order is allocate → initialise headers → register → start worker →
//! carrier up. Teardown runs the reverse and tolerates any prefix of setup
//! having happened, so a failed create just drops the half-built endpoint.

use std::sync::Arc;

use serde::Serialize;

use crate::config::DeviceConfig;
use crate::doorbell::Doorbell;
use crate::error::{HptError, HptResult, StackError};
use crate::pump::{Pump, PumpWorker, TxGate, TxQueue};
use crate::shm::{BlockAllocator, MappedSpan, Region, Ring, RingLayout};
use crate::stack::{InterfaceSpec, NetStack};
use crate::state::{EndpointState, EndpointStateMachine};
use crate::stats::{EndpointReport, EndpointStats, StatsSnapshot};
use crate::types::{Direction, EndpointName, RingCapacity};

/// What a successful create reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointInfo {
    pub name: EndpointName,
    pub capacity: RingCapacity,
    /// Exact size the consumer must map.
    pub region_size: usize,
}

/// The consumer's view of an endpoint after a successful map.
pub struct ConsumerMapping {
    span: MappedSpan,
    layout: RingLayout,
    doorbell: Arc<Doorbell>,
}

impl ConsumerMapping {
    pub fn span(&self) -> &MappedSpan {
        &self.span
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn doorbell(&self) -> &Arc<Doorbell> {
        &self.doorbell
    }

    pub fn into_parts(self) -> (MappedSpan, RingLayout, Arc<Doorbell>) {
        (self.span, self.layout, self.doorbell)
    }
}

pub struct Endpoint {
    name: EndpointName,
    capacity: RingCapacity,
    layout: RingLayout,
    region: Region,
    state: EndpointStateMachine,
    stats: Arc<EndpointStats>,
    doorbell: Arc<Doorbell>,
    gate: Arc<TxGate>,
    worker: Option<PumpWorker>,
    stack: Arc<dyn NetStack>,
    registered: bool,
    mapped: bool,
}

impl Endpoint {
    /// Bring up an endpoint. On error everything set up so far is torn down
    /// before returning.
    pub fn create(
        name: EndpointName,
        capacity: RingCapacity,
        config: &DeviceConfig,
        stack: Arc<dyn NetStack>,
        allocator: Arc<dyn BlockAllocator>,
    ) -> HptResult<Self> {
        let layout = RingLayout::new(capacity);
        let region = Region::allocate(allocator, layout.region_size())?;
        let doorbell = Doorbell::new().map_err(|e| HptError::Io {
            context: "creating doorbell",
            source: e,
        })?;

        let mut endpoint = Self {
            state: EndpointStateMachine::new(name.clone()),
            name,
            capacity,
            layout,
            region,
            stats: Arc::new(EndpointStats::new()),
            doorbell: Arc::new(doorbell),
            gate: Arc::new(TxGate::new()),
            worker: None,
            stack,
            registered: false,
            mapped: false,
        };

        // SAFETY: the pump ring is only used by the worker, which is joined
        // before the region is released; the tx ring sits behind the gate,
        // which is closed before the region is released.
        let (mut inbound, mut outbound) = unsafe {
            (
                Ring::from_region(&endpoint.region, &layout, Direction::Inbound)?,
                Ring::from_region(&endpoint.region, &layout, Direction::Outbound)?,
            )
        };
        inbound.initialize(&layout, Direction::Inbound);
        outbound.initialize(&layout, Direction::Outbound);

        let tx = TxQueue::new(
            endpoint.name.clone(),
            outbound,
            endpoint.gate.clone(),
            endpoint.stats.clone(),
            endpoint.doorbell.clone(),
        );
        let spec = InterfaceSpec::tunnel(endpoint.name.clone(), config.mtu);
        endpoint
            .stack
            .register(&spec, tx)
            .map_err(|e| match e {
                StackError::NameInUse(name) => HptError::NameInUse(name),
                StackError::Rejected { reason } => HptError::Registration {
                    name: endpoint.name.clone(),
                    reason,
                },
            })?;
        endpoint.registered = true;

        let pump = Pump::new(
            endpoint.name.clone(),
            inbound,
            endpoint.stack.clone(),
            endpoint.stats.clone(),
        );
        endpoint.worker = Some(PumpWorker::spawn(pump, config.poll_interval)?);

        endpoint.stack.set_carrier(&endpoint.name, true);
        endpoint.state.transition_to(EndpointState::Active)?;

        tracing::debug!(
            endpoint = %endpoint.name,
            capacity = capacity.get(),
            region_size = layout.region_size(),
            "Endpoint created"
        );

        Ok(endpoint)
    }

    pub fn name(&self) -> &EndpointName {
        &self.name
    }

    pub fn state(&self) -> EndpointState {
        self.state.state()
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn info(&self) -> EndpointInfo {
        EndpointInfo {
            name: self.name.clone(),
            capacity: self.capacity,
            region_size: self.layout.region_size(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn report(&self) -> EndpointReport {
        EndpointReport {
            state: self.state(),
            capacity: self.capacity.get(),
            region_size: self.layout.region_size(),
            stats: self.stats(),
        }
    }

    /// Map the region for the consumer. Only one mapping per endpoint.
    pub fn map(&mut self, requested_size: usize) -> HptResult<ConsumerMapping> {
        if self.mapped {
            return Err(HptError::AlreadyMapped);
        }
        if !self.state.is_active() {
            return Err(HptError::EndpointNotActive {
                name: self.name.clone(),
                state: self.state(),
            });
        }

        let span = self.region.map_into_consumer(requested_size)?;
        self.mapped = true;

        tracing::debug!(endpoint = %self.name, size = span.len(), "Endpoint mapped");

        Ok(ConsumerMapping {
            span,
            layout: self.layout,
            doorbell: self.doorbell.clone(),
        })
    }

    /// Tear the endpoint down. Queued packets are discarded. Idempotent.
    pub fn destroy(&mut self) {
        if self.state() == EndpointState::Destroyed {
            return;
        }

        if let Err(e) = self.state.transition_to(EndpointState::Stopping) {
            tracing::warn!(endpoint = %self.name, error = %e, "Unexpected state at teardown");
        }

        self.gate.close();
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        self.region.release();

        if self.registered {
            self.stack.set_carrier(&self.name, false);
            self.stack.unregister(&self.name);
            self.registered = false;
        }

        if let Err(e) = self.state.transition_to(EndpointState::Destroyed) {
            tracing::warn!(endpoint = %self.name, error = %e, "Unexpected state at teardown");
        }

        tracing::debug!(endpoint = %self.name, "Endpoint destroyed");
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.destroy();
    }
}
