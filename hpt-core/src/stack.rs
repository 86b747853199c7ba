// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Network stack collaborator.
//!
//! The endpoint only talks to the host network stack through `NetStack`.
//! `LoopbackStack` is an in-process implementation that records or echoes
//! what it is given.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::StackError;
use crate::pump::{TxOutcome, TxQueue};
use crate::types::EndpointName;

/// Network protocol of a raw IP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ipv4,
    Ipv6,
}

impl Protocol {
    /// Classify by the IP version nibble of the first byte.
    pub fn classify(packet: &[u8]) -> Option<Self> {
        match packet.first()? >> 4 {
            4 => Some(Self::Ipv4),
            6 => Some(Self::Ipv6),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A packet handed from the pump to the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    pub protocol: Protocol,
    pub data: Vec<u8>,
}

/// Interface properties passed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSpec {
    pub name: EndpointName,
    pub mtu: usize,
    /// No link-layer peers.
    pub point_to_point: bool,
    /// No address resolution.
    pub no_arp: bool,
}

impl InterfaceSpec {
    /// A raw-IP point-to-point interface.
    pub fn tunnel(name: EndpointName, mtu: usize) -> Self {
        Self {
            name,
            mtu,
            point_to_point: true,
            no_arp: true,
        }
    }
}

/// Host network stack as seen by an endpoint.
///
/// The stack owns the `TxQueue` it is given at registration and must
/// serialize calls to `TxQueue::transmit` (it takes `&mut self`).
pub trait NetStack: Send + Sync {
    /// Register an interface. Fails with `NameInUse` if the name is taken.
    fn register(&self, spec: &InterfaceSpec, tx: TxQueue) -> Result<(), StackError>;

    /// Remove an interface and drop its tx queue. Unknown names are ignored.
    fn unregister(&self, name: &EndpointName);

    /// Hand one inbound packet to the stack.
    fn deliver(&self, name: &EndpointName, packet: InboundPacket);

    /// Report link carrier.
    fn set_carrier(&self, name: &EndpointName, up: bool);
}

/// What `LoopbackStack` does with delivered packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackMode {
    /// Keep them for `take_received`.
    Record,
    /// Send each one straight back out of the same interface.
    Echo,
}

struct Interface {
    spec: InterfaceSpec,
    tx: Mutex<TxQueue>,
    carrier: AtomicBool,
    received: Mutex<Vec<InboundPacket>>,
}

/// In-process stack used by the CLI and the tests.
pub struct LoopbackStack {
    mode: LoopbackMode,
    interfaces: DashMap<EndpointName, Arc<Interface>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LoopbackStack {
    pub fn new(mode: LoopbackMode) -> Self {
        Self {
            mode,
            interfaces: DashMap::new(),
        }
    }

    pub fn new_shared(mode: LoopbackMode) -> Arc<Self> {
        Arc::new(Self::new(mode))
    }

    pub fn mode(&self) -> LoopbackMode {
        self.mode
    }

    fn interface(&self, name: &EndpointName) -> Option<Arc<Interface>> {
        self.interfaces.get(name).map(|entry| entry.value().clone())
    }

    /// Send a packet out of `name` towards the consumer.
    /// Returns `None` for an unknown interface.
    pub fn transmit(&self, name: &EndpointName, packet: &[u8]) -> Option<TxOutcome> {
        let iface = self.interface(name)?;
        let outcome = lock(&iface.tx).transmit(packet);
        Some(outcome)
    }

    /// Take every packet recorded for `name` so far.
    pub fn take_received(&self, name: &EndpointName) -> Vec<InboundPacket> {
        self.interface(name)
            .map(|iface| std::mem::take(&mut *lock(&iface.received)))
            .unwrap_or_default()
    }

    pub fn carrier(&self, name: &EndpointName) -> Option<bool> {
        self.interface(name)
            .map(|iface| iface.carrier.load(Ordering::Acquire))
    }

    pub fn interface_spec(&self, name: &EndpointName) -> Option<InterfaceSpec> {
        self.interface(name).map(|iface| iface.spec.clone())
    }

    pub fn contains(&self, name: &EndpointName) -> bool {
        self.interfaces.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl NetStack for LoopbackStack {
    fn register(&self, spec: &InterfaceSpec, tx: TxQueue) -> Result<(), StackError> {
        use dashmap::mapref::entry::Entry;

        match self.interfaces.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(StackError::NameInUse(spec.name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Interface {
                    spec: spec.clone(),
                    tx: Mutex::new(tx),
                    carrier: AtomicBool::new(false),
                    received: Mutex::new(Vec::new()),
                }));
                tracing::debug!(endpoint = %spec.name, mtu = spec.mtu, "Interface registered");
                Ok(())
            }
        }
    }

    fn unregister(&self, name: &EndpointName) {
        if self.interfaces.remove(name).is_some() {
            tracing::debug!(endpoint = %name, "Interface unregistered");
        }
    }

    fn deliver(&self, name: &EndpointName, packet: InboundPacket) {
        let Some(iface) = self.interface(name) else {
            return;
        };

        match self.mode {
            LoopbackMode::Record => lock(&iface.received).push(packet),
            LoopbackMode::Echo => {
                // Drops are already counted by the tx queue.
                let _ = lock(&iface.tx).transmit(&packet.data);
            }
        }
    }

    fn set_carrier(&self, name: &EndpointName, up: bool) {
        if let Some(iface) = self.interface(name) {
            iface.carrier.store(up, Ordering::Release);
        }
    }
}
