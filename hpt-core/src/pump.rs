// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Packet pump between the rings and the network stack.
//!
//! Inbound: a dedicated worker thread drains the consumer's ring on a timer
//! and delivers each packet to the stack. Outbound: the stack pushes into the
//! consumer's ring through a `TxQueue` and rings the doorbell. Nothing on
//! either path is retried; every failure is a counted drop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::doorbell::Doorbell;
use crate::error::{HptError, HptResult, RingError};
use crate::shm::{Ring, SLOT_USABLE_SIZE};
use crate::stack::{InboundPacket, NetStack, Protocol};
use crate::stats::{DropReason, EndpointStats};
use crate::types::{Direction, EndpointName};

/// Drains the inbound ring into the stack.
pub struct Pump {
    name: EndpointName,
    ring: Ring,
    stack: Arc<dyn NetStack>,
    stats: Arc<EndpointStats>,
}

impl Pump {
    /// `ring` must be the consumer side of the inbound ring.
    pub fn new(
        name: EndpointName,
        ring: Ring,
        stack: Arc<dyn NetStack>,
        stats: Arc<EndpointStats>,
    ) -> Self {
        Self {
            name,
            ring,
            stack,
            stats,
        }
    }

    fn drop_packet(&self, reason: DropReason) {
        tracing::trace!(endpoint = %self.name, reason = reason.as_str(), "Inbound drop");
        self.stats.record_drop(Direction::Inbound, reason);
    }

    /// Process the slots present when the cycle starts. Slots published
    /// during the cycle wait for the next one.
    ///
    /// Returns the number of slots consumed.
    pub fn run_cycle(&mut self) -> usize {
        let pending = self.ring.occupancy();
        let mut consumed = 0;

        for _ in 0..pending {
            let copied = match self.ring.peek() {
                Err(RingError::Empty) => break,
                Err(RingError::Corrupt { length }) => {
                    if usize::from(length) > SLOT_USABLE_SIZE {
                        Err(DropReason::Oversized)
                    } else {
                        Err(DropReason::Corrupt)
                    }
                }
                Err(_) => Err(DropReason::Corrupt),
                Ok(payload) => {
                    let mut data = Vec::new();
                    match data.try_reserve_exact(payload.len()) {
                        Ok(()) => {
                            data.extend_from_slice(payload);
                            Ok(data)
                        }
                        Err(_) => Err(DropReason::AllocFailure),
                    }
                }
            };

            // The payload borrow has ended; hand the slot back first.
            if self.ring.pop().is_err() {
                break;
            }
            consumed += 1;

            let data = match copied {
                Ok(data) => data,
                Err(reason) => {
                    self.drop_packet(reason);
                    continue;
                }
            };

            let Some(protocol) = Protocol::classify(&data) else {
                self.drop_packet(DropReason::UnsupportedProtocol);
                continue;
            };

            let len = data.len();
            self.stack.deliver(&self.name, InboundPacket { protocol, data });
            self.stats.record_delivered(Direction::Inbound, len);
        }

        consumed
    }
}

/// Handle on a running pump thread.
pub struct PumpWorker {
    name: EndpointName,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PumpWorker {
    /// Start the pump on its own thread, sleeping `interval` between cycles.
    pub fn spawn(mut pump: Pump, interval: Duration) -> HptResult<Self> {
        let name = pump.name.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("hpt-pump-{}", name))
            .spawn(move || {
                tracing::info!(endpoint = %pump.name, "Pump started");
                while !stop_flag.load(Ordering::Acquire) {
                    pump.run_cycle();
                    thread::park_timeout(interval);
                }
                tracing::info!(endpoint = %pump.name, "Pump stopped");
            })
            .map_err(|e| HptError::Io {
                context: "spawning pump thread",
                source: e,
            })?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit and wait for it. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();

        if handle.join().is_err() {
            tracing::error!(endpoint = %self.name, "Pump thread panicked");
        }
    }
}

impl Drop for PumpWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Gate that keeps the region alive under in-flight transmits.
///
/// Teardown closes the gate and waits until no transmit is inside before
/// the region is released. A transmit that arrives later sees the gate
/// closed and never touches shared memory.
#[derive(Debug)]
pub struct TxGate {
    open: AtomicBool,
    inflight: AtomicUsize,
}

struct TxPass<'a> {
    gate: &'a TxGate,
}

impl Drop for TxPass<'_> {
    fn drop(&mut self) {
        self.gate.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TxGate {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
        }
    }

    fn enter(&self) -> Option<TxPass<'_>> {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        let pass = TxPass { gate: self };
        if self.open.load(Ordering::SeqCst) {
            Some(pass)
        } else {
            None
        }
    }

    /// Close the gate and wait for in-flight transmits to leave.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        while self.inflight.load(Ordering::SeqCst) != 0 {
            thread::yield_now();
        }
    }
}

impl Default for TxGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one outbound transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Published to the consumer.
    Sent,
    /// Counted as a drop.
    Dropped(DropReason),
    /// The endpoint is being torn down; nothing was touched or counted.
    Closed,
}

/// Producer side of the outbound ring, owned by the network stack.
pub struct TxQueue {
    name: EndpointName,
    ring: Ring,
    gate: Arc<TxGate>,
    stats: Arc<EndpointStats>,
    doorbell: Arc<Doorbell>,
}

impl TxQueue {
    /// `ring` must be the producer side of the outbound ring.
    pub fn new(
        name: EndpointName,
        ring: Ring,
        gate: Arc<TxGate>,
        stats: Arc<EndpointStats>,
        doorbell: Arc<Doorbell>,
    ) -> Self {
        Self {
            name,
            ring,
            gate,
            stats,
            doorbell,
        }
    }

    pub fn name(&self) -> &EndpointName {
        &self.name
    }

    /// Push one packet towards the consumer.
    pub fn transmit(&mut self, packet: &[u8]) -> TxOutcome {
        let Some(_pass) = self.gate.enter() else {
            return TxOutcome::Closed;
        };

        let result = if packet.is_empty() {
            Err(DropReason::Corrupt)
        } else {
            match self.ring.push(packet) {
                Ok(()) => Ok(()),
                Err(RingError::Full) => Err(DropReason::RingFull),
                Err(RingError::OversizedPayload { .. }) => Err(DropReason::Oversized),
                Err(_) => Err(DropReason::Corrupt),
            }
        };

        match result {
            Ok(()) => {
                self.stats.record_delivered(Direction::Outbound, packet.len());
                self.doorbell.signal();
                TxOutcome::Sent
            }
            Err(reason) => {
                tracing::trace!(endpoint = %self.name, reason = reason.as_str(), "Outbound drop");
                self.stats.record_drop(Direction::Outbound, reason);
                TxOutcome::Dropped(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::{ring_pair, RingLayout};
    use crate::stack::{LoopbackMode, LoopbackStack};
    use crate::types::{RingCapacity, MAX_ITEMS};

    fn name() -> EndpointName {
        EndpointName::new("pump0").unwrap()
    }

    #[test]
    fn test_cycle_classifies_and_drops() {
        let (_region, mut producer, consumer) = ring_pair(8);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);
        let stats = Arc::new(EndpointStats::new());

        // Record mode delivers to a registered interface only, so read the
        // counters instead of the stack here.
        let mut pump = Pump::new(name(), consumer, stack, stats.clone());

        producer.push(&[0x45, 1, 2, 3]).unwrap();
        producer.push(&[]).unwrap();
        producer.push(&[0x10, 0]).unwrap();
        producer.push(&[0x60; 40]).unwrap();

        assert_eq!(pump.run_cycle(), 4);
        let snap = stats.snapshot();
        assert_eq!(snap.inbound.packets, 2);
        assert_eq!(snap.inbound.bytes, 44);
        assert_eq!(snap.inbound.drops.corrupt, 1);
        assert_eq!(snap.inbound.drops.unsupported_protocol, 1);
        assert_eq!(pump.run_cycle(), 0);
    }

    #[test]
    fn test_cycle_drops_overlong_length() {
        let (region, mut producer, consumer) = ring_pair(4);
        let stats = Arc::new(EndpointStats::new());
        let mut pump = Pump::new(
            name(),
            consumer,
            LoopbackStack::new_shared(LoopbackMode::Record),
            stats.clone(),
        );

        producer.push(&[0x45; 16]).unwrap();
        producer.push(&[0x60; 8]).unwrap();

        // Rewrite the first slot's length prefix past the usable size.
        let layout = RingLayout::new(RingCapacity::new(4, MAX_ITEMS).unwrap());
        let (block, offset) =
            RingLayout::block_position(layout.slot_offset(Direction::Inbound, 0));
        let length = region.block_ptr(block).unwrap();
        unsafe {
            std::ptr::write_unaligned(
                length.as_ptr().add(offset) as *mut u16,
                (SLOT_USABLE_SIZE + 1) as u16,
            );
        }

        assert_eq!(pump.run_cycle(), 2);
        assert_eq!(producer.occupancy(), 0);

        let snap = stats.snapshot().inbound;
        assert_eq!(snap.drops.oversized, 1);
        assert_eq!(snap.drops.corrupt, 0);
        assert_eq!(snap.packets, 1);
        assert_eq!(snap.bytes, 8);
    }

    #[test]
    fn test_cycle_is_bounded_by_entry_occupancy() {
        let (_region, mut producer, consumer) = ring_pair(4);
        let stats = Arc::new(EndpointStats::new());
        let mut pump = Pump::new(
            name(),
            consumer,
            LoopbackStack::new_shared(LoopbackMode::Record),
            stats,
        );

        producer.push(&[0x45]).unwrap();
        producer.push(&[0x45]).unwrap();
        assert_eq!(pump.run_cycle(), 2);

        for _ in 0..4 {
            producer.push(&[0x45]).unwrap();
        }
        assert_eq!(pump.run_cycle(), 4);
    }

    #[test]
    fn test_worker_stops() {
        let (_region, _producer, consumer) = ring_pair(2);
        let pump = Pump::new(
            name(),
            consumer,
            LoopbackStack::new_shared(LoopbackMode::Record),
            Arc::new(EndpointStats::new()),
        );

        let mut worker = PumpWorker::spawn(pump, Duration::from_millis(1)).unwrap();
        assert!(worker.handle.as_ref().is_some_and(|h| !h.is_finished()));
        worker.stop();
        assert!(worker.handle.is_none());
        worker.stop();
    }

    #[test]
    fn test_gate_closed_rejects() {
        let gate = TxGate::new();
        assert!(gate.enter().is_some());
        assert_eq!(gate.inflight.load(Ordering::SeqCst), 0);

        gate.close();
        assert!(!gate.open.load(Ordering::SeqCst));
        assert!(gate.enter().is_none());
        assert_eq!(gate.inflight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transmit_outcomes() {
        let (_region, producer, _consumer) = ring_pair(2);
        let gate = Arc::new(TxGate::new());
        let stats = Arc::new(EndpointStats::new());
        let doorbell = Arc::new(Doorbell::new().unwrap());
        let mut tx = TxQueue::new(name(), producer, gate.clone(), stats.clone(), doorbell.clone());

        assert_eq!(tx.transmit(&[]), TxOutcome::Dropped(DropReason::Corrupt));
        assert_eq!(
            tx.transmit(&vec![0x45; SLOT_USABLE_SIZE + 1]),
            TxOutcome::Dropped(DropReason::Oversized)
        );
        assert_eq!(tx.transmit(&[0x45; 10]), TxOutcome::Sent);
        assert!(doorbell.drain());
        assert_eq!(tx.transmit(&[0x45; 10]), TxOutcome::Sent);
        assert_eq!(tx.transmit(&[0x45; 10]), TxOutcome::Dropped(DropReason::RingFull));

        gate.close();
        assert_eq!(tx.transmit(&[0x45; 10]), TxOutcome::Closed);

        let snap = stats.snapshot().outbound;
        assert_eq!(snap.packets, 2);
        assert_eq!(snap.bytes, 20);
        assert_eq!(snap.drops.corrupt, 1);
        assert_eq!(snap.drops.oversized, 1);
        assert_eq!(snap.drops.ring_full, 1);
    }
}
