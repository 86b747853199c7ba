// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-endpoint packet counters.
//!
//! Counters are plain relaxed atomics shared by the pump, the tx queue and
//! the client. A snapshot is a best-effort read, not a consistent cut.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::state::EndpointState;
use crate::types::Direction;

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    /// Larger than a slot can carry.
    Oversized,
    /// Slot length was zero or out of range.
    Corrupt,
    /// First byte was not an IPv4 or IPv6 version nibble.
    UnsupportedProtocol,
    /// No free slot in the outbound ring.
    RingFull,
    /// Could not allocate a buffer for the packet.
    AllocFailure,
}

impl DropReason {
    pub const ALL: [DropReason; 5] = [
        Self::Oversized,
        Self::Corrupt,
        Self::UnsupportedProtocol,
        Self::RingFull,
        Self::AllocFailure,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Oversized => "oversized",
            Self::Corrupt => "corrupt",
            Self::UnsupportedProtocol => "unsupported-protocol",
            Self::RingFull => "ring-full",
            Self::AllocFailure => "alloc-failure",
        }
    }

    const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct DirectionCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
    drops: [AtomicU64; DropReason::ALL.len()],
}

impl DirectionCounters {
    fn snapshot(&self) -> DirectionSnapshot {
        let drop_count = |reason: DropReason| self.drops[reason.index()].load(Ordering::Relaxed);
        DirectionSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            drops: DropCounts {
                oversized: drop_count(DropReason::Oversized),
                corrupt: drop_count(DropReason::Corrupt),
                unsupported_protocol: drop_count(DropReason::UnsupportedProtocol),
                ring_full: drop_count(DropReason::RingFull),
                alloc_failure: drop_count(DropReason::AllocFailure),
            },
        }
    }
}

/// Live counters for one endpoint, both directions.
#[derive(Debug, Default)]
pub struct EndpointStats {
    inbound: DirectionCounters,
    outbound: DirectionCounters,
}

impl EndpointStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, dir: Direction) -> &DirectionCounters {
        match dir {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    /// Count one packet of `bytes` moved successfully.
    pub fn record_delivered(&self, dir: Direction, bytes: usize) {
        let counters = self.counters(dir);
        counters.packets.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one dropped packet.
    pub fn record_drop(&self, dir: Direction, reason: DropReason) {
        self.counters(dir).drops[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inbound: self.inbound.snapshot(),
            outbound: self.outbound.snapshot(),
        }
    }
}

/// Drop counters by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DropCounts {
    pub oversized: u64,
    pub corrupt: u64,
    pub unsupported_protocol: u64,
    pub ring_full: u64,
    pub alloc_failure: u64,
}

impl DropCounts {
    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::Oversized => self.oversized,
            DropReason::Corrupt => self.corrupt,
            DropReason::UnsupportedProtocol => self.unsupported_protocol,
            DropReason::RingFull => self.ring_full,
            DropReason::AllocFailure => self.alloc_failure,
        }
    }

    pub fn total(&self) -> u64 {
        DropReason::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionSnapshot {
    pub packets: u64,
    pub bytes: u64,
    pub drops: DropCounts,
}

/// Point-in-time copy of an endpoint's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub inbound: DirectionSnapshot,
    pub outbound: DirectionSnapshot,
}

impl StatsSnapshot {
    pub fn direction(&self, dir: Direction) -> &DirectionSnapshot {
        match dir {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

/// One endpoint as reported by the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointReport {
    pub state: EndpointState,
    pub capacity: usize,
    pub region_size: usize,
    pub stats: StatsSnapshot,
}

/// Device-wide report, keyed by interface name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStats {
    pub endpoints: BTreeMap<String, EndpointReport>,
    pub blocks_in_use: usize,
    pub block_limit: usize,
}
