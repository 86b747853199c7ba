// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory transport.
//!
//! Block-backed regions shared between the privileged side and the consumer,
//! laid out as two lock-free SPSC rings of fixed-size slots.

mod block;
mod layout;
mod region;
mod ring;
mod slot;

pub use block::{Backing, Block, BlockAllocator, ShmBlockAllocator};
pub use layout::{align_up, RingLayout, BLOCK_SIZE, REGION_ALIGN, RING_HEADER_SIZE, SLOTS_PER_BLOCK};
pub use region::{MappedSpan, Region};
pub use ring::{HeaderInfo, Ring, RingHeader};
pub use slot::{SlotValidator, SLOT_HEADER_SIZE, SLOT_SIZE, SLOT_USABLE_SIZE};

#[cfg(test)]
pub(crate) use ring::tests::ring_pair;
