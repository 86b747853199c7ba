// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Region layout computed once from the ring capacity.
//!
//! ```text
//! block 0                                            last block
//! | outbound slots ... | inbound slots ...   | ... | ... | out hdr | in hdr |
//! ^ offset 0           ^ block boundary                 ^ tail of the region
//! ```
//!
//! Both sides derive every address from this value; nothing else does
//! pointer arithmetic over the region.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::shm::slot::SLOT_SIZE;
use crate::types::{Direction, RingCapacity};

/// Size of one independently allocated block.
pub const BLOCK_SIZE: usize = 4096;

/// Alignment of the whole region (one page).
pub const REGION_ALIGN: usize = 4096;

/// Size reserved for each ring header.
pub const RING_HEADER_SIZE: usize = 64;

/// Slots that fit in one block. A slot never straddles two blocks.
pub const SLOTS_PER_BLOCK: usize = BLOCK_SIZE / SLOT_SIZE;

const _: () = assert!(BLOCK_SIZE % SLOT_SIZE == 0);
const _: () = assert!(BLOCK_SIZE % REGION_ALIGN == 0);

/// Align value up to the given power-of-two alignment.
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Placement of both rings inside one endpoint's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingLayout {
    capacity: usize,
    region_size: usize,
    inbound_slots: usize,
}

impl RingLayout {
    /// Compute the layout for `capacity` slots per direction.
    pub fn new(capacity: RingCapacity) -> Self {
        let capacity = capacity.get();
        let layout = Self {
            capacity,
            region_size: Self::region_size_for(capacity),
            inbound_slots: align_up(capacity * SLOT_SIZE, BLOCK_SIZE),
        };

        debug_assert!(
            layout.inbound_slots + capacity * SLOT_SIZE
                <= layout.ring_header_offset(Direction::Outbound)
        );
        layout
    }

    /// Region size for `capacity`: both headers plus both slot arrays,
    /// rounded up to a whole page.
    pub const fn region_size_for(capacity: usize) -> usize {
        align_up(
            2 * RING_HEADER_SIZE + 2 * capacity * SLOT_SIZE,
            REGION_ALIGN,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    pub fn block_count(&self) -> usize {
        self.region_size / BLOCK_SIZE
    }

    /// Offset of the ring header for `dir`.
    pub fn ring_header_offset(&self, dir: Direction) -> usize {
        match dir {
            Direction::Outbound => self.region_size - 2 * RING_HEADER_SIZE,
            Direction::Inbound => self.region_size - RING_HEADER_SIZE,
        }
    }

    /// Offset of the first slot of the ring for `dir`. Always a block boundary.
    pub fn slots_offset(&self, dir: Direction) -> usize {
        match dir {
            Direction::Outbound => 0,
            Direction::Inbound => self.inbound_slots,
        }
    }

    /// Offset of slot `index` of the ring for `dir`.
    pub fn slot_offset(&self, dir: Direction, index: usize) -> usize {
        debug_assert!(index < self.capacity);
        self.slots_offset(dir) + index * SLOT_SIZE
    }

    /// Block holding the header for `dir`.
    pub fn header_block(&self, dir: Direction) -> usize {
        self.ring_header_offset(dir) / BLOCK_SIZE
    }

    /// Blocks backing the slot array for `dir`.
    pub fn slot_blocks(&self, dir: Direction) -> RangeInclusive<usize> {
        let first = self.slots_offset(dir) / BLOCK_SIZE;
        let last = (self.slots_offset(dir) + self.capacity * SLOT_SIZE - 1) / BLOCK_SIZE;
        first..=last
    }

    /// Split a region offset into (block index, offset within block).
    pub fn block_position(offset: usize) -> (usize, usize) {
        (offset / BLOCK_SIZE, offset % BLOCK_SIZE)
    }
}
