// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-free SPSC ring of fixed-size slots.
//!
//! Uses two monotonic counters, `write` and `read`, for wait-free
//! single-producer single-consumer communication across the privilege
//! boundary. The producer publishes a slot with a release store of `write`;
//! the consumer hands it back with a release store of `read`.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{RegionError, RingError};
use crate::shm::layout::{RingLayout, BLOCK_SIZE, RING_HEADER_SIZE, SLOTS_PER_BLOCK};
use crate::shm::region::{MappedSpan, Region};
use crate::shm::slot::{self, SlotValidator, SLOT_SIZE};
use crate::types::Direction;

/// Ring header stored in shared memory.
#[repr(C, align(64))]
pub struct RingHeader {
    /// Producer counter.
    write: AtomicU64,
    /// Consumer counter.
    read: AtomicU64,
    /// Slots in the ring.
    capacity: AtomicU64,
    /// Block holding this header.
    block_ind: AtomicU32,
    /// First block of the slot array.
    min_block_ind: AtomicU32,
    /// Last block of the slot array.
    max_block_ind: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<RingHeader>() == RING_HEADER_SIZE);

/// Placement information published in a ring header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub capacity: u64,
    pub block_ind: u32,
    pub min_block_ind: u32,
    pub max_block_ind: u32,
}

/// One side's handle on a ring.
///
/// A ring has exactly one producer and one consumer, each holding its own
/// `Ring`. Handles are `Send` but not `Sync`, and every mutation takes
/// `&mut self`, so each role is confined to one thread at a time.
pub struct Ring {
    header: NonNull<RingHeader>,
    /// Blocks backing the slot array, in order.
    blocks: Box<[NonNull<u8>]>,
    capacity: u64,
}

// SAFETY: the ring only touches shared memory through atomics and slots
// owned by its role; moving the handle to another thread is fine.
unsafe impl Send for Ring {}

impl Ring {
    /// Privileged-side view, addressed block by block.
    ///
    /// # Safety
    /// The ring must not be used after `region` is released or dropped.
    pub unsafe fn from_region(
        region: &Region,
        layout: &RingLayout,
        dir: Direction,
    ) -> Result<Self, RegionError> {
        Self::resolve(layout, dir, |index| region.block_ptr(index))
    }

    /// Consumer-side view over a contiguous span.
    ///
    /// # Safety
    /// The ring must not be used after `span` is dropped.
    pub unsafe fn from_span(
        span: &MappedSpan,
        layout: &RingLayout,
        dir: Direction,
    ) -> Result<Self, RegionError> {
        if span.len() != layout.region_size() {
            return Err(RegionError::SizeMismatch {
                requested: span.len(),
                expected: layout.region_size(),
            });
        }
        Self::resolve(layout, dir, |index| span.at(index * BLOCK_SIZE))
    }

    /// # Safety
    /// Every pointer returned by `block` must address `BLOCK_SIZE` bytes that
    /// stay valid for the lifetime of the returned ring.
    unsafe fn resolve(
        layout: &RingLayout,
        dir: Direction,
        block: impl Fn(usize) -> Option<NonNull<u8>>,
    ) -> Result<Self, RegionError> {
        let (header_block, header_offset) =
            RingLayout::block_position(layout.ring_header_offset(dir));
        let header = block(header_block)
            .ok_or(RegionError::Released)?
            .as_ptr()
            .add(header_offset) as *mut RingHeader;

        let blocks = layout
            .slot_blocks(dir)
            .map(|index| block(index).ok_or(RegionError::Released))
            .collect::<Result<Vec<_>, _>>()?
            .into_boxed_slice();

        Ok(Self {
            header: NonNull::new_unchecked(header),
            blocks,
            capacity: layout.capacity() as u64,
        })
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: header points into live shared memory for our lifetime
        unsafe { self.header.as_ref() }
    }

    /// Address of the slot for `counter`.
    fn slot(&self, counter: u64) -> NonNull<u8> {
        let index = (counter % self.capacity) as usize;
        let block = self.blocks[index / SLOTS_PER_BLOCK];
        // SAFETY: a slot never straddles a block, so the offset stays in bounds
        unsafe {
            NonNull::new_unchecked(block.as_ptr().add((index % SLOTS_PER_BLOCK) * SLOT_SIZE))
        }
    }

    /// Reset the header and publish placement info. Setup only, before the
    /// consumer maps the region.
    pub fn initialize(&mut self, layout: &RingLayout, dir: Direction) {
        let slot_blocks = layout.slot_blocks(dir);
        let header = self.header();
        header.capacity.store(self.capacity, Ordering::Relaxed);
        header
            .block_ind
            .store(layout.header_block(dir) as u32, Ordering::Relaxed);
        header
            .min_block_ind
            .store(*slot_blocks.start() as u32, Ordering::Relaxed);
        header
            .max_block_ind
            .store(*slot_blocks.end() as u32, Ordering::Relaxed);
        header.read.store(0, Ordering::Release);
        header.write.store(0, Ordering::Release);
    }

    /// Placement info as published in the header.
    pub fn header_info(&self) -> HeaderInfo {
        let header = self.header();
        HeaderInfo {
            capacity: header.capacity.load(Ordering::Acquire),
            block_ind: header.block_ind.load(Ordering::Acquire),
            min_block_ind: header.min_block_ind.load(Ordering::Acquire),
            max_block_ind: header.max_block_ind.load(Ordering::Acquire),
        }
    }

    /// Get the number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Number of occupied slots.
    ///
    /// Clamped to capacity so a misbehaving peer cannot walk the reader past
    /// the slot array.
    pub fn occupancy(&self) -> usize {
        let write = self.header().write.load(Ordering::Acquire);
        let read = self.header().read.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.capacity) as usize
    }

    /// Number of free slots.
    pub fn free_space(&self) -> usize {
        self.capacity() - self.occupancy()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }

    /// Write one payload into the next free slot (producer only).
    ///
    /// The slot contents are written before the `write` counter is
    /// published, so the consumer never observes a partial slot.
    pub fn push(&mut self, payload: &[u8]) -> Result<(), RingError> {
        if self.free_space() == 0 {
            return Err(RingError::Full);
        }
        SlotValidator::validate_for_write(payload)?;

        let write = self.header().write.load(Ordering::Relaxed);
        // SAFETY: the slot is free (checked above) and only the producer writes it
        unsafe { slot::write_slot(self.slot(write), payload) };

        self.header()
            .write
            .store(write.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Borrow the payload of the oldest slot (consumer only).
    ///
    /// Returns `Corrupt` without advancing for a slot whose length is zero
    /// or larger than the usable size.
    pub fn peek(&self) -> Result<&[u8], RingError> {
        if self.occupancy() == 0 {
            return Err(RingError::Empty);
        }

        let read = self.header().read.load(Ordering::Relaxed);
        let slot = self.slot(read);
        // SAFETY: occupancy > 0, so the producer published this slot and
        // will not touch it until we pop
        let length = unsafe { slot::read_length(slot) };
        let len = SlotValidator::validate_length(length)?;

        // SAFETY: as above, and the borrow ends before pop(&mut self)
        Ok(unsafe { slot::payload(slot, len) })
    }

    /// Release the oldest slot back to the producer (consumer only).
    pub fn pop(&mut self) -> Result<(), RingError> {
        if self.occupancy() == 0 {
            return Err(RingError::Empty);
        }

        let read = self.header().read.load(Ordering::Relaxed);
        self.header()
            .read
            .store(read.wrapping_add(1), Ordering::Release);

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::shm::block::ShmBlockAllocator;
    use crate::shm::slot::SLOT_USABLE_SIZE;
    use crate::types::{RingCapacity, MAX_ITEMS};

    /// A region with an initialised inbound ring and two handles on it.
    pub(crate) fn ring_pair(capacity: usize) -> (Region, Ring, Ring) {
        let layout = RingLayout::new(RingCapacity::new(capacity, MAX_ITEMS).unwrap());
        let region = Region::allocate(Arc::new(ShmBlockAllocator), layout.region_size()).unwrap();

        // SAFETY: every test keeps the region alive alongside its rings
        let mut producer = unsafe { Ring::from_region(&region, &layout, Direction::Inbound) }.unwrap();
        producer.initialize(&layout, Direction::Inbound);
        let consumer = unsafe { Ring::from_region(&region, &layout, Direction::Inbound) }.unwrap();

        (region, producer, consumer)
    }

    fn packet(seq: u32, len: usize) -> Vec<u8> {
        let mut data = vec![(seq % 251) as u8; len.max(4)];
        data[..4].copy_from_slice(&seq.to_le_bytes());
        data
    }

    #[test]
    fn test_capacity_invariant() {
        let (_region, mut producer, mut consumer) = ring_pair(4);

        for round in 0..3 {
            for i in 0..4 {
                assert!(producer.push(&packet(i, 16)).is_ok(), "round {}", round);
                assert!(producer.occupancy() <= 4);
            }
            assert_eq!(producer.push(&packet(99, 16)), Err(RingError::Full));
            assert_eq!(consumer.occupancy(), 4);

            while consumer.pop().is_ok() {
                assert!(consumer.occupancy() <= 4);
            }
            assert_eq!(consumer.occupancy(), 0);
        }
    }

    #[test]
    fn test_fifo_order() {
        let (_region, mut producer, mut consumer) = ring_pair(8);

        let sent: Vec<Vec<u8>> = (0..8).map(|i| packet(i, 10 + i as usize * 3)).collect();
        for p in &sent {
            producer.push(p).unwrap();
        }

        for expected in &sent {
            assert_eq!(consumer.peek().unwrap(), expected.as_slice());
            consumer.pop().unwrap();
        }
        assert_eq!(consumer.peek(), Err(RingError::Empty));
    }

    #[test]
    fn test_oversize_rejected() {
        let (_region, mut producer, _consumer) = ring_pair(2);

        producer.push(&[0x45; 8]).unwrap();
        let before = producer.occupancy();

        assert_eq!(
            producer.push(&vec![0u8; SLOT_USABLE_SIZE + 1]),
            Err(RingError::OversizedPayload {
                size: SLOT_USABLE_SIZE + 1,
                max: SLOT_USABLE_SIZE
            })
        );
        assert_eq!(producer.occupancy(), before);
        assert!(producer.push(&vec![0u8; SLOT_USABLE_SIZE]).is_ok());
    }

    #[test]
    fn test_wraparound() {
        let capacity = 5;
        let (_region, mut producer, mut consumer) = ring_pair(capacity);

        for i in 0..(3 * capacity as u32) {
            let p = packet(i, 1 + (i as usize * 97) % SLOT_USABLE_SIZE);
            producer.push(&p).unwrap();
            assert_eq!(consumer.peek().unwrap(), p.as_slice());
            consumer.pop().unwrap();
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_full_ring() {
        let (_region, mut producer, mut consumer) = ring_pair(2);

        producer.push(b"\x45one").unwrap();
        producer.push(b"\x45two").unwrap();
        assert_eq!(producer.push(b"\x45three"), Err(RingError::Full));
        assert_eq!(producer.occupancy(), 2);
        assert_eq!(consumer.occupancy(), 2);

        consumer.pop().unwrap();
        assert_eq!(producer.occupancy(), 1);
        assert!(producer.push(b"\x45three").is_ok());
    }

    #[test]
    fn test_zero_length_slot_is_corrupt() {
        let (_region, mut producer, mut consumer) = ring_pair(4);

        producer.push(&[]).unwrap();
        producer.push(b"\x60ok").unwrap();

        assert_eq!(consumer.peek(), Err(RingError::Corrupt { length: 0 }));
        // peek does not advance
        assert_eq!(consumer.occupancy(), 2);
        consumer.pop().unwrap();
        assert_eq!(consumer.peek().unwrap(), b"\x60ok");
    }

    #[test]
    fn test_pop_empty_is_noop() {
        let (_region, _producer, mut consumer) = ring_pair(2);
        assert_eq!(consumer.pop(), Err(RingError::Empty));
        assert_eq!(consumer.occupancy(), 0);
    }

    #[test]
    fn test_header_info() {
        let (_region, producer, consumer) = ring_pair(3);
        let info = consumer.header_info();
        assert_eq!(info, producer.header_info());
        assert_eq!(info.capacity, 3);
        assert_eq!((info.min_block_ind, info.max_block_ind), (2, 3));
        assert_eq!(info.block_ind, 3);
    }

    #[test]
    fn test_spsc_threads() {
        const COUNT: u32 = 20_000;
        let (_region, mut producer, mut consumer) = ring_pair(16);

        let writer = std::thread::spawn(move || {
            let mut seq = 0;
            while seq < COUNT {
                match producer.push(&packet(seq, 8 + (seq as usize % 64))) {
                    Ok(()) => seq += 1,
                    Err(RingError::Full) => std::hint::spin_loop(),
                    Err(e) => panic!("unexpected push error: {}", e),
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            let payload = match consumer.peek() {
                Ok(payload) => payload.to_vec(),
                Err(RingError::Empty) => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(e) => panic!("unexpected peek error: {}", e),
            };
            assert_eq!(payload, packet(expected, 8 + (expected as usize % 64)));
            consumer.pop().unwrap();
            expected += 1;
        }

        writer.join().unwrap();
    }
}
