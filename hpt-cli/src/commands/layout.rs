// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `hpt layout` command - Show where rings and headers land in a region.

use hpt_core::shm::{RingLayout, SLOT_SIZE};
use hpt_core::{Direction, RingCapacity, MAX_ITEMS};

pub fn execute(capacity: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let layout = RingLayout::new(RingCapacity::new(capacity, MAX_ITEMS)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }

    println!("Capacity:    {} slots per direction", layout.capacity());
    println!("Region size: {} bytes", layout.region_size());
    println!("Blocks:      {}", layout.block_count());
    println!();

    for dir in [Direction::Outbound, Direction::Inbound] {
        let slots = layout.slots_offset(dir);
        let blocks = layout.slot_blocks(dir);
        println!("{}:", dir);
        println!(
            "  slots:  0x{:08x}..0x{:08x} (blocks {}..={})",
            slots,
            slots + layout.capacity() * SLOT_SIZE,
            blocks.start(),
            blocks.end()
        );
        println!(
            "  header: 0x{:08x} (block {})",
            layout.ring_header_offset(dir),
            layout.header_block(dir)
        );
    }

    Ok(())
}
