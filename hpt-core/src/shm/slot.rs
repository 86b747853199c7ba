// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-size slot framing.
//!
//! Every ring slot is `SLOT_SIZE` bytes: a native-endian `u16` length
//! followed by up to `SLOT_USABLE_SIZE` payload bytes. Packets larger than a
//! slot are rejected, never fragmented.

use std::ptr::NonNull;

use crate::error::RingError;

/// Size of one slot in bytes.
pub const SLOT_SIZE: usize = 2048;

/// Bytes taken by the length prefix.
pub const SLOT_HEADER_SIZE: usize = std::mem::size_of::<u16>();

/// Largest payload a slot can carry.
pub const SLOT_USABLE_SIZE: usize = SLOT_SIZE - SLOT_HEADER_SIZE;

/// Validator for slot payloads and length prefixes.
pub struct SlotValidator;

impl SlotValidator {
    /// Validate a payload before writing it into a slot.
    pub fn validate_for_write(payload: &[u8]) -> Result<(), RingError> {
        if payload.len() > SLOT_USABLE_SIZE {
            return Err(RingError::OversizedPayload {
                size: payload.len(),
                max: SLOT_USABLE_SIZE,
            });
        }
        Ok(())
    }

    /// Validate a length prefix read back from a slot.
    ///
    /// Zero and anything above `SLOT_USABLE_SIZE` mark an uninitialized or
    /// corrupt slot that must not be delivered.
    pub fn validate_length(length: u16) -> Result<usize, RingError> {
        let len = length as usize;
        if len == 0 || len > SLOT_USABLE_SIZE {
            return Err(RingError::Corrupt { length });
        }
        Ok(len)
    }
}

/// Write a framed payload into the slot at `slot`.
///
/// # Safety
/// `slot` must point at `SLOT_SIZE` writable bytes, aligned for `u16`, that
/// the caller owns as the ring's producer. `payload` must already be
/// validated.
pub(crate) unsafe fn write_slot(slot: NonNull<u8>, payload: &[u8]) {
    debug_assert!(payload.len() <= SLOT_USABLE_SIZE);
    let base = slot.as_ptr();
    std::ptr::copy_nonoverlapping(payload.as_ptr(), base.add(SLOT_HEADER_SIZE), payload.len());
    std::ptr::write_volatile(base as *mut u16, payload.len() as u16);
}

/// Read the length prefix of the slot at `slot`.
///
/// # Safety
/// `slot` must point at a readable, `u16`-aligned slot.
pub(crate) unsafe fn read_length(slot: NonNull<u8>) -> u16 {
    std::ptr::read_volatile(slot.as_ptr() as *const u16)
}

/// Borrow `len` payload bytes of the slot at `slot`.
///
/// # Safety
/// `slot` must point at a readable slot, `len <= SLOT_USABLE_SIZE`, and the
/// producer must not write the slot for the lifetime `'a`.
pub(crate) unsafe fn payload<'a>(slot: NonNull<u8>, len: usize) -> &'a [u8] {
    debug_assert!(len <= SLOT_USABLE_SIZE);
    std::slice::from_raw_parts(slot.as_ptr().add(SLOT_HEADER_SIZE), len)
}
