//! Region - block-backed shared memory owned by the privileged side.
//!
//! The region is allocated block by block inside one backing file, exposed
//! to the consumer as one contiguous span, and released block by block. The
//! consumer only ever gets a `MappedSpan`, a non-owning view over the same
//! pages.

use std::io;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::RegionError;
use crate::shm::block::{Backing, Block, BlockAllocator};
use crate::shm::layout::{align_up, BLOCK_SIZE, REGION_ALIGN};

/// Backing memory for the two rings of one endpoint.
///
/// This struct owns every block and frees them on `release` or drop.
pub struct Region {
    /// Blocks in region order. `None` once freed.
    blocks: Vec<Option<Block>>,
    /// Size of the region in bytes (whole blocks).
    size: usize,
    /// `None` once released.
    backing: Option<Backing>,
    allocator: Arc<dyn BlockAllocator>,
}

impl Region {
    /// Allocate a region of at least `total_bytes`, rounded up to whole blocks.
    ///
    /// Every block is reserved independently. If any reservation fails the
    /// blocks obtained so far are released before the error is returned.
    pub fn allocate(
        allocator: Arc<dyn BlockAllocator>,
        total_bytes: usize,
    ) -> Result<Self, RegionError> {
        let count = align_up(total_bytes, BLOCK_SIZE) / BLOCK_SIZE;
        if count == 0 {
            return Err(RegionError::OutOfMemory {
                requested: 0,
                allocated: 0,
                reason: "Region size must be non-zero".to_string(),
            });
        }

        let size = count * BLOCK_SIZE;
        let backing = allocator
            .open_backing(size)
            .map_err(|e| RegionError::OutOfMemory {
                requested: count,
                allocated: 0,
                reason: format!("backing: {}", e),
            })?;

        let mut region = Self {
            blocks: Vec::with_capacity(count),
            size,
            backing: Some(backing),
            allocator,
        };

        for index in 0..count {
            match region.reserve_block(index) {
                Ok(block) => region.blocks.push(Some(block)),
                Err(e) => {
                    let allocated = region.blocks.len();
                    region.release();
                    return Err(RegionError::OutOfMemory {
                        requested: count,
                        allocated,
                        reason: format!("block {}: {}", index, e),
                    });
                }
            }
        }

        tracing::debug!(blocks = count, size = region.size, "Allocated region");

        Ok(region)
    }

    fn reserve_block(&self, index: usize) -> io::Result<Block> {
        let backing = self
            .backing
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "region released"))?;
        self.allocator
            .allocate_block(backing, index * BLOCK_SIZE, BLOCK_SIZE)
    }

    /// Get the size of this region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of blocks the region was allocated with.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Base address of block `index`, if it is still allocated.
    pub fn block_ptr(&self, index: usize) -> Option<NonNull<u8>> {
        self.blocks
            .get(index)
            .and_then(|b| b.as_ref())
            .map(Block::as_ptr)
    }

    /// True once every block has been freed.
    pub fn is_released(&self) -> bool {
        self.backing.is_none()
    }

    /// Map the whole region into one contiguous span for the consumer.
    ///
    /// `requested_size` must equal the region size after page alignment.
    pub fn map_into_consumer(&self, requested_size: usize) -> Result<MappedSpan, RegionError> {
        let backing = self.backing.as_ref().ok_or(RegionError::Released)?;

        if requested_size == 0
            || requested_size > self.size
            || align_up(requested_size, REGION_ALIGN) != self.size
        {
            return Err(RegionError::SizeMismatch {
                requested: requested_size,
                expected: self.size,
            });
        }

        let ptr = self
            .allocator
            .map_span(backing)
            .map_err(|e| RegionError::MapFailed {
                reason: format!("consumer span: {}", e),
            })?;

        tracing::debug!(size = self.size, blocks = self.blocks.len(), "Mapped region into consumer span");

        Ok(MappedSpan {
            ptr,
            len: self.size,
        })
    }

    /// Free every block. Safe to call repeatedly and on partially built regions.
    pub fn release(&mut self) {
        let Some(backing) = self.backing.take() else {
            return;
        };

        let mut freed = 0usize;
        for slot in self.blocks.iter_mut() {
            if let Some(block) = slot.take() {
                self.allocator.free_block(&backing, block);
                freed += 1;
            }
        }

        tracing::debug!(blocks = freed, "Released region");
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        self.release();
    }
}

/// The consumer's contiguous view of a region.
///
/// Owns only the virtual mapping; the pages belong to the `Region`. The
/// mapping keeps the backing file alive, so it stays valid after the region
/// is released. Released blocks read as zero through it.
pub struct MappedSpan {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the span is a plain address range; concurrent access is governed
// by the ring protocol.
unsafe impl Send for MappedSpan {}
unsafe impl Sync for MappedSpan {}

impl MappedSpan {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of `offset` inside the span.
    pub fn at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset >= self.len {
            return None;
        }
        // SAFETY: offset is in bounds of a non-null mapping
        Some(unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) })
    }
}

impl Drop for MappedSpan {
    fn drop(&mut self) {
        // SAFETY: ptr and len describe the mapping made in map_into_consumer
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if result < 0 {
            tracing::error!(
                error = %std::io::Error::last_os_error(),
                len = self.len,
                "Failed to unmap consumer span"
            );
        }
    }
}
