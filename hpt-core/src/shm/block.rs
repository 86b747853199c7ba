// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Raw block allocation and mapping primitives.
//!
//! A region lives in one shareable backing file. The region manager reserves
//! its pages one fixed-size block at a time and later maps the whole file a
//! second time for the consumer, so each side costs a single mapping no
//! matter how many blocks the region has.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;

/// Shareable memory file a region's blocks are carved from, mapped once
/// into this process.
#[derive(Debug)]
pub struct Backing {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: Backing is a handle to process-shared memory; all access goes
// through raw pointers whose synchronization is the ring protocol's job.
unsafe impl Send for Backing {}
unsafe impl Sync for Backing {}

impl Backing {
    /// Wrap a backing file and its mapping.
    ///
    /// # Safety
    /// `ptr` must be a `len`-byte shared mapping of `fd` starting at offset 0
    /// that nothing else unmaps.
    pub unsafe fn from_raw_parts(fd: OwnedFd, ptr: NonNull<u8>, len: usize) -> Self {
        Self { fd, ptr, len }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRawFd for Backing {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        // SAFETY: ptr and len describe the mapping handed to from_raw_parts
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if result < 0 {
            tracing::error!(
                error = %io::Error::last_os_error(),
                len = self.len,
                "Failed to unmap backing"
            );
        }
    }
}

/// One reserved block inside a backing.
#[derive(Debug)]
pub struct Block {
    ptr: NonNull<u8>,
    offset: usize,
    len: usize,
}

// SAFETY: see Backing
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Describe `len` reserved bytes at `offset` of `backing`.
    ///
    /// # Safety
    /// `offset + len` must not exceed `backing.len()`.
    pub unsafe fn from_raw_parts(backing: &Backing, offset: usize, len: usize) -> Self {
        Self {
            ptr: NonNull::new_unchecked(backing.as_ptr().as_ptr().add(offset)),
            offset,
            len,
        }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Byte offset of the block inside its backing.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Memory primitives consumed by the region manager.
pub trait BlockAllocator: Send + Sync {
    /// Create a sparse backing of `size` bytes and map it into this process.
    /// No pages are reserved yet.
    fn open_backing(&self, size: usize) -> io::Result<Backing>;

    /// Reserve the zeroed block of `size` bytes at `offset`.
    fn allocate_block(&self, backing: &Backing, offset: usize, size: usize) -> io::Result<Block>;

    /// Map all of `backing` at a fresh address as one shared mapping. The
    /// caller owns the returned range and unmaps it.
    fn map_span(&self, backing: &Backing) -> io::Result<NonNull<u8>>;

    /// Return a block's pages. Must not fail; errors are logged by the
    /// implementation.
    fn free_block(&self, backing: &Backing, block: Block);
}

/// Linux implementation on top of a `memfd`.
///
/// Blocks are reserved with `fallocate` and returned by punching a hole, so
/// the file size never changes and every mapping of it stays valid. Freed
/// blocks read as zero through any remaining mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShmBlockAllocator;

fn map_shared(fd: &impl AsRawFd, len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: shared mapping of a file we hold open, kernel picks the address
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    NonNull::new(ptr as *mut u8)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
}

impl BlockAllocator for ShmBlockAllocator {
    fn open_backing(&self, size: usize) -> io::Result<Backing> {
        // SAFETY: the name is NUL-terminated
        let raw = unsafe {
            libc::memfd_create(
                b"hpt-region\0".as_ptr() as *const libc::c_char,
                libc::MFD_CLOEXEC,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: memfd_create returned a fresh descriptor we now own
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: plain syscall on an owned descriptor
        if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let ptr = map_shared(&fd, size)?;

        // SAFETY: ptr maps the whole file and is only unmapped by Backing
        Ok(unsafe { Backing::from_raw_parts(fd, ptr, size) })
    }

    fn allocate_block(&self, backing: &Backing, offset: usize, size: usize) -> io::Result<Block> {
        if offset.checked_add(size).map_or(true, |end| end > backing.len()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "block outside backing",
            ));
        }

        // SAFETY: plain syscall on a descriptor owned by the backing
        let result = unsafe {
            libc::fallocate(
                backing.as_raw_fd(),
                0,
                offset as libc::off_t,
                size as libc::off_t,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: bounds checked above
        Ok(unsafe { Block::from_raw_parts(backing, offset, size) })
    }

    fn map_span(&self, backing: &Backing) -> io::Result<NonNull<u8>> {
        map_shared(backing, backing.len())
    }

    fn free_block(&self, backing: &Backing, block: Block) {
        // SAFETY: plain syscall on a descriptor owned by the backing
        let result = unsafe {
            libc::fallocate(
                backing.as_raw_fd(),
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                block.offset() as libc::off_t,
                block.len() as libc::off_t,
            )
        };
        if result < 0 {
            tracing::error!(
                error = %io::Error::last_os_error(),
                offset = block.offset(),
                len = block.len(),
                "Failed to free block"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::layout::BLOCK_SIZE;

    #[test]
    fn test_blocks_are_zeroed() {
        let alloc = ShmBlockAllocator;
        let backing = alloc.open_backing(2 * BLOCK_SIZE).unwrap();
        let block = alloc.allocate_block(&backing, BLOCK_SIZE, BLOCK_SIZE).unwrap();
        assert_eq!(block.len(), BLOCK_SIZE);
        assert_eq!(block.offset(), BLOCK_SIZE);

        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr().as_ptr(), block.len()) };
        assert!(bytes.iter().all(|&b| b == 0));

        alloc.free_block(&backing, block);
    }

    #[test]
    fn test_block_outside_backing() {
        let alloc = ShmBlockAllocator;
        let backing = alloc.open_backing(BLOCK_SIZE).unwrap();
        let err = alloc.allocate_block(&backing, BLOCK_SIZE, BLOCK_SIZE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_freed_block_reads_zero() {
        let alloc = ShmBlockAllocator;
        let backing = alloc.open_backing(BLOCK_SIZE).unwrap();
        let block = alloc.allocate_block(&backing, 0, BLOCK_SIZE).unwrap();
        let ptr = block.as_ptr().as_ptr();

        unsafe { *ptr = 7 };
        alloc.free_block(&backing, block);
        assert_eq!(unsafe { *ptr }, 0);
    }
}
