//! # Userspace ABI
//!
//! Payload layouts of the Mali device-control requests, as userspace lays
//! them out on a 64-bit target.

use core::mem::size_of;

use bytemuck::{Pod, Zeroable};
use mali_core::{Error, Result};

// =============================================================================
// REQUEST NUMBERS
// =============================================================================

/// Device-control request numbers, relative to the driver command base
pub mod nr {
    /// Allocate from the video pool
    pub const FB_ALLOC: u32 = 0x04;
    /// Free a video allocation
    pub const FB_FREE: u32 = 0x05;
    /// Initialize the general pool
    pub const MEM_INIT: u32 = 0x13;
    /// Allocate from the general pool
    pub const MEM_ALLOC: u32 = 0x14;
    /// Free a general allocation
    pub const MEM_FREE: u32 = 0x15;
    /// Initialize the video pool
    pub const FB_INIT: u32 = 0x16;
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Framebuffer init payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MaliFb {
    /// Device offset of the video pool
    pub offset: u64,
    /// Size of the video pool in bytes
    pub size: u64,
}

/// Memory request payload
///
/// Used by the general-pool init and by every alloc and free. `free`
/// carries the allocation handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MaliMem {
    /// Client context, unused by the driver
    pub context: i32,
    /// Keeps the 64-bit fields naturally aligned
    pub pad: u32,
    /// Pool offset (init) or allocation offset (alloc response)
    pub offset: u64,
    /// Requested size in, rounded size out
    pub size: u64,
    /// Allocation handle
    pub free: u64,
}

static_assertions::const_assert_eq!(size_of::<MaliFb>(), 16);
static_assertions::const_assert_eq!(size_of::<MaliMem>(), 32);

impl MaliMem {
    /// Request payload asking for `size` bytes
    pub const fn for_alloc(size: u64) -> Self {
        Self {
            context: 0,
            pad: 0,
            offset: 0,
            size,
            free: 0,
        }
    }

    /// Request payload naming a handle to free
    pub const fn for_free(handle: u64) -> Self {
        Self {
            context: 0,
            pad: 0,
            offset: 0,
            size: 0,
            free: handle,
        }
    }

    /// Request payload describing a pool to initialize
    pub const fn for_init(offset: u64, size: u64) -> Self {
        Self {
            context: 0,
            pad: 0,
            offset,
            size,
            free: 0,
        }
    }

    /// Clear the response fields of a failed allocation
    pub fn clear_response(&mut self) {
        self.offset = 0;
        self.size = 0;
        self.free = 0;
    }
}

// =============================================================================
// PAYLOAD CODEC
// =============================================================================

/// Read a payload out of a request buffer of exactly its size
pub fn decode<T: Pod>(payload: &[u8]) -> Result<T> {
    if payload.len() != size_of::<T>() {
        log::debug!(
            "payload of {} bytes, expected {}",
            payload.len(),
            size_of::<T>()
        );
        return Err(Error::InvalidParameter);
    }
    Ok(bytemuck::pod_read_unaligned(payload))
}

/// Write a payload back into its request buffer
pub fn encode<T: Pod>(value: &T, payload: &mut [u8]) -> Result<()> {
    let bytes = bytemuck::bytes_of(value);
    if payload.len() != bytes.len() {
        return Err(Error::InvalidParameter);
    }
    payload.copy_from_slice(bytes);
    Ok(())
}
