//! # MALI Core Types
//!
//! Fundamental type definitions used across the driver.
//!
//! These types provide:
//! - Strong typing for device offsets and sizes
//! - The fixed allocation granularity (alignment units)
//! - Identifiers for pools, clients and allocation handles

use core::fmt;
use core::marker::PhantomData;

use crate::error::{Error, Result};

// =============================================================================
// ALIGNMENT
// =============================================================================

/// log2 of the allocation granularity
pub const MM_ALIGN_SHIFT: u32 = 4;

/// Mask of the bits below the allocation granularity
pub const MM_ALIGN_MASK: u64 = (1 << MM_ALIGN_SHIFT) - 1;

/// Round a byte count up to whole alignment units
///
/// Returns `None` when the rounding would overflow.
#[inline]
pub const fn units_for_bytes(bytes: u64) -> Option<u64> {
    match bytes.checked_add(MM_ALIGN_MASK) {
        Some(padded) => Some(padded >> MM_ALIGN_SHIFT),
        None => None,
    }
}

/// Number of whole alignment units contained in a byte count (rounds down)
#[inline]
pub const fn whole_units(bytes: u64) -> u64 {
    bytes >> MM_ALIGN_SHIFT
}

/// Convert alignment units back to bytes
#[inline]
pub const fn units_to_bytes(units: u64) -> u64 {
    units << MM_ALIGN_SHIFT
}

// =============================================================================
// DEVICE OFFSET
// =============================================================================

/// Absolute offset in the device's memory aperture
///
/// Offsets are handed to clients verbatim; they are not CPU pointers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct DeviceOffset(u64);

impl DeviceOffset {
    /// Create a new device offset
    #[inline]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Offset zero
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Offset by a number of alignment units
    #[inline]
    pub const fn add_units(self, units: u64) -> Self {
        Self(self.0.wrapping_add(units_to_bytes(units)))
    }
}

impl fmt::Debug for DeviceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceOffset(0x{:x})", self.0)
    }
}

impl fmt::Display for DeviceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// =============================================================================
// SIZE TYPES
// =============================================================================

/// Size in bytes
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Create from bytes
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from a count of alignment units
    #[inline]
    pub const fn from_units(units: u64) -> Self {
        Self(units_to_bytes(units))
    }

    /// Get as bytes
    #[inline]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1024 * 1024 * 1024 {
            write!(f, "{} GiB", self.0 / (1024 * 1024 * 1024))
        } else if self.0 >= 1024 * 1024 {
            write!(f, "{} MiB", self.0 / (1024 * 1024))
        } else if self.0 >= 1024 {
            write!(f, "{} KiB", self.0 / 1024)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// POOL SELECTOR
// =============================================================================

/// One of the two memory pools a device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PoolId {
    /// Framebuffer-backed video memory
    Video = 0,
    /// General device memory
    General = 1,
}

impl PoolId {
    /// Both pools, in selector order
    pub const ALL: [PoolId; 2] = [PoolId::Video, PoolId::General];

    /// Decode a raw pool selector
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Video),
            1 => Ok(Self::General),
            _ => {
                log::error!("Unknown memory type allocation: {}", raw);
                Err(Error::InvalidPool)
            }
        }
    }

    /// Raw selector value
    #[inline]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Index into per-pool tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::General => "general",
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// CLIENT ID
// =============================================================================

/// Identifier of a connected client session
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a client ID
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

// =============================================================================
// HANDLE TYPES
// =============================================================================

/// Largest value a handle may take (handles travel as positive C ints)
pub const MAX_HANDLE: u32 = i32::MAX as u32;

/// Opaque integer handle to a driver-owned record
///
/// Handles are always positive. The type parameter keeps handles of
/// different record types apart at compile time.
#[repr(transparent)]
pub struct Handle<T> {
    id: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a handle from a positive ID
    ///
    /// Returns `None` for zero or IDs beyond [`MAX_HANDLE`].
    #[inline]
    pub const fn new(id: u32) -> Option<Self> {
        if id == 0 || id > MAX_HANDLE {
            None
        } else {
            Some(Self {
                id,
                _marker: PhantomData,
            })
        }
    }

    /// Decode a handle received from userspace
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        u32::try_from(raw).ok().and_then(Self::new)
    }

    /// Get the raw ID
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }

    /// Slot index backing this handle
    #[inline]
    pub const fn index(self) -> usize {
        (self.id - 1) as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> core::hash::Hash for Handle<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_rounding() {
        for bytes in 1..=16 {
            assert_eq!(units_for_bytes(bytes), Some(1));
        }
        assert_eq!(units_for_bytes(17), Some(2));
        assert_eq!(units_for_bytes(0), Some(0));
        assert_eq!(units_for_bytes(u64::MAX), None);
        assert_eq!(units_to_bytes(7), 112);
    }

    #[test]
    fn test_whole_units_rounds_down() {
        assert_eq!(whole_units(1024), 64);
        assert_eq!(whole_units(1039), 64);
        assert_eq!(ByteSize::from_units(whole_units(100)).as_bytes(), 96);
    }

    #[test]
    fn test_device_offset() {
        let base = DeviceOffset::new(0x1000);
        assert_eq!(base.add_units(2).raw(), 0x1020);
        assert_eq!(DeviceOffset::zero().add_units(1).raw(), 16);
    }

    #[test]
    fn test_pool_selector() {
        assert_eq!(PoolId::from_raw(0), Ok(PoolId::Video));
        assert_eq!(PoolId::from_raw(1), Ok(PoolId::General));
        assert_eq!(PoolId::from_raw(2), Err(Error::InvalidPool));
        assert_eq!(PoolId::General.index(), 1);
    }

    #[test]
    fn test_handle_range() {
        struct Marker;

        assert!(Handle::<Marker>::new(0).is_none());
        assert!(Handle::<Marker>::new(MAX_HANDLE + 1).is_none());
        assert!(Handle::<Marker>::from_raw(u64::from(u32::MAX) + 1).is_none());

        let h = Handle::<Marker>::from_raw(3).unwrap();
        assert_eq!(h.id(), 3);
        assert_eq!(h.index(), 2);
        let copy = h;
        assert_eq!(h, copy);
    }
}
