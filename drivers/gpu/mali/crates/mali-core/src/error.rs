//! # MALI Error Handling
//!
//! One error type for the memory manager and the driver shell around it.
//!
//! Every failure is a plain return value: nothing in the driver retries on
//! its own, and no variant is fatal to the device. The DRM core only sees a
//! negative errno, which [`Error::errno`] produces.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MALI Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERRNO VALUES
// =============================================================================

/// Linux errno values returned to the DRM core
pub mod errno {
    /// No such entry
    pub const ENOENT: i32 = 2;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Permission denied
    pub const EACCES: i32 = 13;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// No space left on device
    pub const ENOSPC: i32 = 28;
}

// =============================================================================
// ERROR ENUM
// =============================================================================

/// MALI unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Memory Manager Errors
    // =========================================================================
    /// Unrecognized pool selector
    InvalidPool,
    /// Allocation attempted before the pool was initialized
    PoolNotInitialized,
    /// No free interval large enough for the request
    OutOfSpace,
    /// Handle table storage could not grow
    OutOfMemory,
    /// Unknown or already freed handle
    InvalidHandle,

    // =========================================================================
    // Component Errors
    // =========================================================================
    /// Lookup of an entry that is not present
    NotFound,
    /// Malformed or out-of-range parameter
    InvalidParameter,

    // =========================================================================
    // Driver Shell Errors
    // =========================================================================
    /// Client lacks a privilege the request requires
    AccessDenied,
    /// Unknown device-control request number
    InvalidRequest,
}

impl Error {
    /// Negative errno handed back to the DRM core
    pub const fn errno(self) -> i32 {
        let code = match self {
            Self::InvalidPool
            | Self::PoolNotInitialized
            | Self::InvalidHandle
            | Self::InvalidParameter
            | Self::InvalidRequest => errno::EINVAL,
            Self::OutOfSpace => errno::ENOSPC,
            Self::OutOfMemory => errno::ENOMEM,
            Self::NotFound => errno::ENOENT,
            Self::AccessDenied => errno::EACCES,
        };
        -code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Memory manager
            Self::InvalidPool => write!(f, "unknown memory pool"),
            Self::PoolNotInitialized => write!(f, "memory pool not initialized"),
            Self::OutOfSpace => write!(f, "no free range large enough"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidHandle => write!(f, "invalid allocation handle"),

            // Component
            Self::NotFound => write!(f, "entry not found"),
            Self::InvalidParameter => write!(f, "invalid parameter"),

            // Driver shell
            Self::AccessDenied => write!(f, "access denied"),
            Self::InvalidRequest => write!(f, "unknown device-control request"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::ToString;

    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::OutOfSpace.errno(), -28);
        assert_eq!(Error::OutOfMemory.errno(), -12);
        assert_eq!(Error::InvalidHandle.errno(), -22);
        assert_eq!(Error::PoolNotInitialized.errno(), -22);
        assert_eq!(Error::AccessDenied.errno(), -13);
        assert_eq!(Error::NotFound.errno(), -2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::InvalidPool.to_string(), "unknown memory pool");
        assert_eq!(Error::OutOfSpace.to_string(), "no free range large enough");
    }
}
