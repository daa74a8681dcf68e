//! # MALI Core
//!
//! Error handling and fundamental types shared by the Mali DRM driver crates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        mali-core                            │
//! │  ┌─────────────────────────┐  ┌──────────────────────────┐  │
//! │  │         Types           │  │          Error           │  │
//! │  │ (ByteSize, DeviceOffset,│  │  (errno mapping, Result) │  │
//! │  │  PoolId, ClientId,      │  │                          │  │
//! │  │  Handle)                │  │                          │  │
//! │  └─────────────────────────┘  └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use types::*;
