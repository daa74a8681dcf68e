//! # Mali Memory Management
//!
//! Video and general memory pools for the Mali DRM driver.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         MemoryManager                           │
//! │                    (one lock over everything)                   │
//! │                                                                 │
//! │  ┌──────────────────┐  ┌──────────────────┐                     │
//! │  │    Video pool    │  │   General pool   │                     │
//! │  │  RangeAllocator  │  │  RangeAllocator  │                     │
//! │  └──────────────────┘  └──────────────────┘                     │
//! │           │                     │                               │
//! │  ┌────────┴─────────────────────┴─────────┐  ┌───────────────┐  │
//! │  │              HandleTable               │◄─┤  Ownership    │  │
//! │  │      (handles shared by both pools)    │  │  Registry     │  │
//! │  └────────────────────────────────────────┘  └───────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sizes and offsets inside a pool are kept in 16-byte units; the manager
//! converts to bytes at its boundary.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod handle;
pub mod manager;
pub mod owner;
pub mod range;

// Re-exports
pub use config::{MmConfig, SearchMode};
pub use handle::HandleTable;
pub use manager::{Allocation, MemBlock, MemHandle, MemoryManager, PoolInfo, PoolStats};
pub use owner::OwnershipRegistry;
pub use range::{RangeAllocator, UnitRange};
