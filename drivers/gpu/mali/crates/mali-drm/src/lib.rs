//! # Mali DRM Driver Shell
//!
//! Connects userspace device-control requests and client file lifecycles to
//! the [`mali_mem::MemoryManager`].
//!
//! ## Requests
//!
//! | Request     | Payload   | Privileges              |
//! |-------------|-----------|-------------------------|
//! | `FB_INIT`   | `MaliFb`  | AUTH, MASTER, ROOT_ONLY |
//! | `FB_ALLOC`  | `MaliMem` | AUTH                    |
//! | `FB_FREE`   | `MaliMem` | AUTH                    |
//! | `MEM_INIT`  | `MaliMem` | AUTH, MASTER, ROOT_ONLY |
//! | `MEM_ALLOC` | `MaliMem` | AUTH                    |
//! | `MEM_FREE`  | `MaliMem` | AUTH                    |

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

pub mod driver;
pub mod file;
pub mod ioctl;
pub mod uapi;

// Re-exports
pub use driver::{Driver, DriverConfig};
pub use file::DrmFile;
pub use ioctl::{AccessFlags, IoctlDesc, Request, IOCTLS};
pub use uapi::{nr, MaliFb, MaliMem};

pub use mali_core::{Error, Result};
