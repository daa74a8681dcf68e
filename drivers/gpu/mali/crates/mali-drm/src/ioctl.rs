//! # Device-Control Dispatch
//!
//! Fixed table of the six Mali requests, indexed by request number, with
//! the privileges each one requires.
//!
//! ```text
//!   ioctl(file, nr, payload)
//!        │
//!        ├─ lookup(nr)           ── none ──► InvalidRequest
//!        ├─ file.permits(flags)  ── no ────► AccessDenied
//!        ├─ decode payload       ── size ──► InvalidParameter
//!        ├─ handler
//!        └─ encode payload (also on failure, so cleared fields reach the caller)
//! ```

use mali_core::{Error, PoolId, Result};

use crate::driver::Driver;
use crate::file::DrmFile;
use crate::uapi::{self, nr, MaliFb, MaliMem};

// =============================================================================
// ACCESS FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Privileges a request can require
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        /// Authenticated client
        const AUTH = 1 << 0;
        /// Current display master
        const MASTER = 1 << 1;
        /// Opened with administrative privileges
        const ROOT_ONLY = 1 << 2;
    }
}

impl AccessFlags {
    /// Privileges required to size a pool
    pub const ADMIN: Self = Self::AUTH.union(Self::MASTER).union(Self::ROOT_ONLY);
}

// =============================================================================
// DESCRIPTOR TABLE
// =============================================================================

/// Handler operating on a raw request payload
pub type IoctlHandler = fn(&Driver, &DrmFile, &mut [u8]) -> Result<()>;

/// One entry of the dispatch table
#[derive(Debug, Clone, Copy)]
pub struct IoctlDesc {
    /// Request number
    pub nr: u32,
    /// Privileges the caller must hold
    pub flags: AccessFlags,
    /// Name for traces
    pub name: &'static str,
    /// Payload handler
    pub handler: IoctlHandler,
}

impl IoctlDesc {
    /// Fail with `AccessDenied` unless the file holds every required flag
    pub fn check_access(&self, file: &DrmFile) -> Result<()> {
        if file.permits(self.flags) {
            return Ok(());
        }
        log::debug!(
            "{}: client {:?} lacks {:?}",
            self.name,
            file.client(),
            self.flags.difference(file.caps())
        );
        Err(Error::AccessDenied)
    }
}

/// The driver's request table
pub static IOCTLS: [IoctlDesc; 6] = [
    IoctlDesc {
        nr: nr::FB_ALLOC,
        flags: AccessFlags::AUTH,
        name: "MALI_FB_ALLOC",
        handler: fb_alloc,
    },
    IoctlDesc {
        nr: nr::FB_FREE,
        flags: AccessFlags::AUTH,
        name: "MALI_FB_FREE",
        handler: mem_free,
    },
    IoctlDesc {
        nr: nr::MEM_INIT,
        flags: AccessFlags::ADMIN,
        name: "MALI_MEM_INIT",
        handler: mem_init,
    },
    IoctlDesc {
        nr: nr::MEM_ALLOC,
        flags: AccessFlags::AUTH,
        name: "MALI_MEM_ALLOC",
        handler: mem_alloc,
    },
    IoctlDesc {
        nr: nr::MEM_FREE,
        flags: AccessFlags::AUTH,
        name: "MALI_MEM_FREE",
        handler: mem_free,
    },
    IoctlDesc {
        nr: nr::FB_INIT,
        flags: AccessFlags::ADMIN,
        name: "MALI_FB_INIT",
        handler: fb_init,
    },
];

/// Find the descriptor for a request number
pub fn lookup(nr: u32) -> Option<&'static IoctlDesc> {
    IOCTLS.iter().find(|desc| desc.nr == nr)
}

// =============================================================================
// TYPED REQUESTS
// =============================================================================

/// A decoded request, for callers inside the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Size the video pool
    FbInit(MaliFb),
    /// Allocate from the video pool
    FbAlloc(MaliMem),
    /// Free a video allocation
    FbFree(MaliMem),
    /// Size the general pool
    MemInit(MaliMem),
    /// Allocate from the general pool
    MemAlloc(MaliMem),
    /// Free a general allocation
    MemFree(MaliMem),
}

impl Request {
    /// Request number this request travels under
    pub const fn nr(&self) -> u32 {
        match self {
            Self::FbInit(_) => nr::FB_INIT,
            Self::FbAlloc(_) => nr::FB_ALLOC,
            Self::FbFree(_) => nr::FB_FREE,
            Self::MemInit(_) => nr::MEM_INIT,
            Self::MemAlloc(_) => nr::MEM_ALLOC,
            Self::MemFree(_) => nr::MEM_FREE,
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn fb_init(driver: &Driver, _file: &DrmFile, payload: &mut [u8]) -> Result<()> {
    let fb: MaliFb = uapi::decode(payload)?;
    driver.init_pool(PoolId::Video.raw(), fb.offset, fb.size)
}

fn mem_init(driver: &Driver, _file: &DrmFile, payload: &mut [u8]) -> Result<()> {
    let mem: MaliMem = uapi::decode(payload)?;
    driver.init_pool(PoolId::General.raw(), mem.offset, mem.size)
}

fn fb_alloc(driver: &Driver, file: &DrmFile, payload: &mut [u8]) -> Result<()> {
    alloc_in(driver, file, PoolId::Video.raw(), payload)
}

fn mem_alloc(driver: &Driver, file: &DrmFile, payload: &mut [u8]) -> Result<()> {
    alloc_in(driver, file, PoolId::General.raw(), payload)
}

fn alloc_in(driver: &Driver, file: &DrmFile, pool: u32, payload: &mut [u8]) -> Result<()> {
    let mut mem: MaliMem = uapi::decode(payload)?;
    let result = driver.alloc(file, pool, &mut mem);
    uapi::encode(&mem, payload)?;
    result
}

fn mem_free(driver: &Driver, file: &DrmFile, payload: &mut [u8]) -> Result<()> {
    let mem: MaliMem = uapi::decode(payload)?;
    driver.free(file, &mem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_numbers_are_unique() {
        for (i, a) in IOCTLS.iter().enumerate() {
            for b in &IOCTLS[i + 1..] {
                assert_ne!(a.nr, b.nr);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(nr::MEM_ALLOC).map(|d| d.name), Some("MALI_MEM_ALLOC"));
        assert!(lookup(0x00).is_none());
        assert!(lookup(0x17).is_none());
    }

    #[test]
    fn test_required_flags() {
        for desc in &IOCTLS {
            let expected = match desc.nr {
                nr::FB_INIT | nr::MEM_INIT => AccessFlags::ADMIN,
                _ => AccessFlags::AUTH,
            };
            assert_eq!(desc.flags, expected, "{}", desc.name);
        }
    }

    #[test]
    fn test_request_numbers() {
        assert_eq!(Request::FbInit(MaliFb::default()).nr(), 0x16);
        assert_eq!(Request::MemFree(MaliMem::default()).nr(), 0x15);
        assert!(Request::FbAlloc(MaliMem::default()).nr() == nr::FB_ALLOC);
    }
}
