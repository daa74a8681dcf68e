//! # Mali DRM Driver
//!
//! Device-private state and the hooks the DRM core calls over a device's
//! life.
//!
//! ```text
//!   load ──► open ──► ioctl* ──► release ─┬─► preclose  (reclaim buffers)
//!                                         ├─► postclose (forget client)
//!                                         └─► lastclose (teardown, last file only)
//!   unload
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};

use mali_core::{Error, PoolId, Result};
use mali_mem::{MemoryManager, MmConfig, PoolInfo};

use crate::file::DrmFile;
use crate::ioctl::{self, AccessFlags, Request};
use crate::uapi::{MaliFb, MaliMem};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Driver identification and memory manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Driver name reported to userspace
    pub name: &'static str,
    /// Human readable description
    pub desc: &'static str,
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch level
    pub patchlevel: u32,
    /// Memory manager configuration
    pub mm: MmConfig,
}

impl DriverConfig {
    /// Stock configuration
    pub const fn new() -> Self {
        Self {
            name: "mali_drm",
            desc: "DRM module for ARM Mali GPUs",
            major: 1,
            minor: 0,
            patchlevel: 0,
            mm: MmConfig::new(),
        }
    }

    /// Replace the memory manager configuration
    pub const fn with_mm(mut self, mm: MmConfig) -> Self {
        self.mm = mm;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// A loaded Mali DRM device
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    mm: MemoryManager,
    open_files: AtomicUsize,
}

impl Driver {
    /// Set up device-private state
    pub fn load(config: DriverConfig) -> Self {
        log::info!(
            "DRM: {} {}.{}.{} loaded",
            config.name,
            config.major,
            config.minor,
            config.patchlevel
        );
        Self {
            config,
            mm: MemoryManager::new(config.mm),
            open_files: AtomicUsize::new(0),
        }
    }

    /// Drop device-private state
    pub fn unload(self) {
        let live = self.mm.live_handles();
        if live > 0 {
            log::warn!("DRM: {} unloaded with {} live allocations", self.config.name, live);
        }
        log::info!("DRM: {} unloaded", self.config.name);
    }

    /// Memory manager behind the device
    pub fn memory(&self) -> &MemoryManager {
        &self.mm
    }

    // =========================================================================
    // File lifecycle
    // =========================================================================

    /// Open a client file with the given privileges
    ///
    /// Callers serialize `open` against `release`, as the DRM core does
    /// under its device mutex.
    pub fn open(&self, caps: AccessFlags) -> DrmFile {
        let client = self.mm.open_client();
        self.open_files.fetch_add(1, Ordering::AcqRel);
        log::debug!("open: client {:?}, caps {:?}", client, caps);
        DrmFile::new(client, caps)
    }

    /// Free every buffer the file still owns
    pub fn preclose(&self, file: &DrmFile) {
        let released = self.mm.reclaim_client(file.client());
        if released > 0 {
            log::debug!("preclose: released {} buffers of {:?}", released, file.client());
        }
    }

    /// Forget the file's client record
    pub fn postclose(&self, file: DrmFile) {
        self.mm.close_client(file.client());
    }

    /// Tear down both pools
    pub fn lastclose(&self) {
        self.mm.teardown_device();
    }

    /// Close a file the way the DRM core does
    ///
    /// Runs `preclose` and `postclose`, then `lastclose` when this was the
    /// last open file.
    ///
    /// The open-file count and `lastclose` are not covered by one lock. The
    /// caller must serialize `open` and `release`, otherwise a file opened
    /// between the decrement and `lastclose` sees its pools torn down.
    pub fn release(&self, file: DrmFile) {
        self.preclose(&file);
        self.postclose(file);

        if self.open_files.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lastclose();
        }
    }

    /// Number of open files
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }

    /// Whether the device has no outstanding fault
    pub fn dma_quiescent(&self) -> bool {
        self.mm.device_idle()
    }

    /// Raise or clear the device fault condition
    pub fn set_idle_fault(&self, fault: bool) {
        self.mm.set_idle_fault(fault);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Handle a device-control request on a raw payload
    ///
    /// The payload is rewritten in place with the response fields.
    pub fn ioctl(&self, file: &DrmFile, nr: u32, payload: &mut [u8]) -> Result<()> {
        let desc = ioctl::lookup(nr).ok_or_else(|| {
            log::debug!("unknown request {:#x} from {:?}", nr, file.client());
            Error::InvalidRequest
        })?;
        desc.check_access(file)?;

        log::debug!("{}: client {:?}", desc.name, file.client());
        (desc.handler)(self, file, payload)
    }

    /// Handle an already decoded request
    ///
    /// Privileges are checked against the same table as [`Driver::ioctl`].
    pub fn dispatch(&self, file: &DrmFile, request: &mut Request) -> Result<()> {
        let desc = ioctl::lookup(request.nr()).ok_or(Error::InvalidRequest)?;
        desc.check_access(file)?;

        match request {
            Request::FbInit(fb) => self.init_video(fb),
            Request::MemInit(mem) => self.init_pool(PoolId::General.raw(), mem.offset, mem.size),
            Request::FbAlloc(mem) => self.alloc(file, PoolId::Video.raw(), mem),
            Request::MemAlloc(mem) => self.alloc(file, PoolId::General.raw(), mem),
            Request::FbFree(mem) | Request::MemFree(mem) => self.free(file, mem),
        }
    }

    fn init_video(&self, fb: &MaliFb) -> Result<()> {
        self.init_pool(PoolId::Video.raw(), fb.offset, fb.size)
    }

    pub(crate) fn init_pool(&self, pool: u32, offset: u64, size: u64) -> Result<()> {
        self.mm.init_pool_raw(pool, offset, size)
    }

    /// Allocate into `mem`, clearing its response fields on failure
    pub(crate) fn alloc(&self, file: &DrmFile, pool: u32, mem: &mut MaliMem) -> Result<()> {
        match self.mm.allocate_raw(pool, file.client(), mem.size) {
            Ok(block) => {
                mem.offset = block.offset.raw();
                mem.size = block.size.as_bytes();
                mem.free = u64::from(block.handle.id());
                Ok(())
            }
            Err(err) => {
                let requested = mem.size;
                mem.clear_response();
                log::debug!("alloc {}, size = {}: {}", pool, requested, err);
                Err(err)
            }
        }
    }

    pub(crate) fn free(&self, file: &DrmFile, mem: &MaliMem) -> Result<()> {
        self.mm.free_raw(mem.free, file.client())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of one pool
    pub fn pool_info(&self, pool: PoolId) -> PoolInfo {
        self.mm.pool_info(pool)
    }
}
