//! # Memory Manager
//!
//! Owns the video and general pools, the shared handle table and the
//! per-client ownership ledger, and serializes every operation on them with
//! one lock.
//!
//! ## Allocation sequence
//!
//! ```text
//!   allocate(pool, client, size)
//!        │
//!        ├─ pool initialized?            ── no ──► PoolNotInitialized
//!        ├─ round size to 16-byte units
//!        ├─ RangeAllocator::insert       ── fail ─► OutOfSpace (nothing to undo)
//!        │        │ Reservation guard
//!        ├─ HandleTable::insert_with     ── fail ─► guard drops, range released,
//!        │                                          OutOfMemory
//!        ├─ guard committed
//!        └─ OwnershipRegistry::attach
//! ```
//!
//! ## Pool re-initialization
//!
//! Initializing a pool that is already initialized re-partitions it without
//! checking for live allocations. Their handles stay valid, but they now
//! point into a partition that no longer exists. Each record remembers the
//! partition generation it came from, and freeing such a record drops the
//! handle without touching the new partition.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use mali_core::{
    units_for_bytes, whole_units, ByteSize, ClientId, DeviceOffset, Error, Handle, PoolId,
    Result,
};
use spin::Mutex;

use crate::config::MmConfig;
use crate::handle::HandleTable;
use crate::owner::OwnershipRegistry;
use crate::range::{RangeAllocator, UnitRange};

// =============================================================================
// ALLOCATION RECORD
// =============================================================================

/// Handle to a live allocation
pub type MemHandle = Handle<Allocation>;

/// A live range carved out of one pool
#[derive(Debug)]
pub struct Allocation {
    handle: MemHandle,
    pool: PoolId,
    range: UnitRange,
    owner: ClientId,
    generation: u32,
}

/// Result of a successful allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemBlock {
    /// Handle for later frees
    pub handle: MemHandle,
    /// Absolute device offset
    pub offset: DeviceOffset,
    /// Size rounded up to whole alignment units
    pub size: ByteSize,
}

// =============================================================================
// POOL
// =============================================================================

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful allocations
    pub allocs: u64,
    /// Released allocations (explicit frees and reclaims)
    pub frees: u64,
    /// Allocations that failed for lack of space or handles
    pub failed_allocs: u64,
    /// High water mark of used units
    pub peak_used_units: u64,
}

/// Point-in-time view of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    /// Pool selector
    pub id: PoolId,
    /// Whether the pool has been initialized
    pub initialized: bool,
    /// Device offset of unit zero
    pub base_offset: DeviceOffset,
    /// Managed capacity
    pub capacity: ByteSize,
    /// Free space
    pub free: ByteSize,
    /// Largest contiguous free range
    pub largest_free: ByteSize,
    /// Live allocations carved from the current partition
    pub live_allocations: usize,
    /// Cumulative statistics
    pub stats: PoolStats,
}

#[derive(Debug)]
struct Pool {
    id: PoolId,
    base_offset: DeviceOffset,
    allocator: RangeAllocator,
    initialized: bool,
    generation: u32,
    stats: PoolStats,
}

impl Pool {
    fn new(id: PoolId, config: &MmConfig) -> Self {
        Self {
            id,
            base_offset: DeviceOffset::zero(),
            allocator: RangeAllocator::new(config.search),
            initialized: false,
            generation: 0,
            stats: PoolStats::default(),
        }
    }

    fn info(&self) -> PoolInfo {
        PoolInfo {
            id: self.id,
            initialized: self.initialized,
            base_offset: self.base_offset,
            capacity: ByteSize::from_units(self.allocator.capacity()),
            free: ByteSize::from_units(self.allocator.free_units()),
            largest_free: ByteSize::from_units(self.allocator.largest_free()),
            live_allocations: self.allocator.reserved_count(),
            stats: self.stats,
        }
    }

    /// Give a record's range back, unless it belongs to a superseded partition
    fn release(&mut self, record: &Allocation) {
        if !self.initialized || record.generation != self.generation {
            log::warn!(
                "{} pool: handle {} belongs to a discarded partition, range not released",
                self.id,
                record.handle
            );
            self.stats.frees += 1;
            return;
        }

        match self.allocator.remove(record.range) {
            Ok(()) => self.stats.frees += 1,
            Err(err) => log::error!(
                "{} pool: releasing {:?} for handle {} failed: {}",
                self.id,
                record.range,
                record.handle,
                err
            ),
        }
    }

    fn note_usage(&mut self) {
        let used = self.allocator.capacity() - self.allocator.free_units();
        self.stats.peak_used_units = self.stats.peak_used_units.max(used);
    }
}

// =============================================================================
// RESERVATION GUARD
// =============================================================================

/// A reserved range that is released again unless committed
struct Reservation<'a> {
    allocator: &'a mut RangeAllocator,
    range: Option<UnitRange>,
}

impl<'a> Reservation<'a> {
    fn reserve(allocator: &'a mut RangeAllocator, units: u64) -> Result<Self> {
        let range = allocator.insert(units)?;
        Ok(Self {
            allocator,
            range: Some(range),
        })
    }

    fn range(&self) -> UnitRange {
        self.range.unwrap_or(UnitRange::new(0, 0))
    }

    fn commit(mut self) -> UnitRange {
        self.range.take().unwrap_or(UnitRange::new(0, 0))
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(range) = self.range.take() {
            if let Err(err) = self.allocator.remove(range) {
                log::error!("rollback of {:?} failed: {}", range, err);
            }
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

#[derive(Debug)]
struct MmState {
    pools: [Pool; 2],
    handles: HandleTable<Allocation>,
    owners: OwnershipRegistry<Allocation>,
    next_client: u64,
}

impl MmState {
    #[cfg(feature = "debug-alloc")]
    fn check(&self) {
        for pool in &self.pools {
            debug_assert!(
                pool.allocator.check_consistency(),
                "{} pool ranges are inconsistent",
                pool.id
            );
        }
    }

    #[cfg(not(feature = "debug-alloc"))]
    fn check(&self) {}
}

/// Device memory manager
///
/// # Example
/// ```
/// use mali_core::PoolId;
/// use mali_mem::{MemoryManager, MmConfig};
///
/// let mm = MemoryManager::new(MmConfig::default());
/// let client = mm.open_client();
///
/// mm.init_pool(PoolId::Video, 0x1000, 1024);
/// let block = mm.allocate(PoolId::Video, client, 100).unwrap();
/// assert_eq!(block.offset.raw(), 0x1000);
/// assert_eq!(block.size.as_bytes(), 112);
///
/// mm.free(block.handle, client).unwrap();
/// ```
#[derive(Debug)]
pub struct MemoryManager {
    state: Mutex<MmState>,
    idle_fault: AtomicBool,
}

impl MemoryManager {
    /// Create a manager with both pools uninitialized
    pub fn new(config: MmConfig) -> Self {
        Self {
            state: Mutex::new(MmState {
                pools: [
                    Pool::new(PoolId::Video, &config),
                    Pool::new(PoolId::General, &config),
                ],
                handles: HandleTable::new(config.max_handles),
                owners: OwnershipRegistry::new(),
                next_client: 1,
            }),
            idle_fault: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// Register a new client and return its ID
    pub fn open_client(&self) -> ClientId {
        let mut state = self.state.lock();
        let client = ClientId::new(state.next_client);
        state.next_client += 1;
        state.owners.connect(client);
        log::debug!("client {:?} connected", client);
        client
    }

    /// Discard a client record
    ///
    /// The client's allocations must have been reclaimed first; anything
    /// still attached is reported and left to device teardown.
    pub fn close_client(&self, client: ClientId) {
        let mut state = self.state.lock();
        let leftover = state.owners.disconnect(client);
        if leftover > 0 {
            log::warn!(
                "client {:?} closed with {} allocations still attached",
                client,
                leftover
            );
        }
        log::debug!("client {:?} disconnected", client);
    }

    // =========================================================================
    // Pool lifecycle
    // =========================================================================

    /// Size a pool and mark it initialized
    ///
    /// `capacity_bytes` is truncated to whole alignment units.
    pub fn init_pool(&self, pool: PoolId, base_offset: u64, capacity_bytes: u64) {
        let mut state = self.state.lock();
        let p = &mut state.pools[pool.index()];

        if p.initialized {
            let live = p.allocator.reserved_count();
            if live > 0 {
                log::warn!(
                    "{} pool re-initialized with {} live allocations; their handles are orphaned",
                    pool,
                    live
                );
            }
        }

        p.allocator.init(whole_units(capacity_bytes));
        p.base_offset = DeviceOffset::new(base_offset);
        p.initialized = true;
        p.generation = p.generation.wrapping_add(1);

        log::info!(
            "{} pool: offset = {:#x}, size = {}",
            pool,
            base_offset,
            ByteSize::from_bytes(capacity_bytes)
        );
        state.check();
    }

    /// Initialize a pool named by a raw selector
    pub fn init_pool_raw(&self, pool: u32, base_offset: u64, capacity_bytes: u64) -> Result<()> {
        let pool = PoolId::from_raw(pool)?;
        self.init_pool(pool, base_offset, capacity_bytes);
        Ok(())
    }

    /// Tear down every initialized pool and drop all residual state
    ///
    /// Meant to run once every client has been reclaimed. Allocations that
    /// are still live are reported, their handles are invalidated, and the
    /// call goes ahead. Returns the number of such allocations.
    pub fn teardown_device(&self) -> usize {
        let mut state = self.state.lock();

        let leftover = state.handles.len();
        if leftover > 0 {
            log::warn!("device teardown with {} live allocations", leftover);
        }

        for pool in state.pools.iter_mut() {
            if pool.initialized {
                pool.allocator.teardown();
                pool.initialized = false;
                pool.base_offset = DeviceOffset::zero();
            }
        }

        state.handles.clear();
        state.owners.clear_lists();
        self.idle_fault.store(false, Ordering::Release);

        log::debug!("device memory torn down");
        leftover
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Carve `size_bytes` (rounded up to 16 bytes) out of a pool for a client
    ///
    /// The client must be open; a closed or unknown client is
    /// `InvalidParameter`.
    pub fn allocate(&self, pool: PoolId, client: ClientId, size_bytes: u64) -> Result<MemBlock> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.owners.is_connected(client) {
            log::error!("alloc {}: client {:?} is not connected", pool, client);
            return Err(Error::InvalidParameter);
        }

        let p = &mut state.pools[pool.index()];

        if !p.initialized {
            log::error!("Attempt to allocate from uninitialized memory manager.");
            return Err(Error::PoolNotInitialized);
        }

        let units = match units_for_bytes(size_bytes) {
            Some(0) | None => {
                p.stats.failed_allocs += 1;
                return Err(if size_bytes == 0 {
                    Error::InvalidParameter
                } else {
                    Error::OutOfSpace
                });
            }
            Some(units) => units,
        };

        let reservation = match Reservation::reserve(&mut p.allocator, units) {
            Ok(reservation) => reservation,
            Err(err) => {
                p.stats.failed_allocs += 1;
                log::debug!("alloc {}, size = {}: {}", pool, size_bytes, err);
                return Err(err);
            }
        };

        let range = reservation.range();
        let generation = p.generation;
        let inserted = state.handles.insert_with(|handle| Allocation {
            handle,
            pool,
            range,
            owner: client,
            generation,
        });

        let handle = match inserted {
            Ok(handle) => handle,
            Err(err) => {
                drop(reservation);
                p.stats.failed_allocs += 1;
                log::debug!("alloc {}, size = {}: {}", pool, size_bytes, err);
                state.check();
                return Err(err);
            }
        };
        let range = reservation.commit();

        p.stats.allocs += 1;
        p.note_usage();
        let offset = p.base_offset.add_units(range.start);

        match state.handles.lookup(handle) {
            Ok(record) => {
                if !state.owners.attach(client, record) {
                    log::error!("handle {} has no owner record for {:?}", handle, client);
                }
            }
            Err(_) => log::error!("handle {} vanished during allocation", handle),
        }

        let block = MemBlock {
            handle,
            offset,
            size: range.size(),
        };
        log::debug!(
            "alloc {}, handle = {}, size = {}, offset = {}",
            pool,
            handle,
            block.size.as_bytes(),
            offset
        );
        state.check();

        Ok(block)
    }

    /// Allocate from a pool named by a raw selector
    pub fn allocate_raw(&self, pool: u32, client: ClientId, size_bytes: u64) -> Result<MemBlock> {
        self.allocate(PoolId::from_raw(pool)?, client, size_bytes)
    }

    /// Release one allocation by handle
    ///
    /// The handle, the owner's ledger entry and the range are dropped
    /// together. Any connected client may free any live handle.
    pub fn free(&self, handle: MemHandle, client: ClientId) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let record = state
            .handles
            .remove(handle)
            .map_err(|_| Error::InvalidHandle)?;

        if record.owner != client {
            log::debug!(
                "handle {} owned by {:?} freed by {:?}",
                handle,
                record.owner,
                client
            );
        }

        state.owners.detach(record.owner, &record);
        state.pools[record.pool.index()].release(&record);

        log::debug!("free = {:#x}", handle.id());
        state.check();
        Ok(())
    }

    /// Free a handle received as a raw integer
    pub fn free_raw(&self, raw: u64, client: ClientId) -> Result<()> {
        let handle = MemHandle::from_raw(raw).ok_or(Error::InvalidHandle)?;
        self.free(handle, client)
    }

    /// Release everything a client still owns
    ///
    /// Returns the number of allocations released; a client with nothing
    /// attached is a no-op.
    pub fn reclaim_client(&self, client: ClientId) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.owners.owned_count(client) == 0 {
            return 0;
        }

        if !self.device_idle() {
            log::warn!("reclaiming buffers of {:?} while the device reports a fault", client);
        }

        let records: Vec<Arc<Allocation>> = state.owners.reclaim_all(client);
        let mut released = 0;

        for record in records {
            if state.handles.remove(record.handle).is_err() {
                continue;
            }
            state.pools[record.pool.index()].release(&record);
            released += 1;
        }

        log::debug!("reclaimed {} allocations from {:?}", released, client);
        state.check();
        released
    }

    // =========================================================================
    // Device state
    // =========================================================================

    /// Whether the device is free of an outstanding fault
    pub fn device_idle(&self) -> bool {
        !self.idle_fault.load(Ordering::Acquire)
    }

    /// Raise or clear the device fault condition
    pub fn set_idle_fault(&self, fault: bool) {
        self.idle_fault.store(fault, Ordering::Release);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of one pool
    pub fn pool_info(&self, pool: PoolId) -> PoolInfo {
        self.state.lock().pools[pool.index()].info()
    }

    /// Free space of one pool
    pub fn free_space(&self, pool: PoolId) -> ByteSize {
        self.pool_info(pool).free
    }

    /// Whether a pool is initialized
    pub fn is_initialized(&self, pool: PoolId) -> bool {
        self.state.lock().pools[pool.index()].initialized
    }

    /// Number of live handles across both pools
    pub fn live_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Handles a client currently owns, in allocation order
    pub fn client_allocations(&self, client: ClientId) -> Vec<MemHandle> {
        self.state
            .lock()
            .owners
            .owned(client)
            .iter()
            .map(|r| r.handle)
            .collect()
    }

    /// Look up the device offset and size behind a live handle
    pub fn lookup(&self, handle: MemHandle) -> Result<MemBlock> {
        let state = self.state.lock();
        let record = state
            .handles
            .lookup(handle)
            .map_err(|_| Error::InvalidHandle)?;
        let pool = &state.pools[record.pool.index()];
        Ok(MemBlock {
            handle,
            offset: pool.base_offset.add_units(record.range.start),
            size: record.range.size(),
        })
    }
}
