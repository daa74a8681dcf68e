//! # Handle Table
//!
//! Slot table mapping positive integer handles to shared records.
//!
//! Handle `n` lives in slot `n - 1`. Vacated slots go onto a min-heap so the
//! next insert reuses the smallest free handle; the table only grows when no
//! vacated slot is left.

use alloc::collections::BinaryHeap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Reverse;

use mali_core::{Error, Handle, Result, MAX_HANDLE};

// =============================================================================
// HANDLE TABLE
// =============================================================================

/// Handle-to-record table with smallest-free-handle reuse
///
/// The table owns its records; it hands out `Arc`s so other bookkeeping can
/// keep weak, lookup-only references to them.
#[derive(Debug)]
pub struct HandleTable<T> {
    /// Slots indexed by `handle - 1`
    slots: Vec<Option<Arc<T>>>,
    /// Vacated slot indices, smallest first
    vacant: BinaryHeap<Reverse<u32>>,
    /// Live entries
    len: usize,
    /// Maximum number of slots
    limit: u32,
}

impl<T> HandleTable<T> {
    /// Create an empty table that never grows past `limit` slots
    pub fn new(limit: u32) -> Self {
        Self {
            slots: Vec::new(),
            vacant: BinaryHeap::new(),
            len: 0,
            limit: limit.min(MAX_HANDLE),
        }
    }

    /// Store a record under the smallest unused handle
    pub fn insert(&mut self, record: T) -> Result<Handle<T>> {
        self.insert_with(|_| record)
    }

    /// Store a record that needs to know its own handle
    pub fn insert_with<F>(&mut self, make: F) -> Result<Handle<T>>
    where
        F: FnOnce(Handle<T>) -> T,
    {
        let index = match self.vacant.pop() {
            Some(Reverse(index)) => index,
            None => self.grow()?,
        };

        let handle = match Handle::new(index + 1) {
            Some(handle) => handle,
            None => {
                self.vacant.push(Reverse(index));
                return Err(Error::OutOfMemory);
            }
        };

        self.slots[index as usize] = Some(Arc::new(make(handle)));
        self.len += 1;

        Ok(handle)
    }

    /// Look up the record behind a handle
    pub fn lookup(&self, handle: Handle<T>) -> Result<&Arc<T>> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound)
    }

    /// Detach a handle and return its record
    ///
    /// The handle is immediately eligible for reuse. Unknown handles report
    /// `NotFound` and leave the table untouched.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<Arc<T>> {
        let record = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(Error::NotFound)?;

        // Capacity for this push was reserved when the slot was created
        self.vacant.push(Reverse(handle.index() as u32));
        self.len -= 1;

        Ok(record)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no handle is live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live handles in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &Arc<T>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let record = slot.as_ref()?;
            Handle::new(index as u32 + 1).map(|handle| (handle, record))
        })
    }

    /// Drop every record and forget all handles
    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.len = 0;
    }

    /// Append a fresh slot, failing when storage cannot grow
    fn grow(&mut self) -> Result<u32> {
        let index = self.slots.len();
        if index >= self.limit as usize {
            return Err(Error::OutOfMemory);
        }

        self.slots.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        // Keep room for every slot in the vacant heap so remove never allocates
        self.vacant
            .try_reserve(index + 1 - self.vacant.len())
            .map_err(|_| Error::OutOfMemory)?;

        self.slots.push(None);
        Ok(index as u32)
    }
}
