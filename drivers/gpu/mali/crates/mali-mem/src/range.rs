//! # Range Allocator
//!
//! Interval allocator over a linear space of alignment units.
//!
//! Free space is kept twice: by offset, so a released range can be merged
//! with its neighbours, and by `(length, offset)`, so best-fit is a
//! single ordered-set search. Reserved ranges are tracked by offset so that a
//! release can be checked against what was actually handed out.

use alloc::collections::{BTreeMap, BTreeSet};

use mali_core::{ByteSize, Error, Result};

use crate::config::SearchMode;

// =============================================================================
// UNIT RANGE
// =============================================================================

/// A half-open range `[start, start + len)` measured in alignment units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitRange {
    /// First unit
    pub start: u64,
    /// Length in units
    pub len: u64,
}

impl UnitRange {
    /// Create a new range
    pub const fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// One past the last unit
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Check if ranges overlap
    pub const fn overlaps(&self, other: &UnitRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Size in bytes
    pub const fn size(&self) -> ByteSize {
        ByteSize::from_units(self.len)
    }
}

// =============================================================================
// RANGE ALLOCATOR
// =============================================================================

/// Best-fit / first-fit allocator over `[0, capacity)` alignment units
#[derive(Debug)]
pub struct RangeAllocator {
    /// Managed capacity in units
    capacity: u64,
    /// Search strategy
    search: SearchMode,
    /// Free ranges: start -> len
    holes: BTreeMap<u64, u64>,
    /// Free ranges ordered by (len, start)
    holes_by_size: BTreeSet<(u64, u64)>,
    /// Reserved ranges: start -> len
    reserved: BTreeMap<u64, u64>,
    /// Units currently free
    free_units: u64,
}

impl RangeAllocator {
    /// Create an empty allocator with zero capacity
    pub const fn new(search: SearchMode) -> Self {
        Self {
            capacity: 0,
            search,
            holes: BTreeMap::new(),
            holes_by_size: BTreeSet::new(),
            reserved: BTreeMap::new(),
            free_units: 0,
        }
    }

    /// Reset to a single free range of `capacity` units
    ///
    /// Any outstanding reservation is forgotten; callers must only do this on
    /// a quiescent pool.
    pub fn init(&mut self, capacity: u64) {
        self.teardown();
        self.capacity = capacity;
        if capacity > 0 {
            self.add_hole(0, capacity);
        }
        self.free_units = capacity;
    }

    /// Reserve `size` units and return the reserved range
    pub fn insert(&mut self, size: u64) -> Result<UnitRange> {
        if size == 0 {
            return Err(Error::InvalidParameter);
        }

        let (start, len) = self.find_hole(size).ok_or(Error::OutOfSpace)?;

        self.remove_hole(start, len);
        if len > size {
            self.add_hole(start + size, len - size);
        }

        self.reserved.insert(start, size);
        self.free_units -= size;

        Ok(UnitRange::new(start, size))
    }

    /// Release a range previously returned by [`insert`](Self::insert)
    ///
    /// A range that is not currently reserved, exactly as handed out, is
    /// rejected with `NotFound` and nothing changes.
    pub fn remove(&mut self, range: UnitRange) -> Result<()> {
        match self.reserved.get(&range.start) {
            Some(&len) if len == range.len => {}
            _ => return Err(Error::NotFound),
        }
        self.reserved.remove(&range.start);

        let mut start = range.start;
        let mut len = range.len;

        // Merge with the free range just below
        let below = self
            .holes
            .range(..start)
            .next_back()
            .map(|(&s, &l)| (s, l));
        if let Some((prev_start, prev_len)) = below {
            if prev_start + prev_len == start {
                self.remove_hole(prev_start, prev_len);
                start = prev_start;
                len += prev_len;
            }
        }

        // Merge with the free range just above
        let above = self.holes.get(&range.end()).copied();
        if let Some(next_len) = above {
            self.remove_hole(range.end(), next_len);
            len += next_len;
        }

        self.add_hole(start, len);
        self.free_units += range.len;

        Ok(())
    }

    /// Discard all bookkeeping
    pub fn teardown(&mut self) {
        self.holes.clear();
        self.holes_by_size.clear();
        self.reserved.clear();
        self.capacity = 0;
        self.free_units = 0;
    }

    /// Managed capacity in units
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Units currently free
    pub fn free_units(&self) -> u64 {
        self.free_units
    }

    /// Largest contiguous free range in units
    pub fn largest_free(&self) -> u64 {
        self.holes_by_size
            .iter()
            .next_back()
            .map(|&(len, _)| len)
            .unwrap_or(0)
    }

    /// Number of reserved ranges
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Iterate over reserved ranges in offset order
    pub fn reserved(&self) -> impl Iterator<Item = UnitRange> + '_ {
        self.reserved
            .iter()
            .map(|(&start, &len)| UnitRange::new(start, len))
    }

    /// Verify that free and reserved ranges tile `[0, capacity)` exactly
    pub fn check_consistency(&self) -> bool {
        let mut cursor = 0;
        let mut free = self.holes.iter().peekable();
        let mut used = self.reserved.iter().peekable();

        loop {
            let next_free = free.peek().map(|&(&s, &l)| (s, l));
            let next_used = used.peek().map(|&(&s, &l)| (s, l));
            let next = match (next_free, next_used) {
                (Some(f), Some(u)) if f.0 < u.0 => {
                    free.next();
                    f
                }
                (_, Some(u)) => {
                    used.next();
                    u
                }
                (Some(f), None) => {
                    free.next();
                    f
                }
                (None, None) => break,
            };
            if next.0 != cursor || next.1 == 0 {
                return false;
            }
            cursor += next.1;
        }

        let free_total: u64 = self.holes.values().sum();
        cursor == self.capacity
            && free_total == self.free_units
            && self.holes.len() == self.holes_by_size.len()
    }

    fn find_hole(&self, size: u64) -> Option<(u64, u64)> {
        match self.search {
            SearchMode::BestFit => self
                .holes_by_size
                .range((size, 0)..)
                .next()
                .map(|&(len, start)| (start, len)),
            SearchMode::FirstFit => self
                .holes
                .iter()
                .find(|&(_, &len)| len >= size)
                .map(|(&start, &len)| (start, len)),
        }
    }

    fn add_hole(&mut self, start: u64, len: u64) {
        self.holes.insert(start, len);
        self.holes_by_size.insert((len, start));
    }

    fn remove_hole(&mut self, start: u64, len: u64) {
        self.holes.remove(&start);
        self.holes_by_size.remove(&(len, start));
    }
}
