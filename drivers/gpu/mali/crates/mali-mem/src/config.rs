//! # Memory Manager Configuration

use mali_core::MAX_HANDLE;

// =============================================================================
// SEARCH MODE
// =============================================================================

/// Free-range search strategy used by [`RangeAllocator`](crate::RangeAllocator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Smallest free range that fits, lowest offset on ties
    #[default]
    BestFit,
    /// Lowest-offset free range that fits
    FirstFit,
}

// =============================================================================
// MANAGER CONFIGURATION
// =============================================================================

/// Memory manager configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmConfig {
    /// Search strategy for both pools
    pub search: SearchMode,
    /// Upper bound on simultaneously live handles
    ///
    /// Running into this bound is reported as `OutOfMemory`, the same way a
    /// failed handle-table growth is.
    pub max_handles: u32,
}

impl MmConfig {
    /// Best-fit search over the full positive handle space
    pub const fn new() -> Self {
        Self {
            search: SearchMode::BestFit,
            max_handles: MAX_HANDLE,
        }
    }

    /// First-fit search, mirroring the default DRM range-manager policy
    pub const fn first_fit() -> Self {
        Self {
            search: SearchMode::FirstFit,
            max_handles: MAX_HANDLE,
        }
    }

    /// Cap the number of live handles
    pub const fn with_max_handles(mut self, max_handles: u32) -> Self {
        self.max_handles = max_handles;
        self
    }
}

impl Default for MmConfig {
    fn default() -> Self {
        Self::new()
    }
}
