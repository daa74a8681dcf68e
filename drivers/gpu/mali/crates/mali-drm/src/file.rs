//! # Client Files
//!
//! Per-open state: the client identity the memory manager tracks ownership
//! by, and the privileges the opener was granted.

use mali_core::ClientId;

use crate::ioctl::AccessFlags;

/// An open device file
#[derive(Debug)]
pub struct DrmFile {
    client: ClientId,
    caps: AccessFlags,
}

impl DrmFile {
    pub(crate) fn new(client: ClientId, caps: AccessFlags) -> Self {
        Self { client, caps }
    }

    /// Client the file's allocations belong to
    #[inline]
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Privileges granted to the opener
    #[inline]
    pub fn caps(&self) -> AccessFlags {
        self.caps
    }

    /// Check whether the file holds every flag in `required`
    #[inline]
    pub fn permits(&self, required: AccessFlags) -> bool {
        self.caps.contains(required)
    }
}
