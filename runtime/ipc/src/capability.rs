//! Capability model
//!
//! A capability names one server-side object through two values:
//!
//! - the **object key**, stable across transfers and used as identity
//! - the **transport handle**, local to one protection domain and re-minted
//!   on every delegation
//!
//! Two capabilities denote the same object when their keys are equal, even if
//! their handles differ.

use core::fmt;

use crate::config::{Word, INVALID_OBJECT_KEY};

/// Stable identity of a server-side object
///
/// Doubles as the badge/label the kernel attaches to the object's endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(Word);

impl ObjectKey {
    /// Wire sentinel for "no capability"
    pub const INVALID: ObjectKey = ObjectKey(INVALID_OBJECT_KEY);

    pub const fn new(raw: Word) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> Word {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_OBJECT_KEY
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ObjectKey({:#x})", self.0)
        } else {
            write!(f, "ObjectKey(INVALID)")
        }
    }
}

/// Domain-local transport handle (capability pointer / selector)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(Word);

impl Handle {
    /// Null handle, never allocated by a backend
    pub const NULL: Handle = Handle(0);

    pub const fn new(raw: Word) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> Word {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Reference to a server-side object, or the invalid capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    key: ObjectKey,
    handle: Handle,
}

impl Capability {
    pub const fn new(key: ObjectKey, handle: Handle) -> Self {
        Self { key, handle }
    }

    pub const fn invalid() -> Self {
        Self {
            key: ObjectKey::INVALID,
            handle: Handle::NULL,
        }
    }

    #[inline]
    pub const fn key(&self) -> ObjectKey {
        self.key
    }

    #[inline]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Valid iff the key is not the sentinel and a handle is attached
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.key.is_valid() && !self.handle.is_null()
    }

    /// Identity comparison (object keys only)
    pub fn same_object(&self, other: &Capability) -> bool {
        self.is_valid() && other.is_valid() && self.key == other.key
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::invalid()
    }
}
