//! Process-wide capability space
//!
//! Maps object keys to the local capability that currently represents them.
//! The wire decoder consults it to give a received capability the same local
//! identity every time its key shows up again.
//!
//! Every operation takes the table lock exactly once, so lookups and
//! "insert unless present" are indivisible. The lock is never held across a
//! kernel call.

use spin::Mutex;

use crate::capability::{Capability, ObjectKey};
use crate::config::CAP_SPACE_ENTRIES;
use crate::error::CapSpaceError;

/// Outcome of [`CapSpace::bind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The key was already known; the existing capability is returned
    Existing(Capability),
    /// The capability was registered under its key
    Inserted(Capability),
}

impl Binding {
    pub fn capability(self) -> Capability {
        match self {
            Binding::Existing(cap) | Binding::Inserted(cap) => cap,
        }
    }
}

struct Table<const N: usize> {
    entries: [Option<Capability>; N],
    len: usize,
}

impl<const N: usize> Table<N> {
    fn position(&self, key: ObjectKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| matches!(entry, Some(cap) if cap.key() == key))
    }
}

/// Fixed-capacity key → capability table
pub struct CapSpace<const N: usize = CAP_SPACE_ENTRIES> {
    table: Mutex<Table<N>>,
}

impl<const N: usize> CapSpace<N> {
    /// Create an empty capability space (usable in a `static`)
    pub const fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: [None; N],
                len: 0,
            }),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.table.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the local capability for `key`
    pub fn find(&self, key: ObjectKey) -> Option<Capability> {
        if !key.is_valid() {
            return None;
        }
        let table = self.table.lock();
        table.position(key).and_then(|idx| table.entries[idx])
    }

    /// Whether `cap` is the capability currently registered for its key
    pub fn resolves(&self, cap: &Capability) -> bool {
        cap.is_valid() && self.find(cap.key()) == Some(*cap)
    }

    /// Register `cap` unless its key is already known
    pub fn bind(&self, cap: Capability) -> Result<Binding, CapSpaceError> {
        if !cap.is_valid() {
            return Err(CapSpaceError::InvalidCapability);
        }

        let mut table = self.table.lock();
        if let Some(idx) = table.position(cap.key()) {
            if let Some(existing) = table.entries[idx] {
                return Ok(Binding::Existing(existing));
            }
        }

        let free = table
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(CapSpaceError::Full { capacity: N })?;
        table.entries[free] = Some(cap);
        table.len += 1;

        log::trace!("cap space: bound {:?} -> {:?}", cap.key(), cap.handle());
        Ok(Binding::Inserted(cap))
    }

    /// Drop the binding for `key`, returning the capability it named
    pub fn remove(&self, key: ObjectKey) -> Option<Capability> {
        let mut table = self.table.lock();
        let idx = table.position(key)?;
        let removed = table.entries[idx].take();
        table.len -= 1;
        removed
    }
}

impl<const N: usize> Default for CapSpace<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Handle;

    fn cap(key: u64, handle: u64) -> Capability {
        Capability::new(ObjectKey::new(key), Handle::new(handle))
    }

    #[test]
    fn test_bind_and_find() {
        let space: CapSpace<4> = CapSpace::new();
        assert!(space.is_empty());

        let bound = space.bind(cap(0x10, 1)).unwrap();
        assert_eq!(bound, Binding::Inserted(cap(0x10, 1)));
        assert_eq!(space.find(ObjectKey::new(0x10)), Some(cap(0x10, 1)));
        assert_eq!(space.find(ObjectKey::new(0x11)), None);
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn test_bind_existing_key_keeps_first_capability() {
        let space: CapSpace<4> = CapSpace::new();
        space.bind(cap(0x10, 1)).unwrap();

        let again = space.bind(cap(0x10, 5)).unwrap();
        assert_eq!(again, Binding::Existing(cap(0x10, 1)));
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn test_bind_full() {
        let space: CapSpace<2> = CapSpace::new();
        space.bind(cap(1, 1)).unwrap();
        space.bind(cap(2, 2)).unwrap();

        assert_eq!(space.bind(cap(3, 3)), Err(CapSpaceError::Full { capacity: 2 }));

        // Removing frees the entry again
        assert_eq!(space.remove(ObjectKey::new(1)), Some(cap(1, 1)));
        assert!(space.bind(cap(3, 3)).is_ok());
    }

    #[test]
    fn test_invalid_capabilities_are_rejected() {
        let space: CapSpace<2> = CapSpace::new();
        assert_eq!(
            space.bind(Capability::invalid()),
            Err(CapSpaceError::InvalidCapability)
        );
        assert_eq!(space.find(ObjectKey::INVALID), None);
    }

    #[test]
    fn test_resolves() {
        let space: CapSpace<2> = CapSpace::new();
        space.bind(cap(0x20, 4)).unwrap();

        assert!(space.resolves(&cap(0x20, 4)));
        // Stale handle for a known key
        assert!(!space.resolves(&cap(0x20, 5)));
        assert!(!space.resolves(&cap(0x21, 4)));
    }
}
