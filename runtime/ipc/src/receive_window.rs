//! Capability receive window
//!
//! Each execution context reserves [`MAX_CAPS_PER_MSG`] empty handle slots up
//! front. The kernel places delegated capabilities into these slots during a
//! receive. A slot that ends up holding a new capability is handed over to the
//! capability space and immediately replaced by a freshly allocated slot, so
//! the window is back at full strength before the next receive.
//!
//! The window does not release itself: the owning [`crate::IpcContext`]
//! returns the slots to the handle space on teardown.

use crate::capability::Handle;
use crate::config::MAX_CAPS_PER_MSG;
use crate::error::{IpcError, KernelError, Result};
use crate::transport::HandleSpace;

/// Per-context pool of receive slots
#[derive(Debug)]
pub struct ReceiveWindow {
    slots: [Handle; MAX_CAPS_PER_MSG],
    reserved: usize,
}

impl ReceiveWindow {
    /// Reserve the full window
    ///
    /// Fails with [`IpcError::WindowExhausted`] when the domain has no handle
    /// quota left; slots reserved so far are released again.
    pub fn init<S: HandleSpace + ?Sized>(space: &S) -> Result<Self> {
        let mut window = Self {
            slots: [Handle::NULL; MAX_CAPS_PER_MSG],
            reserved: 0,
        };

        for idx in 0..MAX_CAPS_PER_MSG {
            match space.alloc_slot() {
                Ok(slot) => {
                    window.slots[idx] = slot;
                    window.reserved += 1;
                }
                Err(err) => {
                    log::error!("receive window: slot {} allocation failed: {}", idx, err);
                    let reserved = window.reserved;
                    window.release(space);
                    return Err(IpcError::WindowExhausted {
                        reserved,
                        needed: MAX_CAPS_PER_MSG,
                    });
                }
            }
        }

        Ok(window)
    }

    /// Handle of slot `index`
    pub fn slot(&self, index: usize) -> Handle {
        if index < self.reserved {
            self.slots[index]
        } else {
            Handle::NULL
        }
    }

    /// All reserved slots, in the order the kernel fills them
    pub fn handles(&self) -> &[Handle] {
        &self.slots[..self.reserved]
    }

    /// The first `count` slots (clamped to the window)
    pub fn open(&self, count: usize) -> &[Handle] {
        &self.slots[..count.min(self.reserved)]
    }

    /// Empty slots ready for the next receive
    pub fn free_slots(&self) -> usize {
        self.reserved
    }

    /// Take ownership of what landed in slot `index`
    ///
    /// A replacement slot is allocated first; on failure the slot and its
    /// content stay in the window and the caller is expected to [`reclaim`]
    /// it.
    ///
    /// [`reclaim`]: ReceiveWindow::reclaim
    pub fn consume<S: HandleSpace + ?Sized>(
        &mut self,
        space: &S,
        index: usize,
    ) -> core::result::Result<Handle, KernelError> {
        if index >= self.reserved {
            return Err(KernelError::InvalidCapability);
        }
        let replacement = space.alloc_slot()?;
        let landed = core::mem::replace(&mut self.slots[index], replacement);
        Ok(landed)
    }

    /// Delete whatever landed in slot `index`, keeping the reservation
    pub fn reclaim<S: HandleSpace + ?Sized>(&self, space: &S, index: usize) {
        if index < self.reserved {
            space.clear_slot(self.slots[index]);
        }
    }

    /// Return every slot to the handle space
    pub fn release<S: HandleSpace + ?Sized>(&mut self, space: &S) {
        for slot in &self.slots[..self.reserved] {
            space.free_slot(*slot);
        }
        self.slots = [Handle::NULL; MAX_CAPS_PER_MSG];
        self.reserved = 0;
    }
}
