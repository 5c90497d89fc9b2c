//! Per-thread IPC execution context
//!
//! Bundles what one thread needs to take part in IPC: its kernel transport,
//! its receive window and a reference to the process capability space. The
//! context is passed explicitly to the codec, client call and server loop; it
//! is never shared between concurrent operations.

use crate::cap_space::{Binding, CapSpace};
use crate::capability::{Capability, Handle, ObjectKey};
use crate::error::Result;
use crate::receive_window::ReceiveWindow;
use crate::transport::Transport;

pub struct IpcContext<'cs, T: Transport> {
    transport: T,
    caps: &'cs CapSpace,
    window: ReceiveWindow,
}

impl<'cs, T: Transport> IpcContext<'cs, T> {
    /// Create a context and reserve its receive window
    pub fn new(transport: T, caps: &'cs CapSpace) -> Result<Self> {
        let window = ReceiveWindow::init(&transport)?;
        log::debug!(
            "ipc context ({}): receive window {:?}",
            T::NAME,
            window.handles()
        );
        Ok(Self {
            transport,
            caps,
            window,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn caps(&self) -> &'cs CapSpace {
        self.caps
    }

    pub fn window(&self) -> &ReceiveWindow {
        &self.window
    }

    /// Register a capability obtained outside IPC (e.g. from the parent)
    ///
    /// Returns the capability the key is bound to, which is the existing one
    /// if the key was known already.
    pub fn import(&self, key: ObjectKey, handle: Handle) -> Result<Capability> {
        let binding = self.caps.bind(Capability::new(key, handle))?;
        if let Binding::Existing(existing) = binding {
            if existing.handle() != handle {
                log::debug!(
                    "ipc context: {:?} already bound to {:?}, keeping it",
                    key,
                    existing.handle()
                );
            }
        }
        Ok(binding.capability())
    }

    pub(crate) fn parts(&mut self) -> (&T, &'cs CapSpace, &mut ReceiveWindow) {
        (&self.transport, self.caps, &mut self.window)
    }
}

impl<T: Transport> Drop for IpcContext<'_, T> {
    fn drop(&mut self) {
        self.window.release(&self.transport);
    }
}
