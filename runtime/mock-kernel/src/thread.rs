//! Simulated threads and their blocking IPC operations

use std::cell::RefCell;

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};
use kaal_ipc::{Handle, KernelError, Word};

use crate::kernel::{Delivery, EndpointId, Message, MockKernel, Request};
use crate::{DomainId, MockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Cancel,
    Teardown,
}

/// Remote control for a thread blocked in the kernel
#[derive(Clone)]
pub struct ThreadControl {
    tx: Sender<Control>,
}

impl ThreadControl {
    /// Unblock the thread's current (or next) blocking operation
    pub fn cancel(&self) {
        let _ = self.tx.send(Control::Cancel);
    }

    /// End the thread's server loop
    pub fn teardown(&self) {
        let _ = self.tx.send(Control::Teardown);
    }
}

/// One thread of a protection domain
pub struct MockThread {
    kernel: MockKernel,
    domain: DomainId,
    endpoint: Option<(EndpointId, Receiver<Request>)>,
    caller: RefCell<Option<Sender<Message>>>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl MockThread {
    pub(crate) fn new(
        kernel: MockKernel,
        domain: DomainId,
        endpoint: Option<(EndpointId, Receiver<Request>)>,
    ) -> Self {
        let (control_tx, control_rx) = unbounded();
        Self {
            kernel,
            domain,
            endpoint,
            caller: RefCell::new(None),
            control_tx,
            control_rx,
        }
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn kernel(&self) -> &MockKernel {
        &self.kernel
    }

    pub fn control(&self) -> ThreadControl {
        ThreadControl {
            tx: self.control_tx.clone(),
        }
    }

    /// Create an object served by this thread's endpoint, labelled `key`
    pub fn create_object(&self, key: Word) -> Result<Handle, MockError> {
        let (endpoint, _) = self.endpoint.as_ref().ok_or(MockError::NotAServer)?;
        Ok(self.kernel.create_object(self.domain, *endpoint, key)?)
    }

    pub(crate) fn alloc_handle(&self) -> Result<Handle, KernelError> {
        self.kernel.alloc_handle(self.domain)
    }

    pub(crate) fn free_handle(&self, handle: Handle) {
        self.kernel.free_handle(self.domain, handle)
    }

    pub(crate) fn clear_handle(&self, handle: Handle) {
        self.kernel.clear_handle(self.domain, handle)
    }

    /// Send to the object at `dest` and block for its reply
    pub(crate) fn call_endpoint(
        &self,
        dest: Handle,
        words: Vec<Word>,
        transfers: Vec<Handle>,
        window: &[Handle],
    ) -> Result<Delivery, KernelError> {
        self.kernel.enter();

        let (queue, label) = self.kernel.lookup_destination(self.domain, dest)?;
        let message = Message {
            words,
            objects: self.kernel.collect_transfers(self.domain, transfers),
        };

        let (reply_tx, reply_rx) = bounded(1);
        queue
            .send(Request {
                label,
                message,
                reply: reply_tx,
            })
            .map_err(|_| KernelError::Disconnected)?;

        select! {
            recv(reply_rx) -> reply => match reply {
                Ok(message) => Ok(self.kernel.deliver(self.domain, message, window)),
                Err(_) => Err(KernelError::Disconnected),
            },
            recv(self.control_rx) -> control => Err(Self::interrupted(control.ok())),
        }
    }

    /// Answer the caller of the last received request
    ///
    /// Not a kernel entry of its own; personalities account for it.
    pub(crate) fn reply_to_caller(&self, words: Vec<Word>, transfers: Vec<Handle>) -> Result<(), KernelError> {
        let caller = self.caller.borrow_mut().take().ok_or(KernelError::InvalidCapability)?;
        let message = Message {
            words,
            objects: self.kernel.collect_transfers(self.domain, transfers),
        };
        caller.send(message).map_err(|_| KernelError::Disconnected)
    }

    /// Forget the last caller without answering it
    pub(crate) fn drop_caller(&self) {
        if self.caller.borrow_mut().take().is_some() {
            log::trace!("mock kernel: caller dropped without reply");
        }
    }

    /// Block on this thread's endpoint for the next request
    pub(crate) fn wait_endpoint(&self, window: &[Handle]) -> Result<(Word, Delivery), KernelError> {
        self.kernel.enter();

        let Some((endpoint, queue)) = self.endpoint.as_ref() else {
            return Err(KernelError::InvalidCapability);
        };

        select! {
            recv(queue) -> request => match request {
                Ok(request) => {
                    *self.caller.borrow_mut() = Some(request.reply);
                    let delivery = self.kernel.deliver(self.domain, request.message, window);
                    Ok((request.label, delivery))
                }
                Err(_) => Err(KernelError::Disconnected),
            },
            recv(self.control_rx) -> control => {
                let err = Self::interrupted(control.ok());
                if err == KernelError::TornDown {
                    self.drop_caller();
                    self.kernel.shutdown_endpoint(*endpoint);
                }
                Err(err)
            }
        }
    }

    fn interrupted(control: Option<Control>) -> KernelError {
        match control {
            Some(Control::Cancel) => KernelError::Canceled,
            Some(Control::Teardown) => KernelError::TornDown,
            None => KernelError::Disconnected,
        }
    }
}
