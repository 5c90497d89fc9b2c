//! Kernel state: domains, handles, objects and endpoints

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use kaal_ipc::{Handle, KernelError, Word};
use spin::Mutex;

use crate::thread::MockThread;
use crate::MockError;

/// Protection domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjectId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EndpointId(usize);

/// Message as it travels through the kernel
#[derive(Debug, Default)]
pub(crate) struct Message {
    pub(crate) words: Vec<Word>,
    pub(crate) objects: Vec<ObjectId>,
}

/// A pending call queued on an endpoint
pub(crate) struct Request {
    pub(crate) label: Word,
    pub(crate) message: Message,
    pub(crate) reply: Sender<Message>,
}

/// How one transferred object reached the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivered {
    /// Receiver owns the object; `handle` is its own handle for it
    Owned { label: Word, handle: Handle },
    /// Installed into a receive-window slot
    Landed { handle: Handle },
}

#[derive(Debug, Default)]
pub(crate) struct Delivery {
    pub(crate) words: Vec<Word>,
    pub(crate) items: Vec<Delivered>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Object(ObjectId),
}

struct Domain {
    name: String,
    quota: usize,
    next_handle: Word,
    handles: BTreeMap<Word, Slot>,
}

struct Object {
    owner: DomainId,
    endpoint: EndpointId,
    label: Word,
}

struct Endpoint {
    tx: Sender<Request>,
    rx: Receiver<Request>,
    alive: bool,
}

#[derive(Default)]
struct State {
    domains: Vec<Domain>,
    objects: Vec<Object>,
    endpoints: Vec<Endpoint>,
}

impl State {
    fn domain(&self, id: DomainId) -> &Domain {
        &self.domains[id.0]
    }

    fn domain_mut(&mut self, id: DomainId) -> &mut Domain {
        &mut self.domains[id.0]
    }

    fn resolve(&self, domain: DomainId, handle: Handle) -> Option<ObjectId> {
        match self.domain(domain).handles.get(&handle.raw()) {
            Some(Slot::Object(id)) => Some(*id),
            _ => None,
        }
    }

    fn alloc(&mut self, domain: DomainId) -> Result<Handle, KernelError> {
        let pd = self.domain_mut(domain);
        if pd.handles.len() >= pd.quota {
            log::debug!("mock kernel: domain '{}' out of handles ({})", pd.name, pd.quota);
            return Err(KernelError::OutOfHandles);
        }
        let raw = pd.next_handle;
        pd.next_handle += 1;
        pd.handles.insert(raw, Slot::Empty);
        Ok(Handle::new(raw))
    }

    fn owned_handle(&self, domain: DomainId, object: ObjectId) -> Option<Handle> {
        self.domain(domain)
            .handles
            .iter()
            .find(|(_, slot)| **slot == Slot::Object(object))
            .map(|(raw, _)| Handle::new(*raw))
    }
}

/// Shared handle to the simulated kernel
#[derive(Clone)]
pub struct MockKernel {
    state: Arc<Mutex<State>>,
    syscalls: Arc<AtomicUsize>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            syscalls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a protection domain that may hold up to `quota` handles
    pub fn create_domain(&self, name: &str, quota: usize) -> DomainId {
        let mut state = self.state.lock();
        state.domains.push(Domain {
            name: name.to_string(),
            quota,
            next_handle: 1,
            handles: BTreeMap::new(),
        });
        DomainId(state.domains.len() - 1)
    }

    /// Thread that only issues calls
    pub fn client(&self, domain: DomainId) -> MockThread {
        MockThread::new(self.clone(), domain, None)
    }

    /// Thread with its own endpoint, able to create and serve objects
    pub fn server(&self, domain: DomainId) -> MockThread {
        let (tx, rx) = unbounded();
        let endpoint = {
            let mut state = self.state.lock();
            state.endpoints.push(Endpoint {
                tx,
                rx: rx.clone(),
                alive: true,
            });
            EndpointId(state.endpoints.len() - 1)
        };
        MockThread::new(self.clone(), domain, Some((endpoint, rx)))
    }

    /// Copy the capability at `handle` of domain `from` into domain `to`
    pub fn grant(&self, from: DomainId, handle: Handle, to: DomainId) -> Result<Handle, MockError> {
        let mut state = self.state.lock();
        let object = state
            .resolve(from, handle)
            .ok_or(MockError::UnknownHandle(handle))?;
        let granted = state.alloc(to)?;
        state
            .domain_mut(to)
            .handles
            .insert(granted.raw(), Slot::Object(object));
        Ok(granted)
    }

    /// Handles (empty slots included) held by `domain`
    pub fn handle_count(&self, domain: DomainId) -> usize {
        self.state.lock().domain(domain).handles.len()
    }

    /// Kernel entries made through IPC syscalls so far
    pub fn syscalls(&self) -> usize {
        self.syscalls.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) {
        self.syscalls.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn alloc_handle(&self, domain: DomainId) -> Result<Handle, KernelError> {
        self.state.lock().alloc(domain)
    }

    pub(crate) fn free_handle(&self, domain: DomainId, handle: Handle) {
        self.state.lock().domain_mut(domain).handles.remove(&handle.raw());
    }

    pub(crate) fn clear_handle(&self, domain: DomainId, handle: Handle) {
        if let Some(slot) = self.state.lock().domain_mut(domain).handles.get_mut(&handle.raw()) {
            *slot = Slot::Empty;
        }
    }

    pub(crate) fn create_object(
        &self,
        domain: DomainId,
        endpoint: EndpointId,
        label: Word,
    ) -> Result<Handle, KernelError> {
        let mut state = self.state.lock();
        let handle = state.alloc(domain)?;
        state.objects.push(Object {
            owner: domain,
            endpoint,
            label,
        });
        let object = ObjectId(state.objects.len() - 1);
        state
            .domain_mut(domain)
            .handles
            .insert(handle.raw(), Slot::Object(object));
        log::trace!("mock kernel: object {:#x} at {:?}", label, handle);
        Ok(handle)
    }

    /// Resolve a call destination to its endpoint queue and label
    pub(crate) fn lookup_destination(
        &self,
        domain: DomainId,
        dest: Handle,
    ) -> Result<(Sender<Request>, Word), KernelError> {
        let state = self.state.lock();
        let object = state
            .resolve(domain, dest)
            .ok_or(KernelError::InvalidCapability)?;
        let object = &state.objects[object.0];
        let endpoint = &state.endpoints[object.endpoint.0];
        if !endpoint.alive {
            return Err(KernelError::InvalidCapability);
        }
        Ok((endpoint.tx.clone(), object.label))
    }

    /// Turn the sender's transfer handles into objects
    ///
    /// Stops at the first handle that does not resolve; later capabilities
    /// are not transferred.
    pub(crate) fn collect_transfers(
        &self,
        domain: DomainId,
        handles: impl IntoIterator<Item = Handle>,
    ) -> Vec<ObjectId> {
        let state = self.state.lock();
        let mut objects = Vec::new();
        for handle in handles {
            match state.resolve(domain, handle) {
                Some(object) => objects.push(object),
                None => {
                    log::debug!("mock kernel: transfer of empty handle {:?}, stopping", handle);
                    break;
                }
            }
        }
        objects
    }

    /// Hand `message` to `domain`, installing delegated objects into `window`
    ///
    /// Objects beyond the open window slots are dropped.
    pub(crate) fn deliver(&self, domain: DomainId, message: Message, window: &[Handle]) -> Delivery {
        let mut state = self.state.lock();
        let mut items = Vec::with_capacity(message.objects.len());
        let mut slots = window.iter();

        for object in message.objects {
            if state.objects[object.0].owner == domain {
                if let Some(handle) = state.owned_handle(domain, object) {
                    items.push(Delivered::Owned {
                        label: state.objects[object.0].label,
                        handle,
                    });
                    continue;
                }
            }

            let Some(slot) = slots.next() else {
                log::debug!("mock kernel: no receive slot left, dropping transfer");
                break;
            };
            match state.domain_mut(domain).handles.get_mut(&slot.raw()) {
                Some(entry) => {
                    *entry = Slot::Object(object);
                    items.push(Delivered::Landed { handle: *slot });
                }
                None => {
                    log::debug!("mock kernel: receive slot {:?} not reserved", slot);
                    break;
                }
            }
        }

        Delivery {
            words: message.words,
            items,
        }
    }

    /// Mark an endpoint dead and fail every queued caller
    pub(crate) fn shutdown_endpoint(&self, endpoint: EndpointId) {
        let rx = {
            let mut state = self.state.lock();
            let ep = &mut state.endpoints[endpoint.0];
            ep.alive = false;
            ep.rx.clone()
        };
        // Dropping the requests drops their reply senders
        let drained = rx.try_iter().count();
        if drained > 0 {
            log::debug!("mock kernel: dropped {} queued calls on teardown", drained);
        }
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}
