//! Scripted in-memory transport for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::vec::Vec;

use crate::capability::Handle;
use crate::config::Word;
use crate::error::KernelError;
use crate::transport::{HandleSpace, Incoming, Registers, Transport};

/// Handle allocator with a fixed quota
pub(crate) struct FakeHandles {
    quota: usize,
    next: Cell<Word>,
    live: RefCell<BTreeSet<Word>>,
    cleared: Cell<usize>,
}

impl FakeHandles {
    pub(crate) fn with_quota(quota: usize) -> Self {
        Self {
            quota,
            next: Cell::new(0x100),
            live: RefCell::new(BTreeSet::new()),
            cleared: Cell::new(0),
        }
    }

    pub(crate) fn in_use(&self) -> usize {
        self.live.borrow().len()
    }

    pub(crate) fn cleared(&self) -> usize {
        self.cleared.get()
    }
}

impl HandleSpace for FakeHandles {
    fn alloc_slot(&self) -> Result<Handle, KernelError> {
        let mut live = self.live.borrow_mut();
        if live.len() >= self.quota {
            return Err(KernelError::OutOfHandles);
        }
        let raw = self.next.get();
        self.next.set(raw + 1);
        live.insert(raw);
        Ok(Handle::new(raw))
    }

    fn free_slot(&self, slot: Handle) {
        self.live.borrow_mut().remove(&slot.raw());
    }

    fn clear_slot(&self, _slot: Handle) {
        self.cleared.set(self.cleared.get() + 1);
    }
}

/// Register image with a small budget and explicit incoming items
#[derive(Debug, Default, Clone)]
pub(crate) struct TestRegs {
    pub(crate) words: Vec<Word>,
    pub(crate) transfers: Vec<Handle>,
    pub(crate) incoming: Vec<Incoming>,
}

impl TestRegs {
    pub(crate) fn delivered(words: &[Word], incoming: &[Incoming]) -> Self {
        Self {
            words: words.to_vec(),
            transfers: Vec::new(),
            incoming: incoming.to_vec(),
        }
    }
}

impl Registers for TestRegs {
    const WORDS: usize = 16;

    fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.words.clear();
        self.transfers.clear();
        self.incoming.clear();
    }

    fn push_word(&mut self, word: Word) {
        self.words.push(word);
    }

    fn push_transfer(&mut self, handle: Handle) {
        self.transfers.push(handle);
    }

    fn words(&self) -> &[Word] {
        &self.words
    }

    fn incoming_count(&self) -> usize {
        self.incoming.len()
    }

    fn incoming(&self, index: usize) -> Option<Incoming> {
        self.incoming.get(index).copied()
    }
}

/// One scripted request for the server side: label plus delivered registers
pub(crate) type ScriptedRequest = Result<(Word, TestRegs), KernelError>;

/// Transport that records what was sent and replays scripted answers
pub(crate) struct ScriptedTransport {
    pub(crate) handles: FakeHandles,
    pub(crate) replies: RefCell<VecDeque<Result<TestRegs, KernelError>>>,
    pub(crate) requests: RefCell<VecDeque<ScriptedRequest>>,
    pub(crate) sent: RefCell<Vec<TestRegs>>,
    pub(crate) calls: Cell<usize>,
}

impl ScriptedTransport {
    pub(crate) fn new(quota: usize) -> Self {
        Self {
            handles: FakeHandles::with_quota(quota),
            replies: RefCell::new(VecDeque::new()),
            requests: RefCell::new(VecDeque::new()),
            sent: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    pub(crate) fn push_reply(&self, reply: Result<TestRegs, KernelError>) {
        self.replies.borrow_mut().push_back(reply);
    }

    pub(crate) fn push_request(&self, request: ScriptedRequest) {
        self.requests.borrow_mut().push_back(request);
    }
}

impl HandleSpace for ScriptedTransport {
    fn alloc_slot(&self) -> Result<Handle, KernelError> {
        self.handles.alloc_slot()
    }

    fn free_slot(&self, slot: Handle) {
        self.handles.free_slot(slot)
    }

    fn clear_slot(&self, slot: Handle) {
        self.handles.clear_slot(slot)
    }
}

impl Transport for ScriptedTransport {
    type Registers = TestRegs;

    const NAME: &'static str = "scripted";
    const LABEL_MASK: Word = 0xFFFF;
    const ATOMIC_REPLY_WAIT: bool = true;

    fn call(&self, _dest: Handle, regs: &mut TestRegs, _window: &[Handle]) -> Result<(), KernelError> {
        self.calls.set(self.calls.get() + 1);
        self.sent.borrow_mut().push(regs.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(KernelError::Disconnected))?;
        *regs = reply;
        Ok(())
    }

    fn reply_and_wait(&self, regs: &mut TestRegs, reply: bool, _window: &[Handle]) -> Result<Word, KernelError> {
        self.calls.set(self.calls.get() + 1);
        if reply {
            self.sent.borrow_mut().push(regs.clone());
        }
        let (label, request) = self
            .requests
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(KernelError::TornDown))?;
        *regs = request;
        Ok(label)
    }
}
