//! seL4-style backend
//!
//! ## Register Image
//!
//! ```text
//! tag (MessageInfo)   label | caps_unwrapped | extra_caps | length
//!                     63..14  13..10           9..7         6..0
//! mrs[0..120]         message registers
//! caps_or_badges[]    outgoing: capability pointers to transfer
//!                     incoming: badge of each unwrapped capability
//! ```
//!
//! The label is [`SEL4_LABEL_BITS`] wide; higher bits are masked off when a tag
//! is built.
//!
//! A received capability is either *unwrapped* (the invoked endpoint belongs
//! to the receiver, so the kernel only reports the badge) or transferred into
//! the next receive slot. Reply and wait are one `ReplyRecv` syscall.
//!
//! Badges are compared on their low [`SEL4_BADGE_BITS`] bits.

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::capability::Handle;
use crate::config::{Word, HEADER_WORDS, MAX_CAPS_PER_MSG, MAX_MSG_WORDS};
use crate::error::KernelError;
use crate::transport::{HandleSpace, Incoming, Registers, Transport};

/// Number of message registers
pub const SEL4_MSG_MAX_LENGTH: usize = 120;

/// Extra capabilities per message
pub const SEL4_MSG_MAX_EXTRA_CAPS: usize = MAX_CAPS_PER_MSG;

/// Significant badge bits
pub const SEL4_BADGE_BITS: u32 = 28;

const_assert!(SEL4_MSG_MAX_LENGTH <= MAX_MSG_WORDS);
const_assert!(HEADER_WORDS + SEL4_MSG_MAX_EXTRA_CAPS + 1 < SEL4_MSG_MAX_LENGTH);
const_assert!(SEL4_MSG_MAX_EXTRA_CAPS <= 4);

bitflags! {
    /// Which extra capabilities arrived unwrapped
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapsUnwrapped: u8 {
        const CAP0 = 1 << 0;
        const CAP1 = 1 << 1;
        const CAP2 = 1 << 2;
        const CAP3 = 1 << 3;
    }
}

impl CapsUnwrapped {
    pub fn index(idx: usize) -> Self {
        Self::from_bits_truncate(1 << idx)
    }
}

const LENGTH_BITS: u32 = 7;
const EXTRA_CAPS_SHIFT: u32 = LENGTH_BITS;
const EXTRA_CAPS_BITS: u32 = 3;
const UNWRAPPED_SHIFT: u32 = EXTRA_CAPS_SHIFT + EXTRA_CAPS_BITS;
const UNWRAPPED_BITS: u32 = 4;
const LABEL_SHIFT: u32 = UNWRAPPED_SHIFT + UNWRAPPED_BITS;

/// Width of the message label
pub const SEL4_LABEL_BITS: u32 = Word::BITS - LABEL_SHIFT;

const fn field(word: Word, shift: u32, bits: u32) -> Word {
    (word >> shift) & ((1 << bits) - 1)
}

/// Message tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageInfo(Word);

impl MessageInfo {
    pub const fn new(label: Word, caps_unwrapped: u8, extra_caps: usize, length: usize) -> Self {
        Self(
            (field(label, 0, SEL4_LABEL_BITS) << LABEL_SHIFT)
                | (((caps_unwrapped as Word) & 0xF) << UNWRAPPED_SHIFT)
                | (((extra_caps as Word) & 0x7) << EXTRA_CAPS_SHIFT)
                | ((length as Word) & 0x7F),
        )
    }

    pub const fn raw(self) -> Word {
        self.0
    }

    pub const fn label(self) -> Word {
        self.0 >> LABEL_SHIFT
    }

    pub fn caps_unwrapped(self) -> CapsUnwrapped {
        CapsUnwrapped::from_bits_truncate(field(self.0, UNWRAPPED_SHIFT, UNWRAPPED_BITS) as u8)
    }

    pub const fn extra_caps(self) -> usize {
        field(self.0, EXTRA_CAPS_SHIFT, EXTRA_CAPS_BITS) as usize
    }

    pub const fn length(self) -> usize {
        field(self.0, 0, LENGTH_BITS) as usize
    }

    fn with(self, caps_unwrapped: CapsUnwrapped, extra_caps: usize, length: usize) -> Self {
        Self::new(self.label(), caps_unwrapped.bits(), extra_caps, length)
    }
}

/// IPC buffer of one thread
#[derive(Clone)]
pub struct Sel4Ipc {
    pub tag: MessageInfo,
    pub mrs: [Word; SEL4_MSG_MAX_LENGTH],
    pub caps_or_badges: [Word; SEL4_MSG_MAX_EXTRA_CAPS],
}

impl Sel4Ipc {
    /// Outgoing capability pointers
    pub fn transfers(&self) -> impl Iterator<Item = Handle> + '_ {
        self.caps_or_badges[..self.tag.extra_caps()]
            .iter()
            .map(|raw| Handle::new(*raw))
    }

    /// Record an unwrapped capability delivered with badge `badge`
    pub fn deliver_unwrapped(&mut self, badge: Word) {
        let idx = self.tag.extra_caps();
        self.caps_or_badges[idx] = badge;
        let unwrapped = self.tag.caps_unwrapped() | CapsUnwrapped::index(idx);
        self.tag = self.tag.with(unwrapped, idx + 1, self.tag.length());
    }

    /// Record a capability transferred into the next receive slot
    pub fn deliver_transferred(&mut self) {
        let idx = self.tag.extra_caps();
        self.caps_or_badges[idx] = 0;
        self.tag = self.tag.with(self.tag.caps_unwrapped(), idx + 1, self.tag.length());
    }

    /// Replace the message registers with `words`
    pub fn set_mrs(&mut self, words: &[Word]) {
        let len = words.len().min(SEL4_MSG_MAX_LENGTH);
        self.mrs[..len].copy_from_slice(&words[..len]);
        self.tag = self.tag.with(self.tag.caps_unwrapped(), self.tag.extra_caps(), len);
    }
}

impl Registers for Sel4Ipc {
    const WORDS: usize = SEL4_MSG_MAX_LENGTH;

    fn new() -> Self {
        Self {
            tag: MessageInfo::default(),
            mrs: [0; SEL4_MSG_MAX_LENGTH],
            caps_or_badges: [0; SEL4_MSG_MAX_EXTRA_CAPS],
        }
    }

    fn clear(&mut self) {
        self.tag = MessageInfo::default();
    }

    fn push_word(&mut self, word: Word) {
        let len = self.tag.length();
        self.mrs[len] = word;
        self.tag = self.tag.with(self.tag.caps_unwrapped(), self.tag.extra_caps(), len + 1);
    }

    fn push_transfer(&mut self, handle: Handle) {
        let idx = self.tag.extra_caps();
        self.caps_or_badges[idx] = handle.raw();
        self.tag = self.tag.with(self.tag.caps_unwrapped(), idx + 1, self.tag.length());
    }

    fn words(&self) -> &[Word] {
        &self.mrs[..self.tag.length()]
    }

    fn incoming_count(&self) -> usize {
        self.tag.extra_caps()
    }

    fn incoming(&self, index: usize) -> Option<Incoming> {
        if index >= self.tag.extra_caps() {
            return None;
        }
        let unwrapped = self.tag.caps_unwrapped();
        if unwrapped.contains(CapsUnwrapped::index(index)) {
            return Some(Incoming::Unwrapped {
                badge: self.caps_or_badges[index],
            });
        }
        let slot = (0..index)
            .filter(|i| !unwrapped.contains(CapsUnwrapped::index(*i)))
            .count();
        Some(Incoming::Delegated { slot })
    }
}

/// seL4 syscalls used by the transport
pub trait Sel4Syscalls {
    /// Allocate an empty CSpace slot
    fn cspace_alloc(&self) -> Result<Handle, KernelError>;

    fn cspace_free(&self, slot: Handle);

    fn cnode_delete(&self, slot: Handle);

    /// `seL4_Call`
    fn call(&self, dest: Handle, ipc: &mut Sel4Ipc, recv_slots: &[Handle]) -> Result<(), KernelError>;

    /// `seL4_ReplyRecv`, or plain `seL4_Recv` when `reply` is false
    ///
    /// Returns the badge of the invoked endpoint capability.
    fn reply_recv(&self, ipc: &mut Sel4Ipc, reply: bool, recv_slots: &[Handle]) -> Result<Word, KernelError>;
}

/// [`Transport`] over seL4-style syscalls
pub struct Sel4Transport<K> {
    kernel: K,
}

impl<K: Sel4Syscalls> Sel4Transport<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: Sel4Syscalls> HandleSpace for Sel4Transport<K> {
    fn alloc_slot(&self) -> Result<Handle, KernelError> {
        self.kernel.cspace_alloc()
    }

    fn free_slot(&self, slot: Handle) {
        self.kernel.cnode_delete(slot);
        self.kernel.cspace_free(slot);
    }

    fn clear_slot(&self, slot: Handle) {
        self.kernel.cnode_delete(slot);
    }
}

impl<K: Sel4Syscalls> Transport for Sel4Transport<K> {
    type Registers = Sel4Ipc;

    const NAME: &'static str = "sel4";
    const LABEL_MASK: Word = (1 << SEL4_BADGE_BITS) - 1;
    const ATOMIC_REPLY_WAIT: bool = true;

    fn call(&self, dest: Handle, regs: &mut Sel4Ipc, window: &[Handle]) -> Result<(), KernelError> {
        self.kernel.call(dest, regs, window)
    }

    fn reply_and_wait(&self, regs: &mut Sel4Ipc, reply: bool, window: &[Handle]) -> Result<Word, KernelError> {
        self.kernel.reply_recv(regs, reply, window)
    }
}
