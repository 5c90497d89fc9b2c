//! Kernel transport contract
//!
//! Every kernel backend implements [`Transport`]; the wire codec, client call
//! and server loop are written once against it. A backend supplies:
//!
//! - a register image ([`Registers`]) with its word budget and its way of
//!   describing capability transfers
//! - handle management for receive-window slots ([`HandleSpace`])
//! - the blocking call and reply-and-wait primitives

use crate::capability::Handle;
use crate::config::Word;
use crate::error::KernelError;

/// Allocation of domain-local handle slots
pub trait HandleSpace {
    /// Reserve an empty slot
    fn alloc_slot(&self) -> Result<Handle, KernelError>;

    /// Give a reserved slot back to the domain
    fn free_slot(&self, slot: Handle);

    /// Delete whatever capability occupies `slot`, keeping the reservation
    fn clear_slot(&self, slot: Handle);
}

/// How the kernel delivered one received capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// The object is owned by the receiver; the kernel reports its badge
    Unwrapped { badge: Word },
    /// The object was already present; the kernel names the local handle
    Translated { handle: Handle },
    /// A new handle landed in receive-window slot `slot`
    Delegated { slot: usize },
}

/// Backend register image exchanged with the kernel
pub trait Registers {
    /// Register budget in words
    const WORDS: usize;

    fn new() -> Self;

    /// Drop all words and transfer descriptors
    fn clear(&mut self);

    /// Append one message word
    fn push_word(&mut self, word: Word);

    /// Append a transfer descriptor delegating the capability at `handle`
    fn push_transfer(&mut self, handle: Handle);

    /// Message words in order
    fn words(&self) -> &[Word];

    /// Number of transfer items delivered with the message
    fn incoming_count(&self) -> usize;

    /// Delivery of transfer item `index`
    fn incoming(&self, index: usize) -> Option<Incoming>;
}

/// Kernel IPC backend
pub trait Transport: HandleSpace {
    type Registers: Registers;

    /// Backend name for diagnostics
    const NAME: &'static str;

    /// Bits of badge and label compared during authentication
    const LABEL_MASK: Word;

    /// Whether reply and wait enter the kernel as one primitive
    const ATOMIC_REPLY_WAIT: bool;

    /// Send `regs` to `dest` and block for the reply
    ///
    /// On success the reply has overwritten `regs`. Capabilities in the reply
    /// land in `window` slots.
    fn call(
        &self,
        dest: Handle,
        regs: &mut Self::Registers,
        window: &[Handle],
    ) -> Result<(), KernelError>;

    /// Optionally answer the last caller with `regs`, then block for the next
    /// request
    ///
    /// On success the request has overwritten `regs` and the transport-enforced
    /// label of the invoked capability is returned.
    fn reply_and_wait(
        &self,
        regs: &mut Self::Registers,
        reply: bool,
        window: &[Handle],
    ) -> Result<Word, KernelError>;
}
