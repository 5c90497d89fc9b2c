//! NOVA-style backend
//!
//! The UTCB carries untyped message words followed by typed items. Each typed
//! item holds a capability range descriptor (CRD). Outgoing items delegate the
//! selector in their CRD. Incoming items are either *translated* (the object
//! is already present in the receiver, the CRD names its selector) or
//! *delegated* into the next receive-window selector.
//!
//! Portal ids are full words, so badge and label are compared in full.
//! Reply and wait are two syscalls: `reply` to the last caller, then `wait`
//! for the next request.

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::capability::Handle;
use crate::config::{Word, HEADER_WORDS, MAX_CAPS_PER_MSG, MAX_MSG_WORDS};
use crate::error::KernelError;
use crate::transport::{HandleSpace, Incoming, Registers, Transport};

/// Untyped words available in the UTCB (the rest is taken by typed items and
/// the header)
pub const NOVA_UNTYPED_WORDS: usize = 480;

const_assert!(NOVA_UNTYPED_WORDS <= MAX_MSG_WORDS);
const_assert!(HEADER_WORDS + MAX_CAPS_PER_MSG + 1 < NOVA_UNTYPED_WORDS);

bitflags! {
    /// Object capability permissions in a CRD
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CrdRights: u8 {
        const CTRL = 1 << 0;
        const CALL = 1 << 1;
        const UP = 1 << 2;
        const DOWN = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdKind {
    Null,
    Obj,
}

/// Capability range descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crd {
    pub kind: CrdKind,
    pub base: Word,
    pub order: u8,
    pub rights: CrdRights,
}

impl Crd {
    pub const NULL: Crd = Crd {
        kind: CrdKind::Null,
        base: 0,
        order: 0,
        rights: CrdRights::empty(),
    };

    /// Single object selector with all rights
    pub const fn obj(sel: Handle) -> Self {
        Self {
            kind: CrdKind::Obj,
            base: sel.raw(),
            order: 0,
            rights: CrdRights::all(),
        }
    }

    pub const fn selector(&self) -> Handle {
        Handle::new(self.base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Delegate,
    Translate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedItem {
    pub crd: Crd,
    pub kind: ItemKind,
}

impl TypedItem {
    const EMPTY: TypedItem = TypedItem {
        crd: Crd::NULL,
        kind: ItemKind::Delegate,
    };
}

/// User thread control block (message part)
#[derive(Clone)]
pub struct Utcb {
    untyped: usize,
    words: [Word; NOVA_UNTYPED_WORDS],
    typed: usize,
    items: [TypedItem; MAX_CAPS_PER_MSG],
}

impl Utcb {
    pub fn untyped(&self) -> usize {
        self.untyped
    }

    pub fn items(&self) -> &[TypedItem] {
        &self.items[..self.typed]
    }

    /// Replace the untyped words
    pub fn set_untyped(&mut self, words: &[Word]) {
        let len = words.len().min(NOVA_UNTYPED_WORDS);
        self.words[..len].copy_from_slice(&words[..len]);
        self.untyped = len;
    }

    /// Drop all typed items
    pub fn clear_items(&mut self) {
        self.typed = 0;
    }

    /// Append a received item; returns false once the item area is full
    pub fn append_item(&mut self, item: TypedItem) -> bool {
        if self.typed >= MAX_CAPS_PER_MSG {
            return false;
        }
        self.items[self.typed] = item;
        self.typed += 1;
        true
    }
}

impl Registers for Utcb {
    const WORDS: usize = NOVA_UNTYPED_WORDS;

    fn new() -> Self {
        Self {
            untyped: 0,
            words: [0; NOVA_UNTYPED_WORDS],
            typed: 0,
            items: [TypedItem::EMPTY; MAX_CAPS_PER_MSG],
        }
    }

    fn clear(&mut self) {
        self.untyped = 0;
        self.typed = 0;
    }

    fn push_word(&mut self, word: Word) {
        self.words[self.untyped] = word;
        self.untyped += 1;
    }

    fn push_transfer(&mut self, handle: Handle) {
        self.append_item(TypedItem {
            crd: Crd::obj(handle),
            kind: ItemKind::Delegate,
        });
    }

    fn words(&self) -> &[Word] {
        &self.words[..self.untyped]
    }

    fn incoming_count(&self) -> usize {
        self.typed
    }

    fn incoming(&self, index: usize) -> Option<Incoming> {
        let item = self.items().get(index)?;
        match item.kind {
            ItemKind::Translate => Some(Incoming::Translated {
                handle: item.crd.selector(),
            }),
            ItemKind::Delegate => {
                let slot = self.items()[..index]
                    .iter()
                    .filter(|prev| prev.kind == ItemKind::Delegate)
                    .count();
                Some(Incoming::Delegated { slot })
            }
        }
    }
}

/// NOVA syscalls used by the transport
pub trait NovaSyscalls {
    /// Allocate a free capability selector
    fn sel_alloc(&self) -> Result<Handle, KernelError>;

    fn sel_free(&self, sel: Handle);

    /// Revoke whatever is mapped at `crd`
    fn revoke(&self, crd: Crd);

    /// Call portal `pt`, the reply overwrites `utcb`
    fn call(&self, pt: Handle, utcb: &mut Utcb, rcv_window: &[Handle]) -> Result<(), KernelError>;

    /// Answer the last caller
    fn reply(&self, utcb: &Utcb) -> Result<(), KernelError>;

    /// Block for the next portal call; returns the portal id
    fn wait(&self, utcb: &mut Utcb, rcv_window: &[Handle]) -> Result<Word, KernelError>;
}

/// [`Transport`] over NOVA-style syscalls
pub struct NovaTransport<K> {
    kernel: K,
}

impl<K: NovaSyscalls> NovaTransport<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: NovaSyscalls> HandleSpace for NovaTransport<K> {
    fn alloc_slot(&self) -> Result<Handle, KernelError> {
        self.kernel.sel_alloc()
    }

    fn free_slot(&self, slot: Handle) {
        self.kernel.revoke(Crd::obj(slot));
        self.kernel.sel_free(slot);
    }

    fn clear_slot(&self, slot: Handle) {
        self.kernel.revoke(Crd::obj(slot));
    }
}

impl<K: NovaSyscalls> Transport for NovaTransport<K> {
    type Registers = Utcb;

    const NAME: &'static str = "nova";
    const LABEL_MASK: Word = Word::MAX;
    const ATOMIC_REPLY_WAIT: bool = false;

    fn call(&self, dest: Handle, regs: &mut Utcb, window: &[Handle]) -> Result<(), KernelError> {
        self.kernel.call(dest, regs, window)
    }

    fn reply_and_wait(&self, regs: &mut Utcb, reply: bool, window: &[Handle]) -> Result<Word, KernelError> {
        if reply {
            // The caller may be gone already
            if let Err(err) = self.kernel.reply(regs) {
                log::debug!("nova: reply failed: {}", err);
            }
        }
        self.kernel.wait(regs, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_transfer_delegates_selector() {
        let mut utcb = <Utcb as Registers>::new();
        utcb.push_word(7);
        utcb.push_transfer(Handle::new(0x40));

        assert_eq!(utcb.words(), &[7]);
        assert_eq!(
            utcb.items(),
            &[TypedItem {
                crd: Crd::obj(Handle::new(0x40)),
                kind: ItemKind::Delegate
            }]
        );
    }

    #[test]
    fn test_incoming_classification() {
        let mut utcb = <Utcb as Registers>::new();
        utcb.append_item(TypedItem {
            crd: Crd::obj(Handle::new(0x10)),
            kind: ItemKind::Translate,
        });
        utcb.append_item(TypedItem {
            crd: Crd::obj(Handle::new(0x20)),
            kind: ItemKind::Delegate,
        });
        utcb.append_item(TypedItem {
            crd: Crd::obj(Handle::new(0x21)),
            kind: ItemKind::Delegate,
        });

        assert_eq!(
            utcb.incoming(0),
            Some(Incoming::Translated {
                handle: Handle::new(0x10)
            })
        );
        assert_eq!(utcb.incoming(1), Some(Incoming::Delegated { slot: 0 }));
        assert_eq!(utcb.incoming(2), Some(Incoming::Delegated { slot: 1 }));
        assert_eq!(utcb.incoming(3), None);
    }

    #[test]
    fn test_item_area_is_bounded() {
        let mut utcb = <Utcb as Registers>::new();
        for i in 0..MAX_CAPS_PER_MSG {
            assert!(utcb.append_item(TypedItem {
                crd: Crd::obj(Handle::new(i as Word + 1)),
                kind: ItemKind::Delegate,
            }));
        }
        assert!(!utcb.append_item(TypedItem::EMPTY));
        assert_eq!(utcb.incoming_count(), MAX_CAPS_PER_MSG);
    }
}
