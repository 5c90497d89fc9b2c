//! Wire codec
//!
//! Translates a [`MsgBuf`] plus protocol word to and from a backend register
//! image. The layout is the same for every kernel:
//!
//! ```text
//! word 0            protocol word (opcode or exception code)
//! word 1            capability count N
//! word 2 .. 2+N     object key per capability (INVALID for absent ones)
//! word 2+N          asserted badge (requests only)
//! ...               word-aligned payload
//! ```
//!
//! Object keys travel as plain data. Only valid capabilities get a transfer
//! descriptor, in argument order; the receiver pairs descriptors with the
//! valid keys again.
//!
//! ## Receiving capabilities
//!
//! | Kernel delivery | Local key known | Result |
//! |-----------------|-----------------|--------|
//! | unwrapped       | yes             | existing capability (badge checked) |
//! | unwrapped       | no              | invalid |
//! | translated      | either          | existing or newly bound handle |
//! | delegated       | yes             | existing capability, slot reclaimed |
//! | delegated       | no              | new binding, slot replaced |
//!
//! A repeated key is trusted to name the same object as the capability
//! already bound to it; the new handle is discarded without comparing the
//! two kernel objects.

use crate::cap_space::{Binding, CapSpace};
use crate::capability::{Capability, ObjectKey};
use crate::config::{Word, HEADER_WORDS, INVALID_OBJECT_KEY, MAX_CAPS_PER_MSG};
use crate::context::IpcContext;
use crate::msgbuf::MsgBuf;
use crate::receive_window::ReceiveWindow;
use crate::transport::{HandleSpace, Incoming, Registers, Transport};

/// Words and transfer descriptors written by [`encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCounts {
    pub words: usize,
    pub transfers: usize,
}

/// Direction of a decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Client to server; carries an asserted badge
    Request,
    /// Server to client
    Reply,
}

/// Header information recovered by [`decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub protocol_word: Word,
    /// Asserted badge of a request, [`ObjectKey::INVALID`] for replies
    pub badge: ObjectKey,
}

/// Words `msg` occupies on the wire
pub fn wire_words<const W: usize>(msg: &MsgBuf<W>, badge: bool) -> usize {
    HEADER_WORDS + msg.used_caps() + usize::from(badge) + msg.words().len()
}

/// Marshal `msg` into `regs`
///
/// Capabilities that no longer resolve in `caps` are sent as invalid.
///
/// # Panics
/// If the message exceeds the register budget of `R`. Nothing has been
/// handed to the kernel at that point.
pub fn encode<R: Registers, const W: usize>(
    caps: &CapSpace,
    protocol_word: Word,
    badge: Option<ObjectKey>,
    msg: &MsgBuf<W>,
    regs: &mut R,
) -> WireCounts {
    let total = wire_words(msg, badge.is_some());
    assert!(
        total <= R::WORDS,
        "ipc message of {} words exceeds the register budget of {} words",
        total,
        R::WORDS
    );

    regs.clear();
    regs.push_word(protocol_word);
    regs.push_word(msg.used_caps() as Word);

    let mut transfers = 0;
    for cap in msg.capabilities() {
        if caps.resolves(cap) {
            regs.push_word(cap.key().raw());
            regs.push_transfer(cap.handle());
            transfers += 1;
        } else {
            if cap.is_valid() {
                log::debug!("wire: {:?} no longer resolves, sending invalid capability", cap.key());
            }
            regs.push_word(INVALID_OBJECT_KEY);
        }
    }

    if let Some(badge) = badge {
        regs.push_word(badge.raw());
    }
    for word in msg.words() {
        regs.push_word(*word);
    }

    log::trace!(
        "wire: encoded protocol word {:#x}, {} words, {} transfers",
        protocol_word,
        total,
        transfers
    );
    WireCounts {
        words: total,
        transfers,
    }
}

/// Unmarshal `regs` into `msg`, importing received capabilities
///
/// `msg` is reset first. A payload larger than `msg` is truncated.
pub fn decode<T: Transport, const W: usize>(
    ctx: &mut IpcContext<'_, T>,
    regs: &T::Registers,
    kind: MessageKind,
    msg: &mut MsgBuf<W>,
) -> Decoded {
    msg.reset();
    let (transport, caps, window) = ctx.parts();
    let words = regs.words();

    if words.len() < HEADER_WORDS {
        log::warn!("wire: short message ({} words), no header", words.len());
        return Decoded {
            protocol_word: 0,
            badge: ObjectKey::INVALID,
        };
    }

    let protocol_word = words[0];
    let declared = words[1] as usize;
    if declared > MAX_CAPS_PER_MSG {
        log::warn!("wire: {} capabilities declared, accepting {}", declared, MAX_CAPS_PER_MSG);
    }
    let cap_count = declared.min(MAX_CAPS_PER_MSG);

    let mut next_item = 0;
    for idx in 0..cap_count {
        let key = words
            .get(HEADER_WORDS + idx)
            .map_or(ObjectKey::INVALID, |raw| ObjectKey::new(*raw));
        if !key.is_valid() {
            msg.insert_capability(Capability::invalid());
            continue;
        }

        let item = if next_item < regs.incoming_count() {
            regs.incoming(next_item)
        } else {
            None
        };
        next_item += 1;

        let cap = match item {
            Some(incoming) => import_capability(transport, caps, window, key, incoming),
            None => {
                log::debug!("wire: no transfer item for {:?}", key);
                Capability::invalid()
            }
        };
        msg.insert_capability(cap);
    }

    // word1 is peer-controlled
    let mut payload_start = HEADER_WORDS.saturating_add(declared).min(words.len());
    let badge = match kind {
        MessageKind::Request => match words.get(payload_start) {
            Some(raw) => {
                payload_start += 1;
                ObjectKey::new(*raw)
            }
            None => ObjectKey::INVALID,
        },
        MessageKind::Reply => ObjectKey::INVALID,
    };

    let dropped = msg.set_data_words(&words[payload_start..]);
    if dropped > 0 {
        log::error!(
            "wire: payload truncated, {} words do not fit a {} word buffer",
            dropped,
            msg.capacity_words()
        );
    }

    log::trace!(
        "wire: decoded protocol word {:#x}, {} caps, {} payload words",
        protocol_word,
        msg.used_caps(),
        msg.words().len()
    );
    Decoded {
        protocol_word,
        badge,
    }
}

fn import_capability<T: Transport>(
    transport: &T,
    caps: &CapSpace,
    window: &mut ReceiveWindow,
    key: ObjectKey,
    incoming: Incoming,
) -> Capability {
    match incoming {
        Incoming::Unwrapped { badge } => match caps.find(key) {
            Some(existing) => {
                if badge & T::LABEL_MASK != key.raw() & T::LABEL_MASK {
                    log::warn!("wire: unwrapped badge {:#x} does not match {:?}", badge, key);
                }
                existing
            }
            None => {
                log::warn!("wire: unwrapped {:?} has no local capability", key);
                Capability::invalid()
            }
        },

        Incoming::Translated { handle } => match caps.bind(Capability::new(key, handle)) {
            Ok(Binding::Existing(existing)) => {
                if existing.handle() != handle {
                    log::warn!(
                        "wire: {:?} translated to {:?}, bound to {:?}",
                        key,
                        handle,
                        existing.handle()
                    );
                }
                existing
            }
            Ok(Binding::Inserted(cap)) => cap,
            Err(err) => {
                log::error!("wire: cannot bind translated {:?}: {}", key, err);
                Capability::invalid()
            }
        },

        Incoming::Delegated { slot } => {
            if let Some(existing) = caps.find(key) {
                window.reclaim(transport, slot);
                return existing;
            }

            let landed = match window.consume(transport, slot) {
                Ok(landed) => landed,
                Err(err) => {
                    log::warn!("wire: receive window exhausted ({}), dropping {:?}", err, key);
                    window.reclaim(transport, slot);
                    return Capability::invalid();
                }
            };

            match caps.bind(Capability::new(key, landed)) {
                Ok(Binding::Inserted(cap)) => cap,
                Ok(Binding::Existing(existing)) => {
                    release(transport, landed);
                    existing
                }
                Err(err) => {
                    log::error!("wire: cannot bind delegated {:?}: {}", key, err);
                    release(transport, landed);
                    Capability::invalid()
                }
            }
        }
    }
}

fn release<S: HandleSpace>(space: &S, slot: crate::capability::Handle) {
    space.clear_slot(slot);
    space.free_slot(slot);
}
