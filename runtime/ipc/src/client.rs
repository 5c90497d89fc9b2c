//! Client call
//!
//! One synchronous request/reply exchange: encode, one blocking kernel call,
//! decode. The object key of the destination is asserted as the request badge;
//! the server checks it against the label the kernel attaches to the invoked
//! capability.

use crate::capability::Capability;
use crate::config::{Word, MAX_CAPS_PER_MSG};
use crate::context::IpcContext;
use crate::error::{IpcError, KernelError, Result};
use crate::msgbuf::MsgBuf;
use crate::transport::{Registers, Transport};
use crate::wire::{self, MessageKind};

/// Call `destination` with `opcode` and `request`, filling `reply`
///
/// Returns the protocol word of the reply (the RPC exception code). At most
/// `max_reply_caps` capabilities are accepted with the reply.
///
/// # Errors
/// - [`IpcError::Transport`] for an invalid destination (no kernel entry) or
///   any kernel failure other than cancellation
/// - [`IpcError::BlockingCanceled`] if the blocked call was canceled
///
/// Neither is retried.
pub fn call<T: Transport, const REQ: usize, const REP: usize>(
    ctx: &mut IpcContext<'_, T>,
    destination: Capability,
    opcode: Word,
    request: &MsgBuf<REQ>,
    reply: &mut MsgBuf<REP>,
    max_reply_caps: usize,
) -> Result<Word> {
    if !destination.is_valid() {
        log::debug!("ipc call: invalid destination {:?}", destination.key());
        return Err(IpcError::Transport(KernelError::InvalidDestination));
    }

    reply.reset();

    let mut regs = T::Registers::new();
    wire::encode(
        ctx.caps(),
        opcode,
        Some(destination.key()),
        request,
        &mut regs,
    );

    let open = max_reply_caps.min(MAX_CAPS_PER_MSG);
    let result = ctx
        .transport()
        .call(destination.handle(), &mut regs, ctx.window().open(open));

    if let Err(err) = result {
        log::debug!(
            "ipc call ({}): {:?} opcode {:#x} failed: {}",
            T::NAME,
            destination.key(),
            opcode,
            err
        );
        return Err(err.into());
    }

    let decoded = wire::decode(ctx, &regs, MessageKind::Reply, reply);
    Ok(decoded.protocol_word)
}
