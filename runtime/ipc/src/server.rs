//! Server loop
//!
//! A server entrypoint cycles through three states:
//!
//! ```text
//!            +------------------------------------+
//!            v                                    |
//!  REPLY_AND_WAIT --request--> SERVE --reply--> REPLY_AND_WAIT
//!        |   ^                   |
//!        |   +----forged badge---+   (no reply, back to waiting)
//!        |
//!        +--transport error--> WAIT (logged, retried)
//! ```
//!
//! The loop starts with a reply-and-wait that carries the `INVALID_OBJECT`
//! sentinel but has no caller to answer, so the first kernel entry is a pure
//! wait. Every request is authenticated by comparing the badge the client
//! asserted with the label the kernel attached to the capability that was
//! invoked. Requests that fail the check are dropped silently.
//!
//! Only teardown of the execution context ends the loop.

use crate::capability::ObjectKey;
use crate::config::{Word, ENTRYPOINT_BUFFER_WORDS};
use crate::context::IpcContext;
use crate::error::KernelError;
use crate::interface::RpcExceptionCode;
use crate::msgbuf::MsgBuf;
use crate::transport::{Registers, Transport};
use crate::wire::{self, MessageKind};

/// Dispatches one authenticated request
///
/// Receives the authenticated badge, the opcode and the request buffer; writes
/// the reply payload and returns the reply protocol word (exception code).
pub trait Dispatcher<const REQ: usize, const REP: usize> {
    fn dispatch(
        &mut self,
        badge: ObjectKey,
        opcode: Word,
        request: &MsgBuf<REQ>,
        reply: &mut MsgBuf<REP>,
    ) -> Word;
}

impl<F, const REQ: usize, const REP: usize> Dispatcher<REQ, REP> for F
where
    F: FnMut(ObjectKey, Word, &MsgBuf<REQ>, &mut MsgBuf<REP>) -> Word,
{
    fn dispatch(
        &mut self,
        badge: ObjectKey,
        opcode: Word,
        request: &MsgBuf<REQ>,
        reply: &mut MsgBuf<REP>,
    ) -> Word {
        self(badge, opcode, request, reply)
    }
}

/// Entrypoint settings
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Name used in log lines
    pub name: &'static str,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { name: "entrypoint" }
    }
}

/// Current position in the serve cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Wait,
    Serve,
    ReplyAndWait,
}

/// Counters kept by the server loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// Requests dispatched and answered
    pub served: u64,
    /// Requests dropped because badge and label disagreed
    pub dropped_forged: u64,
    /// Kernel errors swallowed while waiting
    pub transport_errors: u64,
}

/// Server entrypoint with fixed-size request and reply buffers
pub struct IpcServer<const REQ: usize = ENTRYPOINT_BUFFER_WORDS, const REP: usize = ENTRYPOINT_BUFFER_WORDS> {
    config: ServerConfig,
    state: ServerState,
    stats: ServerStats,
    request: MsgBuf<REQ>,
    reply: MsgBuf<REP>,
}

impl<const REQ: usize, const REP: usize> IpcServer<REQ, REP> {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Wait,
            stats: ServerStats::default(),
            request: MsgBuf::new(),
            reply: MsgBuf::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Serve requests until the context is torn down
    pub fn run<T, D>(&mut self, ctx: &mut IpcContext<'_, T>, dispatcher: &mut D) -> ServerStats
    where
        T: Transport,
        D: Dispatcher<REQ, REP>,
    {
        log::info!("{}: serving ({} backend)", self.config.name, T::NAME);

        let mut regs = T::Registers::new();

        // Sentinel reply without a caller: the first kernel entry only waits
        self.reply.reset();
        wire::encode(
            ctx.caps(),
            RpcExceptionCode::INVALID_OBJECT.to_word(),
            None,
            &self.reply,
            &mut regs,
        );
        let mut reply_pending = false;

        loop {
            self.state = if reply_pending {
                ServerState::ReplyAndWait
            } else {
                ServerState::Wait
            };

            let window = ctx.window().handles();
            let label = match ctx.transport().reply_and_wait(&mut regs, reply_pending, window) {
                Ok(label) => label,
                Err(KernelError::TornDown) => {
                    log::info!(
                        "{}: torn down after {} requests ({} forged dropped)",
                        self.config.name,
                        self.stats.served,
                        self.stats.dropped_forged
                    );
                    return self.stats;
                }
                Err(err) => {
                    log::debug!("{}: wait failed: {}", self.config.name, err);
                    self.stats.transport_errors += 1;
                    reply_pending = false;
                    continue;
                }
            };

            self.state = ServerState::Serve;
            reply_pending = self.serve(ctx, &mut regs, label, dispatcher);
        }
    }

    /// Authenticate, dispatch and encode the reply
    ///
    /// Returns whether a reply is ready in `regs`.
    fn serve<T, D>(
        &mut self,
        ctx: &mut IpcContext<'_, T>,
        regs: &mut T::Registers,
        label: Word,
        dispatcher: &mut D,
    ) -> bool
    where
        T: Transport,
        D: Dispatcher<REQ, REP>,
    {
        let decoded = wire::decode(ctx, regs, MessageKind::Request, &mut self.request);

        if decoded.badge.raw() & T::LABEL_MASK != label & T::LABEL_MASK {
            log::warn!(
                "{}: dropping request with badge {:?} on capability labelled {:#x}",
                self.config.name,
                decoded.badge,
                label
            );
            self.stats.dropped_forged += 1;
            return false;
        }

        log::trace!(
            "{}: {:?} opcode {:#x}",
            self.config.name,
            decoded.badge,
            decoded.protocol_word
        );

        self.reply.reset();
        let exception = dispatcher.dispatch(
            decoded.badge,
            decoded.protocol_word,
            &self.request,
            &mut self.reply,
        );

        wire::encode(ctx.caps(), exception, None, &self.reply, regs);
        self.stats.served += 1;
        true
    }
}

impl<const REQ: usize, const REP: usize> Default for IpcServer<REQ, REP> {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
