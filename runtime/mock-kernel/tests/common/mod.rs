//! Shared fixtures for the conformance suite

#![allow(dead_code)]

use std::thread::{self, JoinHandle};

use kaal_ipc::{
    CapSpace, Capability, IpcContext, IpcServer, MsgBuf, ObjectKey, ServerConfig, ServerStats,
    Transport, Word,
};
use kaal_mock_kernel::{DomainId, MockKernel, MockThread, ThreadControl};

pub const BUF_WORDS: usize = 16;
pub type Buf = MsgBuf<BUF_WORDS>;

/// Route log output through the test harness (`RUST_LOG=trace` to see it)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Capability space living for the rest of the test process
pub fn leak_caps() -> &'static CapSpace {
    Box::leak(Box::new(CapSpace::new()))
}

/// Server entrypoint running on its own thread
pub struct RunningServer {
    pub domain: DomainId,
    /// Served objects in the order of the keys passed to `spawn_server`
    pub objects: Vec<Capability>,
    control: ThreadControl,
    join: JoinHandle<ServerStats>,
}

impl RunningServer {
    /// Tear the entrypoint down and collect its statistics
    pub fn stop(self) -> ServerStats {
        self.control.teardown();
        self.join.join().expect("server thread panicked")
    }
}

/// Create objects labelled `keys` and serve them with `dispatcher`
pub fn spawn_server<T, F>(
    kernel: &MockKernel,
    domain: DomainId,
    keys: &[Word],
    make: fn(MockThread) -> T,
    mut dispatcher: F,
) -> RunningServer
where
    T: Transport + 'static,
    F: FnMut(ObjectKey, Word, &Buf, &mut Buf) -> Word + Send + 'static,
{
    let worker = kernel.server(domain);
    let caps = leak_caps();

    let objects = keys
        .iter()
        .map(|key| {
            let handle = worker.create_object(*key).expect("create object");
            caps.bind(Capability::new(ObjectKey::new(*key), handle))
                .expect("bind object")
                .capability()
        })
        .collect();

    let control = worker.control();
    let join = thread::spawn(move || {
        let mut ctx = IpcContext::new(make(worker), caps).expect("server context");
        let mut server: IpcServer<BUF_WORDS, BUF_WORDS> = IpcServer::new(ServerConfig { name: "test-server" });
        server.run(&mut ctx, &mut dispatcher)
    });

    RunningServer {
        domain,
        objects,
        control,
        join,
    }
}

/// Client context in `domain` plus the control to cancel its calls
pub fn client<T: Transport>(
    kernel: &MockKernel,
    domain: DomainId,
    make: fn(MockThread) -> T,
) -> (IpcContext<'static, T>, ThreadControl) {
    let thread = kernel.client(domain);
    let control = thread.control();
    let ctx = IpcContext::new(make(thread), leak_caps()).expect("client context");
    (ctx, control)
}

/// Grant `cap` from `from` to the client and register it there
pub fn hand_out<T: Transport>(
    kernel: &MockKernel,
    from: DomainId,
    cap: Capability,
    to: DomainId,
    ctx: &IpcContext<'_, T>,
) -> Capability {
    let handle = kernel.grant(from, cap.handle(), to).expect("grant");
    ctx.import(cap.key(), handle).expect("import")
}

/// Object owned by a third domain that nobody serves
pub fn foreign_object(kernel: &MockKernel, key: Word) -> (DomainId, Capability, MockThread) {
    let domain = kernel.create_domain("provider", 16);
    let thread = kernel.server(domain);
    let handle = thread.create_object(key).expect("create object");
    (domain, Capability::new(ObjectKey::new(key), handle), thread)
}
