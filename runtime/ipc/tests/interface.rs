//! Interface macro integration tests
//!
//! Checks that generated tables feed the size calculus and that the generated
//! buffer types have the computed capacity.

use kaal_ipc::interface::{ArgKind, Direction, RpcExceptionCode};
use kaal_ipc::{rpc_interface, MsgBuf, WORD_SIZE};

rpc_interface! {
    /// Scenario interface: one input word in, one word back
    pub interface Echo {
        fn echo(value: u64) -> u64;
    }
}

rpc_interface! {
    /// File system session
    pub interface FileSystem {
        /// Open a file below `root`
        fn open(root: Capability, path: in [u8; 64], mode: u32) -> Capability throws(NotFound, Denied);
        fn read(handle: u64, data: out [u8; 256]) -> usize throws(Io);
        fn seek(handle: u64, offset: inout u64);
        fn sync();
    }
}

#[test]
fn test_echo_sizes() {
    // opcode + value
    assert_eq!(Echo::CALL_WORDS, 2);
    // exception code + return value
    assert_eq!(Echo::REPLY_WORDS, 2);
    assert_eq!(Echo::OP_ECHO, 0);
    assert_eq!(Echo::FUNCTION_COUNT, 1);
}

#[test]
fn test_file_system_layout() {
    let layout = FileSystem::LAYOUT;

    // open: opcode + 64 byte path + mode word
    assert_eq!(layout.call_words, 1 + 8 + 1);
    // read: exception code + 256 byte buffer + usize return
    assert_eq!(layout.reply_words, 1 + 32 + 1);
    assert_eq!(layout.call_caps, 1);
    assert_eq!(layout.reply_caps, 1);
}

#[test]
fn test_function_table() {
    let open = &FileSystem::FUNCTIONS[FileSystem::OP_OPEN as usize];
    assert_eq!(open.name, "open");
    assert_eq!(open.args.len(), 3);
    assert_eq!(open.args[0].kind, ArgKind::Capability);
    assert_eq!(open.args[1].kind, ArgKind::Data { bytes: 64 });
    assert_eq!(open.ret, ArgKind::Capability);

    let seek = &FileSystem::FUNCTIONS[FileSystem::OP_SEEK as usize];
    assert_eq!(seek.args[1].direction, Direction::InOut);
    assert_eq!(seek.call_words(), 3);
    assert_eq!(seek.reply_words(), 2);

    assert_eq!(FileSystem::OP_SYNC, 3);
}

#[test]
fn test_exception_constants() {
    assert_eq!(FileSystem::OPEN_NOT_FOUND, RpcExceptionCode::exception(0).to_word());
    assert_eq!(FileSystem::OPEN_DENIED, RpcExceptionCode::exception(1).to_word());
    assert_eq!(FileSystem::READ_IO, RpcExceptionCode::EXCEPTION_BASE.to_word());

    let open = &FileSystem::FUNCTIONS[0];
    assert_eq!(
        open.exception_code("Denied").map(RpcExceptionCode::to_word),
        Some(FileSystem::OPEN_DENIED)
    );
}

#[test]
fn test_generated_buffers_have_interface_capacity() {
    let call = FileSystemCallBuf::new();
    let reply = FileSystemReplyBuf::new();

    assert_eq!(call.capacity(), FileSystem::CALL_WORDS * WORD_SIZE);
    assert_eq!(reply.capacity(), FileSystem::REPLY_WORDS * WORD_SIZE);

    // The largest request fits exactly
    let mut call = call;
    call.insert(&[0u8; 64]);
    call.insert(&0o644u32);
    let used: usize = call.data_size();
    assert!(used <= call.capacity());

    let echo: MsgBuf<{ Echo::CALL_WORDS }> = EchoCallBuf::new();
    assert_eq!(echo.capacity_words(), 2);
}
