//! Common utilities for tests

use std::sync::Arc;

use fusevfs::{FileSystem, FsConfig, MemStore};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// Routes the library's `log` output to the test harness. Safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A filesystem with the default geometry on an in-memory store.
pub fn mem_fs() -> FileSystem<MemStore> {
    init_logger();
    let config = FsConfig::default();
    FileSystem::format(Arc::new(MemStore::new(config.max_blocks)), config).unwrap()
}

/// A filesystem with a small geometry, for exhausting blocks or inodes.
pub fn tiny_fs(max_blocks: u32, max_inodes: u32) -> FileSystem<MemStore> {
    init_logger();
    let config = FsConfig::new(max_blocks, max_inodes).unwrap();
    FileSystem::format(Arc::new(MemStore::new(max_blocks)), config).unwrap()
}

/// `len` bytes that differ from block to block.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
