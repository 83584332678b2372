//! Block store: the medium under the engine.
//!
//! The engine keeps its whole model in memory; the store only mirrors it block by block so the
//! state can be inspected from outside. Nothing is read back at mount time.

mod file;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

use crate::error::FsError;

pub trait BlockStore: Send + Sync {
    /// Number of addressable blocks, ids are `0..num_blocks()`.
    fn num_blocks(&self) -> u32;

    /// Reads the current content of a block.
    /// An erased or never written block reads as empty.
    fn read(&self, block_id: u32) -> Result<Vec<u8>, FsError>;

    /// Replaces the content of a block. data.len() must not exceed BLOCK_SIZE.
    fn write(&self, block_id: u32, data: &[u8]) -> Result<(), FsError>;

    /// Clears the content of a block.
    fn erase(&self, block_id: u32) -> Result<(), FsError>;

    /// Removes the block from the medium altogether.
    fn delete(&self, block_id: u32) -> Result<(), FsError>;
}

/// Shared bounds check for store implementations.
pub(crate) fn check_access(store: &impl BlockStore, block_id: u32, len: usize) -> Result<(), FsError> {
    if block_id >= store.num_blocks() {
        return Err(FsError::invariant(format!(
            "block {block_id} outside store of {} blocks",
            store.num_blocks()
        )));
    }
    if len > crate::BLOCK_SIZE {
        return Err(FsError::invariant(format!(
            "{len} bytes do not fit block {block_id}"
        )));
    }
    Ok(())
}
