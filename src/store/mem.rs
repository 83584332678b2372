use std::collections::HashMap;

use parking_lot::Mutex;

use super::{check_access, BlockStore};
use crate::error::FsError;

/// In-memory store. Empty blocks are not kept around.
#[derive(Debug)]
pub struct MemStore {
    blocks: Mutex<HashMap<u32, Vec<u8>>>,
    num_blocks: u32,
}

impl MemStore {
    pub fn new(num_blocks: u32) -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
            num_blocks,
        }
    }

    /// Number of blocks currently holding content.
    pub fn occupied(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl BlockStore for MemStore {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read(&self, block_id: u32) -> Result<Vec<u8>, FsError> {
        check_access(self, block_id, 0)?;
        Ok(self.blocks.lock().get(&block_id).cloned().unwrap_or_default())
    }

    fn write(&self, block_id: u32, data: &[u8]) -> Result<(), FsError> {
        check_access(self, block_id, data.len())?;
        let mut blocks = self.blocks.lock();
        if data.is_empty() {
            blocks.remove(&block_id);
        } else {
            blocks.insert(block_id, data.to_vec());
        }
        Ok(())
    }

    fn erase(&self, block_id: u32) -> Result<(), FsError> {
        check_access(self, block_id, 0)?;
        self.blocks.lock().remove(&block_id);
        Ok(())
    }

    fn delete(&self, block_id: u32) -> Result<(), FsError> {
        self.erase(block_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_read_erase() {
        let store = MemStore::new(8);
        store.write(3, b"abc").unwrap();
        assert_eq!(store.read(3).unwrap(), b"abc");
        assert_eq!(store.occupied(), 1);
        store.erase(3).unwrap();
        assert!(store.read(3).unwrap().is_empty());
        assert_eq!(store.occupied(), 0);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let store = MemStore::new(8);
        assert!(matches!(store.read(8), Err(FsError::InvariantViolation(_))));
        assert!(store.write(0, &vec![0u8; crate::BLOCK_SIZE + 1]).is_err());
    }
}
