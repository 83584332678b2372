use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use super::{check_access, BlockStore};
use crate::error::FsError;

pub const DEFAULT_PREFIX: &str = "fusedata.";

/// One host file per block: `<dir>/<prefix><id>`.
///
/// Meant for looking at the filesystem from the outside with ordinary tools, not for keeping it.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    prefix: String,
    num_blocks: u32,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, num_blocks: u32) -> Result<Self, FsError> {
        Self::with_prefix(dir, DEFAULT_PREFIX, num_blocks)
    }

    pub fn with_prefix(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        num_blocks: u32,
    ) -> Result<Self, FsError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            num_blocks,
        })
    }

    pub fn block_path(&self, block_id: u32) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, block_id))
    }
}

impl BlockStore for FileStore {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read(&self, block_id: u32) -> Result<Vec<u8>, FsError> {
        check_access(self, block_id, 0)?;
        match fs::read(self.block_path(block_id)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, block_id: u32, data: &[u8]) -> Result<(), FsError> {
        check_access(self, block_id, data.len())?;
        log::trace!("write block {} ({} bytes)", block_id, data.len());
        let mut file = fs::File::create(self.block_path(block_id))?;
        file.write_all(data)?;
        Ok(())
    }

    fn erase(&self, block_id: u32) -> Result<(), FsError> {
        check_access(self, block_id, 0)?;
        fs::File::create(self.block_path(block_id))?;
        Ok(())
    }

    fn delete(&self, block_id: u32) -> Result<(), FsError> {
        check_access(self, block_id, 0)?;
        match fs::remove_file(self.block_path(block_id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_file_per_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 16).unwrap();
        store.write(7, b"payload").unwrap();
        assert!(dir.path().join("fusedata.7").exists());
        assert_eq!(store.read(7).unwrap(), b"payload");

        store.erase(7).unwrap();
        assert!(store.read(7).unwrap().is_empty());
        assert!(dir.path().join("fusedata.7").exists());

        store.delete(7).unwrap();
        assert!(!dir.path().join("fusedata.7").exists());
        store.delete(7).unwrap();
        assert!(store.read(7).unwrap().is_empty());
    }
}
