use crate::{Error, Result};

pub const BLOCK_SIZE: usize = 4096;
pub const MAX_BLOCKS: u32 = 10000;
pub const MAX_INODES: u32 = 2000;
pub const MAX_FILE_BLOCKS: usize = 400; // Data blocks per file, index block not counted
pub const MAX_DIR_ENTRIES: usize = 50; // Including '.' and '..'
pub const MAX_NAME_LEN: usize = 50;

pub const SUPERBLOCK_ID: u32 = 0;
pub const FREE_GROUP_SIZE: u32 = 400; // Block ids tracked by one free-list chunk
pub const INDEX_ENTRY_SIZE: usize = 4; // Little-endian u32 per data block id

pub const DEVICE_ID: u32 = 20;
pub const MOUNTED: u32 = 50;
pub const FS_ID: u64 = 2970;

pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";

pub const FILE_MODE: u32 = 0o100664; // S_IFREG | rw-rw-r--
pub const DIR_MODE: u32 = 0o040755; // S_IFDIR | rwxr-xr-x
pub const DEFAULT_UID: u32 = 1;
pub const DEFAULT_GID: u32 = 1;

/// Geometry of a freshly formatted filesystem.
///
/// The free-list is split into chunks of [`FREE_GROUP_SIZE`] ids, each persisted in its own
/// block right after the superblock. The root directory takes the block after the last chunk,
/// so the default geometry reserves blocks `0..=26`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub max_blocks: u32,
    pub max_inodes: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_blocks: MAX_BLOCKS,
            max_inodes: MAX_INODES,
        }
    }
}

impl FsConfig {
    pub fn new(max_blocks: u32, max_inodes: u32) -> Result<Self> {
        let config = Self { max_blocks, max_inodes };
        config.validate()?;
        Ok(config)
    }

    /// Number of free-list chunks, also the number of blocks storing them.
    pub fn free_groups(&self) -> u32 {
        self.max_blocks.div_ceil(FREE_GROUP_SIZE)
    }

    pub fn free_start(&self) -> u32 {
        SUPERBLOCK_ID + 1
    }

    pub fn free_end(&self) -> u32 {
        self.free_groups()
    }

    pub fn root_inode_id(&self) -> u32 {
        self.free_end() + 1
    }

    /// First block id the allocator may hand out.
    pub fn first_data_block(&self) -> u32 {
        self.root_inode_id() + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_blocks == 0 || self.first_data_block() >= self.max_blocks {
            return Err(Error::InvalidConfig(format!(
                "{} blocks leave no room for data",
                self.max_blocks
            )));
        }
        if self.max_inodes < 1 {
            return Err(Error::InvalidConfig("at least the root inode is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_layout_matches_reserved_region() {
        let config = FsConfig::default();
        assert_eq!(config.free_groups(), 25);
        assert_eq!(config.free_start(), 1);
        assert_eq!(config.free_end(), 25);
        assert_eq!(config.root_inode_id(), 26);
        assert_eq!(config.first_data_block(), 27);
    }

    #[test]
    fn tiny_geometry_is_rejected() {
        assert!(FsConfig::new(3, 10).is_err());
        assert!(FsConfig::new(4, 10).is_ok());
        assert!(FsConfig::new(64, 0).is_err());
    }
}
