use crate::{config::*, BlockStore, Error, FsConfig, Result, SuperBlock};

impl SuperBlock {
    /// Superblock of a freshly formatted filesystem. Only the root is in use.
    pub fn new(config: &FsConfig, now: i64) -> Self {
        Self {
            creation_time: now,
            mounted: MOUNTED,
            dev_id: DEVICE_ID,
            free_start: config.free_start(),
            free_end: config.free_end(),
            root: config.root_inode_id(),
            max_blocks: config.max_blocks,
            max_inodes: config.max_inodes,
            free_blocks: config.max_blocks - config.first_data_block(),
            free_inodes: config.max_inodes - 1,
        }
    }
}

pub fn read_superblock(store: &impl BlockStore) -> Result<SuperBlock> {
    let buf = store.read(SUPERBLOCK_ID)?;
    let superblock: SuperBlock = postcard::from_bytes(&buf)?;

    // Only the device id identifies us, there is no magic number.
    if superblock.dev_id != DEVICE_ID {
        return Err(Error::invariant(format!(
            "superblock device id {} is not {}",
            superblock.dev_id, DEVICE_ID
        )));
    }
    Ok(superblock)
}

pub fn write_superblock(store: &impl BlockStore, superblock: &SuperBlock) -> Result<()> {
    let buf = postcard::to_allocvec(superblock)?;
    store.write(SUPERBLOCK_ID, &buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemStore;

    #[test]
    fn superblock_round_trip() {
        let store = MemStore::new(MAX_BLOCKS);
        let sb = SuperBlock::new(&FsConfig::default(), 1_700_000_000);
        assert_eq!(sb.root, 26);
        assert_eq!(sb.free_blocks, MAX_BLOCKS - 27);
        write_superblock(&store, &sb).unwrap();
        assert_eq!(read_superblock(&store).unwrap(), sb);
    }

    #[test]
    fn foreign_device_is_rejected() {
        let store = MemStore::new(64);
        let mut sb = SuperBlock::new(&FsConfig::new(64, 16).unwrap(), 0);
        sb.dev_id = 7;
        write_superblock(&store, &sb).unwrap();
        assert!(matches!(read_superblock(&store), Err(Error::InvariantViolation(_))));
    }
}
