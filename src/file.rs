//! File content: direct and indirect files.
//!
//! A direct file keeps all of its bytes in the block named by `location`. Once a write spills past
//! one block the file turns indirect: `location` then names an index block holding the data block
//! ids as little-endian `u32`s, in write order. Only truncation turns a file direct again.
//!
//! Writes append. The last data block is read back, the new bytes are added to it and the result
//! is cut into blocks again, so only the tail block is ever rewritten.

use crate::inode::{now, InodeTable};
use crate::{
    config::*, BlockStore, Error, FreeList, Inode, Result, SuperBlock,
};

pub fn encode_index(block_ids: &[u32]) -> Vec<u8> {
    block_ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

pub fn decode_index(buf: &[u8]) -> Result<Vec<u32>> {
    if buf.len() % INDEX_ENTRY_SIZE != 0 {
        return Err(Error::invariant(format!(
            "index block of {} bytes is not a list of block ids",
            buf.len()
        )));
    }
    Ok(buf
        .chunks_exact(INDEX_ENTRY_SIZE)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Data block ids of a file, in content order.
pub fn block_list(store: &impl BlockStore, inode: &Inode) -> Result<Vec<u32>> {
    if !inode.indirect {
        return Ok(vec![inode.location]);
    }
    let block_ids = decode_index(&store.read(inode.location)?)?;
    if block_ids.len() < 2 {
        return Err(Error::invariant(format!(
            "indirect file with {} data blocks",
            block_ids.len()
        )));
    }
    if block_ids.len() > MAX_FILE_BLOCKS {
        return Err(Error::FileTooLarge {
            max: MAX_FILE_BLOCKS,
        });
    }
    Ok(block_ids)
}

/// Whole content of a file.
pub fn fread(store: &impl BlockStore, inode: &Inode) -> Result<Vec<u8>> {
    if inode.is_dir() {
        return Err(Error::IsDirectory(format!("block {}", inode.location)));
    }

    let mut content = Vec::with_capacity(inode.size as usize);
    for block_id in block_list(store, inode)? {
        content.extend_from_slice(&store.read(block_id)?);
    }

    if content.len() < inode.size as usize {
        return Err(Error::invariant(format!(
            "file holds {} bytes, inode says {}",
            content.len(),
            inode.size
        )));
    }
    content.truncate(inode.size as usize);
    Ok(content)
}

/// Reads `[offset, offset + len)`, clipped at the end of the file.
pub fn fread_at(store: &impl BlockStore, inode: &Inode, offset: usize, len: usize) -> Result<Vec<u8>> {
    let content = fread(store, inode)?;
    if offset >= content.len() {
        return Ok(Vec::new());
    }
    let end = offset.saturating_add(len).min(content.len());
    Ok(content[offset..end].to_vec())
}

/// Allocates `count` blocks, giving all of them back if any allocation fails.
fn allocate_blocks(
    store: &impl BlockStore,
    free_list: &mut FreeList,
    superblock: &mut SuperBlock,
    count: usize,
) -> Result<Vec<u32>> {
    let mut block_ids = Vec::with_capacity(count);
    for _ in 0..count {
        match free_list.allocate(store, superblock) {
            Ok(id) => block_ids.push(id),
            Err(e) => {
                for id in block_ids {
                    free_list.release(store, superblock, id)?;
                }
                return Err(e);
            }
        }
    }
    Ok(block_ids)
}

/// Writes the re-split tail: the first chunk over the old last block, the rest into new blocks.
fn store_chunks(
    store: &impl BlockStore,
    last_block: u32,
    chunks: &[&[u8]],
    new_blocks: &[u32],
) -> Result<()> {
    store.write(last_block, chunks[0])?;
    for (block_id, chunk) in new_blocks.iter().zip(&chunks[1..]) {
        store.write(*block_id, chunk)?;
    }
    Ok(())
}

/// Appends `data` to the file. Returns the number of bytes written.
pub fn fwrite(
    store: &impl BlockStore,
    free_list: &mut FreeList,
    superblock: &mut SuperBlock,
    table: &mut InodeTable,
    inode_id: u32,
    data: &[u8],
) -> Result<usize> {
    let inode = table.get(inode_id)?;
    if inode.is_dir() {
        return Err(Error::IsDirectory(format!("inode {inode_id}")));
    }
    if data.is_empty() {
        return Ok(0);
    }

    let mut block_ids = block_list(store, inode)?;
    let was_indirect = inode.indirect;
    let old_location = inode.location;
    let last_block = *block_ids
        .last()
        .ok_or_else(|| Error::invariant(format!("file inode {inode_id} has no data block")))?;

    let mut combined = store.read(last_block)?;
    let tail_len = combined.len();
    combined.extend_from_slice(data);
    let chunks: Vec<&[u8]> = combined.chunks(BLOCK_SIZE).collect();
    let extra = chunks.len() - 1;

    if block_ids.len() + extra > MAX_FILE_BLOCKS {
        log::debug!(
            "write of {} bytes to inode {inode_id} needs {} blocks",
            data.len(),
            block_ids.len() + extra
        );
        return Err(Error::FileTooLarge {
            max: MAX_FILE_BLOCKS,
        });
    }

    // New data blocks, plus the index block on the first overflow.
    let needs_index = extra > 0 && !was_indirect;
    let mut new_blocks = allocate_blocks(
        store,
        free_list,
        superblock,
        extra + usize::from(needs_index),
    )?;
    let index_block = if needs_index { new_blocks.pop() } else { None };

    let old_count = block_ids.len();
    block_ids.extend_from_slice(&new_blocks);
    let location = index_block.unwrap_or(old_location);

    let stored = store_chunks(store, last_block, &chunks, &new_blocks).and_then(|()| {
        if extra > 0 {
            store.write(location, &encode_index(&block_ids))
        } else {
            Ok(())
        }
    });
    if let Err(e) = stored {
        // Put the old tail and index back, then give the new blocks up.
        log::warn!("write to inode {inode_id} failed: {e}");
        store.write(last_block, &combined[..tail_len])?;
        if was_indirect && extra > 0 {
            store.write(old_location, &encode_index(&block_ids[..old_count]))?;
        }
        for &block_id in new_blocks.iter().chain(index_block.iter()) {
            free_list.release(store, superblock, block_id)?;
        }
        return Err(e);
    }
    if let Some(index_block) = index_block {
        log::debug!("inode {inode_id} turns indirect, index block {index_block}");
    }

    let written = data.len();
    table.update(store, inode_id, |inode| {
        inode.size += written as u64;
        inode.indirect = block_ids.len() > 1;
        inode.location = location;
        inode.mtime = now();
    })?;
    log::trace!("appended {written} bytes to inode {inode_id}");
    Ok(written)
}

/// Gives back every block of the file except the first data block, which is returned emptied.
fn shed_blocks(
    store: &impl BlockStore,
    free_list: &mut FreeList,
    superblock: &mut SuperBlock,
    inode: &Inode,
) -> Result<u32> {
    let block_ids = block_list(store, inode)?;
    let first = block_ids[0];
    if inode.indirect {
        for &block_id in &block_ids[1..] {
            free_list.release(store, superblock, block_id)?;
        }
        free_list.release(store, superblock, inode.location)?;
    }
    store.erase(first)?;
    Ok(first)
}

/// Empties the file, leaving it direct with a single empty data block.
pub fn ftruncate(
    store: &impl BlockStore,
    free_list: &mut FreeList,
    superblock: &mut SuperBlock,
    table: &mut InodeTable,
    inode_id: u32,
) -> Result<()> {
    let inode = table.get(inode_id)?;
    if inode.is_dir() {
        return Err(Error::IsDirectory(format!("inode {inode_id}")));
    }
    let first = shed_blocks(store, free_list, superblock, inode)?;
    table.update(store, inode_id, |inode| {
        inode.size = 0;
        inode.indirect = false;
        inode.location = first;
        inode.mtime = now();
    })?;
    log::debug!("truncated inode {inode_id}");
    Ok(())
}

/// Releases every data and index block of a file that is about to be reclaimed.
pub fn release_content(
    store: &impl BlockStore,
    free_list: &mut FreeList,
    superblock: &mut SuperBlock,
    inode: &Inode,
) -> Result<()> {
    let first = shed_blocks(store, free_list, superblock, inode)?;
    free_list.release(store, superblock, first)
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;
    use crate::{FsConfig, MemStore};

    /// Refuses every write to one block.
    struct FailingStore {
        inner: MemStore,
        bad_block: u32,
    }

    impl BlockStore for FailingStore {
        fn num_blocks(&self) -> u32 {
            self.inner.num_blocks()
        }

        fn read(&self, block_id: u32) -> Result<Vec<u8>> {
            self.inner.read(block_id)
        }

        fn write(&self, block_id: u32, data: &[u8]) -> Result<()> {
            if block_id == self.bad_block {
                return Err(io::Error::other("bad block").into());
            }
            self.inner.write(block_id, data)
        }

        fn erase(&self, block_id: u32) -> Result<()> {
            self.inner.erase(block_id)
        }

        fn delete(&self, block_id: u32) -> Result<()> {
            self.inner.delete(block_id)
        }
    }

    struct Fixture<S: BlockStore> {
        store: S,
        free_list: FreeList,
        sb: SuperBlock,
        table: InodeTable,
        id: u32,
    }

    impl Fixture<MemStore> {
        fn new() -> Self {
            Self::with_store(MemStore::new(MAX_BLOCKS))
        }
    }

    impl<S: BlockStore> Fixture<S> {
        fn with_store(store: S) -> Self {
            let config = FsConfig::default();
            let mut free_list = FreeList::format(&store, &config).unwrap();
            let mut sb = SuperBlock::new(&config, 0);
            let mut table = InodeTable::new(config.max_blocks);
            let id = table.allocate_file(&store, &mut free_list, &mut sb).unwrap();
            Self { store, free_list, sb, table, id }
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            fwrite(&self.store, &mut self.free_list, &mut self.sb, &mut self.table, self.id, data)
        }

        fn read(&self) -> Vec<u8> {
            fread(&self.store, self.table.get(self.id).unwrap()).unwrap()
        }

        fn inode(&self) -> &Inode {
            self.table.get(self.id).unwrap()
        }
    }

    #[test]
    fn index_codec() {
        let ids = [27, 400, 9999];
        assert_eq!(decode_index(&encode_index(&ids)).unwrap(), ids);
        assert!(decode_index(&[1, 2, 3]).is_err());
    }

    #[test]
    fn small_appends_stay_direct() {
        let mut f = Fixture::new();
        f.write(b"hello ").unwrap();
        f.write(b"world").unwrap();
        assert_eq!(f.read(), b"hello world");
        assert!(!f.inode().indirect);
        assert_eq!(f.inode().size, 11);
    }

    #[test]
    fn overflow_turns_indirect() {
        let mut f = Fixture::new();
        let first_block = f.inode().location;
        f.write(&vec![b'x'; BLOCK_SIZE]).unwrap();
        assert!(!f.inode().indirect);

        f.write(b"y").unwrap();
        let inode = f.inode().clone();
        assert!(inode.indirect);
        let block_ids = block_list(&f.store, &inode).unwrap();
        assert_eq!(block_ids.len(), 2);
        assert_eq!(block_ids[0], first_block);
        assert_eq!(f.store.read(block_ids[1]).unwrap(), b"y");

        let mut expected = vec![b'x'; BLOCK_SIZE];
        expected.push(b'y');
        assert_eq!(f.read(), expected);
    }

    #[test]
    fn appends_fill_the_tail_block_first() {
        let mut f = Fixture::new();
        f.write(&vec![1u8; BLOCK_SIZE + 10]).unwrap();
        f.write(&vec![2u8; BLOCK_SIZE - 10]).unwrap();
        assert_eq!(block_list(&f.store, f.inode()).unwrap().len(), 2);
        f.write(&[3u8]).unwrap();
        assert_eq!(block_list(&f.store, f.inode()).unwrap().len(), 3);
        assert_eq!(f.read().len(), 2 * BLOCK_SIZE + 1);
    }

    #[test]
    fn too_large_write_touches_nothing() {
        let mut f = Fixture::new();
        f.write(b"keep").unwrap();
        let free_before = f.sb.free_blocks;
        let err = f.write(&vec![0u8; MAX_FILE_BLOCKS * BLOCK_SIZE]).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));
        assert_eq!(f.sb.free_blocks, free_before);
        assert_eq!(f.read(), b"keep");
    }

    #[test]
    fn truncate_returns_blocks() {
        let mut f = Fixture::new();
        let free_after_create = f.sb.free_blocks;
        f.write(&vec![7u8; 3 * BLOCK_SIZE]).unwrap();
        // Two extra data blocks and the index block.
        assert_eq!(f.sb.free_blocks, free_after_create - 3);

        ftruncate(&f.store, &mut f.free_list, &mut f.sb, &mut f.table, f.id).unwrap();
        assert_eq!(f.sb.free_blocks, free_after_create);
        assert!(!f.inode().indirect);
        assert_eq!(f.inode().size, 0);
        assert!(f.read().is_empty());

        f.write(b"again").unwrap();
        assert_eq!(f.read(), b"again");
    }

    #[test]
    fn failed_store_write_gives_blocks_back() {
        // File inode 27 with data block 28; a three block write would take 29, 30 and index 31.
        let mut f = Fixture::with_store(FailingStore {
            inner: MemStore::new(MAX_BLOCKS),
            bad_block: 30,
        });
        f.write(b"head").unwrap();
        let free_before = f.sb.free_blocks;

        assert!(matches!(f.write(&vec![9u8; 3 * BLOCK_SIZE]), Err(Error::Io(_))));
        assert_eq!(f.sb.free_blocks, free_before);
        for block_id in 29..=31 {
            assert!(f.free_list.is_free(block_id));
        }
        assert!(!f.inode().indirect);
        assert_eq!(f.read(), b"head");
        assert_eq!(f.store.read(28).unwrap(), b"head");
    }

    #[test]
    fn ranged_reads_clip() {
        let mut f = Fixture::new();
        f.write(b"0123456789").unwrap();
        let inode = f.inode();
        assert_eq!(fread_at(&f.store, inode, 2, 3).unwrap(), b"234");
        assert_eq!(fread_at(&f.store, inode, 8, 100).unwrap(), b"89");
        assert!(fread_at(&f.store, inode, 10, 1).unwrap().is_empty());
    }
}
