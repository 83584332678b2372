//! Free-block allocator.
//!
//! Block ids are tracked in fixed groups of [`FREE_GROUP_SIZE`]; group `g` covers ids
//! `g * FREE_GROUP_SIZE..(g + 1) * FREE_GROUP_SIZE` and is persisted, as the list of its free ids,
//! in block `free_start + g`. Groups are scanned in order and words within a group from the low
//! end, so the lowest free id is always handed out first.
//!
//! The superblock, the chunk blocks and the root inode block are marked used at format time and
//! can never be released.

use crate::superblock::write_superblock;
use crate::{config::*, BlockStore, Error, FsConfig, Result, SuperBlock};

const WORD_BITS: u32 = u64::BITS;
const WORDS_PER_GROUP: usize = FREE_GROUP_SIZE.div_ceil(WORD_BITS) as usize;

/// Set bit = block in use (or reserved, or past the end of the store).
#[derive(Debug, Clone)]
struct FreeGroup {
    words: [u64; WORDS_PER_GROUP],
}

impl FreeGroup {
    fn first_free(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .find_map(|(word_index, &bits)| {
                (bits != u64::MAX).then_some(word_index as u32 * WORD_BITS + bits.trailing_ones())
            })
            .filter(|&bit| bit < FREE_GROUP_SIZE)
    }

    fn is_used(&self, bit: u32) -> bool {
        self.words[(bit / WORD_BITS) as usize] & (1 << (bit % WORD_BITS)) != 0
    }

    fn set_used(&mut self, bit: u32, used: bool) {
        let word = &mut self.words[(bit / WORD_BITS) as usize];
        if used {
            *word |= 1 << (bit % WORD_BITS);
        } else {
            *word &= !(1 << (bit % WORD_BITS));
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreeList {
    groups: Vec<FreeGroup>,
    free_start: u32,
    first_data_block: u32,
    max_blocks: u32,
}

/// Splits a block id into (group index, bit inside the group).
#[inline]
fn locate(block_id: u32) -> (usize, u32) {
    ((block_id / FREE_GROUP_SIZE) as usize, block_id % FREE_GROUP_SIZE)
}

impl FreeList {
    /// Builds the free-list of an empty filesystem and persists every chunk.
    pub fn format(store: &impl BlockStore, config: &FsConfig) -> Result<Self> {
        let mut free_list = Self {
            groups: vec![
                FreeGroup {
                    words: [0; WORDS_PER_GROUP],
                };
                config.free_groups() as usize
            ],
            free_start: config.free_start(),
            first_data_block: config.first_data_block(),
            max_blocks: config.max_blocks,
        };

        for block_id in 0..free_list.first_data_block {
            let (group, bit) = locate(block_id);
            free_list.groups[group].set_used(bit, true);
        }
        // The last group may extend past the end of the store.
        let capacity = config.free_groups() * FREE_GROUP_SIZE;
        for block_id in config.max_blocks..capacity {
            let (group, bit) = locate(block_id);
            free_list.groups[group].set_used(bit, true);
        }

        for group in 0..free_list.groups.len() {
            free_list.persist_group(store, group)?;
        }
        Ok(free_list)
    }

    /// Takes the lowest free block id.
    pub fn allocate(&mut self, store: &impl BlockStore, superblock: &mut SuperBlock) -> Result<u32> {
        let Some((group, bit)) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group, free_group)| free_group.first_free().map(|bit| (group, bit)))
        else {
            log::debug!("allocator exhausted");
            return Err(Error::OutOfSpace);
        };

        let block_id = group as u32 * FREE_GROUP_SIZE + bit;
        if block_id < self.first_data_block || block_id >= self.max_blocks {
            return Err(Error::invariant(format!("free-list offered reserved block {block_id}")));
        }
        if superblock.free_blocks == 0 {
            return Err(Error::invariant(format!(
                "block {block_id} is free but the free-block counter is zero"
            )));
        }

        self.groups[group].set_used(bit, true);
        self.persist_group(store, group)?;
        superblock.free_blocks -= 1;
        write_superblock(store, superblock)?;

        log::trace!("allocated block {block_id}, {} left", superblock.free_blocks);
        Ok(block_id)
    }

    /// Returns a block to the free-list, wiping its content first.
    pub fn release(
        &mut self,
        store: &impl BlockStore,
        superblock: &mut SuperBlock,
        block_id: u32,
    ) -> Result<()> {
        if self.is_reserved(block_id) {
            return Err(Error::invariant(format!("release of reserved block {block_id}")));
        }
        if self.is_free(block_id) {
            return Err(Error::invariant(format!("double release of block {block_id}")));
        }

        let (group, bit) = locate(block_id);
        store.erase(block_id)?;
        self.groups[group].set_used(bit, false);
        self.persist_group(store, group)?;
        superblock.free_blocks += 1;
        write_superblock(store, superblock)?;

        log::trace!("released block {block_id}, {} left", superblock.free_blocks);
        Ok(())
    }

    /// Superblock, free-list chunks, root inode, or outside the store.
    pub fn is_reserved(&self, block_id: u32) -> bool {
        block_id < self.first_data_block || block_id >= self.max_blocks
    }

    pub fn is_free(&self, block_id: u32) -> bool {
        if self.is_reserved(block_id) {
            return false;
        }
        let (group, bit) = locate(block_id);
        !self.groups[group].is_used(bit)
    }

    /// Free ids in ascending order.
    pub fn free_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (self.first_data_block..self.max_blocks).filter(|&id| self.is_free(id))
    }

    pub fn free_count(&self) -> u32 {
        self.free_ids().count() as u32
    }

    fn persist_group(&self, store: &impl BlockStore, group: usize) -> Result<()> {
        let base = group as u32 * FREE_GROUP_SIZE;
        let free: Vec<u32> = (0..FREE_GROUP_SIZE)
            .filter(|&bit| !self.groups[group].is_used(bit))
            .map(|bit| base + bit)
            .collect();
        let buf = postcard::to_allocvec(&free)?;
        store.write(self.free_start + group as u32, &buf)
    }

    /// Free ids recorded in the persisted chunk of `group`.
    pub fn read_group(store: &impl BlockStore, free_start: u32, group: u32) -> Result<Vec<u32>> {
        let buf = store.read(free_start + group)?;
        Ok(postcard::from_bytes(&buf)?)
    }
}

/// Accounts for a new inode. Inode ids are block ids, so only the budget is tracked here.
pub(crate) fn reserve_inode(store: &impl BlockStore, superblock: &mut SuperBlock) -> Result<()> {
    if superblock.free_inodes == 0 {
        log::debug!("inode budget exhausted");
        return Err(Error::OutOfSpace);
    }
    superblock.free_inodes -= 1;
    write_superblock(store, superblock)
}

pub(crate) fn return_inode(store: &impl BlockStore, superblock: &mut SuperBlock) -> Result<()> {
    if superblock.free_inodes + 1 >= superblock.max_inodes {
        return Err(Error::invariant("more inodes returned than handed out"));
    }
    superblock.free_inodes += 1;
    write_superblock(store, superblock)
}
