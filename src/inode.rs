//! Inode table: an arena of inode records indexed by block id.
//!
//! Every mutation goes through [`InodeTable::update`] (or one of the allocating helpers), which
//! writes the record to its own block immediately.

use crate::freelist::{reserve_inode, return_inode};
use crate::{
    config::*, BlockStore, DirEntry, Error, FileType, FreeList, Inode, Result, SuperBlock,
};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Inode {
    fn fresh(ftype: FileType, mode: u32, links_cnt: u32) -> Self {
        let now = now();
        Self {
            ftype,
            size: 0,
            uid: DEFAULT_UID,
            gid: DEFAULT_GID,
            mode,
            atime: now,
            ctime: now,
            mtime: now,
            links_cnt,
            indirect: false,
            location: 0,
            entries: Vec::new(),
        }
    }

    /// A directory with its '.' and '..' entries.
    pub fn new_directory(self_id: u32, parent_id: u32) -> Self {
        let mut inode = Self::fresh(FileType::Directory, DIR_MODE, 2);
        inode.size = BLOCK_SIZE as u64;
        inode.entries = vec![
            DirEntry {
                ftype: FileType::Directory,
                name: DOT_NAME.to_string(),
                inode_id: self_id,
            },
            DirEntry {
                ftype: FileType::Directory,
                name: DOTDOT_NAME.to_string(),
                inode_id: parent_id,
            },
        ];
        inode
    }

    /// An empty direct file whose data lives in `data_block`.
    pub fn new_file(data_block: u32) -> Self {
        let mut inode = Self::fresh(FileType::Regular, FILE_MODE, 1);
        inode.location = data_block;
        inode
    }
}

#[derive(Debug)]
pub struct InodeTable {
    slots: Vec<Option<Inode>>,
}

impl InodeTable {
    pub fn new(max_blocks: u32) -> Self {
        Self {
            slots: vec![None; max_blocks as usize],
        }
    }

    pub fn get(&self, inode_id: u32) -> Result<&Inode> {
        self.slots
            .get(inode_id as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::not_found(format!("inode {inode_id}")))
    }

    /// Ids of every live inode, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id as u32)
    }

    /// Applies `f` to the record and persists it.
    pub fn update<T>(
        &mut self,
        store: &impl BlockStore,
        inode_id: u32,
        f: impl FnOnce(&mut Inode) -> T,
    ) -> Result<T> {
        let inode = self
            .slots
            .get_mut(inode_id as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::not_found(format!("inode {inode_id}")))?;
        let ret = f(inode);
        write_inode(store, inode_id, inode)?;
        Ok(ret)
    }

    /// Places a record in an empty slot and persists it.
    pub fn insert(&mut self, store: &impl BlockStore, inode_id: u32, inode: Inode) -> Result<()> {
        let slot = self
            .slots
            .get_mut(inode_id as usize)
            .ok_or_else(|| Error::invariant(format!("inode id {inode_id} outside the table")))?;
        if slot.is_some() {
            return Err(Error::invariant(format!("inode {inode_id} is already in use")));
        }
        write_inode(store, inode_id, &inode)?;
        *slot = Some(inode);
        Ok(())
    }

    /// Allocates an empty regular file together with its first data block.
    /// Either both blocks are taken or neither is.
    pub fn allocate_file(
        &mut self,
        store: &impl BlockStore,
        free_list: &mut FreeList,
        superblock: &mut SuperBlock,
    ) -> Result<u32> {
        reserve_inode(store, superblock)?;
        let inode_id = match free_list.allocate(store, superblock) {
            Ok(id) => id,
            Err(e) => {
                return_inode(store, superblock)?;
                return Err(e);
            }
        };
        let data_block = match free_list.allocate(store, superblock) {
            Ok(id) => id,
            Err(e) => {
                free_list.release(store, superblock, inode_id)?;
                return_inode(store, superblock)?;
                return Err(e);
            }
        };

        store.erase(data_block)?;
        self.insert(store, inode_id, Inode::new_file(data_block))?;
        log::debug!("allocated file inode {inode_id} with data block {data_block}");
        Ok(inode_id)
    }

    pub fn allocate_directory(
        &mut self,
        store: &impl BlockStore,
        free_list: &mut FreeList,
        superblock: &mut SuperBlock,
        parent_id: u32,
    ) -> Result<u32> {
        reserve_inode(store, superblock)?;
        let inode_id = match free_list.allocate(store, superblock) {
            Ok(id) => id,
            Err(e) => {
                return_inode(store, superblock)?;
                return Err(e);
            }
        };

        self.insert(store, inode_id, Inode::new_directory(inode_id, parent_id))?;
        log::debug!("allocated directory inode {inode_id} under {parent_id}");
        Ok(inode_id)
    }

    /// Drops the record and returns its block to the allocator.
    /// Data and index blocks must have been released by the caller.
    pub fn reclaim(
        &mut self,
        store: &impl BlockStore,
        free_list: &mut FreeList,
        superblock: &mut SuperBlock,
        inode_id: u32,
    ) -> Result<Inode> {
        if inode_id == superblock.root {
            return Err(Error::invariant("the root inode cannot be reclaimed"));
        }
        let inode = self
            .slots
            .get_mut(inode_id as usize)
            .and_then(Option::take)
            .ok_or_else(|| Error::invariant(format!("reclaim of unused inode {inode_id}")))?;
        free_list.release(store, superblock, inode_id)?;
        return_inode(store, superblock)?;
        log::debug!("reclaimed inode {inode_id}");
        Ok(inode)
    }
}

pub fn write_inode(store: &impl BlockStore, inode_id: u32, inode: &Inode) -> Result<()> {
    let buf = postcard::to_allocvec(inode)?;
    if buf.len() > BLOCK_SIZE {
        return Err(Error::invariant(format!(
            "inode {inode_id} record takes {} bytes",
            buf.len()
        )));
    }
    store.write(inode_id, &buf)
}

pub fn read_inode(store: &impl BlockStore, inode_id: u32) -> Result<Inode> {
    let buf = store.read(inode_id)?;
    Ok(postcard::from_bytes(&buf)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FsConfig, MemStore};

    struct Fixture {
        store: MemStore,
        free_list: FreeList,
        sb: SuperBlock,
        table: InodeTable,
    }

    fn fixture(max_blocks: u32, max_inodes: u32) -> Fixture {
        let config = FsConfig::new(max_blocks, max_inodes).unwrap();
        let store = MemStore::new(max_blocks);
        let free_list = FreeList::format(&store, &config).unwrap();
        Fixture {
            sb: SuperBlock::new(&config, 0),
            table: InodeTable::new(max_blocks),
            store,
            free_list,
        }
    }

    #[test]
    fn file_inode_is_persisted() {
        let mut f = fixture(64, 8);
        let id = f.table.allocate_file(&f.store, &mut f.free_list, &mut f.sb).unwrap();
        let inode = f.table.get(id).unwrap().clone();
        assert_eq!(inode.links_cnt, 1);
        assert_eq!(inode.size, 0);
        assert!(!inode.indirect);
        assert_eq!(inode.atime, inode.mtime);
        assert_eq!(read_inode(&f.store, id).unwrap(), inode);
        assert_eq!(f.sb.free_inodes, 6);
    }

    #[test]
    fn directory_record_fits_full_entry_list() {
        let mut inode = Inode::new_directory(30, 26);
        for i in 2..MAX_DIR_ENTRIES {
            let name = format!("{:0>50}", i);
            inode.entries.push(DirEntry::new(FileType::Regular, &name, 9999).unwrap());
        }
        let store = MemStore::new(MAX_BLOCKS);
        write_inode(&store, 30, &inode).unwrap();
        assert_eq!(read_inode(&store, 30).unwrap().subn(), MAX_DIR_ENTRIES);
    }

    #[test]
    fn failed_second_allocation_rolls_back() {
        // Exactly one allocatable block: the inode fits, its data block does not.
        let mut f = fixture(4, 8);
        let free_before = f.sb.free_blocks;
        let inodes_before = f.sb.free_inodes;
        let err = f.table.allocate_file(&f.store, &mut f.free_list, &mut f.sb).unwrap_err();
        assert!(matches!(err, Error::OutOfSpace));
        assert_eq!(f.sb.free_blocks, free_before);
        assert_eq!(f.sb.free_inodes, inodes_before);
        assert_eq!(f.table.ids().count(), 0);
    }

    #[test]
    fn inode_budget_is_enforced() {
        let mut f = fixture(64, 2);
        f.table.allocate_directory(&f.store, &mut f.free_list, &mut f.sb, 2).unwrap();
        let err = f
            .table
            .allocate_directory(&f.store, &mut f.free_list, &mut f.sb, 2)
            .unwrap_err();
        assert!(matches!(err, Error::OutOfSpace));
    }

    #[test]
    fn reclaim_frees_the_inode_block() {
        let mut f = fixture(64, 8);
        let id = f.table.allocate_directory(&f.store, &mut f.free_list, &mut f.sb, 2).unwrap();
        f.table.reclaim(&f.store, &mut f.free_list, &mut f.sb, id).unwrap();
        assert!(f.table.get(id).is_err());
        assert!(f.free_list.is_free(id));
        assert!(f.store.read(id).unwrap().is_empty());
    }
}
