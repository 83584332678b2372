//! Consistency checker.
//!
//! Walks the tree from the root and cross-checks it against the allocator, the counters and the
//! persisted records. Nothing is repaired; every finding is returned to the caller.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::directory::subdir_count;
use crate::file::block_list;
use crate::freelist::FreeList;
use crate::inode::{now, read_inode};
use crate::superblock::read_superblock;
use crate::{config::*, BlockStore, FileSystem, FileType, Inode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Inconsistency {
    #[error("superblock device id is {0}")]
    DeviceId(u32),

    #[error("inode {inode:?}: {field} {time} lies in the future")]
    FutureTimestamp {
        inode: Option<u32>,
        field: &'static str,
        time: i64,
    },

    #[error("directory {dir}: slot {slot} should be {name:?} -> {expected}, found {found:?}")]
    DotEntry {
        dir: u32,
        slot: usize,
        name: &'static str,
        expected: u32,
        found: Option<(String, u32)>,
    },

    #[error("directory {dir}: entry {name:?} points to missing inode {inode}")]
    DanglingEntry { dir: u32, name: String, inode: u32 },

    #[error("directory {dir}: entry {name:?} is typed {entry:?} but inode {inode} is {actual:?}")]
    EntryType {
        dir: u32,
        name: String,
        inode: u32,
        entry: FileType,
        actual: FileType,
    },

    #[error("directory {0} is reachable under more than one name")]
    DirectoryAlias(u32),

    #[error("inode {inode}: link count {found}, expected {expected}")]
    LinkCount { inode: u32, expected: u32, found: u32 },

    #[error("inode {inode}: indirect flag set but index block {location} is unusable")]
    IndirectFlag { inode: u32, location: u32 },

    #[error("inode {inode}: size {size} does not fit {blocks} data blocks")]
    Size { inode: u32, size: u64, blocks: usize },

    #[error("block {block} is in use by more than one owner")]
    SharedBlock { block: u32 },

    #[error("block {block} is reachable but marked free")]
    FreeButReachable { block: u32 },

    #[error("block {block} is allocated but unreachable")]
    Lost { block: u32 },

    #[error("inode {0} is in the table but unreachable")]
    Orphan(u32),

    #[error("{counter} counter is {recorded}, actual {actual}")]
    Counter {
        counter: &'static str,
        recorded: u32,
        actual: u32,
    },

    #[error("persisted record of block {block} differs from memory")]
    StaleRecord { block: u32 },

    #[error("block {block} unreadable: {reason}")]
    Unreadable { block: u32, reason: String },
}

/// Collects findings during one pass over the tree.
struct Checker<'a, S: BlockStore> {
    fs: &'a FileSystem<S>,
    now: i64,
    found: Vec<Inconsistency>,
    // Block id -> number of owners.
    owners: HashMap<u32, u32>,
    // File inode -> number of entries naming it.
    file_names: HashMap<u32, u32>,
    seen_dirs: HashSet<u32>,
}

impl<'a, S: BlockStore> Checker<'a, S> {
    fn own(&mut self, block: u32) {
        *self.owners.entry(block).or_default() += 1;
    }

    fn times(&mut self, inode_id: u32, inode: &Inode) {
        for (field, time) in [("atime", inode.atime), ("ctime", inode.ctime), ("mtime", inode.mtime)] {
            if time > self.now {
                self.found.push(Inconsistency::FutureTimestamp {
                    inode: Some(inode_id),
                    field,
                    time,
                });
            }
        }
    }

    fn dot_entry(&mut self, dir_id: u32, dir: &Inode, slot: usize, name: &'static str, expected: u32) {
        let entry = dir.entries.get(slot);
        if entry.is_some_and(|e| e.name == name && e.inode_id == expected) {
            return;
        }
        self.found.push(Inconsistency::DotEntry {
            dir: dir_id,
            slot,
            name,
            expected,
            found: entry.map(|e| (e.name.clone(), e.inode_id)),
        });
    }

    fn dir(&mut self, dir_id: u32, parent_id: u32) {
        if !self.seen_dirs.insert(dir_id) {
            self.found.push(Inconsistency::DirectoryAlias(dir_id));
            return;
        }
        let fs = self.fs;
        let Ok(dir) = fs.inodes.get(dir_id) else {
            return;
        };
        self.own(dir_id);
        self.times(dir_id, dir);
        self.dot_entry(dir_id, dir, 0, DOT_NAME, dir_id);
        self.dot_entry(dir_id, dir, 1, DOTDOT_NAME, parent_id);

        let expected_links = 2 + subdir_count(dir) as u32;
        if dir.links_cnt != expected_links {
            self.found.push(Inconsistency::LinkCount {
                inode: dir_id,
                expected: expected_links,
                found: dir.links_cnt,
            });
        }

        for entry in dir.entries.iter().filter(|e| !e.is_dot()) {
            let Ok(child) = fs.inodes.get(entry.inode_id) else {
                self.found.push(Inconsistency::DanglingEntry {
                    dir: dir_id,
                    name: entry.name.clone(),
                    inode: entry.inode_id,
                });
                continue;
            };
            if child.ftype != entry.ftype {
                self.found.push(Inconsistency::EntryType {
                    dir: dir_id,
                    name: entry.name.clone(),
                    inode: entry.inode_id,
                    entry: entry.ftype,
                    actual: child.ftype,
                });
                continue;
            }
            match child.ftype {
                FileType::Directory => self.dir(entry.inode_id, dir_id),
                FileType::Regular => {
                    let names = self.file_names.entry(entry.inode_id).or_default();
                    *names += 1;
                    if *names == 1 {
                        self.file(entry.inode_id, child);
                    }
                }
            }
        }
    }

    fn file(&mut self, inode_id: u32, inode: &Inode) {
        self.own(inode_id);
        self.times(inode_id, inode);

        let block_ids = match block_list(&*self.fs.store, inode) {
            Ok(block_ids) => block_ids,
            Err(_) if inode.indirect => {
                self.found.push(Inconsistency::IndirectFlag {
                    inode: inode_id,
                    location: inode.location,
                });
                return;
            }
            Err(e) => {
                self.found.push(Inconsistency::Unreadable {
                    block: inode.location,
                    reason: e.to_string(),
                });
                return;
            }
        };
        if inode.indirect {
            self.own(inode.location);
        }
        for &block in &block_ids {
            self.own(block);
        }

        let blocks = block_ids.len();
        let upper = (blocks * BLOCK_SIZE) as u64;
        let lower = if blocks > 1 { ((blocks - 1) * BLOCK_SIZE) as u64 + 1 } else { 0 };
        if inode.size < lower || inode.size > upper {
            self.found.push(Inconsistency::Size {
                inode: inode_id,
                size: inode.size,
                blocks,
            });
        }
    }
}

impl<S: BlockStore> FileSystem<S> {
    /// Runs every check and returns what it found. An empty list means consistent.
    pub fn check(&self) -> Vec<Inconsistency> {
        let mut checker = Checker {
            fs: self,
            now: now(),
            found: Vec::new(),
            owners: HashMap::new(),
            file_names: HashMap::new(),
            seen_dirs: HashSet::new(),
        };

        let sb = &self.superblock;
        if sb.dev_id != DEVICE_ID {
            checker.found.push(Inconsistency::DeviceId(sb.dev_id));
        }
        if sb.creation_time > checker.now {
            checker.found.push(Inconsistency::FutureTimestamp {
                inode: None,
                field: "creation_time",
                time: sb.creation_time,
            });
        }

        checker.dir(sb.root, sb.root);

        for (&inode_id, &names) in &checker.file_names {
            if let Ok(inode) = self.inodes.get(inode_id) {
                if inode.links_cnt != names {
                    checker.found.push(Inconsistency::LinkCount {
                        inode: inode_id,
                        expected: names,
                        found: inode.links_cnt,
                    });
                }
            }
        }
        let mut found = checker.found;
        found.extend(self.check_blocks(&checker.owners));
        found.extend(self.check_counters());
        found.extend(self.check_records());
        found.sort_by_key(|f| f.to_string());

        for finding in &found {
            log::warn!("check: {finding}");
        }
        found
    }

    fn check_blocks(&self, owners: &HashMap<u32, u32>) -> Vec<Inconsistency> {
        let mut found = Vec::new();
        let first_data = self.superblock.root + 1;
        for block in first_data..self.superblock.max_blocks {
            let owned = owners.get(&block).copied().unwrap_or(0);
            if owned > 1 {
                found.push(Inconsistency::SharedBlock { block });
            }
            match (owned > 0, self.free_list.is_free(block)) {
                (true, true) => found.push(Inconsistency::FreeButReachable { block }),
                (false, false) => found.push(Inconsistency::Lost { block }),
                _ => {}
            }
        }
        for inode_id in self.inodes.ids() {
            if !owners.contains_key(&inode_id) {
                found.push(Inconsistency::Orphan(inode_id));
            }
        }
        found
    }

    fn check_counters(&self) -> Vec<Inconsistency> {
        let sb = &self.superblock;
        let live_inodes = self.inodes.ids().filter(|&id| id != sb.root).count() as u32;
        let mut found = Vec::new();
        let free_blocks = self.free_list.free_count();
        if sb.free_blocks != free_blocks {
            found.push(Inconsistency::Counter {
                counter: "free_blocks",
                recorded: sb.free_blocks,
                actual: free_blocks,
            });
        }
        let free_inodes = (sb.max_inodes - 1).saturating_sub(live_inodes);
        if sb.free_inodes != free_inodes {
            found.push(Inconsistency::Counter {
                counter: "free_inodes",
                recorded: sb.free_inodes,
                actual: free_inodes,
            });
        }
        found
    }

    /// Compares what is on the store with the in-memory model.
    fn check_records(&self) -> Vec<Inconsistency> {
        let store = &*self.store;
        let mut found = Vec::new();

        match read_superblock(store) {
            Ok(sb) if sb == self.superblock => {}
            Ok(_) => found.push(Inconsistency::StaleRecord { block: SUPERBLOCK_ID }),
            Err(e) => found.push(Inconsistency::Unreadable {
                block: SUPERBLOCK_ID,
                reason: e.to_string(),
            }),
        }

        let sb = &self.superblock;
        for group in 0..=(sb.free_end - sb.free_start) {
            let block = sb.free_start + group;
            let base = group * FREE_GROUP_SIZE;
            let expected: Vec<u32> = (base..base + FREE_GROUP_SIZE)
                .filter(|&id| self.free_list.is_free(id))
                .collect();
            match FreeList::read_group(store, sb.free_start, group) {
                Ok(ids) if ids == expected => {}
                Ok(_) => found.push(Inconsistency::StaleRecord { block }),
                Err(e) => found.push(Inconsistency::Unreadable {
                    block,
                    reason: e.to_string(),
                }),
            }
        }

        for inode_id in self.inodes.ids() {
            let Ok(inode) = self.inodes.get(inode_id) else {
                continue;
            };
            match read_inode(store, inode_id) {
                Ok(record) if &record == inode => {}
                Ok(_) => found.push(Inconsistency::StaleRecord { block: inode_id }),
                Err(e) => found.push(Inconsistency::Unreadable {
                    block: inode_id,
                    reason: e.to_string(),
                }),
            }
        }
        found
    }
}
