use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub creation_time: i64,
    pub mounted: u32,
    pub dev_id: u32,
    pub free_start: u32,    // First block holding a free-list chunk
    pub free_end: u32,      // Last block holding a free-list chunk
    pub root: u32,          // Inode id of the root directory
    pub max_blocks: u32,
    pub max_inodes: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
}

impl FileType {
    pub fn is_dir(&self) -> bool {
        *self == FileType::Directory
    }

    /// One-letter tag used by the tree dump.
    pub fn tag(&self) -> char {
        match self {
            FileType::Regular => 'f',
            FileType::Directory => 'd',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub ftype: FileType,
    pub name: String,
    pub inode_id: u32,
}

impl DirEntry {
    pub fn new(ftype: FileType, name: &str, inode_id: u32) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(Self {
            ftype,
            name: name.to_string(),
            inode_id,
        })
    }

    pub fn is_dot(&self) -> bool {
        self.name == DOT_NAME || self.name == DOTDOT_NAME
    }
}

/// Inode record. Its id is the block it is persisted in.
///
/// A regular file owns either one data block (`location`) or, when `indirect` is set, an index
/// block (`location`) listing its data blocks. A directory keeps its entries inline and owns no
/// block besides its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub ftype: FileType,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub links_cnt: u32,
    pub indirect: bool,
    pub location: u32,
    pub entries: Vec<DirEntry>,
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    /// Number of directory entries, '.' and '..' included.
    pub fn subn(&self) -> usize {
        self.entries.len()
    }
}

/// Attributes reported to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub inode_id: u32,
    pub ftype: FileType,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub links_cnt: u32,
    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,
}

impl Metadata {
    pub fn from_inode(inode_id: u32, inode: &Inode) -> Self {
        Self {
            inode_id,
            ftype: inode.ftype,
            size: inode.size,
            mode: inode.mode,
            uid: inode.uid,
            gid: inode.gid,
            links_cnt: inode.links_cnt,
            atime: inode.atime,
            ctime: inode.ctime,
            mtime: inode.mtime,
        }
    }
}

/// Filesystem statistics, `statvfs` shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u32,
    pub free_blocks: u32,
    pub files: u32,
    pub free_files: u32,
    pub name_max: u32,
    pub fsid: u64,
}
