//! fusevfs is a user-space filesystem engine meant to sit behind a FUSE-style bridge.
//! The whole model lives in memory and is mirrored, block by block, onto a block store.
//! Every mount formats the store afresh.
//!
//! Linear layout (default geometry):
//! - Block 0: Superblock
//! - Blocks 1..=25: Free-list chunks, 400 block ids each
//! - Block 26: Root directory inode
//! - Blocks 27..: Inodes, data blocks and index blocks, handed out lowest id first
//!
//! An inode id is the id of the block its record is stored in.
//!
//! Layers (from bottom to top):
//! 1. Block Store: read/write/erase/delete by block id.         | `MemStore`, `FileStore`, or user implemented
//! 2. Free List: which block ids are in use.                     | Persisted per chunk on every change
//! 3. Inode: metadata records, arena indexed by block id.        | Persisted on every change
//! 4. Directory/Path: entry lists and path resolution.
//! 5. File: direct and indirect content, append-by-rewrite.
//! 6. FileSystem: the operations, one owned state object.
//! 7. Vfs: FUSE-style callbacks, a reader-writer lock around the FileSystem.

mod config;
mod error;
mod store;
mod structs;
mod freelist;
mod superblock;
mod inode;
mod directory;
mod path;
mod file;
mod fs;
mod check;
mod bridge;

pub use config::*;
pub use error::{FsError as Error, Result};
pub use error::{
    EEXIST, EFBIG, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR, ENOTEMPTY,
};
pub use store::{BlockStore, FileStore, MemStore};
pub use structs::*;
pub use freelist::FreeList;
pub use superblock::*;
pub use inode::*;
pub use directory::*;
pub use path::*;
pub use file::*;
pub use fs::*;
pub use check::Inconsistency;
pub use bridge::Vfs;
