//! Directory entry lists.
//!
//! Entries live inline in the directory inode. The list is kept dense and in insertion order,
//! with '.' and '..' always in the first two slots.

use crate::error::{FsError, Result};
use crate::config::*;
use crate::structs::*;

/// Position of `name` in the directory, if present.
pub fn dir_lookup(dir: &Inode, name: &str) -> Option<usize> {
    dir.entries.iter().position(|entry| entry.name == name)
}

pub fn dir_get<'a>(dir: &'a Inode, name: &str) -> Option<&'a DirEntry> {
    dir_lookup(dir, name).map(|index| &dir.entries[index])
}

/// Checks that `name` may be used for a new entry.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    if name == DOT_NAME || name == DOTDOT_NAME {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Appends a new entry. Does not touch the link count of the child, that is up to the caller.
pub fn dir_add_entry(dir: &mut Inode, dir_id: u32, entry: DirEntry) -> Result<()> {
    if !dir.is_dir() {
        return Err(FsError::NotDirectory(format!("inode {dir_id}")));
    }
    if dir_lookup(dir, &entry.name).is_some() {
        return Err(FsError::already_exists(entry.name));
    }
    if dir.subn() >= MAX_DIR_ENTRIES {
        return Err(FsError::CapacityExceeded {
            dir: dir_id,
            max: MAX_DIR_ENTRIES,
        });
    }
    dir.entries.push(entry);
    Ok(())
}

/// Removes the entry named `name`, shifting later entries down.
/// Would not reclaim anything the entry pointed to.
pub fn dir_rm_entry(dir: &mut Inode, dir_id: u32, name: &str) -> Result<DirEntry> {
    if name == DOT_NAME || name == DOTDOT_NAME {
        return Err(FsError::InvalidName(name.to_string()));
    }
    let Some(index) = dir_lookup(dir, name) else {
        return Err(FsError::not_found(name));
    };
    if index < 2 {
        return Err(FsError::invariant(format!(
            "entry {name:?} sits in a reserved slot of directory {dir_id}"
        )));
    }
    Ok(dir.entries.remove(index))
}

/// True when only '.' and '..' are left.
pub fn dir_is_empty(dir: &Inode) -> bool {
    dir.entries.iter().all(DirEntry::is_dot)
}

/// Entry names in order. The iterator borrows the directory, so it is neither restartable nor
/// valid past the next mutation.
pub fn read_dir(dir: &Inode) -> impl Iterator<Item = &str> {
    dir.entries.iter().map(|entry| entry.name.as_str())
}

/// Points '..' at a new parent.
pub fn set_parent(dir: &mut Inode, dir_id: u32, parent_id: u32) -> Result<()> {
    match dir.entries.get_mut(1) {
        Some(entry) if entry.name == DOTDOT_NAME => {
            entry.inode_id = parent_id;
            Ok(())
        }
        _ => Err(FsError::invariant(format!(
            "directory {dir_id} has no '..' in its second slot"
        ))),
    }
}

/// Number of subdirectories, '.' and '..' excluded.
pub fn subdir_count(dir: &Inode) -> usize {
    dir.entries
        .iter()
        .filter(|entry| !entry.is_dot() && entry.ftype == FileType::Directory)
        .count()
}
