//! Path resolution.
//!
//! Paths are absolute and slash-delimited. Empty components are skipped, so `//a/` is `/a`.
//! Components are matched by exact name, `.` and `..` included since every directory stores them.

use crate::directory::dir_get;
use crate::inode::InodeTable;
use crate::{Error, Result};

pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Walks `names` from `start`. Missing components and files in the middle both count as
/// not found.
fn walk<'a>(
    table: &InodeTable,
    start: u32,
    path: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<u32> {
    let mut current = start;
    for name in names {
        let dir = table.get(current)?;
        if !dir.is_dir() {
            return Err(Error::not_found(path));
        }
        current = dir_get(dir, name)
            .map(|entry| entry.inode_id)
            .ok_or_else(|| Error::not_found(path))?;
    }
    Ok(current)
}

/// Inode id named by `path`.
pub fn resolve_leaf(table: &InodeTable, root: u32, path: &str) -> Result<u32> {
    walk(table, root, path, components(path))
}

/// Inode id of the directory containing the last component of `path`.
/// Single-component paths resolve to the root.
pub fn resolve_parent(table: &InodeTable, root: u32, path: &str) -> Result<u32> {
    let names: Vec<&str> = components(path).collect();
    let Some((_, parents)) = names.split_last() else {
        return Err(Error::InvalidName(path.to_string()));
    };
    let parent = walk(table, root, path, parents.iter().copied())?;
    if !table.get(parent)?.is_dir() {
        return Err(Error::not_found(path));
    }
    Ok(parent)
}

/// Last component of `path`.
pub fn leaf_name(path: &str) -> Result<&str> {
    components(path)
        .last()
        .ok_or_else(|| Error::InvalidName(path.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{DirEntry, FileType, Inode, MemStore};

    // /         (2)
    // ├── a     (3, dir)
    // │   └── f (5, file)
    // └── g     (4, file)
    fn tree() -> InodeTable {
        let store = MemStore::new(16);
        let mut table = InodeTable::new(16);
        let mut root = Inode::new_directory(2, 2);
        root.entries.push(DirEntry::new(FileType::Directory, "a", 3).unwrap());
        root.entries.push(DirEntry::new(FileType::Regular, "g", 4).unwrap());
        let mut a = Inode::new_directory(3, 2);
        a.entries.push(DirEntry::new(FileType::Regular, "f", 5).unwrap());
        table.insert(&store, 2, root).unwrap();
        table.insert(&store, 3, a).unwrap();
        table.insert(&store, 4, Inode::new_file(6)).unwrap();
        table.insert(&store, 5, Inode::new_file(7)).unwrap();
        table
    }

    #[test]
    fn leaf() {
        let t = tree();
        assert_eq!(resolve_leaf(&t, 2, "/").unwrap(), 2);
        assert_eq!(resolve_leaf(&t, 2, "/a").unwrap(), 3);
        assert_eq!(resolve_leaf(&t, 2, "/a/f").unwrap(), 5);
        assert_eq!(resolve_leaf(&t, 2, "//a///f/").unwrap(), 5);
        assert_eq!(resolve_leaf(&t, 2, "/a/..").unwrap(), 2);
        assert!(matches!(resolve_leaf(&t, 2, "/b"), Err(Error::NotFound(_))));
        assert!(matches!(resolve_leaf(&t, 2, "/g/x"), Err(Error::NotFound(_))));
    }

    #[test]
    fn parent() {
        let t = tree();
        assert_eq!(resolve_parent(&t, 2, "/new").unwrap(), 2);
        assert_eq!(resolve_parent(&t, 2, "/a/new").unwrap(), 3);
        assert!(matches!(resolve_parent(&t, 2, "/missing/new"), Err(Error::NotFound(_))));
        assert!(matches!(resolve_parent(&t, 2, "/g/new"), Err(Error::NotFound(_))));
        assert!(resolve_parent(&t, 2, "/").is_err());
    }

    #[test]
    fn names() {
        assert_eq!(leaf_name("/a/b/c").unwrap(), "c");
        assert_eq!(leaf_name("/top").unwrap(), "top");
        assert!(leaf_name("/").is_err());
    }
}
