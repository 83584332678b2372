use std::fmt::Write as _;
use std::sync::Arc;

use crate::directory::{
    check_name, dir_add_entry, dir_get, dir_is_empty, dir_rm_entry, read_dir, set_parent,
};
use crate::file::{fread, fread_at, ftruncate, fwrite, release_content};
use crate::inode::{now, InodeTable};
use crate::path::{leaf_name, resolve_leaf, resolve_parent};
use crate::superblock::write_superblock;
use crate::{
    config::*, BlockStore, DirEntry, Error, FileType, FreeList, FsConfig, Inode, Metadata, Result,
    StatFs, SuperBlock,
};

const MAX_DUMP_DEPTH: usize = 64;

/// The whole filesystem state. Methods take `&mut self` for anything that mutates; callers
/// sharing an instance wrap it in a lock (see [`crate::Vfs`]).
#[derive(Debug)]
pub struct FileSystem<S: BlockStore> {
    pub(crate) store: Arc<S>,
    pub(crate) superblock: SuperBlock,
    pub(crate) free_list: FreeList,
    pub(crate) inodes: InodeTable,
}

impl<S: BlockStore> FileSystem<S> {
    /// Builds an empty filesystem on `store`, wiping whatever it held. There is no mount of an
    /// existing image: every start is a fresh format.
    pub fn format(store: Arc<S>, config: FsConfig) -> Result<Self> {
        config.validate()?;
        if config.max_blocks > store.num_blocks() {
            return Err(Error::InvalidConfig(format!(
                "{} blocks requested, store holds {}",
                config.max_blocks,
                store.num_blocks()
            )));
        }

        for block_id in 0..config.max_blocks {
            store.erase(block_id)?;
        }

        let superblock = SuperBlock::new(&config, now());
        write_superblock(&*store, &superblock)?;
        let free_list = FreeList::format(&*store, &config)?;

        let root = superblock.root;
        let mut inodes = InodeTable::new(config.max_blocks);
        inodes.insert(&*store, root, Inode::new_directory(root, root))?;

        log::info!(
            "formatted {} blocks, root inode {}, {} blocks free",
            config.max_blocks,
            root,
            superblock.free_blocks
        );
        Ok(Self {
            store,
            superblock,
            free_list,
            inodes,
        })
    }

    pub fn root_inode_id(&self) -> u32 {
        self.superblock.root
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn get_inode(&self, inode_id: u32) -> Result<&Inode> {
        self.inodes.get(inode_id)
    }

    pub fn is_block_free(&self, block_id: u32) -> bool {
        self.free_list.is_free(block_id)
    }

    /// Inode id named by `path`.
    pub fn lookup(&self, path: &str) -> Result<u32> {
        resolve_leaf(&self.inodes, self.superblock.root, path)
    }

    /// (parent directory id, leaf name) for a path whose leaf is about to be added or removed.
    fn parent_of<'p>(&self, path: &'p str) -> Result<(u32, &'p str)> {
        let parent_id = resolve_parent(&self.inodes, self.superblock.root, path)?;
        let name = leaf_name(path)?;
        Ok((parent_id, name))
    }

    /// Fails early, before anything is allocated, if `name` cannot be added to `dir_id`.
    fn check_insertable(&self, dir_id: u32, name: &str) -> Result<()> {
        check_name(name)?;
        let dir = self.inodes.get(dir_id)?;
        if dir_get(dir, name).is_some() {
            return Err(Error::already_exists(name));
        }
        if dir.subn() >= MAX_DIR_ENTRIES {
            return Err(Error::CapacityExceeded {
                dir: dir_id,
                max: MAX_DIR_ENTRIES,
            });
        }
        Ok(())
    }

    /// Adds an entry to a directory and persists it.
    fn link_entry(&mut self, dir_id: u32, entry: DirEntry, subdir: bool) -> Result<()> {
        self.inodes.update(&*self.store, dir_id, |dir| -> Result<()> {
            dir_add_entry(dir, dir_id, entry)?;
            if subdir {
                dir.links_cnt += 1;
            }
            let now = now();
            dir.mtime = now;
            dir.ctime = now;
            Ok(())
        })?
    }

    /// Removes an entry from a directory and persists it.
    fn unlink_entry(&mut self, dir_id: u32, name: &str) -> Result<DirEntry> {
        self.inodes.update(&*self.store, dir_id, |dir| -> Result<DirEntry> {
            let entry = dir_rm_entry(dir, dir_id, name)?;
            if entry.ftype == FileType::Directory {
                dir.links_cnt -= 1;
            }
            let now = now();
            dir.mtime = now;
            dir.ctime = now;
            Ok(entry)
        })?
    }

    /// Creates an empty regular file. Returns its inode id.
    pub fn create(&mut self, path: &str) -> Result<u32> {
        let (parent_id, name) = self.parent_of(path)?;
        self.check_insertable(parent_id, name)?;

        let inode_id =
            self.inodes
                .allocate_file(&*self.store, &mut self.free_list, &mut self.superblock)?;
        let entry = DirEntry::new(FileType::Regular, name, inode_id)?;
        if let Err(e) = self.link_entry(parent_id, entry, false) {
            self.reclaim_file(inode_id)?;
            return Err(e);
        }

        log::debug!("create {path} -> inode {inode_id}");
        Ok(inode_id)
    }

    /// Creates an empty directory. Returns its inode id.
    pub fn mkdir(&mut self, path: &str) -> Result<u32> {
        let (parent_id, name) = self.parent_of(path)?;
        self.check_insertable(parent_id, name)?;

        let inode_id = self.inodes.allocate_directory(
            &*self.store,
            &mut self.free_list,
            &mut self.superblock,
            parent_id,
        )?;
        let entry = DirEntry::new(FileType::Directory, name, inode_id)?;
        if let Err(e) = self.link_entry(parent_id, entry, true) {
            self.inodes.reclaim(
                &*self.store,
                &mut self.free_list,
                &mut self.superblock,
                inode_id,
            )?;
            return Err(e);
        }

        log::debug!("mkdir {path} -> inode {inode_id}");
        Ok(inode_id)
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent_id, name) = self.parent_of(path)?;
        check_name(name)?;
        let dir_id = self.lookup(path)?;
        let dir = self.inodes.get(dir_id)?;
        if !dir.is_dir() {
            return Err(Error::NotDirectory(path.to_string()));
        }
        if !dir_is_empty(dir) {
            return Err(Error::NotEmpty(path.to_string()));
        }

        self.unlink_entry(parent_id, name)?;
        self.inodes.reclaim(
            &*self.store,
            &mut self.free_list,
            &mut self.superblock,
            dir_id,
        )?;
        log::debug!("rmdir {path} (inode {dir_id})");
        Ok(())
    }

    /// Removes a name of a file; the file goes away with its last name.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent_id, name) = self.parent_of(path)?;
        check_name(name)?;
        let inode_id = self.lookup(path)?;
        if self.inodes.get(inode_id)?.is_dir() {
            return Err(Error::IsDirectory(path.to_string()));
        }

        self.unlink_entry(parent_id, name)?;
        let links = self.inodes.update(&*self.store, inode_id, |inode| {
            inode.links_cnt -= 1;
            inode.ctime = now();
            inode.links_cnt
        })?;
        if links == 0 {
            self.reclaim_file(inode_id)?;
        }
        log::debug!("unlink {path} (inode {inode_id}, {links} links left)");
        Ok(())
    }

    fn reclaim_file(&mut self, inode_id: u32) -> Result<()> {
        let inode = self.inodes.get(inode_id)?;
        release_content(&*self.store, &mut self.free_list, &mut self.superblock, inode)?;
        self.inodes.reclaim(
            &*self.store,
            &mut self.free_list,
            &mut self.superblock,
            inode_id,
        )?;
        Ok(())
    }

    /// Adds `to` as another name for the file at `from`.
    pub fn link(&mut self, from: &str, to: &str) -> Result<u32> {
        let inode_id = self.lookup(from)?;
        if self.inodes.get(inode_id)?.is_dir() {
            return Err(Error::IsDirectory(from.to_string()));
        }
        let (parent_id, name) = self.parent_of(to)?;
        self.check_insertable(parent_id, name)?;

        let entry = DirEntry::new(FileType::Regular, name, inode_id)?;
        self.link_entry(parent_id, entry, false)?;
        self.inodes.update(&*self.store, inode_id, |inode| {
            inode.links_cnt += 1;
            inode.ctime = now();
        })?;
        log::debug!("link {from} -> {to} (inode {inode_id})");
        Ok(inode_id)
    }

    /// Moves an entry. An existing destination is an error, never replaced.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (from_parent, from_name) = self.parent_of(from)?;
        check_name(from_name)?;
        let entry = dir_get(self.inodes.get(from_parent)?, from_name)
            .cloned()
            .ok_or_else(|| Error::not_found(from))?;
        let (to_parent, to_name) = self.parent_of(to)?;
        check_name(to_name)?;
        if dir_get(self.inodes.get(to_parent)?, to_name).is_some() {
            return Err(Error::already_exists(to));
        }

        let is_dir = entry.ftype == FileType::Directory;
        if is_dir && self.is_within(to_parent, entry.inode_id)? {
            return Err(Error::InvalidName(format!("{to} is inside {from}")));
        }

        if from_parent == to_parent {
            self.inodes.update(&*self.store, from_parent, |dir| {
                if let Some(entry) = dir.entries.iter_mut().find(|e| e.name == from_name) {
                    entry.name = to_name.to_string();
                }
                let now = now();
                dir.mtime = now;
                dir.ctime = now;
            })?;
        } else {
            self.check_insertable(to_parent, to_name)?;
            let moved = DirEntry::new(entry.ftype, to_name, entry.inode_id)?;
            self.link_entry(to_parent, moved, is_dir)?;
            self.unlink_entry(from_parent, from_name)?;
            if is_dir {
                let moved_id = entry.inode_id;
                self.inodes.update(&*self.store, moved_id, |dir| {
                    set_parent(dir, moved_id, to_parent)
                })??;
            }
        }

        self.inodes.update(&*self.store, entry.inode_id, |inode| inode.ctime = now())?;
        log::debug!("rename {from} -> {to} (inode {})", entry.inode_id);
        Ok(())
    }

    /// True if `dir_id` is `ancestor` or lies below it.
    fn is_within(&self, mut dir_id: u32, ancestor: u32) -> Result<bool> {
        let root = self.superblock.root;
        // Bounded by the tree depth; a longer walk means '..' links form a cycle.
        for _ in 0..self.superblock.max_blocks {
            if dir_id == ancestor {
                return Ok(true);
            }
            if dir_id == root {
                return Ok(false);
            }
            dir_id = dir_get(self.inodes.get(dir_id)?, DOTDOT_NAME)
                .map(|entry| entry.inode_id)
                .ok_or_else(|| Error::invariant(format!("directory {dir_id} lacks '..'")))?;
        }
        Err(Error::invariant("'..' links form a cycle"))
    }

    /// Appends to a file. Returns the number of bytes written.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<usize> {
        let inode_id = self.lookup(path)?;
        fwrite(
            &*self.store,
            &mut self.free_list,
            &mut self.superblock,
            &mut self.inodes,
            inode_id,
            data,
        )
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let inode = self.inodes.get(self.lookup(path)?)?;
        if inode.is_dir() {
            return Err(Error::IsDirectory(path.to_string()));
        }
        fread(&*self.store, inode)
    }

    pub fn read_at(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        let inode = self.inodes.get(self.lookup(path)?)?;
        if inode.is_dir() {
            return Err(Error::IsDirectory(path.to_string()));
        }
        fread_at(&*self.store, inode, offset, len)
    }

    /// Empties a file.
    pub fn truncate(&mut self, path: &str) -> Result<()> {
        let inode_id = self.lookup(path)?;
        ftruncate(
            &*self.store,
            &mut self.free_list,
            &mut self.superblock,
            &mut self.inodes,
            inode_id,
        )
    }

    /// Cuts or zero-extends a file to `len` bytes.
    pub fn set_len(&mut self, path: &str, len: u64) -> Result<()> {
        let size = self.get_attributes(path)?.size;
        if len == size {
            return Ok(());
        }
        if len > (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64 {
            return Err(Error::FileTooLarge {
                max: MAX_FILE_BLOCKS,
            });
        }
        if len > size {
            let padding = vec![0u8; (len - size) as usize];
            self.write(path, &padding)?;
            return Ok(());
        }
        let mut content = self.read(path)?;
        content.truncate(len as usize);
        self.truncate(path)?;
        self.write(path, &content)?;
        Ok(())
    }

    pub fn get_attributes(&self, path: &str) -> Result<Metadata> {
        let inode_id = self.lookup(path)?;
        Ok(Metadata::from_inode(inode_id, self.inodes.get(inode_id)?))
    }

    /// Entry names of a directory, '.' and '..' first.
    pub fn list_directory(&self, path: &str) -> Result<impl Iterator<Item = &str>> {
        let dir = self.inodes.get(self.lookup(path)?)?;
        if !dir.is_dir() {
            return Err(Error::NotDirectory(path.to_string()));
        }
        Ok(read_dir(dir))
    }

    pub fn chmod(&mut self, path: &str, mode: u32) -> Result<()> {
        let inode_id = self.lookup(path)?;
        self.inodes.update(&*self.store, inode_id, |inode| {
            // File type bits stay as they are.
            inode.mode = (inode.mode & !0o7777) | (mode & 0o7777);
            inode.ctime = now();
        })
    }

    pub fn chown(&mut self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let inode_id = self.lookup(path)?;
        self.inodes.update(&*self.store, inode_id, |inode| {
            if let Some(uid) = uid {
                inode.uid = uid;
            }
            if let Some(gid) = gid {
                inode.gid = gid;
            }
            inode.ctime = now();
        })
    }

    pub fn utimens(&mut self, path: &str, atime: Option<i64>, mtime: Option<i64>) -> Result<()> {
        let inode_id = self.lookup(path)?;
        self.inodes.update(&*self.store, inode_id, |inode| {
            if let Some(atime) = atime {
                inode.atime = atime;
            }
            if let Some(mtime) = mtime {
                inode.mtime = mtime;
            }
            inode.ctime = now();
        })
    }

    pub fn statfs(&self) -> StatFs {
        StatFs {
            block_size: BLOCK_SIZE as u32,
            blocks: self.superblock.max_blocks,
            free_blocks: self.superblock.free_blocks,
            files: self.superblock.max_inodes,
            free_files: self.superblock.free_inodes,
            name_max: MAX_NAME_LEN as u32,
            fsid: FS_ID,
        }
    }

    /// Deletes every block from the store.
    pub fn destroy(self) -> Result<()> {
        for block_id in 0..self.superblock.max_blocks {
            self.store.delete(block_id)?;
        }
        log::info!("destroyed {} blocks", self.superblock.max_blocks);
        Ok(())
    }

    /// Human readable listing of the superblock and the tree.
    pub fn dump(&self) -> String {
        let sb = &self.superblock;
        let mut out = format!(
            "superblock: dev {} root {} blocks {}/{} free, inodes {}/{} free\n",
            sb.dev_id, sb.root, sb.free_blocks, sb.max_blocks, sb.free_inodes, sb.max_inodes
        );
        self.dump_dir(sb.root, "/", 0, &mut out);
        out
    }

    fn dump_dir(&self, dir_id: u32, name: &str, depth: usize, out: &mut String) {
        let Ok(dir) = self.inodes.get(dir_id) else {
            let _ = writeln!(out, "{:indent$}{name} -> missing inode {dir_id}", "", indent = depth * 2);
            return;
        };
        let _ = writeln!(
            out,
            "{:indent$}d {name} [{dir_id}] links {} entries {}",
            "",
            dir.links_cnt,
            dir.subn(),
            indent = depth * 2
        );
        for entry in dir.entries.iter().filter(|e| !e.is_dot()) {
            match entry.ftype {
                FileType::Directory if depth < MAX_DUMP_DEPTH => {
                    self.dump_dir(entry.inode_id, &entry.name, depth + 1, out)
                }
                _ => {
                    let detail = match self.inodes.get(entry.inode_id) {
                        Ok(inode) => format!(
                            "size {} links {} {} {}",
                            inode.size,
                            inode.links_cnt,
                            if inode.indirect { "index" } else { "data" },
                            inode.location
                        ),
                        Err(_) => "missing".to_string(),
                    };
                    let _ = writeln!(
                        out,
                        "{:indent$}{} {} [{}] {detail}",
                        "",
                        entry.ftype.tag(),
                        entry.name,
                        entry.inode_id,
                        indent = (depth + 1) * 2
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemStore;

    fn fs() -> FileSystem<MemStore> {
        let config = FsConfig::new(256, 64).unwrap();
        FileSystem::format(Arc::new(MemStore::new(256)), config).unwrap()
    }

    #[test]
    fn root_layout() {
        let fs = fs();
        let root = fs.get_inode(fs.root_inode_id()).unwrap();
        assert_eq!(root.links_cnt, 2);
        assert_eq!(fs.list_directory("/").unwrap().collect::<Vec<_>>(), vec![".", ".."]);
        assert_eq!(fs.lookup("/..").unwrap(), fs.root_inode_id());
    }

    #[test]
    fn create_rolls_back_when_parent_is_full() {
        let mut fs = fs();
        for i in 2..MAX_DIR_ENTRIES {
            fs.create(&format!("/f{i}")).unwrap();
        }
        let free = fs.superblock().free_blocks;
        assert!(matches!(fs.create("/one_more"), Err(Error::CapacityExceeded { .. })));
        assert_eq!(fs.superblock().free_blocks, free);
        assert!(fs.lookup("/one_more").is_err());
    }

    #[test]
    fn rename_into_own_subtree_is_refused() {
        let mut fs = fs();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert!(matches!(fs.rename("/a", "/a/b/c"), Err(Error::InvalidName(_))));
        assert!(fs.lookup("/a/b").is_ok());
    }

    #[test]
    fn dump_lists_tree() {
        let mut fs = fs();
        fs.mkdir("/dir").unwrap();
        fs.create("/dir/file").unwrap();
        let dump = fs.dump();
        assert!(dump.contains("d dir"));
        assert!(dump.contains("f file"));
    }

    #[test]
    fn chmod_keeps_type_bits() {
        let mut fs = fs();
        fs.create("/f").unwrap();
        fs.chmod("/f", 0o600).unwrap();
        assert_eq!(fs.get_attributes("/f").unwrap().mode, 0o100600);
    }

    #[test]
    fn set_len_shrinks_and_pads() {
        let mut fs = fs();
        fs.create("/f").unwrap();
        fs.write("/f", b"hello world").unwrap();
        fs.set_len("/f", 5).unwrap();
        assert_eq!(fs.read("/f").unwrap(), b"hello");
        fs.set_len("/f", 7).unwrap();
        assert_eq!(fs.read("/f").unwrap(), b"hello\0\0");
    }

    #[test]
    fn set_len_past_file_limit() {
        let mut fs = fs();
        fs.create("/f").unwrap();
        fs.write("/f", b"abc").unwrap();
        let free = fs.statfs();
        let limit = (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64;
        for len in [limit + 1, u64::MAX] {
            assert!(matches!(fs.set_len("/f", len), Err(Error::FileTooLarge { .. })));
        }
        assert_eq!(fs.read("/f").unwrap(), b"abc");
        assert_eq!(fs.statfs(), free);
    }
}
