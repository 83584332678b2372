//! FUSE-style callback surface.
//!
//! Every callback takes a path and returns a typed result; `FsError::errno()` turns failures into
//! what a kernel bridge expects. Callbacks that change anything take the write lock, the rest share
//! the read lock.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::check::Inconsistency;
use crate::{BlockStore, Error, FileSystem, FsConfig, Metadata, Result, StatFs};

pub struct Vfs<S: BlockStore> {
    fs: RwLock<FileSystem<S>>,
}

impl<S: BlockStore> Vfs<S> {
    /// Formats `store` and serves the empty filesystem.
    pub fn init(store: Arc<S>, config: FsConfig) -> Result<Self> {
        let fs = FileSystem::format(store, config)?;
        Ok(Self {
            fs: RwLock::new(fs),
        })
    }

    /// Deletes every block from the store.
    pub fn destroy(self) -> Result<()> {
        self.fs.into_inner().destroy()
    }

    pub fn getattr(&self, path: &str) -> Result<Metadata> {
        self.fs.read().get_attributes(path)
    }

    pub fn opendir(&self, path: &str) -> Result<()> {
        let attr = self.getattr(path)?;
        if !attr.ftype.is_dir() {
            return Err(Error::NotDirectory(path.to_string()));
        }
        Ok(())
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let fs = self.fs.read();
        let names = fs.list_directory(path)?.map(str::to_string).collect();
        Ok(names)
    }

    pub fn releasedir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    pub fn open(&self, path: &str) -> Result<()> {
        let attr = self.getattr(path)?;
        if attr.ftype.is_dir() {
            return Err(Error::IsDirectory(path.to_string()));
        }
        Ok(())
    }

    /// Up to `size` bytes from `offset`.
    pub fn read(&self, path: &str, size: usize, offset: u64) -> Result<Vec<u8>> {
        let fs = self.fs.read();
        match usize::try_from(offset) {
            Ok(offset) => fs.read_at(path, offset, size),
            // Past anything a file can hold.
            Err(_) => {
                fs.get_attributes(path)?;
                Ok(Vec::new())
            }
        }
    }

    /// Appends `data`. Writes only ever go to the end of the file, so `offset` is not honored.
    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> Result<usize> {
        let mut fs = self.fs.write();
        let size = fs.get_attributes(path)?.size;
        if offset != size {
            log::warn!("write to {path} at offset {offset} appends at {size} instead");
        }
        fs.write(path, data)
    }

    pub fn release(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    pub fn create(&self, path: &str, mode: u32) -> Result<Metadata> {
        let mut fs = self.fs.write();
        fs.create(path)?;
        fs.chmod(path, mode)?;
        fs.get_attributes(path)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<Metadata> {
        let mut fs = self.fs.write();
        fs.mkdir(path)?;
        fs.chmod(path, mode)?;
        fs.get_attributes(path)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.fs.write().rmdir(path)
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.fs.write().rename(from, to)
    }

    pub fn link(&self, from: &str, to: &str) -> Result<Metadata> {
        let mut fs = self.fs.write();
        fs.link(from, to)?;
        fs.get_attributes(to)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        self.fs.write().unlink(path)
    }

    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let mut fs = self.fs.write();
        if size == 0 {
            fs.truncate(path)
        } else {
            fs.set_len(path, size)
        }
    }

    pub fn statfs(&self) -> StatFs {
        self.fs.read().statfs()
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.fs.write().chmod(path, mode)
    }

    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.fs.write().chown(path, uid, gid)
    }

    pub fn utimens(&self, path: &str, atime: Option<i64>, mtime: Option<i64>) -> Result<()> {
        self.fs.write().utimens(path, atime, mtime)
    }

    pub fn check(&self) -> Vec<Inconsistency> {
        self.fs.read().check()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{EEXIST, EFBIG, ENOENT, EISDIR};
    use crate::MemStore;

    fn vfs() -> Vfs<MemStore> {
        let config = FsConfig::new(512, 64).unwrap();
        Vfs::init(Arc::new(MemStore::new(512)), config).unwrap()
    }

    #[test]
    fn errno_surface() {
        let vfs = vfs();
        assert_eq!(vfs.getattr("/nope").unwrap_err().errno(), ENOENT);
        vfs.mkdir("/d", 0o755).unwrap();
        assert_eq!(vfs.mkdir("/d", 0o755).unwrap_err().errno(), EEXIST);
        assert_eq!(vfs.open("/d").unwrap_err().errno(), EISDIR);
    }

    #[test]
    fn create_applies_permission_bits() {
        let vfs = vfs();
        let attr = vfs.create("/f", 0o600).unwrap();
        assert_eq!(attr.mode, 0o100600);
        assert_eq!(attr.links_cnt, 1);
    }

    #[test]
    fn write_ignores_offset() {
        let vfs = vfs();
        vfs.create("/f", 0o644).unwrap();
        vfs.write("/f", b"abc", 0).unwrap();
        vfs.write("/f", b"def", 0).unwrap();
        assert_eq!(vfs.read("/f", 100, 0).unwrap(), b"abcdef");
        assert_eq!(vfs.read("/f", 2, 4).unwrap(), b"ef");
    }

    #[test]
    fn truncate_to_length() {
        let vfs = vfs();
        vfs.create("/f", 0o644).unwrap();
        vfs.write("/f", b"0123456789", 0).unwrap();
        vfs.truncate("/f", 4).unwrap();
        assert_eq!(vfs.read("/f", 100, 0).unwrap(), b"0123");
        vfs.truncate("/f", 0).unwrap();
        assert_eq!(vfs.getattr("/f").unwrap().size, 0);
    }

    #[test]
    fn huge_sizes_and_offsets() {
        let vfs = vfs();
        vfs.create("/f", 0o644).unwrap();
        vfs.write("/f", b"abc", 0).unwrap();
        assert_eq!(vfs.truncate("/f", u64::MAX).unwrap_err().errno(), EFBIG);
        assert_eq!(vfs.getattr("/f").unwrap().size, 3);
        assert!(vfs.read("/f", 16, u64::MAX).unwrap().is_empty());
        assert_eq!(vfs.read("/missing", 16, u64::MAX).unwrap_err().errno(), ENOENT);
    }
}
