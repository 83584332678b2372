mod cli;

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use fusevfs::{Error, FileStore, FileSystem, FsConfig, BLOCK_SIZE};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("store={:?}\nsource={:?}", cli.store, cli.source);

    fs::create_dir_all(&cli.store)?;
    let config = FsConfig::new(cli.max_blocks, cli.max_inodes)?;
    let store = Arc::new(FileStore::new(cli.store.clone(), cli.max_blocks)?);
    let mut vfs = FileSystem::format(store, config)?;

    if let Some(source) = &cli.source {
        mirror(&mut vfs, source, "")?;
    }

    let stat = vfs.statfs();
    println!(
        "blocks: {}/{} free, inodes: {}/{} free, block size {}",
        stat.free_blocks, stat.blocks, stat.free_files, stat.files, stat.block_size
    );
    if cli.dump {
        print!("{}", vfs.dump());
    }

    let found = vfs.check();
    for finding in &found {
        println!("inconsistent: {finding}");
    }
    if !found.is_empty() {
        return Err(io::Error::other(format!("{} inconsistencies", found.len())));
    }
    Ok(())
}

/// Copies the host directory `host` into the directory `at` of the filesystem.
fn mirror(vfs: &mut FileSystem<FileStore>, host: &Path, at: &str) -> io::Result<()> {
    let mut entries = fs::read_dir(host)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non UTF-8 name {:?}", entry.path());
            continue;
        };
        let path = format!("{at}/{name}");
        let file_type = entry.file_type()?;

        let made = if file_type.is_dir() {
            vfs.mkdir(&path)
        } else if file_type.is_file() {
            vfs.create(&path)
        } else {
            log::warn!("skipping {:?}, not a file or directory", entry.path());
            continue;
        };
        match made {
            Ok(_) => {}
            Err(Error::InvalidName(_)) => {
                log::warn!("skipping {:?}, name not accepted", entry.path());
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        if file_type.is_dir() {
            mirror(vfs, &entry.path(), &path)?;
        } else {
            let data = fs::read(entry.path())?;
            for chunk in data.chunks(BLOCK_SIZE) {
                vfs.write(&path, chunk)?;
            }
            println!("file: {path} ({} bytes)", data.len());
        }
    }
    Ok(())
}
