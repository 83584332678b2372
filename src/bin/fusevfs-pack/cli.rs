use clap::Parser;
use fusevfs::{MAX_BLOCKS, MAX_INODES};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory holding one file per block
    #[arg(long, short = 'S')]
    pub store: PathBuf,

    /// Host directory to copy into the new filesystem
    #[arg(long, short)]
    pub source: Option<PathBuf>,

    /// Number of blocks to format
    #[arg(long, default_value_t = MAX_BLOCKS)]
    pub max_blocks: u32,

    /// Inode budget
    #[arg(long, default_value_t = MAX_INODES)]
    pub max_inodes: u32,

    /// Print the tree after packing
    #[arg(long, short)]
    pub dump: bool,
}
