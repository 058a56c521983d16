use std::path::PathBuf;

use argh::FromArgs;
use telegram_fuse::{ChannelStore, DiskChannel, MemoryChannel};

/// Mount a chat-channel object store as a local filesystem.
#[derive(FromArgs, Debug)]
pub struct CliArgs {
    /// where to mount the file system
    #[argh(positional)]
    pub mountpoint: PathBuf,
    /// enable debugging output
    #[argh(switch)]
    pub debug: bool,
    /// enable FUSE debugging output
    #[argh(switch)]
    pub debug_fuse: bool,
    /// name of the mounted filesystem volume
    #[argh(option, default = "String::from(\"telegram_fuse\")")]
    pub volume: String,
    /// directory backing the channel store
    #[argh(option, default = "PathBuf::from(\"telegram.store\")")]
    pub store_dir: PathBuf,
    /// keep channel messages in memory instead of on disk
    #[argh(switch)]
    pub memory: bool,
}

impl CliArgs {
    pub fn init_logger(&self) -> anyhow::Result<()> {
        let level = if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new().filter_level(level).try_init()?;

        Ok(())
    }

    /// Create the channel store backend from the CLI arguments
    pub fn store(&self) -> anyhow::Result<Box<dyn ChannelStore>> {
        if self.memory {
            log::info!("using an in-memory channel store");
            Ok(Box::new(MemoryChannel::new()))
        } else {
            log::info!("using a disk channel store at {}", self.store_dir.display());
            Ok(Box::new(DiskChannel::open(&self.store_dir)?))
        }
    }
}
