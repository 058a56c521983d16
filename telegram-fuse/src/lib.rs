#![crate_name = "telegram_fuse"]
#![crate_type = "lib"]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # telegram-fuse
//!
//! **telegram-fuse** is a library that mounts a chat-channel object store as
//! a local filesystem using **FUSE**. Directory structure and inode
//! attributes live in an embedded SQLite database; file content is uploaded
//! to the channel as (optionally encrypted) chunked messages and fetched back
//! on demand through an in-memory content cache.
//!
//! ## Requirements
//!
//! - **Linux**: you need to have `fuse3` installed on your system.
//!
//!     Of course, you also need to have the `FUSE` kernel module installed.
//!     To build `telegram-fuse` on Linux, you need to have the `libfuse3`
//!     development package installed.
//!
//!     In Ubuntu, you can install it with:
//!
//!     ```sh
//!     sudo apt-get install fuse3 libfuse3-dev
//!     ```
//!
//! - **macOS**: you need to have the `macfuse` service installed on your
//!   system.
//!
//!     You can install it with:
//!
//!     ```sh
//!     brew install macfuse
//!     ```
//!
//! ## Get started
//!
//! First of all you need to add **telegram-fuse** to your project
//! dependencies:
//!
//! ```toml
//! telegram-fuse = "^0.1.0"
//! ```
//!
//! these features are supported:
//!
//! - `no-log`: disable logging. By default, this library will log via the
//!   `log` crate.
//!
//! ## Example
//!
//! ```rust,no_run,ignore
//! use telegram_fuse::{
//!     ChannelClient, Cipher, Config, DiskChannel, Driver, FsMount, MetaDb, MountConfig,
//! };
//!
//! let config = Config::from_env();
//! let db = MetaDb::open(&config.db_path)?;
//! let store = Box::new(DiskChannel::open(std::path::Path::new("telegram.store"))?);
//! let cipher = config.encryption_key.as_deref().map(Cipher::new);
//! let client = ChannelClient::new(store, cipher, config.cache_max_bytes);
//! let driver = Driver::new(db, client);
//!
//! let mount_path = std::path::PathBuf::from("/mnt/telegram");
//! let (mut mount, mut unmounter) =
//!     FsMount::mount(driver, &mount_path, &MountConfig::default()).expect("Failed to mount");
//!
//! // setup signal handler
//! ctrlc::set_handler(move || {
//!     unmounter.unmount().expect("Failed to unmount");
//! })?;
//!
//! mount.run().expect("Failed to run filesystem event loop");
//! ```

#[macro_use]
extern crate log;

mod client;
mod config;
mod db;
mod driver;
mod mount;
mod store;

pub use self::client::{
    ChannelClient, Cipher, ClientError, ContentCache, CryptoError, CACHE_MAX_BYTES,
    MESSAGE_MAX_SIZE,
};
pub use self::config::{ChannelCredentials, Config, DEFAULT_DB_PATH};
pub use self::db::{DbError, DirEntryRow, InodeRow, MetaDb, ROOT_INODE};
#[cfg(target_family = "unix")]
pub use self::driver::FsStatistics;
pub use self::driver::{Driver, DriverError, DriverResult};
pub use self::mount::MountConfig;
#[cfg(unix)]
pub use self::mount::{FsMount, Unmounter};
pub use self::store::{
    ChannelStore, DiskChannel, MemoryChannel, Message, MessageId, Progress, StoreError,
    NETWORK_PART_SIZE,
};
