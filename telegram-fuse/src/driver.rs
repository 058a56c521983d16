mod error;
#[cfg(target_family = "unix")]
#[cfg_attr(docsrs, doc(cfg(target_family = "unix")))]
mod unix;

use std::collections::HashMap;

pub use self::error::{DriverError, DriverResult};
#[cfg(target_family = "unix")]
pub use self::unix::FsStatistics;
use crate::client::ChannelClient;
use crate::db::MetaDb;

/// Channel filesystem driver.
///
/// Satisfies kernel upcalls from the metadata store and a [`ChannelClient`]:
/// the directory tree and inode attributes live in the embedded database,
/// file content lives in the remote channel and is staged in memory between
/// `write` and `release`.
pub struct Driver {
    pub(crate) db: MetaDb,
    pub(crate) client: ChannelClient,
    /// Outstanding opens per inode. Deleting an unlinked inode is deferred
    /// until its count drops back to zero.
    pub(crate) open_count: HashMap<u64, u64>,
    /// Staging buffer shared by every open file: at most one file may be
    /// mid-write at a time. Flushed and cleared on `release`.
    pub(crate) write_buffer: Vec<u8>,
}

impl Driver {
    /// Create a new [`Driver`] over an opened metadata store and channel
    /// client.
    pub fn new(db: MetaDb, client: ChannelClient) -> Self {
        Self {
            db,
            client,
            open_count: HashMap::new(),
            write_buffer: Vec::new(),
        }
    }
}
