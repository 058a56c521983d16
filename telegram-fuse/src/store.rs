mod disk;
mod memory;

use thiserror::Error;

pub use self::disk::DiskChannel;
pub use self::memory::{MemoryChannel, Message};

/// Identifier of a message in the remote channel.
///
/// Ids are allocated by the channel, are strictly increasing, and are never
/// reused. A file chunked over several messages is reassembled by fetching its
/// ids in ascending order.
pub type MessageId = i64;

/// Size of a single network part when transferring a payload.
///
/// Transports report progress once per part.
pub const NETWORK_PART_SIZE: usize = 512 * 1024;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no message with id {0} in the channel")]
    NoSuchMessage(MessageId),
    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Transfer progress callback, called with `(bytes transferred, total bytes)`.
pub type Progress<'a> = &'a mut dyn FnMut(u64, u64);

/// An append-only object store addressed by [`MessageId`].
///
/// This is the seam between the filesystem engine and the concrete remote
/// protocol: the engine only ever posts opaque blobs, fetches them back by id
/// and deletes them. [`MemoryChannel`] and [`DiskChannel`] are the in-tree
/// implementations; an MTProto transport plugs in the same way.
pub trait ChannelStore: Send {
    /// Post one blob to the channel under an object name.
    ///
    /// Returns the id assigned by the channel. `progress` is driven once per
    /// [`NETWORK_PART_SIZE`] part.
    fn send(&mut self, name: &str, payload: &[u8], progress: Progress) -> StoreResult<MessageId>;

    /// Fetch the payload of one message.
    fn fetch(&mut self, id: MessageId) -> StoreResult<Vec<u8>>;

    /// Remove messages from the channel. Unknown ids are ignored.
    fn delete(&mut self, ids: &[MessageId]) -> StoreResult<()>;
}

/// Drive `progress` over `total` bytes in [`NETWORK_PART_SIZE`] steps.
pub(crate) fn report_parts(total: usize, progress: Progress) {
    let total = total as u64;
    let mut sent = 0u64;
    loop {
        sent = (sent + NETWORK_PART_SIZE as u64).min(total);
        progress(sent, total);
        if sent >= total {
            return;
        }
    }
}
