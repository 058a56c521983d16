mod cache;
mod crypto;

use bytes::Bytes;
use thiserror::Error;

use crate::store::{ChannelStore, MessageId, StoreError};

pub use self::cache::ContentCache;
pub use self::crypto::{Cipher, CryptoError};

/// Largest payload posted as a single message.
///
/// Content above this limit is split into chunks of this size before upload.
pub const MESSAGE_MAX_SIZE: usize = 2_000_000_000;

/// Default content cache budget in bytes.
pub const CACHE_MAX_BYTES: u64 = 5_000_000_000;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Client for file content kept in the remote channel.
///
/// Owns all interaction with the [`ChannelStore`]: chunking and encryption on
/// the way out, reassembly and decryption on the way in, and the in-memory
/// content cache keyed by inode.
pub struct ChannelClient {
    store: Box<dyn ChannelStore>,
    cipher: Option<Cipher>,
    cache: ContentCache,
    chunk_size: usize,
}

impl ChannelClient {
    pub fn new(store: Box<dyn ChannelStore>, cipher: Option<Cipher>, cache_max_bytes: u64) -> Self {
        info!("using encryption: {}", cipher.is_some());

        Self {
            store,
            cipher,
            cache: ContentCache::new(cache_max_bytes),
            chunk_size: MESSAGE_MAX_SIZE,
        }
    }

    /// Override the chunk cap. Intended for tests; the default is
    /// [`MESSAGE_MAX_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }

    /// Upload file content, returning the ids of the posted messages in
    /// reassembly order.
    ///
    /// Any cached content for `fh` is evicted first; the cache is repopulated
    /// by the next download, not here. When a cipher is configured the whole
    /// payload is sealed before chunking, so the chunk boundaries fall on the
    /// ciphertext.
    pub fn upload(&mut self, data: &[u8], fh: u64, file_name: &str) -> ClientResult<Vec<MessageId>> {
        self.cache.remove(fh);

        let payload = match &self.cipher {
            Some(cipher) => {
                debug!("encrypting {} bytes for inode {fh}", data.len());
                cipher.encrypt(data)?
            }
            None => data.to_vec(),
        };

        let chunks: Vec<&[u8]> = if payload.len() > self.chunk_size {
            payload.chunks(self.chunk_size).collect()
        } else {
            vec![&payload[..]]
        };

        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let name = format!("{file_name}_part{i}.txt");
            let mut progress = log_progress;
            ids.push(self.store.send(&name, chunk, &mut progress)?);
        }

        debug!("uploaded {} message(s) for inode {fh}", ids.len());
        Ok(ids)
    }

    /// Download and reassemble file content.
    ///
    /// A non-empty cache entry short-circuits the transfer. Otherwise the
    /// messages are fetched in the given order, concatenated, decrypted when a
    /// cipher is configured, and cached under `fh`.
    pub fn download(&mut self, fh: u64, ids: &[MessageId]) -> ClientResult<Bytes> {
        if let Some(content) = self.cache.get(fh) {
            debug!("cache hit for inode {fh}");
            return Ok(content);
        }

        let mut payload = Vec::new();
        for id in ids {
            payload.extend_from_slice(&self.store.fetch(*id)?);
        }
        debug!(
            "downloaded {} bytes over {} message(s) for inode {fh}",
            payload.len(),
            ids.len()
        );

        let content = match &self.cipher {
            Some(cipher) => Bytes::from(cipher.decrypt(&payload)?),
            None => Bytes::from(payload),
        };

        self.cache.insert(fh, content.clone());
        Ok(content)
    }

    /// Non-blocking cache read; `None` on miss or empty entry.
    pub fn cached(&mut self, fh: u64) -> Option<Bytes> {
        self.cache.get(fh)
    }

    /// Drop any cached content for `fh`.
    pub fn evict(&mut self, fh: u64) {
        self.cache.remove(fh);
    }

    /// Remove messages from the channel.
    pub fn delete(&mut self, ids: &[MessageId]) -> ClientResult<()> {
        self.store.delete(ids)?;
        Ok(())
    }
}

fn log_progress(sent: u64, total: u64) {
    if total == 0 {
        return;
    }
    let percent = sent * 100 / total;
    if percent % 5 == 0 {
        info!("upload progress: {percent}%");
    }
}
