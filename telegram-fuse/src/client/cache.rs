use bytes::Bytes;
use lru::LruCache;

/// LRU cache of decrypted file contents, keyed by inode.
///
/// The bound is the total number of cached bytes, not the entry count:
/// inserting past the limit pops least-recently-used entries until the cache
/// fits again. A single content larger than the whole budget is not cached.
pub struct ContentCache {
    entries: LruCache<u64, Bytes>,
    total_bytes: u64,
    max_bytes: u64,
}

impl ContentCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_bytes,
        }
    }

    /// Cached content for an inode, bumping its recency.
    ///
    /// Empty entries count as misses.
    pub fn get(&mut self, fh: u64) -> Option<Bytes> {
        self.entries
            .get(&fh)
            .filter(|content| !content.is_empty())
            .cloned()
    }

    pub fn insert(&mut self, fh: u64, content: Bytes) {
        self.remove(fh);

        if content.len() as u64 > self.max_bytes {
            debug!(
                "not caching {} bytes for inode {fh}: exceeds the {} byte budget",
                content.len(),
                self.max_bytes
            );
            return;
        }

        self.total_bytes += content.len() as u64;
        self.entries.put(fh, content);

        while self.total_bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((evicted, content)) => {
                    self.total_bytes -= content.len() as u64;
                    debug!("evicted {} cached bytes for inode {evicted}", content.len());
                }
                None => break,
            }
        }
    }

    pub fn remove(&mut self, fh: u64) -> Option<Bytes> {
        let content = self.entries.pop(&fh)?;
        self.total_bytes -= content.len() as u64;
        Some(content)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_should_cache_and_account_bytes() {
        let mut cache = ContentCache::new(100);
        cache.insert(1, Bytes::from_static(b"0123456789"));
        assert_eq!(cache.get(1), Some(Bytes::from_static(b"0123456789")));
        assert_eq!(cache.total_bytes(), 10);

        cache.remove(1);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_should_treat_empty_entries_as_misses() {
        let mut cache = ContentCache::new(100);
        cache.insert(1, Bytes::new());
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn test_should_evict_least_recently_used_past_the_byte_budget() {
        let mut cache = ContentCache::new(8);
        cache.insert(1, Bytes::from_static(b"aaaa"));
        cache.insert(2, Bytes::from_static(b"bbbb"));

        // bump 1, then overflow: 2 is now the coldest entry
        cache.get(1);
        cache.insert(3, Bytes::from_static(b"cccc"));

        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(1), Some(Bytes::from_static(b"aaaa")));
        assert_eq!(cache.get(3), Some(Bytes::from_static(b"cccc")));
        assert!(cache.total_bytes() <= 8);
    }

    #[test]
    fn test_should_not_cache_content_larger_than_the_budget() {
        let mut cache = ContentCache::new(4);
        cache.insert(1, Bytes::from_static(b"too large"));
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_should_replace_existing_entry() {
        let mut cache = ContentCache::new(100);
        cache.insert(1, Bytes::from_static(b"old"));
        cache.insert(1, Bytes::from_static(b"newer"));
        assert_eq!(cache.get(1), Some(Bytes::from_static(b"newer")));
        assert_eq!(cache.total_bytes(), 5);
        assert_eq!(cache.len(), 1);
    }
}
