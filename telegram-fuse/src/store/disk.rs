use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{report_parts, ChannelStore, MessageId, Progress, StoreError, StoreResult};

/// Channel store backed by a local directory.
///
/// Every message is one file named after its id. Ids keep increasing across
/// reopens: opening scans the directory for the highest id already allocated.
#[derive(Debug)]
pub struct DiskChannel {
    root: PathBuf,
    last_id: MessageId,
}

impl DiskChannel {
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root)?;

        let mut last_id = 0;
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<MessageId>().ok())
            {
                last_id = last_id.max(id);
            }
        }

        debug!("opened disk channel at {} (last id {last_id})", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            last_id,
        })
    }

    fn message_path(&self, id: MessageId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl ChannelStore for DiskChannel {
    fn send(&mut self, name: &str, payload: &[u8], progress: Progress) -> StoreResult<MessageId> {
        let id = self.last_id + 1;
        fs::write(self.message_path(id), payload)?;
        self.last_id = id;
        report_parts(payload.len(), progress);
        debug!("stored object {name} as message {id}");
        Ok(id)
    }

    fn fetch(&mut self, id: MessageId) -> StoreResult<Vec<u8>> {
        match fs::read(self.message_path(id)) {
            Ok(payload) => Ok(payload),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NoSuchMessage(id)),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&mut self, ids: &[MessageId]) -> StoreResult<()> {
        for id in ids {
            match fs::remove_file(self.message_path(*id)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!("delete of unknown message {id}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_should_store_and_fetch_messages() {
        let dir = TempDir::new().expect("failed to create tempdir");
        let mut channel = DiskChannel::open(dir.path()).expect("failed to open channel");
        let mut progress = |_: u64, _: u64| {};

        let id = channel
            .send("hello_part0.txt", b"hello world", &mut progress)
            .unwrap();
        assert_eq!(channel.fetch(id).unwrap(), b"hello world");

        channel.delete(&[id]).unwrap();
        assert!(matches!(
            channel.fetch(id),
            Err(StoreError::NoSuchMessage(_))
        ));
    }

    #[test]
    fn test_should_keep_allocating_upwards_across_reopens() {
        let dir = TempDir::new().expect("failed to create tempdir");
        let mut progress = |_: u64, _: u64| {};

        let first = {
            let mut channel = DiskChannel::open(dir.path()).unwrap();
            channel.send("a_part0.txt", b"a", &mut progress).unwrap()
        };

        let mut channel = DiskChannel::open(dir.path()).unwrap();
        let second = channel.send("b_part0.txt", b"b", &mut progress).unwrap();
        assert!(second > first);
        assert_eq!(channel.fetch(first).unwrap(), b"a");
    }
}
