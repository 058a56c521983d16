use std::ffi::OsStr;

use pretty_assertions::assert_eq;
use telegram_fuse::{
    ChannelClient, Driver, MemoryChannel, MetaDb, CACHE_MAX_BYTES, ROOT_INODE,
};

const UID: u32 = 1000;
const GID: u32 = 1000;

pub fn setup_driver() -> (Driver, MemoryChannel) {
    let channel = MemoryChannel::new();
    let client = ChannelClient::new(Box::new(channel.clone()), None, CACHE_MAX_BYTES);
    let db = MetaDb::open_in_memory().expect("failed to open metadata store");

    (Driver::new(db, client), channel)
}

fn create_file(driver: &mut Driver, parent: u64, name: &str) -> u64 {
    let attr = driver
        .create_node(
            parent,
            OsStr::new(name),
            libc::S_IFREG | 0o644,
            UID,
            GID,
            0,
            None,
        )
        .expect("failed to create file");
    driver.open_handle(attr.ino)
}

fn listing(driver: &mut Driver, ino: u64) -> Vec<(String, u64)> {
    driver
        .dir_entries(ino, -1)
        .expect("failed to list directory")
        .into_iter()
        .map(|(_, name, attr)| (String::from_utf8(name).expect("non-utf8 name"), attr.size))
        .collect()
}

#[test]
fn test_should_write_and_stat_a_file_in_a_directory() {
    let (mut driver, _channel) = setup_driver();

    // mkdir /d; echo "hello" > /d/f; cat /d/f; stat /d/f
    let dir = driver
        .create_node(
            ROOT_INODE,
            OsStr::new("d"),
            libc::S_IFDIR | 0o755,
            UID,
            GID,
            0,
            None,
        )
        .expect("failed to create directory")
        .ino;

    let fh = create_file(&mut driver, dir, "f");
    driver.write_at(fh, 0, b"hello\n").expect("failed to write");
    driver.release_handle(fh).expect("failed to release");

    let attr = driver
        .lookup_entry(dir, OsStr::new("f"))
        .expect("lookup failed");
    assert_eq!(attr.size, 6);

    let content = driver.read_at(attr.ino, 0, 1024).expect("read failed");
    assert_eq!(&content[..], b"hello\n");
}

#[test]
fn test_should_round_trip_a_patterned_megabyte_file() {
    let (mut driver, _channel) = setup_driver();

    let pattern: Vec<u8> = (0..5_000_000usize).map(|i| (i % 251) as u8).collect();

    let fh = create_file(&mut driver, ROOT_INODE, "pattern.bin");
    driver.write_at(fh, 0, &pattern).expect("failed to write");
    driver.release_handle(fh).expect("failed to release");

    let attr = driver
        .lookup_entry(ROOT_INODE, OsStr::new("pattern.bin"))
        .expect("lookup failed");
    assert_eq!(attr.size, pattern.len() as u64);

    let content = driver
        .read_at(attr.ino, 0, pattern.len() as u32)
        .expect("read failed");
    assert_eq!(&content[..], &pattern[..]);
}

#[test]
fn test_should_list_and_unlink_files() {
    let (mut driver, channel) = setup_driver();

    for (name, content) in [("a", &b"1"[..]), ("b", &b"22"[..]), ("c", &b"333"[..])] {
        let fh = create_file(&mut driver, ROOT_INODE, name);
        driver.write_at(fh, 0, content).expect("failed to write");
        driver.release_handle(fh).expect("failed to release");
    }

    let entries = listing(&mut driver, ROOT_INODE);
    assert_eq!(
        entries,
        vec![
            ("..".to_string(), 0),
            ("a".to_string(), 1),
            ("b".to_string(), 2),
            ("c".to_string(), 3),
        ]
    );

    // rm /a
    driver
        .unlink_entry(ROOT_INODE, OsStr::new("a"))
        .expect("unlink failed");

    let entries = listing(&mut driver, ROOT_INODE);
    assert!(entries.iter().all(|(name, _)| name != "a"));
    assert_eq!(entries.len(), 3);
    assert_eq!(channel.message_count(), 2);
}

#[test]
fn test_should_rename_and_replace_through_the_full_stack() {
    let (mut driver, channel) = setup_driver();

    let fh = create_file(&mut driver, ROOT_INODE, "x");
    driver.write_at(fh, 0, b"from x").expect("failed to write");
    driver.release_handle(fh).expect("failed to release");

    // mv /x /y with no target in the way
    driver
        .rename_entry(ROOT_INODE, OsStr::new("x"), ROOT_INODE, OsStr::new("y"), 0)
        .expect("rename failed");
    assert!(driver.lookup_entry(ROOT_INODE, OsStr::new("x")).is_err());

    // mv /z /y over the existing file drops y's messages
    let fh = create_file(&mut driver, ROOT_INODE, "z");
    driver.write_at(fh, 0, b"from z").expect("failed to write");
    driver.release_handle(fh).expect("failed to release");
    assert_eq!(channel.message_count(), 2);

    driver
        .rename_entry(ROOT_INODE, OsStr::new("z"), ROOT_INODE, OsStr::new("y"), 0)
        .expect("rename over existing file failed");

    assert_eq!(channel.message_count(), 1);
    let attr = driver
        .lookup_entry(ROOT_INODE, OsStr::new("y"))
        .expect("lookup failed");
    let content = driver.read_at(attr.ino, 0, 1024).expect("read failed");
    assert_eq!(&content[..], b"from z");
}
