use std::fs;
use std::thread;
use std::time::Duration;

use telegram_fuse::{
    ChannelClient, Cipher, Driver, FsMount, MemoryChannel, MetaDb, MountConfig, CACHE_MAX_BYTES,
};
use tempfile::TempDir;

/// Release is delivered after `close(2)` returns, so channel-side effects of
/// a write or unlink land asynchronously.
fn wait_for(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..50 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("timed out waiting for {what}");
}

/// Drive an encrypted filesystem through a real kernel mount and assert both
/// sides of the boundary: the POSIX view through the mountpoint and the
/// message bookkeeping behind it.
#[test]
fn test_should_round_trip_a_file_through_the_kernel() {
    let mountpoint = TempDir::new().expect("failed to create mountpoint");
    let channel = MemoryChannel::new();
    let client = ChannelClient::new(
        Box::new(channel.clone()),
        Some(Cipher::new("kernel smoke test key")),
        CACHE_MAX_BYTES,
    );
    let db = MetaDb::open_in_memory().expect("failed to open metadata store");
    let driver = Driver::new(db, client);

    let config = MountConfig {
        volume: "telegram_fuse_test".to_string(),
        kernel_debug: false,
    };
    let (mut mount, mut unmounter) =
        FsMount::mount(driver, mountpoint.path(), &config).expect("failed to mount");
    let event_loop = thread::spawn(move || mount.run());

    // cp a file in: the close flushes it to the channel as one encrypted
    // message named after the file
    let file = mountpoint.path().join("hello.txt");
    fs::write(&file, b"hello through the kernel").expect("failed to write through the mount");
    wait_for("the flush to reach the channel", || {
        channel.message_count() == 1
    });

    let message = channel
        .message(channel.message_ids()[0])
        .expect("message vanished");
    assert_eq!(message.name, "hello.txt_part0.txt");
    // ciphertext on the wire, not the plaintext
    assert!(!message.payload.windows(5).any(|window| window == b"hello"));

    // the mounted view serves content, size and the directory listing back
    assert_eq!(
        fs::read(&file).expect("failed to read through the mount"),
        b"hello through the kernel"
    );
    assert_eq!(
        fs::metadata(&file).expect("failed to stat through the mount").len(),
        24
    );
    let listed: Vec<String> = fs::read_dir(mountpoint.path())
        .expect("failed to list the mount root")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(listed, vec!["hello.txt".to_string()]);

    // rm drops the channel messages together with the inode
    fs::remove_file(&file).expect("failed to unlink through the mount");
    wait_for("the unlink to clear the channel", || {
        channel.message_count() == 0
    });

    unmounter.unmount().expect("failed to unmount");
    event_loop
        .join()
        .expect("mount thread panicked")
        .expect("event loop failed");
}
