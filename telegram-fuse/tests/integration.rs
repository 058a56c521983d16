#![cfg(target_family = "unix")]

#[path = "integration/driver.rs"]
mod driver;

#[cfg(feature = "integration-tests")]
#[path = "integration/fuse.rs"]
mod fuse;
