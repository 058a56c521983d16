use std::fs;
use std::io;
use std::path::Path;

#[cfg(unix)]
use fuser::{Session, SessionUnmounter};

use crate::Driver;

/// How the filesystem is exposed to the kernel.
///
/// The option policy is fixed by the filesystem's semantics rather than
/// configurable per mount: permission checks stay with the driver (`access`
/// grants everything), so `default_permissions` is never passed, and
/// `allow_other` is always set so the mount is usable beyond the mounting
/// user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Volume name recorded in mtab.
    pub volume: String,
    /// Make the kernel channel trace every operation.
    pub kernel_debug: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            volume: "telegram_fuse".to_string(),
            kernel_debug: false,
        }
    }
}

#[cfg(unix)]
impl MountConfig {
    fn fuse_options(&self) -> Vec<fuser::MountOption> {
        let mut options = vec![
            fuser::MountOption::FSName(self.volume.clone()),
            fuser::MountOption::AllowOther,
        ];
        if self.kernel_debug {
            options.push(fuser::MountOption::CUSTOM("debug".to_string()));
        }
        options
    }
}

/// A mounted filesystem, driving a [`Driver`] from the kernel event loop.
#[cfg(unix)]
#[cfg_attr(docsrs, doc(cfg(unix)))]
pub struct FsMount {
    session: Session<Driver>,
}

#[cfg(unix)]
impl FsMount {
    /// Mount `driver` at `mountpoint`, creating the directory if it does not
    /// exist yet.
    ///
    /// Returns the mount together with an [`Unmounter`] for tearing it down
    /// from another thread, typically a signal handler.
    pub fn mount(
        driver: Driver,
        mountpoint: &Path,
        config: &MountConfig,
    ) -> io::Result<(Self, Unmounter)> {
        if !mountpoint.exists() {
            info!("creating mount point at {}", mountpoint.display());
            fs::create_dir_all(mountpoint)?;
        }

        info!(
            "mounting volume `{}` at {}",
            config.volume,
            mountpoint.display()
        );
        let mut session = Session::new(driver, mountpoint, &config.fuse_options())?;
        let unmounter = Unmounter {
            umount: session.unmount_callable(),
        };

        Ok((Self { session }, unmounter))
    }

    /// Run the kernel event loop, dispatching upcalls to the driver.
    ///
    /// Blocks until the filesystem is unmounted. The driver commits and
    /// closes its metadata store on the way out.
    pub fn run(&mut self) -> io::Result<()> {
        self.session.run()
    }
}

/// A thread-safe handle to unmount the filesystem and end its event loop.
#[cfg(unix)]
#[cfg_attr(docsrs, doc(cfg(unix)))]
pub struct Unmounter {
    umount: SessionUnmounter,
}

#[cfg(unix)]
impl Unmounter {
    /// Unmount the filesystem.
    pub fn unmount(&mut self) -> io::Result<()> {
        info!("unmounting filesystem");
        self.umount.unmount()
    }
}
