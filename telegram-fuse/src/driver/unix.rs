
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;

use super::{Driver, DriverError, DriverResult};
use crate::db::{now_ns, DbError, InodeRow};

const BLOCK_SIZE: u32 = 512;
const MAX_NAME_LEN: u32 = 255;

/// Entry and attribute validity reported to the kernel.
const TTL: Duration = Duration::from_secs(300);

/// Filesystem-wide usage figures reported through `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStatistics {
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
    pub files_free: u64,
}

/// Convert stored mode bits to a [`FileType`] from [`fuser`]
fn file_kind(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Convert an inode row to a [`FileAttr`] from [`fuser`]
fn attr_from(row: &InodeRow, nlink: u32) -> FileAttr {
    FileAttr {
        ino: row.id,
        size: row.size,
        blocks: 1,
        atime: timestamp(row.atime_ns),
        mtime: timestamp(row.mtime_ns),
        ctime: timestamp(row.ctime_ns),
        crtime: UNIX_EPOCH,
        kind: file_kind(row.mode),
        perm: (row.mode & 0o7777) as u16,
        nlink,
        uid: row.uid,
        gid: row.gid,
        rdev: row.rdev,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn timestamp(ns: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(ns.max(0) as u64)
}

fn ns_of(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Convert a [`TimeOrNow`] to stored nanoseconds
fn time_or_now(time: TimeOrNow) -> i64 {
    match time {
        TimeOrNow::SpecificTime(time) => ns_of(time),
        TimeOrNow::Now => now_ns(),
    }
}

impl Driver {
    /// Attributes of an inode, with the link count computed from the
    /// directory table.
    pub fn attr_of(&mut self, ino: u64) -> DriverResult<FileAttr> {
        let row = self.db.inode(ino)?;
        let nlink = self.db.nlink(ino)? as u32;
        Ok(attr_from(&row, nlink))
    }

    /// Resolve one name under a directory.
    ///
    /// `.` and `..` resolve through the directory table like every other
    /// name; the root's self-referential `..` row closes the cycle at the
    /// top.
    pub fn lookup_entry(&mut self, parent: u64, name: &OsStr) -> DriverResult<FileAttr> {
        let ino = if name == OsStr::new(".") {
            parent
        } else if name == OsStr::new("..") {
            self.db.parent_of(parent)?
        } else {
            self.db.dirent(parent, name.as_bytes())?.inode
        };

        self.attr_of(ino)
    }

    /// Symlink target of an inode.
    pub fn read_link(&mut self, ino: u64) -> DriverResult<Vec<u8>> {
        self.db.inode(ino)?.target.ok_or(DriverError::Invalid)
    }

    /// Directory entries with a rowid greater than `cursor`, together with
    /// their attributes, in ascending rowid order.
    ///
    /// The rowid doubles as the readdir offset handed back to the kernel.
    pub fn dir_entries(
        &mut self,
        ino: u64,
        cursor: i64,
    ) -> DriverResult<Vec<(i64, Vec<u8>, FileAttr)>> {
        let rows = self.db.children(ino, cursor)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let attr = self.attr_of(row.inode)?;
            entries.push((row.rowid, row.name, attr));
        }
        Ok(entries)
    }

    /// Create an inode of any kind plus its first directory entry.
    #[allow(clippy::too_many_arguments)]
    pub fn create_node(
        &mut self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        uid: u32,
        gid: u32,
        rdev: u32,
        target: Option<&[u8]>,
    ) -> DriverResult<FileAttr> {
        if self.db.nlink(parent)? == 0 {
            warn!("attempted to create entry {name:?} under unlinked parent {parent}");
            return Err(DriverError::Invalid);
        }

        let ino = self
            .db
            .insert_inode(uid, gid, mode, now_ns(), rdev, target)?;
        self.db.insert_dirent(name.as_bytes(), ino, parent)?;
        self.db.commit()?;

        self.attr_of(ino)
    }

    /// Remove a file entry; directories are refused.
    pub fn unlink_entry(&mut self, parent: u64, name: &OsStr) -> DriverResult<()> {
        let entry = self.lookup_entry(parent, name)?;
        if entry.kind == FileType::Directory {
            return Err(DriverError::IsDirectory);
        }
        self.remove_entry(parent, name, &entry)
    }

    /// Remove a directory entry; non-directories are refused.
    pub fn rmdir_entry(&mut self, parent: u64, name: &OsStr) -> DriverResult<()> {
        let entry = self.lookup_entry(parent, name)?;
        if entry.kind != FileType::Directory {
            return Err(DriverError::NotDirectory);
        }
        self.remove_entry(parent, name, &entry)
    }

    fn remove_entry(&mut self, parent: u64, name: &OsStr, entry: &FileAttr) -> DriverResult<()> {
        if self.db.child_count(entry.ino)? > 0 {
            return Err(DriverError::NotEmpty);
        }

        let open = self.open_count.contains_key(&entry.ino);
        if entry.nlink == 1 && !open {
            self.db.delete_inode(entry.ino)?;
            self.delete_remote_messages(entry.ino)?;
            self.db.delete_dirent(parent, name.as_bytes())?;
            self.db.delete_messages_for(entry.ino)?;
            self.client.evict(entry.ino);
        } else {
            // other hard links remain, or the inode is open and its deletion
            // is deferred to the last release
            self.db.delete_dirent(parent, name.as_bytes())?;
        }

        self.db.commit()?;
        Ok(())
    }

    /// Move or replace a directory entry. Nonzero `flags` are not supported.
    pub fn rename_entry(
        &mut self,
        parent: u64,
        name: &OsStr,
        new_parent: u64,
        new_name: &OsStr,
        flags: u32,
    ) -> DriverResult<()> {
        if flags != 0 {
            return Err(DriverError::Invalid);
        }

        let entry = self.lookup_entry(parent, name)?;

        match self.lookup_entry(new_parent, new_name) {
            Ok(existing) => {
                self.replace_entry(parent, name, new_parent, new_name, &entry, &existing)
            }
            Err(DriverError::Db(DbError::NoSuchRow)) => {
                self.db
                    .move_dirent(new_name.as_bytes(), new_parent, name.as_bytes(), parent)?;
                self.db.commit()?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn replace_entry(
        &mut self,
        parent: u64,
        name: &OsStr,
        new_parent: u64,
        new_name: &OsStr,
        source: &FileAttr,
        target: &FileAttr,
    ) -> DriverResult<()> {
        if self.db.child_count(target.ino)? > 0 {
            return Err(DriverError::NotEmpty);
        }

        self.db
            .retarget_dirent(source.ino, new_name.as_bytes(), new_parent)?;
        self.db.delete_dirent(parent, name.as_bytes())?;

        if target.nlink == 1 && !self.open_count.contains_key(&target.ino) {
            self.db.delete_inode(target.ino)?;
            self.delete_remote_messages(target.ino)?;
            self.db.delete_messages_for(target.ino)?;
            self.client.evict(target.ino);
        }

        self.db.commit()?;
        Ok(())
    }

    /// Bind an additional name to an inode.
    pub fn link_entry(
        &mut self,
        ino: u64,
        new_parent: u64,
        new_name: &OsStr,
    ) -> DriverResult<FileAttr> {
        if self.attr_of(new_parent)?.nlink == 0 {
            warn!("attempted to link {new_name:?} under unlinked parent {new_parent}");
            return Err(DriverError::Invalid);
        }

        self.db.insert_dirent(new_name.as_bytes(), ino, new_parent)?;
        self.db.commit()?;
        self.attr_of(ino)
    }

    /// Apply the requested attribute changes and return the updated
    /// attributes.
    ///
    /// A size change updates the recorded size only: the current content is
    /// materialized (and so cached) but not rewritten, so reads keep
    /// returning the stored bytes until the next write and release.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_setattr(
        &mut self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctime: Option<SystemTime>,
    ) -> DriverResult<FileAttr> {
        let mut changed = false;

        if let Some(size) = size {
            self.file_content(ino)?;
            self.db.set_size(ino, size)?;
            changed = true;
        }
        if let Some(mode) = mode {
            self.db.set_mode(ino, mode)?;
            changed = true;
        }
        if let Some(uid) = uid {
            self.db.set_uid(ino, uid)?;
            changed = true;
        }
        if let Some(gid) = gid {
            self.db.set_gid(ino, gid)?;
            changed = true;
        }
        if let Some(atime) = atime {
            self.db.set_atime(ino, time_or_now(atime))?;
            changed = true;
        }
        if let Some(mtime) = mtime {
            self.db.set_mtime(ino, time_or_now(mtime))?;
            changed = true;
        }
        match ctime {
            Some(ctime) => self.db.set_ctime(ino, ns_of(ctime))?,
            None if changed => self.db.set_ctime(ino, now_ns())?,
            None => {}
        }

        self.db.commit()?;
        self.attr_of(ino)
    }

    /// Filesystem usage as reported through `statfs`.
    pub fn statistics(&mut self) -> DriverResult<FsStatistics> {
        let blocks = self.db.size_sum()? / BLOCK_SIZE as u64;
        let files = self.db.inode_count()?;

        Ok(FsStatistics {
            blocks,
            blocks_free: blocks.max(1024),
            files,
            files_free: files.max(100),
        })
    }

    /// Register one more open of `ino` and hand the inode back as the file
    /// handle.
    pub fn open_handle(&mut self, ino: u64) -> u64 {
        *self.open_count.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Bytes `[offset, offset + size)` of the file content. A file handle
    /// without an inode row reads as empty.
    pub fn read_at(&mut self, fh: u64, offset: i64, size: u32) -> DriverResult<Bytes> {
        match self.db.inode(fh) {
            Ok(_) => {}
            Err(DbError::NoSuchRow) => return Ok(Bytes::new()),
            Err(err) => return Err(err.into()),
        }

        let content = self.file_content(fh)?;
        let start = (offset.max(0) as usize).min(content.len());
        let end = start.saturating_add(size as usize).min(content.len());
        Ok(content.slice(start..end))
    }

    /// Stage `data` at `offset` in the write buffer, seeding the buffer from
    /// the stored content on the first write since the last flush.
    pub fn write_at(&mut self, fh: u64, offset: i64, data: &[u8]) -> DriverResult<u32> {
        if self.write_buffer.is_empty() {
            match self.db.inode(fh) {
                Ok(_) => self.write_buffer = self.file_content(fh)?.to_vec(),
                Err(DbError::NoSuchRow) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let offset = offset.max(0) as usize;
        if offset == self.write_buffer.len() {
            self.write_buffer.extend_from_slice(data);
        } else {
            let end = offset + data.len();
            if self.write_buffer.len() < end {
                self.write_buffer.resize(end, 0);
            }
            self.write_buffer[offset..end].copy_from_slice(data);
        }

        Ok(data.len() as u32)
    }

    /// Drop one open of `fh`, flushing staged writes to the channel; the
    /// final release of an unlinked inode deletes it for good.
    pub fn release_handle(&mut self, fh: u64) -> DriverResult<()> {
        if let Some(count) = self.open_count.get_mut(&fh) {
            *count = count.saturating_sub(1);
        }

        if !self.write_buffer.is_empty() {
            let data = std::mem::take(&mut self.write_buffer);
            self.flush_buffer(fh, &data)?;
        }

        if self.open_count.get(&fh) == Some(&0) {
            self.open_count.remove(&fh);
            if self.db.nlink(fh)? == 0 {
                self.db.delete_inode(fh)?;
                self.delete_remote_messages(fh)?;
                self.db.delete_messages_for(fh)?;
                self.client.evict(fh);
                self.db.commit()?;
            }
        }

        Ok(())
    }

    /// Upload the staged content and swap the message mapping to the new
    /// ids.
    fn flush_buffer(&mut self, fh: u64, data: &[u8]) -> DriverResult<()> {
        // any one name will do when the inode is hard-linked
        let file_name = match self.db.any_name_of(fh) {
            Ok(name) => String::from_utf8_lossy(&name).into_owned(),
            Err(DbError::NoSuchRow) => String::new(),
            Err(err) => return Err(err.into()),
        };

        let ids = self.client.upload(data, fh, &file_name)?;
        self.delete_remote_messages(fh)?;
        self.db.delete_messages_for(fh)?;
        for id in &ids {
            self.db.insert_message(*id, fh)?;
        }
        self.db.set_size(fh, data.len() as u64)?;
        self.db.commit()?;

        debug!(
            "flushed {} bytes to {} message(s) for inode {fh}",
            data.len(),
            ids.len()
        );
        Ok(())
    }

    /// Current content of a file: cache first, then the channel.
    ///
    /// Only an inode with no mapped messages reads as empty; transport and
    /// integrity failures propagate.
    fn file_content(&mut self, fh: u64) -> DriverResult<Bytes> {
        if let Some(content) = self.client.cached(fh) {
            return Ok(content);
        }

        let ids = match self.db.message_ids(fh) {
            Ok(ids) => ids,
            Err(DbError::NoSuchRow) => return Ok(Bytes::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(self.client.download(fh, &ids)?)
    }

    /// Delete every channel message mapped to an inode.
    fn delete_remote_messages(&mut self, ino: u64) -> DriverResult<()> {
        let ids = match self.db.message_ids(ino) {
            Ok(ids) => ids,
            Err(DbError::NoSuchRow) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        self.client.delete(&ids)?;
        Ok(())
    }

    /// Log a failed upcall, roll the metadata transaction back and map the
    /// error to its errno.
    fn fail(&mut self, op: &str, err: DriverError) -> c_int {
        let errno = err.errno();
        if errno == libc::ENOENT {
            debug!("{op}: {err}");
        } else {
            error!("{op} failed: {err}");
        }

        if let Err(rollback_err) = self.db.rollback() {
            error!("rollback after failed {op}: {rollback_err}");
        }
        errno
    }
}

impl Filesystem for Driver {
    /// Initialize filesystem.
    /// Called before any other filesystem method.
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("initializing filesystem");
        Ok(())
    }

    /// Clean up filesystem.
    /// Called on filesystem exit; closes the metadata store.
    fn destroy(&mut self) {
        info!("destroying filesystem");
        if let Err(err) = self.db.close() {
            error!("failed to close metadata store: {err}");
        } else {
            info!("metadata store closed");
        }
    }

    /// Look up a directory entry by name and get its attributes.
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup() called with {:?} {:?}", parent, name);
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(self.fail("lookup", err)),
        }
    }

    /// Get file attributes.
    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr() called with {:?}", ino);
        match self.attr_of(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(self.fail("getattr", err)),
        }
    }

    /// Set file attributes.
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(
            "setattr() called with mode: {:?}, uid: {:?}, gid: {:?}, size: {:?}, atime: {:?}, mtime: {:?}, ctime: {:?}",
            mode, uid, gid, size, atime, mtime, ctime
        );
        match self.apply_setattr(ino, mode, uid, gid, size, atime, mtime, ctime) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(self.fail("setattr", err)),
        }
    }

    /// Read symbolic link.
    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        debug!("readlink() called with {:?}", ino);
        match self.read_link(ino) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(self.fail("readlink", err)),
        }
    }

    /// Create file node.
    /// Create a regular file, character device, block device, fifo or socket
    /// node.
    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("mknod() called with {:?} {:?} {:o}", parent, name, mode);
        match self.create_node(parent, name, mode, req.uid(), req.gid(), rdev, None) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(self.fail("mknod", err)),
        }
    }

    /// Create a directory.
    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir() called with {:?} {:?} {:o}", parent, name, mode);
        match self.create_node(
            parent,
            name,
            mode | libc::S_IFDIR,
            req.uid(),
            req.gid(),
            0,
            None,
        ) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(self.fail("mkdir", err)),
        }
    }

    /// Remove a file
    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink() called with {:?} {:?}", parent, name);
        match self.unlink_entry(parent, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(self.fail("unlink", err)),
        }
    }

    /// Remove a directory
    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir() called with {:?} {:?}", parent, name);
        match self.rmdir_entry(parent, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(self.fail("rmdir", err)),
        }
    }

    /// Create a symbolic link
    fn symlink(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        link: &Path,
        reply: ReplyEntry,
    ) {
        debug!("symlink() called with {:?} {:?} {:?}", parent, name, link);
        let mode = libc::S_IFLNK | 0o777;
        match self.create_node(
            parent,
            name,
            mode,
            req.uid(),
            req.gid(),
            0,
            Some(link.as_os_str().as_bytes()),
        ) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(self.fail("symlink", err)),
        }
    }

    /// Rename a file
    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename() called with {:?} {:?} {:?} {:?}",
            parent, name, newparent, newname
        );
        match self.rename_entry(parent, name, newparent, newname, flags) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(self.fail("rename", err)),
        }
    }

    /// Create a hard link
    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link() called for {ino} into {newparent:?} {newname:?}");
        match self.link_entry(ino, newparent, newname) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(self.fail("link", err)),
        }
    }

    /// Open a file.
    /// The inode doubles as the file handle; the open count defers inode
    /// deletion while the file is in use.
    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("open() called for {ino}");
        let fh = self.open_handle(ino);
        reply.opened(fh, 0);
    }

    /// Read data.
    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read() called for {ino} {size} bytes at {offset}");
        match self.read_at(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(self.fail("read", err)),
        }
    }

    /// Write data.
    /// Bytes are staged in the write buffer; the channel is only touched on
    /// `release`.
    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write() called for {ino} {} bytes at {offset}", data.len());
        match self.write_at(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(self.fail("write", err)),
        }
    }

    /// Flush method.
    /// Nothing to do: staged data is only flushed on `release`.
    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        debug!("flush() called for {ino}");
        reply.ok();
    }

    /// Release an open file.
    /// This is where staged writes are actually pushed to the channel.
    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release() called for {fh}");
        match self.release_handle(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(self.fail("release", err)),
        }
    }

    /// Synchronize file contents.
    fn fsync(&mut self, _req: &Request, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        debug!("fsync() called for {ino}");
        reply.ok();
    }

    /// Open a directory. The inode doubles as the directory handle.
    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir() called on {:?}", ino);
        reply.opened(ino, 0);
    }

    /// Read directory.
    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir() called on {:?} at offset {}", ino, offset);
        // the first entry may sit at rowid 1, so the initial offset 0 must
        // not skip it
        let cursor = if offset == 0 { -1 } else { offset };

        let entries = match self.dir_entries(ino, cursor) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(self.fail("readdir", err));
                return;
            }
        };

        for (rowid, name, attr) in entries {
            let buffer_full = reply.add(attr.ino, rowid, attr.kind, OsStr::from_bytes(&name));
            if buffer_full {
                debug!("readdir buffer is full");
                break;
            }
        }
        reply.ok();
    }

    /// Get file system statistics.
    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        debug!("statfs() called");
        match self.statistics() {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.blocks_free,
                stats.blocks_free,
                stats.files,
                stats.files_free,
                BLOCK_SIZE,
                MAX_NAME_LEN,
                BLOCK_SIZE,
            ),
            Err(err) => reply.error(self.fail("statfs", err)),
        }
    }

    /// Check file access permissions.
    /// Permission checking is left to the client side; every access is
    /// granted.
    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        debug!("access() called on {:?}", ino);
        reply.ok();
    }

    /// Create and open a file.
    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create() called with {:?} {:?} {:o}", parent, name, mode);
        match self.create_node(
            parent,
            name,
            mode | libc::S_IFREG,
            req.uid(),
            req.gid(),
            0,
            None,
        ) {
            Ok(attr) => {
                let fh = self.open_handle(attr.ino);
                reply.created(&TTL, &attr, 0, fh, 0);
            }
            Err(err) => reply.error(self.fail("create", err)),
        }
    }
}
