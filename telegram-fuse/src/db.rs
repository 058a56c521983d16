use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use thiserror::Error;

use crate::store::MessageId;

/// Inode of the filesystem root. Created on first open, never deleted.
pub const ROOT_INODE: u64 = 1;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("query produced 0 result rows")]
    NoSuchRow,
    #[error("query produced more than 1 result row")]
    NoUniqueValue,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// One row of the `inodes` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRow {
    pub id: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub mtime_ns: i64,
    pub atime_ns: i64,
    pub ctime_ns: i64,
    pub size: u64,
    pub rdev: u32,
    pub target: Option<Vec<u8>>,
}

/// One row of the `contents` table: a `(name, parent)` binding for an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRow {
    pub rowid: i64,
    pub name: Vec<u8>,
    pub inode: u64,
    pub parent_inode: u64,
}

/// Embedded metadata store: the inode table, the directory tree and the
/// inode-to-message mapping.
///
/// The connection is kept inside an explicit transaction bracket; nothing is
/// durable until [`MetaDb::commit`], and [`MetaDb::rollback`] undoes every
/// statement since the last commit.
pub struct MetaDb {
    conn: Connection,
}

impl MetaDb {
    /// Open (and on first run initialize) the store at `path`.
    pub fn open(path: &Path) -> DbResult<Self> {
        Self::setup(Connection::open(path)?)
    }

    /// Open a store that lives and dies with this process.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> DbResult<Self> {
        let db = Self { conn };
        if !db.initialized()? {
            info!("creating filesystem tables");
            db.init_tables()?;
        }
        db.conn.execute_batch("BEGIN")?;
        Ok(db)
    }

    fn initialized(&self) -> DbResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='inodes'",
                [],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn init_tables(&self) -> DbResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE inodes (
                id        INTEGER PRIMARY KEY,
                uid       INT NOT NULL,
                gid       INT NOT NULL,
                mode      INT NOT NULL,
                mtime_ns  INT NOT NULL,
                atime_ns  INT NOT NULL,
                ctime_ns  INT NOT NULL,
                target    BLOB(256),
                size      INT NOT NULL DEFAULT 0,
                rdev      INT NOT NULL DEFAULT 0
            );
            CREATE TABLE telegram_messages (
                id    INTEGER PRIMARY KEY,
                inode INT NOT NULL REFERENCES inodes(id)
            );
            CREATE TABLE contents (
                rowid        INTEGER PRIMARY KEY AUTOINCREMENT,
                name         BLOB(256) NOT NULL,
                inode        INT NOT NULL REFERENCES inodes(id),
                parent_inode INT NOT NULL REFERENCES inodes(id),

                UNIQUE (name, parent_inode)
            );",
        )?;

        let now = now_ns();
        let mode = libc::S_IFDIR | 0o755;
        self.conn.execute(
            "INSERT INTO inodes (id, mode, uid, gid, mtime_ns, atime_ns, ctime_ns)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ROOT_INODE as i64,
                mode as i64,
                nix::unistd::getuid().as_raw(),
                nix::unistd::getgid().as_raw(),
                now,
                now,
                now
            ],
        )?;
        // the root is its own parent, so `..` resolves with the same query as
        // every other directory
        self.conn.execute(
            "INSERT INTO contents (name, parent_inode, inode) VALUES (?1, ?2, ?3)",
            params![&b".."[..], ROOT_INODE as i64, ROOT_INODE as i64],
        )?;

        Ok(())
    }

    /// Execute a statement with parameters.
    pub fn exec<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run a query that must produce exactly one row.
    ///
    /// Zero rows fail with [`DbError::NoSuchRow`], two or more with
    /// [`DbError::NoUniqueValue`].
    pub fn get_row<T, P, F>(&self, sql: &str, params: P, map: F) -> DbResult<T>
    where
        P: Params,
        F: FnOnce(&Row) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;

        let row = rows.next()?.ok_or(DbError::NoSuchRow)?;
        let value = map(row)?;

        if rows.next()?.is_some() {
            return Err(DbError::NoUniqueValue);
        }
        Ok(value)
    }

    /// Run a query that must produce at least one row.
    pub fn get_rows<T, P, F>(&self, sql: &str, params: P, mut map: F) -> DbResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;

        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(map(row)?);
        }

        if values.is_empty() {
            return Err(DbError::NoSuchRow);
        }
        Ok(values)
    }

    /// Commit the outstanding transaction and start the next one.
    pub fn commit(&self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT; BEGIN;")?;
        Ok(())
    }

    /// Undo everything since the last commit and start a fresh transaction.
    pub fn rollback(&self) -> DbResult<()> {
        self.conn.execute_batch("ROLLBACK; BEGIN;")?;
        Ok(())
    }

    /// Commit and end the transaction bracket. Call once at teardown.
    pub fn close(&self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Id of the most recently inserted inode.
    pub fn last_insert_id(&self) -> u64 {
        self.conn.last_insert_rowid() as u64
    }

    pub fn inode(&self, ino: u64) -> DbResult<InodeRow> {
        self.get_row(
            "SELECT id, uid, gid, mode, mtime_ns, atime_ns, ctime_ns, size, rdev, target
             FROM inodes WHERE id = ?1",
            [ino as i64],
            |row| {
                Ok(InodeRow {
                    id: row.get::<_, i64>(0)? as u64,
                    uid: row.get(1)?,
                    gid: row.get(2)?,
                    mode: row.get::<_, i64>(3)? as u32,
                    mtime_ns: row.get(4)?,
                    atime_ns: row.get(5)?,
                    ctime_ns: row.get(6)?,
                    size: row.get::<_, i64>(7)? as u64,
                    rdev: row.get::<_, i64>(8)? as u32,
                    target: row.get(9)?,
                })
            },
        )
    }

    /// Number of directory entries referencing an inode.
    pub fn nlink(&self, ino: u64) -> DbResult<u64> {
        self.get_row(
            "SELECT COUNT(inode) FROM contents WHERE inode = ?1",
            [ino as i64],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count as u64)
    }

    /// Number of directory entries naming an inode as their parent.
    pub fn child_count(&self, ino: u64) -> DbResult<u64> {
        self.get_row(
            "SELECT COUNT(inode) FROM contents WHERE parent_inode = ?1",
            [ino as i64],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count as u64)
    }

    pub fn dirent(&self, parent: u64, name: &[u8]) -> DbResult<DirEntryRow> {
        self.get_row(
            "SELECT rowid, name, inode, parent_inode FROM contents
             WHERE name = ?1 AND parent_inode = ?2",
            params![name, parent as i64],
            map_dirent,
        )
    }

    /// Parent directory of an inode, through its directory entry.
    ///
    /// The root's self-referential `..` row makes this work for the root too.
    pub fn parent_of(&self, ino: u64) -> DbResult<u64> {
        self.get_row(
            "SELECT parent_inode FROM contents WHERE inode = ?1",
            [ino as i64],
            |row| row.get::<_, i64>(0),
        )
        .map(|parent| parent as u64)
    }

    /// Directory entries under `parent` with rowid greater than `after`, in
    /// ascending rowid order. May be empty.
    pub fn children(&self, parent: u64, after: i64) -> DbResult<Vec<DirEntryRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rowid, name, inode, parent_inode FROM contents
             WHERE parent_inode = ?1 AND rowid > ?2 ORDER BY rowid",
        )?;
        let mut rows = stmt.query(params![parent as i64, after])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(map_dirent(row)?);
        }
        Ok(entries)
    }

    /// Any one name bound to an inode; with hard links the choice is
    /// arbitrary.
    pub fn any_name_of(&self, ino: u64) -> DbResult<Vec<u8>> {
        self.get_row(
            "SELECT name FROM contents WHERE inode = ?1 LIMIT 1",
            [ino as i64],
            |row| row.get(0),
        )
    }

    /// Message ids mapped to an inode, in reassembly order.
    ///
    /// Fails with [`DbError::NoSuchRow`] when the inode has no messages.
    pub fn message_ids(&self, ino: u64) -> DbResult<Vec<MessageId>> {
        self.get_rows(
            "SELECT id FROM telegram_messages WHERE inode = ?1 ORDER BY id",
            [ino as i64],
            |row| row.get(0),
        )
    }

    /// Insert an inode row and return its freshly allocated id.
    pub fn insert_inode(
        &self,
        uid: u32,
        gid: u32,
        mode: u32,
        now_ns: i64,
        rdev: u32,
        target: Option<&[u8]>,
    ) -> DbResult<u64> {
        self.exec(
            "INSERT INTO inodes (uid, gid, mode, mtime_ns, atime_ns, ctime_ns, target, rdev)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![uid, gid, mode as i64, now_ns, now_ns, now_ns, target, rdev as i64],
        )?;
        Ok(self.last_insert_id())
    }

    pub fn insert_dirent(&self, name: &[u8], ino: u64, parent: u64) -> DbResult<()> {
        self.exec(
            "INSERT INTO contents (name, inode, parent_inode) VALUES (?1, ?2, ?3)",
            params![name, ino as i64, parent as i64],
        )?;
        Ok(())
    }

    pub fn insert_message(&self, id: MessageId, ino: u64) -> DbResult<()> {
        self.exec(
            "INSERT INTO telegram_messages (id, inode) VALUES (?1, ?2)",
            params![id, ino as i64],
        )?;
        Ok(())
    }

    pub fn delete_inode(&self, ino: u64) -> DbResult<()> {
        self.exec("DELETE FROM inodes WHERE id = ?1", [ino as i64])?;
        Ok(())
    }

    pub fn delete_dirent(&self, parent: u64, name: &[u8]) -> DbResult<()> {
        self.exec(
            "DELETE FROM contents WHERE name = ?1 AND parent_inode = ?2",
            params![name, parent as i64],
        )?;
        Ok(())
    }

    pub fn delete_messages_for(&self, ino: u64) -> DbResult<()> {
        self.exec(
            "DELETE FROM telegram_messages WHERE inode = ?1",
            [ino as i64],
        )?;
        Ok(())
    }

    /// Rebind a directory entry to another name and parent.
    pub fn move_dirent(
        &self,
        new_name: &[u8],
        new_parent: u64,
        old_name: &[u8],
        old_parent: u64,
    ) -> DbResult<()> {
        self.exec(
            "UPDATE contents SET name = ?1, parent_inode = ?2
             WHERE name = ?3 AND parent_inode = ?4",
            params![new_name, new_parent as i64, old_name, old_parent as i64],
        )?;
        Ok(())
    }

    /// Point an existing directory entry at another inode.
    pub fn retarget_dirent(&self, ino: u64, name: &[u8], parent: u64) -> DbResult<()> {
        self.exec(
            "UPDATE contents SET inode = ?1 WHERE name = ?2 AND parent_inode = ?3",
            params![ino as i64, name, parent as i64],
        )?;
        Ok(())
    }

    pub fn set_size(&self, ino: u64, size: u64) -> DbResult<()> {
        self.set_field(ino, "size", size as i64)
    }

    pub fn set_mode(&self, ino: u64, mode: u32) -> DbResult<()> {
        self.set_field(ino, "mode", mode as i64)
    }

    pub fn set_uid(&self, ino: u64, uid: u32) -> DbResult<()> {
        self.set_field(ino, "uid", uid as i64)
    }

    pub fn set_gid(&self, ino: u64, gid: u32) -> DbResult<()> {
        self.set_field(ino, "gid", gid as i64)
    }

    pub fn set_atime(&self, ino: u64, ns: i64) -> DbResult<()> {
        self.set_field(ino, "atime_ns", ns)
    }

    pub fn set_mtime(&self, ino: u64, ns: i64) -> DbResult<()> {
        self.set_field(ino, "mtime_ns", ns)
    }

    pub fn set_ctime(&self, ino: u64, ns: i64) -> DbResult<()> {
        self.set_field(ino, "ctime_ns", ns)
    }

    fn set_field(&self, ino: u64, column: &str, value: i64) -> DbResult<()> {
        // column is one of our own identifiers, never caller input
        self.exec(
            &format!("UPDATE inodes SET {column} = ?1 WHERE id = ?2"),
            params![value, ino as i64],
        )?;
        Ok(())
    }

    /// Sum of all inode sizes in bytes.
    pub fn size_sum(&self) -> DbResult<u64> {
        self.get_row("SELECT SUM(size) FROM inodes", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .map(|sum| sum.unwrap_or(0) as u64)
    }

    pub fn inode_count(&self) -> DbResult<u64> {
        self.get_row("SELECT COUNT(id) FROM inodes", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| count as u64)
    }
}

fn map_dirent(row: &Row) -> rusqlite::Result<DirEntryRow> {
    Ok(DirEntryRow {
        rowid: row.get(0)?,
        name: row.get(1)?,
        inode: row.get::<_, i64>(2)? as u64,
        parent_inode: row.get::<_, i64>(3)? as u64,
    })
}

/// Nanoseconds since the epoch, as stored in the inode time columns.
pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup_db() -> MetaDb {
        MetaDb::open_in_memory().expect("failed to open metadata store")
    }

    #[test]
    fn test_should_create_the_root_inode() {
        let db = setup_db();

        let root = db.inode(ROOT_INODE).unwrap();
        assert_eq!(root.id, ROOT_INODE);
        assert_eq!(root.mode, libc::S_IFDIR | 0o755);
        assert_eq!(root.size, 0);
        assert_eq!(root.uid, nix::unistd::getuid().as_raw());
    }

    #[test]
    fn test_should_point_the_root_dotdot_at_itself() {
        let db = setup_db();

        let entry = db.dirent(ROOT_INODE, b"..").unwrap();
        assert_eq!(entry.inode, ROOT_INODE);
        assert_eq!(entry.parent_inode, ROOT_INODE);
        assert_eq!(db.parent_of(ROOT_INODE).unwrap(), ROOT_INODE);
    }

    #[test]
    fn test_should_reopen_without_reinitializing() {
        let dir = tempfile::TempDir::new().expect("failed to create tempdir");
        let path = dir.path().join("telegram.db");

        let ino = {
            let db = MetaDb::open(&path).unwrap();
            let ino = db
                .insert_inode(1000, 1000, libc::S_IFREG | 0o644, now_ns(), 0, None)
                .unwrap();
            db.insert_dirent(b"f", ino, ROOT_INODE).unwrap();
            db.commit().unwrap();
            db.close().unwrap();
            ino
        };

        let db = MetaDb::open(&path).unwrap();
        assert_eq!(db.dirent(ROOT_INODE, b"f").unwrap().inode, ino);
    }

    #[test]
    fn test_should_signal_zero_and_duplicate_rows() {
        let db = setup_db();

        assert!(matches!(db.inode(99), Err(DbError::NoSuchRow)));

        let a = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        let b = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        db.insert_dirent(b"a", a, ROOT_INODE).unwrap();
        db.insert_dirent(b"b", b, ROOT_INODE).unwrap();

        let err = db.get_row(
            "SELECT id FROM inodes WHERE id > ?1",
            [ROOT_INODE as i64],
            |row| row.get::<_, i64>(0),
        );
        assert!(matches!(err, Err(DbError::NoUniqueValue)));
    }

    #[test]
    fn test_should_enforce_name_uniqueness_per_directory() {
        let db = setup_db();

        let ino = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        db.insert_dirent(b"f", ino, ROOT_INODE).unwrap();
        assert!(matches!(
            db.insert_dirent(b"f", ino, ROOT_INODE),
            Err(DbError::Sqlite(_))
        ));
    }

    #[test]
    fn test_should_count_links_per_inode() {
        let db = setup_db();

        let ino = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        assert_eq!(db.nlink(ino).unwrap(), 0);

        db.insert_dirent(b"one", ino, ROOT_INODE).unwrap();
        db.insert_dirent(b"two", ino, ROOT_INODE).unwrap();
        assert_eq!(db.nlink(ino).unwrap(), 2);
    }

    #[test]
    fn test_should_list_children_after_a_cursor() {
        let db = setup_db();

        let dir = db
            .insert_inode(0, 0, libc::S_IFDIR | 0o755, now_ns(), 0, None)
            .unwrap();
        db.insert_dirent(b"d", dir, ROOT_INODE).unwrap();
        for name in [&b"x"[..], b"y", b"z"] {
            let ino = db
                .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
                .unwrap();
            db.insert_dirent(name, ino, dir).unwrap();
        }

        let all = db.children(dir, -1).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].rowid < pair[1].rowid));
        assert_eq!(all[0].name, b"x");

        let rest = db.children(dir, all[0].rowid).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].name, b"y");

        assert_eq!(db.children(dir, all[2].rowid).unwrap(), vec![]);
    }

    #[test]
    fn test_should_order_message_ids_for_reassembly() {
        let db = setup_db();

        let ino = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        for id in [7, 9, 8] {
            db.insert_message(id, ino).unwrap();
        }

        assert_eq!(db.message_ids(ino).unwrap(), vec![7, 8, 9]);

        db.delete_messages_for(ino).unwrap();
        assert!(matches!(db.message_ids(ino), Err(DbError::NoSuchRow)));
    }

    #[test]
    fn test_should_roll_back_to_the_last_commit() {
        let db = setup_db();

        let kept = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        db.insert_dirent(b"kept", kept, ROOT_INODE).unwrap();
        db.commit().unwrap();

        let lost = db
            .insert_inode(0, 0, libc::S_IFREG | 0o644, now_ns(), 0, None)
            .unwrap();
        db.insert_dirent(b"lost", lost, ROOT_INODE).unwrap();
        db.rollback().unwrap();

        assert!(db.dirent(ROOT_INODE, b"kept").is_ok());
        assert!(matches!(
            db.dirent(ROOT_INODE, b"lost"),
            Err(DbError::NoSuchRow)
        ));
    }
}
