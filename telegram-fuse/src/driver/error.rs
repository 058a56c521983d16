use libc::c_int;
use thiserror::Error;

use crate::client::ClientError;
use crate::db::DbError;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("metadata store error: {0}")]
    Db(#[from] DbError),
    #[error("channel error: {0}")]
    Client(#[from] ClientError),
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    Invalid,
}

impl DriverError {
    /// The errno returned to the kernel for this error.
    ///
    /// A missing row means a missing entry or inode; every other internal
    /// failure (duplicate rows, transport, integrity) surfaces as `EIO`.
    pub fn errno(&self) -> c_int {
        match self {
            DriverError::Db(DbError::NoSuchRow) => libc::ENOENT,
            DriverError::Db(_) => libc::EIO,
            DriverError::Client(_) => libc::EIO,
            DriverError::IsDirectory => libc::EISDIR,
            DriverError::NotDirectory => libc::ENOTDIR,
            DriverError::NotEmpty => libc::ENOTEMPTY,
            DriverError::Invalid => libc::EINVAL,
        }
    }
}
