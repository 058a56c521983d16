use std::env;
use std::path::PathBuf;

use crate::client::CACHE_MAX_BYTES;

/// Default path of the embedded metadata database, relative to the working
/// directory.
pub const DEFAULT_DB_PATH: &str = "telegram.db";

/// Credentials and target channel for an MTProto transport.
///
/// The engine itself never dials the network with these: they are handed to
/// whichever [`ChannelStore`](crate::ChannelStore) implementation a deployment
/// plugs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub app_id: String,
    pub app_hash: String,
    pub session_name: String,
    pub channel_link: String,
}

/// Runtime configuration, read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the metadata database file.
    pub db_path: PathBuf,
    /// Content encryption passphrase; content is stored in clear when unset.
    pub encryption_key: Option<String>,
    /// Byte budget of the in-memory content cache.
    pub cache_max_bytes: u64,
    /// MTProto credentials, present only when all four variables are set.
    pub credentials: Option<ChannelCredentials>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            encryption_key: None,
            cache_max_bytes: CACHE_MAX_BYTES,
            credentials: None,
        }
    }
}

impl Config {
    /// Read the configuration from the environment.
    ///
    /// Recognized variables: `TELEGRAM_DB`, `ENCRYPTION_KEY`, `APP_ID`,
    /// `APP_HASH`, `SESSION_NAME`, `CHANNEL_LINK`. An empty `ENCRYPTION_KEY`
    /// counts as unset.
    pub fn from_env() -> Self {
        let db_path = env::var_os("TELEGRAM_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let encryption_key = match env::var("ENCRYPTION_KEY") {
            Ok(key) if key.is_empty() => {
                warn!("ENCRYPTION_KEY is set but empty; storing content in clear");
                None
            }
            Ok(key) => Some(key),
            Err(_) => None,
        };

        let credentials = match (
            env::var("APP_ID"),
            env::var("APP_HASH"),
            env::var("SESSION_NAME"),
            env::var("CHANNEL_LINK"),
        ) {
            (Ok(app_id), Ok(app_hash), Ok(session_name), Ok(channel_link)) => {
                Some(ChannelCredentials {
                    app_id,
                    app_hash,
                    session_name,
                    channel_link,
                })
            }
            _ => None,
        };

        Self {
            db_path,
            encryption_key,
            cache_max_bytes: CACHE_MAX_BYTES,
            credentials,
        }
    }
}
