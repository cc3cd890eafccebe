//! Cache management
//!
//! The cache module owns the cache directory:
//! - `meta.db`: fetched remote resources, statistics and index builds (SQLite)
//! - `config.toml`: user settings (TOML text)
//! - `index/<key>.idx`: index artifacts
//! - `index.lock`: present while an index build runs
//!
//! Remote resources move through `Absent -> Fetching -> Cached`, with
//! `Stale` after a forced refresh or a failed refresh of a cached value, and
//! `Error` when the first fetch fails. `Fetching` only exists in memory while
//! the per-key lock is held.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strum::{Display, EnumString};
use walkdir::WalkDir;

use crate::config::DEFAULT_CONFIG_TOML;
use crate::error::{IconError, Result};
use crate::index::Index;
use crate::models::IndexStats;
use crate::remote::{FetchOutcome, Fetcher};

/// File names within the cache directory
pub const META_DB: &str = "meta.db";
pub const CONFIG_TOML: &str = "config.toml";
pub const INDEX_DIR: &str = "index";
pub const LOCK_FILE: &str = "index.lock";

/// How long SQLite waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persisted state of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Cached,
    Stale,
    Error,
}

/// A cached remote resource
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    /// Last successfully fetched bytes, if any
    pub body: Option<Vec<u8>>,
    pub fetched_at: Option<i64>,
    pub etag: Option<String>,
    pub state: ResourceState,
    pub last_error: Option<String>,
}

/// Resource listing row (without the body)
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub key: String,
    pub size_bytes: usize,
    pub fetched_at: Option<String>,
    pub state: ResourceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// How a resource request may use the network
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    /// Refetch even when a cached value exists
    pub force: bool,
    pub timeout: Duration,
}

/// Manages the cache directory
pub struct CacheManager {
    cache_path: PathBuf,
    /// Serializes fetch/commit per resource key
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn db_err(e: rusqlite::Error) -> IconError {
    IconError::corrupted(format!("meta.db: {}", e))
}

fn read_entry(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    conn.query_row(
        "SELECT key, body, fetched_at, etag, state, last_error FROM resources WHERE key = ?",
        [key],
        |row| {
            let state: String = row.get(4)?;
            Ok((
                CacheEntry {
                    key: row.get(0)?,
                    body: row.get(1)?,
                    fetched_at: row.get(2)?,
                    etag: row.get(3)?,
                    state: ResourceState::Cached,
                    last_error: row.get(5)?,
                },
                state,
            ))
        },
    )
    .optional()
    .map_err(db_err)?
    .map(|(mut entry, state)| {
        entry.state = state
            .parse()
            .map_err(|_| IconError::corrupted(format!("unknown resource state '{}'", state)))?;
        Ok(entry)
    })
    .transpose()
}

fn timestamp_to_rfc3339(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339()
}

impl CacheManager {
    /// Create a cache manager rooted at the given directory
    pub fn new(cache_path: impl AsRef<Path>) -> Self {
        Self {
            cache_path: cache_path.as_ref().to_path_buf(),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize the cache directory structure if it doesn't exist
    pub fn init(&self) -> Result<()> {
        log::debug!("Initializing cache at {:?}", self.cache_path);

        std::fs::create_dir_all(self.cache_path.join(INDEX_DIR))
            .map_err(|e| IconError::corrupted(format!("cannot create {}: {}", self.cache_path.display(), e)))?;

        self.init_meta_db()?;
        self.init_config_toml()?;
        Ok(())
    }

    fn init_meta_db(&self) -> Result<()> {
        let conn = self.open_db()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS resources (
                key TEXT PRIMARY KEY,
                body BLOB,
                fetched_at INTEGER,
                etag TEXT,
                state TEXT NOT NULL,
                last_error TEXT
            );
            CREATE TABLE IF NOT EXISTS statistics (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS builds (
                key TEXT PRIMARY KEY,
                corpus_version TEXT NOT NULL,
                collections INTEGER NOT NULL,
                icons INTEGER NOT NULL,
                tokens INTEGER NOT NULL,
                built_at INTEGER NOT NULL
            );",
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn init_config_toml(&self) -> Result<()> {
        let config_path = self.cache_path.join(CONFIG_TOML);
        if config_path.exists() {
            return Ok(());
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .map_err(|e| IconError::corrupted(format!("cannot write {}: {}", config_path.display(), e)))?;
        log::debug!("Created default config.toml");
        Ok(())
    }

    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open(self.cache_path.join(META_DB)).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Ok(conn)
    }

    /// Open meta.db only if it exists (read paths never create it)
    fn open_existing_db(&self) -> Result<Option<Connection>> {
        if !self.cache_path.join(META_DB).exists() {
            return Ok(None);
        }
        self.open_db().map(Some)
    }

    pub fn exists(&self) -> bool {
        self.cache_path.join(META_DB).exists()
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Check that meta.db has its schema and the current index artifact loads
    pub fn validate(&self) -> Result<()> {
        let conn = self
            .open_existing_db()?
            .ok_or_else(|| IconError::corrupted(format!("{} missing in {}", META_DB, self.cache_path.display())))?;

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .map_err(db_err)?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect())
            .map_err(db_err)?;

        for table in ["resources", "statistics", "builds"] {
            if !tables.iter().any(|t| t == table) {
                return Err(IconError::corrupted(format!("table '{}' missing from meta.db", table)));
            }
        }

        if let Some(key) = self.current_index_key()? {
            let path = self.index_path(&key);
            if path.exists() {
                Index::load(&path)?;
            }
        }

        log::debug!("Cache validation passed");
        Ok(())
    }

    /// Remove cached resources and index artifacts, keeping config.toml
    pub fn clear(&self) -> Result<()> {
        log::warn!("Clearing cache at {:?}", self.cache_path);

        let remove = |path: PathBuf| -> Result<()> {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(IconError::corrupted(format!("cannot remove {}: {}", path.display(), e)))
                }
                _ => Ok(()),
            }
        };

        remove(self.cache_path.join(META_DB))?;
        remove(self.cache_path.join(INDEX_DIR))?;
        remove(self.cache_path.join(LOCK_FILE))?;
        Ok(())
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Current entry for a resource without touching the network
    pub fn peek(&self, key: &str) -> Result<Option<CacheEntry>> {
        match self.open_existing_db()? {
            Some(conn) => read_entry(&conn, key),
            None => Ok(None),
        }
    }

    /// Return a resource from the cache, fetching it when needed
    ///
    /// Fetched bytes are staged in memory, checked with `validate`, then
    /// committed in one transaction. On any failure the previous value stays
    /// in place (marked stale) and the error is returned.
    pub fn fetch_resource<V>(
        &self,
        key: &str,
        fetcher: &dyn Fetcher,
        policy: FetchPolicy,
        validate: V,
    ) -> Result<Vec<u8>>
    where
        V: Fn(&[u8]) -> Result<()>,
    {
        let key_lock = self.key_lock(key);
        let _held = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut conn = self.open_db()?;
        let existing = read_entry(&conn, key)?;

        if let Some(entry) = &existing {
            if let (false, ResourceState::Cached, Some(body)) = (policy.force, entry.state, &entry.body) {
                log::debug!("Cache hit for {}", key);
                return Ok(body.clone());
            }
            if policy.force {
                conn.execute("UPDATE resources SET state = ? WHERE key = ?", params![
                    ResourceState::Stale.to_string(),
                    key
                ])
                .map_err(db_err)?;
            }
        }

        let cached_body = existing.as_ref().and_then(|e| e.body.clone());
        let etag = match (&existing, &cached_body, policy.force) {
            (Some(entry), Some(_), false) => entry.etag.clone(),
            _ => None,
        };

        log::info!("Fetching {} (timeout {:?})", key, policy.timeout);
        let staged = match fetcher.fetch(key, policy.timeout, etag.as_deref()) {
            Ok(FetchOutcome::Fetched { bytes, etag }) => match validate(&bytes) {
                Ok(()) => Ok((bytes, etag)),
                Err(e) => Err(e),
            },
            Ok(FetchOutcome::NotModified) => match cached_body {
                Some(body) => {
                    log::debug!("{} not modified", key);
                    conn.execute(
                        "UPDATE resources SET fetched_at = ?, state = ?, last_error = NULL WHERE key = ?",
                        params![chrono::Utc::now().timestamp(), ResourceState::Cached.to_string(), key],
                    )
                    .map_err(db_err)?;
                    return Ok(body);
                }
                None => Err(IconError::network(key, false, "server answered not-modified without a cached copy")),
            },
            Err(e) => Err(IconError::network(key, e.is_timeout(), e)),
        };

        match staged {
            Ok((bytes, etag)) => {
                let now = chrono::Utc::now().timestamp();
                let tx = conn.transaction().map_err(db_err)?;
                tx.execute(
                    "INSERT OR REPLACE INTO resources (key, body, fetched_at, etag, state, last_error)
                     VALUES (?, ?, ?, ?, ?, NULL)",
                    params![key, bytes, now, etag, ResourceState::Cached.to_string()],
                )
                .map_err(db_err)?;
                tx.execute(
                    "INSERT OR REPLACE INTO statistics (key, value, updated_at) VALUES ('last_fetch', ?, ?)",
                    params![key, now],
                )
                .map_err(db_err)?;
                tx.commit().map_err(db_err)?;

                log::info!("Cached {} ({} bytes)", key, bytes.len());
                Ok(bytes)
            }
            Err(err) => {
                let message = err.to_string();
                if existing.as_ref().is_some_and(|e| e.body.is_some()) {
                    conn.execute(
                        "UPDATE resources SET state = ?, last_error = ? WHERE key = ?",
                        params![ResourceState::Stale.to_string(), message, key],
                    )
                    .map_err(db_err)?;
                } else {
                    conn.execute(
                        "INSERT OR REPLACE INTO resources (key, body, fetched_at, etag, state, last_error)
                         VALUES (?, NULL, NULL, NULL, ?, ?)",
                        params![key, ResourceState::Error.to_string(), message],
                    )
                    .map_err(db_err)?;
                }
                log::warn!("Fetch of {} failed: {}", key, message);
                Err(err)
            }
        }
    }

    /// Mark a cached resource stale so the next request refetches it
    pub fn invalidate(&self, key: &str) -> Result<()> {
        let key_lock = self.key_lock(key);
        let _held = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(conn) = self.open_existing_db()? {
            conn.execute("UPDATE resources SET state = ? WHERE key = ?", params![
                ResourceState::Stale.to_string(),
                key
            ])
            .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn list_resources(&self) -> Result<Vec<ResourceSummary>> {
        let Some(conn) = self.open_existing_db()? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn
            .prepare(
                "SELECT key, COALESCE(LENGTH(body), 0), fetched_at, state, last_error
                 FROM resources ORDER BY key",
            )
            .map_err(db_err)?;

        let rows: Vec<(String, i64, Option<i64>, String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))
            .and_then(|rows| rows.collect())
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(key, size, fetched_at, state, last_error)| {
                Ok(ResourceSummary {
                    size_bytes: size as usize,
                    fetched_at: fetched_at.map(timestamp_to_rfc3339),
                    state: state
                        .parse()
                        .map_err(|_| IconError::corrupted(format!("unknown resource state '{}'", state)))?,
                    last_error,
                    key,
                })
            })
            .collect()
    }

    pub fn index_path(&self, key: &str) -> PathBuf {
        self.cache_path.join(INDEX_DIR).join(format!("{}.idx", key))
    }

    /// Load an index artifact; `Ok(None)` when it was never built
    pub fn load_index(&self, key: &str) -> Result<Option<Index>> {
        let path = self.index_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Index::load(&path).map(Some)
    }

    /// Persist an index artifact and make it the current one
    pub fn store_index(&self, index: &Index) -> Result<()> {
        index.write(self.index_path(index.key()))?;

        let mut conn = self.open_db().map_err(|e| IconError::index_write(e.to_string()))?;
        let now = chrono::Utc::now().timestamp();

        let tx = conn.transaction().map_err(|e| IconError::index_write(e.to_string()))?;
        let result: rusqlite::Result<()> = (|| {
            tx.execute(
                "INSERT OR REPLACE INTO builds (key, corpus_version, collections, icons, tokens, built_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    index.key(),
                    index.corpus_version(),
                    index.collections().len() as i64,
                    index.icon_count() as i64,
                    index.token_count() as i64,
                    now
                ],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO statistics (key, value, updated_at) VALUES ('current_index', ?, ?)",
                params![index.key(), now],
            )?;
            Ok(())
        })();
        result.map_err(|e| IconError::index_write(e.to_string()))?;
        tx.commit().map_err(|e| IconError::index_write(e.to_string()))?;

        Ok(())
    }

    /// Point searches at an already stored artifact
    pub fn set_current_index(&self, key: &str) -> Result<()> {
        let conn = self.open_db()?;
        conn.execute(
            "INSERT OR REPLACE INTO statistics (key, value, updated_at) VALUES ('current_index', ?, ?)",
            params![key, chrono::Utc::now().timestamp()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Key of the most recently stored index artifact
    pub fn current_index_key(&self) -> Result<Option<String>> {
        let Some(conn) = self.open_existing_db()? else {
            return Ok(None);
        };
        conn.query_row("SELECT value FROM statistics WHERE key = 'current_index'", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(db_err)
    }

    /// Delete an artifact that failed to load
    pub fn discard_index(&self, key: &str) -> Result<()> {
        let path = self.index_path(key);
        log::warn!("Discarding index artifact {:?}", path);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(IconError::index_write(format!("cannot remove {}: {}", path.display(), e)))
            }
            _ => Ok(()),
        }
    }

    /// Try to take the cross-process build lock; false when another build holds it
    pub fn try_acquire_build_lock(&self) -> Result<bool> {
        let lock_path = self.cache_path.join(LOCK_FILE);
        std::fs::create_dir_all(&self.cache_path).map_err(IconError::index_write)?;

        match std::fs::OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                use std::io::Write;
                let pid = std::process::id();
                writeln!(file, "{}", pid).map_err(IconError::index_write)?;
                log::debug!("Acquired build lock (PID: {})", pid);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(IconError::index_write(format!("cannot create {}: {}", lock_path.display(), e))),
        }
    }

    /// Age of an existing build lock, if any
    pub fn build_lock_age(&self) -> Option<Duration> {
        std::fs::metadata(self.cache_path.join(LOCK_FILE))
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
    }

    pub fn release_build_lock(&self) {
        let lock_path = self.cache_path.join(LOCK_FILE);
        match std::fs::remove_file(&lock_path) {
            Ok(()) => log::debug!("Released build lock"),
            Err(e) => log::warn!("Failed to remove {:?}: {}", lock_path, e),
        }
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let cache_size_bytes: u64 = WalkDir::new(&self.cache_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();

        let Some(conn) = self.open_existing_db()? else {
            return Ok(IndexStats {
                index_key: None,
                total_collections: 0,
                total_icons: 0,
                total_tokens: 0,
                cache_size_bytes,
                cached_resources: 0,
                last_built: None,
            });
        };

        let cached_resources: i64 = conn
            .query_row("SELECT COUNT(*) FROM resources WHERE body IS NOT NULL", [], |row| row.get(0))
            .map_err(db_err)?;

        let index_key = self.current_index_key()?;
        let build: Option<(i64, i64, i64, i64)> = match &index_key {
            Some(key) => conn
                .query_row(
                    "SELECT collections, icons, tokens, built_at FROM builds WHERE key = ?",
                    [key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()
                .map_err(db_err)?,
            None => None,
        };

        let (collections, icons, tokens, built_at) = match build {
            Some((c, i, t, at)) => (c as usize, i as usize, t as usize, Some(timestamp_to_rfc3339(at))),
            None => (0, 0, 0, None),
        };

        Ok(IndexStats {
            index_key,
            total_collections: collections,
            total_icons: icons,
            total_tokens: tokens,
            cache_size_bytes,
            cached_resources: cached_resources as usize,
            last_built: built_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::remote::FetchError;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Replays canned outcomes and records the etags it was sent
    struct Canned {
        replies: Mutex<VecDeque<std::result::Result<FetchOutcome, FetchError>>>,
        etags: Mutex<Vec<Option<String>>>,
    }

    impl Canned {
        fn new(replies: Vec<std::result::Result<FetchOutcome, FetchError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                etags: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.etags.lock().unwrap().len()
        }
    }

    impl Fetcher for Canned {
        fn fetch(
            &self,
            _resource: &str,
            _timeout: Duration,
            etag: Option<&str>,
        ) -> std::result::Result<FetchOutcome, FetchError> {
            self.etags.lock().unwrap().push(etag.map(String::from));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("no more replies".into())))
        }
    }

    fn fetched(body: &str, etag: Option<&str>) -> std::result::Result<FetchOutcome, FetchError> {
        Ok(FetchOutcome::Fetched {
            bytes: body.as_bytes().to_vec(),
            etag: etag.map(String::from),
        })
    }

    fn policy(force: bool) -> FetchPolicy {
        FetchPolicy {
            force,
            timeout: Duration::from_secs(1),
        }
    }

    fn accept(_: &[u8]) -> Result<()> {
        Ok(())
    }

    fn setup() -> (TempDir, CacheManager) {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path());
        cache.init().unwrap();
        (temp, cache)
    }

    #[test]
    fn test_cache_init() {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path());

        assert!(!cache.exists());
        cache.init().unwrap();
        assert!(cache.exists());
        assert!(cache.path().join(META_DB).exists());
        assert!(cache.path().join(CONFIG_TOML).exists());
        assert!(cache.path().join(INDEX_DIR).is_dir());
    }

    #[test]
    fn test_cache_init_idempotent() {
        let (_temp, cache) = setup();
        cache.init().unwrap();
        assert!(cache.exists());
        cache.validate().unwrap();
    }

    #[test]
    fn test_cache_clear_keeps_config() {
        let (_temp, cache) = setup();
        cache.clear().unwrap();
        assert!(!cache.exists());
        assert!(cache.path().join(CONFIG_TOML).exists());
        cache.clear().unwrap();
    }

    #[test]
    fn test_absent_then_cached() {
        let (_temp, cache) = setup();
        assert!(cache.peek("mdi.json").unwrap().is_none());

        let fetcher = Canned::new(vec![fetched("{}", Some("v1"))]);
        let body = cache.fetch_resource("mdi.json", &fetcher, policy(false), accept).unwrap();
        assert_eq!(body, b"{}");

        let entry = cache.peek("mdi.json").unwrap().unwrap();
        assert_eq!(entry.state, ResourceState::Cached);
        assert_eq!(entry.etag.as_deref(), Some("v1"));

        // served from cache without another fetch
        cache.fetch_resource("mdi.json", &fetcher, policy(false), accept).unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_first_fetch_failure_is_error_state() {
        let (_temp, cache) = setup();
        let fetcher = Canned::new(vec![Err(FetchError::Timeout(Duration::from_secs(1)))]);

        let err = cache.fetch_resource("mdi.json", &fetcher, policy(false), accept).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(err.is_timeout());

        let entry = cache.peek("mdi.json").unwrap().unwrap();
        assert_eq!(entry.state, ResourceState::Error);
        assert!(entry.body.is_none());
        assert!(entry.last_error.is_some());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_value() {
        let (_temp, cache) = setup();
        let fetcher = Canned::new(vec![
            fetched("old", None),
            Err(FetchError::Transport("connection refused".into())),
        ]);

        cache.fetch_resource("k", &fetcher, policy(false), accept).unwrap();
        let err = cache.fetch_resource("k", &fetcher, policy(true), accept).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(!err.is_timeout());

        let entry = cache.peek("k").unwrap().unwrap();
        assert_eq!(entry.body.as_deref(), Some(&b"old"[..]));
        assert_eq!(entry.state, ResourceState::Stale);
    }

    #[test]
    fn test_stale_refetches_with_etag_and_not_modified() {
        let (_temp, cache) = setup();
        let fetcher = Canned::new(vec![fetched("body", Some("abc")), Ok(FetchOutcome::NotModified)]);

        cache.fetch_resource("k", &fetcher, policy(false), accept).unwrap();
        cache.invalidate("k").unwrap();
        assert_eq!(cache.peek("k").unwrap().unwrap().state, ResourceState::Stale);

        let body = cache.fetch_resource("k", &fetcher, policy(false), accept).unwrap();
        assert_eq!(body, b"body");
        assert_eq!(cache.peek("k").unwrap().unwrap().state, ResourceState::Cached);
        assert_eq!(fetcher.etags.lock().unwrap()[1].as_deref(), Some("abc"));
    }

    #[test]
    fn test_invalid_bytes_never_committed() {
        let (_temp, cache) = setup();
        let fetcher = Canned::new(vec![fetched("good", None), fetched("bad", None)]);

        cache.fetch_resource("k", &fetcher, policy(false), accept).unwrap();
        let reject = |bytes: &[u8]| {
            if bytes == b"bad" {
                Err(IconError::corrupted("rejected"))
            } else {
                Ok(())
            }
        };
        let err = cache.fetch_resource("k", &fetcher, policy(true), reject).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheCorrupted);
        assert_eq!(cache.peek("k").unwrap().unwrap().body.as_deref(), Some(&b"good"[..]));
    }

    #[test]
    fn test_unreadable_meta_db_is_corrupted() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(META_DB), b"this is not sqlite at all, not even close").unwrap();
        let cache = CacheManager::new(temp.path());

        let err = cache.peek("k").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheCorrupted);
    }

    #[test]
    fn test_build_lock_exclusive() {
        let (_temp, cache) = setup();
        assert!(cache.try_acquire_build_lock().unwrap());
        assert!(!cache.try_acquire_build_lock().unwrap());
        assert!(cache.build_lock_age().is_some());
        cache.release_build_lock();
        assert!(cache.try_acquire_build_lock().unwrap());
    }

    #[test]
    fn test_stats_before_init() {
        let temp = TempDir::new().unwrap();
        let cache = CacheManager::new(temp.path().join("nowhere"));
        let stats = cache.stats().unwrap();
        assert_eq!(stats.index_key, None);
        assert_eq!(stats.cached_resources, 0);
    }

    #[test]
    fn test_concurrent_resources_independent() {
        use std::thread;

        let (temp, cache) = setup();
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let fetcher = Canned::new(vec![fetched(&format!("body-{}", i), None)]);
                    cache
                        .fetch_resource(&format!("set-{}.json", i), &fetcher, policy(false), accept)
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let listed = CacheManager::new(temp.path()).list_resources().unwrap();
        assert_eq!(listed.len(), 8);
        assert!(listed.iter().all(|r| r.state == ResourceState::Cached));
    }
}
