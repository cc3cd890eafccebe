//! Remote collections
//!
//! Collections missing from the bundled corpus can be served from the Iconify
//! public sources. All fetched documents go through the cache layer, so a
//! collection is downloaded once and stays available offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use thiserror::Error;

use crate::cache::{CacheManager, FetchPolicy};
use crate::corpus::{COLLECTIONS_JSON, IconSet, parse_collection_list, valid_prefix};
use crate::error::{IconError, Result};
use crate::models::Collection;
use crate::resolver::CollectionSource;

/// Default Iconify API base (serves `/collections`)
pub const DEFAULT_API_BASE: &str = "https://api.iconify.design";
/// Default base URL of the raw icon-set documents
pub const DEFAULT_JSON_BASE: &str = "https://raw.githubusercontent.com/iconify/icon-sets/master/json";

/// Result of a successful request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { bytes: Vec<u8>, etag: Option<String> },
    /// The server confirmed the cached copy (ETag matched)
    NotModified,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Retrieves a named remote resource (`collections.json`, `{prefix}.json`)
pub trait Fetcher: Send + Sync {
    fn fetch(&self, resource: &str, timeout: Duration, etag: Option<&str>) -> std::result::Result<FetchOutcome, FetchError>;
}

/// Blocking HTTP fetcher over the public Iconify sources
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    api_base: String,
    json_base: String,
}

impl HttpFetcher {
    pub fn new(api_base: &str, json_base: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("iconify-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IconError::network("http client", false, e))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            json_base: json_base.trim_end_matches('/').to_string(),
        })
    }

    /// URL serving a resource
    pub fn url_for(&self, resource: &str) -> String {
        if resource == COLLECTIONS_JSON {
            format!("{}/collections", self.api_base)
        } else {
            format!("{}/{}", self.json_base, resource)
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, resource: &str, timeout: Duration, etag: Option<&str>) -> std::result::Result<FetchOutcome, FetchError> {
        let url = self.url_for(resource);
        log::debug!("GET {}", url);

        let mut request = self.client.get(&url).timeout(timeout);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Transport(e.to_string())
            }
        };

        let response = request.send().map_err(classify)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().map_err(classify)?.to_vec();

        Ok(FetchOutcome::Fetched { bytes, etag })
    }
}

/// Collection source backed by the cache layer and a fetcher
///
/// A prefix is only fetched when `collections.json` lists it. Parsed sets
/// are memoized for the lifetime of the source.
pub struct RemoteCollections {
    cache: Arc<CacheManager>,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    /// When false, only already-cached documents are served
    online: bool,
    sets: RwLock<HashMap<String, Arc<IconSet>>>,
}

impl RemoteCollections {
    pub fn new(cache: Arc<CacheManager>, fetcher: Arc<dyn Fetcher>, timeout: Duration, online: bool) -> Self {
        Self {
            cache,
            fetcher,
            timeout,
            online,
            sets: RwLock::new(HashMap::new()),
        }
    }

    fn policy(&self, force: bool) -> FetchPolicy {
        FetchPolicy {
            force,
            timeout: self.timeout,
        }
    }

    /// Cached or fetched bytes of a resource; `None` offline without a copy
    fn resource(&self, key: &str, force: bool, validate: impl Fn(&[u8]) -> Result<()>) -> Result<Option<Vec<u8>>> {
        if self.online {
            return self
                .cache
                .fetch_resource(key, self.fetcher.as_ref(), self.policy(force), validate)
                .map(Some);
        }
        Ok(self.cache.peek(key)?.and_then(|entry| entry.body))
    }

    /// Collections the remote catalogue knows about
    pub fn collections(&self) -> Result<BTreeMap<String, Collection>> {
        let validate = |bytes: &[u8]| {
            parse_collection_list(bytes)
                .map(|_| ())
                .map_err(|e| IconError::corrupted(format!("{}: {}", COLLECTIONS_JSON, e)))
        };

        match self.resource(COLLECTIONS_JSON, false, validate)? {
            Some(bytes) => parse_collection_list(&bytes)
                .map_err(|e| IconError::corrupted(format!("{}: {}", COLLECTIONS_JSON, e))),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Raw icon-set document for a prefix, refetched when `force` is set
    pub fn icon_set_bytes(&self, prefix: &str, force: bool) -> Result<Option<Vec<u8>>> {
        if !valid_prefix(prefix) {
            return Ok(None);
        }
        if self.online && !self.collections()?.contains_key(prefix) {
            return Ok(None);
        }

        let key = format!("{}.json", prefix);
        let validate = |bytes: &[u8]| {
            IconSet::from_json(bytes, Some(prefix))
                .map(|_| ())
                .map_err(|e| IconError::corrupted(format!("{}: {}", key, e)))
        };
        self.resource(&key, force, validate)
    }
}

impl CollectionSource for RemoteCollections {
    fn name(&self) -> &str {
        "remote"
    }

    fn icon_set(&self, prefix: &str) -> Result<Option<Arc<IconSet>>> {
        if let Some(set) = self.sets.read().unwrap_or_else(PoisonError::into_inner).get(prefix) {
            return Ok(Some(Arc::clone(set)));
        }

        let Some(bytes) = self.icon_set_bytes(prefix, false)? else {
            return Ok(None);
        };
        let mut set = IconSet::from_json(&bytes, Some(prefix))
            .map_err(|e| IconError::corrupted(format!("{}.json: {}", prefix, e)))?;
        if let Some(meta) = self.collections()?.get(prefix) {
            set = set.with_metadata(meta);
        }
        let set = Arc::new(set);

        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.to_string(), Arc::clone(&set));
        Ok(Some(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const COLLECTIONS: &str = r#"{ "tabler": { "name": "Tabler Icons", "license": { "title": "MIT" } } }"#;
    const TABLER: &str = r#"{ "prefix": "tabler", "icons": { "star": { "body": "<path d=\"M12 17l-6 3\"/>" } }, "width": 24, "height": 24 }"#;

    /// Serves fixed documents, or fails every request
    struct StaticFetcher {
        docs: HashMap<String, String>,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn new(fail: bool) -> Self {
            let docs = HashMap::from([
                (COLLECTIONS_JSON.to_string(), COLLECTIONS.to_string()),
                ("tabler.json".to_string(), TABLER.to_string()),
            ]);
            Self {
                docs,
                fail,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, resource: &str, timeout: Duration, _etag: Option<&str>) -> std::result::Result<FetchOutcome, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(resource.to_string());
            if self.fail {
                return Err(FetchError::Timeout(timeout));
            }
            match self.docs.get(resource) {
                Some(doc) => Ok(FetchOutcome::Fetched {
                    bytes: doc.as_bytes().to_vec(),
                    etag: None,
                }),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    fn remote(temp: &TempDir, fetcher: Arc<StaticFetcher>, online: bool) -> RemoteCollections {
        let cache = Arc::new(CacheManager::new(temp.path()));
        cache.init().unwrap();
        RemoteCollections::new(cache, fetcher, Duration::from_secs(1), online)
    }

    #[test]
    fn test_http_urls() {
        let fetcher = HttpFetcher::new(DEFAULT_API_BASE, &format!("{}/", DEFAULT_JSON_BASE)).unwrap();
        assert_eq!(fetcher.url_for(COLLECTIONS_JSON), "https://api.iconify.design/collections");
        assert_eq!(
            fetcher.url_for("mdi.json"),
            "https://raw.githubusercontent.com/iconify/icon-sets/master/json/mdi.json"
        );
    }

    #[test]
    fn test_fetches_listed_prefix_once() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(false));
        let remote = remote(&temp, Arc::clone(&fetcher), true);

        let set = remote.icon_set("tabler").unwrap().unwrap();
        assert!(set.get("star").is_some());

        let calls = fetcher.calls.load(Ordering::SeqCst);
        remote.icon_set("tabler").unwrap().unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_remote_set_carries_catalogue_metadata() {
        let temp = TempDir::new().unwrap();
        let remote = remote(&temp, Arc::new(StaticFetcher::new(false)), true);

        let set = remote.icon_set("tabler").unwrap().unwrap();
        assert_eq!(set.collection().display_name, "Tabler Icons");
        assert_eq!(set.collection().license.title, "MIT");

        // the offline copy gets the same metadata from the cached catalogue
        let offline = super::RemoteCollections::new(
            Arc::clone(&remote.cache),
            Arc::new(StaticFetcher::new(true)),
            Duration::from_secs(1),
            false,
        );
        let set = offline.icon_set("tabler").unwrap().unwrap();
        assert_eq!(set.collection().license.title, "MIT");
    }

    #[test]
    fn test_unlisted_prefix_is_unknown() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(false));
        let remote = remote(&temp, Arc::clone(&fetcher), true);

        assert!(remote.icon_set("nosuch").unwrap().is_none());
        assert!(!fetcher.seen.lock().unwrap().contains(&"nosuch.json".to_string()));
        assert!(remote.icon_set("../etc").unwrap().is_none());
    }

    #[test]
    fn test_timeout_surfaces_network_error() {
        let temp = TempDir::new().unwrap();
        let remote = remote(&temp, Arc::new(StaticFetcher::new(true)), true);

        let err = remote.icon_set("tabler").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_offline_serves_cached_copy_only() {
        let temp = TempDir::new().unwrap();
        remote(&temp, Arc::new(StaticFetcher::new(false)), true)
            .icon_set("tabler")
            .unwrap()
            .unwrap();

        let fetcher = Arc::new(StaticFetcher::new(true));
        let offline = remote(&temp, Arc::clone(&fetcher), false);
        assert!(offline.icon_set("tabler").unwrap().is_some());
        assert!(offline.icon_set("mdi").unwrap().is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
