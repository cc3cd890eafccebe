//! Library facade
//!
//! `IconLibrary` wires the corpus, cache, remote source, resolver, index
//! builder and search engine together behind the operations callers use:
//! `resolve`, `search`, `assemble` and `build_index`.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::assembler::{self, Assembled};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::error::{ErrorKind, IconError, Result};
use crate::index::Index;
use crate::indexer::{BuildOptions, BuildOutcome, Indexer, index_key};
use crate::models::{Collection, FullIdentifier, IndexStats, License, ResolvedIcon, SearchHit, StyleOptions};
use crate::query::{QueryEngine, QueryFilter};
use crate::remote::{Fetcher, HttpFetcher, RemoteCollections};
use crate::resolver::{CollectionSource, Resolver};

/// License details for one icon
#[derive(Debug, Clone, Serialize)]
pub struct Attribution {
    pub icon: FullIdentifier,
    /// Canonical icon when `icon` is an alias
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<FullIdentifier>,
    pub collection: String,
    pub license: License,
    /// The comment block appended to assembled markup
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

/// Result of `doctor`
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<Check>,
}

impl DoctorReport {
    pub fn healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    fn push(&mut self, name: &'static str, status: CheckStatus, detail: impl Into<String>) {
        self.checks.push(Check {
            name,
            status,
            detail: detail.into(),
        });
    }
}

/// Outcome of syncing one prefix into the corpus directory
#[derive(Debug, Clone, Serialize)]
pub struct SyncedSet {
    pub prefix: String,
    pub icons: usize,
}

/// Offline icon library
pub struct IconLibrary {
    config: Config,
    cache: Arc<CacheManager>,
    corpus: Option<Arc<Corpus>>,
    /// Why the configured corpus could not be loaded
    corpus_error: Option<String>,
    remote: Arc<RemoteCollections>,
    resolver: Resolver,
    indexer: Indexer,
    index: RwLock<Option<Arc<Index>>>,
}

impl IconLibrary {
    /// Open with the HTTP fetcher described by the configuration
    pub fn open(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.network.api_base, &config.network.json_base)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Open with a caller-supplied remote fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let cache = Arc::new(CacheManager::new(&config.cache_dir));
        cache.init()?;

        let (corpus, corpus_error) = match &config.corpus.dir {
            Some(dir) => match Corpus::open(dir) {
                Ok(corpus) => (Some(Arc::new(corpus)), None),
                Err(e) => {
                    log::warn!("{}", e);
                    (None, Some(e.to_string()))
                }
            },
            None => (None, Some("no corpus directory configured".to_string())),
        };

        let remote = Arc::new(RemoteCollections::new(
            Arc::clone(&cache),
            fetcher,
            config.network.timeout(),
            config.network.enabled,
        ));

        Ok(Self::assemble_parts(config, cache, corpus, corpus_error, remote))
    }

    /// Open around an already loaded corpus
    pub fn with_corpus(config: Config, corpus: Corpus, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let cache = Arc::new(CacheManager::new(&config.cache_dir));
        cache.init()?;

        let remote = Arc::new(RemoteCollections::new(
            Arc::clone(&cache),
            fetcher,
            config.network.timeout(),
            config.network.enabled,
        ));

        Ok(Self::assemble_parts(config, cache, Some(Arc::new(corpus)), None, remote))
    }

    fn assemble_parts(
        config: Config,
        cache: Arc<CacheManager>,
        corpus: Option<Arc<Corpus>>,
        corpus_error: Option<String>,
        remote: Arc<RemoteCollections>,
    ) -> Self {
        let mut sources: Vec<Arc<dyn CollectionSource>> = Vec::new();
        if let Some(corpus) = &corpus {
            sources.push(Arc::clone(corpus) as Arc<dyn CollectionSource>);
        }
        sources.push(Arc::clone(&remote) as Arc<dyn CollectionSource>);

        Self {
            indexer: Indexer::new(Arc::clone(&cache)),
            resolver: Resolver::new(sources),
            config,
            cache,
            corpus,
            corpus_error,
            remote,
            index: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn corpus(&self) -> Option<&Arc<Corpus>> {
        self.corpus.as_ref()
    }

    fn require_corpus(&self) -> Result<&Arc<Corpus>> {
        self.corpus.as_ref().ok_or_else(|| {
            IconError::corpus(self.corpus_error.as_deref().unwrap_or("corpus not loaded"))
        })
    }

    /// Resolve `prefix:name` to its canonical record
    pub fn resolve(&self, identifier: &str) -> Result<ResolvedIcon> {
        self.resolver.resolve(identifier)
    }

    /// Ranked keyword search
    pub fn search(&self, query: &str, filter: &QueryFilter) -> Result<Vec<SearchHit>> {
        let index = self.current_index()?;
        QueryEngine::new(index, self.corpus.clone(), self.config.search.fallback_scan).search(query, filter)
    }

    pub fn assemble(&self, resolved: &ResolvedIcon, style: &StyleOptions) -> Result<Assembled> {
        assembler::assemble(resolved, style)
    }

    /// Resolve and assemble in one step
    pub fn get(&self, identifier: &str, style: &StyleOptions) -> Result<Assembled> {
        let resolved = self.resolve(identifier)?;
        self.assemble(&resolved, style)
    }

    pub fn attribution(&self, identifier: &str) -> Result<Attribution> {
        let resolved = self.resolve(identifier)?;
        Ok(Attribution {
            canonical: resolved.via_alias().then(|| resolved.record.id()),
            icon: resolved.requested.clone(),
            collection: resolved.collection.display_name.clone(),
            license: resolved.collection.license.clone(),
            comment: assembler::attribution_comment(&resolved),
        })
    }

    /// Build (or reuse) the index for the loaded corpus
    pub fn build_index(&self, options: &BuildOptions) -> Result<BuildOutcome> {
        let corpus = self.require_corpus()?;
        let outcome = self.indexer.build(corpus, options)?;
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(outcome.index()));
        Ok(outcome)
    }

    /// Index used for searches, loading it from the cache on first use
    ///
    /// With a corpus, only an artifact of the current corpus version is used.
    /// Without one, the last built artifact is. A corrupt artifact is rebuilt
    /// from the corpus.
    fn current_index(&self) -> Result<Option<Arc<Index>>> {
        if let Some(index) = self.index.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Some(Arc::clone(index)));
        }

        let loaded = match self.load_current_index() {
            Ok(index) => index,
            Err(e) if e.kind() == ErrorKind::CacheCorrupted => {
                log::warn!("{}; rebuilding index from corpus", e);
                let corpus = self.require_corpus()?;
                let outcome = self.indexer.build(corpus, &BuildOptions::default())?;
                Some(Arc::clone(outcome.index()))
            }
            Err(e) => return Err(e),
        };

        if let Some(index) = &loaded {
            *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(index));
        }
        Ok(loaded)
    }

    fn load_current_index(&self) -> Result<Option<Arc<Index>>> {
        let current = self.cache.current_index_key()?;

        let key = match &self.corpus {
            Some(corpus) => match current {
                Some(key) if key.starts_with(corpus.version()) => key,
                _ => index_key(corpus.version(), None),
            },
            None => match current {
                Some(key) => key,
                None => return Ok(None),
            },
        };

        let index = self.cache.load_index(&key)?;
        if index.is_none() && self.corpus.is_some() {
            log::info!("No index for the current corpus; run 'icx build-index'");
        }
        Ok(index.map(Arc::new))
    }

    /// Collections from the corpus, optionally merged with the remote catalogue
    pub fn collections(&self, include_remote: bool) -> Result<Vec<Collection>> {
        let mut merged: BTreeMap<String, Collection> = BTreeMap::new();

        if include_remote {
            merged.extend(self.remote.collections()?);
        }
        if let Some(corpus) = &self.corpus {
            for collection in corpus.collections() {
                merged.insert(collection.prefix.clone(), collection);
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Download icon sets into the corpus directory
    ///
    /// The loaded corpus is not reloaded; the next process picks the new
    /// sets up (and needs a `build_index` to search them).
    pub fn sync(&self, prefixes: &BTreeSet<String>, force: bool) -> Result<Vec<SyncedSet>> {
        let dir = self
            .config
            .corpus
            .dir
            .as_ref()
            .ok_or_else(|| IconError::corpus("no corpus directory configured"))?;

        let mut synced = Vec::new();
        for prefix in prefixes {
            let bytes = self
                .remote
                .icon_set_bytes(prefix, force)?
                .ok_or_else(|| IconError::UnknownPrefix(prefix.clone()))?;
            let set = Corpus::install_icon_set(dir, prefix, &bytes)?;
            synced.push(SyncedSet {
                prefix: prefix.clone(),
                icons: set.canonical().count(),
            });
        }
        Ok(synced)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.cache.stats()
    }

    /// Drop cached resources and index artifacts
    pub fn clear(&self) -> Result<()> {
        self.cache.clear()?;
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    /// Check corpus, cache, index and (optionally) network health
    pub fn doctor(&self, check_network: bool) -> DoctorReport {
        let mut report = DoctorReport { checks: Vec::new() };

        match &self.corpus {
            Some(corpus) => {
                let detail = format!(
                    "{} collections, {} icons (version {})",
                    corpus.sets().count(),
                    corpus.icon_count(),
                    corpus.version()
                );
                report.push("corpus", CheckStatus::Ok, detail);
                for (prefix, reason) in corpus.skipped() {
                    report.push("corpus", CheckStatus::Warn, format!("skipped '{}': {}", prefix, reason));
                }
            }
            None => report.push(
                "corpus",
                CheckStatus::Warn,
                self.corpus_error.clone().unwrap_or_else(|| "not loaded".to_string()),
            ),
        }

        match self.cache.validate() {
            Ok(()) => report.push("cache", CheckStatus::Ok, self.cache.path().display().to_string()),
            Err(e) => report.push("cache", CheckStatus::Fail, e.to_string()),
        }

        match self.load_current_index() {
            Ok(Some(index)) => report.push(
                "index",
                CheckStatus::Ok,
                format!("{} ({} icons, {} tokens)", index.key(), index.icon_count(), index.token_count()),
            ),
            Ok(None) if self.config.search.fallback_scan && self.corpus.is_some() => {
                report.push("index", CheckStatus::Warn, "not built; searches scan the corpus")
            }
            Ok(None) => report.push("index", CheckStatus::Warn, "not built; run 'icx build-index'"),
            Err(e) => report.push("index", CheckStatus::Fail, e.to_string()),
        }

        if !self.config.network.enabled {
            report.push("network", CheckStatus::Warn, "disabled; only cached collections are served");
        } else if check_network {
            match self.remote.collections() {
                Ok(list) => report.push(
                    "network",
                    CheckStatus::Ok,
                    format!("{} remote collections available", list.len()),
                ),
                Err(e) => report.push("network", CheckStatus::Fail, e.to_string()),
            }
        }

        report
    }
}
