//! Index builder
//!
//! Builds the inverted index from the corpus and persists it through the
//! cache layer. An artifact is keyed by the corpus version (plus the prefix
//! restriction, if any), so an unchanged corpus is never re-indexed unless
//! forced.
//!
//! Builds are mutually exclusive: in-process through a mutex and a
//! completed-build generation counter, across processes through
//! `index.lock` in the cache directory.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::CacheManager;
use crate::corpus::Corpus;
use crate::error::{ErrorKind, IconError, Result};
use crate::index::{Index, IndexBuilder};

/// A lock older than this is assumed abandoned by a crashed process
const STALE_LOCK_AGE: Duration = Duration::from_secs(600);
/// How long to wait for another process's build
const LOCK_WAIT: Duration = Duration::from_secs(120);
const LOCK_POLL: Duration = Duration::from_millis(100);

/// Options for one build request
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rebuild even when an artifact for this corpus version exists
    pub force: bool,
    /// Only index these prefixes (None = every collection)
    pub prefixes: Option<BTreeSet<String>>,
    pub show_progress: bool,
}

/// What a build request did
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// A valid artifact already existed (or a concurrent build produced it)
    UpToDate(Arc<Index>),
    Built { index: Arc<Index>, elapsed: Duration },
}

impl BuildOutcome {
    pub fn index(&self) -> &Arc<Index> {
        match self {
            Self::UpToDate(index) | Self::Built { index, .. } => index,
        }
    }

    pub fn was_built(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

/// Artifact key for a corpus version and optional prefix restriction
pub fn index_key(corpus_version: &str, prefixes: Option<&BTreeSet<String>>) -> String {
    match prefixes {
        None => corpus_version.to_string(),
        Some(prefixes) => {
            let mut hasher = blake3::Hasher::new();
            for prefix in prefixes {
                hasher.update(prefix.as_bytes());
                hasher.update(b",");
            }
            let digest: String = hasher.finalize().as_bytes()[..4]
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();
            format!("{}-{}", corpus_version, digest)
        }
    }
}

/// Manages the indexing process
pub struct Indexer {
    cache: Arc<CacheManager>,
    /// Key of the last artifact this process built; held for the whole build
    last_built: Mutex<Option<String>>,
    generation: AtomicU64,
}

impl Indexer {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            last_built: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Completed builds since this indexer was created
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Build or reuse the index for `corpus`
    pub fn build(&self, corpus: &Corpus, options: &BuildOptions) -> Result<BuildOutcome> {
        if corpus.sets().next().is_none() {
            return Err(IconError::corpus("corpus contains no icon sets"));
        }

        let key = index_key(corpus.version(), options.prefixes.as_ref());
        let seen_generation = self.generation();

        let mut last_built = self.last_built.lock().unwrap_or_else(PoisonError::into_inner);

        // Someone built this exact artifact while we waited for the mutex
        let coalesced = self.generation() != seen_generation && last_built.as_deref() == Some(key.as_str());
        if coalesced {
            log::debug!("Build of {} coalesced into a concurrent build", key);
        }

        if !options.force || coalesced {
            if let Some(index) = self.existing(&key, corpus.version())? {
                self.cache.set_current_index(&key)?;
                log::info!("Index {} is up to date", key);
                return Ok(BuildOutcome::UpToDate(index));
            }
        }

        let waited = self.acquire_process_lock()?;
        let _lock_guard = scopeguard::guard((), |_| self.cache.release_build_lock());

        // Another process may have finished the same build while we waited
        if waited {
            if let Some(index) = self.existing(&key, corpus.version())? {
                self.cache.set_current_index(&key)?;
                log::info!("Index {} was built by another process", key);
                return Ok(BuildOutcome::UpToDate(index));
            }
        }

        let start = Instant::now();
        let index = Arc::new(self.build_index(corpus, &key, options));
        self.cache.store_index(&index)?;

        *last_built = Some(key);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let elapsed = start.elapsed();
        log::info!(
            "Built index {} in {:?}: {} icons, {} tokens",
            index.key(),
            elapsed,
            index.icon_count(),
            index.token_count()
        );
        Ok(BuildOutcome::Built { index, elapsed })
    }

    /// Load a stored artifact; corrupt ones are discarded so they get rebuilt
    fn existing(&self, key: &str, corpus_version: &str) -> Result<Option<Arc<Index>>> {
        match self.cache.load_index(key) {
            Ok(Some(index)) if index.corpus_version() == corpus_version => Ok(Some(Arc::new(index))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::CacheCorrupted => {
                log::warn!("Index artifact {} unusable ({}), rebuilding", key, e);
                self.cache.discard_index(key)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Take `index.lock`; returns whether another holder had to be waited for
    fn acquire_process_lock(&self) -> Result<bool> {
        let started = Instant::now();
        let mut waited = false;

        loop {
            if self.cache.try_acquire_build_lock()? {
                return Ok(waited);
            }

            if self.cache.build_lock_age().is_some_and(|age| age > STALE_LOCK_AGE) {
                log::warn!("Removing abandoned build lock");
                self.cache.release_build_lock();
                continue;
            }

            if started.elapsed() > LOCK_WAIT {
                return Err(IconError::index_write("another process is still building the index"));
            }

            if !waited {
                log::info!("Waiting for another index build to finish");
            }
            waited = true;
            std::thread::sleep(LOCK_POLL);
        }
    }

    fn build_index(&self, corpus: &Corpus, key: &str, options: &BuildOptions) -> Index {
        let sets: Vec<_> = corpus
            .sets()
            .filter(|set| {
                options
                    .prefixes
                    .as_ref()
                    .is_none_or(|p| p.contains(set.prefix()))
            })
            .collect();

        if let Some(prefixes) = &options.prefixes {
            for missing in prefixes.iter().filter(|p| !corpus.contains(p)) {
                log::warn!("Prefix '{}' is not in the corpus, skipping", missing);
            }
        }

        log::info!("Indexing {} collections for {}", sets.len(), key);

        let pb = if options.show_progress {
            let pb = ProgressBar::new(sets.len() as u64);
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} collections ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let builder = sets
            .par_iter()
            .map(|set| {
                let mut partial = IndexBuilder::new();
                partial.add_set(corpus, set);
                pb.inc(1);
                partial
            })
            .reduce(IndexBuilder::new, |mut acc, partial| {
                acc.merge(partial);
                acc
            });

        pb.finish_with_message("Index built");
        builder.finish(key, corpus.version())
    }
}
