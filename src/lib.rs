//! iconify: offline search and resolution for Iconify icon sets
//!
//! Resolves identifiers of the form `prefix:name` into sanitized, standalone
//! SVG markup with license attribution, and searches a local icon corpus by
//! keyword without network access.
//!
//! # Architecture
//!
//! - **Corpus**: icon-set documents loaded from a data directory, validated at ingestion
//! - **Indexer**: builds the inverted index over names, aliases and tags; persists it in the cache
//! - **Query Engine**: ranks icons for a free-text query
//! - **Resolver**: maps identifiers to canonical records across the corpus and remote collections
//! - **Assembler**: sanitizes bodies and emits markup plus attribution
//! - **Cache**: `meta.db`, fetched remote documents and index artifacts
//!
//! # Example Usage
//!
//! ```no_run
//! use iconify::{Config, IconLibrary, QueryFilter, StyleOptions};
//! use iconify::indexer::BuildOptions;
//!
//! let mut config = Config::load(&iconify::config::default_cache_dir()).unwrap();
//! config.corpus.dir = Some("icon-sets".into());
//!
//! let library = IconLibrary::open(config).unwrap();
//! library.build_index(&BuildOptions::default()).unwrap();
//!
//! for hit in library.search("arrow right", &QueryFilter::with_limit(10)).unwrap() {
//!     println!("{} ({})", hit.id, hit.score);
//! }
//!
//! let svg = library.get("mdi:home", &StyleOptions::default()).unwrap();
//! println!("{}", svg.document());
//! ```

pub mod assembler;
pub mod cache;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod indexer;
pub mod library;
pub mod models;
pub mod output;
pub mod query;
pub mod remote;
pub mod resolver;
pub mod tokenize;

// Re-export commonly used types
pub use cache::CacheManager;
pub use config::Config;
pub use corpus::Corpus;
pub use error::{ErrorKind, IconError, Result};
pub use indexer::Indexer;
pub use library::IconLibrary;
pub use models::{Collection, FullIdentifier, IconRecord, IndexStats, ResolvedIcon, SearchHit, StyleOptions};
pub use query::{QueryEngine, QueryFilter};
