//! Icon corpus store and ingestion
//!
//! The corpus is an immutable, versioned set of icon collections loaded from
//! a data directory:
//!
//! ```text
//! <corpus>/
//!   collections.json     optional: prefix -> collection info
//!   json/<prefix>.json   one Iconify icon-set document per collection
//!   tags.json            optional: "prefix:name" -> ["tag", ...]
//! ```
//!
//! Icon-set JSON is loosely typed; `IconSet::from_json` is the only place that
//! sees it. Everything downstream works with `Collection` and `IconRecord`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

use crate::error::{IconError, Result};
use crate::models::{Author, Collection, IconRecord, License};

/// Collection metadata file name
pub const COLLECTIONS_JSON: &str = "collections.json";
/// Subdirectory holding icon-set documents
pub const ICON_SETS_DIR: &str = "json";
/// Optional external tag table
pub const TAGS_JSON: &str = "tags.json";

/// Default viewBox size of the Iconify format
const DEFAULT_VIEWBOX: u32 = 16;

/// Why an icon-set document was rejected at ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid icon-set JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("prefix mismatch: expected '{expected}', document declares '{found}'")]
    PrefixMismatch { expected: String, found: String },

    #[error("invalid prefix '{0}'")]
    InvalidPrefix(String),

    #[error("icon set '{0}' contains no icons")]
    Empty(String),
}

#[derive(Debug, Deserialize)]
struct RawIconSet {
    prefix: String,
    #[serde(default)]
    info: Option<RawInfo>,
    #[serde(default)]
    icons: BTreeMap<String, RawIcon>,
    #[serde(default)]
    aliases: BTreeMap<String, RawAlias>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawIcon {
    body: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    hidden: bool,
}

#[derive(Debug, Deserialize)]
struct RawAlias {
    parent: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    hidden: bool,
}

/// Collection info as found in icon sets and in `collections.json`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    license: Option<RawLicense>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLicense {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    spdx: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "requirements")]
    requirement: Option<String>,
}

impl RawInfo {
    fn into_collection(self, prefix: &str, parsed_count: usize) -> Collection {
        let license = match self.license {
            Some(raw) => License {
                title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
                spdx: raw.spdx,
                url: raw.url,
                requirement: raw.requirement,
            },
            None => License::unknown(),
        };

        Collection {
            prefix: prefix.to_string(),
            display_name: self.name.unwrap_or_else(|| prefix.to_string()),
            total_icons: self.total.unwrap_or(parsed_count),
            license,
            author: self.author,
            category: self.category,
        }
    }
}

/// Parse a `collections.json` document (prefix -> info) into collections
pub fn parse_collection_list(bytes: &[u8]) -> std::result::Result<BTreeMap<String, Collection>, IngestError> {
    let raw: BTreeMap<String, RawInfo> = serde_json::from_slice(bytes)?;
    Ok(raw
        .into_iter()
        .map(|(prefix, info)| {
            let collection = info.into_collection(&prefix, 0);
            (prefix, collection)
        })
        .collect())
}

pub(crate) fn valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// A validated collection with its icons
#[derive(Debug, Clone, Serialize)]
pub struct IconSet {
    collection: Collection,
    /// Canonical and alias records by name
    icons: BTreeMap<String, IconRecord>,
    /// Canonical name -> alias names pointing at it
    aliases: BTreeMap<String, Vec<String>>,
    /// Icon name -> category tags
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl IconSet {
    /// Validate an Iconify icon-set document
    ///
    /// Alias chains are flattened so every alias points directly at a
    /// canonical icon. Aliases that loop or end at a missing icon are dropped.
    pub fn from_json(bytes: &[u8], expected_prefix: Option<&str>) -> std::result::Result<Self, IngestError> {
        let raw: RawIconSet = serde_json::from_slice(bytes)?;

        if let Some(expected) = expected_prefix {
            if raw.prefix != expected {
                return Err(IngestError::PrefixMismatch {
                    expected: expected.to_string(),
                    found: raw.prefix,
                });
            }
        }
        if !valid_prefix(&raw.prefix) {
            return Err(IngestError::InvalidPrefix(raw.prefix));
        }
        if raw.icons.is_empty() {
            return Err(IngestError::Empty(raw.prefix));
        }

        let prefix = raw.prefix;
        let default_width = raw.width.unwrap_or(DEFAULT_VIEWBOX);
        let default_height = raw.height.or(raw.width).unwrap_or(DEFAULT_VIEWBOX);

        let mut icons: BTreeMap<String, IconRecord> = raw
            .icons
            .iter()
            .map(|(name, icon)| {
                let record = IconRecord {
                    prefix: prefix.clone(),
                    name: name.clone(),
                    body: icon.body.clone(),
                    width: icon.width.unwrap_or(default_width),
                    height: icon.height.unwrap_or(default_height),
                    alias_of: None,
                    hidden: icon.hidden,
                };
                (name.clone(), record)
            })
            .collect();

        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, alias) in &raw.aliases {
            if icons.contains_key(name) {
                log::warn!("{}: alias '{}' shadows an icon, ignoring alias", prefix, name);
                continue;
            }

            let Some(canonical) = flatten_alias(&raw.icons, &raw.aliases, &alias.parent) else {
                log::warn!("{}: alias '{}' -> '{}' does not reach an icon, dropping", prefix, name, alias.parent);
                continue;
            };

            let target = &raw.icons[&canonical];
            icons.insert(
                name.clone(),
                IconRecord {
                    prefix: prefix.clone(),
                    name: name.clone(),
                    body: target.body.clone(),
                    width: alias.width.or(target.width).unwrap_or(default_width),
                    height: alias.height.or(target.height).unwrap_or(default_height),
                    alias_of: Some(canonical.clone()),
                    hidden: alias.hidden,
                },
            );
            aliases.entry(canonical).or_default().push(name.clone());
        }

        let mut tags: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (category, names) in &raw.categories {
            for name in names {
                if icons.contains_key(name) {
                    tags.entry(name.clone()).or_default().insert(category.clone());
                }
            }
        }

        let canonical_count = icons.values().filter(|r| !r.is_alias()).count();
        let collection = match raw.info {
            Some(info) => info.into_collection(&prefix, canonical_count),
            None => RawInfo {
                name: None,
                total: None,
                author: None,
                license: None,
                category: None,
            }
            .into_collection(&prefix, canonical_count),
        };

        Ok(Self {
            collection,
            icons,
            aliases,
            tags,
        })
    }

    /// Assemble a set from records a host has already typed
    ///
    /// Unlike `from_json`, alias targets are not checked here; the resolver
    /// reports bad ones as broken aliases.
    pub fn from_parts(collection: Collection, records: impl IntoIterator<Item = IconRecord>) -> Self {
        let mut icons = BTreeMap::new();
        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records {
            if let Some(target) = &record.alias_of {
                aliases.entry(target.clone()).or_default().push(record.name.clone());
            }
            icons.insert(record.name.clone(), record);
        }

        Self {
            collection,
            icons,
            aliases,
            tags: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.collection.prefix
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Look up a canonical or alias record by name
    pub fn get(&self, name: &str) -> Option<&IconRecord> {
        self.icons.get(name)
    }

    /// All records (canonical and aliases), ordered by name
    pub fn records(&self) -> impl Iterator<Item = &IconRecord> {
        self.icons.values()
    }

    /// Canonical records ordered by name
    pub fn canonical(&self) -> impl Iterator<Item = &IconRecord> {
        self.icons.values().filter(|r| !r.is_alias())
    }

    /// Alias names that resolve to `canonical`
    pub fn aliases_of(&self, canonical: &str) -> &[String] {
        self.aliases.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Category tags of an icon
    pub fn tags_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(name)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// Fill fields the document left empty from catalogue metadata
    pub(crate) fn with_metadata(mut self, meta: &Collection) -> Self {
        if self.collection.display_name == self.collection.prefix {
            self.collection.display_name = meta.display_name.clone();
        }
        if self.collection.license.title == "Unknown" {
            self.collection.license = meta.license.clone();
        }
        if self.collection.author.is_none() {
            self.collection.author = meta.author.clone();
        }
        if self.collection.category.is_none() {
            self.collection.category = meta.category.clone();
        }
        self
    }
}

/// Follow alias parents until a real icon is reached
fn flatten_alias(
    icons: &BTreeMap<String, RawIcon>,
    aliases: &BTreeMap<String, RawAlias>,
    parent: &str,
) -> Option<String> {
    let mut current = parent;
    // Any chain longer than the alias table revisits a node
    for _ in 0..=aliases.len() {
        if icons.contains_key(current) {
            return Some(current.to_string());
        }
        current = &aliases.get(current)?.parent;
    }
    None
}

/// Immutable, versioned set of collections
#[derive(Debug)]
pub struct Corpus {
    root: Option<PathBuf>,
    version: String,
    sets: BTreeMap<String, Arc<IconSet>>,
    /// "prefix:name" -> externally supplied tags
    extra_tags: BTreeMap<String, BTreeSet<String>>,
    skipped: Vec<(String, String)>,
}

impl Corpus {
    /// Load the corpus from a data directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let sets_dir = root.join(ICON_SETS_DIR);
        log::info!("Loading icon corpus from {:?}", root);

        if !sets_dir.is_dir() {
            return Err(IconError::corpus(format!(
                "no icon sets directory at {}",
                sets_dir.display()
            )));
        }

        let version = compute_version(root)?;

        let metadata = match read_optional(&root.join(COLLECTIONS_JSON))? {
            Some(bytes) => parse_collection_list(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable {}: {}", COLLECTIONS_JSON, e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        let extra_tags: BTreeMap<String, BTreeSet<String>> = match read_optional(&root.join(TAGS_JSON))? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable {}: {}", TAGS_JSON, e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        let files = icon_set_files(&sets_dir)?;

        let parsed: Vec<(String, std::result::Result<IconSet, String>)> = files
            .par_iter()
            .map(|(prefix, path)| {
                let result = std::fs::read(path)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| IconSet::from_json(&bytes, Some(prefix)).map_err(|e| e.to_string()));
                (prefix.clone(), result)
            })
            .collect();

        let mut sets = BTreeMap::new();
        let mut skipped = Vec::new();
        for (prefix, result) in parsed {
            match result {
                Ok(set) => {
                    let set = match metadata.get(&prefix) {
                        Some(meta) => set.with_metadata(meta),
                        None => set,
                    };
                    log::debug!("Loaded icon set '{}' ({} records)", prefix, set.len());
                    sets.insert(prefix, Arc::new(set));
                }
                Err(reason) => {
                    log::warn!("Skipping icon set '{}': {}", prefix, reason);
                    skipped.push((prefix, reason));
                }
            }
        }

        log::info!(
            "Loaded corpus version {} with {} collections ({} skipped)",
            version,
            sets.len(),
            skipped.len()
        );

        Ok(Self {
            root: Some(root.to_path_buf()),
            version,
            sets,
            extra_tags,
            skipped,
        })
    }

    /// Build an in-memory corpus (used by hosts that ingest on their own)
    pub fn from_sets(
        sets: impl IntoIterator<Item = IconSet>,
        extra_tags: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let sets: BTreeMap<String, Arc<IconSet>> = sets
            .into_iter()
            .map(|set| (set.prefix().to_string(), Arc::new(set)))
            .collect();

        let mut hasher = blake3::Hasher::new();
        for (prefix, set) in &sets {
            hasher.update(prefix.as_bytes());
            // Serializing ordered maps is deterministic
            if let Ok(bytes) = serde_json::to_vec(set.as_ref()) {
                hasher.update(&bytes);
            }
        }
        for (id, tags) in &extra_tags {
            hasher.update(id.as_bytes());
            for tag in tags {
                hasher.update(tag.as_bytes());
            }
        }

        Self {
            root: None,
            version: short_hash(hasher),
            sets,
            extra_tags,
            skipped: Vec::new(),
        }
    }

    /// Content version; changes whenever any corpus file changes
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn get(&self, prefix: &str) -> Option<&Arc<IconSet>> {
        self.sets.get(prefix)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.sets.contains_key(prefix)
    }

    /// Icon sets ordered by prefix
    pub fn sets(&self) -> impl Iterator<Item = &Arc<IconSet>> {
        self.sets.values()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.sets.values().map(|s| s.collection().clone()).collect()
    }

    /// Category tags plus externally supplied tags for one icon
    pub fn tags_for(&self, prefix: &str, name: &str) -> BTreeSet<String> {
        let mut tags = self
            .get(prefix)
            .and_then(|set| set.tags_of(name))
            .cloned()
            .unwrap_or_default();
        if let Some(extra) = self.extra_tags.get(&format!("{}:{}", prefix, name)) {
            tags.extend(extra.iter().cloned());
        }
        tags
    }

    /// Icon sets that failed validation, with the reason
    pub fn skipped(&self) -> &[(String, String)] {
        &self.skipped
    }

    pub fn icon_count(&self) -> usize {
        self.sets.values().map(|s| s.canonical().count()).sum()
    }

    /// Validate a fetched icon-set document and write it into a corpus directory
    pub fn install_icon_set(root: impl AsRef<Path>, prefix: &str, bytes: &[u8]) -> Result<IconSet> {
        let set = IconSet::from_json(bytes, Some(prefix))
            .map_err(|e| IconError::corrupted(format!("{}.json: {}", prefix, e)))?;

        let dir = root.as_ref().join(ICON_SETS_DIR);
        std::fs::create_dir_all(&dir).map_err(IconError::corpus)?;

        let path = dir.join(format!("{}.json", prefix));
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(IconError::corpus)?;
        std::fs::rename(&tmp, &path).map_err(IconError::corpus)?;

        log::info!("Installed icon set '{}' into {:?}", prefix, dir);
        Ok(set)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IconError::corpus(format!("{}: {}", path.display(), e))),
    }
}

/// `(prefix, path)` for every `json/<prefix>.json`, ordered by prefix
fn icon_set_files(sets_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(sets_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(IconError::corpus)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(prefix) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((prefix.to_string(), path.to_path_buf()));
        }
    }
    Ok(files)
}

/// Hash every corpus file (path + content) in sorted order
fn compute_version(root: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();

    let mut paths: Vec<PathBuf> = Vec::new();
    for name in [COLLECTIONS_JSON, TAGS_JSON] {
        let path = root.join(name);
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.extend(icon_set_files(&root.join(ICON_SETS_DIR))?.into_iter().map(|(_, p)| p));
    paths.sort();

    for path in &paths {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let content = std::fs::read(path)
            .map_err(|e| IconError::corpus(format!("{}: {}", path.display(), e)))?;
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&content);
    }

    Ok(short_hash(hasher))
}

/// First 8 bytes of a blake3 digest as hex
fn short_hash(hasher: blake3::Hasher) -> String {
    hasher.finalize().as_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    const MDI: &str = r#"{
        "prefix": "mdi",
        "info": {
            "name": "Material Design Icons",
            "total": 3,
            "license": { "title": "Apache 2.0", "spdx": "Apache-2.0", "url": "https://example.com/license" }
        },
        "icons": {
            "home": { "body": "<path d=\"M10 20v-6h4v6\"/>" },
            "arrow-right": { "body": "<path d=\"M4 11v2h12\"/>", "width": 20 },
            "secret": { "body": "<path d=\"M1 1\"/>", "hidden": true }
        },
        "aliases": {
            "house": { "parent": "home" },
            "house-outline": { "parent": "house" },
            "loop-a": { "parent": "loop-b" },
            "loop-b": { "parent": "loop-a" },
            "dangling": { "parent": "missing" }
        },
        "categories": { "Navigation": ["arrow-right", "home"] },
        "width": 24,
        "height": 24
    }"#;

    #[test]
    fn test_from_json_basic() {
        let set = IconSet::from_json(MDI.as_bytes(), Some("mdi")).unwrap();
        assert_eq!(set.prefix(), "mdi");
        assert_eq!(set.collection().display_name, "Material Design Icons");
        assert_eq!(set.collection().license.title, "Apache 2.0");

        let home = set.get("home").unwrap();
        assert_eq!((home.width, home.height), (24, 24));
        assert!(!home.is_alias());

        let arrow = set.get("arrow-right").unwrap();
        assert_eq!((arrow.width, arrow.height), (20, 24));
        assert!(set.get("secret").unwrap().hidden);
    }

    #[test]
    fn test_alias_chains_flattened() {
        let set = IconSet::from_json(MDI.as_bytes(), None).unwrap();

        assert_eq!(set.get("house").unwrap().alias_of.as_deref(), Some("home"));
        // alias-of-alias points straight at the canonical icon
        assert_eq!(set.get("house-outline").unwrap().alias_of.as_deref(), Some("home"));
        assert_eq!(set.aliases_of("home"), &["house".to_string(), "house-outline".to_string()]);
    }

    #[test]
    fn test_cyclic_and_dangling_aliases_dropped() {
        let set = IconSet::from_json(MDI.as_bytes(), None).unwrap();
        assert!(set.get("loop-a").is_none());
        assert!(set.get("loop-b").is_none());
        assert!(set.get("dangling").is_none());
    }

    #[test]
    fn test_categories_become_tags() {
        let set = IconSet::from_json(MDI.as_bytes(), None).unwrap();
        assert!(set.tags_of("home").unwrap().contains("Navigation"));
        assert!(set.tags_of("secret").is_none());
    }

    #[test]
    fn test_prefix_mismatch_rejected() {
        let err = IconSet::from_json(MDI.as_bytes(), Some("lucide")).unwrap_err();
        assert!(matches!(err, IngestError::PrefixMismatch { .. }));
    }

    #[test]
    fn test_empty_and_invalid_rejected() {
        let empty = br#"{ "prefix": "x", "icons": {} }"#;
        assert!(matches!(IconSet::from_json(empty, None), Err(IngestError::Empty(_))));
        assert!(matches!(IconSet::from_json(b"not json", None), Err(IngestError::Json(_))));
        let bad_prefix = br#"{ "prefix": "Bad Prefix", "icons": { "a": { "body": "" } } }"#;
        assert!(matches!(IconSet::from_json(bad_prefix, None), Err(IngestError::InvalidPrefix(_))));
    }

    #[test]
    fn test_default_viewbox_is_16() {
        let doc = br#"{ "prefix": "tiny", "icons": { "dot": { "body": "<circle r=\"1\"/>" } } }"#;
        let set = IconSet::from_json(doc, None).unwrap();
        let dot = set.get("dot").unwrap();
        assert_eq!((dot.width, dot.height), (16, 16));
        assert_eq!(set.collection().license.title, "Unknown");
        assert_eq!(set.collection().total_icons, 1);
    }

    fn write_corpus(dir: &Path) {
        std::fs::create_dir_all(dir.join(ICON_SETS_DIR)).unwrap();
        std::fs::write(dir.join(ICON_SETS_DIR).join("mdi.json"), MDI).unwrap();
        std::fs::write(dir.join(ICON_SETS_DIR).join("broken.json"), "{ nope").unwrap();
        std::fs::write(dir.join(TAGS_JSON), r#"{ "mdi:home": ["dwelling"] }"#).unwrap();
    }

    #[test]
    fn test_open_corpus_dir() {
        let temp = TempDir::new().unwrap();
        write_corpus(temp.path());

        let corpus = Corpus::open(temp.path()).unwrap();
        assert!(corpus.contains("mdi"));
        assert!(!corpus.contains("broken"));
        assert_eq!(corpus.skipped().len(), 1);
        assert_eq!(corpus.version().len(), 16);

        let tags = corpus.tags_for("mdi", "home");
        assert!(tags.contains("dwelling"));
        assert!(tags.contains("Navigation"));
    }

    #[test]
    fn test_version_stable_and_content_sensitive() {
        let temp = TempDir::new().unwrap();
        write_corpus(temp.path());

        let v1 = Corpus::open(temp.path()).unwrap().version().to_string();
        let v2 = Corpus::open(temp.path()).unwrap().version().to_string();
        assert_eq!(v1, v2);

        std::fs::write(temp.path().join(TAGS_JSON), r#"{ "mdi:home": ["hut"] }"#).unwrap();
        let v3 = Corpus::open(temp.path()).unwrap().version().to_string();
        assert_ne!(v1, v3);
    }

    #[test]
    fn test_open_missing_dir_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let err = Corpus::open(temp.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorpusUnavailable);
    }

    #[test]
    fn test_install_icon_set() {
        let temp = TempDir::new().unwrap();
        let set = Corpus::install_icon_set(temp.path(), "mdi", MDI.as_bytes()).unwrap();
        assert_eq!(set.prefix(), "mdi");
        assert!(temp.path().join(ICON_SETS_DIR).join("mdi.json").exists());

        let err = Corpus::install_icon_set(temp.path(), "lucide", MDI.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheCorrupted);
    }

    #[test]
    fn test_collection_list_parsing() {
        let list = br#"{ "mdi": { "name": "Material", "total": 7000, "license": { "title": "Apache 2.0" } } }"#;
        let parsed = parse_collection_list(list).unwrap();
        assert_eq!(parsed["mdi"].display_name, "Material");
        assert_eq!(parsed["mdi"].total_icons, 7000);
    }
}
