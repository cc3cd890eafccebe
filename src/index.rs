//! Inverted index over icon metadata
//!
//! Maps normalized tokens to the identifiers of canonical icons, plus an
//! attribute table (prefix, name, alias target, license) for display.
//!
//! # Binary format
//!
//! ```text
//! magic "ICIX" | version u32 LE
//! schema_hash, key, corpus_version          (varint-length strings)
//! collections: count, then per collection   prefix, display_name, license, icon_count
//! entries:     count, then per entry        collection idx, name, alias flag [+ alias_of]
//! postings:    count, then per token        token, n, delta-encoded entry idxs
//! blake3 checksum of everything above       (32 bytes)
//! ```
//!
//! Entries are sorted by (prefix, name) and posting lists by entry index, so the
//! same corpus always produces byte-identical artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::corpus::{Corpus, IconSet};
use crate::error::{IconError, Result};
use crate::models::{FullIdentifier, IconAttributes, IconRecord};
use crate::tokenize::tokenize_all;

/// Hash of the sources that define this format, computed by build.rs
pub const INDEX_SCHEMA_HASH: &str = env!("INDEX_SCHEMA_HASH");

const MAGIC: &[u8; 4] = b"ICIX"; // ICon IndeX
const VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;

fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

/// Cursor over an artifact body; every read failure is corruption
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            IconError::corrupted(format!("index truncated at byte {}", self.pos))
        })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32_le(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn varint(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.bytes(1)?[0];
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 32 {
                return Err(IconError::corrupted("varint too large"));
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let len = self.varint()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| IconError::corrupted("invalid UTF-8 in index"))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Collection summary stored in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedCollection {
    pub prefix: String,
    pub display_name: String,
    /// License title
    pub license: String,
    /// Canonical icons of this collection present in the index
    pub icon_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexEntry {
    collection: u32,
    name: String,
    alias_of: Option<String>,
}

/// Tokens an icon is searchable by: name, alias names, tags, and prefix
pub fn record_tokens(corpus: &Corpus, set: &IconSet, record: &IconRecord) -> BTreeSet<String> {
    let tags = corpus.tags_for(&record.prefix, &record.name);
    let texts = std::iter::once(record.name.as_str())
        .chain(std::iter::once(record.prefix.as_str()))
        .chain(set.aliases_of(&record.name).iter().map(String::as_str))
        .chain(tags.iter().map(String::as_str));
    tokenize_all(texts)
}

struct PendingEntry {
    alias_of: Option<String>,
    tokens: BTreeSet<String>,
}

/// Accumulates collections, then freezes into an [`Index`]
#[derive(Default)]
pub struct IndexBuilder {
    collections: BTreeMap<String, IndexedCollection>,
    /// Keyed by `(prefix, name)` so entries group by collection in prefix order
    entries: BTreeMap<(String, String), PendingEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every visible canonical icon of a set
    ///
    /// Aliases get attribute rows but no postings, so a search never returns
    /// an icon twice.
    pub fn add_set(&mut self, corpus: &Corpus, set: &IconSet) {
        let prefix = set.prefix();
        let mut icon_count = 0u32;

        for record in set.canonical().filter(|r| !r.hidden) {
            let tokens = record_tokens(corpus, set, record);
            self.entries.insert(
                (prefix.to_string(), record.name.clone()),
                PendingEntry {
                    alias_of: None,
                    tokens,
                },
            );

            for alias in set.aliases_of(&record.name) {
                if set.get(alias).is_some_and(|a| a.hidden) {
                    continue;
                }
                self.entries.insert(
                    (prefix.to_string(), alias.clone()),
                    PendingEntry {
                        alias_of: Some(record.name.clone()),
                        tokens: BTreeSet::new(),
                    },
                );
            }
            icon_count += 1;
        }

        let collection = set.collection();
        self.collections.insert(
            prefix.to_string(),
            IndexedCollection {
                prefix: prefix.to_string(),
                display_name: collection.display_name.clone(),
                license: collection.license.title.clone(),
                icon_count,
            },
        );
    }

    /// Fold another builder's collections into this one
    pub fn merge(&mut self, other: IndexBuilder) {
        self.collections.extend(other.collections);
        self.entries.extend(other.entries);
    }

    pub fn finish(self, key: impl Into<String>, corpus_version: impl Into<String>) -> Index {
        let collections: Vec<IndexedCollection> = self.collections.into_values().collect();
        let collection_idx: BTreeMap<&str, u32> = collections
            .iter()
            .enumerate()
            .map(|(i, c)| (c.prefix.as_str(), i as u32))
            .collect();

        let mut entries = Vec::with_capacity(self.entries.len());
        let mut postings: BTreeMap<String, Vec<u32>> = BTreeMap::new();

        for (idx, ((prefix, name), pending)) in self.entries.into_iter().enumerate() {
            // Entries iterate in (prefix, name) order, so each list stays sorted
            for token in pending.tokens {
                postings.entry(token).or_default().push(idx as u32);
            }
            entries.push(IndexEntry {
                collection: collection_idx.get(prefix.as_str()).copied().unwrap_or_default(),
                name,
                alias_of: pending.alias_of,
            });
        }

        Index {
            key: key.into(),
            corpus_version: corpus_version.into(),
            collections,
            entries,
            postings: postings.into_iter().collect(),
        }
    }
}

/// Immutable, searchable index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    key: String,
    corpus_version: String,
    collections: Vec<IndexedCollection>,
    entries: Vec<IndexEntry>,
    /// Sorted by token
    postings: Vec<(String, Vec<u32>)>,
}

impl Index {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Version of the corpus this index was built from
    pub fn corpus_version(&self) -> &str {
        &self.corpus_version
    }

    pub fn collections(&self) -> &[IndexedCollection] {
        &self.collections
    }

    fn collection_position(&self, prefix: &str) -> Option<usize> {
        self.collections
            .binary_search_by(|c| c.prefix.as_str().cmp(prefix))
            .ok()
    }

    pub fn collection(&self, prefix: &str) -> Option<&IndexedCollection> {
        self.collection_position(prefix).map(|i| &self.collections[i])
    }

    /// Canonical icons in the index
    pub fn icon_count(&self) -> usize {
        self.entries.iter().filter(|e| e.alias_of.is_none()).count()
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    /// Entry indices matching a token, ascending
    pub fn postings(&self, token: &str) -> &[u32] {
        match self.postings.binary_search_by(|(t, _)| t.as_str().cmp(token)) {
            Ok(i) => &self.postings[i].1,
            Err(_) => &[],
        }
    }

    pub fn prefix_at(&self, idx: u32) -> Option<&str> {
        let entry = self.entries.get(idx as usize)?;
        self.collections
            .get(entry.collection as usize)
            .map(|c| c.prefix.as_str())
    }

    pub fn name_at(&self, idx: u32) -> Option<&str> {
        self.entries.get(idx as usize).map(|e| e.name.as_str())
    }

    pub fn id_at(&self, idx: u32) -> Option<FullIdentifier> {
        Some(FullIdentifier::new(self.prefix_at(idx)?, self.name_at(idx)?))
    }

    /// Display attributes for an indexed identifier (canonical or alias)
    pub fn attributes(&self, id: &FullIdentifier) -> Option<IconAttributes> {
        let collection = self.collection_position(id.prefix())? as u32;
        let idx = self
            .entries
            .binary_search_by(|e| (e.collection, e.name.as_str()).cmp(&(collection, id.name())))
            .ok()?;
        let entry = &self.entries[idx];

        Some(IconAttributes {
            prefix: id.prefix().to_string(),
            name: entry.name.clone(),
            alias_of: entry.alias_of.clone(),
            license: self.collections[collection as usize].license.clone(),
        })
    }

    /// Serialize to the binary artifact format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        write_str(&mut out, INDEX_SCHEMA_HASH);
        write_str(&mut out, &self.key);
        write_str(&mut out, &self.corpus_version);

        write_varint(&mut out, self.collections.len() as u32);
        for c in &self.collections {
            write_str(&mut out, &c.prefix);
            write_str(&mut out, &c.display_name);
            write_str(&mut out, &c.license);
            write_varint(&mut out, c.icon_count);
        }

        write_varint(&mut out, self.entries.len() as u32);
        for e in &self.entries {
            write_varint(&mut out, e.collection);
            write_str(&mut out, &e.name);
            match &e.alias_of {
                Some(target) => {
                    out.push(1);
                    write_str(&mut out, target);
                }
                None => out.push(0),
            }
        }

        write_varint(&mut out, self.postings.len() as u32);
        for (token, ids) in &self.postings {
            write_str(&mut out, token);
            write_varint(&mut out, ids.len() as u32);
            let mut prev = 0u32;
            for &id in ids {
                write_varint(&mut out, id - prev);
                prev = id;
            }
        }

        let checksum = blake3::hash(&out);
        out.extend_from_slice(checksum.as_bytes());
        out
    }

    /// Parse and validate an artifact
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + 4 + CHECKSUM_LEN {
            return Err(IconError::corrupted("index file too small"));
        }

        let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(IconError::corrupted("index checksum mismatch"));
        }

        let mut r = Reader::new(body);
        if r.bytes(4)? != MAGIC {
            return Err(IconError::corrupted("wrong magic bytes"));
        }
        let version = r.u32_le()?;
        if version != VERSION {
            return Err(IconError::corrupted(format!(
                "unsupported index version {} (expected {})",
                version, VERSION
            )));
        }
        let schema = r.string()?;
        if schema != INDEX_SCHEMA_HASH {
            return Err(IconError::corrupted(format!(
                "index schema {} does not match this build ({})",
                schema, INDEX_SCHEMA_HASH
            )));
        }

        let key = r.string()?;
        let corpus_version = r.string()?;

        let n = r.varint()? as usize;
        let mut collections = Vec::with_capacity(n.min(body.len()));
        for _ in 0..n {
            collections.push(IndexedCollection {
                prefix: r.string()?,
                display_name: r.string()?,
                license: r.string()?,
                icon_count: r.varint()?,
            });
        }

        let n = r.varint()? as usize;
        let mut entries = Vec::with_capacity(n.min(body.len()));
        for _ in 0..n {
            let collection = r.varint()?;
            if collection as usize >= collections.len() {
                return Err(IconError::corrupted("entry references unknown collection"));
            }
            let name = r.string()?;
            let alias_of = match r.bytes(1)?[0] {
                0 => None,
                1 => Some(r.string()?),
                _ => return Err(IconError::corrupted("invalid alias flag")),
            };
            entries.push(IndexEntry {
                collection,
                name,
                alias_of,
            });
        }

        let n = r.varint()? as usize;
        let mut postings = Vec::with_capacity(n.min(body.len()));
        for _ in 0..n {
            let token = r.string()?;
            let count = r.varint()? as usize;
            let mut ids = Vec::with_capacity(count.min(entries.len()));
            let mut prev = 0u32;
            for _ in 0..count {
                let id = prev
                    .checked_add(r.varint()?)
                    .filter(|&id| (id as usize) < entries.len())
                    .ok_or_else(|| IconError::corrupted("posting out of range"))?;
                ids.push(id);
                prev = id;
            }
            postings.push((token, ids));
        }

        if !r.is_empty() {
            return Err(IconError::corrupted("trailing bytes after postings"));
        }

        Ok(Self {
            key,
            corpus_version,
            collections,
            entries,
            postings,
        })
    }

    /// Write the artifact atomically (temp file + rename)
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(IconError::index_write)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(IconError::index_write(format!("{}: {}", path.display(), e)));
        }

        log::info!(
            "Wrote index {}: {} icons, {} tokens, {} bytes",
            self.key,
            self.icon_count(),
            self.token_count(),
            bytes.len()
        );
        Ok(())
    }

    /// Memory-map and validate an artifact
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IconError::corrupted(format!("{}: {}", path.display(), e)))?;

        // SAFETY: artifacts are only replaced by rename, never modified in place
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| IconError::corrupted(format!("failed to mmap {}: {}", path.display(), e)))?;

        let index = Self::from_bytes(&mmap)?;
        log::debug!(
            "Loaded index {} ({} icons, {} tokens)",
            index.key,
            index.icon_count(),
            index.token_count()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn corpus() -> Corpus {
        let lucide = IconSet::from_json(
            br#"{
                "prefix": "lucide",
                "info": { "name": "Lucide", "license": { "title": "ISC" } },
                "icons": {
                    "house": { "body": "<path d=\"M3 9l9-7\"/>" },
                    "arrow-right": { "body": "<path d=\"M5 12h14\"/>" },
                    "legacy": { "body": "<path/>", "hidden": true }
                },
                "aliases": { "home": { "parent": "house" } },
                "width": 24, "height": 24
            }"#,
            None,
        )
        .unwrap();
        let mdi = IconSet::from_json(
            br#"{
                "prefix": "mdi",
                "info": { "name": "Material Design Icons", "license": { "title": "Apache 2.0" } },
                "icons": { "home": { "body": "<path d=\"M10 20v-6\"/>" } },
                "categories": { "Buildings": ["home"] }
            }"#,
            None,
        )
        .unwrap();
        Corpus::from_sets([lucide, mdi], BTreeMap::new())
    }

    fn build(corpus: &Corpus) -> Index {
        let mut builder = IndexBuilder::new();
        for set in corpus.sets() {
            builder.add_set(corpus, set);
        }
        builder.finish("test", corpus.version())
    }

    fn ids(index: &Index, token: &str) -> Vec<String> {
        index
            .postings(token)
            .iter()
            .filter_map(|&i| index.id_at(i))
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn test_postings_sorted_by_identifier() {
        let index = build(&corpus());
        assert_eq!(ids(&index, "home"), vec!["lucide:house", "mdi:home"]);
    }

    #[test]
    fn test_attributes_found_across_overlapping_prefixes() {
        let light = IconSet::from_json(
            br#"{
                "prefix": "mdi-light",
                "info": { "name": "MDI Light", "license": { "title": "OFL" } },
                "icons": { "home": { "body": "<path/>" } }
            }"#,
            None,
        )
        .unwrap();
        let base = corpus();
        let sets: Vec<IconSet> = base.sets().map(|s| (**s).clone()).chain([light]).collect();
        let index = build(&Corpus::from_sets(sets, BTreeMap::new()));

        for (prefix, license) in [("mdi", "Apache 2.0"), ("mdi-light", "OFL"), ("lucide", "ISC")] {
            let id = FullIdentifier::new(prefix, if prefix == "lucide" { "house" } else { "home" });
            let attrs = index.attributes(&id).unwrap();
            assert_eq!(attrs.license, license, "{}", id);
        }
    }

    #[test]
    fn test_aliases_have_attributes_but_no_postings() {
        let index = build(&corpus());
        let attrs = index.attributes(&FullIdentifier::new("lucide", "home")).unwrap();
        assert_eq!(attrs.alias_of.as_deref(), Some("house"));
        assert_eq!(attrs.license, "ISC");
        // alias name is a token of the canonical icon only
        assert!(!ids(&index, "home").contains(&"lucide:home".to_string()));
    }

    #[test]
    fn test_hidden_icons_not_indexed() {
        let index = build(&corpus());
        assert!(index.postings("legacy").is_empty());
        assert!(index.attributes(&FullIdentifier::new("lucide", "legacy")).is_none());
        assert_eq!(index.collection("lucide").unwrap().icon_count, 2);
    }

    #[test]
    fn test_tags_and_prefix_are_tokens() {
        let index = build(&corpus());
        assert_eq!(ids(&index, "buildings"), vec!["mdi:home"]);
        assert_eq!(ids(&index, "lucide"), vec!["lucide:arrow-right", "lucide:house"]);
        assert_eq!(ids(&index, "arrow-right"), vec!["lucide:arrow-right"]);
    }

    #[test]
    fn test_binary_roundtrip_and_determinism() {
        let corpus = corpus();
        let index = build(&corpus);
        let bytes = index.to_bytes();
        assert_eq!(bytes, build(&corpus).to_bytes());
        assert_eq!(Index::from_bytes(&bytes).unwrap(), index);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = build(&corpus()).to_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = Index::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CacheCorrupted);
    }

    #[test]
    fn test_truncated_and_garbage_rejected() {
        let bytes = build(&corpus()).to_bytes();
        assert_eq!(
            Index::from_bytes(&bytes[..bytes.len() - 5]).unwrap_err().kind(),
            ErrorKind::CacheCorrupted
        );
        assert_eq!(Index::from_bytes(b"garbage").unwrap_err().kind(), ErrorKind::CacheCorrupted);
    }

    #[test]
    fn test_write_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index").join("test.idx");
        let index = build(&corpus());

        index.write(&path).unwrap();
        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.key(), "test");

        // no temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
