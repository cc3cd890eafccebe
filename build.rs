//! Build-time schema hash for index artifact invalidation
//!
//! Hashes the source files that define the on-disk index and cache formats.
//! The hash is exported as INDEX_SCHEMA_HASH and written into every index
//! artifact header; an artifact with a different hash is rebuilt on load.
//!
//! ## Format-critical files:
//! - src/index.rs: binary layout of index artifacts
//! - src/tokenize.rs: token normalization (changes what the postings mean)
//! - src/cache.rs: meta.db schema
//! - src/models.rs: shared record types

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const FORMAT_CRITICAL_FILES: &[&str] = &[
    "src/index.rs",
    "src/tokenize.rs",
    "src/cache.rs",
    "src/models.rs",
];

fn main() {
    let schema_hash = compute_schema_hash();

    println!("cargo:rustc-env=INDEX_SCHEMA_HASH={}", schema_hash);

    for file in FORMAT_CRITICAL_FILES {
        println!("cargo:rerun-if-changed={}", file);
    }
}

/// Hash path + content of each format-critical file in sorted order
fn compute_schema_hash() -> String {
    let mut hasher = blake3::Hasher::new();

    let files: BTreeSet<&str> = FORMAT_CRITICAL_FILES.iter().copied().collect();

    for file_path in &files {
        let path = Path::new(file_path);

        if !path.exists() {
            panic!("Format-critical file not found: {}", file_path);
        }

        let content = fs::read(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", file_path, e));

        hasher.update(file_path.as_bytes());
        hasher.update(&content);
    }

    hasher.finalize().as_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}
