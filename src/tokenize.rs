//! Tokenizer shared by the index builder and the query engine
//!
//! Text is lowercased and split on every non-alphanumeric character. When a
//! string has more than one segment, the segments joined with `-` are added
//! as a compound token, so `arrow-right`, `arrow_right` and `arrow right` all
//! produce `{arrow, right, arrow-right}`.

use std::collections::BTreeSet;

/// Split text into lowercase alphanumeric segments, in order
pub fn segments(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokenize text into a deduplicated, sorted token set
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let segs = segments(text);
    let mut tokens: BTreeSet<String> = segs.iter().cloned().collect();
    if segs.len() > 1 {
        tokens.insert(segs.join("-"));
    }
    tokens
}

/// Tokenize several strings into one set
pub fn tokenize_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for text in texts {
        tokens.extend(tokenize(text));
    }
    tokens
}
