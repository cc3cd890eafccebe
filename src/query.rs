//! Query engine for keyword search
//!
//! Queries are tokenized exactly like indexed metadata. Candidates are the
//! union of the query tokens' postings; each scores the number of distinct
//! query tokens it matched, plus a bonus when its name tokenizes to exactly
//! the query. Ties are broken by ascending identifier.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::corpus::Corpus;
use crate::error::{IconError, Result};
use crate::index::{Index, record_tokens};
use crate::models::{FullIdentifier, SearchHit};
use crate::tokenize::tokenize;

/// Query filter options
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Restrict results to these prefixes (None = all collections)
    pub prefixes: Option<BTreeSet<String>>,
    /// Maximum number of results; zero or negative means unlimited
    pub limit: i64,
}

impl QueryFilter {
    pub fn with_limit(limit: i64) -> Self {
        Self {
            prefixes: None,
            limit,
        }
    }

    fn allows(&self, prefix: &str) -> bool {
        self.prefixes.as_ref().is_none_or(|p| p.contains(prefix))
    }
}

fn score(matched: usize, exact: bool, query_len: usize) -> u32 {
    let bonus = if exact { query_len + 1 } else { 0 };
    (matched + bonus) as u32
}

/// Sort by score descending, identifier ascending, then apply the limit
fn rank(mut hits: Vec<SearchHit>, limit: i64) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    if limit > 0 {
        hits.truncate(limit as usize);
    }
    hits
}

/// Search a built index
pub fn search_index(index: &Index, query: &str, filter: &QueryFilter) -> Vec<SearchHit> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut matched: BTreeMap<u32, usize> = BTreeMap::new();
    for token in &tokens {
        for &idx in index.postings(token) {
            if index.prefix_at(idx).is_some_and(|p| filter.allows(p)) {
                *matched.entry(idx).or_default() += 1;
            }
        }
    }

    let hits = matched
        .into_iter()
        .filter_map(|(idx, count)| {
            let id = index.id_at(idx)?;
            let attributes = index.attributes(&id)?;
            let exact = tokenize(id.name()) == tokens;
            Some(SearchHit {
                id,
                score: score(count, exact, tokens.len()),
                license: attributes.license,
            })
        })
        .collect();

    rank(hits, filter.limit)
}

/// Search by scanning the corpus with the same tokenizer and scoring
pub fn scan_corpus(corpus: &Corpus, query: &str, filter: &QueryFilter) -> Vec<SearchHit> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for set in corpus.sets().filter(|s| filter.allows(s.prefix())) {
        for record in set.canonical().filter(|r| !r.hidden) {
            let record_tokens = record_tokens(corpus, set, record);
            let count = tokens.intersection(&record_tokens).count();
            if count == 0 {
                continue;
            }
            let exact = tokenize(&record.name) == tokens;
            hits.push(SearchHit {
                id: FullIdentifier::new(&record.prefix, &record.name),
                score: score(count, exact, tokens.len()),
                license: set.collection().license.title.clone(),
            });
        }
    }

    rank(hits, filter.limit)
}

/// Executes searches against the index, falling back to a corpus scan
pub struct QueryEngine {
    index: Option<Arc<Index>>,
    corpus: Option<Arc<Corpus>>,
    fallback_scan: bool,
}

impl QueryEngine {
    pub fn new(index: Option<Arc<Index>>, corpus: Option<Arc<Corpus>>, fallback_scan: bool) -> Self {
        Self {
            index,
            corpus,
            fallback_scan,
        }
    }

    /// Execute a query and return ranked hits
    pub fn search(&self, query: &str, filter: &QueryFilter) -> Result<Vec<SearchHit>> {
        log::info!("Executing query: '{}', filter={:?}", query, filter);

        if let Some(index) = &self.index {
            let hits = search_index(index, query, filter);
            log::debug!("Index {} returned {} hits", index.key(), hits.len());
            return Ok(hits);
        }

        match (&self.corpus, self.fallback_scan) {
            (Some(corpus), true) => {
                log::warn!("No search index available, scanning corpus");
                Ok(scan_corpus(corpus, query, filter))
            }
            _ => Err(IconError::IndexNotBuilt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::IconSet;
    use crate::error::ErrorKind;
    use crate::index::IndexBuilder;

    fn corpus() -> Corpus {
        let lucide = IconSet::from_json(
            br#"{
                "prefix": "lucide",
                "icons": {
                    "arrow-right": { "body": "<path/>" },
                    "arrow-right-circle": { "body": "<path/>" },
                    "arrow-left": { "body": "<path/>" },
                    "house": { "body": "<path/>" },
                    "old-house": { "body": "<path/>", "hidden": true }
                },
                "aliases": { "home": { "parent": "house" } }
            }"#,
            None,
        )
        .unwrap();
        let mdi = IconSet::from_json(
            br#"{
                "prefix": "mdi",
                "icons": {
                    "home": { "body": "<path/>" },
                    "home-outline": { "body": "<path/>" },
                    "arrow-right": { "body": "<path/>" }
                },
                "aliases": { "house": { "parent": "home" } }
            }"#,
            None,
        )
        .unwrap();
        Corpus::from_sets([lucide, mdi], BTreeMap::new())
    }

    fn index(corpus: &Corpus) -> Index {
        let mut builder = IndexBuilder::new();
        for set in corpus.sets() {
            builder.add_set(corpus, set);
        }
        builder.finish("test", corpus.version())
    }

    fn ids(hits: &[SearchHit]) -> Vec<String> {
        hits.iter().map(|h| h.id.to_string()).collect()
    }

    #[test]
    fn test_exact_name_ranks_first() {
        let corpus = corpus();
        let hits = search_index(&index(&corpus), "arrow right", &QueryFilter::default());

        assert_eq!(
            ids(&hits),
            vec![
                "lucide:arrow-right",
                "mdi:arrow-right",
                "lucide:arrow-right-circle",
                "lucide:arrow-left"
            ]
        );
        // 3 query tokens matched + bonus of 4
        assert_eq!(hits[0].score, 7);
        assert_eq!(hits[2].score, 2);
        assert_eq!(hits[3].score, 1);
    }

    #[test]
    fn test_ties_break_on_rendered_identifier() {
        let light = IconSet::from_json(
            br#"{ "prefix": "mdi-light", "icons": { "home": { "body": "<path/>" } } }"#,
            None,
        )
        .unwrap();
        let base = corpus();
        let sets: Vec<IconSet> = base.sets().map(|s| (**s).clone()).chain([light]).collect();
        let corpus = Corpus::from_sets(sets, BTreeMap::new());

        let hits = search_index(&index(&corpus), "home", &QueryFilter::with_limit(2));
        assert_eq!(ids(&hits), vec!["mdi-light:home", "mdi:home"]);
        assert_eq!(scan_corpus(&corpus, "home", &QueryFilter::with_limit(2)), hits);
    }

    #[test]
    fn test_hits_carry_collection_license() {
        let corpus = corpus();
        let hits = search_index(&index(&corpus), "home", &QueryFilter::default());
        assert!(!hits.is_empty());
        for hit in &hits {
            let set = corpus.get(hit.id.prefix()).unwrap();
            assert_eq!(hit.license, set.collection().license.title);
        }
        assert_eq!(scan_corpus(&corpus, "home", &QueryFilter::default()), hits);
    }

    #[test]
    fn test_results_deduplicated_across_aliases() {
        let corpus = corpus();
        let hits = search_index(&index(&corpus), "home", &QueryFilter::default());
        let listed = ids(&hits);

        assert_eq!(listed, vec!["mdi:home", "lucide:house", "mdi:home-outline"]);
        assert!(!listed.contains(&"lucide:home".to_string()));
    }

    #[test]
    fn test_prefix_filter_applied_before_limit() {
        let corpus = corpus();
        let filter = QueryFilter {
            prefixes: Some(BTreeSet::from(["mdi".to_string()])),
            limit: 1,
        };
        let hits = search_index(&index(&corpus), "arrow", &filter);
        assert_eq!(ids(&hits), vec!["mdi:arrow-right"]);
    }

    #[test]
    fn test_limit_zero_or_negative_is_unlimited() {
        let corpus = corpus();
        let index = index(&corpus);
        let all = search_index(&index, "arrow", &QueryFilter::with_limit(0));
        assert_eq!(all.len(), 4);
        assert_eq!(search_index(&index, "arrow", &QueryFilter::with_limit(-3)).len(), 4);
        assert_eq!(search_index(&index, "arrow", &QueryFilter::with_limit(2)).len(), 2);
    }

    #[test]
    fn test_no_match_is_empty() {
        let corpus = corpus();
        assert!(search_index(&index(&corpus), "zebra", &QueryFilter::default()).is_empty());
        assert!(search_index(&index(&corpus), "  --  ", &QueryFilter::default()).is_empty());
    }

    #[test]
    fn test_hidden_icons_not_searchable() {
        let corpus = corpus();
        let hits = search_index(&index(&corpus), "old", &QueryFilter::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_scan_matches_index() {
        let corpus = corpus();
        let index = index(&corpus);
        for query in ["arrow right", "home", "house", "lucide", "circle arrow"] {
            let filter = QueryFilter::default();
            assert_eq!(
                scan_corpus(&corpus, query, &filter),
                search_index(&index, query, &filter),
                "query {:?}",
                query
            );
        }
    }

    #[test]
    fn test_engine_without_index() {
        let corpus = Arc::new(corpus());

        let engine = QueryEngine::new(None, Some(Arc::clone(&corpus)), true);
        assert!(!engine.search("home", &QueryFilter::default()).unwrap().is_empty());

        let engine = QueryEngine::new(None, Some(corpus), false);
        let err = engine.search("home", &QueryFilter::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexNotBuilt);

        let engine = QueryEngine::new(None, None, true);
        assert_eq!(
            engine.search("home", &QueryFilter::default()).unwrap_err().kind(),
            ErrorKind::IndexNotBuilt
        );
    }
}
