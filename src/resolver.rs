//! Identifier resolution
//!
//! Maps `prefix:name` to a canonical icon record. Collection sources are
//! consulted in order; the bundled corpus comes first.

use std::sync::Arc;

use crate::corpus::{Corpus, IconSet};
use crate::error::{IconError, Result};
use crate::models::{FullIdentifier, ResolvedIcon};

/// Something that can provide whole icon sets by prefix
pub trait CollectionSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// The icon set for `prefix`, or `None` when this source does not know it
    fn icon_set(&self, prefix: &str) -> Result<Option<Arc<IconSet>>>;
}

impl CollectionSource for Corpus {
    fn name(&self) -> &str {
        "corpus"
    }

    fn icon_set(&self, prefix: &str) -> Result<Option<Arc<IconSet>>> {
        Ok(self.get(prefix).cloned())
    }
}

/// Resolves identifiers against layered collection sources
#[derive(Clone, Default)]
pub struct Resolver {
    sources: Vec<Arc<dyn CollectionSource>>,
}

impl Resolver {
    pub fn new(sources: Vec<Arc<dyn CollectionSource>>) -> Self {
        Self { sources }
    }

    /// First source that knows the prefix
    pub fn icon_set(&self, prefix: &str) -> Result<Option<Arc<IconSet>>> {
        for source in &self.sources {
            if let Some(set) = source.icon_set(prefix)? {
                log::trace!("Prefix '{}' served by {}", prefix, source.name());
                return Ok(Some(set));
            }
        }
        Ok(None)
    }

    /// Parse and resolve an identifier
    pub fn resolve(&self, identifier: &str) -> Result<ResolvedIcon> {
        let id = FullIdentifier::parse(identifier)?;
        self.resolve_id(&id)
    }

    /// Resolve a parsed identifier, following at most one alias hop
    pub fn resolve_id(&self, id: &FullIdentifier) -> Result<ResolvedIcon> {
        let set = self
            .icon_set(id.prefix())?
            .ok_or_else(|| IconError::UnknownPrefix(id.prefix().to_string()))?;

        let record = set
            .get(id.name())
            .ok_or_else(|| IconError::IconNotFound(id.to_string()))?;

        let canonical = match &record.alias_of {
            None => record,
            Some(target) => {
                let broken = || IconError::BrokenAlias {
                    alias: id.to_string(),
                    target: format!("{}:{}", id.prefix(), target),
                };
                let resolved = set.get(target).ok_or_else(broken)?;
                if resolved.is_alias() {
                    return Err(broken());
                }
                resolved
            }
        };

        Ok(ResolvedIcon {
            requested: id.clone(),
            record: canonical.clone(),
            collection: set.collection().clone(),
        })
    }
}
