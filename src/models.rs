//! Core data models for iconify-search
//!
//! These structures are the typed shapes every component works with once
//! icon JSON has crossed the ingestion boundary in `corpus`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IconError;

/// Default rendered size in pixels
pub const DEFAULT_SIZE: u32 = 24;

/// Separator between prefix and name in a full identifier
pub const ID_SEPARATOR: char = ':';

/// License metadata of a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct License {
    /// Human-readable license title (e.g. "Apache 2.0")
    pub title: String,
    /// SPDX identifier, when the source declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spdx: Option<String>,
    /// Link to the license text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Additional usage requirement (attribution notice etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
}

impl License {
    pub fn unknown() -> Self {
        Self {
            title: "Unknown".to_string(),
            ..Default::default()
        }
    }
}

/// Author of a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A named set of icons sharing a prefix and a license
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    /// Unique key of the collection
    pub prefix: String,
    /// Display name (e.g. "Material Design Icons")
    pub display_name: String,
    /// Number of icons the source declares (falls back to the parsed count)
    pub total_icons: usize,
    pub license: License,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One icon of a collection
///
/// Alias records carry the body of their canonical icon; `alias_of` names
/// that canonical icon within the same prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IconRecord {
    pub prefix: String,
    pub name: String,
    /// Raw SVG fragment placed inside the `<svg>` element
    pub body: String,
    /// viewBox width
    pub width: u32,
    /// viewBox height
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    /// Hidden icons stay resolvable but are not indexed
    #[serde(default)]
    pub hidden: bool,
}

impl IconRecord {
    pub fn id(&self) -> FullIdentifier {
        FullIdentifier::new(&self.prefix, &self.name)
    }

    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }
}

/// `prefix:name`, the global key of an icon
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FullIdentifier {
    prefix: String,
    name: String,
}

impl FullIdentifier {
    /// Compose an identifier from parts already known to be valid
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// Parse `prefix:name`
    ///
    /// Fails when the separator is missing, either side is empty, or the
    /// name contains a second separator.
    pub fn parse(input: &str) -> Result<Self, IconError> {
        let trimmed = input.trim();
        let malformed = || IconError::MalformedIdentifier(input.to_string());

        let (prefix, name) = trimmed.split_once(ID_SEPARATOR).ok_or_else(malformed)?;
        if prefix.is_empty() || name.is_empty() || name.contains(ID_SEPARATOR) {
            return Err(malformed());
        }
        if prefix.chars().any(char::is_whitespace) || name.chars().any(char::is_whitespace) {
            return Err(malformed());
        }

        Ok(Self::new(prefix, name))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FullIdentifier {
    fn rendered_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.prefix
            .bytes()
            .chain(std::iter::once(ID_SEPARATOR as u8))
            .chain(self.name.bytes())
    }
}

/// Lexical order of the rendered `prefix:name` string
impl Ord for FullIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rendered_bytes().cmp(other.rendered_bytes())
    }
}

impl PartialOrd for FullIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FullIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, ID_SEPARATOR, self.name)
    }
}

impl FromStr for FullIdentifier {
    type Err = IconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FullIdentifier {
    type Error = IconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FullIdentifier> for String {
    fn from(id: FullIdentifier) -> Self {
        id.to_string()
    }
}

/// Result of resolving an identifier
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedIcon {
    /// The identifier the caller asked for (may be an alias)
    pub requested: FullIdentifier,
    /// The canonical record after alias resolution
    pub record: IconRecord,
    /// Collection metadata of the record's prefix
    pub collection: Collection,
}

impl ResolvedIcon {
    pub fn via_alias(&self) -> bool {
        self.requested.name() != self.record.name
    }
}

/// Per-request rendering options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOptions {
    size: u32,
    color: Option<String>,
}

impl StyleOptions {
    /// Validate and construct style options
    ///
    /// `None` and `"currentColor"` both leave the icon inheriting the ambient
    /// color.
    pub fn new(size: u32, color: Option<&str>) -> Result<Self, IconError> {
        if size == 0 {
            return Err(IconError::InvalidStyle("size must be positive".to_string()));
        }

        let color = match color.map(str::trim) {
            None | Some("") => None,
            Some(c) if c.eq_ignore_ascii_case("currentColor") => None,
            Some(c) => {
                let allowed = |ch: char| ch.is_ascii_alphanumeric() || "#(),.% -".contains(ch);
                if !c.chars().all(allowed) {
                    return Err(IconError::InvalidStyle(format!("unsupported color '{}'", c)));
                }
                Some(c.to_string())
            }
        };

        Ok(Self { size, color })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            color: None,
        }
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: FullIdentifier,
    pub score: u32,
    /// License title of the icon's collection
    pub license: String,
}

/// Display attributes of an indexed identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconAttributes {
    pub prefix: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    /// License title of the collection
    pub license: String,
}

/// Statistics about the cache and current index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Key of the index artifact searches currently use
    pub index_key: Option<String>,
    /// Collections covered by that index
    pub total_collections: usize,
    /// Canonical icons covered by that index
    pub total_icons: usize,
    /// Distinct tokens in the index
    pub total_tokens: usize,
    /// Size of the cache directory contents (bytes)
    pub cache_size_bytes: u64,
    /// Cached remote resources
    pub cached_resources: usize,
    /// Last build timestamp (RFC 3339)
    pub last_built: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_identifiers_sort_as_rendered_strings() {
        let mut ids = vec![
            FullIdentifier::new("mdi", "home"),
            FullIdentifier::new("mdi-light", "home"),
            FullIdentifier::new("mdi", "account"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let mut expected = rendered.clone();
        expected.sort();
        assert_eq!(rendered, expected);
        assert_eq!(rendered[0], "mdi-light:home");
    }

    #[test]
    fn test_parse_identifier() {
        let id = FullIdentifier::parse("mdi:home").unwrap();
        assert_eq!(id.prefix(), "mdi");
        assert_eq!(id.name(), "home");
        assert_eq!(id.to_string(), "mdi:home");
    }

    #[test]
    fn test_parse_identifier_malformed() {
        for input in ["bogus", ":home", "mdi:", "", "mdi:home:extra", "md i:home"] {
            let err = FullIdentifier::parse(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedIdentifier, "input {:?}", input);
        }
    }

    #[test]
    fn test_identifier_ordering_is_lexical() {
        let mut ids = vec![
            FullIdentifier::new("mdi", "home"),
            FullIdentifier::new("lucide", "house"),
            FullIdentifier::new("lucide", "home"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["lucide:home", "lucide:house", "mdi:home"]);
    }

    #[test]
    fn test_style_defaults() {
        let style = StyleOptions::default();
        assert_eq!(style.size(), 24);
        assert_eq!(style.color(), None);
    }

    #[test]
    fn test_style_current_color_means_inherit() {
        let style = StyleOptions::new(32, Some("currentColor")).unwrap();
        assert_eq!(style.color(), None);
        assert_eq!(style.size(), 32);
    }

    #[test]
    fn test_style_rejects_zero_and_markup() {
        assert_eq!(StyleOptions::new(0, None).unwrap_err().kind(), ErrorKind::InvalidStyle);
        assert_eq!(
            StyleOptions::new(24, Some("red\"><script>")).unwrap_err().kind(),
            ErrorKind::InvalidStyle
        );
        assert!(StyleOptions::new(24, Some("rgb(255, 0, 0)")).is_ok());
        assert!(StyleOptions::new(24, Some("#ff0000")).is_ok());
    }
}
