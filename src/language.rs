//! Language policy: validation and normalization of requested language codes.
//!
//! The provider accepts a fixed set of language codes and returns a hard
//! protocol error when it is sent anything else. The policy therefore
//! partitions a requested set into supported and unsupported codes up front,
//! so an unknown code costs one log line instead of the whole search.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Language codes the subs.ro API accepts.
const SUPPORTED_CODES: &[&str] = &[
    "ro", "en", "ita", "fra", "ger", "ung", "gre", "por", "spa", "alt",
];

/// ISO 639-1 codes (as supplied by host runtimes) mapped to provider codes.
const ISO_TO_PROVIDER: &[(&str, &str)] = &[
    ("ro", "ro"),
    ("en", "en"),
    ("it", "ita"),
    ("fr", "fra"),
    ("de", "ger"),
    ("hu", "ung"),
    ("el", "gre"),
    ("pt", "por"),
    ("pt-br", "por"),
    ("pt-pt", "por"),
    ("pb", "por"),
    ("es", "spa"),
    ("zh-cn", "alt"),
    ("zh-tw", "alt"),
];

/// A normalized provider language code.
///
/// Values are only ever constructed from the supported set (via
/// [`partition`]) or taken verbatim from provider responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Wrap a provider code without validation. Intended for codes that
    /// came back from the provider itself.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The provider-side code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of partitioning a requested language set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguagePartition {
    /// Provider codes to search for, deduplicated, in request order.
    pub supported: Vec<LanguageCode>,
    /// Requested codes the provider cannot serve, in request order.
    pub unsupported: Vec<String>,
}

/// Map one requested code to a provider code, if the provider supports it.
///
/// Accepts both ISO 639-1 codes (`"de"`) and native provider codes
/// (`"ger"`), case-insensitively.
pub fn resolve(code: &str) -> Option<LanguageCode> {
    let normalized = code.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    if SUPPORTED_CODES.contains(&normalized.as_str()) {
        return Some(LanguageCode(normalized));
    }
    ISO_TO_PROVIDER
        .iter()
        .find(|(iso, _)| *iso == normalized)
        .map(|(_, provider)| LanguageCode((*provider).to_string()))
}

/// Partition requested codes into supported and unsupported sets.
///
/// Never fails: unknown codes land in `unsupported` and are logged, they do
/// not abort the search for the remaining codes. Duplicate requests (either
/// literal or via aliases like `"pt"` and `"pt-br"`) collapse to one entry,
/// keeping the first occurrence's position.
pub fn partition<'a>(requested: impl IntoIterator<Item = &'a str>) -> LanguagePartition {
    let mut out = LanguagePartition::default();
    for code in requested {
        match resolve(code) {
            Some(lang) => {
                if !out.supported.contains(&lang) {
                    out.supported.push(lang);
                }
            }
            None => {
                warn!(code = code, "dropping unsupported language code");
                if !out.unsupported.iter().any(|c| c == code) {
                    out.unsupported.push(code.to_string());
                }
            }
        }
    }
    out
}
