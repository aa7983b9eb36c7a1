//! Subtitle provider abstraction.
//!
//! [`SubtitleProvider`] is the seam between the orchestrator and a concrete
//! remote service. The one shipped implementation is
//! [`SubsroProvider`](subsro::SubsroProvider); tests inject their own.

use async_trait::async_trait;

use crate::error::Result;
use crate::language::LanguageCode;
use crate::types::{SearchQuery, SubtitleCandidate};

pub mod subsro;

pub use subsro::SubsroProvider;

/// Async trait implemented by subtitle search/download backends.
///
/// Implementations are expected to be cheaply shareable behind an `Arc` so
/// the orchestrator can run per-language searches concurrently.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Short, lowercase identifier for this provider (e.g. `"subsro"`).
    fn name(&self) -> &'static str;

    /// Returns `true` when the provider has been configured with
    /// credentials and is ready to serve requests.
    fn is_available(&self) -> bool;

    /// Search for subtitles in a single language.
    ///
    /// Returns candidates in the provider's relevance order. Failures on
    /// one language must not poison searches for other languages; the
    /// orchestrator absorbs non-fatal errors as zero candidates.
    async fn search(
        &self,
        query: &SearchQuery,
        language: &LanguageCode,
    ) -> Result<Vec<SubtitleCandidate>>;

    /// Download the raw archive bytes for a candidate.
    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>>;
}
