//! The orchestrator tying the pipeline together.
//!
//! One [`SubtitleService::find_subtitles`] call runs: language partition →
//! per-language cache lookup → provider search → candidate selection →
//! download + extract for the top-ranked candidate → cache fill. Languages
//! are processed concurrently on a bounded pool; output order follows the
//! caller's language preference order, not completion order.
//!
//! Failure isolation: only configuration errors (invalid API key) abort the
//! call. A failing language contributes zero artifacts, a failing candidate
//! is skipped in favor of the next-ranked one, and a call that resolves
//! nothing returns an empty sequence rather than an error.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveBlob};
use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::language::{self, LanguageCode};
use crate::provider::{SubsroProvider, SubtitleProvider};
use crate::rank;
use crate::types::{CacheKey, SearchQuery, SubtitleArtifact};

/// How many ranked candidates to attempt per language before giving up.
/// A corrupt archive on the top candidate falls through to the next one.
const MAX_CANDIDATE_ATTEMPTS: usize = 3;

/// Subtitle acquisition service.
///
/// Owns an injected provider and cache; both are constructed at service
/// startup and torn down when the service is dropped at session end.
///
/// # Example
///
/// ```rust,ignore
/// let service = SubtitleService::from_config(&Config::with_api_key("key"))?;
/// let artifacts = service.find_subtitles(&query).await?;
/// ```
pub struct SubtitleService {
    provider: Arc<dyn SubtitleProvider>,
    cache: Arc<ArtifactCache>,
    preferred_language: Option<LanguageCode>,
    max_parallel_languages: usize,
}

impl SubtitleService {
    /// Build a service around the stock subs.ro provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider =
            SubsroProvider::with_base_url(config.api_key.clone(), config.base_url.clone())?;
        Ok(Self::new(Arc::new(provider), config))
    }

    /// Build a service around an explicit provider (tests inject fakes here).
    pub fn new(provider: Arc<dyn SubtitleProvider>, config: &Config) -> Self {
        let cache = Arc::new(ArtifactCache::new(
            config.cache.max_entries,
            config.cache_ttl(),
        ));
        let preferred_language = config.preferred_language.as_deref().and_then(|code| {
            let resolved = language::resolve(code);
            if resolved.is_none() {
                warn!(
                    error = %Error::UnsupportedLanguage { code: code.into() },
                    "ignoring configured preferred language"
                );
            }
            resolved
        });
        Self {
            provider,
            cache,
            preferred_language,
            max_parallel_languages: config.max_parallel_languages.clamp(1, 10),
        }
    }

    /// Shared handle to the service's cache.
    pub fn cache(&self) -> Arc<ArtifactCache> {
        Arc::clone(&self.cache)
    }

    /// Search, download, extract and cache subtitles for `query`.
    ///
    /// Returns artifacts ordered by the caller's language preference order,
    /// one per successfully resolved language. An empty vector means the
    /// provider had nothing usable; it is not an error.
    ///
    /// # Errors
    ///
    /// Only fatal configuration failures (missing or rejected API key)
    /// surface as errors, so the host UI can prompt for reconfiguration
    /// instead of silently showing "no results".
    pub async fn find_subtitles(&self, query: &SearchQuery) -> Result<Vec<SubtitleArtifact>> {
        self.find_subtitles_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Like [`find_subtitles`](Self::find_subtitles), aborting early when
    /// `cancel` fires. Artifacts already resolved at that point are
    /// returned rather than discarded.
    pub async fn find_subtitles_with_cancel(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubtitleArtifact>> {
        if !self.provider.is_available() {
            return Err(Error::configuration("subtitle provider not configured"));
        }

        let partition = language::partition(query.languages.iter().map(String::as_str));
        if !partition.unsupported.is_empty() {
            info!(
                unsupported = ?partition.unsupported,
                "dropped unsupported language codes from search"
            );
        }
        if partition.supported.is_empty() {
            debug!("no supported languages requested, nothing to do");
            return Ok(Vec::new());
        }

        let mut resolved = futures::stream::iter(
            partition
                .supported
                .into_iter()
                .map(|lang| self.resolve_language(query, lang)),
        )
        .buffered(self.max_parallel_languages);

        let mut artifacts = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(
                        resolved = artifacts.len(),
                        "subtitle search cancelled, returning partial results"
                    );
                    break;
                }
                next = resolved.next() => match next {
                    Some(Ok(Some(artifact))) => artifacts.push(artifact),
                    Some(Ok(None)) => {}
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
            }
        }

        info!(
            media = %query.media.canonical(),
            artifacts = artifacts.len(),
            "subtitle search complete"
        );
        Ok(artifacts)
    }

    /// Resolve one language to at most one artifact.
    ///
    /// Non-fatal provider and archive failures are absorbed here and
    /// logged; only fatal errors propagate.
    async fn resolve_language(
        &self,
        query: &SearchQuery,
        lang: LanguageCode,
    ) -> Result<Option<SubtitleArtifact>> {
        let key = CacheKey::for_query(query, &lang);
        let result = self
            .cache
            .get_or_fetch(&key, || self.search_and_extract(query, lang.clone()))
            .await;

        match result {
            Ok(hit) => Ok(hit.map(|arc| (*arc).clone())),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(language = %lang, error = %e, "language resolution failed");
                Ok(None)
            }
        }
    }

    /// The cache-miss path: search, rank, then walk candidates until one
    /// downloads and extracts cleanly.
    async fn search_and_extract(
        &self,
        query: &SearchQuery,
        lang: LanguageCode,
    ) -> Result<Option<SubtitleArtifact>> {
        let candidates = match self.provider.search(query, &lang).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(language = %lang, error = %e, "search failed, zero candidates");
                return Ok(None);
            }
        };

        let ranked = rank::select(candidates, query, self.preferred_language.as_ref());
        if ranked.is_empty() {
            debug!(language = %lang, "no candidates after filtering");
            return Ok(None);
        }

        for candidate in ranked.iter().take(MAX_CANDIDATE_ATTEMPTS) {
            let bytes = match self.provider.download(candidate).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        candidate = %candidate.id,
                        language = %lang,
                        error = %e,
                        "download failed, trying next candidate"
                    );
                    continue;
                }
            };

            let blob = ArchiveBlob {
                bytes,
                candidate,
                language: lang.clone(),
                release_name: query.release_name.as_deref(),
            };
            match archive::extract(blob) {
                Ok(artifact) => {
                    debug!(
                        candidate = %candidate.id,
                        language = %lang,
                        chars = artifact.text.len(),
                        "subtitle extracted"
                    );
                    return Ok(Some(artifact));
                }
                Err(e) => {
                    warn!(
                        candidate = %candidate.id,
                        language = %lang,
                        error = %e,
                        "extraction failed, trying next candidate"
                    );
                }
            }
        }

        debug!(language = %lang, "no candidate produced a usable subtitle");
        Ok(None)
    }
}
