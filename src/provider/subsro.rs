//! subs.ro REST API client.
//!
//! Implements [`SubtitleProvider`] against the subs.ro v1.0 API.
//!
//! Features:
//! - Token-bucket rate limiting at 4 requests / second via [`governor`].
//! - One retry with a short backoff on connect/timeout failures.
//! - 30-second request timeout.
//! - Authentication via the `X-Subs-Api-Key` header.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::language::LanguageCode;
use crate::provider::SubtitleProvider;
use crate::types::{SearchQuery, SubtitleCandidate};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.subs.ro/v1.0";
const USER_AGENT: &str = concat!("subfetch/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// subs.ro API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SubtitleResult>,
}

#[derive(Debug, Deserialize)]
struct SubtitleResult {
    #[serde(default)]
    id: serde_json::Value,
    title: Option<String>,
    release: Option<String>,
    language: Option<String>,
    season: Option<u32>,
    episode: Option<u32>,
    downloads: Option<u64>,
    ratings: Option<f64>,
    translator: Option<String>,
    year: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct QuotaStatus {
    /// Requests allowed per day.
    pub limit: Option<u64>,
    /// Requests left today.
    pub remaining: Option<u64>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// subs.ro subtitle provider.
///
/// Wraps the subs.ro v1.0 REST API with built-in rate limiting and a single
/// network-level retry.
///
/// # Examples
///
/// ```no_run
/// use subfetch::provider::SubsroProvider;
///
/// let provider = SubsroProvider::new("your-api-key".into()).unwrap();
/// ```
pub struct SubsroProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SubsroProvider {
    /// Create a provider talking to the production subs.ro API.
    ///
    /// Fails with a configuration error when `api_key` is empty; a missing
    /// key would otherwise surface as a misleading 401 on the first search.
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a provider with a custom API base URL (used by tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::configuration("subs.ro API key is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(NonZeroU32::new(4).unwrap());
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
        })
    }

    /// Execute a GET request with rate limiting and a single retry on
    /// transport failures. HTTP protocol errors are not retried; the
    /// provider does not distinguish "temporarily unavailable" from
    /// "unsupported" well enough to make a second attempt worthwhile.
    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut retried = false;
        loop {
            self.rate_limiter.until_ready().await;

            let result = self
                .client
                .get(url)
                .header("X-Subs-Api-Key", &self.api_key)
                .header("Accept", "application/json")
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) if (e.is_connect() || e.is_timeout()) && !retried => {
                    retried = true;
                    warn!(url = %url, error = %e, "transport error, retrying once");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
                Err(e) => return Err(Error::from(e)),
            };

            return self.check_status(resp);
        }
    }

    /// Map error statuses to the pipeline error taxonomy.
    fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        match status {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::configuration("invalid subs.ro API key"))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(Error::provider(
                Some(status.as_u16()),
                "daily quota exceeded",
            )),
            _ => Err(Error::provider(
                Some(status.as_u16()),
                format!("unexpected status for {}", resp.url()),
            )),
        }
    }

    /// Build a search URL for one (field, value, language) triple.
    fn search_url(&self, field: &str, value: &str, language: &LanguageCode) -> String {
        format!(
            "{}/search/{field}/{}?language={}",
            self.base_url,
            percent_encode(value),
            language
        )
    }

    /// Check the caller's remaining daily API quota.
    pub async fn check_quota(&self) -> Result<QuotaStatus> {
        let url = format!("{}/quota", self.base_url);
        debug!(url = %url, "subs.ro quota check");
        let quota = self
            .get(&url)
            .await?
            .json::<QuotaStatus>()
            .await
            .map_err(|e| Error::provider(None, format!("invalid quota response: {e}")))?;
        Ok(quota)
    }
}

/// Minimal percent-encoding for URL path segments.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

/// Convert a raw API result into a candidate, dropping records too
/// malformed to be actionable (no id).
fn to_candidate(raw: SubtitleResult, language: &LanguageCode) -> Option<SubtitleCandidate> {
    let id = match raw.id {
        serde_json::Value::String(s) if !s.is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(SubtitleCandidate {
        id,
        title: raw.title.unwrap_or_default(),
        release: raw.release.unwrap_or_default(),
        language: raw
            .language
            .map(LanguageCode::new)
            .unwrap_or_else(|| language.clone()),
        season: raw.season,
        episode: raw.episode,
        downloads: raw.downloads,
        rating: raw.ratings,
        translator: raw.translator.filter(|t| !t.is_empty()),
        year: raw.year,
    })
}

#[async_trait]
impl SubtitleProvider for SubsroProvider {
    fn name(&self) -> &'static str {
        "subsro"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search(
        &self,
        query: &SearchQuery,
        language: &LanguageCode,
    ) -> Result<Vec<SubtitleCandidate>> {
        let field = query.media.search_field();
        let value = query.media.search_value();
        let url = self.search_url(field, &value, language);
        debug!(url = %url, language = %language, "subs.ro search");

        let body: SearchResponse = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| Error::provider(None, format!("invalid search response: {e}")))?;

        let candidates: Vec<SubtitleCandidate> = body
            .results
            .into_iter()
            .filter_map(|raw| to_candidate(raw, language))
            .collect();

        info!(
            field = field,
            value = %value,
            language = %language,
            count = candidates.len(),
            "subs.ro search complete"
        );
        Ok(candidates)
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>> {
        let url = format!(
            "{}/subtitle/{}/download",
            self.base_url,
            percent_encode(&candidate.id)
        );
        debug!(url = %url, candidate = %candidate.id, "subs.ro download");

        let bytes = self.get(&url).await?.bytes().await.map_err(Error::from)?;

        if bytes.is_empty() {
            return Err(Error::provider(
                None,
                format!("empty download body for subtitle {}", candidate.id),
            ));
        }

        debug!(candidate = %candidate.id, bytes = bytes.len(), "archive downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaId;

    #[test]
    fn empty_api_key_is_configuration_error() {
        let err = SubsroProvider::new(String::new()).map(|_| ()).unwrap_err();
        assert!(err.is_fatal());

        let err = SubsroProvider::new("   ".into()).map(|_| ()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn provider_is_available() {
        let provider = SubsroProvider::new("test-key".into()).unwrap();
        assert!(provider.is_available());
        assert_eq!(provider.name(), "subsro");
    }

    #[test]
    fn search_url_encodes_value() {
        let provider = SubsroProvider::new("k".into()).unwrap();
        let url = provider.search_url("title", "The Matrix (1999)", &LanguageCode::new("ro"));
        assert_eq!(
            url,
            "https://api.subs.ro/v1.0/search/title/The%20Matrix%20%281999%29?language=ro"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider =
            SubsroProvider::with_base_url("k".into(), "http://localhost:9999/".into()).unwrap();
        let url = provider.search_url("imdbid", "tt1", &LanguageCode::new("en"));
        assert_eq!(url, "http://localhost:9999/search/imdbid/tt1?language=en");
    }

    #[test]
    fn candidate_from_numeric_and_string_ids() {
        let ro = LanguageCode::new("ro");

        let raw: SubtitleResult = serde_json::from_value(serde_json::json!({
            "id": 1234,
            "title": "Some Show",
            "release": "Some.Show.S01E01",
            "season": 1,
            "episode": 1
        }))
        .unwrap();
        let candidate = to_candidate(raw, &ro).unwrap();
        assert_eq!(candidate.id, "1234");
        assert_eq!(candidate.language, ro);

        let raw: SubtitleResult = serde_json::from_value(serde_json::json!({
            "id": "ab12",
            "language": "en"
        }))
        .unwrap();
        let candidate = to_candidate(raw, &ro).unwrap();
        assert_eq!(candidate.id, "ab12");
        assert_eq!(candidate.language, LanguageCode::new("en"));
    }

    #[test]
    fn candidate_without_id_is_dropped() {
        let ro = LanguageCode::new("ro");
        let raw: SubtitleResult =
            serde_json::from_value(serde_json::json!({ "id": null, "title": "x" })).unwrap();
        assert!(to_candidate(raw, &ro).is_none());
    }

    #[test]
    fn media_id_maps_to_search_fields() {
        let query = SearchQuery::new(MediaId::Tmdb(550), vec!["ro".into()]);
        assert_eq!(query.media.search_field(), "tmdbid");
        assert_eq!(query.media.search_value(), "550");
    }
}
