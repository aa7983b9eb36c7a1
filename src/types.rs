//! Core data types shared across the pipeline.
//!
//! A [`SearchQuery`] goes in, a sequence of [`SubtitleArtifact`]s comes out.
//! [`SubtitleCandidate`]s live only for the duration of one orchestration
//! call; artifacts outlive it through the cache.

use serde::{Deserialize, Serialize};

use crate::language::LanguageCode;

// ---------------------------------------------------------------------------
// Media identity
// ---------------------------------------------------------------------------

/// How the media being searched for is identified.
///
/// Exactly one identity is present by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaId {
    /// IMDB identifier, e.g. `"tt1234567"`.
    Imdb(String),
    /// TMDB numeric identifier.
    Tmdb(u64),
    /// Free-text title or release name.
    Title(String),
}

impl MediaId {
    /// The subs.ro search field this identity maps to.
    pub fn search_field(&self) -> &'static str {
        match self {
            MediaId::Imdb(_) => "imdbid",
            MediaId::Tmdb(_) => "tmdbid",
            MediaId::Title(_) => "title",
        }
    }

    /// The raw value sent as the search term.
    pub fn search_value(&self) -> String {
        match self {
            MediaId::Imdb(id) => id.clone(),
            MediaId::Tmdb(id) => id.to_string(),
            MediaId::Title(title) => title.clone(),
        }
    }

    /// Canonical form used in cache keys, e.g. `"imdbid:tt1234567"`.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.search_field(), self.search_value())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A season/episode pair for episodic content.
///
/// Wrapping both numbers in one struct keeps the "both present or both
/// absent" invariant in the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeRef {
    /// Season number (1-based).
    pub season: u32,
    /// Episode number within the season (1-based).
    pub episode: u32,
}

/// One subtitle search request as issued by the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// What media to search for.
    pub media: MediaId,
    /// Season/episode constraint for TV content.
    pub episode: Option<EpisodeRef>,
    /// Requested language codes in the caller's preference order. May
    /// contain duplicates and codes the provider does not support; the
    /// language policy sorts that out.
    pub languages: Vec<String>,
    /// Release name of the local media file, used for ranking and for
    /// picking the best entry inside multi-file archives.
    pub release_name: Option<String>,
}

impl SearchQuery {
    /// Create a query with just a media identity and languages.
    pub fn new(media: MediaId, languages: Vec<String>) -> Self {
        Self {
            media,
            episode: None,
            languages,
            release_name: None,
        }
    }

    /// Constrain the query to a specific season and episode.
    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.episode = Some(EpisodeRef { season, episode });
        self
    }

    /// Attach the local file's release name.
    pub fn with_release_name(mut self, release: impl Into<String>) -> Self {
        self.release_name = Some(release.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Candidates and artifacts
// ---------------------------------------------------------------------------

/// Provider-returned metadata for one subtitle, not yet fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    /// Provider identifier, also the download reference.
    pub id: String,
    /// Feature title as recorded by the provider.
    pub title: String,
    /// Release name the subtitle was made for.
    pub release: String,
    /// Language of the subtitle text.
    pub language: LanguageCode,
    /// Season number, when the provider recorded one.
    pub season: Option<u32>,
    /// Episode number, when the provider recorded one.
    pub episode: Option<u32>,
    /// Download count, used as a relevance signal.
    pub downloads: Option<u64>,
    /// Community rating, used as a secondary relevance signal.
    pub rating: Option<f64>,
    /// Name of the translator, when recorded.
    pub translator: Option<String>,
    /// Release year of the feature.
    pub year: Option<u16>,
}

/// A fully resolved subtitle: decoded, UTF-8, `\n` line endings.
///
/// This is the unit returned to the caller and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleArtifact {
    /// The subtitle text.
    pub text: String,
    /// Language of the text.
    pub language: LanguageCode,
    /// Identifier of the candidate this artifact came from.
    pub candidate_id: String,
    /// Release name of the originating candidate.
    pub release: String,
}

// ---------------------------------------------------------------------------
// Cache key
// ---------------------------------------------------------------------------

/// The tuple identifying a cacheable result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Canonical media identity (`"imdbid:tt1234567"`).
    pub media: String,
    /// Season/episode, for episodic queries.
    pub episode: Option<EpisodeRef>,
    /// Resolved provider language code.
    pub language: LanguageCode,
}

impl CacheKey {
    /// Build the key for one (query, language) pair.
    pub fn for_query(query: &SearchQuery, language: &LanguageCode) -> Self {
        Self {
            media: query.media.canonical(),
            episode: query.episode,
            language: language.clone(),
        }
    }
}
