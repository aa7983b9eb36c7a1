//! Candidate filtering and ranking.
//!
//! For episodic queries a candidate survives only with positive evidence
//! that it covers the requested season/episode: either the provider's
//! season/episode fields match exactly, or (when those fields are absent)
//! the release name carries an unambiguous `S02E05` / `2x05` marker.
//! Candidates with neither are excluded, never guessed at.
//!
//! Ranking is a stable sort, so ties keep the provider's original order:
//! 1. exact release-name match against the query's release name,
//! 2. language equal to the user's preferred language,
//! 3. provider relevance (downloads, then rating), descending.

use std::cmp::Reverse;
use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::language::LanguageCode;
use crate::types::{EpisodeRef, SearchQuery, SubtitleCandidate};

/// Filter and rank candidates for one query.
///
/// Returns at most one candidate per (id, language) pair; providers
/// occasionally list the same upload under several languages and only one
/// copy should reach extraction.
pub fn select(
    candidates: Vec<SubtitleCandidate>,
    query: &SearchQuery,
    preferred_language: Option<&LanguageCode>,
) -> Vec<SubtitleCandidate> {
    let before = candidates.len();

    let mut seen: HashSet<(String, LanguageCode)> = HashSet::new();
    let mut selected: Vec<SubtitleCandidate> = candidates
        .into_iter()
        .filter(|c| match query.episode {
            Some(episode) => matches_episode(c, episode),
            None => true,
        })
        .filter(|c| seen.insert((c.id.clone(), c.language.clone())))
        .collect();

    selected.sort_by_key(|c| {
        (
            Reverse(exact_release_match(c, query)),
            Reverse(preferred_language.is_some_and(|lang| c.language == *lang)),
            Reverse(c.downloads.unwrap_or(0)),
            Reverse(relevance_millis(c)),
        )
    });

    debug!(
        before = before,
        after = selected.len(),
        episodic = query.episode.is_some(),
        "candidate selection complete"
    );
    selected
}

/// Episode evidence check for episodic queries.
fn matches_episode(candidate: &SubtitleCandidate, wanted: EpisodeRef) -> bool {
    match (candidate.season, candidate.episode) {
        (Some(season), Some(episode)) => {
            season == wanted.season && episode == wanted.episode
        }
        // Partial metadata is as untrustworthy as a mismatch.
        (Some(_), None) | (None, Some(_)) => false,
        (None, None) => release_names_episode(&candidate.release, wanted)
            || release_names_episode(&candidate.title, wanted),
    }
}

/// Whether `text` carries an explicit `SxxEyy` or `NxNN` marker for the
/// wanted episode.
fn release_names_episode(text: &str, wanted: EpisodeRef) -> bool {
    if text.is_empty() {
        return false;
    }
    let pattern = format!(
        r"(?i)s0*{s}e0*{e}\b|\b{s}x0*{e}\b",
        s = wanted.season,
        e = wanted.episode
    );
    // The pattern is built from two integers; it always compiles.
    Regex::new(&pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

fn exact_release_match(candidate: &SubtitleCandidate, query: &SearchQuery) -> bool {
    match query.release_name.as_deref() {
        Some(wanted) if !wanted.is_empty() => {
            candidate.release.eq_ignore_ascii_case(wanted)
        }
        _ => false,
    }
}

/// Rating folded to an integer so it can participate in the sort key.
fn relevance_millis(candidate: &SubtitleCandidate) -> u64 {
    (candidate.rating.unwrap_or(0.0).max(0.0) * 1000.0) as u64
}
