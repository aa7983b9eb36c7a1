//! subfetch - subtitle acquisition pipeline
//!
//! Searches, downloads, extracts and caches subtitles from the subs.ro
//! provider. The host runtime talks to one type:
//! [`SubtitleService`](service::SubtitleService) and its `find_subtitles`
//! call; everything else is plumbing behind it.

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod language;
pub mod provider;
pub mod rank;
pub mod service;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use service::SubtitleService;
pub use types::{MediaId, SearchQuery, SubtitleArtifact};
