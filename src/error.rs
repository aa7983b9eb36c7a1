//! Unified error type for the subtitle pipeline.
//!
//! Every component funnels its failures into [`Error`]. Only
//! [`Error::Configuration`] is fatal to a whole `find_subtitles` call; all
//! other kinds are absorbed at the component boundary where they occur and
//! converted into fewer results, with a log record for operators.

/// Unified error type covering all failure modes in subfetch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pipeline is misconfigured (e.g. missing or invalid API key).
    /// This is the only error kind that aborts a whole search.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A requested language code is not supported by the provider.
    /// Recovered inside the language policy; never surfaced to callers.
    #[error("Unsupported language code: {code}")]
    UnsupportedLanguage {
        /// The code as the caller supplied it.
        code: String,
    },

    /// The provider rejected a request or returned an unusable response.
    /// Recovered per-language as zero candidates.
    #[error("Provider error{}: {}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default(), .message)]
    ProviderRequest {
        /// HTTP status code, when the failure came from a response.
        status: Option<u16>,
        /// Human-readable error description.
        message: String,
    },

    /// A network-level failure (connect, timeout). Retried once by the
    /// client, then recovered per-language as zero candidates.
    #[error("Network error: {source}")]
    Network {
        /// The underlying transport error.
        #[from]
        source: reqwest::Error,
    },

    /// Downloaded bytes match neither supported container signature.
    #[error("Unsupported archive format")]
    UnsupportedArchive,

    /// The container was recognized but could not be opened or read.
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// No decoder in the priority list produced plausible text.
    #[error("Could not detect subtitle text encoding")]
    EncodingDetection,

    /// An I/O operation failed (RAR scratch file handling).
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` when this error must abort the whole pipeline call
    /// instead of being absorbed as "fewer results".
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Convenience constructor for [`Error::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Convenience constructor for [`Error::ProviderRequest`].
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::ProviderRequest {
            status,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::CorruptArchive`].
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::CorruptArchive(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
