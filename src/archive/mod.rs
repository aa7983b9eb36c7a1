//! Archive extraction: from downloaded bytes to decoded subtitle text.
//!
//! Providers serve subtitles wrapped in ZIP or RAR containers. The format
//! is classified by byte signature up front; anything else fails fast with
//! [`Error::UnsupportedArchive`] instead of attempting best-effort parsing.
//! Adding a container format means adding an [`ArchiveFormat`] variant and
//! a matching extraction branch.

use std::io::{Cursor, Read, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::language::LanguageCode;
use crate::types::{SubtitleArtifact, SubtitleCandidate};

pub mod encoding;

/// File extensions recognized as subtitle text, in preference order.
const SUBTITLE_EXTENSIONS: &[&str] = &[".srt", ".sub", ".ass", ".ssa", ".txt", ".smi"];

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
// Shared prefix of the RAR 4.x and 5.x signatures.
const RAR_SIGNATURE: &[u8] = b"Rar!\x1a\x07";

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

/// Supported container formats, detected by signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    /// Classify raw bytes by their leading signature.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_SIGNATURE) {
            Some(ArchiveFormat::Zip)
        } else if bytes.starts_with(RAR_SIGNATURE) {
            Some(ArchiveFormat::Rar)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw downloaded bytes plus the context needed to extract them.
///
/// Exists only for the duration of one extraction; discarded afterwards.
pub struct ArchiveBlob<'a> {
    /// The downloaded container bytes.
    pub bytes: Vec<u8>,
    /// Candidate the bytes were fetched for.
    pub candidate: &'a SubtitleCandidate,
    /// Language the artifact will be tagged with.
    pub language: LanguageCode,
    /// Release name of the local file, used to pick among multiple
    /// subtitle entries in one archive.
    pub release_name: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract and decode the subtitle carried by `blob`.
///
/// Fails with [`Error::UnsupportedArchive`] when the signature matches
/// neither supported container, [`Error::CorruptArchive`] when a recognized
/// container cannot be opened or holds no subtitle entry, and
/// [`Error::EncodingDetection`] when the entry's bytes defeat every decoder.
/// No scratch files survive any exit path.
pub fn extract(blob: ArchiveBlob<'_>) -> Result<SubtitleArtifact> {
    let format = ArchiveFormat::detect(&blob.bytes).ok_or(Error::UnsupportedArchive)?;
    debug!(
        format = ?format,
        candidate = %blob.candidate.id,
        bytes = blob.bytes.len(),
        "extracting subtitle archive"
    );

    let raw = match format {
        ArchiveFormat::Zip => read_zip_entry(&blob.bytes, blob.release_name)?,
        ArchiveFormat::Rar => read_rar_entry(&blob.bytes, blob.release_name)?,
    };

    let text = encoding::decode(&raw)?;
    let text = encoding::normalize_line_endings(&text);

    Ok(SubtitleArtifact {
        text,
        language: blob.language,
        candidate_id: blob.candidate.id.clone(),
        release: blob.candidate.release.clone(),
    })
}

/// Open a ZIP in memory and read the selected subtitle entry.
fn read_zip_entry(bytes: &[u8], release_name: Option<&str>) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::corrupt(format!("bad zip: {e}")))?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let target = select_entry(&names, release_name)
        .ok_or_else(|| Error::corrupt("no subtitle entry in zip archive"))?;

    let mut entry = archive
        .by_name(&target)
        .map_err(|e| Error::corrupt(format!("cannot open zip entry {target}: {e}")))?;
    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut raw)
        .map_err(|e| Error::corrupt(format!("cannot read zip entry {target}: {e}")))?;
    Ok(raw)
}

/// Read the selected subtitle entry from a RAR archive.
///
/// The RAR reader only operates on paths, so the bytes go through a named
/// temporary file; the `NamedTempFile` guard removes it on every exit path.
fn read_rar_entry(bytes: &[u8], release_name: Option<&str>) -> Result<Vec<u8>> {
    let mut scratch = tempfile::Builder::new()
        .prefix("subfetch-")
        .suffix(".rar")
        .tempfile()?;
    scratch.write_all(bytes)?;
    scratch.flush()?;

    let mut names = Vec::new();
    let mut archive = unrar::Archive::new(scratch.path())
        .open_for_processing()
        .map_err(|e| Error::corrupt(format!("bad rar: {e:?}")))?;

    // First locate the wanted entry name, collecting as we go; the reader
    // is forward-only, so read data on the matching entry directly.
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    loop {
        let header = match archive
            .read_header()
            .map_err(|e| Error::corrupt(format!("bad rar header: {e:?}")))?
        {
            Some(header) => header,
            None => break,
        };

        let name = header.entry().filename.to_string_lossy().into_owned();
        if header.entry().is_file() && has_subtitle_extension(&name) {
            names.push(name.clone());
            let (data, rest) = header
                .read()
                .map_err(|e| Error::corrupt(format!("cannot read rar entry {name}: {e:?}")))?;
            entries.push((name, data));
            archive = rest;
        } else {
            archive = header
                .skip()
                .map_err(|e| Error::corrupt(format!("cannot skip rar entry: {e:?}")))?;
        }
    }

    let target = select_entry(&names, release_name)
        .ok_or_else(|| Error::corrupt("no subtitle entry in rar archive"))?;
    entries
        .into_iter()
        .find(|(name, _)| *name == target)
        .map(|(_, data)| data)
        .ok_or_else(|| Error::corrupt("rar entry disappeared during read"))
}

// ---------------------------------------------------------------------------
// Entry selection
// ---------------------------------------------------------------------------

/// Pick the subtitle-bearing entry to extract.
///
/// Entries under `__MACOSX` and dotfiles are ignored. When several entries
/// qualify, the one whose name shares the most leading characters with the
/// requested release name wins; ties fall back to extension priority and
/// then archive order.
fn select_entry(names: &[String], release_name: Option<&str>) -> Option<String> {
    let mut candidates: Vec<(&String, usize, usize)> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let base = basename(name);
            !name.contains("__MACOSX") && !base.starts_with('.') && has_subtitle_extension(name)
        })
        .map(|(index, name)| (name, extension_priority(name), index))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    if let Some(release) = release_name.filter(|r| !r.is_empty()) {
        let release_lower = release.to_ascii_lowercase();
        if let Some(best) = candidates
            .iter()
            .max_by_key(|(name, _, _)| common_prefix_len(&basename(name).to_ascii_lowercase(), &release_lower))
            .filter(|(name, _, _)| {
                common_prefix_len(&basename(name).to_ascii_lowercase(), &release_lower) > 3
            })
        {
            return Some(best.0.clone());
        }
    }

    candidates.sort_by_key(|(_, priority, index)| (*priority, *index));
    candidates.first().map(|(name, _, _)| (*name).clone())
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn has_subtitle_extension(name: &str) -> bool {
    let lower = basename(name).to_ascii_lowercase();
    SUBTITLE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn extension_priority(name: &str) -> usize {
    let lower = basename(name).to_ascii_lowercase();
    SUBTITLE_EXTENSIONS
        .iter()
        .position(|ext| lower.ends_with(ext))
        .unwrap_or(usize::MAX)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn candidate() -> SubtitleCandidate {
        SubtitleCandidate {
            id: "42".into(),
            title: "Show".into(),
            release: "Show.S01E01".into(),
            language: LanguageCode::new("ro"),
            season: Some(1),
            episode: Some(1),
            downloads: None,
            rating: None,
            translator: None,
            year: None,
        }
    }

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn detect_by_signature() {
        assert_eq!(
            ArchiveFormat::detect(b"PK\x03\x04rest"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::detect(b"Rar!\x1a\x07\x00rest"),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(
            ArchiveFormat::detect(b"Rar!\x1a\x07\x01\x00rest"),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(ArchiveFormat::detect(b"1\n00:00:01,000"), None);
        assert_eq!(ArchiveFormat::detect(b""), None);
    }

    #[test]
    fn unknown_signature_fails_fast() {
        let c = candidate();
        let blob = ArchiveBlob {
            bytes: b"GIF89a not a subtitle container".to_vec(),
            candidate: &c,
            language: LanguageCode::new("ro"),
            release_name: None,
        };
        assert_matches!(extract(blob), Err(Error::UnsupportedArchive));
    }

    #[test]
    fn truncated_zip_is_corrupt() {
        let c = candidate();
        let blob = ArchiveBlob {
            bytes: b"PK\x03\x04truncated".to_vec(),
            candidate: &c,
            language: LanguageCode::new("ro"),
            release_name: None,
        };
        assert_matches!(extract(blob), Err(Error::CorruptArchive(_)));
    }

    #[test]
    fn zip_without_subtitle_entry_is_corrupt() {
        let bytes = zip_with(&[("readme.nfo", b"scene notes")]);
        let c = candidate();
        let blob = ArchiveBlob {
            bytes,
            candidate: &c,
            language: LanguageCode::new("ro"),
            release_name: None,
        };
        assert_matches!(extract(blob), Err(Error::CorruptArchive(_)));
    }

    #[test]
    fn zip_extraction_decodes_and_normalizes() {
        let srt = b"1\r\n00:00:01,000 --> 00:00:02,000\r\nSalut!\r\n";
        let bytes = zip_with(&[("Show.S01E01.srt", srt)]);
        let c = candidate();
        let blob = ArchiveBlob {
            bytes,
            candidate: &c,
            language: LanguageCode::new("ro"),
            release_name: None,
        };
        let artifact = extract(blob).unwrap();
        assert_eq!(artifact.text, "1\n00:00:01,000 --> 00:00:02,000\nSalut!\n");
        assert_eq!(artifact.candidate_id, "42");
        assert_eq!(artifact.language, LanguageCode::new("ro"));
    }

    #[test]
    fn entry_selection_prefers_release_name() {
        let names = vec![
            "Show.S01E01.1080p.BluRay.srt".to_string(),
            "Show.S01E01.720p.WEB-DL.srt".to_string(),
        ];
        let picked = select_entry(&names, Some("Show.S01E01.720p.WEB-DL")).unwrap();
        assert_eq!(picked, "Show.S01E01.720p.WEB-DL.srt");
    }

    #[test]
    fn entry_selection_falls_back_to_extension_priority() {
        let names = vec!["b.txt".to_string(), "a.srt".to_string()];
        assert_eq!(select_entry(&names, None).unwrap(), "a.srt");
    }

    #[test]
    fn entry_selection_skips_macos_junk_and_dotfiles() {
        let names = vec![
            "__MACOSX/._sub.srt".to_string(),
            ".hidden.srt".to_string(),
            "real.srt".to_string(),
        ];
        assert_eq!(select_entry(&names, None).unwrap(), "real.srt");
    }

    #[test]
    fn entry_selection_none_without_subtitles() {
        let names = vec!["readme.nfo".to_string(), "poster.jpg".to_string()];
        assert_eq!(select_entry(&names, None), None);
    }
}
