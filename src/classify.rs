//! Splits an item's raw file listing into downloadable audio candidates and
//! torrent descriptors.
//!
//! Classification is a pure function: identical inputs always produce the
//! same (ordered) output.

use crate::archive::RawFile;

/// Format tags accepted as direct audio downloads.
pub const AUDIO_FORMATS: [&str; 5] = ["VBR MP3", "MP3", "FLAC", "Ogg Vorbis", "WAVE"];

/// Extension marking an embedded torrent descriptor.
pub const TORRENT_EXTENSION: &str = ".torrent";

/// A directly downloadable audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCandidate {
    pub name: String,
    pub format: String,
    pub size: u64,
}

/// An embedded torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentDescriptor {
    pub name: String,
    pub size: u64,
}

/// Classification result.
#[derive(Debug, Default)]
pub struct Classified {
    /// Ordered audio candidates: compressed-lossy formats first, then by
    /// ascending size within each family.
    pub audio: Vec<AudioCandidate>,
    pub torrents: Vec<TorrentDescriptor>,
}

impl Classified {
    /// True when the item offers nothing downloadable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.torrents.is_empty()
    }
}

/// Splits `files` into audio candidates and torrent descriptors.
///
/// Audio candidates must carry an allow-listed format tag, be flagged as an
/// original source asset, and have a non-empty name. Torrent descriptors are
/// recognized by filename extension alone.
#[must_use]
pub fn classify(files: &[RawFile]) -> Classified {
    let mut audio: Vec<AudioCandidate> = files
        .iter()
        .filter(|file| {
            !file.name.is_empty()
                && file.is_original()
                && file
                    .format
                    .as_deref()
                    .is_some_and(|format| AUDIO_FORMATS.contains(&format))
        })
        .map(|file| AudioCandidate {
            name: file.name.clone(),
            format: file.format.clone().unwrap_or_default(),
            size: file.size,
        })
        .collect();

    // Stable, so listing order breaks ties deterministically.
    audio.sort_by_key(|candidate| (family_rank(&candidate.format), candidate.size));

    let torrents = files
        .iter()
        .filter(|file| file.name.ends_with(TORRENT_EXTENSION))
        .map(|file| TorrentDescriptor {
            name: file.name.clone(),
            size: file.size,
        })
        .collect();

    Classified { audio, torrents }
}

/// Compressed-lossy formats sort ahead of lossless and everything else.
fn family_rank(format: &str) -> u8 {
    u8::from(!format.contains("MP3"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw(name: &str, format: Option<&str>, size: u64, source: Option<&str>) -> RawFile {
        RawFile {
            name: name.to_string(),
            format: format.map(str::to_string),
            size,
            source: source.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_audio_and_torrent() {
        let files = [
            raw("song.mp3", Some("VBR MP3"), 3_000_000, Some("original")),
            raw("song.flac", Some("FLAC"), 20_000_000, Some("original")),
            raw("cover.torrent", Some("Archive BitTorrent"), 12_000, Some("metadata")),
        ];

        let classified = classify(&files);
        let names: Vec<&str> = classified.audio.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["song.mp3", "song.flac"]);
        assert_eq!(classified.torrents.len(), 1);
        assert_eq!(classified.torrents[0].name, "cover.torrent");
    }

    #[test]
    fn test_compressed_family_precedes_lossless_regardless_of_size() {
        let files = [
            raw("big.mp3", Some("MP3"), 50_000_000, Some("original")),
            raw("small.flac", Some("FLAC"), 1_000, Some("original")),
        ];
        let classified = classify(&files);
        let names: Vec<&str> = classified.audio.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["big.mp3", "small.flac"]);
    }

    #[test]
    fn test_size_orders_within_family() {
        let files = [
            raw("b.mp3", Some("VBR MP3"), 9, Some("original")),
            raw("a.mp3", Some("MP3"), 3, Some("original")),
            raw("c.wav", Some("WAVE"), 7, Some("original")),
            raw("d.ogg", Some("Ogg Vorbis"), 2, Some("original")),
        ];
        let classified = classify(&files);
        let names: Vec<&str> = classified.audio.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3", "d.ogg", "c.wav"]);
    }

    #[test]
    fn test_derivatives_and_unknown_formats_are_excluded() {
        let files = [
            raw("derived.mp3", Some("VBR MP3"), 10, Some("derivative")),
            raw("listing.xml", Some("Metadata"), 10, Some("original")),
            raw("", Some("FLAC"), 10, Some("original")),
        ];
        let classified = classify(&files);
        assert!(classified.audio.is_empty());
        assert!(classified.torrents.is_empty());
        assert!(classified.is_empty());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let files = [
            raw("x.mp3", Some("MP3"), 5, Some("original")),
            raw("y.mp3", Some("MP3"), 5, Some("original")),
        ];
        let first = classify(&files);
        let second = classify(&files);
        assert_eq!(first.audio, second.audio);
        // Stable sort keeps listing order for equal keys.
        assert_eq!(first.audio[0].name, "x.mp3");
    }
}
