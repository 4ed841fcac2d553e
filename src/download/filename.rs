//! Local filename sanitization for downloads.

/// Maps a remote filename onto a safe local one.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced with `_`; runs of
/// replacements collapse to a single `_` and leading/trailing `_` are
/// trimmed. The mapping is deterministic: identical inputs always produce
/// identical outputs. Distinct inputs can in principle collide; the dedup
/// store keys on the remote name, so a collision overwrites a local file but
/// never corrupts the store.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(sanitize_filename("track01.mp3"), "track01.mp3");
        assert_eq!(sanitize_filename("gd77-05-08d1t01.flac"), "gd77-05-08d1t01.flac");
    }

    #[test]
    fn test_spaces_and_specials_become_underscores() {
        assert_eq!(sanitize_filename("track 01 (live).mp3"), "track_01_live_.mp3");
        assert_eq!(sanitize_filename("a/b\\c:d.mp3"), "a_b_c_d.mp3");
    }

    #[test]
    fn test_runs_collapse_and_edges_trim() {
        assert_eq!(sanitize_filename("  ??weird??  .mp3"), "weird_.mp3");
        assert_eq!(sanitize_filename("___"), "download");
        assert_eq!(sanitize_filename(""), "download");
    }

    #[test]
    fn test_sanitization_is_deterministic() {
        let name = "Сюита № 1 in G.flac";
        assert_eq!(sanitize_filename(name), sanitize_filename(name));
    }

    #[test]
    fn test_path_separators_cannot_escape_the_download_dir() {
        let sanitized = sanitize_filename("../../etc/passwd");
        assert!(!sanitized.contains('/'));
        assert_eq!(sanitized, ".._.._etc_passwd");
    }
}
