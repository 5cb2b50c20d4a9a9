//! Tag extraction for track display.
//!
//! Failures never propagate toward the audio path; every error collapses to
//! defaults (file-stem title, empty producer, no artwork).

use std::ffi::OsStr;
use std::path::Path;

use lofty::{Accessor, ItemKey, TaggedFileExt, read_from_path};

/// Display metadata for one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackTags {
    pub title: String,
    pub producer: String,
    /// Raw bytes of the first embedded picture, empty when absent.
    pub artwork: Vec<u8>,
}

/// Read display tags for `path`, falling back to defaults on any failure.
///
/// Producer priority: explicit producer tag, then artist, then album artist.
pub fn read_tags(path: &Path) -> TrackTags {
    let fallback_title = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string();

    let tagged = match read_from_path(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!(path = %path.display(), "tag read failed: {e}");
            return TrackTags {
                title: fallback_title,
                ..TrackTags::default()
            };
        }
    };

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return TrackTags {
            title: fallback_title,
            ..TrackTags::default()
        };
    };

    let title = tag
        .title()
        .map(|t| t.to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title);

    let producer = tag
        .get_string(&ItemKey::Producer)
        .map(str::to_string)
        .or_else(|| tag.artist().map(|a| a.to_string()))
        .or_else(|| tag.get_string(&ItemKey::AlbumArtist).map(str::to_string))
        .filter(|p| !p.is_empty())
        .unwrap_or_default();

    let artwork = tag
        .pictures()
        .first()
        .map(|p| p.data().to_vec())
        .unwrap_or_default();

    TrackTags {
        title,
        producer,
        artwork,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_stem() {
        let tags = read_tags(Path::new("/nonexistent/dir/My Song.mp3"));
        assert_eq!(tags.title, "My Song");
        assert!(tags.producer.is_empty());
        assert!(tags.artwork.is_empty());
    }

    #[test]
    fn unparseable_file_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp3");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"this is not an mp3").unwrap();

        let tags = read_tags(&path);
        assert_eq!(tags.title, "garbage");
        assert!(tags.artwork.is_empty());
    }
}
