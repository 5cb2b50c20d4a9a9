//! Track library: filesystem scan and index cursor.
//!
//! Walks a media root once, keeps an ordered list of relative track paths,
//! and maintains the current-track cursor with wrap-around next/prev
//! arithmetic. A rescan is a fresh [`TrackList::scan`] swapped in by the
//! caller once it has been validated.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Extensions accepted by the scanner (case-insensitive).
const MEDIA_EXTENSIONS: [&str; 3] = ["mp3", "wav", "flac"];

/// Ordered, 0-indexed list of media files under a scan root.
///
/// Entries are stored relative to the root and sorted, so ordering is stable
/// across calls within one scan. The cursor invariant: `index < len()`
/// whenever the list is non-empty.
#[derive(Clone, Debug)]
pub struct TrackList {
    root: PathBuf,
    entries: Vec<PathBuf>,
    index: usize,
}

impl TrackList {
    /// Scan `root` recursively and build a sorted track list.
    ///
    /// Unreadable directories and files are skipped, not errors.
    pub fn scan(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("media root {}", root.display()))?;
        let mut entries = Vec::new();
        collect_media_files(&root, &root, &mut entries);
        entries.sort();
        tracing::info!(root = %root.display(), tracks = entries.len(), "library scanned");
        Ok(Self {
            root,
            entries,
            index: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Relative paths of all tracks, in scan order.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move the cursor to `index`. Out-of-range is an error and leaves the
    /// cursor unchanged.
    pub fn set_index(&mut self, index: usize) -> Result<()> {
        if index >= self.entries.len() {
            bail!(
                "track index {index} out of range (0..{})",
                self.entries.len()
            );
        }
        self.index = index;
        Ok(())
    }

    /// Index of the track after the current one, wrapping to 0 at the end.
    pub fn peek_next(&self) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        (self.index + 1) % self.entries.len()
    }

    /// Index of the track before the current one, wrapping to the last entry.
    pub fn peek_prev(&self) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        (self.index + self.entries.len() - 1) % self.entries.len()
    }

    /// Absolute path of the current track.
    pub fn current_path(&self) -> PathBuf {
        self.root.join(&self.entries[self.index])
    }

    /// Relative path of the current track.
    pub fn current_entry(&self) -> &Path {
        &self.entries[self.index]
    }
}

fn collect_media_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let reader = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "skipping unreadable directory: {e}");
            return;
        }
    };

    for entry in reader.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_media_files(root, &path, out);
        } else if file_type.is_file() && has_media_extension(&path) {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
}

fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap();
    }

    #[test]
    fn scan_filters_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "b.WAV");
        touch(dir.path(), "c.Flac");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "noext");

        let list = TrackList::scan(dir.path()).unwrap();
        assert_eq!(list.len(), 3);
        assert!(
            list.entries()
                .iter()
                .all(|entry| has_media_extension(entry))
        );
    }

    #[test]
    fn scan_recurses_and_keeps_relative_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "z.mp3");
        touch(dir.path(), "album/a.mp3");
        touch(dir.path(), "album/b.wav");

        let list = TrackList::scan(dir.path()).unwrap();
        let entries: Vec<_> = list
            .entries()
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            entries,
            vec![
                format!("album{}a.mp3", std::path::MAIN_SEPARATOR),
                format!("album{}b.wav", std::path::MAIN_SEPARATOR),
                "z.mp3".to_string()
            ]
        );
    }

    #[test]
    fn cursor_wraps_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "b.mp3");
        touch(dir.path(), "c.mp3");

        let mut list = TrackList::scan(dir.path()).unwrap();
        assert_eq!(list.index(), 0);
        assert_eq!(list.peek_prev(), 2);

        list.set_index(2).unwrap();
        assert_eq!(list.peek_next(), 0);
        assert_eq!(list.peek_prev(), 1);
    }

    #[test]
    fn set_index_rejects_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp3");

        let mut list = TrackList::scan(dir.path()).unwrap();
        assert!(list.set_index(1).is_err());
        assert_eq!(list.index(), 0);
    }

    #[test]
    fn fresh_scan_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "b.mp3");

        let list = TrackList::scan(dir.path()).unwrap();

        touch(dir.path(), "c.mp3");
        let fresh = TrackList::scan(list.root()).unwrap();
        assert_eq!(fresh.len(), 3);
        assert_eq!(fresh.index(), 0);
    }

    #[test]
    fn scan_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(TrackList::scan(&missing).is_err());
    }
}
