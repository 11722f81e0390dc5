//! Playlist model (spec §3, §4.C).
//!
//! Grounded on mpdhaj's `playlist.rs` for the line-based load/save
//! format, generalized with the cursor/repeat/shuffle/deck semantics
//! from spec §4.C, and `original_source/.../playlist/playlist.c` for
//! the natural-sort and advance-on-`next` behavior.

use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use itertools::Itertools;

use crate::deck::Deck;
use crate::error::{ClimpError, Result};
use crate::media::Media;

/// `index` is `None` when nothing is current (spec: `NONE` cursor).
pub struct Playlist {
    items: Vec<Media>,
    index: Option<usize>,
    repeat: bool,
    shuffle: bool,
    deck: Deck,
}

impl Playlist {
    pub fn new() -> Self {
        Playlist {
            items: Vec::new(),
            index: None,
            repeat: false,
            shuffle: false,
            deck: Deck::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&Media> {
        self.index.and_then(|i| self.items.get(i))
    }

    /// Moves the cursor to `i` directly (used by `play_track`), without
    /// consulting the shuffle deck.
    pub fn set_current(&mut self, i: isize) -> Result<()> {
        let idx = self
            .resolve_index(i)
            .filter(|idx| *idx < self.items.len())
            .ok_or(ClimpError::SeekRange)?;
        self.index = Some(idx);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Media> {
        self.items.iter()
    }

    /// Negative `i` counts from the back, matching spec §4.C.
    pub fn at(&self, i: isize) -> Option<&Media> {
        let idx = self.resolve_index(i)?;
        self.items.get(idx)
    }

    fn resolve_index(&self, i: isize) -> Option<usize> {
        if i >= 0 {
            Some(i as usize)
        } else {
            let from_back = (-i) as usize;
            self.items.len().checked_sub(from_back)
        }
    }

    pub fn take(&mut self, i: isize) -> Option<Media> {
        let idx = self.resolve_index(i)?;
        if idx >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(idx);
        self.deck.remove(1);
        if let Some(cur) = self.index {
            if idx < cur {
                self.index = Some(cur - 1);
            } else if idx == cur {
                self.index = None;
            }
        }
        Some(removed)
    }

    pub fn insert_back(&mut self, media: Media) {
        self.items.push(media);
        self.deck.add(1);
    }

    pub fn emplace_back(&mut self, arg: &str) -> Result<()> {
        self.insert_back(Media::from_arg(arg)?);
        Ok(())
    }

    pub fn add_list(&mut self, list: impl IntoIterator<Item = Media>) {
        for m in list {
            self.insert_back(m);
        }
    }

    pub fn remove_media_list(&mut self, to_remove: &[Media]) {
        for m in to_remove {
            if let Some(pos) = self.items.iter().position(|x| x == m) {
                self.take(pos as isize);
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index = None;
        self.deck = Deck::new(0);
    }

    pub fn index_of(&self, media: &Media) -> Option<usize> {
        self.items.iter().position(|m| m == media)
    }

    pub fn index_of_path(&self, path: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|m| m.path().is_some_and(|p| p.as_str() == path))
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn set_repeat(&mut self, value: bool) {
        self.repeat = value;
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn set_shuffle(&mut self, value: bool) {
        self.shuffle = value;
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        self.shuffle
    }

    /// Advance semantics from spec §4.C: shuffle mode draws from the
    /// deck, resetting it at a completed cycle (the spec's resolution
    /// of the "shuffle-with-repeat" ambiguity — see DESIGN.md); plain
    /// mode increments the cursor and wraps or stops depending on
    /// `repeat`.
    pub fn next(&mut self) -> Option<&Media> {
        if self.items.is_empty() {
            self.index = None;
            return None;
        }

        if self.shuffle {
            if self.deck.cycle_done() {
                if !self.repeat {
                    self.deck.reset();
                    self.index = None;
                    return None;
                }
                self.deck.reset();
            }
            let idx = self.deck.draw();
            self.index = Some(idx);
        } else {
            let next_idx = match self.index {
                Some(i) => i + 1,
                None => 0,
            };
            if next_idx >= self.items.len() {
                if self.repeat {
                    self.index = Some(0);
                } else {
                    self.index = None;
                    return None;
                }
            } else {
                self.index = Some(next_idx);
            }
        }

        self.current()
    }

    /// Natural version-sort over hierarchical paths (`track10` after
    /// `track9`); resets cursor and deck per spec §4.C.
    pub fn sort(&mut self) {
        self.items.sort_by(|a, b| natord::compare(a.uri(), b.uri()));
        self.index = None;
        self.deck = Deck::new(self.items.len());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let body = self.items.iter().map(|m| m.uri()).join("\n");
        fs::write(path, body).map_err(ClimpError::from)
    }

    /// All-or-nothing: on any failure the playlist is left exactly as
    /// it was before the call (spec §4.C, §8).
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        let mut resolved = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            resolved.push(Media::from_arg(line)?);
        }
        self.add_list(resolved);
        Ok(())
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of a saved playlist file (its filename, sans directory).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistName(pub String);

pub fn load_from_dir(dir: &Path) -> Result<Vec<(PlaylistName, Vec<Utf8PathBuf>)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let text = fs::read_to_string(&path)?;
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(Utf8PathBuf::from)
            .collect();
        out.push((PlaylistName(name), entries));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_media(uri: &str) -> Media {
        // exercise the http(s) path so tests don't touch the filesystem
        Media::from_arg(&format!("https://example.invalid/{uri}")).unwrap()
    }

    #[test]
    fn save_then_clear_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pl.m3u");

        let mut pl = Playlist::new();
        pl.insert_back(fake_media("a.mp3"));
        pl.insert_back(fake_media("b.mp3"));
        pl.save(&path).unwrap();

        let uris_before: Vec<_> = pl.iter().map(|m| m.uri().to_string()).collect();
        pl.clear();
        assert_eq!(pl.size(), 0);

        pl.load(&path).unwrap();
        let uris_after: Vec<_> = pl.iter().map(|m| m.uri().to_string()).collect();
        assert_eq!(uris_before, uris_after);
    }

    #[test]
    fn deck_size_tracks_playlist_size_after_every_mutation() {
        let mut pl = Playlist::new();
        for i in 0..5 {
            pl.insert_back(fake_media(&format!("{i}.mp3")));
            assert_eq!(pl.deck.size(), pl.size());
        }
        pl.take(2);
        assert_eq!(pl.deck.size(), pl.size());
        pl.sort();
        assert_eq!(pl.deck.size(), pl.size());
        pl.clear();
        assert_eq!(pl.deck.size(), pl.size());
    }

    #[test]
    fn clear_resets_cursor_to_none() {
        let mut pl = Playlist::new();
        pl.insert_back(fake_media("a.mp3"));
        pl.next();
        assert!(pl.current_index().is_some());
        pl.clear();
        assert_eq!(pl.current_index(), None);
    }

    #[test]
    fn next_on_empty_playlist_returns_none() {
        let mut pl = Playlist::new();
        assert!(pl.next().is_none());
        assert_eq!(pl.current_index(), None);
    }

    #[test]
    fn plain_mode_wraps_on_repeat_and_stops_without() {
        let mut pl = Playlist::new();
        pl.insert_back(fake_media("a.mp3"));
        pl.insert_back(fake_media("b.mp3"));

        pl.next();
        pl.next();
        assert!(pl.next().is_none()); // no repeat: ran off the end

        pl.set_repeat(true);
        assert!(pl.next().is_some()); // wraps to 0
        assert_eq!(pl.current_index(), Some(0));
    }

    #[test]
    fn shuffle_no_repeat_terminates_after_one_cycle() {
        let mut pl = Playlist::new();
        for i in 0..3 {
            pl.insert_back(fake_media(&format!("{i}.mp3")));
        }
        pl.set_shuffle(true);

        let mut drawn = std::collections::HashSet::new();
        for _ in 0..3 {
            let idx = pl.next().and_then(|_| pl.current_index()).unwrap();
            drawn.insert(idx);
        }
        assert_eq!(drawn, (0..3).collect());
        assert!(pl.next().is_none());
    }

    #[test]
    fn take_removed_media_never_reappears_until_reinserted() {
        let mut pl = Playlist::new();
        let target = fake_media("x.mp3");
        pl.insert_back(fake_media("a.mp3"));
        pl.insert_back(target.clone());
        pl.insert_back(fake_media("b.mp3"));

        let taken = pl.take(1).unwrap();
        assert_eq!(taken, target);
        assert!(pl.iter().all(|m| *m != target));
    }

    #[test]
    fn m3u_with_bad_fifth_line_leaves_playlist_unchanged_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.m3u");
        fs::write(
            &path,
            "https://example.invalid/1.mp3\nhttps://example.invalid/2.mp3\n\
             https://example.invalid/3.mp3\nhttps://example.invalid/4.mp3\n\
             /definitely/not/a/real/file\n",
        )
        .unwrap();

        let mut pl = Playlist::new();
        pl.insert_back(fake_media("keep.mp3"));
        let before = pl.size();
        assert!(pl.load(&path).is_err());
        assert_eq!(pl.size(), before);
    }

    #[test]
    fn sort_is_natural_not_lexicographic() {
        let mut pl = Playlist::new();
        for n in [1, 9, 10, 2] {
            pl.insert_back(fake_media(&format!("track{n}.mp3")));
        }
        pl.sort();
        let order: Vec<_> = pl.iter().map(|m| m.uri().to_string()).collect();
        let idx = |needle: &str| order.iter().position(|u| u.contains(needle)).unwrap();
        assert!(idx("track9") < idx("track10"));
    }
}
