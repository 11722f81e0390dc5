//! Media entity (spec §3, §4.B). Grounded on
//! `original_source/.../obj/media.c` and `.../media/uri.c` for the URI
//! normalization rules, and mpdhaj's `system::Song` for the Rust-side
//! field shape.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{ClimpError, Result};

/// Mutable metadata populated by the scanner once a media has been
/// parsed. `seekable` defaults to `true`; HTTP(S) media is never
/// parsed and keeps the defaults.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track: Option<u32>,
    pub duration: Duration,
    pub seekable: bool,
}

#[derive(Debug)]
struct Inner {
    uri: String,
    path: Option<Utf8PathBuf>,
    display_name: String,
    info: Mutex<MediaInfo>,
    parsed: std::sync::atomic::AtomicBool,
}

/// A single addressable audio resource. Cheap to clone: it's a
/// reference-counted handle, matching spec §3's "media is shared"
/// requirement — the playlist, the engine's active-track slot, and the
/// scanner's pending-lookup map may all hold a clone simultaneously.
#[derive(Debug, Clone)]
pub struct Media(Arc<Inner>);

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Media {}

impl Media {
    /// Normalizes `arg` into an absolute URI. If `arg` already parses
    /// as a URI (`file://`, `http://`, `https://`) it's kept as-is;
    /// otherwise it must resolve to an existing regular file, whose
    /// canonical absolute path is prefixed with `file://`.
    pub fn from_arg(arg: &str) -> Result<Media> {
        if let Some(scheme_end) = arg.find("://") {
            let scheme = &arg[..scheme_end];
            if matches!(scheme, "file" | "http" | "https") {
                return Self::from_uri_str(arg);
            }
        }

        let path = std::fs::canonicalize(arg)
            .map_err(|_| ClimpError::NotFound(arg.to_string()))?;
        if !path.is_file() {
            return Err(ClimpError::NotFound(arg.to_string()));
        }
        let path = Utf8PathBuf::try_from(path)
            .map_err(|e| ClimpError::InvalidArgument(e.to_string()))?;
        let uri = format!("file://{path}");
        Ok(Self::new(uri, Some(path)))
    }

    fn from_uri_str(uri: &str) -> Result<Media> {
        if let Some(path) = uri.strip_prefix("file://") {
            let path = Utf8PathBuf::from(path);
            if !path.is_file() {
                return Err(ClimpError::NotFound(uri.to_string()));
            }
            return Ok(Self::new(uri.to_string(), Some(path)));
        }
        // http(s):// — kept verbatim, never parsed.
        Ok(Self::new(uri.to_string(), None))
    }

    fn new(uri: String, path: Option<Utf8PathBuf>) -> Media {
        let display_name = path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(str::to_string)
            .unwrap_or_else(|| uri.clone());
        let is_http = uri.starts_with("http://") || uri.starts_with("https://");
        Media(Arc::new(Inner {
            uri,
            path,
            display_name,
            info: Mutex::new(MediaInfo {
                seekable: !is_http,
                ..Default::default()
            }),
            parsed: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    pub fn uri(&self) -> &str {
        &self.0.uri
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.0.path.as_deref()
    }

    pub fn display_name(&self) -> &str {
        &self.0.display_name
    }

    /// HTTP(S) media is permanently unparseable.
    pub fn is_parseable(&self) -> bool {
        self.0.path.is_some()
    }

    pub fn parsed(&self) -> bool {
        self.0.parsed.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn info(&self) -> MediaInfo {
        self.0.info.lock().unwrap().clone()
    }

    /// Called only by the scanner; publishes the parsed info and flips
    /// `parsed` as a publication fence (spec §5).
    pub fn set_info(&self, info: MediaInfo) {
        *self.0.info.lock().unwrap() = info;
        self.0.parsed.store(true, std::sync::atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_uri_is_never_parseable() {
        let m = Media::from_arg("https://example.com/stream.mp3").unwrap();
        assert!(!m.is_parseable());
        assert!(!m.info().seekable);
    }

    #[test]
    fn nonexistent_path_is_rejected() {
        assert!(Media::from_arg("/no/such/file.flac").is_err());
    }

    #[test]
    fn clones_share_identity() {
        let m = Media::from_arg("https://example.com/a.mp3").unwrap();
        let clone = m.clone();
        assert_eq!(m, clone);
        clone.set_info(MediaInfo {
            title: "A".into(),
            ..Default::default()
        });
        assert!(m.parsed());
        assert_eq!(m.info().title, "A");
    }
}
