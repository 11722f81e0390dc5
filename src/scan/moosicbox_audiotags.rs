use camino::Utf8PathBuf;
use moosicbox_audiotags::{Error, Tag};
use tracing::warn;

use crate::media::MediaInfo;
use crate::scan::FormatScanner;

pub struct Scanner;

impl FormatScanner for Scanner {
    fn scan(&self, path: Utf8PathBuf) -> Option<MediaInfo> {
        let tag = match Tag::new().read_from_path(&path) {
            Ok(tag) => tag,
            Err(
                Error::UnknownFileExtension(_)
                | Error::UnsupportedFormat(_)
                | Error::UnsupportedMimeType(_),
            ) => return None,
            Err(other) => {
                warn!(%path, error = %other, "moosicbox_audiotags could not parse metadata");
                return None;
            }
        };

        let (track, _total) = tag.track();

        Some(MediaInfo {
            title: tag.title().unwrap_or_default().to_string(),
            artist: tag.artist().unwrap_or_default().to_string(),
            album: tag.album().map(|a| a.title.to_string()).unwrap_or_default(),
            track: track.map(u32::from),
            duration: Default::default(),
            seekable: true,
        })
    }
}
