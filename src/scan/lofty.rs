use camino::Utf8PathBuf;
use lofty::{
    file::{AudioFile, TaggedFileExt},
    probe::read_from_path,
    tag::Accessor,
};
use tracing::warn;

use crate::media::MediaInfo;
use crate::scan::FormatScanner;

pub struct Scanner;

impl FormatScanner for Scanner {
    fn scan(&self, path: Utf8PathBuf) -> Option<MediaInfo> {
        let tagged_file = match read_from_path(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(%path, error = %e, "lofty could not open file");
                return None;
            }
        };

        let tag = tagged_file.primary_tag()?;
        let properties = tagged_file.properties();

        Some(MediaInfo {
            title: tag.title().unwrap_or_default().to_string(),
            artist: tag.artist().unwrap_or_default().to_string(),
            album: tag.album().unwrap_or_default().to_string(),
            track: tag.track(),
            duration: properties.duration(),
            seekable: true,
        })
    }
}
