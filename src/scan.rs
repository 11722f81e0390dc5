//! Asynchronous tag scanner (spec §4.B, §5).
//!
//! Grounded on mpdhaj's `scan.rs`/`scan/lofty.rs`/`scan/moosicbox_audiotags.rs`,
//! generalized from "write into a sqlite row" to "publish into a
//! `Media`'s info record" and wrapped with the pending-lookup map and
//! per-URI timeout the spec requires.

pub mod lofty;
pub mod moosicbox_audiotags;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::warn;

use crate::media::{Media, MediaInfo};

const SCAN_TIMEOUT: Duration = Duration::from_secs(5);

trait FormatScanner: Send + Sync {
    fn scan(&self, path: Utf8PathBuf) -> Option<MediaInfo>;
}

fn scanners() -> Vec<Box<dyn FormatScanner>> {
    vec![
        Box::new(lofty::Scanner),
        Box::new(moosicbox_audiotags::Scanner),
    ]
}

/// Owns the `uri -> in-flight` set so that at most one lookup per URI
/// is ever running (spec §4.B).
#[derive(Default)]
pub struct Scanner {
    pending: Mutex<HashSet<String>>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits `media` for background tag reading. Returns
    /// immediately; the media's info is populated (and `parsed` set)
    /// asynchronously, or the lookup is logged and the media stays
    /// unparsed. No callback is required of the caller (spec §4.B).
    pub fn submit(self: &Arc<Self>, media: Media) {
        if !media.is_parseable() || media.parsed() {
            return;
        }

        let uri = media.uri().to_string();
        {
            let mut pending = self.pending.lock().unwrap();
            if !pending.insert(uri.clone()) {
                return; // already in flight
            }
        }

        let this = Arc::clone(self);
        tokio::task::spawn(async move {
            let outcome = match media.path().map(|p| p.to_owned()) {
                Some(path) => tokio::time::timeout(SCAN_TIMEOUT, scan_blocking(path)).await,
                None => Ok(None),
            };

            match outcome {
                Ok(Some(info)) => media.set_info(info),
                Ok(None) => warn!(uri = media.uri(), "no scanner could parse media"),
                Err(_) => warn!(uri = media.uri(), "tag scan timed out after 5s"),
            }

            this.pending.lock().unwrap().remove(&uri);
        });
    }
}

async fn scan_blocking(path: Utf8PathBuf) -> Option<MediaInfo> {
    tokio::task::spawn_blocking(move || {
        scanners()
            .into_iter()
            .find_map(|scanner| scanner.scan(path.clone()))
    })
    .await
    .expect("scanning should never panic")
}
