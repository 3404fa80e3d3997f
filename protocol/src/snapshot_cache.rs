use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::message::SnapshotImage;
use crate::traits::SnapshotCache;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    header: String,
    payload: String,
}

/// Flat-file snapshot cache. Load failures mean "no cache"; store failures
/// are logged and dropped.
pub struct FileSnapshotCache {
    path: PathBuf,
}

impl FileSnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotCache for FileSnapshotCache {
    fn load(&self) -> Option<SnapshotImage> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let entry = serde_json::from_str::<CacheEntry>(&raw).ok()?;
        Some(SnapshotImage {
            header: entry.header,
            payload: entry.payload,
        })
    }

    fn store(&mut self, image: &SnapshotImage) {
        let entry = CacheEntry {
            header: image.header.clone(),
            payload: image.payload.clone(),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("could not serialize snapshot cache entry: {}", err);
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, json) {
            log::warn!("could not write snapshot cache {:?}: {}", self.path, err);
        }
    }
}

/// For sessions that opt out of local caching.
pub struct NoCache;

impl SnapshotCache for NoCache {
    fn load(&self) -> Option<SnapshotImage> {
        None
    }

    fn store(&mut self, _image: &SnapshotImage) {}
}
