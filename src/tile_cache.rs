//! On-disk tile store with an MRU-ordered index and size-bounded eviction.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use prost::Message;
use tracing::{info, warn};

use crate::config::{INDEX_FILE, LABELS_FILE};
use crate::wire::CacheIndex;

pub struct TileCache {
    folder: PathBuf,
    limit: usize,
    // Keys in MRU order, most recent first.
    files: Mutex<Vec<String>>,
}

impl TileCache {
    pub fn new(folder: impl Into<PathBuf>, limit: usize) -> TileCache {
        let folder = folder.into();
        let files = match fs::read(folder.join(INDEX_FILE)) {
            Ok(buf) => match CacheIndex::decode(buf.as_slice()) {
                Ok(index) => index.files,
                Err(e) => {
                    // An index that does not round-trip is not trusted.
                    warn!("discarding unreadable cache index: {}", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        info!("cache index loaded with {} file(s)", files.len());

        TileCache {
            folder,
            limit,
            files: Mutex::new(files),
        }
    }

    fn flush_index(&self, files: &[String]) {
        if let Err(e) = fs::create_dir_all(&self.folder) {
            warn!("cannot create cache folder {:?}: {}", self.folder, e);
            return;
        }
        let index = CacheIndex {
            files: files.to_vec(),
        };
        if let Err(e) = fs::write(self.folder.join(INDEX_FILE), index.encode_to_vec()) {
            warn!("cannot write cache index: {}", e);
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let files = self.files.lock().unwrap();
        files.iter().any(|f| f == key)
    }

    /// Open a cached file for reading and move its key to the front of the
    /// index. The returned handle outlives the index lock.
    pub fn read(&self, key: &str) -> Option<File> {
        let mut files = self.files.lock().unwrap();

        let pos = files.iter().position(|f| f == key)?;
        if pos != 0 {
            let found = files.remove(pos);
            files.insert(0, found);
            self.flush_index(&files);
        }

        File::open(self.folder.join(key)).ok()
    }

    /// Open a file for writing, inserting its key at the front of the index
    /// and deleting any overflow beyond the cache limit.
    pub fn write(&self, key: &str) -> Option<File> {
        let mut files = self.files.lock().unwrap();

        if let Err(e) = fs::create_dir_all(&self.folder) {
            warn!("cannot create cache folder {:?}: {}", self.folder, e);
            return None;
        }

        files.insert(0, key.to_owned());
        if files.len() > self.limit {
            for evicted in files.split_off(self.limit) {
                info!("full cache, removing {}", evicted);
                if let Err(e) = fs::remove_file(self.folder.join(&evicted)) {
                    warn!("cannot remove {}: {}", evicted, e);
                }
            }
        }
        self.flush_index(&files);

        File::create(self.folder.join(key)).ok()
    }

    /// The global labels blob, when present.
    pub fn read_labels(&self) -> Option<File> {
        let _files = self.files.lock().unwrap();
        File::open(self.folder.join(LABELS_FILE)).ok()
    }

    #[cfg(test)]
    fn keys(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn write_entry(cache: &TileCache, key: &str, body: &[u8]) {
        let mut file = cache.write(key).expect("cache write failed");
        file.write_all(body).unwrap();
    }

    #[test]
    fn eviction_keeps_the_most_recent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path(), 3);

        for key in ["a", "b", "c", "d"] {
            write_entry(&cache, key, key.as_bytes());
        }
        assert_eq!(cache.keys(), ["d", "c", "b"]);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("d").exists());

        // Reading moves the key to the front.
        let mut body = String::new();
        cache.read("b").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "b");
        assert_eq!(cache.keys(), ["b", "d", "c"]);
    }

    #[test]
    fn index_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = TileCache::new(dir.path(), 10);
            write_entry(&cache, "14-8600-5900.xyz", b"x");
            write_entry(&cache, "14-8601-5900.xyz", b"y");
        }
        let cache = TileCache::new(dir.path(), 10);
        assert_eq!(cache.keys(), ["14-8601-5900.xyz", "14-8600-5900.xyz"]);
        assert!(cache.has("14-8600-5900.xyz"));
        assert!(!cache.has("14-8602-5900.xyz"));
    }

    #[test]
    fn corrupt_index_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        // Invalid wire type for the files field.
        fs::write(dir.path().join(INDEX_FILE), [0x0d, 0x01, 0x02, 0x03, 0x04]).unwrap();
        let cache = TileCache::new(dir.path(), 10);
        assert_eq!(cache.keys().len(), 0);
    }

    #[test]
    fn missing_entries_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path(), 10);
        assert!(cache.read("nope.xyz").is_none());
        assert!(cache.read_labels().is_none());
    }

    #[test]
    fn labels_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path(), 10);
        fs::write(dir.path().join(LABELS_FILE), b"blob").unwrap();
        let mut body = Vec::new();
        cache.read_labels().unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"blob");
    }
}
