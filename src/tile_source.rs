//! Cache-backed tile access with deduplicated network fallback.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::sync::{Arc, Mutex, Weak};

use tracing::{info, warn};

use crate::config::Settings;
use crate::fetch::{FetchError, Fetcher};
use crate::tile_cache::TileCache;

/// Identity of one Web Mercator tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub zoom: i32,
    pub x: i32,
    pub y: i32,
}

impl TileId {
    pub fn new(zoom: i32, x: i32, y: i32) -> TileId {
        TileId { zoom, x, y }
    }

    /// Cache key, `"{z}-{x}-{y}.{ext}"`.
    pub fn key(&self, ext: &str) -> String {
        format!("{}-{}-{}.{}", self.zoom, self.x, self.y, ext)
    }
}

pub type MvtSuccessFn = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;
pub type MvtErrorFn = Box<dyn FnOnce() + Send + 'static>;

struct Request {
    on_success: MvtSuccessFn,
    on_error: MvtErrorFn,
}

pub struct TileSource {
    weak: Weak<TileSource>,
    source: String,
    token: String,
    cache: TileCache,
    fetcher: Arc<Fetcher>,
    domain: String,
    // At most one outstanding fetch per tile key.
    requests: Mutex<HashMap<String, Request>>,
}

impl TileSource {
    pub fn new(settings: &Settings, fetcher: Arc<Fetcher>) -> Arc<TileSource> {
        Arc::new_cyclic(|weak| TileSource {
            weak: weak.clone(),
            source: settings.source.clone(),
            token: settings.token.clone(),
            cache: TileCache::new(&settings.cache_folder, settings.cache_limit),
            fetcher,
            domain: settings.domain.clone(),
            requests: Mutex::new(HashMap::new()),
        })
    }

    fn shared(&self) -> Arc<TileSource> {
        self.weak.upgrade().expect("tile source dropped")
    }

    pub fn load_labels(&self) -> Option<File> {
        self.cache.read_labels()
    }

    pub fn load_payload(&self, tile: TileId, ext: &str) -> Option<File> {
        self.cache.read(&tile.key(ext))
    }

    pub fn store_payload(&self, tile: TileId, ext: &str) -> Option<File> {
        self.cache.write(&tile.key(ext))
    }

    /// Fetch the raw vector tile over HTTPS. A request already pending for
    /// the same key absorbs this one: its callbacks are dropped.
    pub fn load_mvt(&self, tile: TileId, on_success: MvtSuccessFn, on_error: MvtErrorFn) {
        let key = tile.key("mvt");
        let path = format!(
            "/v4/{}/{}/{}/{}.mvt?access_token={}",
            self.source, tile.zoom, tile.x, tile.y, self.token
        );

        let exists = {
            let mut requests = self.requests.lock().unwrap();
            match requests.entry(key.clone()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(entry) => {
                    entry.insert(Request {
                        on_success,
                        on_error,
                    });
                    false
                }
            }
        };
        if exists {
            info!("request is already pending for key: {}", key);
            return;
        }

        info!("network get key: {}", key);
        let this = self.shared();
        let error_this = self.shared();
        let error_key = key.clone();
        self.fetcher.get(
            &self.domain,
            &path,
            Box::new(move |content| this.finished(&key, content)),
            Box::new(move |e| error_this.errored(&error_key, e)),
        );
    }

    /// Outstanding fetches, for observability.
    pub fn pending_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn finished(&self, key: &str, content: Vec<u8>) {
        info!("network finished key: {}", key);
        let request = self.requests.lock().unwrap().remove(key);
        match request {
            // The lock is released before the callback runs.
            Some(request) => (request.on_success)(content),
            None => warn!("key was not requested: {}", key),
        }
    }

    fn errored(&self, key: &str, e: FetchError) {
        warn!("network error for key {}: {}", key, e);
        let request = self.requests.lock().unwrap().remove(key);
        match request {
            Some(request) => (request.on_error)(),
            None => warn!("key was not requested: {}", key),
        }
    }
}
