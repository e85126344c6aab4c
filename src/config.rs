use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Filename for labels inside the cache folder.
pub const LABELS_FILE: &str = "labels";

/// Filename for the MRU index inside the cache folder.
pub const INDEX_FILE: &str = "index";

/// Coarsest zoom level requested by the pipeline.
pub const MIN_ZOOM: i32 = 11;

/// Extra tiles on each side of the block at MIN_ZOOM.
pub const MIN_ZOOM_MARGIN: i32 = 4;

/// Vector-tile grid extent.
pub const TILE_EXTENT: i64 = 4096;

const CONFIG_PATH: &str = "./config/contour_earth.toml";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Folder for cached tiles.
    pub cache_folder: PathBuf,
    /// Domain for API requests.
    pub domain: String,
    /// Source for API tile requests.
    pub source: String,
    /// API token for tile requests.
    pub token: String,
    /// Max number of concurrent HTTPS requests.
    pub max_requests: u32,
    /// Max number of tiles to keep in the cache.
    pub cache_limit: usize,
    /// Per-request timeout surfaced as a fetch error.
    pub timeout_secs: u64,
    /// Earth radius in meters.
    pub earth_radius: f64,
    /// Spherical model frame when true, locally flat otherwise.
    pub use_earth_curvature: bool,
    /// Meters above ground for an observer.
    pub viewer_height: f64,
    /// Meters above ground for depth test of peaks.
    pub peaks_depth_height: f64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            cache_folder: PathBuf::from("data"),
            domain: "a.tiles.mapbox.com".to_owned(),
            source: "mapbox.mapbox-terrain-v2".to_owned(),
            token: String::new(),
            max_requests: 10,
            cache_limit: 5000,
            timeout_secs: 30,
            earth_radius: 6.384e6,
            use_earth_curvature: true,
            viewer_height: 10.0,
            peaks_depth_height: 100.0,
        }
    }
}

pub fn load_settings() -> Settings {
    match std::fs::read_to_string(CONFIG_PATH) {
        Ok(buf) => match toml::from_str(&buf) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("ignoring bad config {}: {}", CONFIG_PATH, e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

lazy_static::lazy_static! {
    pub static ref SETTINGS: Settings = load_settings();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_requests, 10);
        assert_eq!(settings.cache_limit, 5000);
        assert!(settings.use_earth_curvature);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let settings: Settings =
            toml::from_str("max_requests = 3\ncache_folder = \"/tmp/tiles\"").unwrap();
        assert_eq!(settings.max_requests, 3);
        assert_eq!(settings.cache_folder, PathBuf::from("/tmp/tiles"));
        assert_eq!(settings.cache_limit, 5000);
        assert_eq!(settings.domain, "a.tiles.mapbox.com");
    }
}
