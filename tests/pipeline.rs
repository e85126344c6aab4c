//! End-to-end pipeline run against a pre-populated cache: no network, every
//! tile is served from disk, and the session publishes a mesh with snapped
//! labels.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prost::Message;

use contour_earth::config::{Settings, MIN_ZOOM};
use contour_earth::fetch::Fetcher;
use contour_earth::geo_trig;
use contour_earth::tile_cache::TileCache;
use contour_earth::wire::{ElevationPayload, LabelBlob, LabelKindPb, LabelRecord};
use contour_earth::world_model::gen_tile_list;
use contour_earth::{TileSource, WorldModel};

const ANCHOR_LAT: f64 = 45.8326;
const ANCHOR_LON: f64 = 6.8652;

fn anchor_tile(zoom: i32) -> (i32, i32) {
    let p = geo_trig::mercator_from_lat_lon_deg(ANCHOR_LAT, ANCHOR_LON, 0.0);
    let zz = (1i64 << zoom) as f64;
    ((p.x * zz) as i32, (p.y * zz) as i32)
}

// A handful of grid samples per tile, all inside the valid extent.
fn sample_payload(seed: i32) -> ElevationPayload {
    let mut payload = ElevationPayload::default();
    let offsets = [
        (512.0, 512.0),
        (3584.0, 512.0),
        (512.0, 3584.0),
        (3584.0, 3584.0),
        (2048.0, 2048.0),
    ];
    for (i, &(x, y)) in offsets.iter().enumerate() {
        let z = 1000.0 + ((seed + i as i32) % 50) as f64 * 10.0;
        payload.points.extend_from_slice(&[x, y, z]);
    }
    payload
}

#[test]
fn session_builds_a_mesh_from_a_warm_cache() {
    let dir = tempfile::tempdir().unwrap();
    let zoom = MIN_ZOOM;
    let (x, y) = anchor_tile(zoom);

    let tile_list = gen_tile_list(x, y, zoom);
    assert!(!tile_list.is_empty());

    // Warm the cache with a simplified payload per tile.
    {
        let cache = TileCache::new(dir.path(), 10_000);
        for (i, tile) in tile_list.iter().enumerate() {
            let payload = sample_payload(i as i32);
            let mut file = cache.write(&tile.key("xyz")).expect("cache write");
            file.write_all(&payload.encode_to_vec()).unwrap();
        }
    }

    // And a labels blob with one peak inside the anchor tile.
    let blob = LabelBlob {
        labels: vec![
            LabelRecord {
                name: "Anchor Peak".to_owned(),
                lat: ANCHOR_LAT,
                lon: ANCHOR_LON,
                ele: Some(4808),
                kind: LabelKindPb::Peak as i32,
            },
            LabelRecord {
                name: "Elsewhere".to_owned(),
                lat: -33.9,
                lon: 151.2,
                ele: None,
                kind: LabelKindPb::Other as i32,
            },
        ],
    };
    std::fs::write(dir.path().join("labels"), blob.encode_to_vec()).unwrap();

    let settings = Settings {
        cache_folder: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let fetcher = Arc::new(Fetcher::new(2, 1));
    let source = TileSource::new(&settings, fetcher);
    let model = WorldModel::new(source);

    let reloads = Arc::new(AtomicUsize::new(0));
    {
        let reloads = Arc::clone(&reloads);
        model.reload().set(Some(Box::new(move || {
            reloads.fetch_add(1, Ordering::SeqCst);
        })));
    }

    model.load_lat_lon(ANCHOR_LAT, ANCHOR_LON, zoom);
    model.wait_idle();

    // Every tile arrived from the cache, and at least one publication fired.
    let mesh = model.mesh().get();
    assert_eq!(mesh.tile_count as usize, tile_list.len());
    assert!(mesh.point_count >= 3);
    assert!(mesh.triangle_count > 0);
    assert_eq!(mesh.vertices.len(), 3 * mesh.point_count as usize);
    assert_eq!(mesh.normals.len(), 3 * mesh.point_count as usize);
    assert_eq!(mesh.indices.len(), 3 * mesh.triangle_count as usize);
    assert!(reloads.load(Ordering::SeqCst) >= 1);

    // The published triangulation is available for ground queries.
    let delaunay = model.delaunay().get().expect("published triangulation");
    let origin = model.origin().get();
    let ground = delaunay.find_triangle_point(&origin);
    assert!(ground.is_some(), "anchor must be inside the loaded terrain");

    // The label in the loaded area is visible and snapped to the ground.
    let labels = model.visible_labels().get();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].name, "Anchor Peak");
    assert_eq!(labels[0].elevation_estimate(), 4808.0);

    // Vertices are centered on the origin: the anchor tile's samples must be
    // within a few tile widths of the model origin.
    let tile_meters = 2.0 * std::f64::consts::PI * settings.earth_radius
        * geo_trig::mercator_to_lat_rad(&origin).cos()
        / (1i64 << zoom) as f64;
    let mut near_origin = false;
    for chunk in mesh.vertices.chunks(3) {
        let d = (chunk[0] as f64).hypot(chunk[1] as f64);
        if d < 2.0 * tile_meters {
            near_origin = true;
            break;
        }
    }
    assert!(near_origin);
}

#[test]
fn session_without_a_consumer_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let zoom = MIN_ZOOM;
    let (x, y) = anchor_tile(zoom);

    {
        let cache = TileCache::new(dir.path(), 10_000);
        for (i, tile) in gen_tile_list(x, y, zoom).iter().enumerate() {
            let mut file = cache.write(&tile.key("xyz")).expect("cache write");
            file.write_all(&sample_payload(i as i32).encode_to_vec()).unwrap();
        }
    }

    let settings = Settings {
        cache_folder: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let fetcher = Arc::new(Fetcher::new(2, 1));
    let source = TileSource::new(&settings, fetcher);
    let model = WorldModel::new(source);

    // No reload callback registered: the session drains without publishing.
    model.load_lat_lon(ANCHOR_LAT, ANCHOR_LON, zoom);
    model.wait_idle();

    let mesh = model.mesh().get();
    assert_eq!(mesh.point_count, 0);
    assert_eq!(mesh.tile_count, 0);
    assert!(model.delaunay().get().is_none());
}

#[test]
fn tile_samples_map_into_the_tile_square() {
    // A cached payload on the tile grid must land inside the tile's Mercator
    // unit square after translation and scaling.
    let dir = tempfile::tempdir().unwrap();
    let zoom = MIN_ZOOM;
    let (x, y) = anchor_tile(zoom);
    let tile_list = gen_tile_list(x, y, zoom);

    {
        let cache = TileCache::new(dir.path(), 10_000);
        for (i, tile) in tile_list.iter().enumerate() {
            let mut file = cache.write(&tile.key("xyz")).expect("cache write");
            file.write_all(&sample_payload(i as i32).encode_to_vec()).unwrap();
        }
    }

    let settings = Settings {
        cache_folder: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let fetcher = Arc::new(Fetcher::new(2, 1));
    let source = TileSource::new(&settings, fetcher);
    let model = WorldModel::new(source);
    model.reload().set(Some(Box::new(|| {})));

    model.load_lat_lon(ANCHOR_LAT, ANCHOR_LON, zoom);
    model.wait_idle();

    let delaunay = model.delaunay().get().expect("published triangulation");
    let zz = (1i64 << zoom) as f64;
    let margin = 0.5 / zz;

    // All triangulated points fall inside the loaded pyramid's footprint
    // (the coarsest ring spans the anchor block plus the margin).
    let (min_x, max_x) = tile_list
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), t| {
            (lo.min(t.x as f64 / zz), hi.max((t.x + 1) as f64 / zz))
        });
    for p in delaunay.points() {
        assert!(p.x >= min_x - margin && p.x <= max_x + margin);
        assert!(p.z >= 1000.0 && p.z <= 1500.0);
    }
}
