//! The terrain pipeline: tile scheduling, result draining, mesh publication.

use std::io::{Read, Write};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::Sender;
use itertools::iproduct;
use prost::Message;
use tracing::{error, info, warn};

use crate::concurrency::{task_pool, Guarded, GuardedArc};
use crate::config::{MIN_ZOOM, MIN_ZOOM_MARGIN, TILE_EXTENT};
use crate::delaunay::Delaunay;
use crate::geo_trig;
use crate::labels::{Label, LabelStore};
use crate::mvt;
use crate::point::Point;
use crate::tile_source::{TileId, TileSource};
use crate::wire::{ElevationPayload, VectorTile};

/// One loaded tile: its identity and its sample points in Mercator
/// coordinates, z in meters.
pub struct TileSample {
    pub id: TileId,
    pub points: Vec<Point>,
}

// Heterogeneous results drained by the session loop; None marks a failure.
enum PipeMessage {
    Tile(Option<TileSample>),
    Labels(Option<LabelStore>),
}

/// Vertex/normal/index arrays ready for a renderer, in the local model frame.
#[derive(Default)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub point_count: u32,
    pub triangle_count: u32,
    pub tile_count: u32,
    pub label_count: u32,
}

pub type ReloadFn = Box<dyn Fn() + Send + 'static>;

pub struct WorldModel {
    weak: Weak<WorldModel>,
    source: Arc<TileSource>,
    visible_labels: GuardedArc<Vec<Label>>,
    delaunay: Guarded<Option<Arc<Delaunay>>>,
    mesh: GuardedArc<Mesh>,
    origin: Guarded<Point>,
    selection: Guarded<Point>,
    reload: Guarded<Option<ReloadFn>>,
    idle: Guarded<bool>,
}

impl WorldModel {
    pub fn new(source: Arc<TileSource>) -> Arc<WorldModel> {
        Arc::new_cyclic(|weak| WorldModel {
            weak: weak.clone(),
            source,
            visible_labels: GuardedArc::new(Vec::new()),
            delaunay: Guarded::new(None),
            mesh: GuardedArc::new(Mesh::default()),
            origin: Guarded::new(Point::new(0.0, 0.0, 1.0)),
            selection: Guarded::new(Point::new(0.0, 0.0, 0.0)),
            reload: Guarded::new(None),
            idle: Guarded::new(true),
        })
    }

    fn shared(&self) -> Arc<WorldModel> {
        self.weak.upgrade().expect("world model dropped")
    }

    pub fn visible_labels(&self) -> &GuardedArc<Vec<Label>> {
        &self.visible_labels
    }

    pub fn delaunay(&self) -> &Guarded<Option<Arc<Delaunay>>> {
        &self.delaunay
    }

    pub fn mesh(&self) -> &GuardedArc<Mesh> {
        &self.mesh
    }

    pub fn origin(&self) -> &Guarded<Point> {
        &self.origin
    }

    pub fn selection(&self) -> &Guarded<Point> {
        &self.selection
    }

    /// Callback fired after each publication. Without one registered, the
    /// session loop drains results without rebuilding. A callback that needs
    /// the model back should capture a `Weak` handle to avoid a cycle.
    pub fn reload(&self) -> &Guarded<Option<ReloadFn>> {
        &self.reload
    }

    /// Block until no load session is running.
    pub fn wait_idle(&self) {
        self.idle.wait(|&idle| idle);
    }

    /// Load the terrain around a geographic anchor. Returns immediately; the
    /// session publishes incrementally as results arrive.
    pub fn load_lat_lon(&self, lat: f64, lon: f64, zoom: i32) {
        self.idle.set(false);
        let this = self.shared();
        // The session loop blocks on the result queue for its whole
        // lifetime; it gets its own thread so the pool workers stay
        // available for tile tasks.
        thread::Builder::new()
            .name("load-session".to_owned())
            .spawn(move || {
                this.run_session(lat, lon, zoom);
                this.idle.set(true);
                this.idle.notify_all();
            })
            .expect("cannot spawn session thread");
    }

    fn run_session(&self, lat: f64, lon: f64, zoom: i32) {
        let origin = geo_trig::mercator_from_lat_lon_deg(lat, lon, 0.0);
        self.origin.set(origin);
        self.selection.set(origin);

        let zz = (1i64 << zoom) as f64;
        let x = (origin.x * zz) as i32;
        let y = (origin.y * zz) as i32;

        // Request tiles.
        let tile_list = gen_tile_list(x, y, zoom);
        let (tx, rx) = crossbeam_channel::bounded::<PipeMessage>(1000);
        for &tile in &tile_list {
            let this = self.shared();
            let tx = tx.clone();
            task_pool().launch(move || this.load_tile(tile, true, &tx));
        }

        // Request labels.
        {
            let this = self.shared();
            let tx = tx.clone();
            task_pool().launch(move || this.load_global_labels(&tx));
        }
        drop(tx);

        let mut tiles: Vec<TileSample> = Vec::new();
        let mut labels: Option<LabelStore> = None;
        let expected = tile_list.len() + 1;
        let mut count = 0usize;

        while count < expected {
            // Wait for messages, then drain whatever has accumulated.
            let first = match rx.recv() {
                Ok(message) => message,
                Err(_) => {
                    error!("result channel closed early, ending load session");
                    break;
                }
            };
            let mut batch = vec![first];
            while let Ok(message) = rx.try_recv() {
                batch.push(message);
            }
            count += batch.len();

            // Early abort: without a consumer there is nothing to publish.
            if !self.reload.apply(|f| f.is_some()) {
                info!("nothing to reload ({}/{})", count, expected);
                continue;
            }

            let mut failed = 0;
            for message in batch {
                match message {
                    PipeMessage::Tile(Some(tile)) => tiles.push(tile),
                    PipeMessage::Labels(Some(store)) => labels = Some(store),
                    PipeMessage::Tile(None) | PipeMessage::Labels(None) => failed += 1,
                }
            }
            if failed > 0 {
                warn!("received {} failure(s)", failed);
            }

            let points: Vec<Point> = tiles
                .iter()
                .flat_map(|tile| tile.points.iter().copied())
                .collect();
            info!(
                "updating ({}/{}) with {} tile(s) and {} point(s)",
                count,
                expected,
                tiles.len(),
                points.len()
            );
            if points.len() < 3 {
                info!("less than 3 points, skipping");
                continue;
            }

            let delaunay = Arc::new(Delaunay::new(points, true));

            // Snap the labels of the loaded tiles onto the new ground.
            let mut label_count = 0u32;
            if let Some(store) = &labels {
                let mut filtered = Vec::new();
                for tile in &tiles {
                    store.filter(&tile.id, &mut filtered);
                }
                info!("filtered {} label(s) for {} tile(s)", filtered.len(), tiles.len());

                let mut visible: Vec<Label> = Vec::new();
                for mut label in filtered {
                    if let Some(found) = delaunay.find_triangle_point(&label.point) {
                        label.point.z = found.z;
                        label.point = geo_trig::mercator_to_model(&label.point, &origin);
                        visible.push(label);
                    }
                }

                // Highest first: elevation is the display priority.
                visible.sort_by(|lhs, rhs| {
                    rhs.elevation_estimate().total_cmp(&lhs.elevation_estimate())
                });

                label_count = visible.len() as u32;
                self.visible_labels.set(Arc::new(visible));
            }

            let mut mesh = make_mesh(&delaunay, &origin);
            mesh.tile_count = tiles.len() as u32;
            mesh.label_count = label_count;

            self.delaunay.set(Some(Arc::clone(&delaunay)));
            self.mesh.set(Arc::new(mesh));
            info!("new mesh available");

            self.reload.apply(|f| {
                if let Some(f) = f {
                    f()
                }
            });
        }

        info!("finished updating ({}/{})", count, expected);
    }

    // Load one tile: the simplified .xyz payload from the cache, or on a
    // miss fetch the raw vector tile, simplify, store, and try once more.
    fn load_tile(&self, tile: TileId, retry: bool, tx: &Sender<PipeMessage>) {
        let zz = 1i64 << tile.zoom;
        // Clip x to [0, 2^zoom).
        let wrapped = TileId::new(
            tile.zoom,
            ((tile.x as i64).rem_euclid(zz)) as i32,
            tile.y,
        );

        let payload = match self.source.load_payload(wrapped, "xyz") {
            Some(mut file) => {
                let mut buf = Vec::new();
                let decoded = file
                    .read_to_end(&mut buf)
                    .ok()
                    .and_then(|_| ElevationPayload::decode(buf.as_slice()).ok());
                if decoded.is_none() {
                    error!("error parsing xyz: {}", wrapped.key("xyz"));
                }
                decoded
            }
            None if retry => {
                let this = self.shared();
                let error_this = self.shared();
                let success_tx = tx.clone();
                let error_tx = tx.clone();
                self.source.load_mvt(
                    tile,
                    Box::new(move |content| {
                        this.simplify_tile(wrapped, &content);
                        this.load_tile(tile, false, &success_tx);
                    }),
                    Box::new(move || error_this.load_tile(tile, false, &error_tx)),
                );
                return;
            }
            None => {
                error!("could not find/simplify xyz: {}", wrapped.key("xyz"));
                None
            }
        };

        let message = payload.map(|payload| {
            let translate = Point::new(
                tile.x as f64 * TILE_EXTENT as f64,
                tile.y as f64 * TILE_EXTENT as f64,
                0.0,
            );
            let scale = 1.0 / (TILE_EXTENT as f64 * zz as f64);

            let mut points = Vec::with_capacity(payload.points.len() / 3);
            let mut i = 0;
            while i + 2 < payload.points.len() {
                let mut p = Point::new(
                    payload.points[i],
                    payload.points[i + 1],
                    payload.points[i + 2],
                );
                p.add2(&translate);
                p.scale_xy(scale);
                points.push(p);
                i += 3;
            }
            TileSample { id: tile, points }
        });

        let _ = tx.send(PipeMessage::Tile(message));
    }

    // Decode the raw vector tile and cache its valid contour points as a
    // simplified .xyz payload.
    fn simplify_tile(&self, tile: TileId, content: &[u8]) {
        let decoded = match VectorTile::decode(content) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!("error parsing tile {}: {}", tile.key("mvt"), e);
                return;
            }
        };

        let path = mvt::contours(&decoded);
        if path.is_empty() {
            return;
        }

        let mut payload = ElevationPayload::default();
        for polyline in &path {
            for p in polyline {
                if mvt::is_valid(p) {
                    payload.points.extend_from_slice(&[p.x, p.y, p.z]);
                }
            }
        }

        match self.source.store_payload(tile, "xyz") {
            Some(mut file) => {
                if let Err(e) = file.write_all(&payload.encode_to_vec()) {
                    error!("cannot write cache entry {}: {}", tile.key("xyz"), e);
                }
            }
            None => error!("cannot write cache entry: {}", tile.key("xyz")),
        }
    }

    fn load_global_labels(&self, tx: &Sender<PipeMessage>) {
        info!("loading labels");
        let store = self.source.load_labels().and_then(|mut file| {
            match LabelStore::load(&mut file) {
                Ok(store) => Some(store),
                Err(e) => {
                    error!("error parsing global label file: {}", e);
                    None
                }
            }
        });
        if store.is_none() {
            warn!("could not load labels");
        }
        let _ = tx.send(PipeMessage::Labels(store));
    }
}

/// The pyramid of tiles loaded around the anchor tile (x, y): a 4x4 block at
/// `zoom`, then at each coarser level the 4x4 block around the shrunk anchor
/// minus the 2x2 core already covered, widened by a margin at the coarsest
/// level.
pub fn gen_tile_list(x: i32, y: i32, zoom: i32) -> Vec<TileId> {
    let mut result = Vec::new();

    let mut xx = x;
    let mut yy = y;
    let mut old_xcorner = 0;
    let mut old_ycorner = 0;

    let mut i = 0;
    while zoom - i >= MIN_ZOOM {
        let level_zoom = zoom - i;
        let level_size = 1i32 << level_zoom;

        let xcorner = (xx - 1) >> 1;
        let ycorner = (yy - 1) >> 1;

        let mut mina = xcorner * 2;
        let mut minb = ycorner * 2;
        let mut maxa = mina + 4;
        let mut maxb = minb + 4;

        if level_zoom == MIN_ZOOM {
            mina -= MIN_ZOOM_MARGIN;
            minb -= MIN_ZOOM_MARGIN;
            maxa += MIN_ZOOM_MARGIN;
            maxb += MIN_ZOOM_MARGIN;
        }

        for (a, b) in iproduct!(mina..maxa, minb..maxb) {
            if a < 0 || a >= level_size || b < 0 || b >= level_size {
                continue;
            }
            if i > 0
                && a >= old_xcorner
                && a < old_xcorner + 2
                && b >= old_ycorner
                && b < old_ycorner + 2
            {
                continue;
            }
            result.push(TileId::new(level_zoom, a, b));
        }

        xx >>= 1;
        yy >>= 1;
        old_xcorner = xcorner;
        old_ycorner = ycorner;
        i += 1;
    }

    result
}

// Model-frame vertex, normal and index arrays. The index winding is flipped
// because the Mercator frame is indirect.
fn make_mesh(delaunay: &Delaunay, origin: &Point) -> Mesh {
    let mut mesh = Mesh::default();

    let mut model_points = Vec::with_capacity(delaunay.points().len());
    for p in delaunay.points() {
        let q = geo_trig::mercator_to_model(p, origin);
        model_points.push(q);
        mesh.vertices
            .extend_from_slice(&[q.x as f32, q.y as f32, q.z as f32]);
    }
    mesh.point_count = model_points.len() as u32;

    for n in delaunay.vertex_normals(&model_points) {
        mesh.normals
            .extend_from_slice(&[-n.x as f32, -n.y as f32, -n.z as f32]);
    }

    for [a, b, c] in delaunay.triangles() {
        mesh.indices
            .extend_from_slice(&[a as u32, c as u32, b as u32]);
        mesh.triangle_count += 1;
    }

    mesh
}
