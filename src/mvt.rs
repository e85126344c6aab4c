//! Extraction of elevated contour polylines from decoded vector tiles.

use tracing::warn;

use crate::config::TILE_EXTENT;
use crate::point::Point;
use crate::wire;

const CONTOUR_LAYER: &str = "contour";
const ELEVATION_KEY: &str = "ele";

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

pub fn zigzag_decode(v: u32) -> i32 {
    ((v >> 1) as i32) ^ (-((v & 1) as i32))
}

/// Points outside the tile grid are dropped before caching.
pub fn is_valid(p: &Point) -> bool {
    p.x >= 0.0 && p.x <= TILE_EXTENT as f64 && p.y >= 0.0 && p.y <= TILE_EXTENT as f64
}

/// Contour polylines of a tile, on the tile-local integer grid with
/// z = the feature's elevation in meters. Features without an elevation tag
/// are skipped.
pub fn contours(tile: &wire::VectorTile) -> Vec<Vec<Point>> {
    let mut path = Vec::new();

    for layer in &tile.layers {
        if layer.name != CONTOUR_LAYER {
            continue;
        }
        for feature in &layer.features {
            let ele = match elevation(layer, feature) {
                Some(ele) => ele,
                None => continue,
            };
            geometry(feature, ele, &mut path);
        }
    }

    path
}

// The first "ele" tag carrying an integer value, scanning tags pairwise.
fn elevation(layer: &wire::Layer, feature: &wire::Feature) -> Option<i64> {
    let mut i = 0;
    while i + 1 < feature.tags.len() {
        let k = feature.tags[i] as usize;
        let v = feature.tags[i + 1] as usize;

        if k < layer.keys.len() && layer.keys[k] == ELEVATION_KEY && v < layer.values.len() {
            if let Some(value) = layer.values[v].int_value {
                return Some(value);
            }
        }
        i += 2;
    }
    None
}

// Walk the command stream, accumulating zig-zag deltas into a cursor. A
// truncated parameter run discards this feature's polylines only.
fn geometry(feature: &wire::Feature, elevation: i64, path: &mut Vec<Vec<Point>>) {
    let size = path.len();
    let mut cursor = Point::new(0.0, 0.0, elevation as f64);
    let mut start = cursor;
    let mut polygon: Vec<Point> = Vec::new();

    let geom = &feature.geometry;
    let mut k = 0;
    while k < geom.len() {
        let command = geom[k];
        let id = command & 0x7;
        let count = command >> 3;

        if id == CMD_MOVE_TO || id == CMD_LINE_TO {
            for l in 0..2 * count {
                k += 1;
                if k >= geom.len() {
                    warn!("truncated geometry parameter stream");
                    path.truncate(size);
                    return;
                }

                let value = zigzag_decode(geom[k]);
                if l % 2 == 0 {
                    cursor.x += value as f64;
                } else {
                    cursor.y += value as f64;

                    if id == CMD_MOVE_TO {
                        if !polygon.is_empty() {
                            path.push(std::mem::take(&mut polygon));
                        }
                        start = cursor;
                    }
                    polygon.push(cursor);
                }
            }
        } else if id == CMD_CLOSE_PATH {
            polygon.push(start);
            path.push(std::mem::take(&mut polygon));
        }
        k += 1;
    }

    if !polygon.is_empty() {
        path.push(polygon);
    }
}
