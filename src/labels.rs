//! Named summits and passes from the global labels blob.

use std::io::Read;

use prost::Message;
use tracing::info;

use crate::geo_trig;
use crate::point::Point;
use crate::tile_source::TileId;
use crate::wire::{LabelBlob, LabelKindPb};

// Sort-to-the-bottom elevation for labels without a surveyed one.
const UNKNOWN_ELEVATION: f64 = -1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Peak,
    Saddle,
    Volcano,
    Other,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    /// Mercator position; z is replaced by the interpolated ground elevation
    /// once the label lands on a mesh.
    pub point: Point,
    /// Surveyed elevation in meters, kept across the ground snap.
    pub elevation: f64,
    pub kind: LabelKind,
    pub has_elevation: bool,
}

impl Label {
    pub fn elevation_estimate(&self) -> f64 {
        if self.has_elevation {
            self.elevation
        } else {
            self.point.z
        }
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Label) -> bool {
        self.name == other.name && self.point == other.point
    }
}

/// The parsed labels blob, filterable by tile.
pub struct LabelStore {
    labels: Vec<Label>,
}

impl LabelStore {
    pub fn load(reader: &mut impl Read) -> anyhow::Result<LabelStore> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let blob = LabelBlob::decode(buf.as_slice())?;

        let labels: Vec<Label> = blob
            .labels
            .into_iter()
            .map(|record| {
                let has_elevation = record.ele.is_some();
                let z = record.ele.map(f64::from).unwrap_or(UNKNOWN_ELEVATION);
                let point = geo_trig::mercator_from_lat_lon_deg(record.lat, record.lon, z);

                let kind = match LabelKindPb::try_from(record.kind) {
                    Ok(LabelKindPb::Peak) => LabelKind::Peak,
                    Ok(LabelKindPb::Saddle) => LabelKind::Saddle,
                    Ok(LabelKindPb::Volcano) => LabelKind::Volcano,
                    _ => LabelKind::Other,
                };

                Label {
                    name: record.name,
                    elevation: point.z,
                    point,
                    kind,
                    has_elevation,
                }
            })
            .collect();

        info!("loaded {} label(s)", labels.len());
        Ok(LabelStore { labels })
    }

    pub fn count(&self) -> usize {
        self.labels.len()
    }

    /// Append the labels whose Mercator position falls inside `tile`'s unit
    /// square.
    pub fn filter(&self, tile: &TileId, out: &mut Vec<Label>) {
        let zz = (1i64 << tile.zoom) as f64;
        let xmin = tile.x as f64 / zz;
        let xmax = (tile.x + 1) as f64 / zz;
        let ymin = tile.y as f64 / zz;
        let ymax = (tile.y + 1) as f64 / zz;

        for label in &self.labels {
            let x = label.point.x;
            let y = label.point.y;
            if x >= xmin && x < xmax && y >= ymin && y < ymax {
                out.push(label.clone());
            }
        }
    }
}
