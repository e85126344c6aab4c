//! Protobuf wire messages: the Mapbox vector-tile schema subset consumed by
//! the contour decoder, plus the crate's own cache payloads.

/// A decoded vector tile: a list of named layers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VectorTile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Layer {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,
    #[prost(uint32, optional, tag = "5")]
    pub extent: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    /// Alternating key/value indices into the layer tables.
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub geom_type: Option<u32>,
    /// Command-encoded geometry stream, zig-zag parameters.
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

/// Simplified tile body cached as `.xyz`: flat (x, y, z) triples on the
/// tile-local grid.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ElevationPayload {
    #[prost(double, repeated, tag = "1")]
    pub points: Vec<f64>,
}

/// MRU-ordered key list persisted next to the cached tile files.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CacheIndex {
    #[prost(string, repeated, tag = "1")]
    pub files: Vec<String>,
}

/// The global labels blob.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelBlob {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<LabelRecord>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelRecord {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(double, tag = "2")]
    pub lat: f64,
    #[prost(double, tag = "3")]
    pub lon: f64,
    /// Elevation in meters when surveyed.
    #[prost(sint32, optional, tag = "4")]
    pub ele: Option<i32>,
    #[prost(enumeration = "LabelKindPb", tag = "5")]
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LabelKindPb {
    Other = 0,
    Peak = 1,
    Saddle = 2,
    Volcano = 3,
}
