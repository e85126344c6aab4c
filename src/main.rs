use clap::Parser;
use tracing::info;

use contour_earth::config::SETTINGS;
use contour_earth::{fetch, TileSource, WorldModel};

/// Build a terrain mesh around a geographic point and report its size.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Latitude of the anchor, in degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the anchor, in degrees
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Tile zoom level of the finest requested tiles
    #[arg(long, default_value_t = 14)]
    zoom: i32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let source = TileSource::new(&SETTINGS, fetch::fetcher());
    let model = WorldModel::new(source);
    model
        .reload()
        .set(Some(Box::new(|| info!("terrain updated"))));

    model.load_lat_lon(args.lat, args.lon, args.zoom);
    model.wait_idle();

    let mesh = model.mesh().get();
    println!(
        "mesh: {} vertices, {} triangles from {} tile(s), {} label(s)",
        mesh.point_count, mesh.triangle_count, mesh.tile_count, mesh.label_count
    );

    fetch::fetcher().shutdown();
}
