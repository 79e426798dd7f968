use clap::Parser;
use mapwire::connection::{ApiConfig, ApiConnection, DEFAULT_BASE_URL};
use mapwire::types::{BoundingBox, MapData, MapDataSink, MapEntity};
use miette::IntoDiagnostic;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "mapwire - fetch an area and summarize it")]
struct Args {
    /// Southern edge
    #[arg(long, allow_hyphen_values = true)]
    min_lat: f64,

    /// Western edge
    #[arg(long, allow_hyphen_values = true)]
    min_lon: f64,

    /// Northern edge
    #[arg(long, allow_hyphen_values = true)]
    max_lat: f64,

    /// Eastern edge, may be smaller than the western one to cross the antimeridian
    #[arg(long, allow_hyphen_values = true)]
    max_lon: f64,

    /// API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api: url::Url,

    /// Read timeout in seconds
    #[arg(long, default_value_t = 45)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Args::parse();

    let bounds = BoundingBox::from_coords(args.min_lat, args.min_lon, args.max_lat, args.max_lon)
        .into_diagnostic()?;
    let config = ApiConfig::new()
        .base_url(args.api)
        .read_timeout(Duration::from_secs(args.timeout))
        .build();
    let connection = ApiConnection::with_reqwest(config);

    let mut data = MapData::default();
    let mut changesets = HashSet::new();
    for part in bounds.split_at_antimeridian() {
        let mut sink = |entity: MapEntity| {
            if let Some(changeset) = entity.meta().and_then(|meta| meta.changeset.as_ref()) {
                changesets.insert(changeset.id);
            }
            data.accept(entity);
        };
        connection.map_data().get_map(&part, &mut sink).await?;
    }

    if data.is_empty() {
        println!("no elements in this area");
        return Ok(());
    }
    if let Some(bounds) = data.bounds {
        println!("bounds: {} .. {}", bounds.min(), bounds.max());
    }
    println!("nodes:      {}", data.nodes.len());
    println!("ways:       {}", data.ways.len());
    println!("relations:  {}", data.relations.len());
    println!("total:      {}", data.len());
    println!("changesets: {}", changesets.len());

    Ok(())
}
