use clap::{Parser, Subcommand};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use mapscout::models::{Catalog, GeometryExtent, Layer, LayerType, Region};
use mapscout::notify::Notifier;
use mapscout::query::{SelectionRegistry, SpatialQueryEngine};
use mapscout::utils::status::{CountRow, print_count_summary};
use mapscout::wfs::WfsClient;
use mapscout::{Config, MapServer, logging};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mapscout", version, about = "Spatial query session service for WFS layers")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON layer catalog, overrides the configured one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Feature server base URL
    #[arg(long, global = true)]
    service_url: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP session service
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Count features of some layers inside a bounding box
    Count {
        /// minx,miny,maxx,maxy in lon/lat
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// Catalog keys (name__style) or WFS type names
        #[arg(required = true)]
        layers: Vec<String>,
    },
}

fn parse_bbox(value: &str) -> anyhow::Result<GeometryExtent> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [minx, miny, maxx, maxy] => Ok(GeometryExtent::from_corners((*minx, *miny), (*maxx, *maxy))),
        _ => anyhow::bail!("bbox needs four comma separated numbers, got '{}'", value),
    }
}

fn resolve_layer(catalog: &Catalog, key: &str) -> Layer {
    if let Some(layer) = catalog.get_by_key(key).or_else(|| catalog.find_by_name(key)) {
        return layer.clone();
    }
    Layer {
        name: key.to_string(),
        style: "default".to_string(),
        title: key.to_string(),
        layer_type: LayerType::Poly,
        src: String::new(),
        query_name: None,
        min_scale: None,
        max_scale: None,
        enabled: true,
        loading: false,
    }
}

async fn count(config: Config, bbox: &str, keys: &[String]) -> anyhow::Result<()> {
    let region = Region::BBox(parse_bbox(bbox)?);
    let catalog = match &config.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::default(),
    };
    let layers: Vec<Layer> = keys.iter().map(|k| resolve_layer(&catalog, k)).collect();

    let service = Arc::new(WfsClient::new(&config)?);
    let engine = SpatialQueryEngine::new(
        &config,
        service,
        SelectionRegistry::default(),
        Notifier::default(),
    )?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]")?);
    pb.set_message(format!("Counting features in {} layers", layers.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let counts = join_all(layers.iter().map(|layer| engine.count(layer, &region))).await;
    pb.finish_and_clear();

    let rows: Vec<CountRow> = layers
        .into_iter()
        .zip(counts)
        .map(|(layer, count)| CountRow {
            layer,
            count: count.map_err(|e| e.to_string()),
        })
        .collect();
    print_count_summary(&rows, config.export_feature_ceiling);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(catalog) = cli.catalog {
        config.catalog = Some(catalog);
    }
    if let Some(service_url) = cli.service_url {
        config.service_url = service_url;
    }

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let server = MapServer::new(config)?;
            server.start().await
        }
        Command::Count { bbox, layers } => count(config, &bbox, &layers).await,
    }
}
