use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use corridor::{
    cache::QueryCache,
    collection::write_collection,
    overpass::OverpassGateway,
    rules::{FeatureConfig, FeatureRuleTable},
    search_corridor,
    settings::Settings,
    track::read_track_file,
    transport::HttpTransport,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Find points of interest along a GPX track via the Overpass API"
)]
struct Args {
    /// GPX file holding the track to search along
    #[arg(long)]
    gpx: PathBuf,

    /// Feature configuration (JSON) mapping features to OSM tags
    #[arg(long, default_value = "backend/data/features.json")]
    features: PathBuf,

    /// Where to write the resulting POI collection (JSON)
    #[arg(long)]
    output: PathBuf,

    /// Search radius around the track in meters
    #[arg(long)]
    radius: Option<f64>,

    /// Distance between resampled track points in meters (default: radius / 2)
    #[arg(long)]
    spacing: Option<f64>,

    /// Directory for cached Overpass responses
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Delete cached responses older than this many days before querying
    #[arg(long)]
    sweep_days: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;
    settings.override_lengths(args.radius, args.spacing)?;
    if let Some(dir) = args.cache_dir {
        settings.cache_dir = dir;
    }

    let rules = Arc::new(FeatureRuleTable::build(&FeatureConfig::from_path(&args.features)?)?);
    tracing::info!("loaded feature rules from {:?}", args.features);

    let cache = QueryCache::new(&settings.cache_dir);
    if let Some(days) = args.sweep_days {
        cache.sweep_older_than(sweep_age(days))?;
    }

    let transport = HttpTransport::new(settings.query_timeout + Duration::from_secs(30))?;
    let gateway = OverpassGateway::new(transport, cache, rules, settings.gateway_config());

    let track = read_track_file(&args.gpx)?;
    let result = search_corridor(
        &track,
        settings.effective_spacing_m(),
        settings.radius_m,
        &gateway,
    )?;

    for (group, pois) in result.pois.grouped() {
        tracing::info!("{}: {} POIs", group, pois.len());
    }
    write_collection(&result.pois, &args.output)?;
    Ok(())
}

/// Age limit for `--sweep-days`; absurdly large counts mean "keep everything".
fn sweep_age(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(SECS_PER_DAY))
}
