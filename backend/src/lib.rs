pub mod cache;
pub mod collection;
pub mod error;
pub mod geomath;
pub mod models;
pub mod overpass;
pub mod query;
pub mod resample;
pub mod resolver;
pub mod rules;
pub mod settings;
pub mod track;
pub mod transport;

use crate::error::PipelineError;
use crate::models::{PoiCollection, ResampledPath, TrackPoint};
use crate::overpass::OverpassGateway;
use crate::resample::resample;
use crate::resolver::PoiResolver;
use crate::transport::OverpassTransport;

#[derive(Debug, Clone)]
pub struct CorridorResult {
    pub path: ResampledPath,
    pub pois: PoiCollection,
}

/// Resamples `track`, fetches everything the gateway's rules describe within
/// `radius_m` of it (cache first) and classifies the result into POIs.
pub fn search_corridor<T: OverpassTransport>(
    track: &[TrackPoint],
    spacing_m: f64,
    radius_m: f64,
    gateway: &OverpassGateway<T>,
) -> Result<CorridorResult, PipelineError> {
    let path = resample(track, spacing_m)?;
    let body = gateway.query(&path, radius_m)?;
    let pois = PoiResolver::new(gateway.rules()).resolve_response(&body)?;
    tracing::info!(
        "corridor search found {} POIs along {:.2} km",
        pois.len(),
        path.total_length_m / 1000.0
    );
    Ok(CorridorResult { path, pois })
}
