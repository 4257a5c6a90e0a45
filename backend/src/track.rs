use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use geo_types::Point;
use thiserror::Error;

use crate::models::TrackPoint;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to open GPX file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("GPX document contains no track points")]
    NoPoints,
}

/// All track points of every track and segment, in document order.
pub fn read_track(reader: impl Read) -> Result<Vec<TrackPoint>, TrackError> {
    let gpx = gpx::read(reader)?;
    let points: Vec<TrackPoint> = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|waypoint| to_track_point(waypoint.point()))
        .collect();

    if points.is_empty() {
        return Err(TrackError::NoPoints);
    }
    tracing::info!("extracted {} points from GPX document", points.len());
    Ok(points)
}

pub fn read_track_file(path: impl AsRef<Path>) -> Result<Vec<TrackPoint>, TrackError> {
    let file = File::open(path)?;
    read_track(BufReader::new(file))
}

fn to_track_point(point: Point<f64>) -> TrackPoint {
    TrackPoint::new(point.y(), point.x())
}
