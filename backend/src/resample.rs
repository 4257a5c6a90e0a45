use thiserror::Error;

use crate::{
    geomath::cumulative_distances_m,
    models::{ResampledPath, TrackPoint},
};

/// Upper bound on the resampled point count.
pub const MAX_RESAMPLED_POINTS: usize = 1_000_000;

#[derive(Debug, Error, PartialEq)]
pub enum ResampleError {
    #[error("track contains no points")]
    EmptyPath,
    #[error("point spacing must be a positive number of meters, got {0}")]
    InvalidSpacing(f64),
    #[error(
        "spacing of {spacing_m} m over {total_length_m:.0} m exceeds {} points",
        MAX_RESAMPLED_POINTS
    )]
    TooManyPoints { spacing_m: f64, total_length_m: f64 },
}

/// Resamples `points` to roughly `spacing_m` meters between consecutive
/// samples along the track's arc length.
///
/// The output has `max(2, floor(total_length / spacing_m))` points, evenly
/// spaced in normalized arc length, and always starts and ends on the
/// original endpoints. Latitude and longitude are interpolated independently
/// (linear in degree space), which is accurate enough at corridor scale.
///
/// A track of zero length (a single point or repeated copies of one point)
/// is returned unchanged.
pub fn resample(points: &[TrackPoint], spacing_m: f64) -> Result<ResampledPath, ResampleError> {
    if points.is_empty() {
        return Err(ResampleError::EmptyPath);
    }
    if !(spacing_m.is_finite() && spacing_m > 0.0) {
        return Err(ResampleError::InvalidSpacing(spacing_m));
    }

    let cumulative = cumulative_distances_m(points);
    let total_length_m = cumulative[cumulative.len() - 1];

    if total_length_m == 0.0 {
        tracing::debug!(
            "track of {} point(s) has zero length; returning it unchanged",
            points.len()
        );
        return Ok(ResampledPath {
            points: points.to_vec(),
            original_count: points.len(),
            resampled_count: points.len(),
            total_length_m,
        });
    }

    let normalized: Vec<f64> = cumulative.iter().map(|d| d / total_length_m).collect();
    let requested = (total_length_m / spacing_m).floor();
    if requested > MAX_RESAMPLED_POINTS as f64 {
        return Err(ResampleError::TooManyPoints {
            spacing_m,
            total_length_m,
        });
    }
    let target_count = (requested as usize).max(2);

    let mut resampled = Vec::with_capacity(target_count);
    let mut segment = 0;
    let last = (target_count - 1) as f64;
    for i in 0..target_count {
        let fraction = i as f64 / last;
        while segment + 1 < normalized.len() - 1 && normalized[segment + 1] < fraction {
            segment += 1;
        }
        resampled.push(interpolate_at(points, &normalized, segment, fraction));
    }

    // Endpoints are exact, never the product of float rounding.
    resampled[0] = points[0];
    resampled[target_count - 1] = points[points.len() - 1];

    tracing::info!(
        "resampled track from {} to {} points over {:.2} km",
        points.len(),
        target_count,
        total_length_m / 1000.0
    );

    Ok(ResampledPath {
        points: resampled,
        original_count: points.len(),
        resampled_count: target_count,
        total_length_m,
    })
}

fn interpolate_at(
    points: &[TrackPoint],
    normalized: &[f64],
    segment: usize,
    fraction: f64,
) -> TrackPoint {
    let (start, end) = (normalized[segment], normalized[segment + 1]);
    let span = end - start;
    if span <= 0.0 {
        return points[segment + 1];
    }
    let t = ((fraction - start) / span).clamp(0.0, 1.0);
    points[segment].interpolate(points[segment + 1], t)
}
