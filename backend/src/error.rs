use thiserror::Error;

use crate::{overpass::OverpassError, resample::ResampleError, resolver::ResolveError};

/// Failures that abort a whole corridor search.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to resample track: {0}")]
    Resample(#[from] ResampleError),
    #[error("overpass query failed: {0}")]
    Overpass(#[from] OverpassError),
    #[error("failed to resolve POIs: {0}")]
    Resolve(#[from] ResolveError),
}
