use std::{path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::overpass::{GatewayConfig, DEFAULT_ENDPOINT};

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("invalid value `{value}` for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings for a corridor search.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub overpass_endpoint: String,
    pub query_timeout: Duration,
    pub radius_m: f64,
    /// Distance between resampled points; half the radius when unset.
    pub spacing_m: Option<f64>,
    pub cache_dir: PathBuf,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_on_bad_request: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overpass_endpoint: DEFAULT_ENDPOINT.to_string(),
            query_timeout: Duration::from_secs(180),
            radius_m: 1000.0,
            spacing_m: None,
            cache_dir: PathBuf::from("cache"),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            retry_on_bad_request: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Overlays variables returned by `lookup` on the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Some(endpoint) = lookup("OVERPASS_ENDPOINT") {
            settings.overpass_endpoint = endpoint;
        }
        if let Some(secs) = parse::<u64>(&lookup, "OVERPASS_TIMEOUT_SECS")? {
            settings.query_timeout = Duration::from_secs(secs);
        }
        if let Some(radius) = parse::<f64>(&lookup, "CORRIDOR_RADIUS_M")? {
            settings.radius_m = positive("CORRIDOR_RADIUS_M", radius)?;
        }
        if let Some(spacing) = parse::<f64>(&lookup, "CORRIDOR_SPACING_M")? {
            settings.spacing_m = Some(positive("CORRIDOR_SPACING_M", spacing)?);
        }
        if let Some(dir) = lookup("CORRIDOR_CACHE_DIR") {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Some(retries) = parse::<u32>(&lookup, "OVERPASS_MAX_RETRIES")? {
            settings.max_retries = retries;
        }
        if let Some(secs) = parse::<u64>(&lookup, "OVERPASS_RETRY_DELAY_SECS")? {
            settings.retry_delay = Duration::from_secs(secs);
        }
        if let Some(flag) = parse::<bool>(&lookup, "OVERPASS_RETRY_ON_BAD_REQUEST")? {
            settings.retry_on_bad_request = flag;
        }

        Ok(settings)
    }

    /// Applies command-line radius and spacing, validated like their
    /// environment counterparts.
    pub fn override_lengths(
        &mut self,
        radius_m: Option<f64>,
        spacing_m: Option<f64>,
    ) -> Result<(), SettingsError> {
        if let Some(radius) = radius_m {
            self.radius_m = positive("--radius", radius)?;
        }
        if let Some(spacing) = spacing_m {
            self.spacing_m = Some(positive("--spacing", spacing)?);
        }
        Ok(())
    }

    pub fn effective_spacing_m(&self) -> f64 {
        self.spacing_m.unwrap_or(self.radius_m * 0.5)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            endpoint: self.overpass_endpoint.clone(),
            query_timeout: self.query_timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            retry_on_bad_request: self.retry_on_bad_request,
        }
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|err| SettingsError::Invalid {
                name,
                value: value.clone(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

fn positive(name: &'static str, value: f64) -> Result<f64, SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SettingsError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be a positive number of meters".into(),
        })
    }
}
