use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// OSM tags in the order the provider sent them.
pub type Tags = IndexMap<String, String>;

/// One WGS84 latitude/longitude sample of a recorded track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Linear interpolation in degree space, `t` in [0, 1].
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledPath {
    pub points: Vec<TrackPoint>,
    pub original_count: usize,
    pub resampled_count: usize,
    pub total_length_m: f64,
}

/// Marker styling carried by every feature rule. Colors are hex strings
/// without a leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IconStyle {
    pub icon_shape: String,
    pub border_color: String,
    pub border_width: String,
    pub text_color: String,
    pub background_color: String,
}

impl IconStyle {
    pub fn normalized(self) -> Self {
        fn strip(color: String) -> String {
            color.trim().trim_start_matches('#').to_string()
        }

        Self {
            icon_shape: self.icon_shape,
            border_color: strip(self.border_color),
            border_width: self.border_width,
            text_color: strip(self.text_color),
            background_color: strip(self.background_color),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub latitude: f64,
    pub longitude: f64,
    pub feature_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub icon_id: String,
    pub icon_style: IconStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub description: String,
    #[serde(default)]
    pub raw_tags: Tags,
}

impl Poi {
    /// Marker label: the element's own name when the rule allows it,
    /// otherwise the feature name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.feature_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiCollection {
    pub pois: Vec<Poi>,
    pub created_at: DateTime<Utc>,
    pub config_hash: String,
}

impl PoiCollection {
    pub fn new(pois: Vec<Poi>, config_hash: impl Into<String>) -> Self {
        Self {
            pois,
            created_at: Utc::now(),
            config_hash: config_hash.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    /// Buckets POIs by rule group, falling back to the feature type for
    /// ungrouped rules. Order inside a bucket follows the collection.
    pub fn grouped(&self) -> BTreeMap<&str, Vec<&Poi>> {
        let mut groups: BTreeMap<&str, Vec<&Poi>> = BTreeMap::new();
        for poi in &self.pois {
            let bucket = poi.group.as_deref().unwrap_or(&poi.feature_type);
            groups.entry(bucket).or_default().push(poi);
        }
        groups
    }
}
