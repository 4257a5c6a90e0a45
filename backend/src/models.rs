use serde::{Deserialize, Serialize};

pub use corridor_shared::{IconStyle, Poi, PoiCollection, ResampledPath, Tags, TrackPoint};

/// Element kinds returned by Overpass. Relations and anything newer land
/// in `Other` and are never turned into POIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// One entry of an Overpass `out center;` JSON result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeoElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Centroid supplied by the provider for ways.
    #[serde(default)]
    pub center: Option<LatLon>,
    #[serde(default)]
    pub tags: Tags,
}

impl RawGeoElement {
    /// Nodes use their own position, ways their centroid.
    pub fn position(&self) -> Option<TrackPoint> {
        let (lat, lon) = match self.kind {
            ElementKind::Node => (self.lat?, self.lon?),
            ElementKind::Way => {
                let center = self.center?;
                (center.lat?, center.lon?)
            }
            ElementKind::Other => return None,
        };
        let point = TrackPoint::new(lat, lon);
        point.is_valid().then_some(point)
    }
}

/// Top level of an Overpass JSON response. Elements stay untyped so one
/// malformed entry does not reject the whole document.
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<serde_json::Value>,
}
