use thiserror::Error;

use crate::{
    models::{OverpassResponse, Poi, PoiCollection, RawGeoElement, Tags},
    rules::FeatureRuleTable,
};

const DESCRIPTION_SEPARATOR: &str = "\n";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("overpass response is not valid JSON: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Turns raw Overpass elements into POIs using a rule table.
#[derive(Debug, Clone, Copy)]
pub struct PoiResolver<'a> {
    rules: &'a FeatureRuleTable,
}

impl<'a> PoiResolver<'a> {
    pub fn new(rules: &'a FeatureRuleTable) -> Self {
        Self { rules }
    }

    /// `None` when the element has no usable position, no tags, or no tag
    /// matching a rule.
    pub fn resolve(&self, element: &RawGeoElement) -> Option<Poi> {
        let position = element.position()?;
        let rule = self.rules.classify(&element.tags)?;

        let display_name = if rule.include_name_in_label {
            element.tags.get("name").cloned()
        } else {
            None
        };

        Some(Poi {
            latitude: position.lat,
            longitude: position.lon,
            feature_type: rule.feature_name.clone(),
            display_name,
            icon_id: rule.icon_id.clone(),
            icon_style: rule.icon_style.clone(),
            group: rule.group.clone(),
            description: describe(&element.tags),
            raw_tags: element.tags.clone(),
        })
    }

    /// Resolves every element of an Overpass JSON response. Elements that
    /// fail to decode are logged and skipped.
    pub fn resolve_response(&self, body: &[u8]) -> Result<PoiCollection, ResolveError> {
        let response: OverpassResponse = serde_json::from_slice(body)?;
        let total = response.elements.len();

        let mut pois = Vec::new();
        for value in response.elements {
            match serde_json::from_value::<RawGeoElement>(value) {
                Ok(element) => pois.extend(self.resolve(&element)),
                Err(err) => tracing::warn!("skipping malformed overpass element: {}", err),
            }
        }

        tracing::info!("resolved {} POIs from {} elements", pois.len(), total);
        Ok(PoiCollection::new(pois, self.rules.config_hash()))
    }
}

/// `key: value` lines, `name` first, the rest in provider order.
fn describe(tags: &Tags) -> String {
    let name = tags.get("name").map(|name| format!("name: {name}"));
    name.into_iter()
        .chain(
            tags.iter()
                .filter(|(key, _)| key.as_str() != "name")
                .map(|(key, value)| format!("{key}: {value}")),
        )
        .collect::<Vec<_>>()
        .join(DESCRIPTION_SEPARATOR)
}
