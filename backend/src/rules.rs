use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    cache::content_hash,
    models::{IconStyle, Tags},
};

/// Configured tag value that matches any runtime value for its key.
pub const WILDCARD: &str = "*";

const DEFAULT_ICON: &str = "info";

#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("failed to read feature configuration {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("feature configuration is not a JSON object: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("feature `{feature}` is invalid: {source}")]
    InvalidFeature {
        feature: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("feature `{feature}` has an invalid tag entry: {reason}")]
    InvalidTagEntry { feature: String, reason: String },
    #[error("tag {key}={value} is declared by both `{first}` and `{second}`")]
    DuplicateRule {
        key: String,
        value: String,
        first: String,
        second: String,
    },
    #[error("failed to canonicalize rules: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Value side of a rule: an exact tag value or the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagMatch {
    Any,
    Exact(String),
}

impl TagMatch {
    pub fn parse(value: &str) -> Self {
        if value == WILDCARD {
            TagMatch::Any
        } else {
            TagMatch::Exact(value.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            TagMatch::Any => true,
            TagMatch::Exact(expected) => expected == value,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagMatch::Any => WILDCARD,
            TagMatch::Exact(value) => value,
        }
    }
}

/// One `{tag_key: tag_value, name?, icon?, group?}` item of a feature's
/// `OSM_key` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagEntry {
    pub key: String,
    pub value: TagMatch,
    pub include_name: bool,
    pub icon: Option<String>,
    pub group: Option<String>,
}

impl TagEntry {
    pub fn new(key: impl Into<String>, value: &str) -> Self {
        Self {
            key: key.into(),
            value: TagMatch::parse(value),
            include_name: false,
            icon: None,
            group: None,
        }
    }

    pub fn with_name(mut self) -> Self {
        self.include_name = true;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    fn from_json(entry: Map<String, Value>) -> Result<Self, String> {
        let mut include_name = false;
        let mut icon = None;
        let mut group = None;
        let mut pair = None;

        for (field, value) in entry {
            match field.as_str() {
                "name" => {
                    include_name = value
                        .as_bool()
                        .ok_or_else(|| format!("`name` must be a boolean, got {value}"))?;
                }
                "icon" => icon = Some(string_field("icon", value)?),
                "group" => group = Some(string_field("group", value)?),
                _ => {
                    if let Some((first, _)) = &pair {
                        return Err(format!("more than one tag pair (`{first}` and `{field}`)"));
                    }
                    let value = string_field(&field, value)?;
                    pair = Some((field, value));
                }
            }
        }

        let (key, value) = pair.ok_or_else(|| "no tag key/value pair".to_string())?;
        Ok(Self {
            key,
            value: TagMatch::parse(&value),
            include_name,
            icon,
            group,
        })
    }
}

fn string_field(field: &str, value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(format!("`{field}` must be a string, got {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDefinition {
    pub icon_prototype: IconStyle,
    pub tags: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct RawFeatureDefinition {
    icon_prototype: IconStyle,
    #[serde(rename = "OSM_key")]
    tags: Vec<Map<String, Value>>,
}

/// Features in declaration order. Order is significant: it decides which
/// rule wins when an element's tags match several.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureConfig {
    pub features: Vec<(String, FeatureDefinition)>,
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, definition: FeatureDefinition) -> Self {
        self.features.push((name.into(), definition));
        self
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RuleConfigError::Io {
            path: path.into(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses `{feature: {icon_prototype: {...}, OSM_key: [{key: value, ...}]}}`.
    pub fn from_json_str(text: &str) -> Result<Self, RuleConfigError> {
        let document: Map<String, Value> =
            serde_json::from_str(text).map_err(RuleConfigError::InvalidJson)?;

        let mut features = Vec::with_capacity(document.len());
        for (feature, value) in document {
            let raw: RawFeatureDefinition =
                serde_json::from_value(value).map_err(|source| RuleConfigError::InvalidFeature {
                    feature: feature.clone(),
                    source,
                })?;
            let tags = raw
                .tags
                .into_iter()
                .map(TagEntry::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| RuleConfigError::InvalidTagEntry {
                    feature: feature.clone(),
                    reason,
                })?;
            features.push((
                feature,
                FeatureDefinition {
                    icon_prototype: raw.icon_prototype,
                    tags,
                },
            ));
        }
        Ok(Self { features })
    }
}

/// Metadata attached to one (tag key, tag value) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRule {
    pub tag_key: String,
    pub tag_value: TagMatch,
    pub feature_name: String,
    pub icon_style: IconStyle,
    pub include_name_in_label: bool,
    pub icon_id: String,
    pub group: Option<String>,
}

#[derive(Debug, Default)]
struct KeyIndex {
    exact: HashMap<String, usize>,
    any: Option<usize>,
}

/// Immutable lookup table from tag pairs to feature rules, in declaration
/// order. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct FeatureRuleTable {
    rules: Vec<FeatureRule>,
    index: HashMap<String, KeyIndex>,
    config_hash: String,
}

impl FeatureRuleTable {
    /// Flattens the configuration into rules. A tag pair claimed twice is a
    /// configuration error rather than a silent overwrite.
    pub fn build(config: &FeatureConfig) -> Result<Self, RuleConfigError> {
        let mut rules: Vec<FeatureRule> = Vec::new();
        let mut index: HashMap<String, KeyIndex> = HashMap::new();

        for (feature_name, definition) in &config.features {
            let icon_style = definition.icon_prototype.clone().normalized();
            for entry in &definition.tags {
                let slot = index.entry(entry.key.clone()).or_default();
                let existing = match &entry.value {
                    TagMatch::Any => slot.any,
                    TagMatch::Exact(value) => slot.exact.get(value).copied(),
                };
                if let Some(previous) = existing {
                    return Err(RuleConfigError::DuplicateRule {
                        key: entry.key.clone(),
                        value: entry.value.as_str().to_string(),
                        first: rules[previous].feature_name.clone(),
                        second: feature_name.clone(),
                    });
                }

                let position = rules.len();
                match &entry.value {
                    TagMatch::Any => slot.any = Some(position),
                    TagMatch::Exact(value) => {
                        slot.exact.insert(value.clone(), position);
                    }
                }
                rules.push(FeatureRule {
                    tag_key: entry.key.clone(),
                    tag_value: entry.value.clone(),
                    feature_name: feature_name.clone(),
                    icon_style: icon_style.clone(),
                    include_name_in_label: entry.include_name,
                    icon_id: entry.icon.clone().unwrap_or_else(|| DEFAULT_ICON.to_string()),
                    group: entry.group.clone(),
                });
            }
        }

        let canonical = serde_json::to_vec(&rules).map_err(RuleConfigError::Serialize)?;
        let config_hash = content_hash(&canonical);
        tracing::info!(
            "built {} feature rules from {} features (config hash {})",
            rules.len(),
            config.features.len(),
            config_hash
        );

        Ok(Self {
            rules,
            index,
            config_hash,
        })
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule for a single tag. When both an exact rule and a `key=*` rule
    /// apply, the one declared first wins.
    pub fn lookup(&self, tag_key: &str, tag_value: &str) -> Option<&FeatureRule> {
        let slot = self.index.get(tag_key)?;
        let exact = slot.exact.get(tag_value).copied();
        let position = match (exact, slot.any) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };
        self.rules.get(position)
    }

    /// First rule, in declaration order, matched by any of `tags`.
    pub fn classify(&self, tags: &Tags) -> Option<&FeatureRule> {
        if tags.is_empty() {
            return None;
        }
        self.rules.iter().find(|rule| {
            tags.get(&rule.tag_key)
                .is_some_and(|value| rule.tag_value.matches(value))
        })
    }

    /// Tag values grouped by key, keys in first-declaration order. A key with
    /// a wildcard rule maps to `[TagMatch::Any]` alone since it subsumes the
    /// exact values.
    pub fn values_by_key(&self) -> Vec<(&str, Vec<&TagMatch>)> {
        let mut grouped: Vec<(&str, Vec<&TagMatch>)> = Vec::new();
        for rule in &self.rules {
            let position = match grouped.iter().position(|(key, _)| *key == rule.tag_key) {
                Some(position) => position,
                None => {
                    grouped.push((rule.tag_key.as_str(), Vec::new()));
                    grouped.len() - 1
                }
            };
            grouped[position].1.push(&rule.tag_value);
        }
        for (_, values) in &mut grouped {
            if values.iter().any(|value| **value == TagMatch::Any) {
                values.retain(|value| **value == TagMatch::Any);
                values.truncate(1);
            }
        }
        grouped
    }

    /// Feature names in declaration order, without repeats.
    pub fn feature_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !names.contains(&rule.feature_name.as_str()) {
                names.push(&rule.feature_name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(background: &str) -> IconStyle {
        IconStyle {
            icon_shape: "marker".into(),
            border_color: "#FFFFFF".into(),
            border_width: "2".into(),
            text_color: "#000000".into(),
            background_color: background.into(),
        }
    }

    fn feature(background: &str, tags: Vec<TagEntry>) -> FeatureDefinition {
        FeatureDefinition {
            icon_prototype: style(background),
            tags,
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn shop_config(bakery_first: bool) -> FeatureConfig {
        let bakery = ("Bakery", feature("#FFA500", vec![TagEntry::new("shop", "bakery")]));
        let shop = ("Shop", feature("#808080", vec![TagEntry::new("shop", "*")]));
        let (first, second) = if bakery_first { (bakery, shop) } else { (shop, bakery) };
        FeatureConfig::new()
            .with_feature(first.0, first.1)
            .with_feature(second.0, second.1)
    }

    const SAMPLE: &str = r##"{
        "Restroom": {
            "icon_prototype": {"icon_shape": "marker", "border_color": "#FFFFFF",
                "border_width": "2", "text_color": "#000000", "background_color": "#1E90FF"},
            "OSM_key": [
                {"amenity": "toilets", "icon": "restroom"},
                {"building": "toilets", "name": true, "group": "Facilities"}
            ]
        },
        "Water": {
            "icon_prototype": {"icon_shape": "circle", "border_color": "FFFFFF",
                "border_width": "1", "text_color": "FFFFFF", "background_color": "0000FF"},
            "OSM_key": [{"amenity": "drinking_water"}]
        }
    }"##;

    #[test]
    fn parses_json_configuration_in_order() {
        let config = FeatureConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.features.len(), 2);
        assert_eq!(config.features[0].0, "Restroom");
        let entries = &config.features[0].1.tags;
        assert_eq!(entries[0].key, "amenity");
        assert_eq!(entries[0].value, TagMatch::Exact("toilets".into()));
        assert_eq!(entries[0].icon.as_deref(), Some("restroom"));
        assert!(entries[1].include_name);
        assert_eq!(entries[1].group.as_deref(), Some("Facilities"));
    }

    #[test]
    fn built_rules_carry_metadata() {
        let table = FeatureRuleTable::build(&FeatureConfig::from_json_str(SAMPLE).unwrap()).unwrap();
        assert_eq!(table.len(), 3);

        let rule = table.lookup("amenity", "toilets").unwrap();
        assert_eq!(rule.feature_name, "Restroom");
        assert_eq!(rule.icon_id, "restroom");
        assert_eq!(rule.icon_style.background_color, "1E90FF");
        assert!(!rule.include_name_in_label);

        let water = table.lookup("amenity", "drinking_water").unwrap();
        assert_eq!(water.icon_id, "info");
        assert_eq!(water.group, None);
        assert!(table.lookup("amenity", "bench").is_none());
        assert!(table.lookup("shop", "toilets").is_none());
    }

    #[test]
    fn entry_without_tag_pair_is_rejected() {
        let text = r#"{"Broken": {"icon_prototype": {"icon_shape": "m", "border_color": "F",
            "border_width": "1", "text_color": "F", "background_color": "F"},
            "OSM_key": [{"name": true}]}}"#;
        let err = FeatureConfig::from_json_str(text).unwrap_err();
        assert!(matches!(err, RuleConfigError::InvalidTagEntry { ref feature, .. } if feature == "Broken"));
    }

    #[test]
    fn entry_with_two_tag_pairs_is_rejected() {
        let text = r#"{"Broken": {"icon_prototype": {"icon_shape": "m", "border_color": "F",
            "border_width": "1", "text_color": "F", "background_color": "F"},
            "OSM_key": [{"amenity": "toilets", "shop": "bakery"}]}}"#;
        assert!(matches!(
            FeatureConfig::from_json_str(text),
            Err(RuleConfigError::InvalidTagEntry { .. })
        ));
    }

    #[test]
    fn missing_icon_prototype_is_rejected() {
        let text = r#"{"Broken": {"OSM_key": [{"amenity": "toilets"}]}}"#;
        assert!(matches!(
            FeatureConfig::from_json_str(text),
            Err(RuleConfigError::InvalidFeature { .. })
        ));
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(matches!(
            FeatureConfig::from_json_str("[1, 2]"),
            Err(RuleConfigError::InvalidJson(_))
        ));
    }

    #[test]
    fn duplicate_pair_is_a_configuration_error() {
        let config = FeatureConfig::new()
            .with_feature("Restroom", feature("#1E90FF", vec![TagEntry::new("amenity", "toilets")]))
            .with_feature("Toilets", feature("#00FF00", vec![TagEntry::new("amenity", "toilets")]));
        match FeatureRuleTable::build(&config) {
            Err(RuleConfigError::DuplicateRule { key, value, first, second }) => {
                assert_eq!((key.as_str(), value.as_str()), ("amenity", "toilets"));
                assert_eq!((first.as_str(), second.as_str()), ("Restroom", "Toilets"));
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_wildcard_is_a_configuration_error() {
        let config = FeatureConfig::new()
            .with_feature("Shop", feature("#808080", vec![TagEntry::new("shop", "*")]))
            .with_feature("Store", feature("#808080", vec![TagEntry::new("shop", "*")]));
        assert!(matches!(
            FeatureRuleTable::build(&config),
            Err(RuleConfigError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn wildcard_matches_any_value() {
        let table = FeatureRuleTable::build(&shop_config(false)).unwrap();
        assert_eq!(table.lookup("shop", "florist").unwrap().feature_name, "Shop");
        assert!(table.lookup("amenity", "florist").is_none());
    }

    #[test]
    fn declaration_order_decides_between_exact_and_wildcard() {
        let bakery_first = FeatureRuleTable::build(&shop_config(true)).unwrap();
        let shop_first = FeatureRuleTable::build(&shop_config(false)).unwrap();
        let element = tags(&[("shop", "bakery"), ("name", "Chez Paul")]);

        assert_eq!(bakery_first.classify(&element).unwrap().feature_name, "Bakery");
        assert_eq!(bakery_first.lookup("shop", "bakery").unwrap().feature_name, "Bakery");
        assert_eq!(shop_first.classify(&element).unwrap().feature_name, "Shop");
        assert_eq!(shop_first.lookup("shop", "bakery").unwrap().feature_name, "Shop");
    }

    #[test]
    fn classify_follows_rule_order_not_tag_order() {
        let config = FeatureConfig::new()
            .with_feature("Water", feature("#0000FF", vec![TagEntry::new("drinking_water", "yes")]))
            .with_feature("Restroom", feature("#1E90FF", vec![TagEntry::new("amenity", "toilets")]));
        let table = FeatureRuleTable::build(&config).unwrap();
        // "amenity" sorts before "drinking_water" but Water is declared first.
        let element = tags(&[("amenity", "toilets"), ("drinking_water", "yes")]);
        assert_eq!(table.classify(&element).unwrap().feature_name, "Water");
    }

    #[test]
    fn classify_without_tags_is_none() {
        let table = FeatureRuleTable::build(&shop_config(true)).unwrap();
        assert!(table.classify(&Tags::new()).is_none());
        assert!(table.classify(&tags(&[("amenity", "bench")])).is_none());
    }

    #[test]
    fn config_hash_is_stable_across_rebuilds() {
        let a = FeatureRuleTable::build(&FeatureConfig::from_json_str(SAMPLE).unwrap()).unwrap();
        let b = FeatureRuleTable::build(&FeatureConfig::from_json_str(SAMPLE).unwrap()).unwrap();
        assert_eq!(a.config_hash(), b.config_hash());
        assert_eq!(a.config_hash().len(), 16);
    }

    #[test]
    fn config_hash_ignores_formatting_and_hash_prefixes() {
        let spaced = SAMPLE.replace("\"#FFFFFF\"", "\"FFFFFF\"");
        let a = FeatureRuleTable::build(&FeatureConfig::from_json_str(SAMPLE).unwrap()).unwrap();
        let b = FeatureRuleTable::build(&FeatureConfig::from_json_str(&spaced).unwrap()).unwrap();
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn config_hash_tracks_rule_changes() {
        let a = FeatureRuleTable::build(&shop_config(true)).unwrap();
        let b = FeatureRuleTable::build(&shop_config(false)).unwrap();
        assert_ne!(a.config_hash(), b.config_hash());

        let changed = SAMPLE.replace("drinking_water", "water_point");
        let c = FeatureRuleTable::build(&FeatureConfig::from_json_str(SAMPLE).unwrap()).unwrap();
        let d = FeatureRuleTable::build(&FeatureConfig::from_json_str(&changed).unwrap()).unwrap();
        assert_ne!(c.config_hash(), d.config_hash());
    }

    #[test]
    fn values_grouped_by_key() {
        let config = FeatureConfig::new()
            .with_feature(
                "Food",
                feature(
                    "#FFA500",
                    vec![TagEntry::new("amenity", "restaurant"), TagEntry::new("shop", "bakery")],
                ),
            )
            .with_feature("Restroom", feature("#1E90FF", vec![TagEntry::new("amenity", "toilets")]))
            .with_feature("Shop", feature("#808080", vec![TagEntry::new("shop", "*")]));
        let table = FeatureRuleTable::build(&config).unwrap();

        let grouped = table.values_by_key();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "amenity");
        let amenity: Vec<&str> = grouped[0].1.iter().map(|v| v.as_str()).collect();
        assert_eq!(amenity, vec!["restaurant", "toilets"]);
        assert_eq!(grouped[1].0, "shop");
        assert_eq!(grouped[1].1, vec![&TagMatch::Any]);

        assert_eq!(table.feature_names(), vec!["Food", "Restroom", "Shop"]);
    }
}
