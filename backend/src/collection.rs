use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::{models::PoiCollection, rules::FeatureRuleTable};

/// Writes `collection` as pretty JSON, atomically replacing `path`.
pub fn write_collection(collection: &PoiCollection, path: impl AsRef<Path>) -> Result<(), io::Error> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, collection)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.persist(path).map_err(|err| err.error)?;

    tracing::info!("saved {} POIs to {}", collection.len(), path.display());
    Ok(())
}

pub fn read_collection(path: impl AsRef<Path>) -> Result<PoiCollection, io::Error> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// True when `collection` was resolved with rules other than `rules`.
pub fn is_stale(collection: &PoiCollection, rules: &FeatureRuleTable) -> bool {
    collection.config_hash != rules.config_hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IconStyle, Poi, Tags};
    use crate::rules::{FeatureConfig, FeatureDefinition, TagEntry};

    fn style() -> IconStyle {
        IconStyle {
            icon_shape: "marker".into(),
            border_color: "FFFFFF".into(),
            border_width: "1".into(),
            text_color: "000000".into(),
            background_color: "1E90FF".into(),
        }
    }

    fn table(value: &str) -> FeatureRuleTable {
        let config = FeatureConfig::new().with_feature(
            "Restroom",
            FeatureDefinition {
                icon_prototype: style(),
                tags: vec![TagEntry::new("amenity", value)],
            },
        );
        FeatureRuleTable::build(&config).unwrap()
    }

    fn collection(config_hash: &str) -> PoiCollection {
        let poi = Poi {
            latitude: 48.0,
            longitude: 2.0,
            feature_type: "Restroom".into(),
            display_name: None,
            icon_id: "info".into(),
            icon_style: style(),
            group: None,
            description: "amenity: toilets".into(),
            raw_tags: Tags::from([("amenity".to_string(), "toilets".to_string())]),
        };
        PoiCollection::new(vec![poi], config_hash)
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("pois.json");
        let original = collection("0123456789abcdef");

        write_collection(&original, &path).unwrap();
        let loaded = read_collection(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn reading_garbage_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pois.json");
        fs::write(&path, b"{not json").unwrap();
        let err = read_collection(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn staleness_follows_rule_changes() {
        let current = table("toilets");
        let fresh = collection(current.config_hash());
        assert!(!is_stale(&fresh, &current));
        assert!(is_stale(&fresh, &table("drinking_water")));
    }
}
