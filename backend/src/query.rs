use std::fmt::Write;

use crate::{
    models::TrackPoint,
    rules::{FeatureRuleTable, TagMatch},
};

/// Builds an Overpass QL query returning every element within `radius_m`
/// of the polyline that carries one of the table's tags. Values sharing a
/// key collapse into one anchored regex alternation; a wildcard becomes a
/// plain key-existence filter. `out center` gives ways a centroid.
///
/// Returns `None` when the table has no rules or the path no points.
pub fn build_query(
    rules: &FeatureRuleTable,
    path: &[TrackPoint],
    radius_m: f64,
    timeout_secs: u64,
) -> Option<String> {
    if rules.is_empty() || path.is_empty() {
        return None;
    }

    let polyline = path
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.lat, p.lon))
        .collect::<Vec<_>>()
        .join(",");
    let around = format!("(around:{radius_m},{polyline})");

    let mut query = format!("[out:json][timeout:{timeout_secs}];\n(\n");
    for (key, values) in rules.values_by_key() {
        let key = escape(key);
        let filter = match values.as_slice() {
            [TagMatch::Any] => format!("[\"{key}\"]"),
            [single] => format!("[\"{key}\"=\"{}\"]", escape(single.as_str())),
            many => {
                let alternation = many
                    .iter()
                    .map(|value| escape(&escape_regex(value.as_str())))
                    .collect::<Vec<_>>()
                    .join("|");
                format!("[\"{key}\"~\"^({alternation})$\"]")
            }
        };
        // Writing into a String cannot fail.
        let _ = writeln!(query, "  nwr{filter}{around};");
    }
    query.push_str(");\nout center;\n");
    Some(query)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
