pub mod rules;

use crate::api::endpoint::EndpointKind;
use crate::model::{Bundle, SensorMap};
use rules::{Locator, Rule, RULES};
use serde_json::Value;

/// Metadata for the device grouping downstream, read from the device-info document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub brand: String,
    pub model: Option<String>,
    pub firmware: Option<String>,
}

impl Locator {
    pub fn resolve(&self, document: &Value) -> Option<String> {
        match self {
            Locator::Field(pointer) => document.pointer(pointer).and_then(scalar),
            Locator::LastRecord(pointer) => document
                .pointer(pointer)
                .and_then(Value::as_array)
                .and_then(|records| records.last())
                .and_then(|record| record.get("value"))
                .and_then(scalar),
        }
    }
}

impl Rule {
    pub fn evaluate(&self, bundle: &Bundle) -> Option<String> {
        bundle
            .get(self.source)
            .and_then(|document| self.locator.resolve(document))
    }
}

/// Scalars are forwarded with their upstream text intact. Null, empty strings and composite
/// values resolve to nothing.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Flatten `bundle` into a sensor map. Keys whose document is missing or whose field does not
/// resolve are left out.
pub fn extract(bundle: &Bundle) -> SensorMap {
    let mut sensors = SensorMap::new();
    let mut gaps = Vec::new();

    for rule in RULES {
        match rule.evaluate(bundle) {
            Some(value) => {
                sensors.insert(rule.key.to_string(), value);
            }
            None if bundle.get(rule.source).is_some() => gaps.push(rule.key),
            None => {}
        }
    }

    if !gaps.is_empty() {
        log::debug!("Fields not resolved: {}", gaps.join(", "));
    }
    log::debug!("Extracted {}/{} sensor values", sensors.len(), RULES.len());

    sensors
}

pub fn device_metadata(bundle: &Bundle) -> DeviceMetadata {
    let info = bundle.get(EndpointKind::DeviceInfo);
    let read = |pointer: &str| info.and_then(|doc| doc.pointer(pointer)).and_then(scalar);

    DeviceMetadata {
        brand: read("/data/brand").unwrap_or_else(|| "Sunsynk".to_string()),
        model: read("/data/model"),
        firmware: read("/data/version/masterVer"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{full_bundle, read_json};
    use serde_json::json;

    #[test]
    fn values_are_forwarded_unmodified() {
        let sensors = extract(&full_bundle());

        assert_eq!(Some("76"), sensors.get("battery_soc").map(String::as_str));
        assert_eq!(Some("52.03"), sensors.get("battery_voltage").map(String::as_str));
        assert_eq!(Some("-1420"), sensors.get("battery_power").map(String::as_str));
        assert_eq!(Some("50.01"), sensors.get("grid_frequency").map(String::as_str));
        assert_eq!(Some("1281.0"), sensors.get("pv1_power").map(String::as_str));
        assert_eq!(Some("10.0"), sensors.get("day_pv_energy").map(String::as_str));
        assert_eq!(Some("SUN-5K-SG03LP1-EU"), device_metadata(&full_bundle()).model.as_deref());
    }

    #[test]
    fn true_zero_is_kept() {
        let sensors = extract(&full_bundle());
        assert_eq!(Some("0"), sensors.get("grid_power").map(String::as_str));
        assert_eq!(Some("0.0"), sensors.get("day_grid_export").map(String::as_str));
    }

    #[test]
    fn three_phase_indices() {
        let sensors = extract(&full_bundle());
        assert_eq!(Some("231.4"), sensors.get("grid_voltage").map(String::as_str));
        assert_eq!(Some("648"), sensors.get("load_l1_power").map(String::as_str));
        assert_eq!(Some("0"), sensors.get("load_l3_power").map(String::as_str));
    }

    #[test]
    fn directional_counters_map_individually() {
        let sensors = extract(&full_bundle());
        assert_eq!(Some("4.2"), sensors.get("day_battery_charge").map(String::as_str));
        assert_eq!(Some("3.1"), sensors.get("day_battery_discharge").map(String::as_str));
        assert_eq!(Some("1.3"), sensors.get("day_grid_import").map(String::as_str));
        assert_eq!(Some("0.0"), sensors.get("day_grid_export").map(String::as_str));
    }

    #[test]
    fn temperatures_use_latest_sample() {
        let sensors = extract(&full_bundle());
        assert_eq!(Some("38.1"), sensors.get("dc_temperature").map(String::as_str));
        assert_eq!(Some("44.6"), sensors.get("ac_temperature").map(String::as_str));
    }

    #[test]
    fn empty_time_series_yields_nothing() {
        let mut bundle = full_bundle();
        bundle.insert(EndpointKind::Temperature, read_json("temperature_empty.json"));
        let sensors = extract(&bundle);
        assert!(!sensors.contains_key("dc_temperature"));
        assert!(!sensors.contains_key("ac_temperature"));
    }

    #[test]
    fn absent_document_drops_its_keys_only() {
        let mut bundle = Bundle::default();
        for kind in EndpointKind::ALL.iter() {
            if *kind != EndpointKind::Load {
                bundle.insert(*kind, full_bundle().get(*kind).cloned().unwrap());
            }
        }

        let sensors = extract(&bundle);
        for key in rules::keys_from(EndpointKind::Load) {
            assert!(!sensors.contains_key(key), "{} should be absent", key);
        }
        assert!(sensors.contains_key("battery_soc"));
        assert!(sensors.contains_key("grid_power"));
    }

    #[test]
    fn nulls_and_blanks_are_gaps() {
        let mut bundle = Bundle::default();
        bundle.insert(
            EndpointKind::Battery,
            json!({"data": {"soc": null, "voltage": "", "power": 0, "temp": "  ", "type": {"a": 1}}}),
        );
        let sensors = extract(&bundle);
        assert_eq!(1, sensors.len());
        assert_eq!(Some("0"), sensors.get("battery_power").map(String::as_str));
    }

    #[test]
    fn empty_bundle_extracts_nothing() {
        assert!(extract(&Bundle::default()).is_empty());
    }

    #[test]
    fn metadata_defaults() {
        let metadata = device_metadata(&Bundle::default());
        assert_eq!("Sunsynk", metadata.brand);
        assert_eq!(None, metadata.model);
        assert_eq!(None, metadata.firmware);
    }
}
