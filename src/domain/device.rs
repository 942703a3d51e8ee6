// Device, group and property metadata
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Identifies one aggregated series: a property of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub device_id: String,
    pub property_id: String,
}

impl SeriesKey {
    pub fn new(device_id: impl Into<String>, property_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            property_id: property_id.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.property_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub property_ids: Vec<String>,
}

impl DeviceRef {
    pub fn series_keys(&self) -> impl Iterator<Item = SeriesKey> + '_ {
        self.property_ids
            .iter()
            .map(|pid| SeriesKey::new(self.id.clone(), pid.clone()))
    }
}

/// A floor, room or any other grouping of devices in the building model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub groups: Vec<DeviceGroup>,
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
}

impl DeviceGroup {
    /// Every device below this group, depth first.
    pub fn collect_devices<'a>(&'a self, out: &mut Vec<&'a DeviceRef>) {
        out.extend(self.devices.iter());
        for group in &self.groups {
            group.collect_devices(out);
        }
    }
}

/// Read-only group tree supplied by the data source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceTree {
    #[serde(default)]
    pub groups: Vec<DeviceGroup>,
}

impl DeviceTree {
    pub fn new(groups: Vec<DeviceGroup>) -> Self {
        Self { groups }
    }

    /// Breadth-first search for a group by id.
    pub fn find_group(&self, group_id: &str) -> Option<&DeviceGroup> {
        let mut queue: VecDeque<&DeviceGroup> = self.groups.iter().collect();
        while let Some(group) = queue.pop_front() {
            if group.id == group_id {
                return Some(group);
            }
            queue.extend(group.groups.iter());
        }
        None
    }

    pub fn find_device(&self, device_id: &str) -> Option<&DeviceRef> {
        self.all_devices().into_iter().find(|d| d.id == device_id)
    }

    /// Devices under the given group; empty when the group is unknown.
    pub fn devices_in_group(&self, group_id: &str) -> Vec<&DeviceRef> {
        let mut devices = Vec::new();
        if let Some(group) = self.find_group(group_id) {
            group.collect_devices(&mut devices);
        }
        devices
    }

    /// Devices across every top-level group.
    pub fn all_devices(&self) -> Vec<&DeviceRef> {
        let mut devices = Vec::new();
        for group in &self.groups {
            group.collect_devices(&mut devices);
        }
        devices
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Metadata about a measured property (temperature, CO2, ...).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceProperty {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_unit: String,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
}

const FALLBACK_RANGE: ValueRange = ValueRange { min: 0.0, max: 100.0 };
const FALLBACK_UNIT: &str = "%";

impl DeviceProperty {
    pub fn new(id: &str, data_unit: &str, range_min: f64, range_max: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            data_unit: data_unit.to_string(),
            range_min: Some(range_min),
            range_max: Some(range_max),
        }
    }

    fn declared_range(&self) -> Option<ValueRange> {
        match (self.range_min, self.range_max) {
            (Some(min), Some(max)) if !min.is_nan() && !max.is_nan() => {
                Some(ValueRange::new(min, max))
            }
            _ => None,
        }
    }

    pub fn has_declared_range(&self) -> bool {
        self.declared_range().is_some()
    }

    /// Declared range, or 0..100 when the device model does not specify one.
    pub fn effective_range(&self) -> ValueRange {
        self.declared_range().unwrap_or_else(|| {
            tracing::warn!(
                "rangeMin/rangeMax for {} not specified, falling back to {}..{}",
                self.id,
                FALLBACK_RANGE.min,
                FALLBACK_RANGE.max
            );
            FALLBACK_RANGE
        })
    }

    /// Unit as shown to users: "celsius" becomes "°C" and so on.
    pub fn display_unit(&self) -> String {
        if !self.has_declared_range() {
            return FALLBACK_UNIT.to_string();
        }
        match self.data_unit.to_lowercase().as_str() {
            "celsius" => "°C".to_string(),
            "fahrenheit" => "°F".to_string(),
            _ => self.data_unit.clone(),
        }
    }
}

/// Everything the engine needs to know about the building's devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    pub tree: DeviceTree,
    properties: BTreeMap<String, DeviceProperty>,
}

impl DeviceCatalog {
    pub fn new(tree: DeviceTree, properties: Vec<DeviceProperty>) -> Self {
        let properties = properties.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self { tree, properties }
    }

    pub fn property(&self, property_id: &str) -> Option<&DeviceProperty> {
        self.properties.get(property_id)
    }

    pub fn properties(&self) -> impl Iterator<Item = &DeviceProperty> {
        self.properties.values()
    }

    /// Unit shown next to a property's values; "%" for unknown properties.
    pub fn unit_for(&self, property_id: &str) -> String {
        self.property(property_id)
            .map(|p| p.display_unit())
            .unwrap_or_else(|| FALLBACK_UNIT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceRef {
        DeviceRef {
            id: id.to_string(),
            name: id.to_string(),
            property_ids: vec!["temp".to_string(), "co2".to_string()],
        }
    }

    fn sample_tree() -> DeviceTree {
        DeviceTree::new(vec![
            DeviceGroup {
                id: "floor-1".to_string(),
                name: "Floor 1".to_string(),
                groups: vec![DeviceGroup {
                    id: "room-101".to_string(),
                    name: "Room 101".to_string(),
                    groups: vec![],
                    devices: vec![device("d1"), device("d2")],
                }],
                devices: vec![device("d0")],
            },
            DeviceGroup {
                id: "floor-2".to_string(),
                name: "Floor 2".to_string(),
                groups: vec![],
                devices: vec![device("d3")],
            },
        ])
    }

    #[test]
    fn test_find_nested_group() {
        let tree = sample_tree();
        assert_eq!(tree.find_group("room-101").unwrap().name, "Room 101");
        assert!(tree.find_group("room-999").is_none());
    }

    #[test]
    fn test_devices_in_group_is_recursive() {
        let tree = sample_tree();
        let ids: Vec<&str> = tree
            .devices_in_group("floor-1")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["d0", "d1", "d2"]);
        assert!(tree.devices_in_group("missing").is_empty());
    }

    #[test]
    fn test_all_devices_spans_top_level_groups() {
        let tree = sample_tree();
        assert_eq!(tree.all_devices().len(), 4);
        assert_eq!(tree.find_device("d3").unwrap().id, "d3");
    }

    #[test]
    fn test_display_unit_and_fallback_range() {
        let temp = DeviceProperty::new("temp", "Celsius", 15.0, 30.0);
        assert_eq!(temp.display_unit(), "°C");
        assert_eq!(temp.effective_range(), ValueRange::new(15.0, 30.0));

        let humidity = DeviceProperty {
            id: "humidity".to_string(),
            name: "Humidity".to_string(),
            data_unit: "ppm".to_string(),
            range_min: None,
            range_max: Some(80.0),
        };
        assert_eq!(humidity.effective_range(), ValueRange::new(0.0, 100.0));
        assert_eq!(humidity.display_unit(), "%");
    }

    #[test]
    fn test_catalog_unit_for_unknown_property() {
        let catalog = DeviceCatalog::new(
            sample_tree(),
            vec![DeviceProperty::new("temp", "fahrenheit", 50.0, 90.0)],
        );
        assert_eq!(catalog.unit_for("temp"), "°F");
        assert_eq!(catalog.unit_for("co2"), "%");
    }
}
