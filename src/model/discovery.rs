use crate::model::{Component, EntityCategory};
use std::collections::BTreeMap;

// also see: https://www.home-assistant.io/integrations/mqtt/#device-discovery-payload

pub const PAYLOAD_AVAILABLE: &str = "Available";
pub const PAYLOAD_NOT_AVAILABLE: &str = "Unavailable";

/// Availability block of a sensor's discovery payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Availability {
    pub payload_available: String,
    pub payload_not_available: String,
    pub topic: String,
    pub value_template: String,
}

impl Availability {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            payload_available: PAYLOAD_AVAILABLE.to_string(),
            payload_not_available: PAYLOAD_NOT_AVAILABLE.to_string(),
            topic: topic.into(),
            value_template: "{{ value_json.availability }}".to_string(),
        }
    }

    /// The message announcing the sensor as available.
    pub fn available(&self) -> serde_json::Value {
        serde_json::json!({ "availability": self.payload_available })
    }

    /// The message announcing the sensor as gone.
    pub fn not_available(&self) -> serde_json::Value {
        serde_json::json!({ "availability": self.payload_not_available })
    }
}

/// Discovery payload of a single sensor component.
///
/// Field order is the serialization order, which keeps the encoded payload stable.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SensorDiscovery {
    pub platform: Component,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    pub unique_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    pub value_template: String,

    pub availability: Availability,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_attributes_template: Option<String>,
}

/// Stub used in place of a component's payload to retract it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SensorUndiscovery {
    pub platform: Component,
}

/// Device block of a device discovery payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Device {
    pub hw_version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,

    pub manufacturer: String,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    pub name: String,

    pub serial_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// The application that is the origin of the discovered items.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Origin {
    pub name: String,

    #[serde(alias = "sw")]
    pub sw_version: String,

    #[serde(alias = "url")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_url: Option<String>,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
            support_url: None,
        }
    }
}

/// Device discovery message, generic over the per-component payload.
///
/// A missing `components` map retracts the whole device.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DeviceDiscovery<C> {
    pub device: Device,
    pub origin: Origin,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<BTreeMap<String, C>>,

    pub state_topic: String,
    pub qos: u8,
}
