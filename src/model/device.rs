use crate::environment::HardwareEnvironment;
use crate::model::{
    topic_level, topic_prefix, Device, DeviceDiscovery, DiagnosticKind, ModelError, Origin,
    SensorDescriptor, SensorDiscovery, SensorUndiscovery,
};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// Optional settings of a [`DeviceAggregate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Discovery prefix, defaults to `homeassistant`.
    pub base_name: Option<String>,
    pub model_id: Option<String>,
    pub suggested_area: Option<String>,
    pub support_url: Option<String>,
    pub sw_version: Option<String>,
    pub qos: u8,
}

/// A discoverable device, grouping its sensors and the built-in diagnostic sensors.
#[derive(Clone, Debug)]
pub struct DeviceAggregate {
    sensors: Vec<SensorDescriptor>,
    state_topic: String,
    qos: u8,
    discovery_topic: String,
    diagnostics_topic: String,
    discovery: DeviceDiscovery<SensorDiscovery>,
    component_undiscovery: DeviceDiscovery<SensorUndiscovery>,
    device_undiscovery: DeviceDiscovery<SensorUndiscovery>,
}

impl DeviceAggregate {
    pub fn new(
        sensors: Vec<SensorDescriptor>,
        name: impl Into<String>,
        state_topic: impl Into<String>,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        options: DeviceOptions,
        environment: &dyn HardwareEnvironment,
    ) -> Result<Self, ModelError> {
        if sensors.is_empty() {
            return Err(ModelError::NoSensors);
        }
        let name = topic_level("name", name.into())?;
        let basename = topic_prefix(
            "base_name",
            options
                .base_name
                .unwrap_or_else(|| "homeassistant".to_string()),
        )?;
        let state_topic = topic_prefix("state_topic", state_topic.into())?;

        let mut sensors = sensors;
        for kind in DiagnosticKind::iter() {
            sensors.push(SensorDescriptor::diagnostic(kind, &name, &basename)?);
        }

        let mut serial_number = environment.object_id();
        if serial_number.is_empty() {
            log::warn!("No hardware identifier available, using the device name '{name}' as serial number");
            serial_number = name.clone();
        }
        let serial_number = serial_number.replace(|c: char| !c.is_ascii_alphanumeric(), "_");

        let device = Device {
            hw_version: environment.cpu_model(),
            identifiers: vec![name.clone()],
            manufacturer: manufacturer.into(),
            model: model.into(),
            model_id: options.model_id,
            name: name.clone(),
            serial_number: serial_number.clone(),
            suggested_area: options.suggested_area,
            sw_version: options.sw_version,
        };
        let origin = Origin {
            support_url: options.support_url,
            ..Default::default()
        };

        let discovery = DeviceDiscovery {
            device: device.clone(),
            origin: origin.clone(),
            components: Some(
                sensors
                    .iter()
                    .map(|s| (s.unique_id().to_string(), s.discovery_payload().clone()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            state_topic: state_topic.clone(),
            qos: options.qos,
        };
        let component_undiscovery = DeviceDiscovery {
            device: device.clone(),
            origin: origin.clone(),
            components: Some(
                sensors
                    .iter()
                    .map(|s| (s.unique_id().to_string(), s.undiscovery_payload().clone()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            state_topic: state_topic.clone(),
            qos: options.qos,
        };
        let device_undiscovery = DeviceDiscovery {
            device,
            origin,
            components: None,
            state_topic: state_topic.clone(),
            qos: options.qos,
        };

        Ok(Self {
            sensors,
            discovery_topic: format!("{basename}/device/{serial_number}/config"),
            diagnostics_topic: format!("{basename}/{name}/diagnostics/state"),
            state_topic,
            qos: options.qos,
            discovery,
            component_undiscovery,
            device_undiscovery,
        })
    }

    pub fn name(&self) -> &str {
        &self.discovery.device.name
    }

    pub fn serial_number(&self) -> &str {
        &self.discovery.device.serial_number
    }

    /// All sensors, the provided ones first, followed by the diagnostic sensors.
    pub fn sensors(&self) -> &[SensorDescriptor] {
        &self.sensors
    }

    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }

    pub fn discovery_topic(&self) -> &str {
        &self.discovery_topic
    }

    pub fn diagnostics_topic(&self) -> &str {
        &self.diagnostics_topic
    }

    pub fn discovery_payload(&self) -> &DeviceDiscovery<SensorDiscovery> {
        &self.discovery
    }

    /// Retracts every component, keeping the device itself.
    pub fn component_undiscovery_payload(&self) -> &DeviceDiscovery<SensorUndiscovery> {
        &self.component_undiscovery
    }

    /// Retracts the device as a whole.
    pub fn device_undiscovery_payload(&self) -> &DeviceDiscovery<SensorUndiscovery> {
        &self.device_undiscovery
    }

    /// Encode the discovery payload as JSON.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.discovery)
    }
}
