use crate::model::{
    topic_level, topic_prefix, Availability, Component, DiagnosticKind, EntityCategory,
    ModelError, SensorDiscovery, SensorUndiscovery,
};

/// What kind of entity a [`SensorDescriptor`] describes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorKind {
    /// A measured quantity, reported through the device's state topic.
    Ordinary,
    /// A host fact, reported through `attributes_topic`.
    Diagnostic {
        kind: DiagnosticKind,
        attributes_topic: String,
    },
}

/// Describes one measured quantity and its discovery metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorDescriptor {
    name: String,
    device_class: Option<String>,
    units: Option<String>,
    unique_id: String,
    kind: SensorKind,
    availability: Availability,
    discovery: SensorDiscovery,
    undiscovery: SensorUndiscovery,
}

impl SensorDescriptor {
    /// Create an ordinary sensor.
    ///
    /// The unique id is `{name}_{device_class}`, the availability topic
    /// `{basename}/{name}/availability`.
    pub fn new(
        units: impl Into<String>,
        name: impl Into<String>,
        basename: impl AsRef<str>,
        device_class: impl AsRef<str>,
        expire_after: u64,
    ) -> Result<Self, ModelError> {
        let name = topic_level("name", name.into())?;
        let basename = topic_prefix("basename", basename.as_ref().to_string())?;
        let device_class = required("device_class", device_class.as_ref().to_string())?;
        let units = Some(units.into()).filter(|units| !units.is_empty());

        let unique_id = format!("{name}_{device_class}");
        let availability = Availability::new(format!("{basename}/{name}/availability"));

        let discovery = build_payload(
            &SensorKind::Ordinary,
            &unique_id,
            Some(&device_class),
            units.as_deref(),
            Some(expire_after),
            &availability,
        );

        Ok(Self {
            name,
            device_class: Some(device_class),
            units,
            unique_id,
            kind: SensorKind::Ordinary,
            availability,
            discovery,
            undiscovery: SensorUndiscovery {
                platform: Component::Sensor,
            },
        })
    }

    /// Create one of the built-in diagnostic sensors of the device `device_name`.
    pub fn diagnostic(
        kind: DiagnosticKind,
        device_name: impl AsRef<str>,
        basename: impl AsRef<str>,
    ) -> Result<Self, ModelError> {
        let device_name = topic_level("name", device_name.as_ref().to_string())?;
        let basename = topic_prefix("basename", basename.as_ref().to_string())?;

        let name = format!("{device_name}_{kind}");
        let unique_id = format!("{name}_diagnostic");
        let availability = Availability::new(format!("{basename}/{name}/availability"));
        let device_class = kind.device_class().map(|class| class.to_string());
        let units = kind.units().map(ToString::to_string);
        let kind = SensorKind::Diagnostic {
            kind,
            attributes_topic: format!("{basename}/{device_name}/diagnostics/state"),
        };

        let discovery = build_payload(
            &kind,
            &unique_id,
            device_class.as_deref(),
            units.as_deref(),
            None,
            &availability,
        );

        Ok(Self {
            name,
            device_class,
            units,
            unique_id,
            kind,
            availability,
            discovery,
            undiscovery: SensorUndiscovery {
                platform: Component::Sensor,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn kind(&self) -> &SensorKind {
        &self.kind
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self.kind, SensorKind::Diagnostic { .. })
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn availability_topic(&self) -> &str {
        &self.availability.topic
    }

    /// Topic receiving the diagnostic facts, only set for diagnostic sensors.
    pub fn json_attributes_topic(&self) -> Option<&str> {
        self.discovery.json_attributes_topic.as_deref()
    }

    pub fn discovery_payload(&self) -> &SensorDiscovery {
        &self.discovery
    }

    pub fn undiscovery_payload(&self) -> &SensorUndiscovery {
        &self.undiscovery
    }

    /// Encode the discovery payload as JSON.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.discovery)
    }
}

fn required(field: &'static str, value: String) -> Result<String, ModelError> {
    if value.trim().is_empty() {
        Err(ModelError::MissingField(field))
    } else {
        Ok(value)
    }
}

fn build_payload(
    kind: &SensorKind,
    unique_id: &str,
    device_class: Option<&str>,
    units: Option<&str>,
    expire_after: Option<u64>,
    availability: &Availability,
) -> SensorDiscovery {
    let mut payload = SensorDiscovery {
        platform: Component::Sensor,
        device_class: device_class.map(ToString::to_string),
        unique_id: unique_id.to_string(),
        expire_after,
        unit_of_measurement: units.map(ToString::to_string),
        value_template: String::new(),
        availability: availability.clone(),
        name: None,
        entity_category: None,
        state_topic: None,
        json_attributes_topic: None,
        json_attributes_template: None,
    };

    match kind {
        SensorKind::Ordinary => {
            payload.value_template =
                format!("{{{{ value_json.{} }}}}", device_class.unwrap_or_default());
        }
        SensorKind::Diagnostic {
            kind,
            attributes_topic,
        } => {
            payload.value_template = format!("{{{{ value_json.{kind} }}}}");
            payload.name = Some(kind.label().to_string());
            payload.entity_category = Some(EntityCategory::Diagnostic);
            payload.state_topic = Some(attributes_topic.clone());
            payload.json_attributes_topic = Some(attributes_topic.clone());
            payload.json_attributes_template = Some(
                r#"{"Status": "{{ value_json.status }}", "CPU Temperature": "{{ value_json.cpu_temperature }}", "Version": "{{ value_json.version }}"}"#
                    .to_string(),
            );
        }
    }

    payload
}
