use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Sensor device classes understood by Home Assistant.
///
/// Anything accepting a device class takes `impl AsRef<str>`, so plain strings work for classes
/// not listed here.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Debug,
    AsRefStr,
    Display,
    EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorClass {
    AtmosphericPressure,
    Battery,
    Humidity,
    Illuminance,
    Pressure,
    Temperature,
    Timestamp,
    Voltage,
}

/// The built-in diagnostic sensors every device carries.
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, AsRefStr, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    Status,
    CpuTemperature,
    Version,
    Uptime,
    LastRestart,
}

impl DiagnosticKind {
    /// The name shown in the Home Assistant UI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::CpuTemperature => "CPU Temperature",
            Self::Version => "Version",
            Self::Uptime => "Uptime",
            Self::LastRestart => "Last Restart",
        }
    }

    /// Device class of the diagnostic value, if Home Assistant has one for it.
    pub fn device_class(&self) -> Option<SensorClass> {
        match self {
            Self::CpuTemperature => Some(SensorClass::Temperature),
            Self::LastRestart => Some(SensorClass::Timestamp),
            _ => None,
        }
    }

    pub fn units(&self) -> Option<&'static str> {
        match self {
            Self::CpuTemperature => Some("°C"),
            _ => None,
        }
    }
}
