mod component;
mod device;
mod device_class;
mod discovery;
mod reading;
mod sensor;

pub use component::*;
pub use device::*;
pub use device_class::*;
pub use discovery::*;
pub use reading::*;
pub use sensor::*;

/// Errors building discovery metadata. These indicate a programming or configuration mistake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("a device requires at least one sensor")]
    NoSensors,
    #[error("{field} '{value}' can't be used in a topic")]
    InvalidTopic { field: &'static str, value: String },
}

/// A single topic level: not empty, no wildcards, no separators.
pub(crate) fn topic_level(field: &'static str, value: String) -> Result<String, ModelError> {
    let value = topic_prefix(field, value)?;
    if value.contains('/') {
        return Err(ModelError::InvalidTopic { field, value });
    }
    Ok(value)
}

/// One or more topic levels: not empty, no wildcards, no empty levels.
pub(crate) fn topic_prefix(field: &'static str, value: String) -> Result<String, ModelError> {
    if value.trim().is_empty() {
        return Err(ModelError::MissingField(field));
    }
    if value.contains(['+', '#', '\0']) || value.split('/').any(str::is_empty) {
        return Err(ModelError::InvalidTopic { field, value });
    }
    Ok(value)
}
