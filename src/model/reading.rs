use std::sync::RwLock;
use std::time::SystemTime;

/// A timestamped sample of a physical device.
///
/// Only `last_update` has a meaning to the bridge, the values are passed through as they are.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reading {
    #[serde(with = "humantime_serde")]
    pub last_update: SystemTime,

    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl Default for Reading {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Reading {
    pub fn new(last_update: SystemTime) -> Self {
        Self {
            last_update,
            values: Default::default(),
        }
    }

    /// Add a value. `last_update` is reserved for the timestamp and ignored as a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if key == "last_update" {
            log::warn!("Ignoring value named 'last_update', the name is reserved for the timestamp");
            return self;
        }
        self.values.insert(key, value.into());
        self
    }
}

/// Holds the latest [`Reading`] of a device.
///
/// There is one writer, the sampler, and any number of readers. Readers always get a complete
/// copy, never a reading that is half updated.
#[derive(Debug, Default)]
pub struct ReadingCell {
    current: RwLock<Reading>,
}

impl ReadingCell {
    pub fn new(initial: Reading) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn load(&self) -> Reading {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn store(&self, reading: Reading) {
        match self.current.write() {
            Ok(mut current) => *current = reading,
            Err(poisoned) => *poisoned.into_inner() = reading,
        }
    }
}
