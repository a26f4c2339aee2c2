#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}
