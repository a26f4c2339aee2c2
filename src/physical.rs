use crate::model::Reading;
use std::future::Future;

/// The driver of a physical sensor.
///
/// `sample` refreshes the latest reading, `data` hands out a copy of it. Implementations
/// typically keep the reading in a [`ReadingCell`](crate::model::ReadingCell).
pub trait PhysicalDevice: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Take one sample from the device.
    fn sample(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The latest reading. Never reads the device itself.
    fn data(&self) -> Reading;
}
