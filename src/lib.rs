//! Bridge a polled sensor to Home Assistant, using MQTT discovery.
//!
//! A [`sampler::SamplerLoop`] keeps the reading of a [`physical::PhysicalDevice`] fresh, while a
//! [`connector::ConnectionStateMachine`] announces the device and forwards new readings.

pub mod connector;
pub mod control;
pub mod environment;
pub mod model;
pub mod physical;
pub mod sampler;
pub mod state;

mod worker;

pub use worker::LoopState;

#[cfg(test)]
mod testing;
