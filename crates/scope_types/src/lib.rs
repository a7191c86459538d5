//! Shared data model for the oscilloscope acquisition system.
//!
//! This crate contains the types that cross the boundaries between the
//! driver wrapper, the acquisition engine, the timing source and the
//! timing matcher, so that none of those crates need to depend on each
//! other's internals.

pub mod channel;
pub mod error;
pub mod property_map;
pub mod sample;
pub mod trigger;

pub use channel::{ChannelConfig, Coupling, VoltageRange};
pub use error::DeviceError;
pub use property_map::{PropertyMap, PropertyValue};
pub use sample::{CalibratedSample, RawSample, SampleKind, UncertainSample};
pub use trigger::{Direction, TriggerConfig};
