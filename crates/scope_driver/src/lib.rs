//! The device driver wrapper (§4.1): a narrow, testable capability over the
//! vendor oscilloscope API, with retry/backoff, power-source handling and
//! buffer-lifetime management factored out of the device families
//! themselves.

pub mod device;
pub mod families;
pub mod lock;
pub mod wrapper;

pub use device::{CaptureBatch, PollOutcome, ScopeDevice, UnitInfo};
pub use lock::HardwareLockGuard;
pub use wrapper::{DriverState, DriverWrapper, WrapperConfig};

pub use scope_types::error::DeviceError;
