use std::fmt;

/// Errors surfaced by the device driver wrapper and, propagated unchanged,
/// by the acquisition engine.
///
/// Kept as a manual `Display`/`Error` impl (rather than `thiserror`) to
/// match the style of the teacher's lower-level, hardware-adjacent error
/// type (`sensors::types::DriverError`); `thiserror` is reserved for the
/// crates one layer up that compose several error sources.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No device matching the requested serial number was found.
    NotFound(String),
    /// The device reported a firmware-level failure during `open`.
    FirmwareFail(String),
    /// A vendor call failed for a reason not covered by the more specific
    /// variants below.
    OperationFailed(String),
    /// Retryable: the device is busy servicing another request.
    Busy,
    /// Retryable: a vendor driver function call failed transiently.
    DriverFunction(String),
    /// Retryable: external power is required and not currently supplied.
    PowerSupplyNotConnected,
    /// Non-retryable: a call argument was invalid.
    InvalidParameter(String),
    /// Non-retryable: the device handle is no longer valid (device closed
    /// or never opened).
    InvalidHandle,
    /// Non-retryable: the requested capability is not supported by this
    /// device family.
    UnsupportedFeature(String),
    /// A configuration value was rejected before being applied to the
    /// device (invalid range, contradictory arm/disarm names, ...).
    Configuration(String),
}

impl DeviceError {
    /// Retryable errors are absorbed into the driver wrapper's retry
    /// budget (§4.1, §7); everything else terminates the active
    /// acquisition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeviceError::Busy | DeviceError::DriverFunction(_) | DeviceError::PowerSupplyNotConnected
        )
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound(s) => write!(f, "device not found: {s}"),
            DeviceError::FirmwareFail(s) => write!(f, "firmware failure: {s}"),
            DeviceError::OperationFailed(s) => write!(f, "operation failed: {s}"),
            DeviceError::Busy => write!(f, "device busy"),
            DeviceError::DriverFunction(s) => write!(f, "driver function failed: {s}"),
            DeviceError::PowerSupplyNotConnected => write!(f, "power supply not connected"),
            DeviceError::InvalidParameter(s) => write!(f, "invalid parameter: {s}"),
            DeviceError::InvalidHandle => write!(f, "invalid device handle"),
            DeviceError::UnsupportedFeature(s) => write!(f, "unsupported feature: {s}"),
            DeviceError::Configuration(s) => write!(f, "configuration error: {s}"),
        }
    }
}

impl std::error::Error for DeviceError {}
