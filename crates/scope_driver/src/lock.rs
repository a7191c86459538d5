//! Process-wide device-enumeration lock (§9, "Global state").
//!
//! Vendor scope libraries require a process-wide initialisation mutex
//! around `open`/enumeration; modelled here the same way the teacher's
//! mock driver models its hardware lock, but with `once_cell` in place of
//! `lazy_static`.

use once_cell::sync::Lazy;
use std::sync::Mutex;

use scope_types::DeviceError;

static HARDWARE_LOCK: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// RAII guard for the device-enumeration lock. Acquired in
/// [`crate::wrapper::DriverWrapper::open`], released on drop (including on
/// every early-return validation error, matching
/// `sensors::board_drivers::ads1299::error::HardwareLockGuard`).
pub struct HardwareLockGuard {
    _private: (),
}

impl HardwareLockGuard {
    pub fn acquire() -> Result<Self, DeviceError> {
        let mut in_use = HARDWARE_LOCK
            .lock()
            .map_err(|_| DeviceError::OperationFailed("hardware lock poisoned".to_string()))?;
        if *in_use {
            return Err(DeviceError::Busy);
        }
        *in_use = true;
        Ok(HardwareLockGuard { _private: () })
    }
}

impl Drop for HardwareLockGuard {
    fn drop(&mut self) {
        if let Ok(mut in_use) = HARDWARE_LOCK.lock() {
            *in_use = false;
        }
    }
}
