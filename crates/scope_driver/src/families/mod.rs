//! Concrete [`crate::ScopeDevice`] implementations.
//!
//! `mock` is fully deterministic and test-injectable, used by
//! `acquisition`'s and `timing_source`'s unit tests. `series5000` and
//! `series6000` are two differently-calibrated device families sharing one
//! simulated vendor backend (§6): no vendor FFI crate is part of this
//! ecosystem, so a real binding would implement [`crate::ScopeDevice`] the
//! same way these do.

mod backend;
pub mod mock;
pub mod series5000;
pub mod series6000;
