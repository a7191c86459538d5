//! Process wiring for the scope acquisition & timing-match daemon (§10.1):
//! configuration loading, logging initialisation, and the main acquisition
//! loop that stitches `scope_driver`, `acquisition` and `timing_source`
//! together. The binary entry point lives in `src/main.rs`; this library
//! crate exposes the pieces a test or an alternate binary can reuse.

pub mod config;
pub mod run;
