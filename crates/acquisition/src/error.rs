use scope_types::DeviceError;

/// Errors surfaced by the acquisition engine (§7). Uses `thiserror` for the
/// composite/orchestration error type, matching `crates/pipeline/src/error.rs`
/// in the teacher repository, as opposed to the manual `Display` impl used
/// by the lower-level [`scope_types::DeviceError`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("driver error: {0}")]
    Device(#[from] DeviceError),

    #[error("configuration rejected: {0}")]
    Configuration(String),

    #[error("insufficient input items")]
    InsufficientInputItems,
}
