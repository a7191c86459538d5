/// Errors surfaced by the timing event source (§4.3). Mirrors the
/// `thiserror`-derived composite error style used by
/// `crates/acquisition/src/error.rs`.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("configuration rejected: {0}")]
    Configuration(String),

    #[error("timing backend error: {0}")]
    Backend(String),
}
