//! Timing event source (§4.3): compiles `filter -> action` configuration
//! lines into hardware conditions, runs a background poll thread that
//! drains a [`backend::TimingBackend`] into a bounded ring, and turns
//! queued events into a tagged digital-output sample stream.

pub mod backend;
pub mod error;
pub mod event;
pub mod filter;
pub mod source;

pub use backend::{SimulatedBackend, TimingBackend};
pub use error::SourceError;
pub use event::RawEvent;
pub use filter::{Action, CompiledRule};
pub use source::{PollResult, TimingSource, TimingSourceConfig};
