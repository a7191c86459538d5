//! The acquisition engine (§4.2): turns raw oscilloscope batches into
//! type-correct, gain-scaled, tag-annotated sample streams, generic over a
//! `scope_driver::ScopeDevice` family and an output `scope_types::SampleKind`
//! (§9, no `dyn` dispatch).

pub mod edge;
pub mod engine;
pub mod error;

pub use edge::{DigitalEdgeDetector, EdgeDetector};
pub use engine::{
    AcquisitionEngine, CaptureDataSet, RapidBlockPollResult, SignalMeta, StreamingPollResult,
};
pub use error::EngineError;
