//! The timing-to-sample matcher (§4.4): the algorithmic heart of the
//! system. Fuses an ordered list of raw timing events with an ordered list
//! of hardware edge sample-indices into matched tags, carrying only a
//! three-field state carrier between calls.

mod matcher;

pub use matcher::{MatchResult, TimingMatcher};
