/// A single hardware event drained from a [`crate::backend::TimingBackend`].
///
/// `Timing` carries the decoded ECA fields (§4.3's filter bit layout);
/// `Io` carries an edge observed on one of the card's digital output ports,
/// which the card itself generated in response to a previously registered
/// output condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Timing {
        id: u64,
        tai_ns: u64,
        group: u16,
        event_no: u16,
        beam_in: bool,
        bpc_start: bool,
        seq_id: u16,
        bp_id: u16,
    },
    Io {
        id: u64,
        tai_ns: u64,
        port_name: String,
        level: bool,
    },
}

impl RawEvent {
    pub fn id(&self) -> u64 {
        match self {
            RawEvent::Timing { id, .. } | RawEvent::Io { id, .. } => *id,
        }
    }

    pub fn tai_ns(&self) -> u64 {
        match self {
            RawEvent::Timing { tai_ns, .. } | RawEvent::Io { tai_ns, .. } => *tai_ns,
        }
    }
}
