use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SourceError;
use crate::event::RawEvent;

/// Capability a concrete timing card driver must provide (§6). Modeled as a
/// generic bound rather than a trait object, matching the
/// `ScopeDevice`/`DriverWrapper<D>` static-dispatch style used by
/// `scope_driver` (§9 REDESIGN note).
///
/// Implementors are expected to be cheap to clone and internally
/// synchronized (an `Arc<Mutex<_>>` handle, as the teacher's sensor
/// drivers use for shared device state) since [`crate::source::TimingSource`]
/// keeps one handle for setup/queries and hands a second to its background
/// poll thread.
pub trait TimingBackend: Clone + Send + 'static {
    fn open(device_name: &str) -> Result<Self, SourceError>
    where
        Self: Sized;

    /// Registers a software condition: events matching `(id, mask)` are
    /// queued for [`Self::poll_events`] instead of only driving hardware
    /// outputs.
    #[allow(clippy::too_many_arguments)]
    fn register_condition(
        &mut self,
        id: u64,
        mask: u64,
        offset_ns: i64,
        accept_late: bool,
        accept_early: bool,
        accept_conflict: bool,
        accept_delayed: bool,
    ) -> Result<(), SourceError>;

    /// Registers a hardware output condition: the card drives `port` to
    /// `level` `delay_ns` after an event matching `(id, mask)`, entirely
    /// outside the software poll loop.
    fn register_output_condition(
        &mut self,
        port: &str,
        id: u64,
        mask: u64,
        delay_ns: i64,
        level: bool,
    ) -> Result<(), SourceError>;

    fn output_ports(&self) -> Vec<String>;

    fn write_output(&mut self, port: &str, level: bool) -> Result<(), SourceError>;

    fn current_tai_ns(&self) -> u64;

    /// Non-blocking drain of events accumulated since the last call.
    fn poll_events(&mut self) -> Vec<RawEvent>;

    /// Test/simulation hook: inject a synthetic event as if the card had
    /// produced it.
    fn inject_event(&mut self, event: RawEvent);
}

struct SimulatedInner {
    ports: Vec<String>,
    conditions: Vec<(u64, u64)>,
    output_conditions: Vec<(String, u64, u64, i64, bool)>,
    queue: VecDeque<RawEvent>,
}

/// An in-memory [`TimingBackend`] used by tests and by any deployment
/// without a physical White Rabbit card attached. Events are injected with
/// [`SimulatedBackend::push_event`] rather than arriving from hardware.
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Mutex<SimulatedInner>>,
}

impl SimulatedBackend {
    pub fn push_event(&self, event: RawEvent) {
        self.inner.lock().unwrap().queue.push_back(event);
    }

    pub fn registered_conditions(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().conditions.clone()
    }

    pub fn registered_output_conditions(&self) -> Vec<(String, u64, u64, i64, bool)> {
        self.inner.lock().unwrap().output_conditions.clone()
    }
}

impl TimingBackend for SimulatedBackend {
    fn open(_device_name: &str) -> Result<Self, SourceError> {
        Ok(SimulatedBackend {
            inner: Arc::new(Mutex::new(SimulatedInner {
                ports: vec!["IO1".to_string(), "IO2".to_string(), "IO3".to_string()],
                conditions: Vec::new(),
                output_conditions: Vec::new(),
                queue: VecDeque::new(),
            })),
        })
    }

    fn register_condition(
        &mut self,
        id: u64,
        mask: u64,
        _offset_ns: i64,
        _accept_late: bool,
        _accept_early: bool,
        _accept_conflict: bool,
        _accept_delayed: bool,
    ) -> Result<(), SourceError> {
        self.inner.lock().unwrap().conditions.push((id, mask));
        Ok(())
    }

    fn register_output_condition(
        &mut self,
        port: &str,
        id: u64,
        mask: u64,
        delay_ns: i64,
        level: bool,
    ) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.ports.iter().any(|p| p == port) {
            return Err(SourceError::Configuration(format!(
                "unknown output port '{port}'"
            )));
        }
        inner
            .output_conditions
            .push((port.to_string(), id, mask, delay_ns, level));
        Ok(())
    }

    fn output_ports(&self) -> Vec<String> {
        self.inner.lock().unwrap().ports.clone()
    }

    fn write_output(&mut self, port: &str, level: bool) -> Result<(), SourceError> {
        let inner = self.inner.lock().unwrap();
        if !inner.ports.iter().any(|p| p == port) {
            return Err(SourceError::Configuration(format!(
                "unknown output port '{port}'"
            )));
        }
        log::debug!("simulated output port {port} set to {level}");
        Ok(())
    }

    fn current_tai_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    fn poll_events(&mut self) -> Vec<RawEvent> {
        self.inner.lock().unwrap().queue.drain(..).collect()
    }

    fn inject_event(&mut self, event: RawEvent) {
        self.inner.lock().unwrap().queue.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_output_condition_rejects_unknown_port() {
        let mut backend = SimulatedBackend::open("sim0").unwrap();
        let err = backend
            .register_output_condition("IO9", 0, 0, 0, true)
            .unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }

    #[test]
    fn poll_events_drains_the_queue_once() {
        let mut backend = SimulatedBackend::open("sim0").unwrap();
        backend.push_event(RawEvent::Timing {
            id: 1,
            tai_ns: 100,
            group: 1,
            event_no: 2,
            beam_in: false,
            bpc_start: false,
            seq_id: 0,
            bp_id: 0,
        });
        assert_eq!(backend.poll_events().len(), 1);
        assert!(backend.poll_events().is_empty());
    }
}
