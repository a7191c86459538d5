use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use scope_types::property_map::{keys, PropertyMap, PropertyValue};

use crate::backend::TimingBackend;
use crate::error::SourceError;
use crate::event::RawEvent;
use crate::filter::{parse_event_action, Action, CompiledRule};

const RING_CAPACITY: usize = 4096;

/// Configuration for one [`TimingSource`] instance (§4.3/§10.3).
#[derive(Debug, Clone)]
pub struct TimingSourceConfig {
    /// `filter -> action_list` lines, one per configured rule.
    pub event_actions: Vec<String>,
    /// If false, hardware IO edges never generate tags of their own (only
    /// `PUBLISH`-registered timing events do).
    pub io_events: bool,
    /// Output sample rate in Hz. `0.0` selects the one-sample-per-tag mode.
    pub sample_rate_hz: f64,
    pub timing_device: String,
    pub max_delay_ns: u64,
    pub verbose_console: bool,
}

/// One streamed output chunk: the synthesized digital-output-state byte
/// stream plus the tags attached at specific sample offsets.
#[derive(Debug, Default)]
pub struct PollResult {
    pub samples: Vec<u8>,
    pub tags: Vec<(usize, PropertyMap)>,
}

/// Turns a timing card's hardware events into a tagged sample stream
/// (§4.3). Runs a background thread that drains
/// [`TimingBackend::poll_events`] into a bounded ring; [`TimingSource::poll`]
/// is called synchronously by the acquisition loop to turn queued events
/// into filler/tagged samples.
pub struct TimingSource<B: TimingBackend> {
    backend: B,
    stop: Arc<AtomicBool>,
    poller_thread: Option<thread::Thread>,
    handle: Option<thread::JoinHandle<()>>,
    rx: crossbeam_channel::Receiver<RawEvent>,

    rules: Vec<CompiledRule>,
    io_events: bool,
    sample_rate_hz: f64,
    max_delay_ns: u64,

    start_time_ns: i64,
    last_sample_time_ns: i64,
    output_state: u8,
    port_bits: HashMap<String, u8>,
    next_bit: u8,
}

impl<B: TimingBackend> TimingSource<B> {
    /// Opens the backend, compiles and registers every configured rule,
    /// and starts the background poll thread. `acq_start_time_ns` anchors
    /// the running sample clock to the acquisition's own epoch.
    pub fn open(config: &TimingSourceConfig, acq_start_time_ns: i64) -> Result<Self, SourceError> {
        let mut rules = Vec::with_capacity(config.event_actions.len());
        for line in &config.event_actions {
            rules.push(parse_event_action(line)?);
        }

        let mut backend = B::open(&config.timing_device)?;
        for rule in &rules {
            for action in &rule.actions {
                match action {
                    Action::Publish => {
                        backend.register_condition(rule.id, rule.mask, 0, true, true, true, true)?;
                    }
                    Action::Io { port, steps } => {
                        for (delay_us, level) in steps {
                            backend.register_output_condition(
                                port,
                                rule.id,
                                rule.mask,
                                *delay_us as i64 * 1_000,
                                *level,
                            )?;
                        }
                    }
                }
            }
        }

        let (tx, rx) = crossbeam_channel::bounded(RING_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let poll_period = Duration::from_nanos((config.max_delay_ns / 4).max(1));
        let stop_signal = stop.clone();
        let mut poller_backend = backend.clone();

        let handle = thread::spawn(move || {
            debug!("timing source poll thread started");
            while !stop_signal.load(Ordering::Acquire) {
                for event in poller_backend.poll_events() {
                    if tx.try_send(event).is_err() {
                        warn!("timing event ring full, dropping event");
                    }
                }
                thread::park_timeout(poll_period);
            }
            debug!("timing source poll thread stopped");
        });
        let poller_thread = Some(handle.thread().clone());

        Ok(TimingSource {
            backend,
            stop,
            poller_thread,
            handle: Some(handle),
            rx,
            rules,
            io_events: config.io_events,
            sample_rate_hz: config.sample_rate_hz,
            max_delay_ns: config.max_delay_ns,
            start_time_ns: acq_start_time_ns,
            last_sample_time_ns: acq_start_time_ns,
            output_state: 0,
            port_bits: HashMap::new(),
            next_bit: 0,
        })
    }

    /// Drains every event queued since the last call and turns it into
    /// filler/tagged samples (§4.3 steps 1-4).
    pub fn poll(&mut self) -> PollResult {
        let mut result = PollResult::default();
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }

        for event in &events {
            if matches!(event, RawEvent::Io { .. }) && !self.io_events {
                continue;
            }
            self.emit_event(event, &mut result);
        }

        if events.is_empty() && self.sample_rate_hz > 0.0 {
            self.emit_catchup(&mut result);
        }

        result
    }

    fn period_ns(&self) -> f64 {
        if self.sample_rate_hz > 0.0 {
            1e9 / self.sample_rate_hz
        } else {
            0.0
        }
    }

    fn emit_event(&mut self, event: &RawEvent, result: &mut PollResult) {
        let tai_ns = event.tai_ns() as i64;
        let hw_trigger = self.rules.iter().any(|r| r.matches(event.id()));
        let period_ns = self.period_ns();

        let mut filler = 0usize;
        if self.sample_rate_hz > 0.0 {
            let delta_ns = (tai_ns - self.last_sample_time_ns) as f64;
            filler = (delta_ns * self.sample_rate_hz / 1e9).floor().max(0.0) as usize;
        }
        for _ in 0..filler {
            result.samples.push(self.output_state);
        }

        if let RawEvent::Io { port_name, level, .. } = event {
            self.apply_io_level(port_name, *level);
        }
        result.samples.push(self.output_state);

        let sample_time_ns = self.last_sample_time_ns + (filler as f64 * period_ns).round() as i64;
        let offset_ns = if self.sample_rate_hz > 0.0 {
            (tai_ns - sample_time_ns) as f32
        } else {
            0.0
        };

        let mut tag = event_to_tag(event, hw_trigger);
        tag.insert(keys::TRIGGER_OFFSET.to_string(), PropertyValue::F32(offset_ns));
        result.tags.push((result.samples.len() - 1, tag));

        self.last_sample_time_ns = if self.sample_rate_hz > 0.0 {
            sample_time_ns + period_ns.round() as i64
        } else {
            tai_ns
        };
    }

    fn emit_catchup(&mut self, result: &mut PollResult) {
        let now_ns = self.backend.current_tai_ns() as i64;
        let deadline = now_ns - self.max_delay_ns as i64;
        if deadline <= self.last_sample_time_ns {
            return;
        }
        let period_ns = self.period_ns();
        let delta_ns = (deadline - self.last_sample_time_ns) as f64;
        let filler = (delta_ns * self.sample_rate_hz / 1e9).floor().max(0.0) as usize;
        for _ in 0..filler {
            result.samples.push(self.output_state);
        }
        self.last_sample_time_ns += (filler as f64 * period_ns).round() as i64;
    }

    fn apply_io_level(&mut self, port: &str, level: bool) {
        let bit = *self.port_bits.entry(port.to_string()).or_insert_with(|| {
            let bit = self.next_bit;
            self.next_bit += 1;
            bit
        });
        if level {
            self.output_state |= 1 << bit;
        } else {
            self.output_state &= !(1 << bit);
        }
    }

    pub fn start_time_ns(&self) -> i64 {
        self.start_time_ns
    }

    pub fn output_ports(&self) -> Vec<String> {
        self.backend.output_ports()
    }

    pub fn write_output(&mut self, port: &str, level: bool) -> Result<(), SourceError> {
        self.backend.write_output(port, level)
    }

    /// Test-only accessor to the poll thread's backend handle, for
    /// injecting synthetic events through [`crate::backend::TimingBackend::inject_event`].
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn event_to_tag(event: &RawEvent, hw_trigger: bool) -> PropertyMap {
    let mut tag = PropertyMap::new();
    let mut meta = PropertyMap::new();
    meta.insert(keys::LOCAL_TIME.to_string(), PropertyValue::U64(event.tai_ns()));
    meta.insert(keys::HW_TRIGGER.to_string(), PropertyValue::Bool(hw_trigger));

    match event {
        RawEvent::Io { port_name, level, .. } => {
            let name = format!("{port_name}_{}", if *level { "RISING" } else { "FALLING" });
            tag.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str(name));
            meta.insert("IO-NAME".to_string(), PropertyValue::Str(port_name.clone()));
            meta.insert("IO-LEVEL".to_string(), PropertyValue::Bool(*level));
        }
        RawEvent::Timing {
            group,
            event_no,
            beam_in,
            bpc_start,
            seq_id,
            bp_id,
            ..
        } => {
            tag.insert(
                keys::TRIGGER_NAME.to_string(),
                PropertyValue::Str(format!("EVT_{event_no}")),
            );
            meta.insert("GID".to_string(), PropertyValue::U64(*group as u64));
            meta.insert("EVENT-NO".to_string(), PropertyValue::U64(*event_no as u64));
            meta.insert("BEAM-IN".to_string(), PropertyValue::Bool(*beam_in));
            meta.insert("BPC-START".to_string(), PropertyValue::Bool(*bpc_start));
            meta.insert("SID".to_string(), PropertyValue::U64(*seq_id as u64));
            meta.insert("BPID".to_string(), PropertyValue::U64(*bp_id as u64));
        }
    }

    tag.insert(keys::TRIGGER_TIME.to_string(), PropertyValue::U64(event.tai_ns()));
    tag.insert(keys::META.to_string(), PropertyValue::Map(meta));
    tag
}

impl<B: TimingBackend> Drop for TimingSource<B> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.poller_thread.take() {
            thread.unpark();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use scope_types::property_map::TimingEventExt;

    fn config() -> TimingSourceConfig {
        TimingSourceConfig {
            event_actions: vec!["3:7 -> PUBLISH()".to_string()],
            io_events: true,
            sample_rate_hz: 0.0,
            timing_device: "sim0".to_string(),
            max_delay_ns: 1_000_000,
            verbose_console: false,
        }
    }

    fn matching_event(tai_ns: u64) -> RawEvent {
        let id = 0x1000_0000_0000_0000u64 | (3u64 << 48) | (7u64 << 36);
        RawEvent::Timing {
            id,
            tai_ns,
            group: 3,
            event_no: 7,
            beam_in: false,
            bpc_start: false,
            seq_id: 0,
            bp_id: 0,
        }
    }

    #[test]
    fn one_sample_per_tag_when_sample_rate_is_zero() {
        let cfg = config();
        let mut source = TimingSource::<SimulatedBackend>::open(&cfg, 0).unwrap();
        source.backend_mut().push_event(matching_event(1_000));
        source.backend_mut().push_event(matching_event(2_000));
        thread::sleep(Duration::from_millis(20));

        let result = source.poll();
        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.tags.len(), 2);
        assert_eq!(result.tags[0].0, 0);
        assert_eq!(result.tags[1].0, 1);
        assert!(result.tags[0].1.hw_trigger());
    }

    #[test]
    fn sampled_mode_inserts_filler_between_events() {
        let mut cfg = config();
        cfg.sample_rate_hz = 1_000_000.0; // 1 MHz -> 1000 ns/sample
        let mut source = TimingSource::<SimulatedBackend>::open(&cfg, 0).unwrap();
        source.backend_mut().push_event(matching_event(5_000));
        thread::sleep(Duration::from_millis(20));

        let result = source.poll();
        // 5 filler samples covering [0, 5000) ns, then the tagged sample.
        assert_eq!(result.samples.len(), 6);
        assert_eq!(result.tags.len(), 1);
        assert_eq!(result.tags[0].0, 5);
    }

    #[test]
    fn io_events_toggle_the_output_state_byte() {
        let mut cfg = config();
        cfg.event_actions = vec!["3:7 -> IO1(0,on)".to_string()];
        let mut source = TimingSource::<SimulatedBackend>::open(&cfg, 0).unwrap();
        source.backend_mut().push_event(RawEvent::Io {
            id: 0,
            tai_ns: 100,
            port_name: "IO1".to_string(),
            level: true,
        });
        thread::sleep(Duration::from_millis(20));

        let result = source.poll();
        assert_eq!(result.samples, vec![1]);
        assert!(!result.tags[0].1.hw_trigger());
    }

    #[test]
    fn io_events_suppressed_when_disabled() {
        let mut cfg = config();
        cfg.io_events = false;
        let mut source = TimingSource::<SimulatedBackend>::open(&cfg, 0).unwrap();
        source.backend_mut().push_event(RawEvent::Io {
            id: 0,
            tai_ns: 100,
            port_name: "IO1".to_string(),
            level: true,
        });
        thread::sleep(Duration::from_millis(20));

        let result = source.poll();
        assert!(result.samples.is_empty());
        assert!(result.tags.is_empty());
    }
}
