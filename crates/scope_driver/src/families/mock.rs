use std::collections::{HashSet, VecDeque};

use once_cell::sync::Lazy;
use std::sync::Mutex;

use scope_types::{ChannelConfig, DeviceError, TriggerConfig};

use crate::device::{CaptureBatch, PollOutcome, ScopeDevice, UnitInfo};

/// Serials that have already been through one `PowerSupplyNotConnected`
/// retry, so `open()`'s test hook only fails once per serial (mirrors
/// `sensors::board_drivers::mock::driver` validating once and failing
/// predictably, but here used to exercise the wrapper's retry path).
static POWER_RETRIED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// A deterministic, fully in-process [`ScopeDevice`] with no simulated
/// hardware latency: tests push exactly the samples/captures/overflow they
/// want to see and assert on the wrapper's/engine's reaction.
pub struct MockDevice {
    unit_info: UnitInfo,
    max_adc_value: i32,
    uncertainty_fraction: f32,
    channels: Vec<ChannelConfig>,
    trigger: TriggerConfig,
    paused: bool,
    closed: bool,

    channel_queues: Vec<VecDeque<i16>>,
    digital_queue: VecDeque<u16>,
    pending_overflow: HashSet<usize>,
    pending_captures: VecDeque<CaptureBatch>,
    next_error: Option<DeviceError>,
}

impl MockDevice {
    pub fn with_channels(n: usize) -> Self {
        MockDevice {
            unit_info: UnitInfo {
                model: "MOCK-SCOPE".to_string(),
                serial: String::new(),
                hardware_version: "sim-1".to_string(),
            },
            max_adc_value: 32_767,
            uncertainty_fraction: 0.01,
            channels: vec![ChannelConfig::default(); n],
            trigger: TriggerConfig::default(),
            paused: false,
            closed: false,
            channel_queues: (0..n).map(|_| VecDeque::new()).collect(),
            digital_queue: VecDeque::new(),
            pending_overflow: HashSet::new(),
            pending_captures: VecDeque::new(),
            next_error: None,
        }
    }

    /// Test hook: enqueue raw samples that the next `poll_latest_values` /
    /// `drain_channel` pair will surface for `channel`.
    pub fn push_channel_samples(&mut self, channel: usize, samples: &[i16]) {
        self.channel_queues[channel].extend(samples.iter().copied());
    }

    pub fn push_digital_samples(&mut self, samples: &[u16]) {
        self.digital_queue.extend(samples.iter().copied());
    }

    pub fn mark_overflow(&mut self, channel: usize) {
        self.pending_overflow.insert(channel);
    }

    pub fn push_capture(&mut self, capture: CaptureBatch) {
        self.pending_captures.push_back(capture);
    }

    /// Test hook: make the next `poll_latest_values`/`poll_completed_captures`
    /// call return this error instead of succeeding.
    pub fn fail_next_poll(&mut self, err: DeviceError) {
        self.next_error = Some(err);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl ScopeDevice for MockDevice {
    fn open(serial: &str) -> Result<Self, DeviceError> {
        if serial == "fail-not-found" {
            return Err(DeviceError::NotFound(serial.to_string()));
        }
        if serial == "fail-power-once" {
            let mut retried = POWER_RETRIED.lock().unwrap();
            if !retried.contains(serial) {
                retried.insert(serial.to_string());
                return Err(DeviceError::PowerSupplyNotConnected);
            }
        }
        let mut device = MockDevice::with_channels(0);
        device.unit_info.serial = serial.to_string();
        Ok(device)
    }

    fn unit_info(&self) -> &UnitInfo {
        &self.unit_info
    }

    fn max_adc_value(&self) -> i32 {
        self.max_adc_value
    }

    fn uncertainty_fraction(&self) -> f32 {
        self.uncertainty_fraction
    }

    fn configure_channel(&mut self, channel: usize, config: &ChannelConfig) -> Result<(), DeviceError> {
        if channel >= self.channels.len() {
            self.channels.resize(channel + 1, ChannelConfig::default());
            self.channel_queues.resize_with(channel + 1, VecDeque::new);
        }
        self.channels[channel] = config.clone();
        Ok(())
    }

    fn configure_trigger(&mut self, trigger: &TriggerConfig) -> Result<(), DeviceError> {
        self.trigger = trigger.clone();
        Ok(())
    }

    fn resolve_sample_rate(&self, requested_hz: f64) -> Result<f64, DeviceError> {
        if requested_hz <= 0.0 {
            return Err(DeviceError::InvalidParameter("sample rate must be positive".to_string()));
        }
        Ok(requested_hz)
    }

    fn start_streaming(&mut self, _sample_rate_hz: f64, _enable_digital: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn start_triggered(
        &mut self,
        _sample_rate_hz: f64,
        _pre_samples: usize,
        _post_samples: usize,
        _n_captures: usize,
        _enable_digital: bool,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        self.paused = paused;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn poll_latest_values(&mut self) -> Result<PollOutcome, DeviceError> {
        if let Some(err) = self.next_error.take() {
            return Err(err);
        }
        let samples_per_channel = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(i, _)| (i, self.channel_queues[i].len()))
            .collect();
        let overflow_channels = self.pending_overflow.drain().collect();
        Ok(PollOutcome {
            samples_per_channel,
            overflow_channels,
        })
    }

    fn drain_channel(&mut self, channel: usize, max: usize) -> Vec<i16> {
        let queue = &mut self.channel_queues[channel];
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    fn drain_digital(&mut self, max: usize) -> Vec<u16> {
        let n = max.min(self.digital_queue.len());
        self.digital_queue.drain(..n).collect()
    }

    fn poll_completed_captures(&mut self) -> Result<Vec<CaptureBatch>, DeviceError> {
        if let Some(err) = self.next_error.take() {
            return Err(err);
        }
        Ok(self.pending_captures.drain(..).collect())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        Ok(())
    }
}
