use scope_types::{ChannelConfig, DeviceError, TriggerConfig};

/// Identity reported by a device after `open` completes (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub model: String,
    pub serial: String,
    pub hardware_version: String,
}

/// One `get-latest-values` batch (§6): how many fresh samples landed in
/// each enabled channel's buffer, and which channels overflowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub samples_per_channel: Vec<(usize, usize)>,
    pub overflow_channels: Vec<usize>,
}

impl PollOutcome {
    pub fn max_samples(&self) -> usize {
        self.samples_per_channel.iter().map(|(_, n)| *n).max().unwrap_or(0)
    }
}

/// One completed rapid-block segment, as returned by `get-values-bulk`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureBatch {
    pub segment_index: usize,
    pub per_channel: Vec<(usize, Vec<i16>)>,
    pub digital_port: Option<Vec<u16>>,
}

/// The vendor oscilloscope capability (§6), expressed as a trait so the
/// acquisition engine can be generic over the device family rather than
/// reaching for a `dyn` base class (§9, "Dynamic dispatch over device
/// families").
///
/// A device family owns its own handle/buffers; the wrapper in
/// [`crate::wrapper`] sequences calls into it and supplies the retry,
/// lifecycle and buffer-pinning rules that are common to every family.
pub trait ScopeDevice: Sized {
    fn open(serial: &str) -> Result<Self, DeviceError>;

    fn unit_info(&self) -> &UnitInfo;

    /// Maximum representable ADC code, used by the calibration formula.
    fn max_adc_value(&self) -> i32;

    /// Worst-case gain error, as a fraction of the channel's full-scale
    /// range, used to annotate [`scope_types::UncertainSample`].
    fn uncertainty_fraction(&self) -> f32;

    fn configure_channel(&mut self, channel: usize, config: &ChannelConfig) -> Result<(), DeviceError>;

    fn configure_trigger(&mut self, trigger: &TriggerConfig) -> Result<(), DeviceError>;

    /// Converts a requested sample rate to the actual achievable rate.
    /// Callers must use the returned rate for all downstream arithmetic.
    fn resolve_sample_rate(&self, requested_hz: f64) -> Result<f64, DeviceError>;

    fn start_streaming(&mut self, sample_rate_hz: f64, enable_digital: bool) -> Result<(), DeviceError>;

    fn start_triggered(
        &mut self,
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        enable_digital: bool,
    ) -> Result<(), DeviceError>;

    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    /// One "get latest values" round trip. Returns the number of fresh
    /// samples per channel and which channels overflowed; callers read the
    /// samples back out via [`ScopeDevice::drain_channel`].
    fn poll_latest_values(&mut self) -> Result<PollOutcome, DeviceError>;

    /// Drain up to `max` freshly polled raw samples for one channel, in
    /// order, removing them from the device's internal buffer.
    fn drain_channel(&mut self, channel: usize, max: usize) -> Vec<i16>;

    /// Drain freshly polled digital-port samples (one `u16` bitmask per
    /// sample), if digital input is enabled.
    fn drain_digital(&mut self, max: usize) -> Vec<u16>;

    /// Retrieve completed rapid-block segments since the last call.
    fn poll_completed_captures(&mut self) -> Result<Vec<CaptureBatch>, DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError>;
}
