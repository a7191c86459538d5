use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use scope_types::{ChannelConfig, DeviceError, TriggerConfig};

use crate::device::{CaptureBatch, PollOutcome, UnitInfo};

/// Synthetic vendor backend shared by `series5000` and `series6000` (§6):
/// generates a noisy sine wave per enabled channel, deterministic given a
/// seed, standing in for a real vendor FFI binding this ecosystem doesn't
/// have.
pub(crate) struct SimulatedBackend {
    pub unit_info: UnitInfo,
    pub max_adc_value: i32,
    pub uncertainty_fraction: f32,

    channels: Vec<ChannelConfig>,
    trigger: TriggerConfig,
    sample_rate_hz: f64,
    samples_per_poll: usize,
    paused: bool,
    streaming: bool,
    triggered: bool,
    n_captures_remaining: usize,
    pre_samples: usize,
    post_samples: usize,

    rng: StdRng,
    virtual_index: Vec<u64>,
    channel_queues: Vec<VecDeque<i16>>,
    digital_queue: VecDeque<u16>,
    pending_overflow: Vec<usize>,
}

impl SimulatedBackend {
    pub fn new(unit_info: UnitInfo, max_adc_value: i32, uncertainty_fraction: f32, n_channels: usize, seed: u64) -> Self {
        SimulatedBackend {
            unit_info,
            max_adc_value,
            uncertainty_fraction,
            channels: vec![ChannelConfig::default(); n_channels],
            trigger: TriggerConfig::default(),
            sample_rate_hz: 0.0,
            samples_per_poll: 64,
            paused: false,
            streaming: false,
            triggered: false,
            n_captures_remaining: 0,
            pre_samples: 0,
            post_samples: 0,
            rng: StdRng::seed_from_u64(seed),
            virtual_index: vec![0; n_channels],
            channel_queues: (0..n_channels).map(|_| VecDeque::new()).collect(),
            digital_queue: VecDeque::new(),
            pending_overflow: Vec::new(),
        }
    }

    pub fn configure_channel(&mut self, channel: usize, config: &ChannelConfig) -> Result<(), DeviceError> {
        if channel >= self.channels.len() {
            return Err(DeviceError::InvalidParameter(format!("no such channel {channel}")));
        }
        self.channels[channel] = config.clone();
        Ok(())
    }

    pub fn configure_trigger(&mut self, trigger: &TriggerConfig) -> Result<(), DeviceError> {
        self.trigger = trigger.clone();
        Ok(())
    }

    pub fn resolve_sample_rate(&self, requested_hz: f64) -> Result<f64, DeviceError> {
        if requested_hz <= 0.0 {
            return Err(DeviceError::InvalidParameter("sample rate must be positive".to_string()));
        }
        // The vendor timebase is quantised; round to the nearest 1 Hz step
        // to stand in for a real achievable-rate computation.
        Ok(requested_hz.round())
    }

    pub fn start_streaming(&mut self, sample_rate_hz: f64, _enable_digital: bool) -> Result<(), DeviceError> {
        self.sample_rate_hz = sample_rate_hz;
        self.streaming = true;
        self.triggered = false;
        Ok(())
    }

    pub fn start_triggered(
        &mut self,
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        _enable_digital: bool,
    ) -> Result<(), DeviceError> {
        self.sample_rate_hz = sample_rate_hz;
        self.pre_samples = pre_samples;
        self.post_samples = post_samples;
        self.n_captures_remaining = n_captures;
        self.triggered = true;
        self.streaming = false;
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        self.paused = paused;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DeviceError> {
        self.streaming = false;
        self.triggered = false;
        Ok(())
    }

    pub fn poll_latest_values(&mut self) -> Result<PollOutcome, DeviceError> {
        if !self.streaming || self.paused {
            return Ok(PollOutcome::default());
        }
        let mut samples_per_channel = Vec::new();
        for (idx, channel) in self.channels.iter().enumerate() {
            if !channel.enabled {
                continue;
            }
            let full_scale = channel.range.volts();
            let mut batch = Vec::with_capacity(self.samples_per_poll);
            for _ in 0..self.samples_per_poll {
                let t = self.virtual_index[idx] as f64 / self.sample_rate_hz.max(1.0);
                let noise: f64 = self.rng.gen_range(-0.01..0.01);
                let normalized = (2.0 * std::f64::consts::PI * 50.0 * t).sin() * 0.5 + noise;
                let raw = (normalized * self.max_adc_value as f64 / full_scale.max(f32::EPSILON) as f64)
                    .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                batch.push(raw);
                self.virtual_index[idx] += 1;
            }
            self.channel_queues[idx].extend(batch.iter().copied());
            samples_per_channel.push((idx, batch.len()));
        }
        Ok(PollOutcome {
            samples_per_channel,
            overflow_channels: self.pending_overflow.drain(..).collect(),
        })
    }

    pub fn drain_channel(&mut self, channel: usize, max: usize) -> Vec<i16> {
        let queue = &mut self.channel_queues[channel];
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn drain_digital(&mut self, max: usize) -> Vec<u16> {
        let n = max.min(self.digital_queue.len());
        self.digital_queue.drain(..n).collect()
    }

    pub fn poll_completed_captures(&mut self) -> Result<Vec<CaptureBatch>, DeviceError> {
        if !self.triggered || self.n_captures_remaining == 0 || self.paused {
            return Ok(Vec::new());
        }
        let segment_index = self.n_captures_remaining - 1;
        self.n_captures_remaining -= 1;
        let total = self.pre_samples + self.post_samples;
        let mut per_channel = Vec::new();
        for (idx, channel) in self.channels.iter().enumerate() {
            if !channel.enabled {
                continue;
            }
            let full_scale = channel.range.volts();
            let values: Vec<i16> = (0..total)
                .map(|i| {
                    let t = i as f64 / self.sample_rate_hz.max(1.0);
                    let normalized = (2.0 * std::f64::consts::PI * 50.0 * t).sin() * 0.8;
                    (normalized * self.max_adc_value as f64 / full_scale.max(f32::EPSILON) as f64)
                        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
                })
                .collect();
            per_channel.push((idx, values));
        }
        Ok(vec![CaptureBatch {
            segment_index,
            per_channel,
            digital_port: None,
        }])
    }

    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.streaming = false;
        self.triggered = false;
        Ok(())
    }
}
