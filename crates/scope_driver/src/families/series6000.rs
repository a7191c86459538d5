use scope_types::{ChannelConfig, DeviceError, TriggerConfig};

use crate::device::{CaptureBatch, PollOutcome, ScopeDevice, UnitInfo};
use crate::families::backend::SimulatedBackend;

/// 4-channel, 16-bit family with a tighter gain-error spec than
/// [`super::series5000::Series5000Device`].
pub struct Series6000Device {
    backend: SimulatedBackend,
}

const CHANNEL_COUNT: usize = 4;

impl ScopeDevice for Series6000Device {
    fn open(serial: &str) -> Result<Self, DeviceError> {
        if serial.is_empty() {
            return Err(DeviceError::NotFound("empty serial".to_string()));
        }
        let unit_info = UnitInfo {
            model: "Series6000".to_string(),
            serial: serial.to_string(),
            hardware_version: "rev-a".to_string(),
        };
        let seed = serial.bytes().fold(7u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
        Ok(Series6000Device {
            backend: SimulatedBackend::new(unit_info, 65_535, 0.01, CHANNEL_COUNT, seed),
        })
    }

    fn unit_info(&self) -> &UnitInfo {
        &self.backend.unit_info
    }

    fn max_adc_value(&self) -> i32 {
        self.backend.max_adc_value
    }

    fn uncertainty_fraction(&self) -> f32 {
        self.backend.uncertainty_fraction
    }

    fn configure_channel(&mut self, channel: usize, config: &ChannelConfig) -> Result<(), DeviceError> {
        self.backend.configure_channel(channel, config)
    }

    fn configure_trigger(&mut self, trigger: &TriggerConfig) -> Result<(), DeviceError> {
        self.backend.configure_trigger(trigger)
    }

    fn resolve_sample_rate(&self, requested_hz: f64) -> Result<f64, DeviceError> {
        self.backend.resolve_sample_rate(requested_hz)
    }

    fn start_streaming(&mut self, sample_rate_hz: f64, enable_digital: bool) -> Result<(), DeviceError> {
        self.backend.start_streaming(sample_rate_hz, enable_digital)
    }

    fn start_triggered(
        &mut self,
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        enable_digital: bool,
    ) -> Result<(), DeviceError> {
        self.backend
            .start_triggered(sample_rate_hz, pre_samples, post_samples, n_captures, enable_digital)
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        self.backend.set_paused(paused)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.backend.stop()
    }

    fn poll_latest_values(&mut self) -> Result<PollOutcome, DeviceError> {
        self.backend.poll_latest_values()
    }

    fn drain_channel(&mut self, channel: usize, max: usize) -> Vec<i16> {
        self.backend.drain_channel(channel, max)
    }

    fn drain_digital(&mut self, max: usize) -> Vec<u16> {
        self.backend.drain_digital(max)
    }

    fn poll_completed_captures(&mut self) -> Result<Vec<CaptureBatch>, DeviceError> {
        self.backend.poll_completed_captures()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.backend.close()
    }
}
