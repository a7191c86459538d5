use std::time::{Duration, Instant};

use log::{debug, info, warn};
use scope_types::{ChannelConfig, DeviceError, TriggerConfig};

use crate::device::{CaptureBatch, PollOutcome, ScopeDevice};
use crate::lock::HardwareLockGuard;

/// Driver lifecycle states (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Closed,
    Opening,
    Idle,
    StreamingActive,
    Paused,
    TriggeredArmed,
    DataReady,
}

/// Retry/backoff knobs (§7): a device-transient error is absorbed locally
/// and only surfaced after `max_errors` consecutive failures spanning at
/// least `retry_period`.
#[derive(Debug, Clone, Copy)]
pub struct WrapperConfig {
    pub retry_period: Duration,
    pub max_errors: u32,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        WrapperConfig {
            retry_period: Duration::from_millis(500),
            max_errors: 3,
        }
    }
}

/// Buffers must stay alive until a short delay after `stop` returns (§9,
/// cyclic/back-references note).
const DRAIN_DELAY: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
enum AcquisitionMode {
    Streaming {
        sample_rate_hz: f64,
        enable_digital: bool,
    },
    Triggered {
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        enable_digital: bool,
    },
}

/// Everything one `poll()` round trip produced, for the caller
/// (`acquisition::AcquisitionEngine`) to drain and act on.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub streaming: Option<PollOutcome>,
    pub captures: Vec<CaptureBatch>,
}

/// Thin, testable capability over the vendor oscilloscope API, generic
/// over the concrete device family (§9, "Dynamic dispatch over device
/// families" — no `dyn`, the engine is generic over this wrapper's `D`).
pub struct DriverWrapper<D: ScopeDevice> {
    device: Option<D>,
    _lock: Option<HardwareLockGuard>,
    state: DriverState,
    config: WrapperConfig,

    channels: Vec<ChannelConfig>,
    channel_dirty: Vec<bool>,
    trigger: TriggerConfig,
    trigger_dirty: bool,
    pending_restart: bool,

    mode: Option<AcquisitionMode>,
    achieved_sample_rate_hz: f64,

    consecutive_errors: u32,
    first_error_at: Option<Instant>,
}

impl<D: ScopeDevice> DriverWrapper<D> {
    pub fn new(n_channels: usize, config: WrapperConfig) -> Self {
        DriverWrapper {
            device: None,
            _lock: None,
            state: DriverState::Closed,
            config,
            channels: vec![ChannelConfig::default(); n_channels],
            channel_dirty: vec![false; n_channels],
            trigger: TriggerConfig::default(),
            trigger_dirty: false,
            pending_restart: false,
            mode: None,
            achieved_sample_rate_hz: 0.0,
            consecutive_errors: 0,
            first_error_at: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn achieved_sample_rate_hz(&self) -> f64 {
        self.achieved_sample_rate_hz
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Mutable access to the underlying device, mainly for tests driving a
    /// [`crate::families::mock::MockDevice`] through its injection hooks.
    pub fn device_mut(&mut self) -> Option<&mut D> {
        self.device.as_mut()
    }

    /// Drains up to `max` freshly polled raw samples for one channel.
    /// Called by the acquisition engine after `poll()` reports new data.
    pub fn drain_channel(&mut self, channel: usize, max: usize) -> Vec<i16> {
        match self.device.as_mut() {
            Some(d) => d.drain_channel(channel, max),
            None => Vec::new(),
        }
    }

    /// Drains up to `max` freshly polled digital-port samples.
    pub fn drain_digital(&mut self, max: usize) -> Vec<u16> {
        match self.device.as_mut() {
            Some(d) => d.drain_digital(max),
            None => Vec::new(),
        }
    }

    /// Opens the device, tolerating `PowerSupplyNotConnected` by retrying
    /// once (§4.1). The vendor's asynchronous open/progress-polling is
    /// collapsed into this single call (the simulated backend has no real
    /// async latency); a real FFI binding would instead drive this from
    /// repeated `poll()` calls.
    pub fn open(&mut self, serial: &str) -> Result<(), DeviceError> {
        if self.state != DriverState::Closed {
            return Err(DeviceError::InvalidParameter("open() called while not Closed".to_string()));
        }
        let lock = HardwareLockGuard::acquire()?;
        self.state = DriverState::Opening;

        let device = match D::open(serial) {
            Ok(d) => d,
            Err(DeviceError::PowerSupplyNotConnected) => {
                warn!("power supply not connected for {serial}, retrying open once");
                std::thread::sleep(DRAIN_DELAY);
                D::open(serial)?
            }
            Err(e) => {
                self.state = DriverState::Closed;
                return Err(e);
            }
        };

        info!("opened scope device {:?}", device.unit_info());
        self.device = Some(device);
        self._lock = Some(lock);
        self.state = DriverState::Idle;
        Ok(())
    }

    pub fn configure_channel(&mut self, channel: usize, config: ChannelConfig) {
        self.channels[channel] = config;
        self.channel_dirty[channel] = true;
    }

    pub fn configure_trigger(&mut self, trigger: TriggerConfig) {
        self.trigger = trigger;
        self.trigger_dirty = true;
    }

    pub fn start_streaming(&mut self, sample_rate_hz: f64, enable_digital: bool) -> Result<f64, DeviceError> {
        self.require_idle()?;
        let device = self.require_device()?;
        let actual = device.resolve_sample_rate(sample_rate_hz)?;
        device.start_streaming(actual, enable_digital)?;
        self.mode = Some(AcquisitionMode::Streaming {
            sample_rate_hz: actual,
            enable_digital,
        });
        self.achieved_sample_rate_hz = actual;
        self.state = DriverState::StreamingActive;
        Ok(actual)
    }

    pub fn start_triggered(
        &mut self,
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        enable_digital: bool,
    ) -> Result<f64, DeviceError> {
        self.require_idle()?;
        let device = self.require_device()?;
        let actual = device.resolve_sample_rate(sample_rate_hz)?;
        device.start_triggered(actual, pre_samples, post_samples, n_captures, enable_digital)?;
        self.mode = Some(AcquisitionMode::Triggered {
            sample_rate_hz: actual,
            pre_samples,
            post_samples,
            n_captures,
            enable_digital,
        });
        self.achieved_sample_rate_hz = actual;
        self.state = DriverState::TriggeredArmed;
        Ok(actual)
    }

    /// Gates rapid-block re-arming without tearing down buffers (§4.1).
    pub fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        let device = self.require_device()?;
        device.set_paused(paused)?;
        self.state = match (self.state, paused) {
            (DriverState::StreamingActive, true) => DriverState::Paused,
            (DriverState::Paused, false) => DriverState::StreamingActive,
            (other, _) => other,
        };
        Ok(())
    }

    fn require_idle(&self) -> Result<(), DeviceError> {
        if self.state != DriverState::Idle {
            return Err(DeviceError::InvalidParameter(format!(
                "acquisition cannot start from state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn require_device(&mut self) -> Result<&mut D, DeviceError> {
        self.device.as_mut().ok_or(DeviceError::InvalidHandle)
    }

    /// The single driver progress step (§4.1): apply pending config,
    /// restart if needed, and invoke the vendor "latest values"/"bulk
    /// values" calls once. Never blocks longer than one vendor round trip.
    pub fn poll(&mut self) -> Result<PollReport, DeviceError> {
        self.apply_pending_config()?;

        if self.pending_restart {
            self.restart()?;
        }

        match self.state {
            DriverState::StreamingActive => self.poll_streaming(),
            DriverState::TriggeredArmed | DriverState::DataReady => self.poll_triggered(),
            _ => Ok(PollReport::default()),
        }
    }

    fn apply_pending_config(&mut self) -> Result<(), DeviceError> {
        let any_channel_dirty = self.channel_dirty.iter().any(|d| *d);
        if !any_channel_dirty && !self.trigger_dirty {
            return Ok(());
        }
        let trigger = self.trigger.clone();
        let trigger_dirty = self.trigger_dirty;
        let channels = self.channels.clone();
        let channel_dirty = std::mem::replace(&mut self.channel_dirty, vec![false; self.channels.len()]);
        self.trigger_dirty = false;

        let device = self.require_device()?;
        for (idx, dirty) in channel_dirty.iter().enumerate() {
            if *dirty {
                device.configure_channel(idx, &channels[idx])?;
            }
        }
        if trigger_dirty {
            device.configure_trigger(&trigger)?;
        }
        if self.state != DriverState::Idle && self.state != DriverState::Closed {
            debug!("channel/trigger configuration changed mid-acquisition, scheduling restart");
            self.pending_restart = true;
        }
        Ok(())
    }

    fn restart(&mut self) -> Result<(), DeviceError> {
        self.pending_restart = false;
        let mode = match self.mode.clone() {
            Some(m) => m,
            None => return Ok(()),
        };
        self.stop()?;
        match mode {
            AcquisitionMode::Streaming { sample_rate_hz, enable_digital } => {
                self.start_streaming(sample_rate_hz, enable_digital)?;
            }
            AcquisitionMode::Triggered {
                sample_rate_hz,
                pre_samples,
                post_samples,
                n_captures,
                enable_digital,
            } => {
                self.start_triggered(sample_rate_hz, pre_samples, post_samples, n_captures, enable_digital)?;
            }
        }
        Ok(())
    }

    fn poll_streaming(&mut self) -> Result<PollReport, DeviceError> {
        let device = self.require_device()?;
        match device.poll_latest_values() {
            Ok(outcome) => {
                self.consecutive_errors = 0;
                self.first_error_at = None;
                Ok(PollReport {
                    streaming: Some(outcome),
                    captures: Vec::new(),
                })
            }
            Err(e) => self.handle_error(e).map(|()| PollReport::default()),
        }
    }

    fn poll_triggered(&mut self) -> Result<PollReport, DeviceError> {
        let device = self.require_device()?;
        match device.poll_completed_captures() {
            Ok(captures) => {
                self.consecutive_errors = 0;
                self.first_error_at = None;
                if !captures.is_empty() {
                    self.state = DriverState::DataReady;
                } else if self.state == DriverState::DataReady {
                    self.state = DriverState::TriggeredArmed;
                }
                Ok(PollReport {
                    streaming: None,
                    captures,
                })
            }
            Err(e) => self.handle_error(e).map(|()| PollReport::default()),
        }
    }

    /// Accumulates retryable errors into a budget (§4.1 step 5, §7);
    /// fatal errors stop the acquisition and propagate immediately.
    fn handle_error(&mut self, err: DeviceError) -> Result<(), DeviceError> {
        if !err.is_retryable() {
            warn!("fatal driver error, stopping acquisition: {err}");
            let _ = self.stop();
            return Err(err);
        }

        let now = Instant::now();
        self.first_error_at.get_or_insert(now);
        self.consecutive_errors += 1;
        let elapsed = now.duration_since(self.first_error_at.unwrap());

        if self.consecutive_errors >= self.config.max_errors && elapsed >= self.config.retry_period {
            warn!(
                "driver error budget exhausted ({} errors over {:?}): {err}",
                self.consecutive_errors, elapsed
            );
            return Err(err);
        }
        debug!("absorbing retryable driver error ({}/{}): {err}", self.consecutive_errors, self.config.max_errors);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DeviceError> {
        if matches!(self.state, DriverState::Closed | DriverState::Idle) {
            return Ok(());
        }
        if let Some(device) = self.device.as_mut() {
            device.stop()?;
        }
        std::thread::sleep(DRAIN_DELAY);
        self.state = DriverState::Idle;
        self.mode = None;
        self.consecutive_errors = 0;
        self.first_error_at = None;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.stop()?;
        if let Some(mut device) = self.device.take() {
            device.close()?;
        }
        self.state = DriverState::Closed;
        self._lock = None;
        Ok(())
    }
}

impl<D: ScopeDevice> Drop for DriverWrapper<D> {
    fn drop(&mut self) {
        if self.state != DriverState::Closed {
            warn!("DriverWrapper dropped without calling close() first");
            let _ = self.close();
        }
    }
}
