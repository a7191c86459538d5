use std::sync::Arc;

use scope_types::{ChannelConfig, Coupling, TriggerConfig, VoltageRange};
use serde::{Deserialize, Serialize};

fn default_sample_rate() -> f64 {
    1_000_000.0
}

fn default_matcher_timeout_ns() -> u64 {
    10_000
}

fn default_max_output_samples() -> usize {
    1 << 20
}

fn default_unit() -> String {
    "V".to_string()
}

fn default_quantity() -> String {
    "voltage".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timing_sample_rate() -> f64 {
    0.0
}

fn default_max_delay_ns() -> u64 {
    100_000_000
}

fn default_timing_device() -> String {
    "timing0".to_string()
}

fn default_pre_samples() -> usize {
    1_000
}

fn default_post_samples() -> usize {
    9_000
}

fn default_n_captures() -> usize {
    1
}

/// Which concrete `ScopeDevice` family to open (§6, §9 "Dynamic dispatch
/// over device families"). Selecting a family at startup and monomorphizing
/// the rest of the run over it avoids `dyn ScopeDevice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Series5000,
    Series6000,
    Mock,
}

impl Default for DeviceFamily {
    fn default() -> Self {
        DeviceFamily::Mock
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    Streaming,
    RapidBlock,
}

/// One configured channel: `ChannelConfig` plus the per-channel signal
/// metadata the original spec carries as parallel `signal_*` arrays (§9,
/// "Large configuration objects" — here expressed as one array-of-structs
/// instead, since JSON config does not need the parallel-array economy the
/// original's C API did).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(flatten)]
    pub channel: ChannelConfig,
    pub signal_name: String,
    #[serde(default = "default_unit")]
    pub signal_unit: String,
    #[serde(default = "default_quantity")]
    pub signal_quantity: String,
}

/// Rapid-block-only settings, required when `mode = "rapid_block"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidBlockSettings {
    #[serde(default = "default_pre_samples")]
    pub pre_samples: usize,
    #[serde(default = "default_post_samples")]
    pub post_samples: usize,
    #[serde(default = "default_n_captures")]
    pub n_captures: usize,
    #[serde(default)]
    pub trigger_once: bool,
    pub trigger_arm: String,
    pub trigger_disarm: String,
}

/// Configuration surface for the timing event source (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default)]
    pub event_actions: Vec<String>,
    #[serde(default = "default_true")]
    pub io_events: bool,
    #[serde(default = "default_timing_sample_rate")]
    pub sample_rate_hz: f64,
    #[serde(default = "default_timing_device")]
    pub timing_device: String,
    #[serde(default = "default_max_delay_ns")]
    pub max_delay_ns: u64,
}

/// Top-level daemon configuration (§6, §10.4). Mirrors
/// `crates/sensors/src/types.rs::AdcConfig` in shape: required hardware
/// identity fields up front, `#[serde(default = "...")]` for every knob
/// that has a sane default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub serial_number: String,
    #[serde(default)]
    pub device_family: DeviceFamily,
    pub mode: AcquisitionMode,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub enable_digital: bool,
    pub channels: Vec<ChannelSettings>,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default = "default_matcher_timeout_ns")]
    pub matcher_timeout_ns: u64,
    #[serde(default = "default_max_output_samples")]
    pub max_output_samples: usize,
    pub rapid_block: Option<RapidBlockSettings>,
    #[serde(default)]
    pub verbose_console: bool,
    pub timing: TimingSettings,
}

fn default_range() -> VoltageRange {
    VoltageRange::V1
}

fn default_coupling() -> Coupling {
    Coupling::DC1M
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            serial_number: "mock-0".to_string(),
            device_family: DeviceFamily::default(),
            mode: AcquisitionMode::Streaming,
            sample_rate: default_sample_rate(),
            enable_digital: false,
            channels: vec![ChannelSettings {
                channel: ChannelConfig {
                    enabled: true,
                    range: default_range(),
                    analog_offset: 0.0,
                    coupling: default_coupling(),
                },
                signal_name: "CH1".to_string(),
                signal_unit: default_unit(),
                signal_quantity: default_quantity(),
            }],
            trigger: TriggerConfig::None,
            matcher_timeout_ns: default_matcher_timeout_ns(),
            max_output_samples: default_max_output_samples(),
            rapid_block: None,
            verbose_console: false,
            timing: TimingSettings {
                event_actions: Vec::new(),
                io_events: true,
                sample_rate_hz: default_timing_sample_rate(),
                timing_device: default_timing_device(),
                max_delay_ns: default_max_delay_ns(),
            },
        }
    }
}

/// Loads the daemon configuration from `path`. Startup-time configuration
/// is not a recoverable runtime path (§10.4): a missing file or malformed
/// JSON panics with a descriptive message rather than returning a `Result`,
/// matching `crates/sensors/src/types.rs`'s sibling
/// `crates/daemon/src/config.rs::load_config` in the teacher repository.
pub fn load_config(path: &str) -> Arc<DaemonConfig> {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        panic!("could not read configuration file at '{path}': {e}. Please ensure the file exists.")
    });
    let config: DaemonConfig = serde_json::from_str(&contents)
        .unwrap_or_else(|e| panic!("could not parse configuration file at '{path}': {e}"));
    log::info!("loaded configuration from {path}");
    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_streaming_mock() {
        let config = DaemonConfig::default();
        assert_eq!(config.device_family, DeviceFamily::Mock);
        assert_eq!(config.mode, AcquisitionMode::Streaming);
        assert!(config.rapid_block.is_none());
    }

    #[test]
    fn deserializes_a_rapid_block_configuration() {
        let json = r#"{
            "serial_number": "unit-1",
            "device_family": "series5000",
            "mode": "rapid_block",
            "channels": [
                {"enabled": true, "signal_name": "CH1"}
            ],
            "rapid_block": {
                "trigger_arm": "ARM",
                "trigger_disarm": "DISARM"
            },
            "timing": {
                "event_actions": ["3:7 -> PUBLISH()"]
            }
        }"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.device_family, DeviceFamily::Series5000);
        assert_eq!(config.mode, AcquisitionMode::RapidBlock);
        assert_eq!(config.channels[0].signal_name, "CH1");
        assert_eq!(config.rapid_block.unwrap().pre_samples, default_pre_samples());
    }
}
