use serde::{Deserialize, Serialize};

/// Input voltage range for one channel, named after the vendor's full-scale
/// settings. `volts()` is the full-scale magnitude used by the calibration
/// formula in [`crate::sample::SampleKind::calibrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoltageRange {
    Mv10,
    Mv20,
    Mv50,
    Mv100,
    Mv200,
    Mv500,
    V1,
    V2,
    V5,
    V10,
    V20,
    V50,
    V100,
    V200,
    V500,
}

impl VoltageRange {
    pub fn volts(self) -> f32 {
        match self {
            VoltageRange::Mv10 => 0.010,
            VoltageRange::Mv20 => 0.020,
            VoltageRange::Mv50 => 0.050,
            VoltageRange::Mv100 => 0.100,
            VoltageRange::Mv200 => 0.200,
            VoltageRange::Mv500 => 0.500,
            VoltageRange::V1 => 1.0,
            VoltageRange::V2 => 2.0,
            VoltageRange::V5 => 5.0,
            VoltageRange::V10 => 10.0,
            VoltageRange::V20 => 20.0,
            VoltageRange::V50 => 50.0,
            VoltageRange::V100 => 100.0,
            VoltageRange::V200 => 200.0,
            VoltageRange::V500 => 500.0,
        }
    }
}

fn default_range() -> VoltageRange {
    VoltageRange::V1
}

fn default_coupling() -> Coupling {
    Coupling::DC1M
}

/// Channel input coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling {
    Ac,
    DC1M,
    DC50R,
}

/// Per-channel configuration (§3). Setting any field marks the channel
/// dirty; the driver wrapper lazily applies the change (and restarts the
/// acquisition) on its next `poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_range")]
    pub range: VoltageRange,
    #[serde(default)]
    pub analog_offset: f32,
    #[serde(default = "default_coupling")]
    pub coupling: Coupling,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            enabled: false,
            range: default_range(),
            analog_offset: 0.0,
            coupling: default_coupling(),
        }
    }
}
