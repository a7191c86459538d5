use serde::{Deserialize, Serialize};

/// Edge direction a trigger watches for (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rising,
    Falling,
    High,
    Low,
}

/// Trigger configuration (§3): either disabled, an analog level trigger on
/// one channel, or a digital-port bit trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerConfig {
    None,
    Analog {
        channel: usize,
        direction: Direction,
        threshold_raw: i16,
        delay: u32,
        auto_trigger_ms: u32,
    },
    Digital {
        bit_index: u8,
        direction: Direction,
    },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::None
    }
}
