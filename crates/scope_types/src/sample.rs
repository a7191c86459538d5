/// A raw ADC sample, unconverted.
pub type RawSample = i16;

/// A calibrated sample in the channel's physical unit (volts).
pub type CalibratedSample = f32;

/// A calibrated sample paired with a worst-case uncertainty estimate, both
/// in the channel's physical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertainSample {
    pub value: f32,
    pub uncertainty: f32,
}

/// One of the three output representations the acquisition engine can be
/// parameterised over (§3). The engine picks exactly one `SampleKind` for
/// its lifetime; there is no per-sample tag.
pub trait SampleKind: Copy + Send + Sync + 'static {
    /// Convert one raw ADC code into this sample kind, applying the
    /// channel's calibration (`y = offset + scale * (range / max_adc) *
    /// raw`) and, for the uncertain kind, the device's worst-case gain
    /// error fraction of `range`.
    fn calibrate(raw: RawSample, offset: f32, scale: f32, range_volts: f32, max_adc_value: i32, uncertainty_fraction: f32) -> Self;
}

impl SampleKind for RawSample {
    fn calibrate(raw: RawSample, _offset: f32, _scale: f32, _range_volts: f32, _max_adc_value: i32, _uncertainty_fraction: f32) -> Self {
        raw
    }
}

impl SampleKind for CalibratedSample {
    fn calibrate(raw: RawSample, offset: f32, scale: f32, range_volts: f32, max_adc_value: i32, _uncertainty_fraction: f32) -> Self {
        offset + scale * (range_volts / max_adc_value as f32) * raw as f32
    }
}

impl SampleKind for UncertainSample {
    fn calibrate(raw: RawSample, offset: f32, scale: f32, range_volts: f32, max_adc_value: i32, uncertainty_fraction: f32) -> Self {
        let value = offset + scale * (range_volts / max_adc_value as f32) * raw as f32;
        UncertainSample {
            value,
            uncertainty: uncertainty_fraction * range_volts,
        }
    }
}
