use std::collections::VecDeque;
use std::marker::PhantomData;

use log::{debug, warn};
use scope_types::property_map::{keys, PropertyMap, PropertyValue, TimingEventExt};
use scope_types::{ChannelConfig, RawSample, SampleKind, TriggerConfig};
use scope_driver::{DriverWrapper, ScopeDevice, WrapperConfig};
use timing_matcher::TimingMatcher;

use crate::edge::{DigitalEdgeDetector, EdgeDetector};
use crate::error::EngineError;

/// Per-channel metadata emitted once, on the first poll that publishes a
/// sample for that channel (§4.2, "Per-channel tag emission").
#[derive(Debug, Clone)]
pub struct SignalMeta {
    pub name: String,
    pub sample_rate_hz: f64,
    pub quantity: String,
    pub unit: String,
    pub min: f32,
    pub max: f32,
}

/// One `poll_streaming` call's output.
#[derive(Debug, Default)]
pub struct StreamingPollResult<S: SampleKind> {
    pub channel_samples: Vec<(usize, Vec<S>)>,
    pub tags: Vec<(usize, PropertyMap)>,
    pub messages: Vec<String>,
    pub samples_dropped: u64,
}

/// One completed, matched rapid-block capture.
#[derive(Debug)]
pub struct CaptureDataSet<S: SampleKind> {
    pub segment_index: usize,
    pub pre_samples: usize,
    pub post_samples: usize,
    pub channel_values: Vec<(usize, Vec<S>)>,
    pub timing_events: Vec<(usize, PropertyMap)>,
}

/// One `poll_rapid_block` call's output.
#[derive(Debug, Default)]
pub struct RapidBlockPollResult<S: SampleKind> {
    pub captures: Vec<CaptureDataSet<S>>,
    pub completed: bool,
}

enum TriggerDetector {
    None,
    Analog(EdgeDetector),
    Digital(DigitalEdgeDetector),
}

struct RapidBlockState {
    trigger_arm: String,
    trigger_disarm: String,
    trigger_once: bool,
    armed: bool,
    next_timing_tags: Vec<PropertyMap>,
    pre_samples: usize,
    post_samples: usize,
    n_captures: usize,
    completed: bool,
}

/// Converts hardware batches into type-correct, gain-scaled, tag-annotated
/// sample streams aligned to the matcher's contract (§4.2). Generic over
/// the device family (no `dyn`, §9) and over the output sample kind (§3).
pub struct AcquisitionEngine<D: ScopeDevice, S: SampleKind> {
    wrapper: DriverWrapper<D>,
    matcher: TimingMatcher,

    channel_configs: Vec<ChannelConfig>,
    signal_meta: Vec<SignalMeta>,
    signal_info_sent: Vec<bool>,
    pending_raw: Vec<VecDeque<RawSample>>,
    pending_digital: VecDeque<u16>,
    unpublished_samples: usize,

    acq_start_time_ns: i64,
    sample_rate_hz: f64,
    samples_dropped_total: u64,
    max_output_samples: usize,

    trigger: TriggerConfig,
    trigger_channel: Option<usize>,
    detector: TriggerDetector,

    pending_tags: VecDeque<PropertyMap>,
    rapid: Option<RapidBlockState>,

    _sample_kind: PhantomData<S>,
}

impl<D: ScopeDevice, S: SampleKind> AcquisitionEngine<D, S> {
    fn base(
        serial: &str,
        channel_configs: Vec<ChannelConfig>,
        trigger: TriggerConfig,
        signal_meta: Vec<SignalMeta>,
        matcher_timeout_ns: u64,
        acq_start_time_ns: i64,
        max_output_samples: usize,
    ) -> Result<(DriverWrapper<D>, Option<usize>, TriggerDetector), EngineError> {
        let mut wrapper = DriverWrapper::new(channel_configs.len(), WrapperConfig::default());
        wrapper.open(serial)?;
        for (idx, cfg) in channel_configs.iter().enumerate() {
            wrapper.configure_channel(idx, cfg.clone());
        }
        wrapper.configure_trigger(trigger.clone());
        // Flush the channel/trigger configuration just set above to the
        // device before starting: `poll()` applies pending config
        // regardless of driver state, and while Idle it does nothing else.
        wrapper.poll()?;

        let (trigger_channel, detector) = build_detector(&trigger, &wrapper);
        let _ = (matcher_timeout_ns, acq_start_time_ns, signal_meta);
        Ok((wrapper, trigger_channel, detector))
    }

    /// Opens the device and starts continuous streaming acquisition.
    pub fn open_streaming(
        serial: &str,
        channel_configs: Vec<ChannelConfig>,
        trigger: TriggerConfig,
        signal_meta: Vec<SignalMeta>,
        sample_rate_hz: f64,
        enable_digital: bool,
        matcher_timeout_ns: u64,
        acq_start_time_ns: i64,
        max_output_samples: usize,
    ) -> Result<Self, EngineError> {
        let (mut wrapper, trigger_channel, detector) = Self::base(
            serial,
            channel_configs.clone(),
            trigger.clone(),
            signal_meta.clone(),
            matcher_timeout_ns,
            acq_start_time_ns,
            max_output_samples,
        )?;
        let actual_rate = wrapper.start_streaming(sample_rate_hz, enable_digital)?;

        Ok(AcquisitionEngine {
            pending_raw: (0..channel_configs.len()).map(|_| VecDeque::new()).collect(),
            signal_info_sent: vec![false; channel_configs.len()],
            channel_configs,
            signal_meta,
            pending_digital: VecDeque::new(),
            unpublished_samples: 0,
            acq_start_time_ns,
            sample_rate_hz: actual_rate,
            samples_dropped_total: 0,
            max_output_samples,
            trigger,
            trigger_channel,
            detector,
            pending_tags: VecDeque::new(),
            rapid: None,
            matcher: TimingMatcher::new(actual_rate, matcher_timeout_ns),
            wrapper,
            _sample_kind: PhantomData,
        })
    }

    /// Opens the device and arms rapid-block (multi-segment triggered)
    /// acquisition, gated by the named arm/disarm timing events (§4.2,
    /// §9 "Overlapping rapid-block triggers").
    #[allow(clippy::too_many_arguments)]
    pub fn open_rapid_block(
        serial: &str,
        channel_configs: Vec<ChannelConfig>,
        trigger: TriggerConfig,
        signal_meta: Vec<SignalMeta>,
        sample_rate_hz: f64,
        pre_samples: usize,
        post_samples: usize,
        n_captures: usize,
        enable_digital: bool,
        trigger_once: bool,
        trigger_arm: String,
        trigger_disarm: String,
        matcher_timeout_ns: u64,
        acq_start_time_ns: i64,
        max_output_samples: usize,
    ) -> Result<Self, EngineError> {
        if trigger_arm == trigger_disarm {
            return Err(EngineError::Configuration(format!(
                "trigger_arm and trigger_disarm must differ, both are {trigger_arm:?}"
            )));
        }
        let (mut wrapper, trigger_channel, detector) = Self::base(
            serial,
            channel_configs.clone(),
            trigger.clone(),
            signal_meta.clone(),
            matcher_timeout_ns,
            acq_start_time_ns,
            max_output_samples,
        )?;
        let actual_rate = wrapper.start_triggered(sample_rate_hz, pre_samples, post_samples, n_captures, enable_digital)?;

        Ok(AcquisitionEngine {
            pending_raw: (0..channel_configs.len()).map(|_| VecDeque::new()).collect(),
            signal_info_sent: vec![false; channel_configs.len()],
            channel_configs,
            signal_meta,
            pending_digital: VecDeque::new(),
            unpublished_samples: 0,
            acq_start_time_ns,
            sample_rate_hz: actual_rate,
            samples_dropped_total: 0,
            max_output_samples,
            trigger,
            trigger_channel,
            detector,
            pending_tags: VecDeque::new(),
            rapid: Some(RapidBlockState {
                trigger_arm,
                trigger_disarm,
                trigger_once,
                armed: false,
                next_timing_tags: Vec::new(),
                pre_samples,
                post_samples,
                n_captures,
                completed: false,
            }),
            matcher: TimingMatcher::new(actual_rate, matcher_timeout_ns),
            wrapper,
            _sample_kind: PhantomData,
        })
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn samples_dropped_total(&self) -> u64 {
        self.samples_dropped_total
    }

    /// Mutable access to the underlying device, for tests driving a
    /// simulated device family through its injection hooks.
    pub fn device_mut(&mut self) -> Option<&mut D> {
        self.wrapper.device_mut()
    }

    pub fn configure_channel(&mut self, channel: usize, config: ChannelConfig) {
        self.channel_configs[channel] = config.clone();
        self.wrapper.configure_channel(channel, config);
    }

    pub fn configure_trigger(&mut self, trigger: TriggerConfig) {
        self.trigger = trigger.clone();
        self.wrapper.configure_trigger(trigger.clone());
        let (channel, detector) = build_detector(&trigger, &self.wrapper);
        self.trigger_channel = channel;
        self.detector = detector;
    }

    /// Streaming operation (§4.2): one call produces up to N samples and M
    /// tags.
    pub fn poll_streaming(&mut self, incoming_tags: &[PropertyMap]) -> Result<StreamingPollResult<S>, EngineError> {
        self.pending_tags.extend(incoming_tags.iter().cloned());

        let report = self.wrapper.poll()?;
        let outcome = match report.streaming {
            Some(o) => o,
            None => return Ok(StreamingPollResult::default()),
        };

        let mut samples_dropped = 0u64;
        let batch_start = self.unpublished_samples;

        for (channel, available) in &outcome.samples_per_channel {
            let channel = *channel;
            let raw = self.wrapper.drain_channel(channel, *available);
            let room = self.max_output_samples.saturating_sub(self.pending_raw[channel].len());
            let capped = raw.len().min(room);
            if capped < raw.len() {
                samples_dropped += (raw.len() - capped) as u64;
            }
            self.pending_raw[channel].extend(raw.into_iter().take(capped));
        }

        if matches!(self.trigger, TriggerConfig::Digital { .. }) {
            let digital = self.wrapper.drain_digital(outcome.max_samples());
            self.pending_digital.extend(digital);
        }

        self.unpublished_samples = self.pending_raw.iter().map(|q| q.len()).max().unwrap_or(0);
        let chunk_length = self.unpublished_samples;

        if samples_dropped > 0 {
            self.matcher.reset();
            self.samples_dropped_total += samples_dropped;
            debug!("dropped {samples_dropped} samples this poll, matcher reset");
        }

        let mut tags: Vec<(usize, PropertyMap)> = Vec::new();
        let mut messages = Vec::new();

        for (channel, _) in &outcome.samples_per_channel {
            if !self.signal_info_sent[*channel] {
                self.signal_info_sent[*channel] = true;
                tags.push((batch_start, signal_info_tag(&self.signal_meta[*channel])));
            }
        }
        for &channel in &outcome.overflow_channels {
            tags.push((batch_start, over_range_tag(channel)));
        }

        let new_window: Vec<i16> = if let Some(trigger_channel) = self.trigger_channel {
            self.pending_raw[trigger_channel]
                .iter()
                .skip(batch_start)
                .copied()
                .collect()
        } else {
            Vec::new()
        };
        let digital_window: Vec<u16> = self.pending_digital.iter().skip(batch_start).copied().collect();

        let mut local_edges = match &mut self.detector {
            TriggerDetector::Analog(det) if self.trigger_channel.is_some() => det.scan(&new_window),
            TriggerDetector::Digital(det) => det.scan(&digital_window),
            _ => Vec::new(),
        };
        let edges: Vec<usize> = local_edges.drain(..).map(|i| i + batch_start).collect();

        let tags_snapshot: Vec<PropertyMap> = self.pending_tags.iter().cloned().collect();
        let result = self
            .matcher
            .match_chunk(&tags_snapshot, &edges, chunk_length, self.acq_start_time_ns);

        for _ in 0..result.processed_tags {
            self.pending_tags.pop_front();
        }
        tags.extend(result.tags);
        messages.extend(result.messages);

        let mut channel_samples = Vec::new();
        for (channel, cfg) in self.channel_configs.iter().enumerate() {
            if !cfg.enabled {
                continue;
            }
            let n = result.processed_samples.min(self.pending_raw[channel].len());
            let device = self.wrapper.device().expect("device present while streaming");
            let max_adc = device.max_adc_value();
            let uncertainty_fraction = device.uncertainty_fraction();
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                let raw = self.pending_raw[channel].pop_front().unwrap();
                values.push(S::calibrate(raw, cfg.analog_offset, 1.0, cfg.range.volts(), max_adc, uncertainty_fraction));
            }
            channel_samples.push((channel, values));
        }
        for _ in 0..result.processed_samples.min(self.pending_digital.len()) {
            self.pending_digital.pop_front();
        }

        self.unpublished_samples = self.unpublished_samples.saturating_sub(result.processed_samples);
        self.acq_start_time_ns += ((result.processed_samples as f64) * 1e9 / self.sample_rate_hz).round() as i64;

        Ok(StreamingPollResult {
            channel_samples,
            tags,
            messages,
            samples_dropped,
        })
    }

    /// Rapid-block operation (§4.2): arm/disarm gates which completed
    /// captures are emitted; every capture resets the matcher since
    /// captures are always a discontinuity in sample time.
    pub fn poll_rapid_block(&mut self, incoming_tags: &[PropertyMap]) -> Result<RapidBlockPollResult<S>, EngineError> {
        let rapid = self.rapid.as_mut().expect("poll_rapid_block called on a streaming engine");

        for tag in incoming_tags {
            let name = tag.get(keys::TRIGGER_NAME).and_then(PropertyValue::as_str).unwrap_or("");
            if name == rapid.trigger_arm {
                if rapid.armed {
                    warn!("ARM observed while already armed, ignoring (§9 overlapping rapid-block triggers)");
                } else {
                    rapid.armed = true;
                }
            } else if name == rapid.trigger_disarm {
                rapid.armed = false;
            }
            rapid.next_timing_tags.push(tag.clone());
        }

        let report = self.wrapper.poll()?;
        let mut captures = Vec::new();
        let mut completed = false;

        for batch in report.captures {
            let window_tags = std::mem::take(&mut self.rapid.as_mut().unwrap().next_timing_tags);
            if !self.rapid.as_ref().unwrap().armed {
                debug!("discarding rapid-block capture {} while disarmed", batch.segment_index);
                continue;
            }

            self.matcher.reset();
            let pre_samples = self.rapid.as_ref().unwrap().pre_samples;
            let post_samples = self.rapid.as_ref().unwrap().post_samples;
            let total = pre_samples + post_samples;

            let mut edges = vec![pre_samples];
            if let Some(trigger_channel) = self.trigger_channel {
                if let Some((_, raw)) = batch.per_channel.iter().find(|(c, _)| *c == trigger_channel) {
                    if let TriggerDetector::Analog(det) = &mut self.detector {
                        let mut extra = det.scan(raw);
                        edges.append(&mut extra);
                    }
                }
            }
            edges.sort_unstable();
            edges.dedup();

            let match_result = self.matcher.match_chunk(&window_tags, &edges, total, self.acq_start_time_ns);

            let device = self.wrapper.device().expect("device present while triggered");
            let max_adc = device.max_adc_value();
            let uncertainty_fraction = device.uncertainty_fraction();
            let mut channel_values = Vec::new();
            for (channel, raw) in &batch.per_channel {
                let cfg = &self.channel_configs[*channel];
                let values = raw
                    .iter()
                    .map(|&r| S::calibrate(r, cfg.analog_offset, 1.0, cfg.range.volts(), max_adc, uncertainty_fraction))
                    .collect();
                channel_values.push((*channel, values));
            }

            captures.push(CaptureDataSet {
                segment_index: batch.segment_index,
                pre_samples,
                post_samples,
                channel_values,
                timing_events: match_result.tags,
            });

            let rapid = self.rapid.as_mut().unwrap();
            if rapid.trigger_once && !rapid.completed {
                rapid.completed = true;
                completed = true;
            }
        }

        Ok(RapidBlockPollResult { captures, completed })
    }
}

fn build_detector<D: ScopeDevice>(trigger: &TriggerConfig, wrapper: &DriverWrapper<D>) -> (Option<usize>, TriggerDetector) {
    match trigger {
        TriggerConfig::None => (None, TriggerDetector::None),
        TriggerConfig::Analog {
            channel,
            direction,
            threshold_raw,
            ..
        } => {
            let max_adc = wrapper.device().map(|d| d.max_adc_value()).unwrap_or(i16::MAX as i32);
            let band = ((0.01 * max_adc as f32).round() as i32).max(1);
            (Some(*channel), TriggerDetector::Analog(EdgeDetector::new(*direction, *threshold_raw as i32, band)))
        }
        TriggerConfig::Digital { bit_index, direction } => (None, TriggerDetector::Digital(DigitalEdgeDetector::new(*bit_index, *direction))),
    }
}

fn signal_info_tag(meta: &SignalMeta) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str("SIGNAL_INFO".to_string()));
    map.insert("name".to_string(), PropertyValue::Str(meta.name.clone()));
    map.insert("sample_rate".to_string(), PropertyValue::F64(meta.sample_rate_hz));
    map.insert("quantity".to_string(), PropertyValue::Str(meta.quantity.clone()));
    map.insert("unit".to_string(), PropertyValue::Str(meta.unit.clone()));
    map.insert("min".to_string(), PropertyValue::F32(meta.min));
    map.insert("max".to_string(), PropertyValue::F32(meta.max));
    map
}

fn over_range_tag(channel: usize) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str("OVER_RANGE".to_string()));
    map.insert("channel".to_string(), PropertyValue::U64(channel as u64));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_driver::device::CaptureBatch;
    use scope_driver::families::mock::MockDevice;
    use scope_types::{CalibratedSample, Coupling, VoltageRange};

    fn channel(enabled: bool) -> ChannelConfig {
        ChannelConfig {
            enabled,
            range: VoltageRange::V1,
            analog_offset: 0.0,
            coupling: Coupling::DC1M,
        }
    }

    fn meta(name: &str) -> SignalMeta {
        SignalMeta {
            name: name.to_string(),
            sample_rate_hz: 1000.0,
            quantity: "voltage".to_string(),
            unit: "V".to_string(),
            min: -1.0,
            max: 1.0,
        }
    }

    fn named_tag(name: &str) -> PropertyMap {
        let mut map = PropertyMap::new();
        map.insert(keys::TRIGGER_NAME.to_string(), PropertyValue::Str(name.to_string()));
        map
    }

    #[test]
    fn streaming_emits_signal_info_once_and_calibrated_samples() {
        let mut engine = AcquisitionEngine::<MockDevice, CalibratedSample>::open_streaming(
            "mock-0",
            vec![channel(true)],
            TriggerConfig::None,
            vec![meta("ch0")],
            1000.0,
            false,
            0,
            0,
            1024,
        )
        .unwrap();

        engine.device_mut().unwrap().push_channel_samples(0, &[0, 16384, 32767]);

        let result = engine.poll_streaming(&[]).unwrap();

        assert_eq!(result.tags.len(), 1);
        assert_eq!(
            result.tags[0].1.get(keys::TRIGGER_NAME).and_then(PropertyValue::as_str),
            Some("SIGNAL_INFO")
        );
        let (channel_idx, samples) = &result.channel_samples[0];
        assert_eq!(*channel_idx, 0);
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[2] - 1.0).abs() < 1e-3);

        // The signal-info tag is emitted once per channel, on first data.
        let result2 = engine.poll_streaming(&[]).unwrap();
        assert!(result2.tags.is_empty());
        assert!(result2.channel_samples[0].1.is_empty());
    }

    #[test]
    fn streaming_drops_samples_past_buffer_capacity_and_resets_matcher() {
        let mut engine = AcquisitionEngine::<MockDevice, CalibratedSample>::open_streaming(
            "mock-1",
            vec![channel(true)],
            TriggerConfig::None,
            vec![meta("ch0")],
            1000.0,
            false,
            0,
            0,
            2,
        )
        .unwrap();

        engine.device_mut().unwrap().push_channel_samples(0, &[1, 2, 3, 4, 5]);

        let result = engine.poll_streaming(&[]).unwrap();

        assert_eq!(result.samples_dropped, 3);
        assert_eq!(engine.samples_dropped_total(), 3);
        assert_eq!(result.channel_samples[0].1.len(), 2);
    }

    #[test]
    fn rapid_block_discards_captures_while_disarmed_and_buffers_tags_across_polls() {
        let mut engine = AcquisitionEngine::<MockDevice, CalibratedSample>::open_rapid_block(
            "mock-2",
            vec![channel(true)],
            TriggerConfig::None,
            vec![meta("ch0")],
            1000.0,
            2,
            2,
            1,
            false,
            false,
            "ARM".to_string(),
            "DISARM".to_string(),
            0,
            0,
            1024,
        )
        .unwrap();

        engine.device_mut().unwrap().push_capture(CaptureBatch {
            segment_index: 0,
            per_channel: vec![(0, vec![1, 2, 3, 4])],
            digital_port: None,
        });
        let result = engine.poll_rapid_block(&[]).unwrap();
        assert!(result.captures.is_empty(), "captures before ARM must be discarded");

        // ARM arrives with no capture pending this poll: it must still be
        // buffered so the *next* completed capture carries it, not dropped.
        let result = engine.poll_rapid_block(&[named_tag("ARM")]).unwrap();
        assert!(result.captures.is_empty());

        engine.device_mut().unwrap().push_capture(CaptureBatch {
            segment_index: 1,
            per_channel: vec![(0, vec![5, 6, 7, 8])],
            digital_port: None,
        });
        let result = engine.poll_rapid_block(&[]).unwrap();

        assert_eq!(result.captures.len(), 1);
        let capture = &result.captures[0];
        assert_eq!(capture.segment_index, 1);
        assert!(capture
            .timing_events
            .iter()
            .any(|(_, tag)| tag.get(keys::TRIGGER_NAME).and_then(PropertyValue::as_str) == Some("ARM")));
    }

    #[test]
    fn rapid_block_signals_completion_once_when_trigger_once_is_set() {
        let mut engine = AcquisitionEngine::<MockDevice, CalibratedSample>::open_rapid_block(
            "mock-3",
            vec![channel(true)],
            TriggerConfig::None,
            vec![meta("ch0")],
            1000.0,
            1,
            1,
            1,
            false,
            true,
            "ARM".to_string(),
            "DISARM".to_string(),
            0,
            0,
            1024,
        )
        .unwrap();

        engine.poll_rapid_block(&[named_tag("ARM")]).unwrap();
        engine.device_mut().unwrap().push_capture(CaptureBatch {
            segment_index: 0,
            per_channel: vec![(0, vec![1, 2])],
            digital_port: None,
        });
        let result = engine.poll_rapid_block(&[]).unwrap();
        assert!(result.completed);

        engine.device_mut().unwrap().push_capture(CaptureBatch {
            segment_index: 1,
            per_channel: vec![(0, vec![3, 4])],
            digital_port: None,
        });
        let result = engine.poll_rapid_block(&[]).unwrap();
        assert!(!result.completed, "trigger_once only signals completion on the first capture");
    }
}
