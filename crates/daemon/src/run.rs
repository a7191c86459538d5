use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{info, warn};

use acquisition::{AcquisitionEngine, SignalMeta};
use scope_driver::ScopeDevice;
use scope_driver::families::{mock::MockDevice, series5000::Series5000Device, series6000::Series6000Device};
use scope_types::property_map::PropertyMap;
use scope_types::{CalibratedSample, ChannelConfig};
use timing_source::{SimulatedBackend, TimingSource, TimingSourceConfig};

use crate::config::{AcquisitionMode, ChannelSettings, DaemonConfig, DeviceFamily};

/// How often the daemon calls `poll()` on the engine and the timing
/// source. `poll` itself never blocks longer than one vendor round trip
/// (§5); this is the host scheduler's own tick, analogous to
/// `crates/sensors/src/ads1299/acquisition.rs`'s sample-ready poll loop.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Selects the concrete `ScopeDevice` family named in the configuration
/// and runs the acquisition loop over it (§9, "Dynamic dispatch over
/// device families" — the only branch point is this match, everything
/// downstream is monomorphic).
pub fn run(config: &DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    match config.device_family {
        DeviceFamily::Series5000 => run_with_device::<Series5000Device>(config),
        DeviceFamily::Series6000 => run_with_device::<Series6000Device>(config),
        DeviceFamily::Mock => run_with_device::<MockDevice>(config),
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

fn channel_configs(channels: &[ChannelSettings]) -> Vec<ChannelConfig> {
    channels.iter().map(|c| c.channel.clone()).collect()
}

fn signal_meta(channels: &[ChannelSettings], sample_rate_hz: f64) -> Vec<SignalMeta> {
    channels
        .iter()
        .map(|c| SignalMeta {
            name: c.signal_name.clone(),
            sample_rate_hz,
            quantity: c.signal_quantity.clone(),
            unit: c.signal_unit.clone(),
            min: -c.channel.range.volts(),
            max: c.channel.range.volts(),
        })
        .collect()
}

fn run_with_device<D: ScopeDevice>(config: &DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    let acq_start_time_ns = now_ns();

    let timing_config = TimingSourceConfig {
        event_actions: config.timing.event_actions.clone(),
        io_events: config.timing.io_events,
        sample_rate_hz: config.timing.sample_rate_hz,
        timing_device: config.timing.timing_device.clone(),
        max_delay_ns: config.timing.max_delay_ns,
        verbose_console: config.verbose_console,
    };
    let mut timing = TimingSource::<SimulatedBackend>::open(&timing_config, acq_start_time_ns)?;

    match config.mode {
        AcquisitionMode::Streaming => run_streaming::<D>(config, &mut timing, acq_start_time_ns),
        AcquisitionMode::RapidBlock => run_rapid_block::<D>(config, &mut timing, acq_start_time_ns),
    }
}

fn run_streaming<D: ScopeDevice>(
    config: &DaemonConfig,
    timing: &mut TimingSource<SimulatedBackend>,
    acq_start_time_ns: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = AcquisitionEngine::<D, CalibratedSample>::open_streaming(
        &config.serial_number,
        channel_configs(&config.channels),
        config.trigger.clone(),
        signal_meta(&config.channels, config.sample_rate),
        config.sample_rate,
        config.enable_digital,
        config.matcher_timeout_ns,
        acq_start_time_ns,
        config.max_output_samples,
    )?;
    info!(
        "streaming acquisition started on '{}' at {} Hz",
        config.serial_number,
        engine.sample_rate_hz()
    );

    loop {
        let timing_poll = timing.poll();
        let tags: Vec<PropertyMap> = timing_poll.tags.into_iter().map(|(_, tag)| tag).collect();
        let result = engine.poll_streaming(&tags)?;

        for message in &result.messages {
            warn!("{message}");
        }
        if result.samples_dropped > 0 {
            warn!(
                "dropped {} samples this poll (total {})",
                result.samples_dropped,
                engine.samples_dropped_total()
            );
        }
        for (channel, samples) in &result.channel_samples {
            if !samples.is_empty() {
                log::trace!("channel {channel}: {} samples", samples.len());
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn run_rapid_block<D: ScopeDevice>(
    config: &DaemonConfig,
    timing: &mut TimingSource<SimulatedBackend>,
    acq_start_time_ns: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let rapid = config
        .rapid_block
        .clone()
        .ok_or("mode = \"rapid_block\" requires a \"rapid_block\" configuration section")?;

    let mut engine = AcquisitionEngine::<D, CalibratedSample>::open_rapid_block(
        &config.serial_number,
        channel_configs(&config.channels),
        config.trigger.clone(),
        signal_meta(&config.channels, config.sample_rate),
        config.sample_rate,
        rapid.pre_samples,
        rapid.post_samples,
        rapid.n_captures,
        config.enable_digital,
        rapid.trigger_once,
        rapid.trigger_arm,
        rapid.trigger_disarm,
        config.matcher_timeout_ns,
        acq_start_time_ns,
        config.max_output_samples,
    )?;
    info!(
        "rapid-block acquisition armed on '{}', {} capture(s) requested",
        config.serial_number, rapid.n_captures
    );

    loop {
        let timing_poll = timing.poll();
        let tags: Vec<PropertyMap> = timing_poll.tags.into_iter().map(|(_, tag)| tag).collect();
        let result = engine.poll_rapid_block(&tags)?;

        for capture in &result.captures {
            info!(
                "capture {}: {} timing event(s)",
                capture.segment_index,
                capture.timing_events.len()
            );
        }
        if result.completed {
            info!("rapid-block acquisition completed");
            return Ok(());
        }

        thread::sleep(POLL_INTERVAL);
    }
}
