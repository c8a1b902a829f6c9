//! Demo: run the gaze-mapping engine against the in-process mock device.
//!
//! Spawns a mock companion, connects a bridge, registers a corner-marker
//! surface, then feeds synthetic scene/gaze traffic while polling the
//! bridge the way a per-frame host loop would.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use companion::GazeDatum;
use fovea::{EngineConfig, EyeTrackerBridge, HostSample};
use fovea_harness::{corner_marker_layout, MockCompanion, MockDeviceConfig, ScriptedDetector};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Gaze mapping engine demo against a mock device")]
struct Args {
    #[arg(long, default_value = "120")]
    ticks: usize,

    #[arg(long, default_value = "16", help = "Host tick interval in milliseconds")]
    tick_ms: u64,

    #[arg(long, default_value = "2.5", help = "Mock device clock offset in seconds")]
    clock_offset: f64,

    #[arg(long, default_value = "1920.0")]
    width: f64,

    #[arg(long, default_value = "1080.0")]
    height: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting mock companion device");
    let mock = MockCompanion::spawn(MockDeviceConfig {
        clock_offset: args.clock_offset,
        ..Default::default()
    })?;

    let (registration, detections) = corner_marker_layout(args.width, args.height, 64.0);

    let config = EngineConfig {
        address: mock.address(),
        port: mock.control_port(),
        ..Default::default()
    };

    info!("Connecting bridge to {}:{}", config.address, config.port);
    let mut bridge = EyeTrackerBridge::connect(config, Box::new(ScriptedDetector::new(detections)))?;

    // The startup offset estimate is already queued; drain it
    bridge.poll();
    if let Some(offset) = bridge.clock_offset() {
        info!(
            "Clock offset estimate: {:.6}s +/- {:.6}s over {} probes",
            offset.mean, offset.std_dev, offset.samples
        );
    }

    bridge.register_surface(registration, (args.width, args.height));
    bridge.set_recording(true);
    bridge.send_event("demo_start", None);

    let mut mapped = 0usize;
    for tick in 0..args.ticks {
        // A slow circular scan across the screen
        let phase = tick as f64 / args.ticks as f64 * std::f64::consts::TAU;
        let x = args.width / 2.0 + args.width / 4.0 * phase.cos();
        let y = args.height / 2.0 + args.height / 4.0 * phase.sin();

        mock.publish_frame(mock.device_time(), 64, 64);
        mock.publish_gaze(&GazeDatum {
            timestamp: mock.device_time(),
            x,
            y,
            worn: Some(true),
            confidence: Some(1.0),
            left: None,
            right: None,
        });

        std::thread::sleep(Duration::from_millis(args.tick_ms));
        bridge.poll();

        for sample in bridge.drain_samples() {
            if let HostSample::Gaze(record) = sample {
                mapped += 1;
                if mapped % 20 == 0 {
                    info!(
                        "gaze at window ({:.1}, {:.1}), delay {:.1}ms",
                        record.window_px.x,
                        record.window_px.y,
                        record.delay * 1e3
                    );
                }
            }
        }
    }

    info!("Mapped {mapped} samples over {} ticks", args.ticks);
    bridge.send_event("demo_end", None);
    bridge.set_recording(false);
    bridge.stop();

    info!(
        "Mock received {} event markers, recording active: {}",
        mock.received_events().len(),
        mock.recording_active()
    );
    Ok(())
}
