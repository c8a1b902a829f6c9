//! Clock-offset estimation and timestamp conversion.
//!
//! Three clocks are involved: the device clock, the engine-process clock,
//! and the host presentation clock. Conversions compose one documented
//! direction, device -> engine -> host, with the two offsets kept
//! strictly distinct: `device_engine` comes from time-echo probing,
//! `engine_host` is configured by the host side (zero when the engine
//! runs as a thread sharing the host clock).

use std::time::{Duration, Instant};

use companion::{OffsetSample, TimeEchoClient};
use tracing::{debug, warn};

/// Monotonic clock measuring seconds since an epoch fixed at creation.
///
/// Copies share the epoch, so the host and the engine thread read the
/// same timeline.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    epoch: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock epoch.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistical summary of the device-minus-engine clock offset.
///
/// Valid until superseded by a re-estimation; absence downstream means
/// timestamps pass through uncorrected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockOffsetEstimate {
    /// Mean offset in seconds (device clock minus engine clock)
    pub mean: f64,
    /// Standard deviation of the per-probe offsets in seconds
    pub std_dev: f64,
    /// Number of probe round trips in the estimate
    pub samples: usize,
}

/// Summarize probe samples into an offset estimate.
pub(crate) fn summarize(samples: &[OffsetSample]) -> Option<ClockOffsetEstimate> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.offset).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|s| {
            let d = s.offset - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some(ClockOffsetEstimate {
        mean,
        std_dev: variance.sqrt(),
        samples: samples.len(),
    })
}

/// Estimate the device/engine clock offset over repeated time-echo
/// probes.
///
/// Individual probe failures are logged and skipped; the estimate covers
/// whatever round trips succeeded. Returns `None` if every probe failed.
pub(crate) async fn estimate_offset(
    echo: &mut TimeEchoClient,
    clock: HostClock,
    probe_count: usize,
    spacing: Duration,
) -> Option<ClockOffsetEstimate> {
    let mut samples = Vec::with_capacity(probe_count);
    for i in 0..probe_count {
        match echo.probe(|| clock.now()).await {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!("time echo probe {i} failed: {e}"),
        }
        if i + 1 < probe_count {
            tokio::time::sleep(spacing).await;
        }
    }

    let estimate = summarize(&samples);
    if let Some(est) = &estimate {
        debug!(
            "clock offset estimate: {:.6}s +/- {:.6}s over {} probes",
            est.mean, est.std_dev, est.samples
        );
    }
    estimate
}

/// Composed timestamp conversion across device, engine and host clocks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockMapping {
    /// Device clock minus engine clock, from the offset estimator
    pub device_engine: f64,
    /// Engine clock minus host clock, configured by the host side
    pub engine_host: f64,
}

impl ClockMapping {
    /// Convert a device timestamp into host time.
    pub fn device_to_host(&self, device_time: f64) -> f64 {
        device_time - self.device_engine - self.engine_host
    }

    /// Convert a host timestamp into device time.
    pub fn host_to_device(&self, host_time: f64) -> f64 {
        host_time + self.engine_host + self.device_engine
    }

    /// Replace the estimated device/engine offset, keeping the
    /// engine/host leg untouched.
    pub fn apply_estimate(&mut self, estimate: &ClockOffsetEstimate) {
        self.device_engine = estimate.mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_conversion_roundtrip() {
        let mapping = ClockMapping {
            device_engine: 1234.56789,
            engine_host: -0.125,
        };
        for t in [0.0, 17.25, 1e6, -42.5] {
            assert_relative_eq!(
                mapping.device_to_host(mapping.host_to_device(t)),
                t,
                epsilon = 1e-9
            );
            assert_relative_eq!(
                mapping.host_to_device(mapping.device_to_host(t)),
                t,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_offsets_compose_additively() {
        let mapping = ClockMapping {
            device_engine: 10.0,
            engine_host: 3.0,
        };
        assert_relative_eq!(mapping.device_to_host(100.0), 87.0, epsilon = 1e-12);
        assert_relative_eq!(mapping.host_to_device(87.0), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_estimate_keeps_engine_host_leg() {
        let mut mapping = ClockMapping {
            device_engine: 0.0,
            engine_host: 2.5,
        };
        mapping.apply_estimate(&ClockOffsetEstimate {
            mean: 7.0,
            std_dev: 0.001,
            samples: 30,
        });
        assert_relative_eq!(mapping.device_engine, 7.0, epsilon = 1e-12);
        assert_relative_eq!(mapping.engine_host, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_summarize_statistics() {
        let samples: Vec<_> = [9.9, 10.0, 10.1]
            .iter()
            .map(|&offset| OffsetSample {
                offset,
                round_trip: 0.002,
            })
            .collect();
        let est = summarize(&samples).unwrap();
        assert_relative_eq!(est.mean, 10.0, epsilon = 1e-12);
        assert!(est.std_dev > 0.0 && est.std_dev < 0.1);
        assert_eq!(est.samples, 3);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_host_clock_monotonic() {
        let clock = HostClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
