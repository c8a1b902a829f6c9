//! Engine runtime configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the gaze-mapping engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Companion device address
    pub address: String,
    /// Companion device control port
    pub port: u16,
    /// Number of time-echo probes per offset estimation
    pub probe_count: usize,
    /// Spacing between probes in milliseconds
    pub probe_spacing_ms: u64,
    /// Command queue polling interval in milliseconds
    pub command_poll_interval_ms: u64,
    /// Gaze samples below this confidence are dropped; `None` disables
    /// the filter (devices that report no confidence are unaffected)
    pub gaze_confidence_threshold: Option<f64>,
    /// Skip surface mapping entirely and emit pupil-only samples
    pub pupillometry_only: bool,
    /// Forward recording start/stop to the device; when false the
    /// recording state is tracked host-side only
    pub capture_recording: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            probe_count: 30,
            probe_spacing_ms: 5,
            command_poll_interval_ms: 20,
            gaze_confidence_threshold: Some(0.6),
            pupillometry_only: false,
            capture_recording: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.command_poll_interval_ms, 20);
        assert!(config.capture_recording);
        assert!(!config.pupillometry_only);
    }
}
