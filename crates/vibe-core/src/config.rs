//! Engine configuration.

use crate::{Error, Result};

/// Lowest sample rate accepted for source audio.
pub const MIN_SAMPLE_RATE: u32 = 8000;
/// Highest sample rate accepted for source audio.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Configuration for the playback engine and the offline preprocessor.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Frame capacity of every arena channel buffer (default: 1024)
    pub block_size_frames: usize,
    /// Largest output quantum the host may request (default: 1024)
    pub max_quantum_frames: usize,
    /// Extra input frames fed per quantum to cover the stretcher's pre-roll (default: 4)
    pub guard_frames: usize,
    /// Lower clamp for the time ratio (default: 0.05)
    pub min_ratio: f64,
    /// Upper clamp for the time ratio (default: 20.0)
    pub max_ratio: f64,
    /// Floor for pitch and formant scales (default: 0.1)
    pub min_scale: f64,
    /// Change below which a parameter is not re-sent to the stretcher (default: 1e-6)
    pub param_epsilon: f64,
    /// Buffered output above which no new input is fed (default: 4 blocks)
    pub max_backlog_frames: usize,
    /// Capacity of the engine-to-control event channel (default: 256)
    pub event_capacity: usize,
    /// Capacity of the control-to-engine message channel (default: 64)
    pub message_capacity: usize,
    /// Offline output length deviation tolerated without a warning, in blocks (default: 2)
    pub length_tolerance_blocks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size_frames: 1024,
            max_quantum_frames: 1024,
            guard_frames: 4,
            min_ratio: 0.05,
            max_ratio: 20.0,
            min_scale: 0.1,
            param_epsilon: 1e-6,
            max_backlog_frames: 4096,
            event_capacity: 256,
            message_capacity: 64,
            length_tolerance_blocks: 2,
        }
    }
}

impl EngineConfig {
    /// Create config with a custom block size; the backlog limit follows it.
    pub fn with_block_size(frames: usize) -> Self {
        let frames = frames.max(16);
        Self {
            block_size_frames: frames,
            max_backlog_frames: frames * 4,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size_frames == 0 {
            return Err(Error::InvalidConfig("block_size_frames must be > 0".into()));
        }
        if self.max_quantum_frames == 0 {
            return Err(Error::InvalidConfig("max_quantum_frames must be > 0".into()));
        }
        if !(self.min_ratio > 0.0 && self.min_ratio < self.max_ratio) {
            return Err(Error::InvalidConfig(format!(
                "ratio range {}..{} is empty or non-positive",
                self.min_ratio, self.max_ratio
            )));
        }
        if self.min_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_scale {} must be > 0",
                self.min_scale
            )));
        }
        if self.max_backlog_frames < self.max_quantum_frames {
            return Err(Error::InvalidConfig(format!(
                "max_backlog_frames {} smaller than a quantum ({})",
                self.max_backlog_frames, self.max_quantum_frames
            )));
        }
        if self.event_capacity == 0 || self.message_capacity == 0 {
            return Err(Error::InvalidConfig("channel capacities must be > 0".into()));
        }
        Ok(())
    }

    /// `clamp(1 / speed, min_ratio, max_ratio)`.
    ///
    /// A zero or negative speed is the slowest possible playback and maps to
    /// `max_ratio`. NaN carries no direction and maps to unity (clamped).
    pub fn safe_ratio(&self, speed: f64) -> f64 {
        let ratio = if speed.is_nan() {
            1.0
        } else if speed <= 0.0 {
            self.max_ratio
        } else {
            1.0 / speed
        };
        ratio.clamp(self.min_ratio, self.max_ratio)
    }

    /// `max(scale, min_scale)`; non-finite scales map to 1.0.
    pub fn safe_scale(&self, scale: f64) -> f64 {
        if scale.is_finite() {
            scale.max(self.min_scale)
        } else {
            1.0
        }
    }

    /// Input frames to request for one quantum of `quantum` output frames.
    pub fn frames_wanted(&self, quantum: usize, ratio: f64) -> usize {
        (quantum as f64 / ratio).ceil() as usize + self.guard_frames
    }
}

/// Check a source sample rate against the supported range.
pub fn validate_sample_rate(sample_rate: u32) -> Result<()> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(Error::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.block_size_frames, 1024);
        assert_eq!(config.guard_frames, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_block_size() {
        let config = EngineConfig::with_block_size(512);
        assert_eq!(config.block_size_frames, 512);
        assert_eq!(config.max_backlog_frames, 2048);
    }

    #[test]
    fn test_invalid_ratio_range() {
        let config = EngineConfig {
            min_ratio: 2.0,
            max_ratio: 1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_safe_ratio_clamps() {
        let config = EngineConfig::default();
        assert_relative_eq!(config.safe_ratio(0.5), 2.0);
        assert_relative_eq!(config.safe_ratio(2.0), 0.5);
        assert_relative_eq!(config.safe_ratio(100.0), 0.05);
        assert_relative_eq!(config.safe_ratio(0.001), 20.0);
        assert_relative_eq!(config.safe_ratio(f64::NAN), 1.0);
    }

    #[test]
    fn test_safe_ratio_degenerate_speeds() {
        let config = EngineConfig::default();
        assert_relative_eq!(config.safe_ratio(0.0), 20.0);
        assert_relative_eq!(config.safe_ratio(-0.0), 20.0);
        assert_relative_eq!(config.safe_ratio(-3.0), 20.0);
        assert_relative_eq!(config.safe_ratio(f64::INFINITY), 0.05);
    }

    #[test]
    fn test_safe_scale_floor() {
        let config = EngineConfig::default();
        assert_relative_eq!(config.safe_scale(0.01), 0.1);
        assert_relative_eq!(config.safe_scale(1.5), 1.5);
        assert_relative_eq!(config.safe_scale(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_frames_wanted() {
        let config = EngineConfig::default();
        assert_eq!(config.frames_wanted(128, 1.0), 132);
        assert_eq!(config.frames_wanted(128, 2.0), 68);
        assert_eq!(config.frames_wanted(128, 0.3), 431);
    }

    #[test]
    fn test_sample_rate_range() {
        assert!(validate_sample_rate(44100).is_ok());
        assert!(validate_sample_rate(4000).is_err());
        assert!(validate_sample_rate(400_000).is_err());
    }
}
