//! Decoded source audio.

use std::sync::Arc;

use crate::{Error, Result};

/// Immutable per-channel sample arrays plus their sample rate.
///
/// Samples sit behind an `Arc`, so handing a track to the real-time side (or
/// keeping a copy on the control side) never copies audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAudio {
    channels: Arc<[Vec<f32>]>,
    sample_rate: u32,
    frames: usize,
}

impl SourceAudio {
    /// Validate and wrap planar samples. All channels must have equal length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        vibe_core::validate_sample_rate(sample_rate)?;
        let Some(first) = channels.first() else {
            return Err(Error::InvalidAudio("no channels".into()));
        };
        if channels.len() > vibe_stretch::soft::MAX_CHANNELS {
            return Err(Error::InvalidAudio(format!(
                "{} channels exceeds the limit of {}",
                channels.len(),
                vibe_stretch::soft::MAX_CHANNELS
            )));
        }
        let frames = first.len();
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != frames)
        {
            return Err(Error::InvalidAudio(format!(
                "channel {index} has {} frames, expected {frames}",
                channel.len()
            )));
        }

        Ok(Self {
            channels: channels.into(),
            sample_rate,
            frames,
        })
    }

    /// Mono convenience constructor.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// `frames / sample_rate`
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duration() {
        let audio = SourceAudio::new(vec![vec![0.0; 22050], vec![0.0; 22050]], 44100).unwrap();
        assert_eq!(audio.channel_count(), 2);
        assert_relative_eq!(audio.duration_seconds(), 0.5);
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let err = SourceAudio::new(vec![vec![0.0; 10], vec![0.0; 9]], 44100).unwrap_err();
        assert!(matches!(err, Error::InvalidAudio(_)));
    }

    #[test]
    fn test_rejects_bad_rate_and_no_channels() {
        assert!(matches!(
            SourceAudio::mono(vec![0.0; 10], 100),
            Err(Error::Config(vibe_core::Error::InvalidSampleRate(100)))
        ));
        assert!(matches!(
            SourceAudio::new(Vec::new(), 44100),
            Err(Error::InvalidAudio(_))
        ));
    }

    #[test]
    fn test_clone_shares_samples() {
        let audio = SourceAudio::mono(vec![0.5; 4], 48000).unwrap();
        let copy = audio.clone();
        assert!(std::ptr::eq(audio.channel(0), copy.channel(0)));
    }
}
