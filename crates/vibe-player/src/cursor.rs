//! Playback position and parameter targets.

/// Parameter values requested by the control side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTargets {
    pub speed: f64,
    pub pitch_scale: f64,
    pub formant_scale: f64,
}

impl Default for PlaybackTargets {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch_scale: 1.0,
            formant_scale: 1.0,
        }
    }
}

/// Read position into the source plus the flags that drive the per-quantum state machine.
///
/// The position is kept in frames so it never drifts from the source; seconds
/// are derived on demand and always lie in `[0, duration]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackCursor {
    position_frames: usize,
    frame_count: usize,
    sample_rate: u32,

    pub target_speed: f64,
    pub target_pitch_scale: f64,
    pub target_formant_scale: f64,

    /// The next quantum must reset the engine and re-send every parameter.
    pub reset_needed: bool,
    /// The final input block has been handed to the engine.
    pub final_block_sent: bool,
    /// The engine drained after the final block; set once per run.
    pub stream_ended: bool,
    pub is_playing: bool,
}

impl PlaybackCursor {
    pub fn new(targets: PlaybackTargets, frame_count: usize, sample_rate: u32) -> Self {
        Self {
            position_frames: 0,
            frame_count,
            sample_rate: sample_rate.max(1),
            target_speed: targets.speed,
            target_pitch_scale: targets.pitch_scale,
            target_formant_scale: targets.formant_scale,
            reset_needed: true,
            final_block_sent: false,
            stream_ended: false,
            is_playing: false,
        }
    }

    pub fn position_frames(&self) -> usize {
        self.position_frames
    }

    pub fn remaining_frames(&self) -> usize {
        self.frame_count - self.position_frames
    }

    pub fn source_position_seconds(&self) -> f64 {
        self.position_frames as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Move to `seconds` (clamped to the track) and arm a reset.
    pub fn seek(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        self.position_frames = frame.min(self.frame_count);
        self.reset_needed = true;
        self.final_block_sent = false;
        self.stream_ended = false;
    }

    /// Advance by frames handed to the engine, clamped to the end of the track.
    pub fn advance(&mut self, frames: usize) {
        self.position_frames = (self.position_frames + frames).min(self.frame_count);
    }

    /// Position as heard: the cursor minus the engine's buffering delay and one quantum.
    pub fn reported_time(&self, latency_frames: usize, quantum_frames: usize) -> f64 {
        let delay = (latency_frames + quantum_frames) as f64 / self.sample_rate as f64;
        (self.source_position_seconds() - delay).max(0.0)
    }

    pub fn targets(&self) -> PlaybackTargets {
        PlaybackTargets {
            speed: self.target_speed,
            pitch_scale: self.target_pitch_scale,
            formant_scale: self.target_formant_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cursor() -> PlaybackCursor {
        PlaybackCursor::new(PlaybackTargets::default(), 44100 * 10, 44100)
    }

    #[test]
    fn test_new_cursor_needs_reset() {
        let c = cursor();
        assert!(c.reset_needed);
        assert!(!c.is_playing);
        assert_relative_eq!(c.duration_seconds(), 10.0);
    }

    #[test]
    fn test_seek_clamps_and_clears_flags() {
        let mut c = cursor();
        c.reset_needed = false;
        c.final_block_sent = true;
        c.stream_ended = true;

        c.seek(12.0);
        assert_relative_eq!(c.source_position_seconds(), 10.0);
        assert!(c.reset_needed);
        assert!(!c.final_block_sent && !c.stream_ended);

        c.seek(-3.0);
        assert_eq!(c.position_frames(), 0);
        c.seek(f64::NAN);
        assert_eq!(c.position_frames(), 0);
    }

    #[test]
    fn test_advance_clamps_to_duration() {
        let mut c = cursor();
        c.seek(9.99);
        c.advance(44100);
        assert_eq!(c.remaining_frames(), 0);
        assert_relative_eq!(c.source_position_seconds(), 10.0);
    }

    #[test]
    fn test_reported_time_is_latency_corrected() {
        let mut c = cursor();
        assert_eq!(c.reported_time(2048, 128), 0.0);
        c.seek(1.0);
        assert_relative_eq!(c.reported_time(2048, 128), 1.0 - 2176.0 / 44100.0);
    }
}
