//! Phase vocoder for time-stretching.
//!
//! STFT analysis at a fixed hop, phase propagation at a variable synthesis hop,
//! then windowed overlap-add. The overlap-add keeps a running sum of squared
//! window weights so any synthesis hop reconstructs at unity gain.
//!
//! ## RT-Safety
//!
//! All buffers are pre-allocated in [`PhaseVocoder::new`]. Nothing after
//! construction allocates.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::options::FftSize;

/// Squared-window sums below this are treated as the floor when normalising.
const NORM_FLOOR: f32 = 1e-3;

pub(crate) struct PhaseVocoder {
    fft_size: usize,
    hop_analysis: usize,

    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,

    phase_accumulator: Vec<f32>,
    last_phase: Vec<f32>,
    expected_phase_diff: Vec<f32>,
    first_frame: bool,

    // Ring positions are monotonic; the ring index is `pos % len`.
    input_fifo: Vec<f32>,
    input_write_pos: usize,
    input_read_pos: usize,

    output_fifo: Vec<f32>,
    norm_fifo: Vec<f32>,
    output_write_pos: usize,
    output_read_pos: usize,
}

impl PhaseVocoder {
    pub fn new(
        fft_size: FftSize,
        planner: &mut FftPlanner<f32>,
        input_capacity: usize,
        output_capacity: usize,
    ) -> Self {
        let size = fft_size.size();
        let hop = fft_size.hop_size();
        let num_bins = size / 2 + 1;

        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let expected_phase_diff = (0..num_bins)
            .map(|k| 2.0 * PI * (k as f32) * (hop as f32) / (size as f32))
            .collect();

        Self {
            fft_size: size,
            hop_analysis: hop,
            window: create_hann_window(size),
            forward,
            inverse,
            spectrum: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            phase_accumulator: vec![0.0; num_bins],
            last_phase: vec![0.0; num_bins],
            expected_phase_diff,
            first_frame: true,
            input_fifo: vec![0.0; input_capacity.max(size * 2)],
            input_write_pos: 0,
            input_read_pos: 0,
            output_fifo: vec![0.0; output_capacity.max(size * 2)],
            norm_fifo: vec![0.0; output_capacity.max(size * 2)],
            output_write_pos: 0,
            output_read_pos: 0,
        }
    }

    pub fn hop_analysis(&self) -> usize {
        self.hop_analysis
    }

    pub fn reset(&mut self) {
        self.spectrum.fill(Complex32::new(0.0, 0.0));
        self.phase_accumulator.fill(0.0);
        self.last_phase.fill(0.0);
        self.first_frame = true;
        self.input_fifo.fill(0.0);
        self.output_fifo.fill(0.0);
        self.norm_fifo.fill(0.0);
        self.input_write_pos = 0;
        self.input_read_pos = 0;
        self.output_write_pos = 0;
        self.output_read_pos = 0;
    }

    #[inline]
    pub fn push_input(&mut self, sample: f32) {
        let len = self.input_fifo.len();
        self.input_fifo[self.input_write_pos % len] = sample;
        self.input_write_pos += 1;
    }

    /// Zero-pad the input up to one full analysis frame.
    pub fn pad_to_frame(&mut self) {
        while self.input_available() < self.fft_size {
            self.push_input(0.0);
        }
    }

    #[inline]
    pub fn input_available(&self) -> usize {
        self.input_write_pos - self.input_read_pos
    }

    #[inline]
    pub fn input_free(&self) -> usize {
        self.input_fifo.len() - self.input_available()
    }

    #[inline]
    pub fn has_frame(&self) -> bool {
        self.input_available() >= self.fft_size
    }

    /// Whether the next frame's overlap-add region fits without touching unread output.
    #[inline]
    pub fn has_output_room(&self) -> bool {
        self.output_write_pos + self.fft_size <= self.output_read_pos + self.output_fifo.len()
    }

    /// Total finalised output frames since the last reset.
    #[inline]
    pub fn produced(&self) -> usize {
        self.output_write_pos
    }

    #[inline]
    pub fn output_available(&self) -> usize {
        self.output_write_pos - self.output_read_pos
    }

    /// Pop normalised output; popped slots are cleared for the next overlap-add.
    pub fn pop_output(&mut self, output: &mut [f32]) -> usize {
        let count = output.len().min(self.output_available());
        let len = self.output_fifo.len();

        for (i, sample) in output.iter_mut().take(count).enumerate() {
            let idx = (self.output_read_pos + i) % len;
            *sample = self.output_fifo[idx] / self.norm_fifo[idx].max(NORM_FLOOR);
            self.output_fifo[idx] = 0.0;
            self.norm_fifo[idx] = 0.0;
        }
        self.output_read_pos += count;
        count
    }

    /// Analyse one frame at the analysis hop and overlap-add it at `synthesis_hop`.
    ///
    /// Callers check [`has_frame`](Self::has_frame) and
    /// [`has_output_room`](Self::has_output_room) first.
    pub fn process_frame(&mut self, synthesis_hop: usize) {
        let in_len = self.input_fifo.len();
        let out_len = self.output_fifo.len();
        let num_bins = self.fft_size / 2 + 1;

        for i in 0..self.fft_size {
            let sample = self.input_fifo[(self.input_read_pos + i) % in_len];
            self.spectrum[i] = Complex32::new(sample * self.window[i], 0.0);
        }
        self.input_read_pos += self.hop_analysis;

        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let hop_scale = synthesis_hop as f32 / self.hop_analysis as f32;
        for k in 0..num_bins {
            let magnitude = self.spectrum[k].norm();
            let phase = self.spectrum[k].arg();

            if self.first_frame {
                self.phase_accumulator[k] = phase;
            } else {
                let expected = self.expected_phase_diff[k];
                let deviation = wrap_phase(phase - self.last_phase[k] - expected);
                self.phase_accumulator[k] =
                    wrap_phase(self.phase_accumulator[k] + (expected + deviation) * hop_scale);
            }
            self.last_phase[k] = phase;

            self.spectrum[k] = Complex32::from_polar(magnitude, self.phase_accumulator[k]);
        }
        self.first_frame = false;

        // Conjugate symmetry for a real-valued result
        for k in 1..num_bins - 1 {
            self.spectrum[self.fft_size - k] = self.spectrum[k].conj();
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        for i in 0..self.fft_size {
            let idx = (self.output_write_pos + i) % out_len;
            let w = self.window[i];
            self.output_fifo[idx] += self.spectrum[i].re * scale * w;
            self.norm_fifo[idx] += w * w;
        }
        self.output_write_pos += synthesis_hop;
    }
}

fn create_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Wrap phase to [-PI, PI]
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}
