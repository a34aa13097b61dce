//! Streaming linear-interpolation resampler used for pitch scaling.

/// Reads the input at `step` samples per output sample.
///
/// The read position is kept relative to the last sample of the previous block
/// (position 0), so interpolation is continuous across block boundaries.
#[derive(Debug, Clone)]
pub(crate) struct LinearResampler {
    step: f64,
    position: f64,
    last: f32,
}

impl LinearResampler {
    pub fn new(step: f64) -> Self {
        Self {
            step,
            position: 1.0,
            last: 0.0,
        }
    }

    pub fn set_step(&mut self, step: f64) {
        self.step = step;
    }

    pub fn reset(&mut self) {
        self.position = 1.0;
        self.last = 0.0;
    }

    /// Upper bound on the samples [`process`](Self::process) emits for `frames` of input.
    pub fn max_output(&self, frames: usize) -> usize {
        (frames as f64 / self.step).ceil() as usize + 2
    }

    pub fn process(&mut self, input: &[f32], mut emit: impl FnMut(f32)) {
        let n = input.len();
        while self.position <= n as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let a = if index == 0 { self.last } else { input[index - 1] };
            let value = if frac == 0.0 {
                a
            } else {
                a + (input[index] - a) * frac
            };
            emit(value);
            self.position += self.step;
        }
        self.position -= n as f64;
        if let Some(&last) = input.last() {
            self.last = last;
        }
    }
}
