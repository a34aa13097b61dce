//! Stretcher option flags and window sizes.

use std::ops::{BitOr, BitOrAssign};

/// Option bit set passed to [`StretcherModule::create_instance`](crate::StretcherModule::create_instance).
///
/// Zero-valued constants name the default of their group, so `contains` on them is
/// always true; use the `is_*` helpers to query a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StretchOptions(u32);

impl StretchOptions {
    /// Whole-track processing; requires a study pass for best results.
    pub const PROCESS_OFFLINE: Self = Self(0x0000_0000);
    /// Streaming processing with bounded latency.
    pub const PROCESS_REALTIME: Self = Self(0x0000_0001);

    pub const WINDOW_STANDARD: Self = Self(0x0000_0000);
    pub const WINDOW_SHORT: Self = Self(0x0010_0000);
    pub const WINDOW_LONG: Self = Self(0x0020_0000);

    pub const FORMANT_SHIFTED: Self = Self(0x0000_0000);
    pub const FORMANT_PRESERVED: Self = Self(0x0100_0000);

    pub const PITCH_HIGH_SPEED: Self = Self(0x0000_0000);
    pub const PITCH_HIGH_QUALITY: Self = Self(0x0200_0000);

    const WINDOW_MASK: u32 = 0x0030_0000;

    /// Preset used by the streaming controller.
    pub const fn realtime() -> Self {
        Self(Self::PROCESS_REALTIME.0 | Self::PITCH_HIGH_QUALITY.0)
    }

    /// Preset used by the offline preprocessor.
    pub const fn offline() -> Self {
        Self(Self::PROCESS_OFFLINE.0 | Self::PITCH_HIGH_QUALITY.0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_realtime(self) -> bool {
        self.contains(Self::PROCESS_REALTIME)
    }

    pub const fn preserves_formants(self) -> bool {
        self.contains(Self::FORMANT_PRESERVED)
    }

    /// Analysis window selected by the window flags.
    pub fn fft_size(self) -> FftSize {
        match self.0 & Self::WINDOW_MASK {
            0x0010_0000 => FftSize::Small,
            0x0020_0000 => FftSize::Large,
            _ => FftSize::Medium,
        }
    }
}

impl BitOr for StretchOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StretchOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// FFT size presets for latency/quality trade-off
///
/// - **Small (1024)**: minimal latency (~23ms @ 44.1kHz)
/// - **Medium (2048)**: default, balanced latency/quality (~46ms @ 44.1kHz)
/// - **Large (4096)**: extreme ratios, best frequency resolution (~93ms @ 44.1kHz)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    Small = 1024,
    #[default]
    Medium = 2048,
    Large = 4096,
}

impl FftSize {
    pub fn size(&self) -> usize {
        *self as usize
    }

    /// Analysis hop (FFT size / 4 = 75% overlap)
    pub fn hop_size(&self) -> usize {
        self.size() / 4
    }

    pub fn latency_seconds(&self, sample_rate: f64) -> f64 {
        self.size() as f64 / sample_rate
    }
}
