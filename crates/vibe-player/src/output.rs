//! CPAL output driver for a [`PlaybackProcessor`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use vibe_stretch::StretcherModule;

use crate::processor::PlaybackProcessor;
use crate::{Error, Result};

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. The stream is only
/// created, held and dropped by its owning `AudioOutput`, never touched from
/// another thread.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

/// A running output stream driving one processor from the device callback.
///
/// Playback runs at the device rate; sources at another rate play back
/// resampled by the ratio of the two.
pub struct AudioOutput {
    sample_rate: u32,
    channels: usize,
    _stream: StreamHandle,
}

impl AudioOutput {
    /// Open `device_index` (or the default device) and start pulling quanta.
    pub fn start<M>(processor: PlaybackProcessor<M>, device_index: Option<usize>) -> Result<Self>
    where
        M: StretcherModule + Send + 'static,
    {
        let device = get_device(device_index)?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32, M>(&device, &config.into(), processor)?,
            cpal::SampleFormat::I16 => build_stream::<i16, M>(&device, &config.into(), processor)?,
            cpal::SampleFormat::U16 => build_stream::<u16, M>(&device, &config.into(), processor)?,
            format => {
                return Err(Error::InvalidDevice(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };
        stream.play()?;

        tracing::info!("Audio output started: {} channels @ {} Hz", channels, sample_rate);
        Ok(Self {
            sample_rate,
            channels,
            _stream: StreamHandle(stream),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| {
                d.name()
                    .map(|name| format!("{i}: {name}"))
                    .map_err(|e| Error::InvalidDevice(e.to_string()))
            })
            .collect()
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

fn build_stream<T, M>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut processor: PlaybackProcessor<M>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
    M: StretcherModule + Send + 'static,
{
    let channels = config.channels as usize;
    let quantum = processor.controller().config().max_quantum_frames;

    // Sized once here; the callback only shrinks and regrows them within capacity.
    let mut planar: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(quantum)).collect();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / channels.max(1);
                let mut offset = 0;
                while offset < frames {
                    let chunk = quantum.min(frames - offset);
                    for buffer in planar.iter_mut() {
                        buffer.resize(chunk, 0.0);
                    }
                    processor.process(&mut planar);
                    interleave(&mut data[offset * channels..(offset + chunk) * channels], &planar);
                    offset += chunk;
                }
            }));

            if result.is_err() {
                output_silence(data);
            }
        },
        |err| tracing::error!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

#[inline]
fn interleave<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T], planar: &[Vec<f32>]) {
    let channels = planar.len();
    for (i, sample) in data.iter_mut().enumerate() {
        *sample = T::from_sample(planar[i % channels][i / channels]);
    }
}

/// Output silence (panic recovery).
#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}
