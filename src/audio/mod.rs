/// Audio output using cpal
///
/// Live tones sit in a list shared with the audio callback. Starting and
/// stopping a tone only takes the lock long enough to push or remove one
/// entry, so the callback always sees whole start/stop pairs.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AudioError;
use crate::voice::{Signal, Tone, ToneHandle, ToneOutput};

/// Sample rate assumed when there is no device
const FALLBACK_SAMPLE_RATE: f32 = 44_100.0;

struct PlayingTone {
    handle: ToneHandle,
    tone: Tone,
    phase: f32,
    position: f64,
}

impl PlayingTone {
    fn new(handle: ToneHandle, tone: Tone) -> Self {
        Self {
            handle,
            tone,
            phase: 0.0,
            position: 0.0,
        }
    }

    fn next_sample(&mut self, output_rate: f32) -> f32 {
        match &self.tone.signal {
            Signal::Oscillator { waveform, gain } => {
                let sample = waveform.sample(self.phase) * gain;
                self.phase += self.tone.frequency / output_rate;
                if self.phase >= 1.0 {
                    self.phase -= self.phase.floor();
                }
                sample
            }
            Signal::LoopedBuffer {
                samples,
                sample_rate,
            } => {
                if samples.is_empty() {
                    return 0.0;
                }
                let sample = samples[self.position as usize % samples.len()];
                self.position += (*sample_rate / output_rate) as f64;
                if self.position >= samples.len() as f64 {
                    self.position %= samples.len() as f64;
                }
                sample
            }
        }
    }
}

type SharedTones = Arc<Mutex<Vec<PlayingTone>>>;

fn lock(tones: &SharedTones) -> MutexGuard<'_, Vec<PlayingTone>> {
    tones.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mix every live tone into interleaved `data` with `channels` channels
fn render_into(tones: &SharedTones, data: &mut [f32], channels: usize, sample_rate: f32) {
    let mut tones = lock(tones);
    for frame in data.chunks_mut(channels.max(1)) {
        let value: f32 = tones
            .iter_mut()
            .map(|tone| tone.next_sample(sample_rate))
            .sum();
        frame.fill(value);
    }
}

pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    tones: SharedTones,
    next_handle: u64,
    sample_rate: f32,
}

impl AudioOutput {
    pub fn new() -> Result<Self, AudioError> {
        let tones: SharedTones = Arc::new(Mutex::new(Vec::new()));
        let (stream, sample_rate) = Self::setup_audio_stream(Arc::clone(&tones))?;

        Ok(Self {
            stream: Some(stream),
            tones,
            next_handle: 0,
            sample_rate,
        })
    }

    /// An output with no device behind it. Tones are tracked but never heard.
    pub fn silent() -> Self {
        Self {
            stream: None,
            tones: Arc::new(Mutex::new(Vec::new())),
            next_handle: 0,
            sample_rate: FALLBACK_SAMPLE_RATE,
        }
    }

    fn setup_audio_stream(tones: SharedTones) -> Result<(cpal::Stream, f32), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_into(&tones, data, channels, sample_rate);
                },
                |err| error!("audio stream error: {}", err),
                None,
            )?,
            format => return Err(AudioError::UnsupportedFormat(format)),
        };

        stream.play()?;
        info!("audio output at {} Hz, {} channels", sample_rate, channels);
        Ok((stream, sample_rate))
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn live_tones(&self) -> usize {
        lock(&self.tones).len()
    }

    /// Mix the live tones into `data` as the device callback would
    pub fn render(&self, data: &mut [f32], channels: usize) {
        render_into(&self.tones, data, channels, self.sample_rate);
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(|err| {
            warn!("audio unavailable, running silent: {}", err);
            Self::silent()
        })
    }
}

impl ToneOutput for AudioOutput {
    fn start_tone(&mut self, tone: Tone) -> ToneHandle {
        let handle = ToneHandle(self.next_handle);
        self.next_handle += 1;
        lock(&self.tones).push(PlayingTone::new(handle, tone));
        handle
    }

    fn stop_tone(&mut self, handle: ToneHandle) {
        lock(&self.tones).retain(|tone| tone.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{PitchTable, Waveform};

    #[test]
    fn test_silent_output_tracks_tones() {
        let mut output = AudioOutput::silent();
        assert!(!output.is_running());

        let pitches = PitchTable::new(220.0);
        let a = output.start_tone(Waveform::Sine.synthesize(0, 0, &pitches));
        let b = output.start_tone(Waveform::Noise.synthesize(0, 3, &pitches));
        assert_ne!(a, b);
        assert_eq!(output.live_tones(), 2);

        output.stop_tone(a);
        assert_eq!(output.live_tones(), 1);
        output.stop_tone(a);
        assert_eq!(output.live_tones(), 1);
    }

    #[test]
    fn test_render_fills_every_channel_of_a_frame() {
        let mut output = AudioOutput::silent();
        let pitches = PitchTable::new(440.0);
        output.start_tone(Waveform::Square.synthesize(0, 15, &pitches));

        let mut data = vec![0.0; 64];
        output.render(&mut data, 2);
        for frame in data.chunks(2) {
            assert_eq!(frame[0], frame[1]);
            assert!((frame[0].abs() - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_render_is_silent_without_tones() {
        let mut output = AudioOutput::silent();
        let pitches = PitchTable::new(440.0);
        let handle = output.start_tone(Waveform::Sawtooth.synthesize(0, 0, &pitches));
        output.stop_tone(handle);

        let mut data = vec![1.0; 32];
        output.render(&mut data, 1);
        assert!(data.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_noise_loops_through_buffer() {
        let samples: Arc<[f32]> = Arc::from(vec![0.1, -0.1, 0.05]);
        let mut tone = PlayingTone::new(
            ToneHandle(0),
            Tone {
                channel: 0,
                frequency: 0.0,
                signal: Signal::LoopedBuffer {
                    samples,
                    sample_rate: 100.0,
                },
            },
        );
        let played: Vec<f32> = (0..7).map(|_| tone.next_sample(100.0)).collect();
        assert_eq!(played, vec![0.1, -0.1, 0.05, 0.1, -0.1, 0.05, 0.1]);
    }
}
