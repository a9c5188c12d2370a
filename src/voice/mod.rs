/// Voices - one sounding tone generator per grid row
///
/// A [`VoiceRegistry`] belongs to one channel. It knows the channel's pitch
/// table and waveform, turns a row into a [`Tone`], and hands that tone to a
/// [`ToneOutput`] which does the actual sound making. The registry keeps the
/// handle so the tone can be released again.
use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::sequencer::ROWS;

/// Amplitude of periodic voices
pub const VOICE_GAIN: f32 = 0.2;

/// Noise samples are drawn uniformly from `[-NOISE_AMPLITUDE, NOISE_AMPLITUDE]`
pub const NOISE_AMPLITUDE: f32 = 0.2;

/// Playback rate of the lowest noise row
pub const NOISE_RATE_LOW: f32 = 3_000.0;

/// Playback rate of the highest noise row
pub const NOISE_RATE_HIGH: f32 = 192_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Noise,
    Triangle,
    Sawtooth,
    Sine,
    Square,
}

impl Waveform {
    /// Channel order, top to bottom
    pub const ALL: [Waveform; 5] = [
        Waveform::Noise,
        Waveform::Triangle,
        Waveform::Sawtooth,
        Waveform::Sine,
        Waveform::Square,
    ];

    /// Position in [`Waveform::ALL`]
    pub fn index(self) -> usize {
        match self {
            Waveform::Noise => 0,
            Waveform::Triangle => 1,
            Waveform::Sawtooth => 2,
            Waveform::Sine => 3,
            Waveform::Square => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Noise => "noise",
            Waveform::Triangle => "triangle",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Sine => "sine",
            Waveform::Square => "square",
        }
    }

    /// Build the tone for `row`. Periodic shapes use the row's frequency.
    /// Noise ignores it and instead loops a random buffer whose playback
    /// rate follows the row's position in the pitch range.
    pub fn synthesize(self, channel: u8, row: usize, pitches: &PitchTable) -> Tone {
        let frequency = pitches.frequency(row);
        let signal = match self {
            Waveform::Noise => {
                let sample_rate = noise_sample_rate(frequency, pitches.lowest(), pitches.highest());
                Signal::LoopedBuffer {
                    samples: noise_buffer(sample_rate as usize),
                    sample_rate,
                }
            }
            waveform => Signal::Oscillator {
                waveform,
                gain: VOICE_GAIN,
            },
        };

        Tone {
            channel,
            frequency,
            signal,
        }
    }

    /// One sample at `phase` in `[0, 1)`
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * PI).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
            // noise sounds through a looped buffer, never an oscillator
            Waveform::Noise => 0.0,
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row frequencies, equal tempered semitones up from the base pitch,
/// stored highest first so row 0 is the top of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchTable {
    frequencies: [f32; ROWS],
}

impl PitchTable {
    pub fn new(base_pitch: f32) -> Self {
        let mut frequencies = [0.0; ROWS];
        for (i, frequency) in frequencies.iter_mut().enumerate() {
            *frequency = base_pitch * 2.0_f32.powf(i as f32 / 12.0);
        }
        frequencies.reverse();
        Self { frequencies }
    }

    pub fn frequency(&self, row: usize) -> f32 {
        self.frequencies[row]
    }

    pub fn lowest(&self) -> f32 {
        self.frequencies[ROWS - 1]
    }

    pub fn highest(&self) -> f32 {
        self.frequencies[0]
    }
}

/// Linear map of `frequency` within `[lowest, highest]` onto the noise
/// playback rate range.
pub fn noise_sample_rate(frequency: f32, lowest: f32, highest: f32) -> f32 {
    let normalized = (frequency - lowest) / (highest - lowest);
    NOISE_RATE_LOW + normalized * (NOISE_RATE_HIGH - NOISE_RATE_LOW)
}

/// `len` independent uniform samples in `[-0.2, 0.2]`
pub fn noise_buffer(len: usize) -> Arc<[f32]> {
    (0..len)
        .map(|_| (fastrand::f32() - 0.5) * 2.0 * NOISE_AMPLITUDE)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Oscillator { waveform: Waveform, gain: f32 },
    /// Played from the start and looped until released
    LoopedBuffer { samples: Arc<[f32]>, sample_rate: f32 },
}

/// Everything an output needs to sound one voice
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    pub channel: u8,
    pub frequency: f32,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToneHandle(pub u64);

/// Something that can make tones sound until told to stop
pub trait ToneOutput {
    fn start_tone(&mut self, tone: Tone) -> ToneHandle;
    fn stop_tone(&mut self, handle: ToneHandle);
}

/// Sends every tone to two outputs. Handles returned to the caller come from
/// `primary`; the matching `mirror` handles are tracked here.
pub struct Tee<A, B> {
    pub primary: A,
    pub mirror: B,
    mirrored: HashMap<ToneHandle, ToneHandle>,
}

impl<A, B> Tee<A, B> {
    pub fn new(primary: A, mirror: B) -> Self {
        Self {
            primary,
            mirror,
            mirrored: HashMap::new(),
        }
    }
}

impl<A: ToneOutput, B: ToneOutput> ToneOutput for Tee<A, B> {
    fn start_tone(&mut self, tone: Tone) -> ToneHandle {
        let mirror = self.mirror.start_tone(tone.clone());
        let handle = self.primary.start_tone(tone);
        self.mirrored.insert(handle, mirror);
        handle
    }

    fn stop_tone(&mut self, handle: ToneHandle) {
        self.primary.stop_tone(handle);
        if let Some(mirror) = self.mirrored.remove(&handle) {
            self.mirror.stop_tone(mirror);
        }
    }
}

/// A live tone bound to one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub handle: ToneHandle,
    pub frequency: f32,
}

/// Per-channel voice slots, at most one voice per row
pub struct VoiceRegistry {
    channel: u8,
    waveform: Waveform,
    pitches: PitchTable,
    slots: [Option<Voice>; ROWS],
}

impl VoiceRegistry {
    pub fn new(channel: u8, waveform: Waveform, base_pitch: f32) -> Self {
        Self {
            channel,
            waveform,
            pitches: PitchTable::new(base_pitch),
            slots: [None; ROWS],
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn pitches(&self) -> &PitchTable {
        &self.pitches
    }

    pub fn voice(&self, row: usize) -> Option<&Voice> {
        self.slots.get(row).and_then(Option::as_ref)
    }

    pub fn is_sounding(&self, row: usize) -> bool {
        self.voice(row).is_some()
    }

    pub fn sounding_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Start a voice on an empty row. Starting an occupied row is a caller
    /// bug: it asserts in debug builds and is ignored otherwise.
    pub fn start(&mut self, row: usize, output: &mut dyn ToneOutput) -> bool {
        let Some(slot) = self.slots.get_mut(row) else {
            warn!("{}: start on row {} out of range", self.waveform, row);
            return false;
        };
        debug_assert!(slot.is_none(), "{}: start on sounding row {}", self.waveform, row);
        if slot.is_some() {
            warn!("{}: start on sounding row {} ignored", self.waveform, row);
            return false;
        }

        let tone = self.waveform.synthesize(self.channel, row, &self.pitches);
        let frequency = tone.frequency;
        let handle = output.start_tone(tone);
        *slot = Some(Voice { handle, frequency });
        true
    }

    /// Release the voice on a sounding row. Stopping an empty row is a caller
    /// bug: it asserts in debug builds and is ignored otherwise.
    pub fn stop(&mut self, row: usize, output: &mut dyn ToneOutput) -> bool {
        debug_assert!(self.is_sounding(row), "{}: stop on silent row {}", self.waveform, row);
        match self.slots.get_mut(row).and_then(Option::take) {
            Some(voice) => {
                output.stop_tone(voice.handle);
                true
            }
            None => {
                warn!("{}: stop on silent row {} ignored", self.waveform, row);
                false
            }
        }
    }

    /// Stop whatever is sounding. Returns how many voices were released.
    pub fn stop_all(&mut self, output: &mut dyn ToneOutput) -> usize {
        let mut stopped = 0;
        for row in 0..ROWS {
            if self.is_sounding(row) && self.stop(row, output) {
                stopped += 1;
            }
        }
        stopped
    }
}
