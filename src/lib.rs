/// GRIDSEQ - a grid step sequencer
///
/// This library provides the pieces of a 16-step, 16-row sequencer:
/// - Channel grids and the step transition that gates voices on and off
/// - A frame-polled scheduler with an injectable clock
/// - Per-channel voice registries over a closed set of waveforms
/// - Transport state (play / pause / stop) with focus handling
/// - Audio output for listening and MIDI output for mirroring

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;
pub mod voice;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::Config;
pub use error::{AudioError, ConfigError, MidiError};
pub use midi::MidiOutputDevice;
pub use sequencer::playback::{Clock, ManualClock, Scheduler, SystemClock, TimerId};
pub use sequencer::{CellStyle, Grid, GridPointer, RunState, Sequencer, Stroke};
pub use voice::{Tee, ToneOutput, VoiceRegistry, Waveform};
