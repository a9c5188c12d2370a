/// Startup configuration, read from command line arguments
use crate::error::ConfigError;
use crate::sequencer::{clamp_tempo, DEFAULT_TEMPO};

/// C4; sixteen semitones up from here ends on D#5.
pub const DEFAULT_BASE_PITCH: f32 = 261.626;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tempo: u32,
    pub base_pitch: f32,
    /// Start in PLAY; otherwise start in STOP
    pub autoplay: bool,
    pub midi_port: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            base_pitch: DEFAULT_BASE_PITCH,
            autoplay: true,
            midi_port: None,
        }
    }
}

impl Config {
    /// Parse `--tempo N`, `--base-pitch HZ`, `--paused` and `--midi-port N`.
    /// The program name must already be stripped from `args`.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--tempo" => {
                    let tempo: i64 = parse_value(&arg, args.next())?;
                    config.tempo = clamp_tempo(tempo);
                }
                "--base-pitch" => {
                    let pitch: f32 = parse_value(&arg, args.next())?;
                    if !(pitch.is_finite() && pitch > 0.0) {
                        return Err(ConfigError::InvalidValue {
                            flag: arg,
                            value: pitch.to_string(),
                        });
                    }
                    config.base_pitch = pitch;
                }
                "--midi-port" => {
                    config.midi_port = Some(parse_value(&arg, args.next())?);
                }
                "--paused" => config.autoplay = false,
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}
