/// MIDI output using midir
///
/// Mirrors voices as note on/off messages. Each sequencer channel sends on
/// the MIDI channel with the same index.
use std::collections::HashMap;

use log::{info, warn};
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::MidiError;
use crate::voice::{Tone, ToneHandle, ToneOutput};

const CLIENT_NAME: &str = "gridseq MIDI Output";
const VELOCITY: u8 = 100;

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    sounding: HashMap<ToneHandle, (u8, u8)>,
    next_handle: u64,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            sounding: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(err) => {
                warn!("cannot list MIDI ports: {}", err);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "gridseq")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        self.disconnect();
        self.connection = Some(connection);
        info!("MIDI connected to {}", name);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn send_note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), MidiError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x90 | (channel & 0x0F), note, velocity])?;
        }
        Ok(())
    }

    pub fn send_note_off(&mut self, channel: u8, note: u8) -> Result<(), MidiError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x80 | (channel & 0x0F), note, 0])?;
        }
        Ok(())
    }

    /// Release any sounding notes, then drop the connection
    pub fn disconnect(&mut self) {
        let sounding: Vec<_> = self.sounding.drain().map(|(_, note)| note).collect();
        for (channel, note) in sounding {
            if let Err(err) = self.send_note_off(channel, note) {
                warn!("{}", err);
            }
        }
        self.connection = None;
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneOutput for MidiOutputDevice {
    fn start_tone(&mut self, tone: Tone) -> ToneHandle {
        let handle = ToneHandle(self.next_handle);
        self.next_handle += 1;

        let note = frequency_to_midi_note(tone.frequency);
        if let Err(err) = self.send_note_on(tone.channel, note, VELOCITY) {
            warn!("{}", err);
        }
        self.sounding.insert(handle, (tone.channel, note));
        handle
    }

    fn stop_tone(&mut self, handle: ToneHandle) {
        if let Some((channel, note)) = self.sounding.remove(&handle) {
            if let Err(err) = self.send_note_off(channel, note) {
                warn!("{}", err);
            }
        }
    }
}

/// Nearest MIDI note to `frequency`
pub fn frequency_to_midi_note(frequency: f32) -> u8 {
    if frequency <= 0.0 {
        return 0;
    }
    let note = 69.0 + 12.0 * (frequency / 440.0).log2();
    note.round().clamp(0.0, 127.0) as u8
}
