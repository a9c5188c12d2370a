/// Core sequencer logic - channel grids, step transitions and transport state
///
/// [`Sequencer`] is the application context. The host owns one and calls
/// [`Sequencer::tick`] once per frame; everything else (editing, transport
/// buttons, focus changes) goes through its methods on the same thread.
use log::{debug, info, trace};

use crate::config::Config;
use crate::voice::{ToneOutput, VoiceRegistry, Waveform};

pub mod playback;

use self::playback::{Clock, Scheduler, TimerId};

/// Steps per cycle, one grid column each
pub const STEPS: usize = 16;

/// Pitch lanes per channel
pub const ROWS: usize = 16;

pub const MIN_TEMPO: u32 = 1;
pub const MAX_TEMPO: u32 = 300;
pub const DEFAULT_TEMPO: u32 = 120;

/// Beat index after a stop, so the next step lands on column 0
pub const REWOUND_BEAT: usize = STEPS - 1;

/// Clamp user tempo input into `[MIN_TEMPO, MAX_TEMPO]`
pub fn clamp_tempo(tempo: i64) -> u32 {
    tempo.clamp(MIN_TEMPO as i64, MAX_TEMPO as i64) as u32
}

/// Sixteenth-note period for `tempo` beats per minute. Tempo 0 maps to an
/// interval of 0, which never fires.
pub fn tempo_to_interval_ms(tempo: u32) -> f64 {
    if tempo == 0 {
        return 0.0;
    }
    (1000.0 / (tempo as f64 / 60.0)) / 4.0
}

/// 16 columns by 16 rows of on/off cells. `x` is the column (step), `y` the
/// row (pitch lane, 0 = highest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    columns: [[bool; ROWS]; STEPS],
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    pub fn new() -> Self {
        Self {
            columns: [[false; ROWS]; STEPS],
        }
    }

    pub fn width(&self) -> usize {
        STEPS
    }

    pub fn height(&self) -> usize {
        ROWS
    }

    /// Cell under an offset from the grid's top-left corner
    pub fn cell_at(offset_x: f32, offset_y: f32, cell_size: f32) -> Option<(usize, usize)> {
        if offset_x < 0.0 || offset_y < 0.0 || cell_size <= 0.0 {
            return None;
        }
        let x = (offset_x / cell_size) as usize;
        let y = (offset_y / cell_size) as usize;
        (x < STEPS && y < ROWS).then_some((x, y))
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.columns
            .get(x)
            .and_then(|column| column.get(y))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if let Some(column) = self.columns.get_mut(x) {
            if let Some(cell) = column.get_mut(y) {
                *cell = value;
            }
        }
    }

    /// Flip a cell and return its new state
    pub fn toggle(&mut self, x: usize, y: usize) -> bool {
        let value = !self.get(x, y);
        self.set(x, y, value);
        value
    }

    pub fn column(&self, x: usize) -> &[bool; ROWS] {
        &self.columns[x % STEPS]
    }

    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.fill(false);
        }
    }

    pub fn active_count(&self) -> usize {
        self.columns.iter().flatten().filter(|cell| **cell).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }
}

/// Click-and-drag painting. The click toggles a cell; every other cell the
/// drag passes over is set to the clicked cell's new value, once.
#[derive(Debug, Clone)]
pub struct Stroke {
    value: bool,
    visited: Vec<(usize, usize)>,
}

impl Stroke {
    pub fn begin(grid: &mut Grid, x: usize, y: usize) -> Self {
        let value = grid.toggle(x, y);
        Self {
            value,
            visited: vec![(x, y)],
        }
    }

    pub fn value(&self) -> bool {
        self.value
    }

    /// Returns true when the cell was newly painted
    pub fn extend(&mut self, grid: &mut Grid, x: usize, y: usize) -> bool {
        if self.visited.contains(&(x, y)) {
            return false;
        }
        grid.set(x, y, self.value);
        self.visited.push((x, y));
        true
    }

    /// Feed one frame of pointer state. A press on the grid starts a stroke,
    /// holding extends it over newly entered cells, release ends it.
    pub fn follow(stroke: &mut Option<Stroke>, grid: &mut Grid, pointer: GridPointer) {
        match pointer {
            GridPointer::Pressed(x, y) => *stroke = Some(Stroke::begin(grid, x, y)),
            GridPointer::Held(Some((x, y))) => {
                if let Some(stroke) = stroke.as_mut() {
                    stroke.extend(grid, x, y);
                }
            }
            GridPointer::Held(None) => {}
            GridPointer::Released => *stroke = None,
        }
    }
}

/// Primary button state of the grid widget for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPointer {
    /// Pressed on the grid this frame
    Pressed(usize, usize),
    /// Still held since a press on the grid, over a cell or off the grid
    Held(Option<(usize, usize)>),
    Released,
}

/// How a cell should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStyle {
    Active,
    /// Inactive cell in the column currently sounding
    Highlighted,
    /// Inactive cell on a quarter-note column
    Downbeat,
    Plain,
}

impl CellStyle {
    pub fn classify(grid: &Grid, x: usize, y: usize, current_beat: usize) -> Self {
        if grid.get(x, y) {
            CellStyle::Active
        } else if x == current_beat {
            CellStyle::Highlighted
        } else if x % 4 == 0 {
            CellStyle::Downbeat
        } else {
            CellStyle::Plain
        }
    }
}

/// A waveform with its own grid and voices
pub struct Channel {
    pub grid: Grid,
    pub voices: VoiceRegistry,
}

impl Channel {
    pub fn new(waveform: Waveform, base_pitch: f32) -> Self {
        Self {
            grid: Grid::new(),
            voices: VoiceRegistry::new(waveform.index() as u8, waveform, base_pitch),
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.voices.waveform()
    }
}

/// Channels, the shared beat counter and the output voices sound on.
/// This is what the beat timer mutates.
pub struct Engine<O> {
    channels: Vec<Channel>,
    current_beat: usize,
    output: O,
}

impl<O: ToneOutput> Engine<O> {
    pub fn new(base_pitch: f32, output: O) -> Self {
        Self {
            channels: Waveform::ALL
                .iter()
                .map(|&waveform| Channel::new(waveform, base_pitch))
                .collect(),
            current_beat: REWOUND_BEAT,
            output,
        }
    }

    pub fn current_beat(&self) -> usize {
        self.current_beat
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, waveform: Waveform) -> &Channel {
        &self.channels[waveform.index()]
    }

    pub fn channel_mut(&mut self, waveform: Waveform) -> &mut Channel {
        &mut self.channels[waveform.index()]
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Advance one step. Every sounding voice is released first, then the
    /// new column's active rows start, so a row held across two columns is
    /// re-attacked rather than sustained.
    pub fn step(&mut self) {
        let next_beat = (self.current_beat + 1) % STEPS;

        for channel in &mut self.channels {
            for row in 0..ROWS {
                if channel.voices.is_sounding(row) {
                    channel.voices.stop(row, &mut self.output);
                }
            }

            let column = *channel.grid.column(next_beat);
            for (row, active) in column.iter().enumerate() {
                if *active {
                    channel.voices.start(row, &mut self.output);
                }
            }
        }

        trace!("step {} -> {}", self.current_beat, next_beat);
        self.current_beat = next_beat;
    }

    /// Release every sounding voice on every channel
    pub fn silence(&mut self) -> usize {
        let output = &mut self.output;
        self.channels
            .iter_mut()
            .map(|channel| channel.voices.stop_all(&mut *output))
            .sum()
    }

    pub fn sounding_count(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.voices.sounding_count())
            .sum()
    }

    fn rewind(&mut self) {
        self.current_beat = REWOUND_BEAT;
    }

    fn reset_channel(&mut self, waveform: Waveform) {
        let channel = &mut self.channels[waveform.index()];
        channel.voices.stop_all(&mut self.output);
        channel.grid.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Play,
    Pause,
    Stop,
}

impl RunState {
    pub fn name(self) -> &'static str {
        match self {
            RunState::Play => "play",
            RunState::Pause => "pause",
            RunState::Stop => "stop",
        }
    }
}

pub struct Sequencer<O> {
    engine: Engine<O>,
    scheduler: Scheduler<Engine<O>>,
    beat_timer: Option<TimerId>,
    run_state: RunState,
    tempo: u32,
    resume_on_focus: Option<RunState>,
    selected: Waveform,
}

impl<O: ToneOutput + 'static> Sequencer<O> {
    pub fn new(config: &Config, output: O, clock: Box<dyn Clock>) -> Self {
        let mut sequencer = Self {
            engine: Engine::new(config.base_pitch, output),
            scheduler: Scheduler::new(clock),
            beat_timer: None,
            run_state: RunState::Stop,
            tempo: clamp_tempo(config.tempo as i64),
            resume_on_focus: None,
            selected: Waveform::Square,
        };

        if config.autoplay {
            sequencer.play();
        } else {
            sequencer.stop();
        }
        sequencer
    }

    /// One frame of the host loop: fire whatever timers are due
    pub fn tick(&mut self) -> usize {
        self.scheduler.tick(&mut self.engine)
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn current_beat(&self) -> usize {
        self.engine.current_beat()
    }

    /// Interval of the beat timer, 0 while paused or stopped
    pub fn beat_interval_ms(&self) -> f64 {
        self.beat_timer
            .and_then(|id| self.scheduler.interval_ms(id))
            .unwrap_or(0.0)
    }

    pub fn engine(&self) -> &Engine<O> {
        &self.engine
    }

    pub fn output(&self) -> &O {
        self.engine.output()
    }

    pub fn output_mut(&mut self) -> &mut O {
        self.engine.output_mut()
    }

    pub fn grid(&self, waveform: Waveform) -> &Grid {
        &self.engine.channel(waveform).grid
    }

    /// Edits take effect the next time the playhead enters the column
    pub fn grid_mut(&mut self, waveform: Waveform) -> &mut Grid {
        &mut self.engine.channel_mut(waveform).grid
    }

    pub fn selected_channel(&self) -> Waveform {
        self.selected
    }

    /// Choose the channel being edited. Playback of other channels is unaffected.
    pub fn select_channel(&mut self, waveform: Waveform) {
        self.selected = waveform;
    }

    pub fn play(&mut self) {
        self.schedule_beat(tempo_to_interval_ms(self.tempo));
        self.set_run_state(RunState::Play);
    }

    /// Silence everything and hold the beat position
    pub fn pause(&mut self) {
        self.engine.silence();
        self.schedule_beat(0.0);
        self.set_run_state(RunState::Pause);
    }

    /// Pause, then rewind so the next play starts on column 0
    pub fn stop(&mut self) {
        self.pause();
        self.engine.rewind();
        self.set_run_state(RunState::Stop);
    }

    /// Run the entry action of `state`
    pub fn enter(&mut self, state: RunState) {
        match state {
            RunState::Play => self.play(),
            RunState::Pause => self.pause(),
            RunState::Stop => self.stop(),
        }
    }

    /// Store a new tempo, clamped to `[1, 300]`. While playing the beat timer
    /// restarts at the new interval, which jumps the phase.
    ///
    /// Tempo 0 is not accepted as a way to pause: it clamps to 1. Pausing
    /// goes through [`Sequencer::pause`], which parks the beat timer on a
    /// zero interval that never fires.
    pub fn set_tempo(&mut self, tempo: i64) {
        self.tempo = clamp_tempo(tempo);
        debug!(
            "tempo {} ({:.1} ms per step)",
            self.tempo,
            tempo_to_interval_ms(self.tempo)
        );
        if self.run_state == RunState::Play {
            self.schedule_beat(tempo_to_interval_ms(self.tempo));
        }
    }

    /// Pause and remember what to go back to. A second loss before a regain
    /// replaces the remembered state.
    pub fn focus_lost(&mut self) {
        let previous = self.run_state;
        debug!("focus lost while {}", previous.name());
        self.pause();
        self.resume_on_focus = Some(previous);
    }

    /// Restore the state from before the last focus loss, once
    pub fn focus_gained(&mut self) {
        if let Some(state) = self.resume_on_focus.take() {
            debug!("focus regained, resuming {}", state.name());
            self.enter(state);
        }
    }

    pub fn pending_resume(&self) -> Option<RunState> {
        self.resume_on_focus
    }

    /// Clear every grid and silence every voice. Beat and run state stay.
    pub fn reset_all(&mut self) {
        for waveform in Waveform::ALL {
            self.engine.reset_channel(waveform);
        }
        info!("reset all channels");
    }

    pub fn reset_channel(&mut self, waveform: Waveform) {
        self.engine.reset_channel(waveform);
        info!("reset {} channel", waveform);
    }

    pub fn reset_selected_channel(&mut self) {
        self.reset_channel(self.selected);
    }

    fn schedule_beat(&mut self, interval_ms: f64) {
        if let Some(id) = self.beat_timer.take() {
            self.scheduler.cancel(id);
        }
        let id = self
            .scheduler
            .schedule(interval_ms, |engine: &mut Engine<O>| engine.step());
        self.beat_timer = Some(id);
    }

    fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
        info!("changing state to: {}", state.name());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::playback::ManualClock;
    use super::*;
    use crate::voice::testing::{RecordingOutput, ToneEvent};

    fn sequencer(config: Config) -> (ManualClock, Sequencer<RecordingOutput>) {
        let clock = ManualClock::new();
        let sequencer = Sequencer::new(&config, RecordingOutput::default(), Box::new(clock.clone()));
        (clock, sequencer)
    }

    /// Advance just past one beat interval and run a frame
    fn next_step(clock: &ManualClock, sequencer: &mut Sequencer<RecordingOutput>) {
        clock.advance(sequencer.beat_interval_ms() + 1.0);
        sequencer.tick();
    }

    fn assert_one_voice_per_row(sequencer: &Sequencer<RecordingOutput>) {
        let engine = sequencer.engine();
        assert_eq!(engine.sounding_count(), sequencer.output().live());
        for channel in engine.channels() {
            let handles: Vec<_> = (0..ROWS)
                .filter_map(|row| channel.voices.voice(row).map(|v| v.handle))
                .collect();
            let unique: HashSet<_> = handles.iter().collect();
            assert_eq!(handles.len(), unique.len());
        }
    }

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new();
        assert_eq!(grid.width(), 16);
        assert_eq!(grid.height(), 16);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = Grid::new();
        assert!(grid.toggle(3, 4));
        assert!(grid.get(3, 4));
        assert!(!grid.toggle(3, 4));
        assert!(!grid.get(3, 4));
        assert_eq!(grid, Grid::new());
    }

    #[test]
    fn test_grid_out_of_range_is_ignored() {
        let mut grid = Grid::new();
        grid.set(16, 0, true);
        grid.set(0, 16, true);
        assert!(!grid.get(16, 0));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_stroke_paints_with_clicked_value() {
        let mut grid = Grid::new();
        grid.set(2, 0, true);

        let mut stroke = Stroke::begin(&mut grid, 0, 0);
        assert!(stroke.value());
        assert!(stroke.extend(&mut grid, 1, 0));
        assert!(stroke.extend(&mut grid, 2, 0));
        assert!(!stroke.extend(&mut grid, 1, 0));
        assert!(!stroke.extend(&mut grid, 0, 0));
        assert_eq!(grid.active_count(), 3);

        // an erasing stroke
        let mut stroke = Stroke::begin(&mut grid, 1, 0);
        assert!(!stroke.value());
        stroke.extend(&mut grid, 2, 0);
        stroke.extend(&mut grid, 5, 5);
        assert_eq!(grid.active_count(), 1);
        assert!(grid.get(0, 0));
    }

    #[test]
    fn test_cell_at() {
        assert_eq!(Grid::cell_at(0.0, 0.0, 36.0), Some((0, 0)));
        assert_eq!(Grid::cell_at(37.0, 71.9, 36.0), Some((1, 1)));
        assert_eq!(Grid::cell_at(575.9, 575.9, 36.0), Some((15, 15)));
        assert_eq!(Grid::cell_at(576.0, 10.0, 36.0), None);
        assert_eq!(Grid::cell_at(-1.0, 10.0, 36.0), None);
    }

    #[test]
    fn test_follow_pointer_frames() {
        let mut grid = Grid::new();
        let mut stroke = None;

        // held without a press on the grid paints nothing
        Stroke::follow(&mut stroke, &mut grid, GridPointer::Held(Some((3, 3))));
        assert_eq!(grid.active_count(), 0);

        Stroke::follow(&mut stroke, &mut grid, GridPointer::Pressed(0, 0));
        Stroke::follow(&mut stroke, &mut grid, GridPointer::Held(Some((0, 0))));
        Stroke::follow(&mut stroke, &mut grid, GridPointer::Held(None));
        Stroke::follow(&mut stroke, &mut grid, GridPointer::Held(Some((1, 0))));
        assert!(stroke.is_some());
        assert!(grid.get(0, 0) && grid.get(1, 0));
        assert_eq!(grid.active_count(), 2);

        Stroke::follow(&mut stroke, &mut grid, GridPointer::Released);
        assert!(stroke.is_none());
        Stroke::follow(&mut stroke, &mut grid, GridPointer::Held(Some((2, 0))));
        assert_eq!(grid.active_count(), 2);
    }

    #[test]
    fn test_cell_style() {
        let mut grid = Grid::new();
        grid.set(4, 1, true);
        assert_eq!(CellStyle::classify(&grid, 4, 1, 4), CellStyle::Active);
        assert_eq!(CellStyle::classify(&grid, 4, 2, 4), CellStyle::Highlighted);
        assert_eq!(CellStyle::classify(&grid, 8, 2, 4), CellStyle::Downbeat);
        assert_eq!(CellStyle::classify(&grid, 5, 2, 4), CellStyle::Plain);
    }

    #[test]
    fn test_tempo_intervals() {
        assert_eq!(tempo_to_interval_ms(60), 250.0);
        assert_eq!(tempo_to_interval_ms(120), 125.0);
        assert_eq!(tempo_to_interval_ms(1), 15000.0);
        assert_eq!(tempo_to_interval_ms(300), 50.0);
        assert_eq!(tempo_to_interval_ms(0), 0.0);
    }

    #[test]
    fn test_tempo_clamp() {
        assert_eq!(clamp_tempo(0), 1);
        assert_eq!(clamp_tempo(-20), 1);
        assert_eq!(clamp_tempo(301), 300);
        assert_eq!(clamp_tempo(96), 96);
    }

    #[test]
    fn test_starts_playing_before_column_zero() {
        let (clock, mut seq) = sequencer(Config::default());
        assert_eq!(seq.run_state(), RunState::Play);
        assert_eq!(seq.tempo(), 120);
        assert_eq!(seq.current_beat(), 15);
        assert_eq!(seq.beat_interval_ms(), 125.0);
        assert_eq!(seq.selected_channel(), Waveform::Square);

        next_step(&clock, &mut seq);
        assert_eq!(seq.current_beat(), 0);
    }

    #[test]
    fn test_channels_follow_waveform_order() {
        let (_clock, seq) = sequencer(Config::default());
        let order: Vec<_> = seq.engine().channels().iter().map(Channel::waveform).collect();
        assert_eq!(order, Waveform::ALL.to_vec());
        for waveform in Waveform::ALL {
            assert_eq!(seq.engine().channel(waveform).waveform(), waveform);
        }
    }

    #[test]
    fn test_paused_config_starts_stopped() {
        let config = Config {
            autoplay: false,
            ..Config::default()
        };
        let (clock, mut seq) = sequencer(config);
        assert_eq!(seq.run_state(), RunState::Stop);
        clock.advance(60_000.0);
        assert_eq!(seq.tick(), 0);
        assert_eq!(seq.current_beat(), 15);
    }

    #[test]
    fn test_sixteen_steps_wrap() {
        let (clock, mut seq) = sequencer(Config::default());
        let start = seq.current_beat();
        for _ in 0..STEPS {
            next_step(&clock, &mut seq);
        }
        assert_eq!(seq.current_beat(), start);
    }

    #[test]
    fn test_step_starts_active_rows() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.grid_mut(Waveform::Sine).set(0, 3, true);
        seq.grid_mut(Waveform::Noise).set(0, 0, true);
        seq.grid_mut(Waveform::Sine).set(1, 4, true);

        next_step(&clock, &mut seq);
        let sine = &seq.engine().channel(Waveform::Sine).voices;
        assert!(sine.is_sounding(3));
        assert!(seq.engine().channel(Waveform::Noise).voices.is_sounding(0));
        assert_eq!(seq.engine().sounding_count(), 2);

        next_step(&clock, &mut seq);
        let sine = &seq.engine().channel(Waveform::Sine).voices;
        assert!(!sine.is_sounding(3));
        assert!(sine.is_sounding(4));
        assert_eq!(seq.engine().sounding_count(), 1);
        assert_one_voice_per_row(&seq);
    }

    #[test]
    fn test_held_row_is_retriggered() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.grid_mut(Waveform::Square).set(0, 5, true);
        seq.grid_mut(Waveform::Square).set(1, 5, true);

        next_step(&clock, &mut seq);
        let first = seq.engine().channel(Waveform::Square).voices.voice(5).unwrap().handle;
        let events_before = seq.output().events.len();

        next_step(&clock, &mut seq);
        let second = seq.engine().channel(Waveform::Square).voices.voice(5).unwrap().handle;
        assert_ne!(first, second);

        let events = &seq.output().events[events_before..];
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ToneEvent::Stop { handle: first });
        assert!(matches!(events[1], ToneEvent::Start { handle, .. } if handle == second));
    }

    #[test]
    fn test_one_voice_per_row_under_edits() {
        let (clock, mut seq) = sequencer(Config::default());
        for step in 0..40 {
            let x = (step * 7) % STEPS;
            let y = (step * 5) % ROWS;
            let waveform = Waveform::ALL[step % Waveform::ALL.len()];
            seq.grid_mut(waveform).toggle(x, y);
            seq.grid_mut(waveform).toggle((x + 1) % STEPS, y);
            next_step(&clock, &mut seq);
            assert_one_voice_per_row(&seq);
        }
        assert_eq!(seq.output().starts() - seq.output().stops(), seq.output().live());
    }

    #[test]
    fn test_pause_silences_and_holds_position() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.grid_mut(Waveform::Triangle).set(0, 1, true);
        seq.grid_mut(Waveform::Triangle).set(1, 2, true);
        next_step(&clock, &mut seq);
        assert_eq!(seq.engine().sounding_count(), 1);
        let grid = seq.grid(Waveform::Triangle).clone();

        seq.pause();
        assert_eq!(seq.run_state(), RunState::Pause);
        assert_eq!(seq.engine().sounding_count(), 0);
        assert_eq!(seq.output().live(), 0);
        assert_eq!(seq.current_beat(), 0);
        assert_eq!(seq.grid(Waveform::Triangle), &grid);
        assert_eq!(seq.beat_interval_ms(), 0.0);

        clock.advance(10_000.0);
        assert_eq!(seq.tick(), 0);
        assert_eq!(seq.current_beat(), 0);

        seq.play();
        next_step(&clock, &mut seq);
        assert_eq!(seq.current_beat(), 1);
        assert!(seq.engine().channel(Waveform::Triangle).voices.is_sounding(2));
    }

    #[test]
    fn test_stop_rewinds_to_column_zero() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.grid_mut(Waveform::Sawtooth).set(0, 0, true);
        for _ in 0..5 {
            next_step(&clock, &mut seq);
        }
        assert_eq!(seq.current_beat(), 4);

        seq.stop();
        assert_eq!(seq.run_state(), RunState::Stop);
        assert_eq!(seq.current_beat(), REWOUND_BEAT);
        assert_eq!(seq.engine().sounding_count(), 0);
        assert!(seq.grid(Waveform::Sawtooth).get(0, 0));

        seq.play();
        next_step(&clock, &mut seq);
        assert_eq!(seq.current_beat(), 0);
        assert!(seq.engine().channel(Waveform::Sawtooth).voices.is_sounding(0));
    }

    #[test]
    fn test_tempo_change_while_playing_reschedules() {
        let (clock, mut seq) = sequencer(Config::default());
        clock.advance(100.0);
        seq.set_tempo(60);
        assert_eq!(seq.beat_interval_ms(), 250.0);

        // window restarted at the change
        clock.advance(200.0);
        assert_eq!(seq.tick(), 0);
        clock.advance(51.0);
        assert_eq!(seq.tick(), 1);
    }

    #[test]
    fn test_zero_tempo_keeps_playing_at_slowest() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.set_tempo(0);
        assert_eq!(seq.tempo(), 1);
        assert_eq!(seq.run_state(), RunState::Play);
        assert_eq!(seq.beat_interval_ms(), 15000.0);

        clock.advance(15001.0);
        assert_eq!(seq.tick(), 1);
        assert_eq!(seq.current_beat(), 0);
    }

    #[test]
    fn test_tempo_change_while_paused_waits_for_play() {
        let (_clock, mut seq) = sequencer(Config::default());
        seq.pause();
        seq.set_tempo(1000);
        assert_eq!(seq.tempo(), 300);
        assert_eq!(seq.beat_interval_ms(), 0.0);

        seq.play();
        assert_eq!(seq.beat_interval_ms(), 50.0);
    }

    #[test]
    fn test_focus_round_trip_while_playing() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.set_tempo(90);
        seq.grid_mut(Waveform::Sine).set(3, 3, true);
        for _ in 0..4 {
            next_step(&clock, &mut seq);
        }
        assert_eq!(seq.current_beat(), 3);
        assert_eq!(seq.engine().sounding_count(), 1);

        seq.focus_lost();
        assert_eq!(seq.run_state(), RunState::Pause);
        assert_eq!(seq.engine().sounding_count(), 0);
        assert_eq!(seq.pending_resume(), Some(RunState::Play));

        seq.focus_gained();
        assert_eq!(seq.run_state(), RunState::Play);
        assert_eq!(seq.tempo(), 90);
        assert_eq!(seq.current_beat(), 3);
        assert_eq!(seq.pending_resume(), None);

        // only once
        seq.pause();
        seq.focus_gained();
        assert_eq!(seq.run_state(), RunState::Pause);
    }

    #[test]
    fn test_focus_round_trip_while_stopped() {
        let (_clock, mut seq) = sequencer(Config::default());
        seq.stop();
        seq.focus_lost();
        assert_eq!(seq.run_state(), RunState::Pause);
        seq.focus_gained();
        assert_eq!(seq.run_state(), RunState::Stop);
        assert_eq!(seq.current_beat(), REWOUND_BEAT);
    }

    #[test]
    fn test_repeated_focus_loss_replaces_pending_state() {
        let (_clock, mut seq) = sequencer(Config::default());
        seq.focus_lost();
        seq.focus_lost();
        assert_eq!(seq.pending_resume(), Some(RunState::Pause));
        seq.focus_gained();
        assert_eq!(seq.run_state(), RunState::Pause);
    }

    #[test]
    fn test_reset_all_clears_without_touching_transport() {
        let (clock, mut seq) = sequencer(Config::default());
        for waveform in Waveform::ALL {
            seq.grid_mut(waveform).set(0, waveform.index(), true);
            seq.grid_mut(waveform).set(9, 9, true);
        }
        next_step(&clock, &mut seq);
        assert_eq!(seq.engine().sounding_count(), 5);

        seq.reset_all();
        assert_eq!(seq.engine().sounding_count(), 0);
        assert_eq!(seq.output().live(), 0);
        assert!(Waveform::ALL.iter().all(|w| seq.grid(*w).is_empty()));
        assert_eq!(seq.current_beat(), 0);
        assert_eq!(seq.run_state(), RunState::Play);
    }

    #[test]
    fn test_reset_channel_is_scoped() {
        let (clock, mut seq) = sequencer(Config::default());
        seq.grid_mut(Waveform::Square).set(0, 0, true);
        seq.grid_mut(Waveform::Sine).set(0, 0, true);
        next_step(&clock, &mut seq);

        seq.select_channel(Waveform::Square);
        seq.reset_selected_channel();
        assert!(seq.grid(Waveform::Square).is_empty());
        assert!(!seq.engine().channel(Waveform::Square).voices.is_sounding(0));
        assert!(seq.grid(Waveform::Sine).get(0, 0));
        assert!(seq.engine().channel(Waveform::Sine).voices.is_sounding(0));
    }
}
