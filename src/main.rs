#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use gridseq::{
    AudioOutput, CellStyle, Config, Grid, GridPointer, MidiOutputDevice, Sequencer, Stroke,
    SystemClock, Tee, Waveform,
};

#[cfg(feature = "gui")]
type Output = Tee<AudioOutput, MidiOutputDevice>;

#[cfg(feature = "gui")]
const CELL_SIZE: f32 = 36.0;

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("usage: gridseq [--tempo BPM] [--base-pitch HZ] [--paused] [--midi-port N]");
            std::process::exit(2);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 760.0])
            .with_title("GRIDSEQ - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "GRIDSEQ",
        options,
        Box::new(move |_cc| Ok(Box::new(SequencerApp::new(&config)))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct SequencerApp {
    sequencer: Sequencer<Output>,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    stroke: Option<Stroke>,
    window_focused: bool,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: &Config) -> Self {
        let mut output = Tee::new(AudioOutput::default(), MidiOutputDevice::new());
        let mut selected_port = None;
        if let Some(port) = config.midi_port {
            match output.mirror.connect(port) {
                Ok(()) => selected_port = Some(port),
                Err(err) => log::warn!("{}", err),
            }
        }

        Self {
            sequencer: Sequencer::new(config, output, Box::new(SystemClock::new())),
            available_midi_ports: MidiOutputDevice::available_ports(),
            selected_port,
            stroke: None,
            window_focused: true,
        }
    }

    fn handle_focus(&mut self, ctx: &egui::Context) {
        let focused = ctx.input(|i| i.focused);
        if focused == self.window_focused {
            return;
        }
        self.window_focused = focused;
        if focused {
            self.sequencer.focus_gained();
        } else {
            self.sequencer.focus_lost();
        }
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("▶ Play").clicked() {
                self.sequencer.play();
            }
            if ui.button("⏸ Pause").clicked() {
                self.sequencer.pause();
            }
            if ui.button("⏹ Stop").clicked() {
                self.sequencer.stop();
            }
            if ui.button("Reset All").clicked() {
                self.sequencer.reset_all();
            }
            if ui.button("Reset Channel").clicked() {
                self.sequencer.reset_selected_channel();
            }
        });

        ui.horizontal(|ui| {
            let mut selected = self.sequencer.selected_channel();
            egui::ComboBox::from_label("Channel")
                .selected_text(selected.name())
                .show_ui(ui, |ui| {
                    for waveform in Waveform::ALL {
                        ui.selectable_value(&mut selected, waveform, waveform.name());
                    }
                });
            if selected != self.sequencer.selected_channel() {
                self.stroke = None;
                self.sequencer.select_channel(selected);
            }

            ui.add_space(20.0);

            ui.label("Tempo:");
            let mut tempo = self.sequencer.tempo();
            if ui
                .add(egui::Slider::new(&mut tempo, 1..=300).step_by(1.0))
                .changed()
            {
                self.sequencer.set_tempo(tempo as i64);
            }
        });
    }

    fn midi_ports(&mut self, ui: &mut egui::Ui) {
        let mut selected_port_changed = None;
        ui.horizontal(|ui| {
            ui.label("MIDI Output:");
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_label("")
                    .selected_text(
                        self.selected_port
                            .and_then(|i| self.available_midi_ports.get(i))
                            .map(String::as_str)
                            .unwrap_or("Select port..."),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                selected_port_changed = Some(i);
                            }
                        }
                    });
            }
        });

        if let Some(port_idx) = selected_port_changed {
            match self.sequencer.output_mut().mirror.connect(port_idx) {
                Ok(()) => self.selected_port = Some(port_idx),
                Err(err) => log::warn!("{}", err),
            }
        }
    }

    /// Paint the selected channel's grid with every channel's notes as thin
    /// bands, and apply click/drag edits to the selected channel.
    fn grid(&mut self, ui: &mut egui::Ui) {
        let size = egui::vec2(CELL_SIZE * 16.0, CELL_SIZE * 16.0);
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());

        let selected = self.sequencer.selected_channel();
        let beat = self.sequencer.current_beat();

        let painter = ui.painter_at(rect);
        let grid = self.sequencer.grid(selected);
        for x in 0..grid.width() {
            for y in 0..grid.height() {
                let min = rect.min + egui::vec2(x as f32 * CELL_SIZE, y as f32 * CELL_SIZE);
                let cell = egui::Rect::from_min_size(min, egui::vec2(CELL_SIZE, CELL_SIZE))
                    .shrink(2.0);
                let fill = match CellStyle::classify(grid, x, y, beat) {
                    CellStyle::Active => channel_color(selected),
                    CellStyle::Highlighted => egui::Color32::from_rgb(0xA0, 0x20, 0xF0),
                    CellStyle::Downbeat => egui::Color32::from_rgb(0x42, 0x42, 0x42),
                    CellStyle::Plain => egui::Color32::BLACK,
                };
                painter.rect_filled(cell, 2.0, fill);

                let inner = cell.shrink(2.0);
                let band = inner.height() / Waveform::ALL.len() as f32;
                for waveform in Waveform::ALL {
                    if waveform == selected || !self.sequencer.grid(waveform).get(x, y) {
                        continue;
                    }
                    let top = inner.max.y - (waveform.index() + 1) as f32 * band;
                    let strip = egui::Rect::from_min_max(
                        egui::pos2(inner.min.x, top),
                        egui::pos2(inner.max.x, top + band),
                    );
                    painter.rect_filled(strip, 0.0, channel_color(waveform));
                }
            }
        }

        // edits come only from presses that landed on this widget
        let held = response.is_pointer_button_down_on();
        let pressed = held && ui.input(|i| i.pointer.primary_pressed());
        let cell = response.interact_pointer_pos().and_then(|p| {
            let local = p - rect.min;
            Grid::cell_at(local.x, local.y, CELL_SIZE)
        });
        let pointer = match (pressed, held, cell) {
            (true, _, Some((x, y))) => GridPointer::Pressed(x, y),
            (_, true, cell) => GridPointer::Held(cell),
            (_, false, _) => GridPointer::Released,
        };

        Stroke::follow(&mut self.stroke, self.sequencer.grid_mut(selected), pointer);
    }
}

#[cfg(feature = "gui")]
fn channel_color(waveform: Waveform) -> egui::Color32 {
    match waveform {
        Waveform::Noise => egui::Color32::from_rgb(0xDF, 0x15, 0x1A),
        Waveform::Triangle => egui::Color32::from_rgb(0xFD, 0x86, 0x03),
        Waveform::Sawtooth => egui::Color32::from_rgb(0xF4, 0xF3, 0x28),
        Waveform::Sine => egui::Color32::from_rgb(0x00, 0xDA, 0x3C),
        Waveform::Square => egui::Color32::from_rgb(0x24, 0xC0, 0xEB),
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_focus(ctx);
        self.sequencer.tick();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("GRIDSEQ - Step Sequencer");
            ui.add_space(10.0);

            self.midi_ports(ui);
            ui.add_space(10.0);

            self.transport(ui);
            ui.add_space(10.0);

            self.grid(ui);

            // Info
            ui.separator();
            ui.label(format!(
                "{} | step {} | {} BPM",
                self.sequencer.run_state().name(),
                self.sequencer.current_beat() + 1,
                self.sequencer.tempo()
            ));
            if !self.sequencer.output().mirror.is_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
        });
    }
}
