use spaceloop_transport::{AudioArc, Bus, PlaybackBackend, VoiceKey};

use crate::context::PlaybackContext;
use crate::tasks::DeferredTasks;
use crate::time::{TempoChange, TempoObserver};
use crate::track::START_EPSILON;

pub const DEFAULT_METRONOME_GAIN: f32 = 0.5;

/// Rate the click envelope constants are tuned for.
const REFERENCE_RATE: f32 = 48000.0;
const CLICK_DECAY: f32 = 0.993;
const CLICK_PITCH: f32 = 0.3;
/// Envelope level at which a click is cut off.
const CLICK_FLOOR: f32 = 1e-3;
const ACCENT_STRENGTH: f32 = 2.0;

/// A decaying sine whose pitch falls with its amplitude. `strength` scales
/// both, so the accent is louder and higher.
fn click(sample_rate: u32, strength: f32) -> AudioArc {
    let scale = REFERENCE_RATE / sample_rate.max(1) as f32;
    let decay = CLICK_DECAY.powf(scale);
    let mut amp = strength;
    let mut phase = 0.0f32;
    let mut samples = Vec::new();
    while amp >= CLICK_FLOOR {
        samples.push(amp * phase.sin());
        phase += amp * CLICK_PITCH * scale;
        amp *= decay;
    }
    AudioArc::mono(samples, sample_rate)
}

#[derive(Debug, Clone)]
struct ClickSounds {
    sample_rate: u32,
    beat: AudioArc,
    accent: AudioArc,
}

impl ClickSounds {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            beat: click(sample_rate, 1.0),
            accent: click(sample_rate, ACCENT_STRENGTH),
        }
    }
}

/// Beat clicks that run with the loop transport.
///
/// Exactly one click is armed at a time. Once it has started, the next beat
/// is armed through a deferred task. The first beat of every bar is accented.
/// A disabled metronome keeps counting on a silenced bus, so switching it on
/// mid-loop lands on the beat.
#[derive(Debug)]
pub struct Metronome {
    enabled: bool,
    gain: f32,
    running: bool,
    /// Deadline of the click armed last.
    next_click: f64,
    /// Position of that click in its bar, 0 is the downbeat.
    beat: u32,
    beat_secs: f64,
    sounds: Option<ClickSounds>,
    advance: DeferredTasks<()>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self {
            enabled: false,
            gain: DEFAULT_METRONOME_GAIN,
            running: false,
            next_click: 0.0,
            beat: 0,
            beat_secs: 0.0,
            sounds: None,
            advance: DeferredTasks::new(),
        }
    }
}

impl Metronome {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Deadline of the armed click, while running.
    pub fn next_click(&self) -> Option<f64> {
        self.running.then_some(self.next_click)
    }

    pub fn set_enabled(&mut self, enabled: bool, backend: &mut dyn PlaybackBackend) {
        self.enabled = enabled;
        backend.set_bus_audible(Bus::Metronome, enabled);
    }

    pub fn toggle(&mut self, backend: &mut dyn PlaybackBackend) -> bool {
        self.set_enabled(!self.enabled, backend);
        self.enabled
    }

    pub fn set_gain(&mut self, gain: f32, backend: &mut dyn PlaybackBackend) {
        self.gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
        backend.set_bus_gain(Bus::Metronome, self.gain);
    }

    /// Click the downbeat at `ctx.now` and keep going.
    pub fn start(&mut self, ctx: &mut PlaybackContext<'_>) {
        self.running = true;
        self.beat = 0;
        self.beat_secs = ctx.tempo.seconds_per_beat();
        self.next_click = ctx.now;
        ctx.backend.set_bus_gain(Bus::Metronome, self.gain);
        ctx.backend.set_bus_audible(Bus::Metronome, self.enabled);
        self.arm(ctx);
    }

    pub fn stop(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.running {
            return;
        }
        self.running = false;
        self.advance.clear();
        ctx.backend.cancel(VoiceKey::Click);
    }

    pub fn tick(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.running {
            return;
        }
        for _ in self.advance.take_due(ctx.now) {
            self.step(ctx);
        }
    }

    fn beats_per_bar(ctx: &PlaybackContext<'_>) -> u32 {
        ctx.tempo.beats_per_bar().max(1)
    }

    /// Move on to the beat after the one armed last. Beats whose deadline
    /// already passed, as after a stalled control loop, are skipped.
    fn step(&mut self, ctx: &mut PlaybackContext<'_>) {
        let beats = Self::beats_per_bar(ctx);
        loop {
            self.next_click += self.beat_secs;
            self.beat = (self.beat + 1) % beats;
            if self.next_click + START_EPSILON >= ctx.now || self.beat_secs <= 0.0 {
                break;
            }
        }
        self.arm(ctx);
    }

    fn arm(&mut self, ctx: &mut PlaybackContext<'_>) {
        let sample_rate = ctx.backend.sample_rate();
        if self.sounds.as_ref().is_none_or(|s| s.sample_rate != sample_rate) {
            self.sounds = Some(ClickSounds::new(sample_rate));
        }
        let Some(sounds) = &self.sounds else {
            return;
        };
        let audio = if self.beat == 0 { &sounds.accent } else { &sounds.beat };
        ctx.backend.schedule(VoiceKey::Click, self.next_click, audio);
        self.advance.schedule((), self.next_click + START_EPSILON);
    }
}

impl TempoObserver for Metronome {
    fn tempo_changed(&mut self, change: TempoChange, ctx: &mut PlaybackContext<'_>) {
        let beat_secs = ctx.tempo.seconds_per_beat();
        if !self.running {
            self.beat_secs = beat_secs;
            return;
        }
        match change {
            TempoChange::Bpm(_) | TempoChange::BeatType(_) if self.beat_secs > 0.0 => {
                // the armed click has sounded once its deadline is behind us
                let sounded = ctx.now >= self.next_click;
                let previous = if sounded {
                    self.next_click
                } else {
                    self.next_click - self.beat_secs
                };
                let progress = ((ctx.now - previous) / self.beat_secs).clamp(0.0, 1.0);
                if sounded {
                    self.beat += 1;
                }
                self.beat %= Self::beats_per_bar(ctx);
                self.beat_secs = beat_secs;
                self.next_click = ctx.now + (1.0 - progress) * beat_secs;
                self.arm(ctx);
            }
            TempoChange::BeatsPerBar(_) => {
                self.beat %= Self::beats_per_bar(ctx);
                if ctx.now < self.next_click {
                    self.arm(ctx);
                }
            }
            _ => self.beat_secs = beat_secs,
        }
    }
}
