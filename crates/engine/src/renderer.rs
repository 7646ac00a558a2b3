use spaceloop_transport::{Bus, Command, FrameClock, SharedAudio, Status, VoiceKey};

pub const DEFAULT_VOICE_CAPACITY: usize = 256;
const BUS_CAPACITY: usize = 64;

struct Playing {
    audio: SharedAudio,
    position: usize,
}

struct Pending {
    audio: SharedAudio,
    frame: u64,
}

#[derive(Default)]
struct VoiceSlot {
    key: Option<VoiceKey>,
    playing: Option<Playing>,
    pending: Option<Pending>,
}

impl VoiceSlot {
    fn is_free(&self) -> bool {
        self.playing.is_none() && self.pending.is_none()
    }

    fn silence(&mut self) {
        self.playing = None;
        self.pending = None;
    }
}

#[derive(Clone, Copy)]
struct BusState {
    bus: Bus,
    gain: f32,
    audible: bool,
}

/// Audio-rate half of the sequencer: turns scheduled deadlines into samples.
///
/// Every voice holds at most one playing and one pending occurrence. Nothing
/// here allocates after construction, so it is safe to run inside the output
/// callback.
pub struct Renderer {
    sample_rate: u32,
    channels: usize,
    clock: FrameClock,
    voices: Vec<VoiceSlot>,
    buses: Vec<BusState>,
}

impl Renderer {
    pub fn new(sample_rate: u32, channels: u16, clock: FrameClock) -> Self {
        Self::with_capacity(sample_rate, channels, clock, DEFAULT_VOICE_CAPACITY)
    }

    pub fn with_capacity(sample_rate: u32, channels: u16, clock: FrameClock, voices: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1) as usize,
            clock,
            voices: (0..voices).map(|_| VoiceSlot::default()).collect(),
            buses: Vec::with_capacity(BUS_CAPACITY),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    fn frame_of(&self, at: f64) -> u64 {
        (at * self.sample_rate as f64).round().max(0.0) as u64
    }

    fn slot_mut(&mut self, voice: VoiceKey) -> Option<&mut VoiceSlot> {
        if let Some(index) = self.voices.iter().position(|s| s.key == Some(voice)) {
            return self.voices.get_mut(index);
        }
        let free = self.voices.iter_mut().find(|s| s.is_free())?;
        free.key = Some(voice);
        Some(free)
    }

    fn bus_state(&self, bus: Bus) -> (f32, bool) {
        self.buses
            .iter()
            .find(|b| b.bus == bus)
            .map_or((1.0, true), |b| (b.gain, b.audible))
    }

    fn bus_mut(&mut self, bus: Bus) -> Option<&mut BusState> {
        if let Some(index) = self.buses.iter().position(|b| b.bus == bus) {
            return self.buses.get_mut(index);
        }
        if self.buses.len() == self.buses.capacity() {
            return None;
        }
        self.buses.push(BusState {
            bus,
            gain: 1.0,
            audible: true,
        });
        self.buses.last_mut()
    }

    /// Apply one control message. A schedule that finds no free voice is
    /// reported back instead of armed.
    pub fn apply(&mut self, command: Command, report: &mut dyn FnMut(Status)) {
        match command {
            Command::Schedule { voice, at, audio } => {
                let frame = self.frame_of(at);
                match self.slot_mut(voice) {
                    Some(slot) => slot.pending = Some(Pending { audio, frame }),
                    None => report(Status::VoiceDropped { voice }),
                }
            }
            Command::Cancel { voice } => {
                if let Some(slot) = self.voices.iter_mut().find(|s| s.key == Some(voice)) {
                    slot.silence();
                }
            }
            Command::CancelBus { bus } => {
                for slot in &mut self.voices {
                    if slot.key.is_some_and(|key| key.bus() == bus) {
                        slot.silence();
                    }
                }
            }
            Command::SetBusGain { bus, gain } => {
                if let Some(state) = self.bus_mut(bus) {
                    state.gain = gain;
                }
            }
            Command::SetBusAudible { bus, audible } => {
                if let Some(state) = self.bus_mut(bus) {
                    state.audible = audible;
                }
            }
        }
    }

    /// Fill one interleaved output buffer and advance the clock past it.
    pub fn render(&mut self, out: &mut [f32], report: &mut dyn FnMut(Status)) {
        out.fill(0.0);
        let base = self.clock.frames();
        let frames = out.len() / self.channels;

        for slot_index in 0..self.voices.len() {
            let Some(key) = self.voices[slot_index].key else {
                continue;
            };
            let (gain, audible) = self.bus_state(key.bus());
            let slot = &mut self.voices[slot_index];

            for (i, frame) in out.chunks_mut(self.channels).take(frames).enumerate() {
                let now = base + i as u64;
                if slot.pending.as_ref().is_some_and(|p| p.frame <= now) {
                    if let Some(pending) = slot.pending.take() {
                        slot.playing = Some(Playing {
                            audio: pending.audio,
                            position: 0,
                        });
                        report(Status::VoiceStarted { voice: key, frame: now });
                    }
                }

                let Some(playing) = slot.playing.as_mut() else {
                    if slot.pending.is_none() {
                        break;
                    }
                    continue;
                };
                if audible {
                    for (channel, sample) in frame.iter_mut().enumerate() {
                        *sample += playing.audio.sample_for_output(playing.position, channel) * gain;
                    }
                }
                playing.position += 1;
                if playing.position >= playing.audio.frames() {
                    slot.playing = None;
                }
            }
        }

        self.clock.advance(frames as u64);
    }
}
