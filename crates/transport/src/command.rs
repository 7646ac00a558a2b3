use basedrop::Shared;

use crate::AudioArc;
use crate::ids::{Bus, VoiceKey};

/// Audio handed to the audio thread. Dropping the last reference there only
/// queues the buffer for the control thread's collector.
pub type SharedAudio = Shared<AudioArc>;

/// Messages from the control-rate loop to the audio-rate renderer.
pub enum Command {
    /// Start `audio` on `voice` at absolute audio-clock time `at` (seconds).
    Schedule {
        voice: VoiceKey,
        at: f64,
        audio: SharedAudio,
    },
    /// Drop the pending deadline of `voice` and silence it.
    Cancel { voice: VoiceKey },
    /// Cancel every voice routed through `bus`.
    CancelBus { bus: Bus },
    SetBusGain { bus: Bus, gain: f32 },
    SetBusAudible { bus: Bus, audible: bool },
}

impl Command {
    pub fn voice(&self) -> Option<VoiceKey> {
        match self {
            Command::Schedule { voice, .. } | Command::Cancel { voice } => Some(*voice),
            _ => None,
        }
    }
}

/// Messages from the renderer back to the control-rate loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    /// A scheduled deadline was reached and the voice began rendering at `frame`.
    VoiceStarted { voice: VoiceKey, frame: u64 },
    /// The voice pool was full; the deadline for `voice` was not armed.
    VoiceDropped { voice: VoiceKey },
}

/// Where armed deadlines go. The audio engine implements this; tests record.
pub trait PlaybackBackend {
    /// Output sample rate clips must be resampled to before scheduling.
    fn sample_rate(&self) -> u32;

    fn schedule(&mut self, voice: VoiceKey, at: f64, audio: &AudioArc);

    fn cancel(&mut self, voice: VoiceKey);

    fn cancel_bus(&mut self, bus: Bus);

    fn set_bus_gain(&mut self, bus: Bus, gain: f32);

    fn set_bus_audible(&mut self, bus: Bus, audible: bool);

    fn drain_status(&mut self) -> Vec<Status> {
        Vec::new()
    }

    /// Housekeeping run once per control-rate tick.
    fn maintain(&mut self) {}
}
