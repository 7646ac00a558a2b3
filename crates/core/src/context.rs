use spaceloop_transport::PlaybackBackend;

use crate::time::TempoClock;

/// What the sequencer needs from its surroundings during one control-rate
/// step: the current tempo, where deadlines go, and the audio-clock time the
/// step runs at.
pub struct PlaybackContext<'a> {
    pub tempo: &'a TempoClock,
    pub backend: &'a mut dyn PlaybackBackend,
    pub now: f64,
}

impl<'a> PlaybackContext<'a> {
    pub fn new(tempo: &'a TempoClock, backend: &'a mut dyn PlaybackBackend, now: f64) -> Self {
        Self {
            tempo,
            backend,
            now,
        }
    }
}
