pub mod context;
pub mod error;
pub mod loops;
pub mod metronome;
pub mod note;
pub mod sample;
pub mod session;
pub mod settings;
pub mod songs;
pub mod tasks;
pub mod time;
pub mod timeline;
pub mod track;

#[cfg(test)]
mod testing;

pub use context::PlaybackContext;
pub use error::SequencerError;
pub use loops::{DEFAULT_DURATION_IN_BARS, Loop, TRACK_COLORS};
pub use metronome::{DEFAULT_METRONOME_GAIN, Metronome};
pub use note::{Note, NoteKind, Occurrence};
pub use sample::{HISTORY_CAPACITY, Sample};
pub use session::Session;
pub use settings::{ImportTempo, SessionSettings};
pub use songs::{DEFAULT_SONG_VOLUME, Song, SongLibrary, SongTrack};
pub use time::{BeatSubdivision, MusicalPosition, TempoChange, TempoClock, TempoObserver, TimeSignature};
pub use timeline::NoteTimeline;
pub use track::{DEFAULT_VOLUME, PlaybackState, START_EPSILON, TRIGGER_GUARD, Track};

pub use spaceloop_project::{LoopExportData, LoopMetadata, ProjectError, SampleLibrary};
pub use spaceloop_transport::{
    AudioArc, AudioClock, Bus, FrameClock, ManualClock, NoteId, PlaybackBackend, RequestId,
    SampleDefinition, SynthResponse, SynthesisService, TrackId, VoiceKey,
};
