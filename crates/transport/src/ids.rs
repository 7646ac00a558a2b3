#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

/// Handle to a note slot in a track's timeline arena.
///
/// The generation is bumped every time a slot is freed, so a handle to a
/// deleted note never resolves to the note that later reuses its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId {
    pub index: u32,
    pub generation: u32,
}

/// Identity of one playback voice in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceKey {
    Note { track: TrackId, note: NoteId },
    /// The loop's background song.
    Song,
    /// Metronome click.
    Click,
}

impl VoiceKey {
    pub fn bus(&self) -> Bus {
        match self {
            VoiceKey::Note { track, .. } => Bus::Track(*track),
            VoiceKey::Song => Bus::Song,
            VoiceKey::Click => Bus::Metronome,
        }
    }
}

/// Mix bus a voice is routed through; gain and mute are applied per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bus {
    Track(TrackId),
    Song,
    Metronome,
}
