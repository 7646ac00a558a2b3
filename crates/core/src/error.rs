use spaceloop_transport::{DefinitionError, NoteId, TrackId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SequencerError {
    #[error("no track with id {0:?}")]
    UnknownTrack(TrackId),

    #[error("no note {0:?} on this track")]
    UnknownNote(NoteId),

    #[error("another note already occupies position {position}")]
    SlotOccupied { position: f64 },

    #[error("no song named '{0}'")]
    UnknownSong(String),

    #[error(transparent)]
    InvalidDefinition(#[from] DefinitionError),
}
