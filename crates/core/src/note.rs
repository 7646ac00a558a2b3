#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    /// Plays the track's sample.
    Audible,
    /// Timeline marker only; never arms a deadline.
    Silent,
}

/// One entry on a track's timeline.
///
/// `position` is the distance from the track's start along its axis. The
/// scheduling fields are only meaningful while the owning track plays.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    position: f64,
    kind: NoteKind,
    pub(crate) trigger_time: Option<f64>,
    /// The occurrence most recently handed to the backend.
    pub(crate) occurrence: Option<Occurrence>,
}

/// Audio-clock window `[start, end)` in which an armed occurrence renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence {
    pub start: f64,
    pub end: f64,
}

impl Note {
    pub fn new(position: f64, kind: NoteKind) -> Self {
        Self {
            position,
            kind,
            trigger_time: None,
            occurrence: None,
        }
    }

    pub fn audible(position: f64) -> Self {
        Self::new(position, NoteKind::Audible)
    }

    pub fn silent(position: f64) -> Self {
        Self::new(position, NoteKind::Silent)
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn kind(&self) -> NoteKind {
        self.kind
    }

    pub fn is_audible(&self) -> bool {
        self.kind == NoteKind::Audible
    }

    /// Absolute audio-clock deadline of the next occurrence, if armed.
    pub fn trigger_time(&self) -> Option<f64> {
        self.trigger_time
    }

    pub fn occurrence(&self) -> Option<Occurrence> {
        self.occurrence
    }

    /// Whether the last armed occurrence is rendering at `now`.
    pub fn is_sounding(&self, now: f64) -> bool {
        self.occurrence
            .is_some_and(|o| o.start <= now && now < o.end)
    }

    pub(crate) fn reset_schedule(&mut self) {
        self.trigger_time = None;
        self.occurrence = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sounding_window() {
        let mut note = Note::audible(0.2);
        assert!(!note.is_sounding(1.0));

        note.occurrence = Some(Occurrence { start: 1.0, end: 1.5 });
        assert!(!note.is_sounding(0.99));
        assert!(note.is_sounding(1.0));
        assert!(note.is_sounding(1.49));
        assert!(!note.is_sounding(1.5));

        note.reset_schedule();
        assert_eq!(note.occurrence(), None);
        assert_eq!(note.trigger_time(), None);
    }

    #[test]
    fn test_kinds() {
        assert!(Note::audible(0.0).is_audible());
        assert_eq!(Note::silent(0.1).kind(), NoteKind::Silent);
    }
}
