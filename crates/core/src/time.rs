use crate::context::PlaybackContext;

/// Grid resolution inside one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatSubdivision {
    Quarter = 1,
    Eighth = 2,
    Triplet = 3,
    Sixteenth = 4,
    Quintuplet = 5,
    Sextuplet = 6,
    Septuplet = 7,
    ThirtySecond = 8,
}

impl BeatSubdivision {
    pub fn count(self) -> u32 {
        self as u32
    }

    pub fn from_count(count: u32) -> Option<Self> {
        Some(match count {
            1 => Self::Quarter,
            2 => Self::Eighth,
            3 => Self::Triplet,
            4 => Self::Sixteenth,
            5 => Self::Quintuplet,
            6 => Self::Sextuplet,
            7 => Self::Septuplet,
            8 => Self::ThirtySecond,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }

    pub fn beat_type(&self) -> u32 {
        self.denominator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

impl From<TimeSignature> for (u32, u32) {
    fn from(ts: TimeSignature) -> Self {
        (ts.numerator, ts.denominator)
    }
}

/// A tempo clock edit, as delivered to everything that derives timing from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoChange {
    Bpm(f64),
    BeatsPerBar(u32),
    BeatType(u32),
    /// Ratio of the new distance per beat to the old one.
    DistancePerBeat { factor: f64 },
    Subdivision(BeatSubdivision),
}

impl TempoChange {
    /// Whether the change alters the duration of a beat. Playing loops keep
    /// their fractional progress across such changes.
    pub fn rescales_time(&self) -> bool {
        matches!(self, TempoChange::Bpm(_) | TempoChange::BeatType(_))
    }
}

/// Receives tempo clock edits after they have been applied. `ctx.tempo`
/// already holds the new values.
pub trait TempoObserver {
    fn tempo_changed(&mut self, change: TempoChange, ctx: &mut PlaybackContext<'_>);
}

/// The timing authority: tempo, signature, spatial scale and grid.
///
/// Only the five fields are stored. Seconds per beat, bar lengths and the
/// snapping window are recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoClock {
    bpm: f64,
    time_signature: TimeSignature,
    distance_per_beat: f64,
    subdivision: BeatSubdivision,
}

impl TempoClock {
    pub fn new(bpm: f64, time_signature: impl Into<TimeSignature>, distance_per_beat: f64) -> Self {
        Self {
            bpm,
            time_signature: time_signature.into(),
            distance_per_beat,
            subdivision: BeatSubdivision::Triplet,
        }
    }

    pub fn with_subdivision(mut self, subdivision: BeatSubdivision) -> Self {
        self.subdivision = subdivision;
        self
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.beats_per_bar()
    }

    pub fn beat_type(&self) -> u32 {
        self.time_signature.beat_type()
    }

    pub fn distance_per_beat(&self) -> f64 {
        self.distance_per_beat
    }

    pub fn subdivision(&self) -> BeatSubdivision {
        self.subdivision
    }

    /// `bpm` counts quarter notes, so a beat of another type is scaled to it.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm * (4.0 / self.beat_type() as f64)
    }

    pub fn seconds_per_sub_beat(&self) -> f64 {
        self.seconds_per_beat() / self.subdivision.count() as f64
    }

    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * self.beats_per_bar() as f64
    }

    pub fn distance_per_sub_beat(&self) -> f64 {
        self.distance_per_beat / self.subdivision.count() as f64
    }

    pub fn distance_per_bar(&self) -> f64 {
        self.distance_per_beat * self.beats_per_bar() as f64
    }

    /// Kept below half a sub-beat so neighbouring snap zones never overlap.
    pub fn sub_beat_snapping_distance(&self) -> f64 {
        self.distance_per_sub_beat() * 0.45
    }

    pub fn distance_to_time(&self, distance: f64) -> f64 {
        distance / self.distance_per_beat * self.seconds_per_beat()
    }

    pub fn time_to_distance(&self, time: f64) -> f64 {
        time / self.seconds_per_beat() * self.distance_per_beat
    }

    /// Nearest sub-beat grid line to `time_in_loop`; a tie goes to the later line.
    pub fn closest_sub_beat_time(&self, time_in_loop: f64) -> f64 {
        let step = self.seconds_per_sub_beat();
        let mut sub_beat = 0u64;
        let mut time_left = time_in_loop.max(0.0);
        while time_left > step {
            time_left -= step;
            sub_beat += 1;
        }
        if time_left >= step * 0.5 {
            sub_beat += 1;
        }
        sub_beat as f64 * step
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Option<TempoChange> {
        if !(bpm.is_finite() && bpm > 0.0) {
            log::warn!("ignoring invalid bpm {bpm}");
            return None;
        }
        self.bpm = bpm;
        Some(TempoChange::Bpm(bpm))
    }

    pub fn set_beats_per_bar(&mut self, beats_per_bar: u32) -> Option<TempoChange> {
        if beats_per_bar == 0 {
            log::warn!("ignoring zero beats per bar");
            return None;
        }
        self.time_signature.numerator = beats_per_bar;
        Some(TempoChange::BeatsPerBar(beats_per_bar))
    }

    pub fn set_beat_type(&mut self, beat_type: u32) -> Option<TempoChange> {
        if beat_type == 0 {
            log::warn!("ignoring zero beat type");
            return None;
        }
        self.time_signature.denominator = beat_type;
        Some(TempoChange::BeatType(beat_type))
    }

    pub fn set_distance_per_beat(&mut self, distance_per_beat: f64) -> Option<TempoChange> {
        if !(distance_per_beat.is_finite() && distance_per_beat > 0.0) {
            log::warn!("ignoring invalid distance per beat {distance_per_beat}");
            return None;
        }
        let factor = distance_per_beat / self.distance_per_beat;
        self.distance_per_beat = distance_per_beat;
        Some(TempoChange::DistancePerBeat { factor })
    }

    pub fn set_subdivision(&mut self, subdivision: BeatSubdivision) -> Option<TempoChange> {
        self.subdivision = subdivision;
        Some(TempoChange::Subdivision(subdivision))
    }

    /// Bar, beat and sub-beat (all 1-based) of `seconds` into a loop.
    pub fn format_position(&self, seconds: f64) -> MusicalPosition {
        let seconds = seconds.max(0.0);
        let total_sub_beats = (seconds / self.seconds_per_sub_beat() + 1e-9).floor() as u64;
        let per_beat = self.subdivision.count() as u64;
        let total_beats = total_sub_beats / per_beat;
        let beats_per_bar = self.beats_per_bar() as u64;

        MusicalPosition {
            bar: (total_beats / beats_per_bar) as u32 + 1,
            beat: (total_beats % beats_per_bar) as u32 + 1,
            sub_beat: (total_sub_beats % per_beat) as u32 + 1,
        }
    }
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new(60.0, TimeSignature::default(), 0.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub sub_beat: u32,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.bar, self.beat, self.sub_beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_derived_values_at_sixty_bpm() {
        let clock = TempoClock::new(60.0, (4, 4), 0.2);
        assert!(approx(clock.seconds_per_beat(), 1.0));
        assert!(approx(clock.seconds_per_bar(), 4.0));
        assert!(approx(clock.distance_per_bar(), 0.8));
        assert!(approx(clock.seconds_per_bar() * 2.0, 8.0));
    }

    #[test]
    fn test_beat_type_scales_beat_length() {
        let clock = TempoClock::new(120.0, (6, 8), 0.2);
        assert!(approx(clock.seconds_per_beat(), 0.25));
        assert!(approx(clock.seconds_per_bar(), 1.5));
    }

    #[test]
    fn test_distance_time_roundtrip() {
        let clock = TempoClock::new(97.0, (7, 8), 0.37);
        for d in [0.0, 0.01, 0.2, 1.3, 7.77] {
            assert!(approx(clock.time_to_distance(clock.distance_to_time(d)), d));
        }
        for t in [0.0, 0.123, 2.0, 15.5] {
            assert!(approx(clock.distance_to_time(clock.time_to_distance(t)), t));
        }
    }

    #[test]
    fn test_closest_sub_beat_time() {
        let clock = TempoClock::new(120.0, (4, 4), 0.2).with_subdivision(BeatSubdivision::Eighth);
        // sub-beat = 0.25s
        assert!(approx(clock.closest_sub_beat_time(0.0), 0.0));
        assert!(approx(clock.closest_sub_beat_time(0.1), 0.0));
        assert!(approx(clock.closest_sub_beat_time(0.13), 0.25));
        assert!(approx(clock.closest_sub_beat_time(0.25), 0.25));
        assert!(approx(clock.closest_sub_beat_time(0.6), 0.5));
        assert!(approx(clock.closest_sub_beat_time(-1.0), 0.0));
    }

    #[test]
    fn test_closest_sub_beat_tie_goes_later() {
        let clock = TempoClock::new(60.0, (4, 4), 0.2).with_subdivision(BeatSubdivision::Quarter);
        assert!(approx(clock.closest_sub_beat_time(0.5), 1.0));
        assert!(approx(clock.closest_sub_beat_time(2.5), 3.0));
    }

    #[test]
    fn test_snapping_distance_below_half_sub_beat() {
        let clock = TempoClock::new(60.0, (4, 4), 0.2).with_subdivision(BeatSubdivision::Sixteenth);
        assert!(approx(clock.sub_beat_snapping_distance(), 0.05 * 0.45));
        assert!(clock.sub_beat_snapping_distance() < clock.distance_per_sub_beat() / 2.0);
    }

    #[test]
    fn test_setters_report_changes() {
        let mut clock = TempoClock::default();
        assert_eq!(clock.set_bpm(90.0), Some(TempoChange::Bpm(90.0)));
        assert_eq!(clock.set_bpm(90.0), Some(TempoChange::Bpm(90.0)));
        assert_eq!(clock.set_beats_per_bar(3), Some(TempoChange::BeatsPerBar(3)));
        assert_eq!(clock.set_beat_type(8), Some(TempoChange::BeatType(8)));
        assert_eq!(
            clock.set_distance_per_beat(0.4),
            Some(TempoChange::DistancePerBeat { factor: 2.0 })
        );
        assert_eq!(clock.time_signature(), TimeSignature::new(3, 8));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut clock = TempoClock::default();
        assert_eq!(clock.set_bpm(0.0), None);
        assert_eq!(clock.set_bpm(f64::NAN), None);
        assert_eq!(clock.set_beat_type(0), None);
        assert_eq!(clock.set_distance_per_beat(-1.0), None);
        assert_eq!(clock, TempoClock::default());
    }

    #[test]
    fn test_rescaling_changes() {
        assert!(TempoChange::Bpm(100.0).rescales_time());
        assert!(TempoChange::BeatType(8).rescales_time());
        assert!(!TempoChange::BeatsPerBar(3).rescales_time());
        assert!(!TempoChange::DistancePerBeat { factor: 2.0 }.rescales_time());
    }

    #[test]
    fn test_format_position() {
        let clock = TempoClock::new(60.0, (4, 4), 0.2).with_subdivision(BeatSubdivision::Eighth);
        assert_eq!(clock.format_position(0.0).to_string(), "1.1.1");
        assert_eq!(clock.format_position(1.5).to_string(), "1.2.2");
        assert_eq!(clock.format_position(4.0).to_string(), "2.1.1");
    }

    #[test]
    fn test_subdivision_counts() {
        assert_eq!(BeatSubdivision::ThirtySecond.count(), 8);
        assert_eq!(BeatSubdivision::from_count(3), Some(BeatSubdivision::Triplet));
        assert_eq!(BeatSubdivision::from_count(9), None);
    }
}
