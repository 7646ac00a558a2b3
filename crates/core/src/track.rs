use spaceloop_project::{NoteExportData, TrackColor, TrackExportData};
use spaceloop_transport::{AudioArc, Bus, NoteId, PlaybackBackend, RequestId, TrackId, VoiceKey};

use crate::context::PlaybackContext;
use crate::error::SequencerError;
use crate::note::{Note, NoteKind, Occurrence};
use crate::sample::Sample;
use crate::tasks::DeferredTasks;
use crate::time::{TempoChange, TempoClock, TempoObserver};
use crate::timeline::NoteTimeline;

/// How long after a deadline the control loop waits before moving the note
/// on to its next iteration.
pub const TRIGGER_GUARD: f64 = 0.1;

/// A deadline this close to "now" when a track starts plays at once.
pub const START_EPSILON: f64 = 0.01;

pub const DEFAULT_VOLUME: f32 = 0.5;

/// Two notes whose loop offsets differ by less than this share a slot.
const SLOT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// One lane of the loop: a note timeline, the sample it plays, and the
/// playback state machine that turns note positions into audio-clock
/// deadlines.
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    name: String,
    color: TrackColor,
    sample: Sample,
    notes: NoteTimeline,
    duration_in_bars: u32,
    duration_secs: f64,
    muted: bool,
    solo: bool,
    another_is_solo: bool,
    volume: f32,
    snapping: bool,
    state: PlaybackState,
    start_time: Option<f64>,
    rearm: DeferredTasks<NoteId>,
}

impl Track {
    pub fn new(
        id: TrackId,
        name: impl Into<String>,
        color: TrackColor,
        sample: Sample,
        duration_in_bars: u32,
        tempo: &TempoClock,
    ) -> Self {
        let duration_in_bars = duration_in_bars.max(1);
        Self {
            id,
            name: name.into(),
            color,
            sample,
            notes: NoteTimeline::new(),
            duration_in_bars,
            duration_secs: tempo.seconds_per_bar() * duration_in_bars as f64,
            muted: false,
            solo: false,
            another_is_solo: false,
            volume: DEFAULT_VOLUME,
            snapping: true,
            state: PlaybackState::Stopped,
            start_time: None,
            rearm: DeferredTasks::new(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn color(&self) -> TrackColor {
        self.color
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Direct access for sample edits. Audio only changes once a synthesis
    /// response is applied through [`Track::apply_clip`].
    pub fn sample_mut(&mut self) -> &mut Sample {
        &mut self.sample
    }

    pub fn notes(&self) -> &NoteTimeline {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn duration_in_bars(&self) -> u32 {
        self.duration_in_bars
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Extent of the track axis in distance units.
    pub fn length(&self, tempo: &TempoClock) -> f64 {
        tempo.distance_per_bar() * self.duration_in_bars as f64
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Fraction of the current iteration already played, in `[0, 1)`.
    pub fn progress(&self, now: f64) -> Option<f64> {
        let start = self.start_time?;
        if self.duration_secs <= 0.0 {
            return None;
        }
        Some(((now - start) / self.duration_secs).clamp(0.0, 1.0))
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_solo(&self) -> bool {
        self.solo
    }

    pub fn another_is_solo(&self) -> bool {
        self.another_is_solo
    }

    pub fn is_allowed_to_sound(&self) -> bool {
        self.solo || (!self.another_is_solo && !self.muted)
    }

    pub fn snapping(&self) -> bool {
        self.snapping
    }

    pub fn set_snapping(&mut self, snapping: bool) {
        self.snapping = snapping;
    }

    fn bus(&self) -> Bus {
        Bus::Track(self.id)
    }

    fn voice(&self, note: NoteId) -> VoiceKey {
        VoiceKey::Note {
            track: self.id,
            note,
        }
    }

    // --- mix ---

    pub fn set_muted(&mut self, muted: bool, backend: &mut dyn PlaybackBackend) {
        self.muted = muted;
        self.push_audibility(backend);
    }

    pub fn toggle_mute(&mut self, backend: &mut dyn PlaybackBackend) -> bool {
        self.set_muted(!self.muted, backend);
        self.muted
    }

    pub fn set_solo(&mut self, solo: bool, backend: &mut dyn PlaybackBackend) {
        self.solo = solo;
        self.push_audibility(backend);
    }

    /// Flip solo. A track that becomes solo is no longer suppressed by others.
    /// Returns the new solo flag.
    pub(crate) fn toggle_solo(&mut self, backend: &mut dyn PlaybackBackend) -> bool {
        self.solo = !self.solo;
        if self.solo {
            self.another_is_solo = false;
        }
        self.push_audibility(backend);
        self.solo
    }

    pub fn set_another_is_solo(&mut self, another_is_solo: bool, backend: &mut dyn PlaybackBackend) {
        self.another_is_solo = another_is_solo;
        if another_is_solo {
            self.solo = false;
        }
        self.push_audibility(backend);
    }

    pub fn set_volume(&mut self, volume: f32, backend: &mut dyn PlaybackBackend) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        backend.set_bus_gain(self.bus(), self.volume);
    }

    fn push_audibility(&self, backend: &mut dyn PlaybackBackend) {
        backend.set_bus_audible(self.bus(), self.is_allowed_to_sound());
    }

    fn push_mix(&self, backend: &mut dyn PlaybackBackend) {
        backend.set_bus_gain(self.bus(), self.volume);
        self.push_audibility(backend);
    }

    // --- state machine ---

    pub fn play(&mut self, ctx: &mut PlaybackContext<'_>) {
        if self.is_playing() {
            self.stop(ctx);
        }
        let start = ctx.now;
        self.start_time = Some(start);
        self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        self.state = PlaybackState::Playing;
        self.push_mix(ctx.backend);

        for id in self.notes.ids() {
            let Some(position) = self.notes.get(id).map(Note::position) else {
                continue;
            };
            let trigger = start + self.offset_of(position, ctx.tempo);
            if let Some(note) = self.notes.get_mut(id) {
                note.trigger_time = Some(trigger);
            }
            self.arm_on_start(id, ctx);
        }
        log::debug!(
            "{} playing at {start:.3}s, {:.3}s per iteration",
            self.name,
            self.duration_secs
        );
    }

    /// Start playing with an iteration that began at `start_time`, as when a
    /// track joins a loop that is already running.
    pub fn join_at(&mut self, start_time: f64, ctx: &mut PlaybackContext<'_>) {
        if self.is_playing() {
            self.stop(ctx);
        }
        self.start_time = Some(start_time);
        self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        self.state = PlaybackState::Playing;
        self.push_mix(ctx.backend);
        self.wrap_start(ctx.now);
        self.retime_notes(ctx);
        log::debug!("{} joined iteration started at {start_time:.3}s", self.name);
    }

    pub fn stop(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.is_playing() {
            return;
        }
        self.state = PlaybackState::Stopped;
        self.start_time = None;
        self.rearm.clear();
        ctx.backend.cancel_bus(self.bus());
        for id in self.notes.ids() {
            if let Some(note) = self.notes.get_mut(id) {
                note.reset_schedule();
            }
        }
        log::debug!("{} stopped", self.name);
    }

    /// One control-rate step: wrap the iteration, move elapsed notes on to
    /// their next occurrence and run re-arms whose wait is over.
    pub fn tick(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.is_playing() {
            return;
        }
        self.wrap_start(ctx.now);

        for id in self.notes.ids() {
            let Some(note) = self.notes.get_mut(id) else {
                continue;
            };
            let Some(trigger) = note.trigger_time else {
                continue;
            };
            if ctx.now >= trigger + TRIGGER_GUARD {
                note.trigger_time = Some(trigger + self.duration_secs);
                self.trigger_available(id, ctx);
            }
        }

        for id in self.rearm.take_due(ctx.now) {
            self.schedule_next(id, ctx);
        }
    }

    fn wrap_start(&mut self, now: f64) {
        if self.duration_secs <= 0.0 {
            return;
        }
        if let Some(start) = self.start_time.as_mut() {
            while now > *start + self.duration_secs {
                *start += self.duration_secs;
            }
        }
    }

    pub fn set_duration_in_bars(&mut self, bars: u32, ctx: &mut PlaybackContext<'_>) {
        self.duration_in_bars = bars.max(1);
        self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        self.retime_notes(ctx);
    }

    /// Keep the fractional position in the iteration across a change of
    /// iteration length.
    fn rescale_duration(&mut self, ctx: &mut PlaybackContext<'_>) {
        let new_duration = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        if self.is_playing() && self.duration_secs > 0.0 {
            self.wrap_start(ctx.now);
            if let Some(start) = self.start_time {
                let progress = (ctx.now - start) / self.duration_secs;
                self.start_time = Some(ctx.now - progress * new_duration);
            }
        }
        self.duration_secs = new_duration;
        self.retime_notes(ctx);
    }

    fn retime_notes(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.is_playing() {
            return;
        }
        for id in self.notes.ids() {
            self.update_to_new_position(id, ctx);
        }
    }

    // --- scheduling ---

    /// Offset of `position` into an iteration, in `[0, duration)`.
    fn offset_of(&self, position: f64, tempo: &TempoClock) -> f64 {
        let duration = tempo.seconds_per_bar() * self.duration_in_bars as f64;
        if duration <= 0.0 {
            return 0.0;
        }
        let offset = tempo.distance_to_time(position).rem_euclid(duration);
        if duration - offset < SLOT_EPSILON {
            0.0
        } else {
            offset
        }
    }

    /// Recompute the next deadline of `id` from its position. A deadline
    /// already behind the clock moves to the next iteration.
    fn update_to_new_position(&mut self, id: NoteId, ctx: &mut PlaybackContext<'_>) {
        if !self.is_playing() {
            return;
        }
        self.wrap_start(ctx.now);
        let Some(start) = self.start_time else {
            return;
        };
        let Some(position) = self.notes.get(id).map(Note::position) else {
            return;
        };
        let mut trigger = start + self.offset_of(position, ctx.tempo);
        if trigger < ctx.now {
            trigger += self.duration_secs;
        }
        if let Some(note) = self.notes.get_mut(id) {
            note.trigger_time = Some(trigger);
        }
        self.trigger_available(id, ctx);
    }

    fn arm_on_start(&mut self, id: NoteId, ctx: &mut PlaybackContext<'_>) {
        let voice = self.voice(id);
        let Some(clip) = self.sample.clip() else {
            return;
        };
        let Some(note) = self.notes.get_mut(id) else {
            return;
        };
        let Some(trigger) = note.trigger_time else {
            return;
        };
        if !note.is_audible() {
            return;
        }
        if (trigger - ctx.now).abs() <= START_EPSILON {
            ctx.backend.schedule(voice, ctx.now, clip);
            note.occurrence = Some(Occurrence {
                start: ctx.now,
                end: ctx.now + clip.duration_secs(),
            });
        } else {
            self.schedule_next(id, ctx);
        }
    }

    /// The note has a new deadline. Replace whatever is pending, unless the
    /// previous occurrence is still sounding, in which case wait for it.
    fn trigger_available(&mut self, id: NoteId, ctx: &mut PlaybackContext<'_>) {
        let voice = self.voice(id);
        let Some(note) = self.notes.get(id) else {
            return;
        };
        if !note.is_audible() {
            return;
        }
        let sounding_until = note
            .occurrence
            .filter(|_| note.is_sounding(ctx.now))
            .map(|occurrence| occurrence.end);
        match sounding_until {
            Some(end) => self.rearm.schedule(id, end + START_EPSILON),
            None => {
                self.rearm.cancel(id);
                ctx.backend.cancel(voice);
                self.schedule_next(id, ctx);
            }
        }
    }

    fn schedule_next(&mut self, id: NoteId, ctx: &mut PlaybackContext<'_>) {
        let voice = self.voice(id);
        let Some(clip) = self.sample.clip() else {
            return;
        };
        let Some(note) = self.notes.get_mut(id) else {
            return;
        };
        let Some(trigger) = note.trigger_time else {
            return;
        };
        if !note.is_audible() || trigger <= ctx.now {
            return;
        }
        ctx.backend.schedule(voice, trigger, clip);
        note.occurrence = Some(Occurrence {
            start: trigger,
            end: trigger + clip.duration_secs(),
        });
        log::debug!(
            "{} armed {} at {trigger:.3}s",
            self.name,
            ctx.tempo.format_position(trigger - self.start_time.unwrap_or(trigger))
        );
    }

    // --- notes ---

    /// Clamp `position` to the track axis and, when snapping is on and no
    /// clamp happened, pull it onto a nearby sub-beat grid line.
    pub fn place(&self, position: f64, tempo: &TempoClock) -> f64 {
        let length = self.length(tempo);
        if !position.is_finite() || position <= 0.0 {
            return 0.0;
        }
        if position >= length {
            return length;
        }
        if !self.snapping {
            return position;
        }
        let grid_time = tempo.closest_sub_beat_time(tempo.distance_to_time(position));
        let grid_position = tempo.time_to_distance(grid_time);
        if (position - grid_position).abs() <= tempo.sub_beat_snapping_distance() {
            grid_position.min(length)
        } else {
            position
        }
    }

    fn ensure_free(
        &self,
        position: f64,
        except: Option<NoteId>,
        tempo: &TempoClock,
    ) -> Result<(), SequencerError> {
        let offset = self.offset_of(position, tempo);
        let taken = self
            .notes
            .iter()
            .filter(|(id, _)| Some(*id) != except)
            .any(|(_, note)| (self.offset_of(note.position(), tempo) - offset).abs() < SLOT_EPSILON);
        if taken {
            log::warn!("{}: slot at {position:.4} already taken", self.name);
            return Err(SequencerError::SlotOccupied { position });
        }
        Ok(())
    }

    /// Place a note from a user drop: clamped, snapped, and scheduled right
    /// away when the track is playing.
    pub fn add_note(
        &mut self,
        position: f64,
        kind: NoteKind,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<NoteId, SequencerError> {
        let position = self.place(position, ctx.tempo);
        self.insert_note(position, kind, ctx)
    }

    /// Place a note exactly where it was saved. Only clamped, never snapped.
    pub fn restore_note(
        &mut self,
        position: f64,
        kind: NoteKind,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<NoteId, SequencerError> {
        let length = self.length(ctx.tempo);
        let position = if position.is_finite() {
            position.clamp(0.0, length)
        } else {
            0.0
        };
        self.insert_note(position, kind, ctx)
    }

    fn insert_note(
        &mut self,
        position: f64,
        kind: NoteKind,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<NoteId, SequencerError> {
        self.ensure_free(position, None, ctx.tempo)?;
        let id = self.notes.insert(Note::new(position, kind));
        log::debug!(
            "{}: {kind:?} note at {}",
            self.name,
            ctx.tempo.format_position(self.offset_of(position, ctx.tempo))
        );
        self.update_to_new_position(id, ctx);
        Ok(id)
    }

    /// Drag a note to `position`. Returns where it actually landed.
    pub fn move_note(
        &mut self,
        id: NoteId,
        position: f64,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<f64, SequencerError> {
        if !self.notes.contains(id) {
            return Err(SequencerError::UnknownNote(id));
        }
        let position = self.place(position, ctx.tempo);
        self.ensure_free(position, Some(id), ctx.tempo)?;
        if let Some(note) = self.notes.get_mut(id) {
            note.set_position(position);
        }
        self.notes.relink(id);
        self.update_to_new_position(id, ctx);
        Ok(position)
    }

    pub fn remove_note(
        &mut self,
        id: NoteId,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<Note, SequencerError> {
        let note = self.notes.remove(id).ok_or(SequencerError::UnknownNote(id))?;
        self.rearm.cancel(id);
        ctx.backend.cancel(self.voice(id));
        log::debug!("{}: removed note at {:.4}", self.name, note.position());
        Ok(note)
    }

    pub fn clear_notes(&mut self, ctx: &mut PlaybackContext<'_>) {
        for id in self.notes.ids() {
            ctx.backend.cancel(self.voice(id));
        }
        self.rearm.clear();
        self.notes.clear();
    }

    // --- audio ---

    pub fn awaits(&self, request: RequestId) -> bool {
        self.sample.awaits(request)
    }

    /// Install freshly synthesized audio and re-arm every pending deadline
    /// with it. Occurrences already sounding finish with the old audio.
    pub fn apply_clip(
        &mut self,
        request: RequestId,
        clip: AudioArc,
        ctx: &mut PlaybackContext<'_>,
    ) -> bool {
        if !self.sample.apply_clip(request, clip) {
            return false;
        }
        if self.is_playing() {
            for id in self.notes.ids() {
                let armed = self.notes.get(id).is_some_and(|n| n.trigger_time.is_some());
                if armed {
                    self.trigger_available(id, ctx);
                }
            }
        }
        true
    }

    /// Stop for good and give up solo. Returns whether the track was solo, so
    /// the owner can release the other tracks.
    pub(crate) fn delete(&mut self, ctx: &mut PlaybackContext<'_>) -> bool {
        self.stop(ctx);
        ctx.backend.cancel_bus(self.bus());
        std::mem::replace(&mut self.solo, false)
    }

    pub fn to_export_data(&self, tempo: &TempoClock) -> TrackExportData {
        let duration = tempo.seconds_per_bar() * self.duration_in_bars as f64;
        let notes = self
            .notes
            .iter()
            .map(|(_, note)| {
                let trigger_time = self.offset_of(note.position(), tempo);
                NoteExportData {
                    trigger_time,
                    pos_on_track_axis: if duration > 0.0 { trigger_time / duration } else { 0.0 },
                    silent: !note.is_audible(),
                }
            })
            .collect();

        TrackExportData {
            track_name: self.name.clone(),
            color: self.color,
            sample_definition: self.sample.definition().clone(),
            track_volume: self.volume,
            is_muted: self.muted,
            is_solo: self.solo,
            another_is_solo: self.another_is_solo,
            notes,
        }
    }
}

impl TempoObserver for Track {
    fn tempo_changed(&mut self, change: TempoChange, ctx: &mut PlaybackContext<'_>) {
        match change {
            TempoChange::Bpm(_) | TempoChange::BeatType(_) => self.rescale_duration(ctx),
            TempoChange::BeatsPerBar(_) => {
                self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
                self.retime_notes(ctx);
            }
            TempoChange::DistancePerBeat { factor } => {
                for id in self.notes.ids() {
                    if let Some(note) = self.notes.get_mut(id) {
                        note.set_position(note.position() * factor);
                    }
                }
                self.retime_notes(ctx);
            }
            TempoChange::Subdivision(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorded, RecordingBackend, ScriptedSynth};
    use crate::time::BeatSubdivision;
    use spaceloop_transport::SampleDefinition;

    const CLIP_SECS: f64 = 0.5;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn assert_times(actual: Vec<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!(approx(*a, *e), "{actual:?} vs {expected:?}");
        }
    }

    fn trigger(track: &Track, id: NoteId) -> f64 {
        track.note(id).and_then(Note::trigger_time).unwrap()
    }

    fn clip() -> AudioArc {
        AudioArc::mono(vec![0.1; (48000.0 * CLIP_SECS) as usize], 48000)
    }

    fn track_with_clip(tempo: &TempoClock) -> Track {
        let mut synth = ScriptedSynth::default();
        let mut sample = Sample::new(SampleDefinition::with_default_vector("kick"));
        sample.request_clip(&mut synth);
        assert!(sample.apply_clip(synth.issued[0], clip()));
        Track::new(TrackId(1), "Track 1", TrackColor::new(0.9, 0.3, 0.2), sample, 2, tempo)
    }

    fn voice(id: NoteId) -> VoiceKey {
        VoiceKey::Note {
            track: TrackId(1),
            note: id,
        }
    }

    #[test]
    fn test_quarter_of_two_bars_triggers_at_two_seconds() {
        let tempo = TempoClock::new(60.0, (4, 4), 0.2);
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);

        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 10.0);
        let position = 0.25 * track.length(&tempo);
        let id = track.add_note(position, NoteKind::Audible, &mut ctx).unwrap();
        track.play(&mut ctx);

        assert!(approx(track.duration_secs(), 8.0));
        assert_times(backend.scheduled(voice(id)), &[12.0]);
    }

    #[test]
    fn test_note_at_loop_start_plays_immediately() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);

        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 3.0);
        let id = track.add_note(0.0, NoteKind::Audible, &mut ctx).unwrap();
        track.play(&mut ctx);

        assert_times(backend.scheduled(voice(id)), &[3.0]);
        assert!(track.note(id).unwrap().is_sounding(3.1));
    }

    #[test]
    fn test_tick_moves_elapsed_note_to_next_iteration() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);

        {
            let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
            track.add_note(0.2, NoteKind::Audible, &mut ctx).unwrap();
            track.play(&mut ctx);
        }
        let id = track.notes().head().unwrap();
        assert_times(backend.scheduled(voice(id)), &[1.0]);

        // inside the guard window nothing moves
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 1.05));
        assert!(approx(trigger(&track, id), 1.0));

        // past the guard, the next deadline waits for the clip to finish
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 1.2));
        assert!(approx(trigger(&track, id), 9.0));
        assert_times(backend.scheduled(voice(id)), &[1.0]);

        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 1.0 + CLIP_SECS + 0.1));
        assert_times(backend.scheduled(voice(id)), &[1.0, 9.0]);
    }

    #[test]
    fn test_tick_wraps_start_time() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);

        track.play(&mut PlaybackContext::new(&tempo, &mut backend, 1.0));
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 9.0));
        assert_eq!(track.start_time(), Some(1.0));
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 9.5));
        assert_eq!(track.start_time(), Some(9.0));
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 30.0));
        assert_eq!(track.start_time(), Some(25.0));
    }

    #[test]
    fn test_stop_cancels_everything() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);

        {
            let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
            track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
            track.play(&mut ctx);
            track.stop(&mut ctx);
        }
        assert!(backend.log.contains(&Recorded::CancelBus(Bus::Track(TrackId(1)))));
        assert_eq!(track.start_time(), None);

        backend.clear();
        track.tick(&mut PlaybackContext::new(&tempo, &mut backend, 20.0));
        assert!(backend.all_scheduled().is_empty());
        assert!(track.notes().iter().all(|(_, n)| n.trigger_time().is_none()));
    }

    #[test]
    fn test_bpm_change_preserves_progress() {
        let mut tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let id;
        {
            let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
            id = track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
            track.play(&mut ctx);
        }

        let now = 3.0;
        let before = track.progress(now).unwrap();
        let change = tempo.set_bpm(120.0).unwrap();
        track.tempo_changed(change, &mut PlaybackContext::new(&tempo, &mut backend, now));
        let after = track.progress(now).unwrap();

        assert!((before - after).abs() < 1.0 / 48000.0);
        assert!(approx(track.duration_secs(), 4.0));
        assert_eq!(track.start_time(), Some(1.5));
        // 0.4 at 120 bpm is one second in; that moment passed, so next iteration
        assert!(approx(trigger(&track, id), 6.5));
        assert!(approx(*backend.scheduled(voice(id)).last().unwrap(), 6.5));
    }

    #[test]
    fn test_beat_type_change_preserves_progress() {
        let mut tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.play(&mut PlaybackContext::new(&tempo, &mut backend, 0.0));

        let now = 6.0;
        let change = tempo.set_beat_type(8).unwrap();
        track.tempo_changed(change, &mut PlaybackContext::new(&tempo, &mut backend, now));

        assert!(approx(track.duration_secs(), 4.0));
        assert!(approx(track.progress(now).unwrap(), 0.75));
    }

    #[test]
    fn test_beats_per_bar_change_keeps_start() {
        let mut tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.play(&mut PlaybackContext::new(&tempo, &mut backend, 2.0));

        let change = tempo.set_beats_per_bar(3).unwrap();
        track.tempo_changed(change, &mut PlaybackContext::new(&tempo, &mut backend, 4.0));
        assert_eq!(track.start_time(), Some(2.0));
        assert!(approx(track.duration_secs(), 6.0));
    }

    #[test]
    fn test_distance_per_beat_scales_positions() {
        let mut tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let id;
        {
            let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
            id = track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
            track.play(&mut ctx);
        }

        let change = tempo.set_distance_per_beat(0.4).unwrap();
        track.tempo_changed(change, &mut PlaybackContext::new(&tempo, &mut backend, 0.5));

        assert!(approx(track.note(id).unwrap().position(), 0.8));
        assert!(approx(trigger(&track, id), 2.0));
    }

    #[test]
    fn test_recomputed_triggers_stay_within_one_iteration() {
        let mut tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.set_snapping(false);
        {
            let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
            for step in 0..16 {
                track.add_note(step as f64 * 0.1, NoteKind::Audible, &mut ctx).unwrap();
            }
            track.play(&mut ctx);
        }

        let mut now = 0.0;
        for bpm in [90.0, 45.0, 133.0, 60.0, 200.0] {
            now += 1.37;
            track.tick(&mut PlaybackContext::new(&tempo, &mut backend, now));
            let change = tempo.set_bpm(bpm).unwrap();
            track.tempo_changed(change, &mut PlaybackContext::new(&tempo, &mut backend, now));

            for (_, note) in track.notes().iter() {
                let trigger = note.trigger_time().unwrap();
                assert!(trigger >= now, "{trigger} behind {now}");
                assert!(trigger < now + track.duration_secs());
            }
        }
    }

    #[test]
    fn test_note_added_while_playing_gets_next_deadline() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.play(&mut PlaybackContext::new(&tempo, &mut backend, 0.0));

        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 5.0);
        let early = track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
        let late = track.add_note(1.2, NoteKind::Audible, &mut ctx).unwrap();

        assert_times(backend.scheduled(voice(early)), &[10.0]);
        assert_times(backend.scheduled(voice(late)), &[6.0]);
    }

    #[test]
    fn test_move_replaces_pending_deadline() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        let a = track.add_note(0.2, NoteKind::Audible, &mut ctx).unwrap();
        let b = track.add_note(0.6, NoteKind::Audible, &mut ctx).unwrap();
        track.play(&mut ctx);

        let landed = track.move_note(a, 1.0, &mut ctx).unwrap();
        assert!(approx(landed, 1.0));
        assert_eq!(track.notes().head(), Some(b));
        assert_eq!(track.notes().next(b), Some(a));
        assert_times(backend.scheduled(voice(a)), &[1.0, 5.0]);
        assert!(backend.log.contains(&Recorded::Cancel(voice(a))));
    }

    #[test]
    fn test_remove_cancels_voice() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        let id = track.add_note(0.2, NoteKind::Audible, &mut ctx).unwrap();
        track.play(&mut ctx);

        track.remove_note(id, &mut ctx).unwrap();
        assert!(matches!(
            track.remove_note(id, &mut ctx),
            Err(SequencerError::UnknownNote(missing)) if missing == id
        ));
        assert!(backend.log.contains(&Recorded::Cancel(voice(id))));
        assert!(track.notes().is_empty());
    }

    #[test]
    fn test_silent_notes_never_schedule() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        let id = track.add_note(0.4, NoteKind::Silent, &mut ctx).unwrap();
        track.play(&mut ctx);

        assert!(backend.all_scheduled().is_empty());
        assert!(approx(trigger(&track, id), 2.0));
    }

    #[test]
    fn test_snaps_to_eighth_between_quarter_beats() {
        let tempo = TempoClock::new(120.0, (4, 4), 0.2).with_subdivision(BeatSubdivision::Eighth);
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);

        // halfway between beat one and two, dropped slightly off
        let id = track.add_note(0.1 + 0.004, NoteKind::Audible, &mut ctx).unwrap();
        assert!(approx(track.note(id).unwrap().position(), 0.1));

        track.set_snapping(false);
        let raw = track.add_note(0.333, NoteKind::Audible, &mut ctx).unwrap();
        assert!(approx(track.note(raw).unwrap().position(), 0.333));
    }

    #[test]
    fn test_place_clamps_without_snapping() {
        let tempo = TempoClock::default();
        let track = track_with_clip(&tempo);
        assert_eq!(track.place(-0.3, &tempo), 0.0);
        assert!(approx(track.place(5.0, &tempo), 1.6));
        // outside the snapping window stays where dropped
        let raw = 0.2 / 3.0 * 0.5;
        assert!(approx(track.place(raw, &tempo), raw));
    }

    #[test]
    fn test_occupied_slot_rejected() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);

        track.add_note(0.0, NoteKind::Audible, &mut ctx).unwrap();
        assert!(matches!(
            track.add_note(0.0, NoteKind::Silent, &mut ctx),
            Err(SequencerError::SlotOccupied { .. })
        ));
        // the far end of the axis is the same slot as the start
        assert!(track.add_note(1.6, NoteKind::Audible, &mut ctx).is_err());
        assert_eq!(track.notes().len(), 1);
    }

    #[test]
    fn test_mute_and_solo_arbitration() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let bus = Bus::Track(TrackId(1));

        track.set_muted(true, &mut backend);
        assert!(!track.is_allowed_to_sound());
        assert_eq!(backend.last_audible(bus), Some(false));

        assert!(track.toggle_solo(&mut backend));
        assert!(track.is_allowed_to_sound());
        assert_eq!(backend.last_audible(bus), Some(true));

        track.set_another_is_solo(true, &mut backend);
        assert!(!track.is_solo());
        assert!(!track.is_allowed_to_sound());

        track.set_another_is_solo(false, &mut backend);
        track.set_muted(false, &mut backend);
        assert!(track.is_allowed_to_sound());
    }

    #[test]
    fn test_volume_is_clamped_and_sent() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.set_volume(1.7, &mut backend);
        assert_eq!(track.volume(), 1.0);
        assert_eq!(backend.last_gain(Bus::Track(TrackId(1))), Some(1.0));
    }

    #[test]
    fn test_new_clip_rearms_pending_notes() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut synth = ScriptedSynth::default();
        let sample = Sample::new(SampleDefinition::with_default_vector("pad"));
        let mut track = Track::new(TrackId(1), "Track 1", TrackColor::default(), sample, 2, &tempo);

        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        let id = track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
        track.play(&mut ctx);
        assert!(backend.all_scheduled().is_empty());

        track.sample_mut().request_clip(&mut synth);
        let request = synth.issued[0];
        assert!(track.awaits(request));
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 1.0);
        assert!(track.apply_clip(request, clip(), &mut ctx));
        assert_times(backend.scheduled(voice(id)), &[2.0]);
    }

    #[test]
    fn test_delete_releases_solo() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        track.toggle_solo(&mut backend);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        track.play(&mut ctx);
        assert!(track.delete(&mut ctx));
        assert!(!track.is_solo());
        assert!(!track.is_playing());
    }

    #[test]
    fn test_export_normalizes_positions() {
        let tempo = TempoClock::default();
        let mut backend = RecordingBackend::default();
        let mut track = track_with_clip(&tempo);
        let mut ctx = PlaybackContext::new(&tempo, &mut backend, 0.0);
        track.add_note(0.4, NoteKind::Audible, &mut ctx).unwrap();
        track.add_note(1.2, NoteKind::Silent, &mut ctx).unwrap();

        let data = track.to_export_data(&tempo);
        assert_eq!(data.track_name, "Track 1");
        assert_eq!(data.notes.len(), 2);
        assert!(approx(data.notes[0].pos_on_track_axis, 0.25));
        assert!(approx(data.notes[0].trigger_time, 2.0));
        assert!(!data.notes[0].silent);
        assert!(approx(data.notes[1].pos_on_track_axis, 0.75));
        assert!(data.notes[1].silent);
    }
}
