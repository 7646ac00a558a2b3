use chrono::Local;
use rand::Rng;
use spaceloop_project::{LoopExportData, TrackColor, TrackExportData};
use spaceloop_transport::{NoteId, PlaybackBackend, SampleDefinition, SynthesisService, TrackId};

use crate::context::PlaybackContext;
use crate::error::SequencerError;
use crate::metronome::Metronome;
use crate::note::{Note, NoteKind};
use crate::sample::Sample;
use crate::songs::{Song, SongTrack};
use crate::time::{TempoChange, TempoClock, TempoObserver};
use crate::track::{PlaybackState, Track};

pub const DEFAULT_DURATION_IN_BARS: u32 = 2;

/// Track colours. The first ones go to a new loop's initial tracks; tracks
/// added later draw from the rest.
pub const TRACK_COLORS: [TrackColor; 8] = [
    TrackColor::new(0.91, 0.30, 0.24),
    TrackColor::new(0.20, 0.60, 0.86),
    TrackColor::new(0.18, 0.80, 0.44),
    TrackColor::new(0.95, 0.77, 0.06),
    TrackColor::new(0.61, 0.35, 0.71),
    TrackColor::new(0.90, 0.49, 0.13),
    TrackColor::new(0.10, 0.74, 0.61),
    TrackColor::new(0.93, 0.44, 0.69),
];

/// A set of tracks sharing one bar count, played in sync, plus an optional
/// background song and a metronome.
#[derive(Debug)]
pub struct Loop {
    name: String,
    has_default_name: bool,
    /// 1-based: the first export of a name is `{name}_v1`.
    export_version: u32,
    duration_in_bars: u32,
    tracks: Vec<Track>,
    song: SongTrack,
    metronome: Metronome,
    state: PlaybackState,
    start_time: Option<f64>,
    duration_secs: f64,
    next_track_id: u64,
    track_counter: u32,
    initial_track_count: usize,
    snapping: bool,
    was_saved: bool,
}

impl Loop {
    pub fn new(name: impl Into<String>, duration_in_bars: u32, tempo: &TempoClock) -> Self {
        let duration_in_bars = duration_in_bars.max(1);
        Self {
            name: name.into(),
            has_default_name: false,
            export_version: 1,
            duration_in_bars,
            tracks: Vec::new(),
            song: SongTrack::default(),
            metronome: Metronome::default(),
            state: PlaybackState::Stopped,
            start_time: None,
            duration_secs: tempo.seconds_per_bar() * duration_in_bars as f64,
            next_track_id: 0,
            track_counter: 0,
            initial_track_count: 0,
            snapping: true,
            was_saved: false,
        }
    }

    /// An unnamed loop gets `Loop{n}` and is flagged so exporting it under
    /// that name can be warned about.
    pub fn with_default_name(counter: u32, tempo: &TempoClock) -> Self {
        let mut lp = Self::new(format!("Loop{counter}"), DEFAULT_DURATION_IN_BARS, tempo);
        lp.has_default_name = true;
        lp
    }

    /// Fill an empty loop with `count` tracks, each on a fresh random sample.
    pub fn add_random_tracks(
        &mut self,
        count: usize,
        synth: &mut dyn SynthesisService,
        ctx: &mut PlaybackContext<'_>,
    ) {
        for i in 0..count {
            let mut sample = Sample::new(SampleDefinition::random(format!("Random {i}")));
            sample.request_clip(synth);
            self.add_track(None, TRACK_COLORS[i % TRACK_COLORS.len()], sample, ctx);
        }
        self.initial_track_count = count;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_default_name(&self) -> bool {
        self.has_default_name
    }

    /// Rename. A new name starts its export versions over.
    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name == self.name {
            return;
        }
        log::info!("loop '{}' renamed to '{name}'", self.name);
        self.name = name;
        self.has_default_name = false;
        self.export_version = 1;
    }

    /// Version the next export is written under. Starts at 1, so the first
    /// file of a loop is `{name}_v1.json`.
    pub fn export_version(&self) -> u32 {
        self.export_version
    }

    /// File stem the next export is written under.
    pub fn export_stem(&self) -> String {
        format!("{}_v{}", self.name, self.export_version)
    }

    pub fn was_saved(&self) -> bool {
        self.was_saved
    }

    /// Record a successful export.
    pub fn mark_saved(&mut self) {
        self.export_version += 1;
        self.was_saved = true;
    }

    pub fn duration_in_bars(&self) -> u32 {
        self.duration_in_bars
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn length(&self, tempo: &TempoClock) -> f64 {
        tempo.distance_per_bar() * self.duration_in_bars as f64
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn progress(&self, now: f64) -> Option<f64> {
        let start = self.start_time?;
        if self.duration_secs <= 0.0 {
            return None;
        }
        Some(((now - start) / self.duration_secs).clamp(0.0, 1.0))
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Result<&Track, SequencerError> {
        self.tracks
            .iter()
            .find(|t| t.id() == id)
            .ok_or(SequencerError::UnknownTrack(id))
    }

    pub fn track_mut(&mut self, id: TrackId) -> Result<&mut Track, SequencerError> {
        self.tracks
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or(SequencerError::UnknownTrack(id))
    }

    pub(crate) fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    pub fn song(&self) -> &SongTrack {
        &self.song
    }

    pub fn snapping(&self) -> bool {
        self.snapping
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool, backend: &mut dyn PlaybackBackend) {
        self.metronome.set_enabled(enabled, backend);
    }

    /// Switch the clicks on or off. The metronome keeps its beat either way.
    pub fn toggle_metronome(&mut self, backend: &mut dyn PlaybackBackend) -> bool {
        let enabled = self.metronome.toggle(backend);
        log::info!(
            "loop '{}': metronome {}",
            self.name,
            if enabled { "on" } else { "off" }
        );
        enabled
    }

    pub fn set_snapping(&mut self, snapping: bool) {
        self.snapping = snapping;
        for track in &mut self.tracks {
            track.set_snapping(snapping);
        }
    }

    pub fn toggle_snapping(&mut self) -> bool {
        self.set_snapping(!self.snapping);
        self.snapping
    }

    /// A colour for a track added after the initial ones.
    pub fn pick_color(&self) -> TrackColor {
        let first = self.initial_track_count.min(TRACK_COLORS.len() - 1);
        TRACK_COLORS[rand::rng().random_range(first..TRACK_COLORS.len())]
    }

    // --- structure ---

    pub fn set_duration_in_bars(&mut self, bars: u32, ctx: &mut PlaybackContext<'_>) {
        self.duration_in_bars = bars.max(1);
        self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        for track in &mut self.tracks {
            track.set_duration_in_bars(self.duration_in_bars, ctx);
        }
        log::debug!("loop '{}' now {} bars", self.name, self.duration_in_bars);
    }

    pub fn add_bar(&mut self, ctx: &mut PlaybackContext<'_>) {
        self.set_duration_in_bars(self.duration_in_bars + 1, ctx);
    }

    /// Add a track. `None` names it `Track {n}`. A track added while the loop
    /// plays joins the current iteration in phase.
    pub fn add_track(
        &mut self,
        name: Option<String>,
        color: TrackColor,
        sample: Sample,
        ctx: &mut PlaybackContext<'_>,
    ) -> TrackId {
        let name = name.unwrap_or_else(|| format!("Track {}", self.track_counter));
        self.track_counter += 1;
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;

        let mut track = Track::new(id, name, color, sample, self.duration_in_bars, ctx.tempo);
        track.set_snapping(self.snapping);
        if self.tracks.iter().any(Track::is_solo) {
            track.set_another_is_solo(true, ctx.backend);
        }
        if self.is_playing() {
            self.wrap_start(ctx.now);
            if let Some(start) = self.start_time {
                track.join_at(start, ctx);
            }
        }
        log::debug!("loop '{}': added {}", self.name, track.name());
        self.tracks.push(track);
        id
    }

    pub fn remove_track(
        &mut self,
        id: TrackId,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<Track, SequencerError> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id() == id)
            .ok_or(SequencerError::UnknownTrack(id))?;
        let mut track = self.tracks.remove(index);
        if track.delete(ctx) {
            for other in &mut self.tracks {
                other.set_another_is_solo(false, ctx.backend);
            }
        }
        log::debug!("loop '{}': removed {}", self.name, track.name());
        Ok(track)
    }

    /// Build a track from its exported form. Notes land exactly where they
    /// were saved, relative to the current loop length.
    pub fn restore_track(
        &mut self,
        data: &TrackExportData,
        sample: Sample,
        ctx: &mut PlaybackContext<'_>,
    ) -> TrackId {
        let id = self.add_track(Some(data.track_name.clone()), data.color, sample, ctx);
        let length = self.length(ctx.tempo);
        if let Ok(track) = self.track_mut(id) {
            track.set_volume(data.track_volume, ctx.backend);
            track.set_another_is_solo(data.another_is_solo, ctx.backend);
            track.set_solo(data.is_solo, ctx.backend);
            track.set_muted(data.is_muted, ctx.backend);

            for note in &data.notes {
                let kind = if note.silent { NoteKind::Silent } else { NoteKind::Audible };
                if let Err(e) = track.restore_note(note.pos_on_track_axis * length, kind, ctx) {
                    log::warn!("dropping note of {}: {e}", data.track_name);
                }
            }
        }
        id
    }

    // --- mix ---

    /// Flip solo on `id`; every other track follows with its another-is-solo
    /// flag. Returns the new solo state.
    pub fn toggle_solo(
        &mut self,
        id: TrackId,
        backend: &mut dyn PlaybackBackend,
    ) -> Result<bool, SequencerError> {
        let solo = self.track_mut(id)?.toggle_solo(backend);
        for other in self.tracks.iter_mut().filter(|t| t.id() != id) {
            other.set_another_is_solo(solo, backend);
        }
        Ok(solo)
    }

    pub fn toggle_mute(
        &mut self,
        id: TrackId,
        backend: &mut dyn PlaybackBackend,
    ) -> Result<bool, SequencerError> {
        Ok(self.track_mut(id)?.toggle_mute(backend))
    }

    pub fn set_track_volume(
        &mut self,
        id: TrackId,
        volume: f32,
        backend: &mut dyn PlaybackBackend,
    ) -> Result<(), SequencerError> {
        self.track_mut(id)?.set_volume(volume, backend);
        Ok(())
    }

    pub fn set_song(&mut self, song: Option<Song>, ctx: &mut PlaybackContext<'_>) {
        self.song.set_song(song, ctx);
    }

    pub fn set_song_volume(&mut self, volume: f32, backend: &mut dyn PlaybackBackend) {
        self.song.set_volume(volume, backend);
    }

    // --- notes ---

    pub fn add_note(
        &mut self,
        track: TrackId,
        position: f64,
        kind: NoteKind,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<NoteId, SequencerError> {
        self.track_mut(track)?.add_note(position, kind, ctx)
    }

    pub fn move_note(
        &mut self,
        track: TrackId,
        note: NoteId,
        position: f64,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<f64, SequencerError> {
        self.track_mut(track)?.move_note(note, position, ctx)
    }

    pub fn remove_note(
        &mut self,
        track: TrackId,
        note: NoteId,
        ctx: &mut PlaybackContext<'_>,
    ) -> Result<Note, SequencerError> {
        self.track_mut(track)?.remove_note(note, ctx)
    }

    // --- playback ---

    pub fn play(&mut self, ctx: &mut PlaybackContext<'_>) {
        self.state = PlaybackState::Playing;
        self.start_time = Some(ctx.now);
        self.duration_secs = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        for track in &mut self.tracks {
            track.play(ctx);
        }
        self.song.play(ctx);
        self.metronome.start(ctx);
        log::info!("loop '{}' playing", self.name);
    }

    pub fn stop(&mut self, ctx: &mut PlaybackContext<'_>) {
        if self.is_playing() {
            self.state = PlaybackState::Stopped;
            self.start_time = None;
            for track in &mut self.tracks {
                track.stop(ctx);
            }
            log::info!("loop '{}' stopped", self.name);
        }
        self.song.stop(ctx);
        self.metronome.stop(ctx);
    }

    pub fn tick(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.is_playing() {
            return;
        }
        self.wrap_start(ctx.now);
        for track in &mut self.tracks {
            track.tick(ctx);
        }
        self.song.tick(ctx);
        self.metronome.tick(ctx);
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

    // --- export ---

    pub fn to_export_data(
        &self,
        tempo: &TempoClock,
        participant_id: &str,
        condition_name: &str,
    ) -> LoopExportData {
        LoopExportData {
            participant_id: participant_id.to_string(),
            condition_name: condition_name.to_string(),
            loop_name: self.name.clone(),
            export_date: Local::now(),
            bpm: tempo.bpm(),
            time_signature_hi: tempo.beats_per_bar(),
            time_signature_lo: tempo.beat_type(),
            meters_per_beat: tempo.distance_per_beat(),
            duration_in_bars: self.duration_in_bars,
            song_name: self.song.song_name().map(str::to_string),
            song_volume: self.song.volume(),
            tracks: self.tracks.iter().map(|t| t.to_export_data(tempo)).collect(),
        }
    }
}

impl TempoObserver for Loop {
    fn tempo_changed(&mut self, change: TempoChange, ctx: &mut PlaybackContext<'_>) {
        let new_duration = ctx.tempo.seconds_per_bar() * self.duration_in_bars as f64;
        if change.rescales_time() && self.is_playing() && self.duration_secs > 0.0 {
            self.wrap_start(ctx.now);
            if let Some(start) = self.start_time {
                let progress = (ctx.now - start) / self.duration_secs;
                self.start_time = Some(ctx.now - progress * new_duration);
            }
        }
        self.duration_secs = new_duration;
        for track in &mut self.tracks {
            track.tempo_changed(change, ctx);
        }
        self.metronome.tempo_changed(change, ctx);
    }
}
