use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use spaceloop_project::{
    LoopExportData, LoopMetadata, ProjectError, SampleLibrary, list_loops, load_loop,
    participant_library_path, save_loop,
};
use spaceloop_transport::{
    AudioArc, AudioClock, NoteId, PlaybackBackend, SYNTH_SAMPLE_RATE, SampleDefinition, Status,
    SynthResponse, SynthesisService, TrackId,
};

use crate::context::PlaybackContext;
use crate::error::SequencerError;
use crate::loops::{DEFAULT_DURATION_IN_BARS, Loop};
use crate::note::{Note, NoteKind};
use crate::sample::Sample;
use crate::settings::{ImportTempo, SessionSettings};
use crate::songs::SongLibrary;
use crate::time::{BeatSubdivision, TempoChange, TempoClock, TempoObserver};

/// Everything one participant's sequencer runs on: the tempo clock, the
/// libraries, the audio and synthesis collaborators, and the loop being
/// worked on.
///
/// All mutation happens on the control thread. Tempo edits are propagated to
/// the loop inside the setter, so the next [`Session::tick`] never sees a
/// half-applied change.
pub struct Session {
    settings: SessionSettings,
    tempo: TempoClock,
    library: SampleLibrary,
    songs: SongLibrary,
    backend: Box<dyn PlaybackBackend>,
    synth: Box<dyn SynthesisService>,
    clock: Arc<dyn AudioClock>,
    current: Loop,
    loop_counter: u32,
}

impl Session {
    /// Load the sample and song libraries from the configured locations and
    /// start with a default loop.
    pub fn new(
        settings: SessionSettings,
        backend: Box<dyn PlaybackBackend>,
        synth: Box<dyn SynthesisService>,
        clock: Arc<dyn AudioClock>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&settings.export_dir).with_context(|| {
            format!("creating export directory {}", settings.export_dir.display())
        })?;

        let library = load_sample_library(&settings);
        let songs = SongLibrary::load(&settings.songs_dir, backend.sample_rate());
        Ok(Self::with_libraries(
            settings, library, songs, backend, synth, clock,
        ))
    }

    pub fn with_libraries(
        settings: SessionSettings,
        library: SampleLibrary,
        songs: SongLibrary,
        mut backend: Box<dyn PlaybackBackend>,
        synth: Box<dyn SynthesisService>,
        clock: Arc<dyn AudioClock>,
    ) -> Self {
        let tempo = TempoClock::default();
        let mut current = Loop::new(String::new(), DEFAULT_DURATION_IN_BARS, &tempo);
        current.set_metronome_enabled(settings.metronome, backend.as_mut());
        let mut session = Self {
            settings,
            tempo,
            library,
            songs,
            backend,
            synth,
            clock,
            current,
            loop_counter: 1,
        };
        session.load_default_loop();
        session
    }

    fn context(&mut self) -> (&mut Loop, PlaybackContext<'_>) {
        let now = self.clock.now();
        (
            &mut self.current,
            PlaybackContext::new(&self.tempo, self.backend.as_mut(), now),
        )
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn tempo(&self) -> &TempoClock {
        &self.tempo
    }

    pub fn library(&self) -> &SampleLibrary {
        &self.library
    }

    pub fn songs(&self) -> &SongLibrary {
        &self.songs
    }

    pub fn current_loop(&self) -> &Loop {
        &self.current
    }

    pub fn synth_alive(&self) -> bool {
        self.synth.is_alive()
    }

    // --- control-rate loop ---

    /// One control-rate frame: apply synthesis results, report engine status,
    /// advance the loop, then let the backend tidy up.
    pub fn tick(&mut self) {
        for response in self.synth.poll() {
            self.apply_response(response);
        }

        for status in self.backend.drain_status() {
            match status {
                Status::VoiceStarted { voice, frame } => {
                    log::trace!("{voice:?} started at frame {frame}");
                }
                Status::VoiceDropped { voice } => {
                    log::warn!("voice pool full, {voice:?} was not armed");
                }
            }
        }

        let (lp, mut ctx) = self.context();
        lp.tick(&mut ctx);
        self.backend.maintain();
    }

    fn apply_response(&mut self, response: SynthResponse) {
        let SynthResponse { id, samples } = response;
        if !self.current.tracks().iter().any(|t| t.awaits(id)) {
            log::debug!("no sample waits for synthesis response {id:?}");
            return;
        }

        let clip = match AudioArc::mono(samples, SYNTH_SAMPLE_RATE).resample(self.backend.sample_rate())
        {
            Ok(clip) => clip,
            Err(e) => {
                log::warn!("could not resample synthesized clip {id:?}: {e}");
                return;
            }
        };

        let (lp, mut ctx) = self.context();
        for track in lp.tracks_mut() {
            if track.awaits(id) && track.apply_clip(id, clip.clone(), &mut ctx) {
                log::debug!("{} got new audio ({:.2}s)", track.name(), clip.duration_secs());
            }
        }
    }

    // --- transport ---

    pub fn is_playing(&self) -> bool {
        self.current.is_playing()
    }

    pub fn play(&mut self) {
        let (lp, mut ctx) = self.context();
        lp.play(&mut ctx);
    }

    pub fn stop(&mut self) {
        let (lp, mut ctx) = self.context();
        lp.stop(&mut ctx);
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
        self.is_playing()
    }

    // --- tempo ---

    fn propagate(&mut self, change: Option<TempoChange>) {
        let Some(change) = change else {
            return;
        };
        let (lp, mut ctx) = self.context();
        lp.tempo_changed(change, &mut ctx);
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let change = self.tempo.set_bpm(bpm);
        self.propagate(change);
    }

    pub fn set_beats_per_bar(&mut self, beats_per_bar: u32) {
        let change = self.tempo.set_beats_per_bar(beats_per_bar);
        self.propagate(change);
    }

    pub fn set_beat_type(&mut self, beat_type: u32) {
        let change = self.tempo.set_beat_type(beat_type);
        self.propagate(change);
    }

    pub fn set_distance_per_beat(&mut self, distance_per_beat: f64) {
        let change = self.tempo.set_distance_per_beat(distance_per_beat);
        self.propagate(change);
    }

    pub fn set_subdivision(&mut self, subdivision: BeatSubdivision) {
        let change = self.tempo.set_subdivision(subdivision);
        self.propagate(change);
    }

    // --- loop structure ---

    pub fn set_duration_in_bars(&mut self, bars: u32) {
        let (lp, mut ctx) = self.context();
        lp.set_duration_in_bars(bars, &mut ctx);
    }

    pub fn add_bar(&mut self) {
        let (lp, mut ctx) = self.context();
        lp.add_bar(&mut ctx);
    }

    pub fn rename_loop(&mut self, name: impl Into<String>) {
        self.current.rename(name);
    }

    pub fn toggle_snapping(&mut self) -> bool {
        self.current.toggle_snapping()
    }

    pub fn toggle_metronome(&mut self) -> bool {
        self.current.toggle_metronome(self.backend.as_mut())
    }

    /// Add a track playing its own copy of `definition`.
    pub fn add_track(&mut self, definition: SampleDefinition) -> TrackId {
        let mut sample = Sample::new(definition);
        sample.request_clip(self.synth.as_mut());
        let color = self.current.pick_color();
        let (lp, mut ctx) = self.context();
        lp.add_track(None, color, sample, &mut ctx)
    }

    pub fn add_track_from_library(&mut self, name: &str) -> Result<TrackId, ProjectError> {
        let definition = self.library.new_instance(name)?;
        Ok(self.add_track(definition))
    }

    pub fn remove_track(&mut self, track: TrackId) -> Result<(), SequencerError> {
        let (lp, mut ctx) = self.context();
        lp.remove_track(track, &mut ctx).map(|_| ())
    }

    pub fn toggle_mute(&mut self, track: TrackId) -> Result<bool, SequencerError> {
        self.current.toggle_mute(track, self.backend.as_mut())
    }

    pub fn toggle_solo(&mut self, track: TrackId) -> Result<bool, SequencerError> {
        self.current.toggle_solo(track, self.backend.as_mut())
    }

    pub fn set_track_volume(&mut self, track: TrackId, volume: f32) -> Result<(), SequencerError> {
        self.current.set_track_volume(track, volume, self.backend.as_mut())
    }

    // --- notes ---

    pub fn add_note(
        &mut self,
        track: TrackId,
        position: f64,
        kind: NoteKind,
    ) -> Result<NoteId, SequencerError> {
        let (lp, mut ctx) = self.context();
        lp.add_note(track, position, kind, &mut ctx)
    }

    pub fn move_note(
        &mut self,
        track: TrackId,
        note: NoteId,
        position: f64,
    ) -> Result<f64, SequencerError> {
        let (lp, mut ctx) = self.context();
        lp.move_note(track, note, position, &mut ctx)
    }

    pub fn remove_note(&mut self, track: TrackId, note: NoteId) -> Result<Note, SequencerError> {
        let (lp, mut ctx) = self.context();
        lp.remove_note(track, note, &mut ctx)
    }

    // --- sample editing ---

    pub fn update_sample_value(
        &mut self,
        track: TrackId,
        index: usize,
        value: f32,
    ) -> Result<(), SequencerError> {
        let synth = self.synth.as_mut();
        self.current
            .track_mut(track)?
            .sample_mut()
            .update_value(index, value, synth)?;
        Ok(())
    }

    pub fn update_sample_values(
        &mut self,
        track: TrackId,
        values: &[f32],
    ) -> Result<(), SequencerError> {
        let synth = self.synth.as_mut();
        self.current
            .track_mut(track)?
            .sample_mut()
            .update_values(values, synth)?;
        Ok(())
    }

    pub fn undo_sample(&mut self, track: TrackId) -> Result<bool, SequencerError> {
        let synth = self.synth.as_mut();
        Ok(self.current.track_mut(track)?.sample_mut().undo(synth))
    }

    pub fn redo_sample(&mut self, track: TrackId) -> Result<bool, SequencerError> {
        let synth = self.synth.as_mut();
        Ok(self.current.track_mut(track)?.sample_mut().redo(synth))
    }

    pub fn rename_sample(&mut self, track: TrackId, name: &str) -> Result<(), SequencerError> {
        self.current.track_mut(track)?.sample_mut().set_name(name);
        Ok(())
    }

    // --- sample library ---

    fn save_library(&self) -> Result<PathBuf, ProjectError> {
        self.library.save_for_participant(
            &self.settings.user_data_dir,
            &self.settings.participant_id,
            &self.settings.default_library,
        )
    }

    pub fn add_to_library(&mut self, definition: &SampleDefinition) -> Result<(), ProjectError> {
        self.library.add(definition)?;
        self.save_library()?;
        Ok(())
    }

    pub fn update_library(&mut self, definition: &SampleDefinition) -> Result<(), ProjectError> {
        self.library.update(definition)?;
        self.save_library()?;
        Ok(())
    }

    pub fn remove_from_library(&mut self, name: &str) -> Result<(), ProjectError> {
        if self.library.remove(name).is_none() {
            log::warn!("cannot remove '{name}': not in the sample library");
            return Err(ProjectError::UnknownSample(name.to_string()));
        }
        self.save_library()?;
        Ok(())
    }

    /// Store the sample a track plays in the library, adding or replacing the
    /// entry of the same name.
    pub fn store_track_sample(&mut self, track: TrackId) -> anyhow::Result<()> {
        let definition = self.current.track(track)?.sample().definition().clone();
        if self.library.contains(&definition.name) {
            self.update_library(&definition)?;
        } else {
            self.add_to_library(&definition)?;
        }
        Ok(())
    }

    // --- songs ---

    /// Put a song under the loop and adopt its tempo and signature.
    pub fn select_song(&mut self, name: &str) -> Result<(), SequencerError> {
        self.attach_song(name, true)
    }

    fn attach_song(&mut self, name: &str, adopt_tempo: bool) -> Result<(), SequencerError> {
        let song = self
            .songs
            .by_name(name)
            .cloned()
            .ok_or_else(|| SequencerError::UnknownSong(name.to_string()))?;
        if adopt_tempo {
            self.set_bpm(song.bpm);
            self.set_beats_per_bar(song.beats_per_bar);
            self.set_beat_type(song.beat_type);
        }
        let (lp, mut ctx) = self.context();
        lp.set_song(Some(song), &mut ctx);
        Ok(())
    }

    pub fn set_song_volume(&mut self, volume: f32) {
        self.current.set_song_volume(volume, self.backend.as_mut());
    }

    // --- loops ---

    /// Replace the current loop with a fresh `Loop{n}` of random tracks.
    pub fn load_default_loop(&mut self) {
        self.stop();
        let mut lp = Loop::with_default_name(self.loop_counter, &self.tempo);
        self.loop_counter += 1;
        lp.set_snapping(self.settings.snapping);
        lp.set_metronome_enabled(self.current.metronome().is_enabled(), self.backend.as_mut());

        let now = self.clock.now();
        let mut ctx = PlaybackContext::new(&self.tempo, self.backend.as_mut(), now);
        lp.add_random_tracks(self.settings.initial_track_count, self.synth.as_mut(), &mut ctx);
        log::info!("started new loop '{}'", lp.name());
        self.current = lp;
    }

    /// Write the current loop to the export directory. The loop's version
    /// only advances when the file was written.
    pub fn export_loop(&mut self) -> Result<PathBuf, ProjectError> {
        if self.current.has_default_name() {
            log::warn!("exporting '{}' under its default name", self.current.name());
        }
        let data = self.current.to_export_data(
            &self.tempo,
            &self.settings.participant_id,
            &self.settings.condition_name,
        );
        let path = save_loop(&self.settings.export_dir, &self.current.export_stem(), &data)?;
        self.current.mark_saved();
        if let Some(song) = self.current.song().song_name() {
            self.songs.mark_used(song);
        }
        Ok(path)
    }

    pub fn import_loop(&mut self, path: &Path) -> Result<(), ProjectError> {
        let data = load_loop(path)?;
        self.load_document(&data);
        log::info!("imported loop '{}' from {}", data.loop_name, path.display());
        Ok(())
    }

    /// Rebuild the current loop from an export document.
    pub fn load_document(&mut self, data: &LoopExportData) {
        self.stop();
        let metronome = self.current.metronome().is_enabled();
        self.current = Loop::new(data.loop_name.clone(), data.duration_in_bars, &self.tempo);
        self.current.set_snapping(self.settings.snapping);
        self.current.set_metronome_enabled(metronome, self.backend.as_mut());

        // an advisory import leaves the session bpm alone, even the song's
        let adopt_tempo = self.settings.import_tempo == ImportTempo::FromDocument;
        if let Some(song) = data.song_name.as_deref().filter(|name| !name.is_empty()) {
            match self.attach_song(song, adopt_tempo) {
                Ok(()) => self.set_song_volume(data.song_volume),
                Err(e) => log::warn!("loop '{}' keeps no song: {e}", data.loop_name),
            }
        }

        // after the song, so the document's signature wins
        if self.settings.import_tempo == ImportTempo::FromDocument {
            self.set_bpm(data.bpm);
        }
        self.set_beats_per_bar(data.time_signature_hi);
        self.set_beat_type(data.time_signature_lo);
        if self.settings.import_tempo == ImportTempo::FromDocument {
            self.set_distance_per_beat(data.meters_per_beat);
        }

        let now = self.clock.now();
        let mut ctx = PlaybackContext::new(&self.tempo, self.backend.as_mut(), now);
        for track in &data.tracks {
            let mut sample = Sample::new(track.sample_definition.clone());
            sample.request_clip(self.synth.as_mut());
            self.current.restore_track(track, sample, &mut ctx);
        }
    }

    /// Loops available for loading from the export directory.
    pub fn list_loops(&self) -> Vec<LoopMetadata> {
        list_loops(&[&self.settings.export_dir])
    }
}

/// The participant's own library when one was saved before, the default
/// library otherwise.
fn load_sample_library(settings: &SessionSettings) -> SampleLibrary {
    let own = participant_library_path(&settings.user_data_dir, &settings.participant_id);
    if own.exists() {
        SampleLibrary::load_or_default(&own)
    } else {
        SampleLibrary::load_or_default(&settings.default_library)
    }
}
