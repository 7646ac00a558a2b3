use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;
use spaceloop_project::{SongManifestEntry, load_song_manifest};
use spaceloop_transport::{AudioArc, Bus, PlaybackBackend, VoiceKey};

use crate::context::PlaybackContext;
use crate::track::TRIGGER_GUARD;

/// A background song a loop can be built on top of, with the tempo and
/// signature it was recorded in.
#[derive(Debug, Clone)]
pub struct Song {
    pub name: String,
    pub genre: String,
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub beat_type: u32,
    pub duration_in_bars: u32,
    pub audio: AudioArc,
}

impl Song {
    pub fn from_entry(entry: &SongManifestEntry, audio: AudioArc) -> Self {
        Self {
            name: entry.name.clone(),
            genre: entry.genre.clone(),
            bpm: entry.bpm,
            beats_per_bar: entry.beat_signature_hi,
            beat_type: entry.beat_signature_lo,
            duration_in_bars: entry.duration_in_bars,
            audio,
        }
    }
}

/// Every song listed in a songs directory's manifest, decoded up front.
#[derive(Debug, Default)]
pub struct SongLibrary {
    songs: Vec<Song>,
    used: HashSet<String>,
}

impl SongLibrary {
    pub fn new(songs: Vec<Song>) -> Self {
        Self {
            songs,
            used: HashSet::new(),
        }
    }

    /// Decode every manifest entry in `songs_dir` at `sample_rate`. Songs
    /// that fail to decode are skipped; a missing manifest yields an empty
    /// library.
    pub fn load(songs_dir: &Path, sample_rate: u32) -> Self {
        let manifest = match load_song_manifest(songs_dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                log::warn!("no songs loaded from {}: {e}", songs_dir.display());
                return Self::default();
            }
        };

        let decoded: Vec<_> = manifest
            .songs
            .par_iter()
            .map(|entry| {
                let audio = spaceloop_decode::decode_song(&entry.file, songs_dir)
                    .and_then(|audio| audio.resample(sample_rate));
                (entry, audio)
            })
            .collect();

        let mut songs = Vec::with_capacity(decoded.len());
        for (entry, audio) in decoded {
            match audio {
                Ok(audio) => songs.push(Song::from_entry(entry, audio)),
                Err(e) => log::warn!("skipping song '{}': {e:#}", entry.name),
            }
        }
        log::info!("loaded {} songs from {}", songs.len(), songs_dir.display());
        Self::new(songs)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&Song> {
        self.songs.iter().find(|song| song.name == name)
    }

    /// Songs not yet marked as used.
    pub fn available(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter().filter(|song| !self.used.contains(&song.name))
    }

    /// Hide a song from [`SongLibrary::available`]. It stays reachable by name
    /// so saved loops that reference it still import.
    pub fn mark_used(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }
}

pub const DEFAULT_SONG_VOLUME: f32 = 1.0;

/// The loop's background song. Plays from loop start and repeats at the end
/// of its own audio, independent of the loop length.
#[derive(Debug)]
pub struct SongTrack {
    song: Option<Song>,
    volume: f32,
    playing: bool,
    trigger_time: Option<f64>,
}

impl Default for SongTrack {
    fn default() -> Self {
        Self {
            song: None,
            volume: DEFAULT_SONG_VOLUME,
            playing: false,
            trigger_time: None,
        }
    }
}

impl SongTrack {
    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn song_name(&self) -> Option<&str> {
        self.song.as_ref().map(|song| song.name.as_str())
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_volume(&mut self, volume: f32, backend: &mut dyn PlaybackBackend) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        backend.set_bus_gain(Bus::Song, self.volume);
    }

    /// Swap the song. A playing track restarts with the new audio.
    pub fn set_song(&mut self, song: Option<Song>, ctx: &mut PlaybackContext<'_>) {
        let was_playing = self.playing;
        self.stop(ctx);
        self.song = song;
        if was_playing {
            self.play(ctx);
        }
    }

    pub fn play(&mut self, ctx: &mut PlaybackContext<'_>) {
        let Some(song) = &self.song else {
            return;
        };
        self.playing = true;
        ctx.backend.set_bus_gain(Bus::Song, self.volume);
        ctx.backend.set_bus_audible(Bus::Song, true);
        ctx.backend.schedule(VoiceKey::Song, ctx.now, &song.audio);
        self.trigger_time = Some(ctx.now);
        log::debug!("song '{}' playing at {:.3}s", song.name, ctx.now);
    }

    pub fn stop(&mut self, ctx: &mut PlaybackContext<'_>) {
        if !self.playing {
            return;
        }
        self.playing = false;
        self.trigger_time = None;
        ctx.backend.cancel(VoiceKey::Song);
    }

    /// Arm the next repetition once the current one is safely underway.
    pub fn tick(&mut self, ctx: &mut PlaybackContext<'_>) {
        let (Some(song), Some(trigger)) = (&self.song, self.trigger_time) else {
            return;
        };
        let duration = song.audio.duration_secs();
        if !self.playing || duration <= 0.0 || ctx.now < trigger + TRIGGER_GUARD {
            return;
        }
        let next = (trigger + duration).max(ctx.now);
        ctx.backend.schedule(VoiceKey::Song, next, &song.audio);
        self.trigger_time = Some(next);
    }
}
