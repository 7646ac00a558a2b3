mod library;
mod load;
mod save;
mod songs;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use spaceloop_transport::SampleDefinition;
use std::path::PathBuf;

pub use library::{SampleLibrary, participant_library_path};
pub use load::{LoopMetadata, list_loops, load_loop, load_loop_metadata};
pub use save::{duplicate_safe_path, save_loop};
pub use songs::{SONG_MANIFEST_FILE, SongManifest, SongManifestEntry, load_song_manifest};

/// Time-independent snapshot of one loop, one per file.
///
/// Note positions are stored as a fraction of the loop duration
/// (`posOnTrackAxis`), which is what makes a loop portable across tempi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopExportData {
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub condition_name: String,
    pub loop_name: String,
    pub export_date: DateTime<Local>,
    pub bpm: f64,
    pub time_signature_hi: u32,
    pub time_signature_lo: u32,
    pub meters_per_beat: f64,
    pub duration_in_bars: u32,
    #[serde(default)]
    pub song_name: Option<String>,
    #[serde(default)]
    pub song_volume: f32,
    pub tracks: Vec<TrackExportData>,
}

impl LoopExportData {
    /// Loop duration at the tempo stored in the document.
    pub fn duration_secs(&self) -> f64 {
        if self.bpm <= 0.0 || self.time_signature_lo == 0 {
            return 0.0;
        }
        let seconds_per_beat = 60.0 / self.bpm * (4.0 / self.time_signature_lo as f64);
        seconds_per_beat * self.time_signature_hi as f64 * self.duration_in_bars as f64
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExportData {
    pub track_name: String,
    pub color: TrackColor,
    pub sample_definition: SampleDefinition,
    pub track_volume: f32,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_solo: bool,
    #[serde(default)]
    pub another_is_solo: bool,
    #[serde(default)]
    pub notes: Vec<NoteExportData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteExportData {
    /// Seconds from loop start at export time. Kept for older readers.
    pub trigger_time: f64,
    /// Position as a fraction of the loop duration, in `[0, 1)`.
    pub pos_on_track_axis: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub silent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl TrackColor {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sample definition '{0}' already in library")]
    DuplicateSample(String),

    #[error("sample definition '{0}' not found in library")]
    UnknownSample(String),

    #[error("refusing to overwrite the default sample library at '{0}'")]
    DefaultLibraryTarget(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_loop() -> LoopExportData {
        LoopExportData {
            participant_id: "P07".to_string(),
            condition_name: "spatial".to_string(),
            loop_name: "Groove".to_string(),
            export_date: Local::now(),
            bpm: 60.0,
            time_signature_hi: 4,
            time_signature_lo: 4,
            meters_per_beat: 0.2,
            duration_in_bars: 2,
            song_name: None,
            song_volume: 0.0,
            tracks: vec![TrackExportData {
                track_name: "Track 0".to_string(),
                color: TrackColor::new(0.9, 0.3, 0.2),
                sample_definition: SampleDefinition::with_default_vector("Random 0"),
                track_volume: 0.5,
                is_muted: false,
                is_solo: false,
                another_is_solo: false,
                notes: vec![
                    NoteExportData {
                        trigger_time: 0.0,
                        pos_on_track_axis: 0.0,
                        silent: false,
                    },
                    NoteExportData {
                        trigger_time: 2.0,
                        pos_on_track_axis: 0.25,
                        silent: true,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_export_field_names() {
        let json = serde_json::to_value(sample_loop()).expect("serialize");

        for key in [
            "participantId",
            "conditionName",
            "loopName",
            "exportDate",
            "bpm",
            "timeSignatureHi",
            "timeSignatureLo",
            "metersPerBeat",
            "durationInBars",
            "songName",
            "songVolume",
            "tracks",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }

        let track = &json["tracks"][0];
        for key in [
            "trackName",
            "color",
            "sampleDefinition",
            "trackVolume",
            "isMuted",
            "isSolo",
            "anotherIsSolo",
            "notes",
        ] {
            assert!(track.get(key).is_some(), "missing {key}");
        }
        assert_eq!(track["sampleDefinition"]["vectorValues"].as_array().map(|v| v.len()), Some(100));
    }

    #[test]
    fn test_silent_flag_only_written_when_set() {
        let json = serde_json::to_value(sample_loop()).expect("serialize");
        let notes = &json["tracks"][0]["notes"];
        assert!(notes[0].get("silent").is_none());
        assert_eq!(notes[1]["silent"], true);
        assert_eq!(notes[1]["posOnTrackAxis"], 0.25);
    }

    #[test]
    fn test_reads_document_without_optional_fields() {
        let mut json = serde_json::to_value(sample_loop()).expect("serialize");
        let object = json.as_object_mut().expect("object");
        object.remove("songName");
        object.remove("songVolume");
        object.remove("participantId");

        let decoded: LoopExportData = serde_json::from_value(json).expect("deserialize");
        assert_eq!(decoded.song_name, None);
        assert_eq!(decoded.participant_id, "");
        assert!(!decoded.tracks[0].notes[0].silent);
    }

    #[test]
    fn test_duration_from_document_tempo() {
        let data = sample_loop();
        assert!((data.duration_secs() - 8.0).abs() < 1e-12);
        assert_eq!(data.note_count(), 2);
    }
}
