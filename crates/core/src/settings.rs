use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which tempo fields of an imported loop are applied to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTempo {
    /// Only the time signature. Bpm and distance per beat stay as the
    /// session has them.
    #[default]
    Advisory,
    /// Bpm, time signature and distance per beat.
    FromDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub participant_id: String,
    pub condition_name: String,
    /// Where exported loops are written and listed from.
    pub export_dir: PathBuf,
    /// Holds the participant's own sample library.
    pub user_data_dir: PathBuf,
    /// Read-only library every participant starts from.
    pub default_library: PathBuf,
    pub songs_dir: PathBuf,
    pub initial_track_count: usize,
    pub import_tempo: ImportTempo,
    pub snapping: bool,
    /// Whether the first loop clicks. Later loops take over the last one's
    /// setting.
    pub metronome: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            participant_id: "P00".to_string(),
            condition_name: String::new(),
            export_dir: PathBuf::from("loops"),
            user_data_dir: PathBuf::from("userdata"),
            default_library: PathBuf::from("samples/sampleLibrary.json"),
            songs_dir: PathBuf::from("songs"),
            initial_track_count: 2,
            import_tempo: ImportTempo::Advisory,
            snapping: true,
            metronome: false,
        }
    }
}
