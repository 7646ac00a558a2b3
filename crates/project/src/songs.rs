use crate::ProjectError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file listing the background songs in a songs directory.
pub const SONG_MANIFEST_FILE: &str = "songs.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongManifestEntry {
    pub name: String,
    /// Audio file, relative to the songs directory.
    pub file: PathBuf,
    #[serde(default)]
    pub genre: String,
    pub bpm: f64,
    pub beat_signature_hi: u32,
    pub beat_signature_lo: u32,
    pub duration_in_bars: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongManifest {
    pub songs: Vec<SongManifestEntry>,
}

/// Read `{dir}/songs.json`.
pub fn load_song_manifest(dir: &Path) -> Result<SongManifest, ProjectError> {
    let contents = fs::read_to_string(dir.join(SONG_MANIFEST_FILE))?;
    Ok(serde_json::from_str(&contents)?)
}
