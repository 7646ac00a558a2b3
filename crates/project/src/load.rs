use crate::{LoopExportData, ProjectError};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LoopMetadata {
    pub path: PathBuf,
    pub name: String,
    pub bpm: f64,
    pub duration_in_bars: u32,
    pub track_count: usize,
    pub note_count: usize,
}

pub fn load_loop(path: &Path) -> Result<LoopExportData, ProjectError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader)?;
    Ok(data)
}

pub fn load_loop_metadata(path: &Path) -> Result<LoopMetadata, ProjectError> {
    let data = load_loop(path)?;

    Ok(LoopMetadata {
        path: path.to_path_buf(),
        note_count: data.note_count(),
        name: data.loop_name,
        bpm: data.bpm,
        duration_in_bars: data.duration_in_bars,
        track_count: data.tracks.len(),
    })
}

/// Metadata for every loop file in `dirs`, sorted by path.
///
/// Missing directories are skipped. Files that do not parse as a loop are
/// logged and left out of the listing.
pub fn list_loops<P: AsRef<Path>>(dirs: &[P]) -> Vec<LoopMetadata> {
    let mut loops = Vec::new();

    for dir in dirs {
        let dir = dir.as_ref();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_loop_metadata(&path) {
                Ok(metadata) => loops.push(metadata),
                Err(e) => log::warn!("skipping {}: {e}", path.display()),
            }
        }
    }

    loops.sort_by(|a, b| a.path.cmp(&b.path));
    loops
}
