use crate::{LoopExportData, ProjectError};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// First free path for `{stem}.{extension}` in `dir`. On collision `_v{n}` is
/// appended with the smallest unused `n`, starting at 1.
pub fn duplicate_safe_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let mut path = dir.join(format!("{stem}.{extension}"));
    let mut counter = 0u32;
    while path.exists() {
        counter += 1;
        path = dir.join(format!("{stem}_v{counter}.{extension}"));
    }
    path
}

/// Write `data` as pretty JSON into `dir` without overwriting an existing
/// export. Returns the path that was written.
pub fn save_loop(dir: &Path, stem: &str, data: &LoopExportData) -> Result<PathBuf, ProjectError> {
    fs::create_dir_all(dir)?;
    let path = duplicate_safe_path(dir, stem, "json");

    let file = File::create(&path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, data)?;

    log::info!("exported loop '{}' to {}", data.loop_name, path.display());
    Ok(path)
}
