use crate::ProjectError;
use serde::{Deserialize, Serialize};
use spaceloop_transport::SampleDefinition;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Named sample definitions available for new tracks.
///
/// Definitions are copied in and out, so edits to a track's sample only reach
/// the library through an explicit [`SampleLibrary::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SampleLibrary {
    definitions: BTreeMap<String, SampleDefinition>,
}

/// On-disk shapes: a plain name map, or the older wrapped form.
#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Wrapped {
        #[serde(rename = "sampleDefinitions", alias = "_sampleDefinitions")]
        definitions: BTreeMap<String, SampleDefinition>,
    },
    Flat(BTreeMap<String, SampleDefinition>),
}

impl<'de> Deserialize<'de> for SampleLibrary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let definitions = match LibraryFile::deserialize(deserializer)? {
            LibraryFile::Wrapped { definitions } | LibraryFile::Flat(definitions) => definitions,
        };
        Ok(Self { definitions })
    }
}

/// `{user_dir}/{participant}_sampleLibrary.json`
pub fn participant_library_path(user_dir: &Path, participant_id: &str) -> PathBuf {
    user_dir.join(format!("{participant_id}_sampleLibrary.json"))
}

impl SampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &SampleDefinition> {
        self.definitions.values()
    }

    pub fn get(&self, name: &str) -> Option<&SampleDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn add(&mut self, definition: &SampleDefinition) -> Result<(), ProjectError> {
        if self.contains(&definition.name) {
            log::warn!("sample definition '{}' already in library", definition.name);
            return Err(ProjectError::DuplicateSample(definition.name.clone()));
        }
        self.definitions
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    /// Copy the values of `definition` onto the stored entry of the same name.
    pub fn update(&mut self, definition: &SampleDefinition) -> Result<(), ProjectError> {
        let Some(stored) = self.definitions.get_mut(&definition.name) else {
            log::warn!("sample definition '{}' not in library", definition.name);
            return Err(ProjectError::UnknownSample(definition.name.clone()));
        };
        // lengths always match: both sides hold a full vector
        if let Err(e) = stored.update_values(definition.vector_values()) {
            log::warn!("could not update '{}': {e}", definition.name);
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<SampleDefinition> {
        self.definitions.remove(name)
    }

    /// An independent copy of the stored definition.
    pub fn new_instance(&self, name: &str) -> Result<SampleDefinition, ProjectError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectError::UnknownSample(name.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load the library at `path`, falling back to an empty library when the
    /// file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(library) => {
                log::info!(
                    "loaded {} sample definitions from {}",
                    library.len(),
                    path.display()
                );
                library
            }
            Err(e) => {
                log::warn!(
                    "could not load sample library {}: {e}, starting empty",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Write the library to the participant's own file, replacing the previous
    /// save. Never writes to `default_path`.
    pub fn save_for_participant(
        &self,
        user_dir: &Path,
        participant_id: &str,
        default_path: &Path,
    ) -> Result<PathBuf, ProjectError> {
        let path = participant_library_path(user_dir, participant_id);
        if same_file(&path, default_path) {
            return Err(ProjectError::DefaultLibraryTarget(path));
        }

        fs::create_dir_all(user_dir)?;
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;

        log::debug!("saved sample library to {}", path.display());
        Ok(path)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaceloop_transport::NR_OF_VECTOR_VALUES;
    use tempfile::tempdir;

    fn definition(name: &str, value: f32) -> SampleDefinition {
        SampleDefinition::new(vec![value; NR_OF_VECTOR_VALUES], name)
    }

    #[test]
    fn test_add_rejects_duplicate_name() {
        let mut library = SampleLibrary::new();
        library.add(&definition("kick", 0.1)).unwrap();

        let err = library.add(&definition("kick", 0.9)).unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateSample(name) if name == "kick"));
        assert_eq!(library.get("kick").unwrap().vector_values()[0], 0.1);
    }

    #[test]
    fn test_update_unknown_name() {
        let mut library = SampleLibrary::new();
        let err = library.update(&definition("snare", 0.3)).unwrap_err();
        assert!(matches!(err, ProjectError::UnknownSample(_)));
        assert!(library.is_empty());
    }

    #[test]
    fn test_update_copies_values() {
        let mut library = SampleLibrary::new();
        library.add(&definition("kick", 0.1)).unwrap();
        library.update(&definition("kick", 0.7)).unwrap();
        assert!(library.get("kick").unwrap().vector_values().iter().all(|v| *v == 0.7));
    }

    #[test]
    fn test_new_instance_is_independent() {
        let mut library = SampleLibrary::new();
        library.add(&definition("kick", 0.1)).unwrap();

        let mut copy = library.new_instance("kick").unwrap();
        copy.update_value(0, 0.8).unwrap();

        assert_eq!(library.get("kick").unwrap().vector_values()[0], 0.1);
        assert!(library.new_instance("missing").is_err());
    }

    #[test]
    fn test_remove() {
        let mut library = SampleLibrary::new();
        library.add(&definition("kick", 0.1)).unwrap();
        assert!(library.remove("kick").is_some());
        assert!(!library.contains("kick"));
        assert!(library.remove("kick").is_none());
    }

    #[test]
    fn test_load_or_default_on_missing_and_malformed() {
        let dir = tempdir().expect("tempdir");
        assert!(SampleLibrary::load_or_default(&dir.path().join("none.json")).is_empty());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "not json").unwrap();
        assert!(SampleLibrary::load_or_default(&broken).is_empty());
    }

    #[test]
    fn test_reads_wrapped_legacy_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("sampleLibrary.json");
        let wrapped = serde_json::json!({
            "_sampleDefinitions": {
                "kick": definition("kick", 0.2),
            }
        });
        std::fs::write(&path, wrapped.to_string()).unwrap();

        let library = SampleLibrary::load(&path).unwrap();
        assert!(library.contains("kick"));
    }

    #[test]
    fn test_save_for_participant_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let default_path = dir.path().join("sampleLibrary.json");
        let user_dir = dir.path().join("users");

        let mut library = SampleLibrary::new();
        library.add(&definition("kick", 0.2)).unwrap();
        library.add(&definition("hat", 0.6)).unwrap();

        let path = library
            .save_for_participant(&user_dir, "P07", &default_path)
            .unwrap();
        assert_eq!(path, user_dir.join("P07_sampleLibrary.json"));
        assert!(!default_path.exists());

        library.remove("hat");
        library.save_for_participant(&user_dir, "P07", &default_path).unwrap();

        let loaded = SampleLibrary::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("kick"));
    }

    #[test]
    fn test_save_refuses_default_path() {
        let dir = tempdir().expect("tempdir");
        let default_path = participant_library_path(dir.path(), "P07");
        std::fs::write(&default_path, "{}").unwrap();

        let library = SampleLibrary::new();
        let err = library
            .save_for_participant(dir.path(), "P07", &default_path)
            .unwrap_err();
        assert!(matches!(err, ProjectError::DefaultLibraryTarget(_)));
        assert_eq!(std::fs::read_to_string(&default_path).unwrap(), "{}");
    }
}
