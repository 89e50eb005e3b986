use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::response::ParsedProject;
use crate::workspace::EditOverrides;

pub const KEY_SAVED_OVERRIDES: &str = "workspace.savedOverrides";
pub const KEY_LAST_GENERATION_RAW: &str = "workspace.lastGenerationRaw";
pub const KEY_LAST_PARSED: &str = "workspace.lastParsed";
pub const KEY_LAST_PROMPT: &str = "workspace.lastPrompt";

pub const PERSISTED_KEYS: [&str; 4] = [
    KEY_SAVED_OVERRIDES,
    KEY_LAST_GENERATION_RAW,
    KEY_LAST_PARSED,
    KEY_LAST_PROMPT,
];

pub const PERSISTENCE_SCHEMA_V1: u8 = 1;

/// Durable key/value storage for workspace state.
///
/// Values are opaque text. Implementations must make a completed `set`
/// visible to the next `get`, including across process restarts where the
/// backing store allows it.
pub trait PersistenceLayer: fmt::Debug + Send {
    fn get(&self, key: &str) -> std::io::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()>;
    fn clear(&mut self, key: &str) -> std::io::Result<()>;

    fn clear_all(&mut self) -> std::io::Result<()> {
        for key in PERSISTED_KEYS {
            self.clear(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    entries: BTreeMap<String, String>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceLayer for MemoryPersistence {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> std::io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory, written owner-only.
#[derive(Debug)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> std::io::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid persistence key {key:?}"),
            ));
        }
        Ok(self.dir.join(key))
    }
}

impl PersistenceLayer for FilePersistence {
    fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        let path = self.key_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        let path = self.key_path(key)?;
        let staging = self.dir.join(format!(".{key}.tmp"));
        write_private(&staging, value)?;
        std::fs::rename(&staging, &path)
    }

    fn clear(&mut self, key: &str) -> std::io::Result<()> {
        let path = self.key_path(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(value.as_bytes())?;
    file.flush()?;
    file.sync_all()
}

/// Local edit state saved after every mutation.
///
/// `removed` lists generated files deleted since the last load, `edited`
/// mirrors the store's state and `generation` is the counter at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedOverrides {
    pub version: u8,
    pub entries: EditOverrides,
    #[serde(default)]
    pub removed: BTreeSet<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub generation: u64,
}

impl SavedOverrides {
    pub fn new(entries: EditOverrides) -> Self {
        Self {
            version: PERSISTENCE_SCHEMA_V1,
            entries,
            removed: BTreeSet::new(),
            edited: false,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGeneration {
    pub version: u8,
    pub generation: u64,
    pub saved_at_ms: i64,
    pub project: ParsedProject,
}

pub fn save_overrides(
    layer: &mut dyn PersistenceLayer,
    record: &SavedOverrides,
) -> std::io::Result<()> {
    let encoded = serde_json::to_string(record)
        .map_err(|err| std::io::Error::other(format!("serialize overrides: {err}")))?;
    layer.set(KEY_SAVED_OVERRIDES, &encoded)
}

pub fn load_overrides(layer: &dyn PersistenceLayer) -> std::io::Result<Option<SavedOverrides>> {
    let Some(encoded) = layer.get(KEY_SAVED_OVERRIDES)? else {
        return Ok(None);
    };
    let record = serde_json::from_str::<SavedOverrides>(&encoded)
        .map_err(|err| std::io::Error::other(format!("parse overrides: {err}")))?;
    check_version(record.version, KEY_SAVED_OVERRIDES)?;
    Ok(Some(record))
}

pub fn save_generation(
    layer: &mut dyn PersistenceLayer,
    generation: u64,
    project: &ParsedProject,
) -> std::io::Result<()> {
    let record = SavedGeneration {
        version: PERSISTENCE_SCHEMA_V1,
        generation,
        saved_at_ms: chrono::Utc::now().timestamp_millis(),
        project: project.clone(),
    };
    let encoded = serde_json::to_string(&record)
        .map_err(|err| std::io::Error::other(format!("serialize generation: {err}")))?;
    layer.set(KEY_LAST_PARSED, &encoded)
}

pub fn load_generation(layer: &dyn PersistenceLayer) -> std::io::Result<Option<SavedGeneration>> {
    let Some(encoded) = layer.get(KEY_LAST_PARSED)? else {
        return Ok(None);
    };
    let record = serde_json::from_str::<SavedGeneration>(&encoded)
        .map_err(|err| std::io::Error::other(format!("parse generation: {err}")))?;
    check_version(record.version, KEY_LAST_PARSED)?;
    Ok(Some(record))
}

/// Records the prompt and raw response that produced the current generation.
pub fn save_source(
    layer: &mut dyn PersistenceLayer,
    prompt: &str,
    raw: &str,
) -> std::io::Result<()> {
    layer.set(KEY_LAST_PROMPT, prompt)?;
    layer.set(KEY_LAST_GENERATION_RAW, raw)
}

pub fn load_last_prompt(layer: &dyn PersistenceLayer) -> std::io::Result<Option<String>> {
    layer.get(KEY_LAST_PROMPT)
}

pub fn load_last_raw(layer: &dyn PersistenceLayer) -> std::io::Result<Option<String>> {
    layer.get(KEY_LAST_GENERATION_RAW)
}

fn check_version(version: u8, key: &str) -> std::io::Result<()> {
    if version == PERSISTENCE_SCHEMA_V1 {
        return Ok(());
    }
    Err(std::io::Error::other(format!(
        "unsupported {key} schema version {version}"
    )))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn project() -> ParsedProject {
        ParsedProject {
            project_title: "Todo".to_string(),
            explanation: "Here you go.".to_string(),
            summary: "A todo list".to_string(),
            files: BTreeMap::from([("App.js".to_string(), "A".to_string())]),
            generated_files: vec!["App.js".to_string()],
        }
    }

    #[test]
    fn file_persistence_survives_reopen() {
        let dir = tempdir().expect("tmpdir");
        let mut layer = FilePersistence::open(dir.path().join("state")).expect("open");
        layer.set(KEY_LAST_PROMPT, "a todo app").expect("set");

        let reopened = FilePersistence::open(dir.path().join("state")).expect("reopen");
        assert_eq!(
            reopened.get(KEY_LAST_PROMPT).expect("get").as_deref(),
            Some("a todo app")
        );
        assert_eq!(reopened.get(KEY_LAST_PARSED).expect("get"), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_persistence_writes_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tmpdir");
        let mut layer = FilePersistence::open(dir.path()).expect("open");
        layer.set(KEY_SAVED_OVERRIDES, "{}").expect("set");

        let mode = std::fs::metadata(dir.path().join(KEY_SAVED_OVERRIDES))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn clear_all_removes_every_key_and_tolerates_missing_files() {
        let dir = tempdir().expect("tmpdir");
        let mut layer = FilePersistence::open(dir.path()).expect("open");
        layer.set(KEY_LAST_PROMPT, "p").expect("set");
        layer.set(KEY_LAST_GENERATION_RAW, "r").expect("set");

        layer.clear_all().expect("clear all");
        for key in PERSISTED_KEYS {
            assert_eq!(layer.get(key).expect("get"), None);
        }
    }

    #[test]
    fn rejects_keys_that_escape_the_directory() {
        let dir = tempdir().expect("tmpdir");
        let mut layer = FilePersistence::open(dir.path()).expect("open");
        let err = layer.set("../outside", "x").expect_err("must reject");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn records_round_trip_through_a_layer() {
        let mut layer = MemoryPersistence::new();
        let overrides: EditOverrides =
            [("App.js".to_string(), "edited".to_string())].into_iter().collect();

        let record = SavedOverrides {
            removed: BTreeSet::from(["Old.js".to_string()]),
            edited: true,
            generation: 3,
            ..SavedOverrides::new(overrides)
        };

        save_overrides(&mut layer, &record).expect("save overrides");
        save_generation(&mut layer, 3, &project()).expect("save generation");
        save_source(&mut layer, "prompt", "raw").expect("save source");

        assert_eq!(load_overrides(&layer).expect("load"), Some(record));
        let saved = load_generation(&layer).expect("load").expect("present");
        assert_eq!(saved.generation, 3);
        assert_eq!(saved.project, project());
        assert!(saved.saved_at_ms > 0);
        assert_eq!(load_last_prompt(&layer).expect("load").as_deref(), Some("prompt"));
        assert_eq!(load_last_raw(&layer).expect("load").as_deref(), Some("raw"));
    }

    #[test]
    fn unknown_schema_version_is_an_error() {
        let mut layer = MemoryPersistence::new();
        layer
            .set(KEY_SAVED_OVERRIDES, r#"{"version":9,"entries":{}}"#)
            .expect("set");
        assert!(load_overrides(&layer).is_err());

        layer
            .set(KEY_SAVED_OVERRIDES, r#"{"version":1,"entries":{"App.js":"x"}}"#)
            .expect("set");
        let older = load_overrides(&layer).expect("load").expect("present");
        assert_eq!(older.entries.get("App.js"), Some("x"));
        assert!(!older.edited);
        assert_eq!(older.generation, 0);

        layer.set(KEY_LAST_PARSED, "not json").expect("set");
        assert!(load_generation(&layer).is_err());
    }
}
