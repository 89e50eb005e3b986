use std::collections::BTreeSet;

use crate::error::WorkspaceError;
use crate::merge::merge;
use crate::path::normalize_path;
use crate::path::PathError;
use crate::persistence::load_generation;
use crate::persistence::load_last_raw;
use crate::persistence::load_overrides;
use crate::persistence::save_generation;
use crate::persistence::save_overrides;
use crate::persistence::save_source;
use crate::persistence::PersistenceLayer;
use crate::persistence::SavedOverrides;
use crate::response::parse;
use crate::response::ParsedProject;
use crate::workspace::EditOverrides;
use crate::workspace::Origin;
use crate::workspace::ProjectFile;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Empty,
    Loaded,
    Edited,
}

impl WorkspaceState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Edited => "edited",
        }
    }
}

/// What a successful [`WorkspaceStore::load`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub generation: u64,
    pub loaded: usize,
    pub rejected: Vec<PathError>,
    pub reapplied: Vec<String>,
    pub pruned: Vec<String>,
    /// Set when the in-memory load succeeded but could not be persisted.
    pub save_error: Option<String>,
}

/// Owns the workspace, the pending edit overrides and their persistence.
///
/// `revision` moves on every mutation, including edits. It is what the sync
/// gate compares to decide whether a deferred sync must be recomputed.
#[derive(Debug)]
pub struct WorkspaceStore {
    workspace: Workspace,
    overrides: EditOverrides,
    removed: BTreeSet<String>,
    state: WorkspaceState,
    revision: u64,
    persistence: Box<dyn PersistenceLayer>,
}

impl WorkspaceStore {
    pub fn new(persistence: Box<dyn PersistenceLayer>) -> Self {
        Self {
            workspace: Workspace::default(),
            overrides: EditOverrides::default(),
            removed: BTreeSet::new(),
            state: WorkspaceState::Empty,
            revision: 0,
            persistence,
        }
    }

    /// Rebuilds the store from whatever the persistence layer holds.
    ///
    /// The saved parsed project is preferred. When it is missing or unreadable
    /// the raw response is parsed again. Unreadable records are skipped with a
    /// warning and never fail the restore.
    pub fn restore(persistence: Box<dyn PersistenceLayer>) -> Self {
        let mut store = Self::new(persistence);

        let saved = match load_overrides(store.persistence.as_ref()) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable saved overrides");
                None
            }
        }
        .unwrap_or_else(|| SavedOverrides::new(EditOverrides::default()));
        let overrides = saved.entries;

        let Some((generation, project)) = store.restore_generation(saved.generation) else {
            for (path, content) in overrides.iter() {
                store
                    .workspace
                    .insert(path.to_string(), content.to_string(), Origin::UserEdited);
            }
            if !overrides.is_empty() {
                store.state = WorkspaceState::Edited;
                store.revision = 1;
            }
            store.overrides = overrides;
            return store;
        };

        let (incoming, rejected) = Workspace::from_parsed(&project);
        for err in &rejected {
            tracing::warn!(error = %err, "skipping saved file");
        }
        let outcome = merge(incoming, &overrides);
        store.workspace = outcome.workspace;
        store.workspace.generation = generation;
        store.overrides = outcome.overrides;
        store.removed = saved.removed;
        store
            .removed
            .retain(|path| store.workspace.remove(path).is_some());
        store.state = if saved.edited {
            WorkspaceState::Edited
        } else {
            WorkspaceState::Loaded
        };
        store.revision = 1;

        if !outcome.pruned.is_empty() {
            if let Err(err) = store.save_edits() {
                tracing::warn!(error = %err, "failed to save pruned overrides");
            }
        }
        tracing::info!(
            generation,
            files = store.workspace.len(),
            overrides = store.overrides.len(),
            "restored workspace"
        );
        store
    }

    /// `counter` is the generation saved with the edit record. It stands in
    /// when only the raw response survives.
    fn restore_generation(&self, counter: u64) -> Option<(u64, ParsedProject)> {
        match load_generation(self.persistence.as_ref()) {
            Ok(Some(saved)) => return Some((saved.generation, saved.project)),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "ignoring unreadable saved generation"),
        }

        let raw = match load_last_raw(self.persistence.as_ref()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable saved response");
                return None;
            }
        };
        match parse(&raw) {
            Ok(project) => Some((counter.max(1), project)),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring saved response that no longer parses");
                None
            }
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn overrides(&self) -> &EditOverrides {
        &self.overrides
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn generation(&self) -> u64 {
        self.workspace.generation
    }

    /// Commits a parsed response, routed through the merge policy.
    ///
    /// Files with invalid paths are skipped and listed in the report. The
    /// generation counter only moves here.
    pub fn load(&mut self, parsed: &ParsedProject) -> LoadReport {
        let (incoming, rejected) = Workspace::from_parsed(parsed);
        for err in &rejected {
            tracing::warn!(error = %err, "skipping generated file");
        }

        let outcome = merge(incoming, &self.overrides);
        let generation = self.workspace.generation.saturating_add(1);
        self.workspace = outcome.workspace;
        self.workspace.generation = generation;
        self.overrides = outcome.overrides;
        self.removed.clear();
        self.state = WorkspaceState::Loaded;
        self.revision = self.revision.saturating_add(1);

        let mut save_error = None;
        let saved = save_generation(self.persistence.as_mut(), generation, parsed)
            .and_then(|()| self.save_edits());
        if let Err(err) = saved {
            tracing::warn!(error = %err, generation, "failed to persist generation");
            save_error = Some(err.to_string());
        }

        tracing::info!(
            generation,
            files = self.workspace.len(),
            rejected = rejected.len(),
            reapplied = outcome.reapplied.len(),
            pruned = outcome.pruned.len(),
            "loaded generation"
        );

        LoadReport {
            generation,
            loaded: self.workspace.len(),
            rejected,
            reapplied: outcome.reapplied,
            pruned: outcome.pruned,
            save_error,
        }
    }

    pub fn record_source(&mut self, prompt: &str, raw: &str) -> Result<(), WorkspaceError> {
        save_source(self.persistence.as_mut(), prompt, raw)?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ProjectFile> {
        self.workspace.get(path)
    }

    pub fn list(&self) -> Vec<&ProjectFile> {
        self.workspace.iter_sorted().collect()
    }

    /// Writes a file and records it as a user override.
    ///
    /// The in-memory edit always lands. A persistence failure is returned
    /// afterwards so the caller can surface it.
    pub fn set(&mut self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let path = normalize_path(path)?;
        match self.workspace.file_mut(&path) {
            Some(file) => {
                file.content = content.to_string();
                file.origin = Origin::UserEdited;
            }
            None => {
                self.workspace
                    .insert(path.clone(), content.to_string(), Origin::UserEdited);
            }
        }
        self.overrides.capture(&path, content);
        self.removed.remove(&path);
        self.state = WorkspaceState::Edited;
        self.revision = self.revision.saturating_add(1);
        tracing::debug!(path = %path, bytes = content.len(), "edited file");

        self.save_edits()?;
        Ok(())
    }

    /// Removes a file. Returns whether it existed.
    pub fn remove(&mut self, path: &str) -> Result<bool, WorkspaceError> {
        let path = normalize_path(path)?;
        let removed = self.workspace.remove(&path).is_some();
        let released = self.overrides.release(&path).is_some();
        if !removed && !released {
            return Ok(false);
        }
        if removed {
            self.removed.insert(path.clone());
        }

        self.state = WorkspaceState::Edited;
        self.revision = self.revision.saturating_add(1);
        tracing::debug!(path = %path, "removed file");

        self.save_edits()?;
        Ok(removed)
    }

    /// Drops the workspace and every persisted key.
    pub fn reset(&mut self) -> Result<(), WorkspaceError> {
        let generation = self.workspace.generation;
        self.workspace = Workspace::default();
        self.workspace.generation = generation;
        self.overrides = EditOverrides::default();
        self.removed.clear();
        self.state = WorkspaceState::Empty;
        self.revision = self.revision.saturating_add(1);
        tracing::info!("workspace reset");

        self.persistence.clear_all()?;
        Ok(())
    }

    fn save_edits(&mut self) -> std::io::Result<()> {
        let record = SavedOverrides {
            removed: self.removed.clone(),
            edited: self.state == WorkspaceState::Edited,
            generation: self.workspace.generation,
            ..SavedOverrides::new(self.overrides.clone())
        };
        save_overrides(self.persistence.as_mut(), &record)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::persistence::MemoryPersistence;
    use crate::persistence::KEY_LAST_GENERATION_RAW;
    use crate::persistence::KEY_LAST_PARSED;
    use crate::persistence::KEY_SAVED_OVERRIDES;

    /// Memory layer whose contents outlive the store that owns it.
    #[derive(Debug, Clone, Default)]
    struct SharedPersistence {
        inner: Arc<Mutex<MemoryPersistence>>,
        fail_writes: bool,
    }

    impl PersistenceLayer for SharedPersistence {
        fn get(&self, key: &str) -> std::io::Result<Option<String>> {
            self.inner.lock().expect("lock").get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
            if self.fail_writes {
                return Err(std::io::Error::other("disk full"));
            }
            self.inner.lock().expect("lock").set(key, value)
        }

        fn clear(&mut self, key: &str) -> std::io::Result<()> {
            self.inner.lock().expect("lock").clear(key)
        }
    }

    fn project(files: &[(&str, &str)]) -> ParsedProject {
        ParsedProject {
            project_title: "Todo".to_string(),
            explanation: "Here you go.".to_string(),
            summary: "A todo list".to_string(),
            files: files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string()))
                .collect::<BTreeMap<_, _>>(),
            generated_files: Vec::new(),
        }
    }

    fn store() -> WorkspaceStore {
        WorkspaceStore::new(Box::new(MemoryPersistence::new()))
    }

    #[test]
    fn set_then_get_returns_content_for_either_spelling() {
        let mut store = store();
        store.set("/App.js", "hello").expect("set");

        assert_eq!(store.get("App.js").map(|f| f.content.as_str()), Some("hello"));
        assert_eq!(store.get("/App.js").map(|f| f.content.as_str()), Some("hello"));
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.state(), WorkspaceState::Edited);
    }

    #[test]
    fn set_rejects_traversal() {
        let mut store = store();
        let err = store.set("../secret", "x").expect_err("reject");
        assert!(matches!(err, WorkspaceError::PathTraversal(_)));
        assert!(store.workspace().is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn load_moves_state_machine_and_generation() {
        let mut store = store();
        assert_eq!(store.state(), WorkspaceState::Empty);

        let report = store.load(&project(&[("App.js", "A"), ("../../etc/passwd", "x")]));
        assert_eq!(report.generation, 1);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(store.state(), WorkspaceState::Loaded);
        assert_eq!(store.get("App.js").map(|f| f.content.as_str()), Some("A"));

        store.set("App.js", "mine").expect("set");
        assert_eq!(store.state(), WorkspaceState::Edited);

        let report = store.load(&project(&[("App.js", "theirs"), ("Footer.js", "F")]));
        assert_eq!(report.generation, 2);
        assert_eq!(report.reapplied, vec!["App.js".to_string()]);
        assert_eq!(store.state(), WorkspaceState::Loaded);
        let app = store.get("App.js").expect("App.js");
        assert_eq!(app.content, "mine");
        assert_eq!(app.origin, Origin::UserEdited);
    }

    #[test]
    fn subset_regeneration_deletes_missing_files_and_prunes_overrides() {
        let mut store = store();
        store.load(&project(&[("App.js", "A"), ("Old.js", "O")]));
        store.set("Old.js", "edited").expect("set");

        let report = store.load(&project(&[("App.js", "A2")]));
        assert_eq!(report.pruned, vec!["Old.js".to_string()]);
        assert!(store.get("Old.js").is_none());
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn remove_releases_override() {
        let mut store = store();
        store.load(&project(&[("App.js", "A")]));
        store.set("App.js", "B").expect("set");

        assert!(store.remove("/App.js").expect("remove"));
        assert!(store.get("App.js").is_none());
        assert!(store.overrides().is_empty());
        assert!(!store.remove("App.js").expect("second remove"));
    }

    #[test]
    fn failed_persistence_still_applies_edit() {
        let layer = SharedPersistence {
            fail_writes: true,
            ..SharedPersistence::default()
        };
        let mut store = WorkspaceStore::new(Box::new(layer));

        let err = store.set("App.js", "x").expect_err("persist fails");
        assert!(matches!(err, WorkspaceError::Persistence(_)));
        assert_eq!(store.get("App.js").map(|f| f.content.as_str()), Some("x"));

        let report = store.load(&project(&[("App.js", "A")]));
        assert!(report.save_error.is_some());
        assert_eq!(report.generation, 1);
    }

    #[test]
    fn restore_prefers_saved_project_and_reapplies_overrides() {
        let layer = SharedPersistence::default();
        let mut store = WorkspaceStore::new(Box::new(layer.clone()));
        store.load(&project(&[("App.js", "A"), ("index.js", "I")]));
        store.set("App.js", "mine").expect("set");
        drop(store);

        let restored = WorkspaceStore::restore(Box::new(layer));
        assert_eq!(restored.generation(), 1);
        assert_eq!(restored.state(), WorkspaceState::Edited);
        assert_eq!(restored.get("App.js").map(|f| f.content.as_str()), Some("mine"));
        assert_eq!(restored.get("index.js").map(|f| f.content.as_str()), Some("I"));
        assert_eq!(restored.workspace().project_title, "Todo");
    }

    #[test]
    fn restore_falls_back_to_raw_response() {
        let mut layer = SharedPersistence::default();
        layer.set(KEY_LAST_PARSED, "{broken").expect("set");
        layer
            .set(
                KEY_LAST_GENERATION_RAW,
                "Done.\n```json\n{\"projectTitle\":\"T\",\"explanation\":\"E\",\"files\":{\"/App.js\":{\"code\":\"x\"}}}\n```",
            )
            .expect("set");
        layer.set(KEY_SAVED_OVERRIDES, "also broken").expect("set");

        let restored = WorkspaceStore::restore(Box::new(layer));
        assert_eq!(restored.state(), WorkspaceState::Loaded);
        assert_eq!(restored.get("App.js").map(|f| f.content.as_str()), Some("x"));
        assert_eq!(restored.workspace().explanation, "Done.");
        assert!(restored.overrides().is_empty());
    }

    #[test]
    fn restore_reports_the_state_of_the_last_mutation() {
        let layer = SharedPersistence::default();
        let mut store = WorkspaceStore::new(Box::new(layer.clone()));
        store.load(&project(&[("App.js", "A")]));
        store.set("App.js", "mine").expect("set");
        store.load(&project(&[("App.js", "A2")]));
        assert_eq!(store.state(), WorkspaceState::Loaded);
        drop(store);

        let mut restored = WorkspaceStore::restore(Box::new(layer.clone()));
        assert_eq!(restored.state(), WorkspaceState::Loaded);
        assert_eq!(restored.get("App.js").map(|f| f.content.as_str()), Some("mine"));

        restored.set("App.js", "again").expect("set");
        drop(restored);
        let restored = WorkspaceStore::restore(Box::new(layer));
        assert_eq!(restored.state(), WorkspaceState::Edited);
    }

    #[test]
    fn removed_generated_files_stay_removed_after_restore() {
        let layer = SharedPersistence::default();
        let mut store = WorkspaceStore::new(Box::new(layer.clone()));
        store.load(&project(&[("App.js", "A"), ("Old.js", "O")]));
        assert!(store.remove("Old.js").expect("remove"));
        drop(store);

        let mut restored = WorkspaceStore::restore(Box::new(layer.clone()));
        assert!(restored.get("Old.js").is_none());
        assert_eq!(restored.list().len(), 1);
        assert_eq!(restored.state(), WorkspaceState::Edited);

        restored.load(&project(&[("App.js", "A"), ("Old.js", "O")]));
        drop(restored);
        let restored = WorkspaceStore::restore(Box::new(layer));
        assert_eq!(restored.get("Old.js").map(|f| f.content.as_str()), Some("O"));
    }

    #[test]
    fn raw_fallback_keeps_the_generation_counter() {
        let mut layer = SharedPersistence::default();
        let mut store = WorkspaceStore::new(Box::new(layer.clone()));
        for _ in 0..3 {
            store.load(&project(&[("App.js", "A")]));
        }
        store
            .record_source(
                "todo",
                "```json\n{\"projectTitle\":\"T\",\"explanation\":\"\",\"files\":{\"App.js\":{\"code\":\"A\"}}}\n```",
            )
            .expect("record");
        drop(store);
        layer.set(KEY_LAST_PARSED, "{broken").expect("set");

        let restored = WorkspaceStore::restore(Box::new(layer));
        assert_eq!(restored.generation(), 3);
        assert_eq!(restored.get("App.js").map(|f| f.content.as_str()), Some("A"));
    }

    #[test]
    fn restore_with_nothing_saved_is_empty() {
        let restored = WorkspaceStore::restore(Box::new(MemoryPersistence::new()));
        assert_eq!(restored.state(), WorkspaceState::Empty);
        assert!(restored.workspace().is_empty());
    }

    #[test]
    fn reset_clears_persistence_but_not_generation_counter() {
        let layer = SharedPersistence::default();
        let mut store = WorkspaceStore::new(Box::new(layer.clone()));
        store.load(&project(&[("App.js", "A")]));
        store.record_source("todo", "raw").expect("record");
        store.set("App.js", "B").expect("set");

        store.reset().expect("reset");
        assert_eq!(store.state(), WorkspaceState::Empty);
        assert!(store.workspace().is_empty());
        for key in crate::persistence::PERSISTED_KEYS {
            assert_eq!(layer.get(key).expect("get"), None);
        }

        let report = store.load(&project(&[("App.js", "A")]));
        assert_eq!(report.generation, 2);
    }
}
