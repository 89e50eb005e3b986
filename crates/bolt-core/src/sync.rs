//! Diffing the workspace against a preview runtime and gating syncs so only
//! one is in flight at a time.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::path::normalize_path;
use crate::workspace::Workspace;

/// The file set a preview runtime currently has materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSnapshot {
    pub files: BTreeMap<String, String>,
}

impl PreviewSnapshot {
    pub fn from_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDiff {
    pub create: BTreeMap<String, String>,
    /// Snapshot keys to remove, spelled as the snapshot spells them.
    pub destroy: Vec<String>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.destroy.is_empty()
    }
}

/// Computes the create/destroy diff that brings `snapshot` to `workspace`.
///
/// Snapshot keys are compared after normalization. A snapshot key that does
/// not normalize is left alone; it cannot name a workspace file and the
/// runtime is not asked to touch it.
pub fn reconcile(workspace: &Workspace, snapshot: &PreviewSnapshot) -> SyncDiff {
    let mut current: HashMap<String, bool> = HashMap::new();
    let mut destroy = Vec::new();

    for (key, content) in &snapshot.files {
        let Ok(path) = normalize_path(key) else {
            tracing::warn!(path = %key, "preview holds a path outside the project; leaving it");
            continue;
        };
        match workspace.get(&path) {
            Some(file) => {
                let up_to_date = current.entry(path).or_insert(false);
                *up_to_date |= file.content == *content;
            }
            None => destroy.push(key.clone()),
        }
    }

    let create = workspace
        .iter_sorted()
        .filter(|file| !current.get(&file.path).copied().unwrap_or(false))
        .map(|file| (file.path.clone(), file.content.clone()))
        .collect();

    SyncDiff { create, destroy }
}

/// Applies a diff to a snapshot the way a preview runtime would.
pub fn apply_to_snapshot(snapshot: &mut PreviewSnapshot, diff: &SyncDiff) {
    for path in &diff.destroy {
        snapshot.files.remove(path);
    }
    for (path, content) in &diff.create {
        snapshot.files.insert(path.clone(), content.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub title: String,
    pub description: String,
    pub open_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStatus {
    NotBooted,
    Booting,
    Ready,
    Unavailable,
}

impl PreviewStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::NotBooted => "not-booted",
            Self::Booting => "booting",
            Self::Ready => "ready",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAdmission {
    /// Nothing was in flight; the caller starts a sync for this revision.
    Start,
    /// A sync for the same revision is already running.
    Coalesced,
    /// A sync for an older revision is running; recompute when it completes.
    Deferred,
}

/// Keeps at most one sync in flight against the preview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncGate {
    in_flight: Option<u64>,
    deferred: bool,
    last_synced: Option<u64>,
}

impl SyncGate {
    pub fn admit(&mut self, revision: u64) -> SyncAdmission {
        match self.in_flight {
            None => {
                self.in_flight = Some(revision);
                SyncAdmission::Start
            }
            Some(running) if running == revision => SyncAdmission::Coalesced,
            Some(_) => {
                self.deferred = true;
                SyncAdmission::Deferred
            }
        }
    }

    /// Moves the in-flight sync to `revision` once its diff is computed
    /// against that revision.
    pub fn rebase(&mut self, revision: u64) {
        if self.in_flight.is_some() {
            self.in_flight = Some(revision);
        }
    }

    /// Finishes the in-flight sync. Returns true when a deferred request
    /// needs a fresh sync for `current`, which is then already admitted.
    pub fn complete(&mut self, current: u64) -> bool {
        let synced = self.in_flight.take();
        if synced.is_some() {
            self.last_synced = synced;
        }
        let restart = self.deferred && synced != Some(current);
        self.deferred = false;
        if restart {
            self.in_flight = Some(current);
        }
        restart
    }

    pub fn fail(&mut self) {
        self.in_flight = None;
        self.deferred = false;
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_synced(&self) -> Option<u64> {
        self.last_synced
    }
}
