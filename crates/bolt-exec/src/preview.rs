use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use bolt_core::path::normalize_path;
use bolt_core::sync::PreviewMetadata;
use bolt_core::sync::PreviewSnapshot;

use crate::contracts::PreviewHandle;
use crate::contracts::PreviewRuntime;

pub const PREVIEW_METADATA_FILE: &str = ".bolt-preview.json";

/// In-process preview holding files in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreview {
    pub boots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPreviewHandle {
    pub template_id: String,
    pub metadata: PreviewMetadata,
    pub files: BTreeMap<String, String>,
}

impl PreviewRuntime for MemoryPreview {
    type Handle = MemoryPreviewHandle;

    fn bootstrap(
        &mut self,
        files: &BTreeMap<String, String>,
        template_id: &str,
        metadata: &PreviewMetadata,
    ) -> std::io::Result<Self::Handle> {
        self.boots += 1;
        Ok(MemoryPreviewHandle {
            template_id: template_id.to_string(),
            metadata: metadata.clone(),
            files: files.clone(),
        })
    }
}

impl PreviewHandle for MemoryPreviewHandle {
    fn materialize(
        &mut self,
        create: &BTreeMap<String, String>,
        destroy: &[String],
    ) -> std::io::Result<()> {
        for path in destroy {
            self.files.remove(path);
        }
        for (path, content) in create {
            self.files.insert(path.clone(), content.clone());
        }
        Ok(())
    }

    fn snapshot(&self) -> std::io::Result<PreviewSnapshot> {
        Ok(PreviewSnapshot {
            files: self.files.clone(),
        })
    }
}

/// Materializes the project into a directory on disk.
///
/// Every path is normalized before it is joined to the root, so nothing is
/// ever written or removed outside it. The metadata file keeps a manifest of
/// the paths this preview wrote. Snapshots and pruning only ever see those,
/// so files that were already in the directory are left alone.
#[derive(Debug, Clone)]
pub struct DirectoryPreview {
    root: PathBuf,
}

impl DirectoryPreview {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reopens a preview bootstrapped by an earlier process, if any.
    pub fn attach(&self) -> Option<DirectoryHandle> {
        let descriptor = match read_descriptor(&self.root) {
            Ok(descriptor) => descriptor?,
            Err(err) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %err,
                    "ignoring unreadable preview metadata"
                );
                return None;
            }
        };
        Some(DirectoryHandle {
            root: self.root.clone(),
            descriptor,
        })
    }
}

/// Contents of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDescriptor {
    pub template: String,
    pub title: String,
    pub description: String,
    pub open_file: String,
    #[serde(default)]
    pub files: BTreeSet<String>,
}

fn read_descriptor(root: &Path) -> std::io::Result<Option<PreviewDescriptor>> {
    let encoded = match std::fs::read_to_string(root.join(PREVIEW_METADATA_FILE)) {
        Ok(encoded) => encoded,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    serde_json::from_str(&encoded)
        .map(Some)
        .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err.to_string()))
}

fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    root: PathBuf,
    descriptor: PreviewDescriptor,
}

impl DirectoryHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor(&self) -> &PreviewDescriptor {
        &self.descriptor
    }

    fn resolve(&self, raw: &str) -> std::io::Result<(String, PathBuf)> {
        let path = normalize_path(raw)
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidInput, err.to_string()))?;
        if path == PREVIEW_METADATA_FILE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{path} is reserved"),
            ));
        }
        let full = self.root.join(&path);
        Ok((path, full))
    }

    fn write_file(&mut self, raw: &str, content: &str) -> std::io::Result<()> {
        let (path, full) = self.resolve(raw)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, content)?;
        self.descriptor.files.insert(path);
        Ok(())
    }

    /// Removes a file this preview wrote. Anything else is left in place.
    fn remove_file(&mut self, raw: &str) -> std::io::Result<()> {
        let (path, full) = self.resolve(raw)?;
        if !self.descriptor.files.remove(&path) {
            tracing::debug!(path = %path, "not removing a file the preview does not own");
            return Ok(());
        }
        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        }
        self.prune_empty_dirs(full.parent());
        Ok(())
    }

    fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.root.as_path() || !current.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn apply(
        &mut self,
        create: &BTreeMap<String, String>,
        destroy: &[String],
    ) -> std::io::Result<()> {
        for path in destroy {
            self.remove_file(path)?;
        }
        for (path, content) in create {
            self.write_file(path, content)?;
        }
        Ok(())
    }

    fn save_descriptor(&self) -> std::io::Result<()> {
        let encoded = serde_json::to_string_pretty(&self.descriptor)
            .map_err(|err| std::io::Error::other(format!("serialize preview metadata: {err}")))?;
        std::fs::write(self.root.join(PREVIEW_METADATA_FILE), encoded)
    }
}

impl PreviewRuntime for DirectoryPreview {
    type Handle = DirectoryHandle;

    fn bootstrap(
        &mut self,
        files: &BTreeMap<String, String>,
        template_id: &str,
        metadata: &PreviewMetadata,
    ) -> std::io::Result<Self::Handle> {
        let owned = match read_descriptor(&self.root) {
            Ok(Some(previous)) => previous.files,
            Ok(None) => {
                if !is_empty_dir(&self.root)? {
                    return Err(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!(
                            "{} is not empty and was not created by bolt",
                            self.root.display()
                        ),
                    ));
                }
                BTreeSet::new()
            }
            Err(err) => {
                tracing::warn!(error = %err, "replacing unreadable preview metadata");
                BTreeSet::new()
            }
        };
        std::fs::create_dir_all(&self.root)?;

        let mut handle = DirectoryHandle {
            root: self.root.clone(),
            descriptor: PreviewDescriptor {
                template: template_id.to_string(),
                title: metadata.title.clone(),
                description: metadata.description.clone(),
                open_file: metadata.open_file.clone(),
                files: owned,
            },
        };

        let stale: Vec<String> = handle
            .descriptor
            .files
            .iter()
            .filter(|path| !files.contains_key(*path))
            .cloned()
            .collect();
        for path in &stale {
            handle.remove_file(path)?;
        }
        for (path, content) in files {
            handle.write_file(path, content)?;
        }
        handle.save_descriptor()?;

        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            removed = stale.len(),
            "directory preview bootstrapped"
        );
        Ok(handle)
    }
}

impl PreviewHandle for DirectoryHandle {
    fn materialize(
        &mut self,
        create: &BTreeMap<String, String>,
        destroy: &[String],
    ) -> std::io::Result<()> {
        for path in destroy.iter().chain(create.keys()) {
            self.resolve(path)?;
        }

        let applied = self.apply(create, destroy);
        let saved = self.save_descriptor();
        applied.and(saved)
    }

    /// Reads back the files this preview owns. Owned files deleted or made
    /// unreadable behind its back are left out.
    fn snapshot(&self) -> std::io::Result<PreviewSnapshot> {
        let mut files = BTreeMap::new();
        for path in &self.descriptor.files {
            match std::fs::read_to_string(self.root.join(path)) {
                Ok(content) => {
                    files.insert(path.clone(), content);
                }
                Err(err)
                    if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::InvalidData) =>
                {
                    tracing::debug!(path = %path, "owned preview file missing or not text");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(PreviewSnapshot { files })
    }
}
