//! Folder view derived from the flat workspace path map.
//!
//! The tree is a projection: it is rebuilt from the workspace and the view
//! state whenever either changes, and nothing here is persisted.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use crate::path::ancestors;
use crate::path::file_name;
use crate::path::normalize_path;
use crate::workspace::Origin;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub name: String,
    /// Empty for the root.
    pub path: String,
    pub folders: BTreeMap<String, FolderNode>,
    pub files: BTreeMap<String, FileLeaf>,
    pub expanded: bool,
}

impl FolderNode {
    fn new(name: &str, path: &str, expanded: bool) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            folders: BTreeMap::new(),
            files: BTreeMap::new(),
            expanded,
        }
    }

    pub fn find_folder(&self, path: &str) -> Option<&FolderNode> {
        if path.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for segment in path.split('/') {
            node = node.folders.get(segment)?;
        }
        Some(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLeaf {
    pub name: String,
    pub path: String,
    pub origin: Origin,
}

/// User-controlled view state: folder toggles and the open file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeViewState {
    toggles: HashMap<String, bool>,
    pub open_file: Option<String>,
}

impl TreeViewState {
    /// Flips a folder relative to how it is currently shown.
    pub fn toggle(&mut self, path: &str) {
        let Ok(path) = normalize_path(path) else {
            return;
        };
        let shown = self.is_expanded(&path);
        self.toggles.insert(path, !shown);
    }

    pub fn open(&mut self, path: String) {
        self.open_file = Some(path);
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        if let Some(expanded) = self.toggles.get(path) {
            return *expanded;
        }
        self.open_file
            .as_deref()
            .is_some_and(|open| ancestors(open).any(|folder| folder == path))
    }

    /// Forgets toggles for folders that no longer exist.
    pub fn retain_folders(&mut self, folders: &HashSet<String>) {
        self.toggles.retain(|path, _| folders.contains(path));
    }

    pub fn clear(&mut self) {
        self.toggles.clear();
        self.open_file = None;
    }
}

pub fn index(workspace: &Workspace, view: &TreeViewState) -> FolderNode {
    let mut root = FolderNode::new("", "", true);

    for file in workspace.iter_sorted() {
        let mut node = &mut root;
        for folder in ancestors(&file.path) {
            let name = file_name(folder);
            node = node
                .folders
                .entry(name.to_string())
                .or_insert_with(|| FolderNode::new(name, folder, view.is_expanded(folder)));
        }
        let name = file_name(&file.path);
        node.files.insert(
            name.to_string(),
            FileLeaf {
                name: name.to_string(),
                path: file.path.clone(),
                origin: file.origin,
            },
        );
    }

    root
}

/// Every folder path in the workspace.
pub fn folder_paths(workspace: &Workspace) -> HashSet<String> {
    workspace
        .iter_sorted()
        .flat_map(|file| ancestors(&file.path).map(str::to_string).collect::<Vec<_>>())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Folder,
    File(Origin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub name: String,
    pub path: String,
    pub kind: RowKind,
    pub expanded: bool,
}

/// Flattens the tree into display rows, folders before files, skipping the
/// contents of collapsed folders.
pub fn visible_rows(root: &FolderNode) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    push_rows(root, 0, &mut rows);
    rows
}

fn push_rows(node: &FolderNode, depth: usize, rows: &mut Vec<TreeRow>) {
    for folder in node.folders.values() {
        rows.push(TreeRow {
            depth,
            name: folder.name.clone(),
            path: folder.path.clone(),
            kind: RowKind::Folder,
            expanded: folder.expanded,
        });
        if folder.expanded {
            push_rows(folder, depth + 1, rows);
        }
    }
    for file in node.files.values() {
        rows.push(TreeRow {
            depth,
            name: file.name.clone(),
            path: file.path.clone(),
            kind: RowKind::File(file.origin),
            expanded: false,
        });
    }
}
