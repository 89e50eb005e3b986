use std::collections::VecDeque;

use crate::config::PreviewConfig;
use crate::error::ErrorKind;
use crate::error::WorkspaceError;
use crate::store::LoadReport;
use crate::store::WorkspaceStore;
use crate::sync::PreviewMetadata;
use crate::sync::PreviewStatus;
use crate::sync::SyncDiff;
use crate::sync::SyncGate;
use crate::tree::index;
use crate::tree::FolderNode;
use crate::tree::TreeViewState;

pub const NOTICE_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

impl NoticeLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub seq: u64,
    pub level: NoticeLevel,
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub ts_ms: i64,
}

/// Bounded, non-blocking notices for display layers. Oldest entries fall
/// off first; `seq` keeps counting until the buffer is cleared.
#[derive(Debug, Clone)]
pub struct NoticeBuffer {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<Notice>,
}

impl NoticeBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(
        &mut self,
        level: NoticeLevel,
        kind: Option<ErrorKind>,
        message: impl Into<String>,
    ) {
        let notice = Notice {
            seq: self.next_seq,
            level,
            kind,
            message: message.into(),
            ts_ms: chrono::Utc::now().timestamp_millis(),
        };
        self.next_seq += 1;

        if self.cap == 0 {
            return;
        }
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(notice);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, None, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Warn, None, message);
    }

    pub fn error(&mut self, err: &WorkspaceError) {
        self.push(NoticeLevel::Error, Some(err.kind()), err.to_string());
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.next_seq = 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn last(&self) -> Option<&Notice> {
        self.buf.back()
    }
}

impl Default for NoticeBuffer {
    fn default() -> Self {
        Self::new(NOTICE_CAPACITY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGeneration {
    pub request_id: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationState {
    pub next_request_id: u64,
    pub pending: Option<PendingGeneration>,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            next_request_id: 1,
            pending: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewState {
    pub status: PreviewStatus,
    pub gate: SyncGate,
    pub last_diff: Option<SyncDiff>,
    pub last_error: Option<String>,
}

impl Default for PreviewState {
    fn default() -> Self {
        Self {
            status: PreviewStatus::NotBooted,
            gate: SyncGate::default(),
            last_diff: None,
            last_error: None,
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub store: WorkspaceStore,
    pub preview_config: PreviewConfig,
    pub generation: GenerationState,
    pub preview: PreviewState,
    pub tree: TreeViewState,
    pub notices: NoticeBuffer,
    pub last_load: Option<LoadReport>,
}

impl SessionState {
    pub fn new(store: WorkspaceStore, preview_config: PreviewConfig) -> Self {
        let mut state = Self {
            store,
            preview_config,
            generation: GenerationState::default(),
            preview: PreviewState::default(),
            tree: TreeViewState::default(),
            notices: NoticeBuffer::default(),
            last_load: None,
        };
        state.reconcile_view();
        state
    }

    pub fn file_tree(&self) -> FolderNode {
        index(self.store.workspace(), &self.tree)
    }

    pub fn is_generating(&self) -> bool {
        self.generation.pending.is_some()
    }

    /// Display metadata handed to the preview at bootstrap.
    ///
    /// Empty title or description fall back to the configured defaults.
    pub fn preview_metadata(&self) -> PreviewMetadata {
        let workspace = self.store.workspace();
        let title = non_empty_or(&workspace.project_title, &self.preview_config.default_title);
        let description =
            non_empty_or(&workspace.summary, &self.preview_config.default_description);
        PreviewMetadata {
            title,
            description,
            open_file: self.preview_config.open_file.clone(),
        }
    }

    /// Keeps view state consistent with the workspace after it changes.
    ///
    /// Toggles for vanished folders are dropped. The open file moves to the
    /// configured default, or the first file, when it no longer exists.
    pub(crate) fn reconcile_view(&mut self) {
        let workspace = self.store.workspace();
        self.tree.retain_folders(&crate::tree::folder_paths(workspace));

        let open_is_valid = self
            .tree
            .open_file
            .as_deref()
            .is_some_and(|path| workspace.contains(path));
        if open_is_valid {
            return;
        }

        let preferred = &self.preview_config.open_file;
        self.tree.open_file = if workspace.contains(preferred) {
            workspace.get(preferred).map(|file| file.path.clone())
        } else {
            workspace.iter_sorted().next().map(|file| file.path.clone())
        };
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
