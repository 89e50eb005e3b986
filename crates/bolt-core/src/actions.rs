use crate::sync::PreviewSnapshot;

#[derive(Debug, Clone)]
pub enum SessionAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    RequestGeneration { prompt: String },
    EditFile { path: String, content: String },
    RemoveFile { path: String },
    OpenFile { path: String },
    ToggleFolder { path: String },
    RequestSync,
    Reset,
    ClearNotices,
}

/// Results reported back by the generation service and preview runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeAction {
    GenerationCompleted { request_id: u64, raw: String },
    GenerationFailed { request_id: u64, message: String },
    PreviewBooted,
    PreviewBootFailed { message: String },
    PreviewSnapshot(PreviewSnapshot),
    SyncApplied,
    SyncRejected { message: String },
}

impl From<UserAction> for SessionAction {
    fn from(action: UserAction) -> Self {
        Self::User(action)
    }
}

impl From<RuntimeAction> for SessionAction {
    fn from(action: RuntimeAction) -> Self {
        Self::Runtime(action)
    }
}
