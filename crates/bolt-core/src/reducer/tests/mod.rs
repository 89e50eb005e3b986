pub(super) use super::reduce;
pub(super) use super::BoltEffect;
pub(super) use super::GenerationRequest;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::SessionAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::config::PreviewConfig;
pub(super) use crate::error::ErrorKind;
pub(super) use crate::error::WorkspaceError;
pub(super) use crate::persistence::MemoryPersistence;
pub(super) use crate::state::NoticeBuffer;
pub(super) use crate::state::NoticeLevel;
pub(super) use crate::state::SessionState;
pub(super) use crate::store::WorkspaceState;
pub(super) use crate::store::WorkspaceStore;
pub(super) use crate::sync::PreviewSnapshot;
pub(super) use crate::sync::PreviewStatus;
pub(super) use crate::workspace::Origin;


fn state() -> SessionState {
    SessionState::new(
        WorkspaceStore::new(Box::new(MemoryPersistence::new())),
        PreviewConfig::default(),
    )
}

fn user(
    state: &mut SessionState,
    action: UserAction,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    reduce(state, SessionAction::User(action))
}

fn runtime(
    state: &mut SessionState,
    action: RuntimeAction,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    reduce(state, SessionAction::Runtime(action))
}

fn response(title: &str, files: &[(&str, &str)]) -> String {
    let files: serde_json::Map<String, serde_json::Value> = files
        .iter()
        .map(|(path, code)| (path.to_string(), serde_json::json!({ "code": code })))
        .collect();
    let document = serde_json::json!({
        "projectTitle": title,
        "explanation": "A small app",
        "files": files,
        "generatedFiles": [],
    });
    format!("Here you go.\n```json\n{document}\n```\nRun npm start.")
}

fn request(state: &mut SessionState, prompt: &str) -> GenerationRequest {
    let effects = user(
        state,
        UserAction::RequestGeneration {
            prompt: prompt.to_string(),
        },
    )
    .expect("request generation");
    match effects.as_slice() {
        [BoltEffect::CallGeneration(request)] => request.clone(),
        other => panic!("expected a generation call, got {other:?}"),
    }
}

/// Runs a full generation round trip and returns the completion's effects.
fn generate(state: &mut SessionState, files: &[(&str, &str)]) -> Vec<BoltEffect> {
    let request = request(state, "build a todo app");
    runtime(
        state,
        RuntimeAction::GenerationCompleted {
            request_id: request.request_id,
            raw: response("Todo", files),
        },
    )
    .expect("generation completes")
}

/// Generates `files` and boots the preview with them.
fn generate_and_boot(state: &mut SessionState, files: &[(&str, &str)]) {
    let effects = generate(state, files);
    assert!(matches!(
        effects.as_slice(),
        [BoltEffect::BootstrapPreview { .. }]
    ));
    let effects = runtime(state, RuntimeAction::PreviewBooted).expect("boot");
    assert!(effects.is_empty());
    assert_eq!(state.preview.status, PreviewStatus::Ready);
}

fn content(state: &SessionState, path: &str) -> Option<String> {
    state.store.get(path).map(|file| file.content.clone())
}
