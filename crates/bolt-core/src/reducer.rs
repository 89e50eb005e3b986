use std::collections::BTreeMap;

use super::actions::RuntimeAction;
use super::actions::SessionAction;
use super::actions::UserAction;
use super::error::ErrorKind;
use super::error::WorkspaceError;
use super::path::normalize_path;
use super::response::parse;
use super::response::render_project_document;
use super::state::NoticeLevel;
use super::state::PendingGeneration;
use super::state::SessionState;
use super::sync::reconcile;
use super::sync::PreviewMetadata;
use super::sync::PreviewSnapshot;
use super::sync::PreviewStatus;
use super::sync::SyncAdmission;
use super::sync::SyncDiff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub request_id: u64,
    pub prompt: String,
    /// The current workspace rendered as a generation document, sent when
    /// regenerating so local edits are visible to the service.
    pub previous_content: Option<String>,
}

/// Work the host must perform; results come back as [`RuntimeAction`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoltEffect {
    CallGeneration(GenerationRequest),
    BootstrapPreview {
        files: BTreeMap<String, String>,
        template_id: String,
        metadata: PreviewMetadata,
    },
    FetchPreviewSnapshot,
    ApplyPreviewDiff(SyncDiff),
}

/// Applies one action to the session.
///
/// Every error is also appended to `state.notices` before it is returned, so
/// a host may drop the `Err` and still show it.
pub fn reduce(
    state: &mut SessionState,
    action: SessionAction,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    let result = match action {
        SessionAction::User(user) => reduce_user(state, user),
        SessionAction::Runtime(runtime) => reduce_runtime(state, runtime),
    };
    if let Err(err) = &result {
        tracing::warn!(kind = err.kind().label(), error = %err, "session action failed");
        state.notices.error(err);
    }
    result
}

fn reduce_user(
    state: &mut SessionState,
    action: UserAction,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    match action {
        UserAction::RequestGeneration { prompt } => request_generation(state, prompt),
        UserAction::EditFile { path, content } => {
            let result = state.store.set(&path, &content);
            state.reconcile_view();
            result.map(|()| Vec::new())
        }
        UserAction::RemoveFile { path } => {
            let result = state.store.remove(&path);
            state.reconcile_view();
            if let Ok(false) = result {
                state.notices.info(format!("no file at {path}"));
            }
            result.map(|_| Vec::new())
        }
        UserAction::OpenFile { path } => {
            let path = normalize_path(&path)?;
            if state.store.workspace().contains(&path) {
                state.tree.open(path);
            } else {
                state.notices.warn(format!("no file at {path}"));
            }
            Ok(Vec::new())
        }
        UserAction::ToggleFolder { path } => {
            state.tree.toggle(&path);
            Ok(Vec::new())
        }
        UserAction::RequestSync => begin_sync(state),
        UserAction::Reset => {
            if let Some(pending) = state.generation.pending.take() {
                tracing::debug!(request_id = pending.request_id, "abandoning generation on reset");
            }
            state.preview.gate.fail();
            state.preview.last_diff = None;
            state.tree.clear();
            state.last_load = None;
            let result = state.store.reset();
            state.notices.info("workspace reset");
            result.map(|()| Vec::new())
        }
        UserAction::ClearNotices => {
            state.notices.clear();
            Ok(Vec::new())
        }
    }
}

fn request_generation(
    state: &mut SessionState,
    prompt: String,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        state.notices.warn("prompt is empty");
        return Ok(Vec::new());
    }
    if state.generation.pending.is_some() {
        return Err(WorkspaceError::Busy);
    }

    let request_id = state.generation.next_request_id;
    state.generation.next_request_id = request_id.saturating_add(1);

    let workspace = state.store.workspace();
    let previous_content = if workspace.is_empty() {
        None
    } else {
        Some(render_project_document(workspace))
    };

    state.generation.pending = Some(PendingGeneration {
        request_id,
        prompt: prompt.clone(),
    });
    tracing::info!(
        request_id,
        update = previous_content.is_some(),
        "requesting generation"
    );

    Ok(vec![BoltEffect::CallGeneration(GenerationRequest {
        request_id,
        prompt,
        previous_content,
    })])
}

fn reduce_runtime(
    state: &mut SessionState,
    action: RuntimeAction,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    match action {
        RuntimeAction::GenerationCompleted { request_id, raw } => {
            let Some(pending) = take_pending(state, request_id) else {
                return Ok(Vec::new());
            };
            complete_generation(state, pending, &raw)
        }
        RuntimeAction::GenerationFailed {
            request_id,
            message,
        } => {
            if take_pending(state, request_id).is_none() {
                return Ok(Vec::new());
            }
            Err(WorkspaceError::GenerationFailed(message))
        }
        RuntimeAction::PreviewBooted => {
            if state.preview.status != PreviewStatus::Booting {
                tracing::debug!(status = state.preview.status.label(), "ignoring unexpected boot");
                return Ok(Vec::new());
            }
            state.preview.status = PreviewStatus::Ready;
            state.preview.last_error = None;
            tracing::info!("preview booted");
            Ok(finish_sync(state))
        }
        RuntimeAction::PreviewBootFailed { message } => {
            state.preview.status = PreviewStatus::Unavailable;
            state.preview.gate.fail();
            state.preview.last_error = Some(message.clone());
            Err(WorkspaceError::SyncUnavailable(message))
        }
        RuntimeAction::PreviewSnapshot(snapshot) => Ok(snapshot_received(state, &snapshot)),
        RuntimeAction::SyncApplied => {
            if let Some(diff) = &state.preview.last_diff {
                tracing::info!(
                    created = diff.create.len(),
                    destroyed = diff.destroy.len(),
                    "preview synced"
                );
            }
            Ok(finish_sync(state))
        }
        RuntimeAction::SyncRejected { message } => {
            state.preview.gate.fail();
            state.preview.last_error = Some(message.clone());
            Err(WorkspaceError::SyncUnavailable(message))
        }
    }
}

fn take_pending(state: &mut SessionState, request_id: u64) -> Option<PendingGeneration> {
    let current = state
        .generation
        .pending
        .as_ref()
        .is_some_and(|pending| pending.request_id == request_id);
    if current {
        return state.generation.pending.take();
    }
    tracing::debug!(request_id, "dropping stale generation result");
    state
        .notices
        .info(format!("ignored stale generation result #{request_id}"));
    None
}

fn complete_generation(
    state: &mut SessionState,
    pending: PendingGeneration,
    raw: &str,
) -> Result<Vec<BoltEffect>, WorkspaceError> {
    let parsed = parse(raw)?;

    if let Err(err) = state.store.record_source(&pending.prompt, raw) {
        tracing::warn!(error = %err, "failed to save generation source");
        state.notices.error(&err);
    }

    let report = state.store.load(&parsed);
    for rejected in &report.rejected {
        state.notices.push(
            NoticeLevel::Warn,
            Some(ErrorKind::PathTraversal),
            rejected.to_string(),
        );
    }
    if let Some(save_error) = &report.save_error {
        state.notices.push(
            NoticeLevel::Warn,
            Some(ErrorKind::Persistence),
            format!("generation not saved: {save_error}"),
        );
    }
    state.notices.info(format!(
        "loaded generation {} with {} files",
        report.generation, report.loaded
    ));
    state.reconcile_view();
    state.last_load = Some(report);

    if state.store.workspace().is_empty() && state.preview.status != PreviewStatus::Ready {
        state.notices.warn("generation produced no usable files; preview not synced");
        return Ok(Vec::new());
    }
    begin_sync(state)
}

/// A booted preview is always synced, even to an empty workspace. Only the
/// first bootstrap needs files.
fn begin_sync(state: &mut SessionState) -> Result<Vec<BoltEffect>, WorkspaceError> {
    if state.store.workspace().is_empty() && state.preview.status != PreviewStatus::Ready {
        return Err(WorkspaceError::SyncUnavailable(
            "workspace is empty".to_string(),
        ));
    }

    let revision = state.store.revision();
    match state.preview.gate.admit(revision) {
        SyncAdmission::Start => {}
        SyncAdmission::Coalesced => {
            state.notices.info("sync already in flight");
            return Ok(Vec::new());
        }
        SyncAdmission::Deferred => {
            state.notices.info("sync queued behind the one in flight");
            return Ok(Vec::new());
        }
    }

    if state.preview.status == PreviewStatus::Ready {
        tracing::debug!(revision, "fetching preview snapshot");
        return Ok(vec![BoltEffect::FetchPreviewSnapshot]);
    }

    state.preview.status = PreviewStatus::Booting;
    state.preview.last_error = None;
    let files = state.store.workspace().content_map();
    tracing::info!(revision, files = files.len(), "bootstrapping preview");
    Ok(vec![BoltEffect::BootstrapPreview {
        files,
        template_id: state.preview_config.template_id.clone(),
        metadata: state.preview_metadata(),
    }])
}

fn snapshot_received(state: &mut SessionState, snapshot: &PreviewSnapshot) -> Vec<BoltEffect> {
    if !state.preview.gate.is_busy() || state.preview.status != PreviewStatus::Ready {
        tracing::debug!("ignoring unrequested preview snapshot");
        return Vec::new();
    }

    let revision = state.store.revision();
    state.preview.gate.rebase(revision);
    let diff = reconcile(state.store.workspace(), snapshot);
    tracing::debug!(
        revision,
        create = diff.create.len(),
        destroy = diff.destroy.len(),
        "reconciled preview"
    );

    if diff.is_empty() {
        state.preview.last_diff = Some(diff);
        return finish_sync(state);
    }
    state.preview.last_diff = Some(diff.clone());
    vec![BoltEffect::ApplyPreviewDiff(diff)]
}

fn finish_sync(state: &mut SessionState) -> Vec<BoltEffect> {
    if state.preview.gate.complete(state.store.revision()) {
        tracing::debug!("restarting deferred sync");
        return vec![BoltEffect::FetchPreviewSnapshot];
    }
    Vec::new()
}

#[cfg(test)]
mod tests;
