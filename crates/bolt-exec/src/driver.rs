use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use bolt_core::reduce;
use bolt_core::sync::PreviewStatus;
use bolt_core::BoltEffect;
use bolt_core::RuntimeAction;
use bolt_core::SessionAction;
use bolt_core::SessionState;
use bolt_core::WorkspaceError;

use crate::adapters::GenerationWorker;
use crate::contracts::GenerationService;
use crate::contracts::PreviewHandle;
use crate::contracts::PreviewRuntime;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Runs the session reducer and executes its effects.
///
/// Preview effects run inline and feed their result straight back into the
/// reducer. Generation calls run on a worker thread; their result is picked
/// up by [`SessionDriver::poll_generation`].
pub struct SessionDriver<R: PreviewRuntime> {
    state: SessionState,
    generator: Arc<dyn GenerationService>,
    runtime: R,
    handle: Option<R::Handle>,
    inflight: Option<mpsc::Receiver<RuntimeAction>>,
}

impl<R: PreviewRuntime> SessionDriver<R> {
    pub fn new(state: SessionState, generator: Arc<dyn GenerationService>, runtime: R) -> Self {
        Self {
            state,
            generator,
            runtime,
            handle: None,
            inflight: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn handle(&self) -> Option<&R::Handle> {
        self.handle.as_ref()
    }

    /// Adopts a preview that is already running, e.g. one left by an earlier
    /// process. Later syncs diff against it instead of bootstrapping.
    pub fn attach(&mut self, handle: R::Handle) {
        self.handle = Some(handle);
        self.state.preview.status = PreviewStatus::Ready;
    }

    pub fn generation_pending(&self) -> bool {
        self.inflight.is_some()
    }

    /// Reduces `action` and every follow-up action its effects produce.
    ///
    /// All follow-ups run even when one fails; the first error is returned.
    pub fn dispatch(&mut self, action: impl Into<SessionAction>) -> Result<(), WorkspaceError> {
        let mut queue = VecDeque::from([action.into()]);
        let mut first_error = None;

        while let Some(action) = queue.pop_front() {
            match reduce(&mut self.state, action) {
                Ok(effects) => {
                    for effect in effects {
                        if let Some(follow_up) = self.run_effect(effect) {
                            queue.push_back(SessionAction::Runtime(follow_up));
                        }
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run_effect(&mut self, effect: BoltEffect) -> Option<RuntimeAction> {
        match effect {
            BoltEffect::CallGeneration(request) => {
                self.inflight = Some(GenerationWorker::spawn(self.generator.clone(), request));
                None
            }
            BoltEffect::BootstrapPreview {
                files,
                template_id,
                metadata,
            } => match self.runtime.bootstrap(&files, &template_id, &metadata) {
                Ok(handle) => {
                    self.handle = Some(handle);
                    Some(RuntimeAction::PreviewBooted)
                }
                Err(err) => {
                    self.handle = None;
                    Some(RuntimeAction::PreviewBootFailed {
                        message: err.to_string(),
                    })
                }
            },
            BoltEffect::FetchPreviewSnapshot => {
                let Some(handle) = self.handle.as_ref() else {
                    return Some(not_booted());
                };
                Some(match handle.snapshot() {
                    Ok(snapshot) => RuntimeAction::PreviewSnapshot(snapshot),
                    Err(err) => RuntimeAction::SyncRejected {
                        message: err.to_string(),
                    },
                })
            }
            BoltEffect::ApplyPreviewDiff(diff) => {
                let Some(handle) = self.handle.as_mut() else {
                    return Some(not_booted());
                };
                Some(match handle.materialize(&diff.create, &diff.destroy) {
                    Ok(()) => RuntimeAction::SyncApplied,
                    Err(err) => RuntimeAction::SyncRejected {
                        message: err.to_string(),
                    },
                })
            }
        }
    }

    /// Waits up to `timeout` for the outstanding generation and reduces its
    /// result. Returns whether a result arrived.
    pub fn poll_generation(&mut self, timeout: Duration) -> Result<bool, WorkspaceError> {
        let Some(rx) = self.inflight.as_ref() else {
            return Ok(false);
        };
        let action = match rx.recv_timeout(timeout) {
            Ok(action) => action,
            Err(mpsc::RecvTimeoutError::Timeout) => return Ok(false),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.inflight = None;
                let Some(pending) = self.state.generation.pending.as_ref() else {
                    return Ok(true);
                };
                RuntimeAction::GenerationFailed {
                    request_id: pending.request_id,
                    message: "generation worker exited without a result".to_string(),
                }
            }
        };
        self.inflight = None;
        self.dispatch(action)?;
        Ok(true)
    }

    pub fn wait_for_generation(&mut self) -> Result<(), WorkspaceError> {
        while self.inflight.is_some() {
            self.poll_generation(POLL_INTERVAL)?;
        }
        Ok(())
    }
}

fn not_booted() -> RuntimeAction {
    RuntimeAction::SyncRejected {
        message: "preview is not booted".to_string(),
    }
}
