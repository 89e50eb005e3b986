use std::collections::VecDeque;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use bolt_core::GenerationRequest;
use bolt_core::RuntimeAction;

use crate::contracts::GenerationService;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You generate complete, runnable React projects \
(create-react-app with Tailwind CSS). Reply with a short explanation followed by exactly one \
fenced ```json block holding the project:\n\
{\n\
  \"projectTitle\": \"\",\n\
  \"explanation\": \"\",\n\
  \"files\": {\n\
    \"/path/to/file\": { \"code\": \"content\" }\n\
  },\n\
  \"generatedFiles\": [\"/path/to/file\"]\n\
}\n\
Include every file the project needs (src/index.js, src/App.js, public/index.html, \
package.json). Paths are relative to the project root. Never emit partial files.";

pub const UPDATE_INSTRUCTIONS: &str = "You are modifying an existing project. Apply the \
requested change to the current files below, keep everything else intact, describe what \
changed in the explanation field and return the full project in the same JSON format.";

/// Composes the text sent to a command-line model.
pub fn build_generation_prompt(system_prompt: &str, request: &GenerationRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("System:\n");
    prompt.push_str(system_prompt.trim());
    prompt.push_str("\n\n");

    if let Some(previous) = request.previous_content.as_deref() {
        prompt.push_str(UPDATE_INSTRUCTIONS);
        prompt.push_str("\n\nCurrent project:\n");
        prompt.push_str(previous);
        prompt.push_str("\n\n");
    }

    prompt.push_str("User Request: ");
    prompt.push_str(&request.prompt);
    prompt
}

/// Runs an external program per request: the prompt goes to stdin, stdout
/// is the raw response.
#[derive(Debug, Clone)]
pub struct CommandGenerationService {
    program: String,
    args: Vec<String>,
    system_prompt: String,
}

impl CommandGenerationService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_system_prompt_file(self, path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.with_system_prompt(text))
    }
}

impl GenerationService for CommandGenerationService {
    fn name(&self) -> &'static str {
        "command"
    }

    fn generate(&self, request: &GenerationRequest) -> std::io::Result<String> {
        let prompt = build_generation_prompt(&self.system_prompt, request);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                std::io::Error::new(
                    err.kind(),
                    format!("failed to start {}: {err}", self.program),
                )
            })?;

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut stderr_text = String::new();
                let _ = stderr.read_to_string(&mut stderr_text);
                stderr_text
            })
        });

        // The child may fill stdout before it has read all of stdin.
        let stdin_handle = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(prompt.as_bytes());
            })
        });

        let mut raw = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut raw)?;
        }
        if let Some(handle) = stdin_handle {
            let _ = handle.join();
        }

        let status = child.wait()?;
        let stderr_text = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string();

        if !status.success() {
            let msg = if stderr_text.is_empty() {
                format!("{} exited with {status}", self.program)
            } else {
                format!("{} failed: {stderr_text}", self.program)
            };
            return Err(std::io::Error::other(msg));
        }
        if raw.trim().is_empty() {
            return Err(std::io::Error::other(format!(
                "{} returned an empty response",
                self.program
            )));
        }
        tracing::debug!(program = %self.program, bytes = raw.len(), "generation command finished");
        Ok(raw)
    }
}

/// Answers requests from a fixed queue of canned responses.
#[derive(Debug, Default)]
pub struct ReplayGenerationService {
    responses: Mutex<VecDeque<String>>,
}

impl ReplayGenerationService {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new([raw]))
    }

    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response.into());
        }
    }
}

impl GenerationService for ReplayGenerationService {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn generate(&self, _request: &GenerationRequest) -> std::io::Result<String> {
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| std::io::Error::other("replay queue poisoned"))?;
        queue
            .pop_front()
            .ok_or_else(|| std::io::Error::other("no replay response left"))
    }
}

/// Runs one generation off the caller's thread.
pub struct GenerationWorker;

impl GenerationWorker {
    /// Spawns the call and returns a receiver that yields exactly one
    /// completion or failure action for `request`.
    pub fn spawn(
        service: Arc<dyn GenerationService>,
        request: GenerationRequest,
    ) -> mpsc::Receiver<RuntimeAction> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let request_id = request.request_id;
            tracing::info!(service = service.name(), request_id, "calling generation service");
            let action = match service.generate(&request) {
                Ok(raw) => RuntimeAction::GenerationCompleted { request_id, raw },
                Err(err) => RuntimeAction::GenerationFailed {
                    request_id,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(action);
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn request(previous: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            request_id: 4,
            prompt: "a todo app".to_string(),
            previous_content: previous.map(str::to_string),
        }
    }

    #[test]
    fn prompt_includes_previous_content_for_updates() {
        let fresh = build_generation_prompt("sys", &request(None));
        assert_eq!(fresh, "System:\nsys\n\nUser Request: a todo app");

        let update = build_generation_prompt("sys", &request(Some("```json\n{}\n```")));
        assert!(update.contains(UPDATE_INSTRUCTIONS));
        assert!(update.contains("Current project:\n```json\n{}\n```"));
        assert!(update.ends_with("User Request: a todo app"));
    }

    #[test]
    fn replay_serves_responses_in_order_then_fails() {
        let service = ReplayGenerationService::new(["one".to_string()]);
        service.push("two");

        assert_eq!(service.generate(&request(None)).expect("first"), "one");
        assert_eq!(service.generate(&request(None)).expect("second"), "two");
        assert!(service.generate(&request(None)).is_err());
    }

    #[test]
    fn worker_reports_completion_with_request_id() {
        let service: Arc<dyn GenerationService> =
            Arc::new(ReplayGenerationService::new(["raw".to_string()]));
        let rx = GenerationWorker::spawn(service, request(None));

        let action = rx.recv_timeout(Duration::from_secs(5)).expect("action");
        assert_eq!(
            action,
            RuntimeAction::GenerationCompleted {
                request_id: 4,
                raw: "raw".to_string(),
            }
        );
    }

    #[test]
    fn worker_reports_failure() {
        let service: Arc<dyn GenerationService> = Arc::new(ReplayGenerationService::default());
        let rx = GenerationWorker::spawn(service, request(None));

        let action = rx.recv_timeout(Duration::from_secs(5)).expect("action");
        assert!(matches!(
            action,
            RuntimeAction::GenerationFailed { request_id: 4, .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn command_service_pipes_prompt_through_program() {
        let service = CommandGenerationService::new("cat", Vec::new()).with_system_prompt("sys");
        let raw = service.generate(&request(None)).expect("cat echoes");
        assert_eq!(raw, "System:\nsys\n\nUser Request: a todo app");
    }

    #[cfg(unix)]
    #[test]
    fn command_service_surfaces_failures() {
        let service = CommandGenerationService::new("false", Vec::new());
        assert!(service.generate(&request(None)).is_err());

        let missing = CommandGenerationService::new("bolt-no-such-program", Vec::new());
        assert!(missing.generate(&request(None)).is_err());
    }
}
