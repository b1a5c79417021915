//! Command-line generation backend.
//!
//! Spawns a configured program (by default the `claude` CLI in print mode),
//! writes the prompt to its stdin and treats stdout as the completion.

use super::{Completion, CompletionRequest, GenerationOracle, OracleError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Oracle backed by a local CLI process.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    system_message: Option<String>,
    working_dir: Option<PathBuf>,
}

impl CommandOracle {
    /// Create an oracle running `program` with no arguments.
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            system_message: None,
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// System message prepended to the prompt on stdin.
    #[must_use]
    pub fn with_system_message(mut self, system: &str) -> Self {
        self.system_message = Some(system.to_string());
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Check that the program resolves on `PATH`.
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn stdin_payload(&self, request: &CompletionRequest) -> String {
        let system = request.system.as_deref().or(self.system_message.as_deref());
        match system {
            Some(system) if !system.is_empty() => {
                format!("{}\n\n{}", system, request.render_prompt())
            }
            _ => request.render_prompt(),
        }
    }
}

#[async_trait]
impl GenerationOracle for CommandOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        let payload = self.stdin_payload(request);
        debug!("Running {} ({} chars on stdin)", self.program, payload.len());

        let mut command = AsyncCommand::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OracleError::permanent(format!(
                    "'{}' is not installed or not in PATH",
                    self.program
                )));
            }
            Err(e) => {
                return Err(OracleError::transient(format!(
                    "failed to spawn {}: {}",
                    self.program, e
                )));
            }
        };

        // Feed stdin while stdout drains, otherwise a child that echoes as it
        // reads stalls once the pipe buffer fills.
        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output =
            output.map_err(|e| OracleError::transient(format!("failed to read output: {}", e)))?;
        match written {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} closed stdin before reading the whole prompt", self.program);
            }
            Err(e) => {
                return Err(OracleError::transient(format!("failed to write prompt: {}", e)));
            }
            Ok(()) => {}
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::transient(format!(
                "{} exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| OracleError::malformed("process output is not UTF-8"))?;
        Completion::from_envelope(&serde_json::Value::String(stdout))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_payload_prepends_system() {
        let oracle = CommandOracle::new("cat").with_system_message("SYS");
        let payload = oracle.stdin_payload(&CompletionRequest::new("hello"));
        assert_eq!(payload, "SYS\n\nhello");
    }

    #[test]
    fn test_stdin_payload_without_system() {
        let oracle = CommandOracle::new("cat");
        assert_eq!(oracle.stdin_payload(&CompletionRequest::new("hello")), "hello");
    }

    #[tokio::test]
    async fn test_missing_program_is_permanent() {
        let oracle = CommandOracle::new("factory-definitely-missing-binary-xyz");
        assert!(!oracle.is_available());
        let err = oracle
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Permanent { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cat_echoes_prompt() {
        let oracle = CommandOracle::new("cat");
        let completion = oracle
            .complete(&CompletionRequest::new("  import logging\n"))
            .await
            .unwrap();
        assert_eq!(completion.text, "import logging");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_prompt_through_streaming_command() {
        let prompt = "x".repeat(512 * 1024);
        let oracle = CommandOracle::new("cat");
        let completion = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            oracle.complete(&CompletionRequest::new(prompt.clone())),
        )
        .await
        .expect("command should not stall on a large prompt")
        .unwrap();
        assert_eq!(completion.text.len(), prompt.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_empty_completion() {
        let oracle =
            CommandOracle::new("sh").with_args(vec!["-c".into(), "cat >/dev/null".into()]);
        let completion = oracle
            .complete(&CompletionRequest::new("write an empty __init__.py"))
            .await
            .unwrap();
        assert_eq!(completion.text, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_transient() {
        let oracle = CommandOracle::new("sh").with_args(vec!["-c".into(), "cat >/dev/null; exit 3".into()]);
        let err = oracle
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("code 3"));
    }
}
