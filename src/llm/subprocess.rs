//! Production [`LlmClient`] that shells out to a CLI discovered on `PATH`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

use super::{LlmClient, LlmRequest, LlmResponse};

/// Invokes an LLM CLI by argv: `<cli> --print --model <model>`, with the
/// user message on stdin, per §6. The system prompt is sent as a leading
/// `--system` flag since most "thin CLI wrapper" tools accept one.
pub struct SubprocessLlmClient {
    /// Executable name or path, resolved against `PATH` by the OS.
    cli_path: String,
}

impl SubprocessLlmClient {
    /// Builds a client that invokes `cli_path` (e.g. `"claude"`).
    #[must_use]
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }
}

#[async_trait]
impl LlmClient for SubprocessLlmClient {
    async fn run(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut child = Command::new(&self.cli_path)
            .arg("--print")
            .arg("--model")
            .arg(&request.model)
            .arg("--system")
            .arg(&request.system)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::ExternalToolMissing(format!(
                        "LLM CLI '{}' not found on PATH: {err}",
                        self.cli_path
                    ))
                } else {
                    Error::ExternalToolFailed(format!("failed to spawn '{}': {err}", self.cli_path))
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.user.as_bytes())
                .await
                .map_err(|err| Error::ExternalToolFailed(format!("writing to stdin: {err}")))?;
        }

        let output = tokio::time::timeout(request.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(request.timeout))?
            .map_err(|err| Error::ExternalToolFailed(format!("waiting on subprocess: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalToolFailed(format!(
                "'{}' exited with {}: {stderr}",
                self.cli_path, output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let (input_tokens, output_tokens) = estimate_tokens(&request.system, &request.user, &text);
        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

/// A crude but deterministic token estimate (`chars / 4`) used when the CLI
/// doesn't itself report usage. Real usage, when the CLI prints it, should
/// be parsed by the caller from the response body instead.
fn estimate_tokens(system: &str, user: &str, response: &str) -> (u64, u64) {
    let input = ((system.len() + user.len()) / 4) as u64;
    let output = (response.len() / 4) as u64;
    (input, output)
}

/// Strips a leading/trailing markdown code fence (``` or ```json) from a
/// response body, tolerating the fence the way the synthesis and
/// entity-extraction response parsers must per §4.6/§6.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches('\n');
    after_open.strip_suffix("```").map_or(after_open, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_fence() {
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn strips_json_language_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn passes_through_unfenced_text() {
        assert_eq!(strip_code_fence("plain text"), "plain text");
    }

    #[tokio::test]
    async fn missing_cli_reports_external_tool_missing() {
        let client = SubprocessLlmClient::new("definitely-not-a-real-cli-binary");
        let request = LlmRequest {
            system: "sys".into(),
            user: "hello".into(),
            model: "claude-haiku-4".into(),
            timeout: std::time::Duration::from_secs(5),
        };
        let err = client.run(&request).await.unwrap_err();
        assert!(matches!(err, Error::ExternalToolMissing(_)));
    }
}
