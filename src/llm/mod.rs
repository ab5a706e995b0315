//! The LLM subprocess capability (design notes: "optional LLM path").
//!
//! The core never talks to a model provider's API directly. Every LLM
//! interaction — entity extraction (C6), topic-label proposals (C10), and
//! wiki synthesis (C13) — goes through a single narrow capability trait,
//! [`LlmClient`], so a fake can be substituted in tests per the design
//! notes. The real implementation shells out to a CLI discovered on
//! `PATH` (§6): `--print`, a model flag, a prompt on stdin, markdown or
//! JSON on stdout.

mod pricing;
mod subprocess;

pub use pricing::{ModelPricing, estimate_cost_usd, resolve_model_shorthand};
pub use subprocess::{SubprocessLlmClient, strip_code_fence};

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// One request to the LLM subprocess: a system prompt, a user message, the
/// resolved model id, and a per-call timeout.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// System-level instructions (output format rules, privacy section, …).
    pub system: String,
    /// The user-facing prompt (sources, document content, …).
    pub user: String,
    /// Resolved model id (already passed through [`resolve_model_shorthand`]).
    pub model: String,
    /// Per-call budget; the subprocess is killed if it runs longer.
    pub timeout: Duration,
}

/// The text and token accounting returned by one LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// Raw response text (markdown for synthesis, JSON for entity extraction).
    pub text: String,
    /// Tokens attributed to the request side.
    pub input_tokens: u64,
    /// Tokens attributed to the response side.
    pub output_tokens: u64,
}

/// The single seam between the core and an external model provider.
///
/// Implementations: [`SubprocessLlmClient`] for production, and a
/// hand-rolled fake in each caller's test module (per the design notes'
/// "all tests for the LLM-driven paths must mock this capability").
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one request to completion and returns its text plus token
    /// accounting.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::ExternalToolMissing`] if the CLI isn't on `PATH`.
    /// - [`crate::Error::ExternalToolFailed`] if it exits non-zero or its
    ///   output can't be parsed.
    /// - [`crate::Error::Timeout`] if it exceeds `request.timeout`.
    async fn run(&self, request: &LlmRequest) -> Result<LlmResponse>;
}
