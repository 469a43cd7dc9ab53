use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Options accompanying a single completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_tokens: 1024,
        }
    }
}

/// Result of a successful completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub self_confidence: Option<f32>,
}

/// Transport-level failure from an `LLMClient`. The `AgentRunner` maps this
/// onto `AgentErrorKind` for callers; it never reaches the orchestrator
/// boundary directly.
#[derive(Debug, Clone)]
pub enum LlmError {
    Timeout,
    Transport(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Timeout => write!(f, "llm call timed out"),
            LlmError::Transport(msg) => write!(f, "llm transport error: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

/// Abstract collaborator fronting whichever LLM provider backs a deployment.
/// The core treats every implementor as fallible and possibly slow; retry
/// and backoff live in `AgentRunner`, not here.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;
}

#[cfg(test)]
pub mod test_double {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted `LLMClient` for orchestrator/agent tests: returns queued
    /// responses in order and counts how many times it was called.
    pub struct ScriptedLlmClient {
        responses: Mutex<Vec<Result<Completion, LlmError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlmClient {
        pub fn new(responses: Vec<Result<Completion, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedLlmClient {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<Completion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Transport("no scripted response left".into()));
            }
            responses.remove(0)
        }
    }
}
