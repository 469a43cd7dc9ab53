use async_trait::async_trait;
use shared_types::Context;
use std::fmt;

/// Transport-level failure from a `RetrievalClient`. Orchestrator treats
/// this as recoverable: it downgrades to an empty `Context` rather than
/// failing the workflow.
#[derive(Debug, Clone)]
pub struct RetrievalError(pub String);

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retrieval unavailable: {}", self.0)
    }
}

impl std::error::Error for RetrievalError {}

/// Abstract collaborator fronting document ingestion/embedding/vector
/// search. The core only ever calls `retrieve`.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Context, RetrievalError>;
}

#[cfg(test)]
pub mod test_double {
    use super::*;

    /// Fixed-response `RetrievalClient` for tests.
    pub struct FixedRetrievalClient {
        pub context: Context,
    }

    impl FixedRetrievalClient {
        pub fn empty() -> Self {
            Self {
                context: Context::default(),
            }
        }

        pub fn with_text(text: impl Into<String>) -> Self {
            Self {
                context: Context {
                    text: text.into(),
                    sources: vec![],
                },
            }
        }
    }

    #[async_trait]
    impl RetrievalClient for FixedRetrievalClient {
        async fn retrieve(&self, _query: &str) -> Result<Context, RetrievalError> {
            Ok(self.context.clone())
        }
    }
}
