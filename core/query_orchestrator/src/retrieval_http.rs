use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use shared_types::{Context, RetrievedSource};
use std::time::Duration;

use crate::retrieval::{RetrievalClient, RetrievalError};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
});

/// `RetrievalClient` fronting the external vector-search service (§8
/// Non-goals: this crate does not ingest, chunk, embed, or index documents,
/// it only calls `POST {base_url}/retrieve`).
pub struct HttpRetrievalClient {
    base_url: String,
}

impl HttpRetrievalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct RetrieveResponse {
    context_text: String,
    #[serde(default)]
    sources: Vec<RetrievedSource>,
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn retrieve(&self, query: &str) -> Result<Context, RetrievalError> {
        let url = format!("{}/retrieve", self.base_url.trim_end_matches('/'));

        let response = HTTP_CLIENT
            .post(&url)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| RetrievalError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError(format!("{status}: {text}")));
        }

        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError(format!("malformed retrieval body: {e}")))?;

        Ok(Context {
            text: parsed.context_text,
            sources: parsed.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_base_url() {
        let client = HttpRetrievalClient::new("http://localhost:8484");
        assert_eq!(client.base_url, "http://localhost:8484");
    }
}
