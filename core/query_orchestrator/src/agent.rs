use platform::{record_counter, record_histogram};
use shared_types::{AgentErrorKind, AgentOutput, AgentRole, Language, Vote};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::llm::{CompletionOptions, LLMClient, LlmError};
use crate::prompt::{PromptBuilder, PromptInput};

/// Retry policy applied to transient `LLM_TRANSPORT`/`TIMEOUT` failures.
/// `OUTPUT_PARSE` is never retried here (§4.4): the prompt is deterministic,
/// reissuing the same call rarely helps.
#[derive(Debug, Clone)]
pub struct AgentRetryPolicy {
    pub max_attempts: u8,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for AgentRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

/// Exponential backoff with +/-20% jitter, per §4.4. `attempt` is 1-based
/// (the first retry, not the first call).
fn compute_backoff(policy: &AgentRetryPolicy, attempt: u32, jitter_unit: f64) -> Duration {
    let exp = attempt.saturating_sub(1);
    let factor = policy.multiplier.powi(exp as i32);
    let base_ms = (policy.base_delay.as_millis() as f64) * factor;

    // jitter_unit is expected in [-1.0, 1.0]; caller supplies randomness so
    // this function stays a deterministic, testable pure helper.
    let jitter = 1.0 + 0.2 * jitter_unit.clamp(-1.0, 1.0);
    Duration::from_millis((base_ms * jitter).max(0.0) as u64)
}

fn jitter_sample() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    // Map to [-1.0, 1.0] deterministically from the low bits of the clock.
    ((nanos % 2000) as f64 / 1000.0) - 1.0
}

/// Per-role wrapper around `LLMClient`: builds the prompt, calls the model
/// with retry/backoff, and maps transport/parse failures onto `AgentErrorKind`.
pub struct AgentRunner {
    role: AgentRole,
    llm: Arc<dyn LLMClient>,
    prompts: PromptBuilder,
    retry_policy: AgentRetryPolicy,
    completion_options: CompletionOptions,
}

/// Generator-specific sentinel the Verifier is expected to approve.
pub const UNCERTAINTY_MARKERS: &[(Language, &str)] = &[
    (Language::En, "I cannot find this information in the provided sources"),
    (Language::Fr, "Je ne trouve pas cette information dans les sources fournies"),
    (Language::Es, "No puedo encontrar esta información en las fuentes proporcionadas"),
    (Language::De, "Ich kann diese Information in den bereitgestellten Quellen nicht finden"),
];

pub fn uncertainty_text(lang: Language) -> &'static str {
    UNCERTAINTY_MARKERS
        .iter()
        .find(|(l, _)| *l == lang)
        .map(|(_, text)| *text)
        .unwrap_or(UNCERTAINTY_MARKERS[0].1)
}

pub fn is_uncertainty_answer(text: &str) -> bool {
    UNCERTAINTY_MARKERS
        .iter()
        .any(|(_, marker)| text.contains(marker))
}

/// Safe-refusal text shown on `FALLBACK` responses (§4.6).
pub fn fallback_text(lang: Language, expired: bool) -> String {
    let base = match lang {
        Language::En => "I cannot safely answer without further review",
        Language::Fr => "Je ne peux pas répondre en toute sécurité sans un examen complémentaire",
        Language::Es => "No puedo responder con seguridad sin una revisión adicional",
        Language::De => "Ich kann ohne weitere Überprüfung nicht sicher antworten",
    };
    if expired {
        let expiry_suffix = match lang {
            Language::En => " (validation window expired)",
            Language::Fr => " (délai de validation expiré)",
            Language::Es => " (ventana de validación expirada)",
            Language::De => " (Prüffrist abgelaufen)",
        };
        format!("{base}{expiry_suffix}")
    } else {
        base.to_string()
    }
}

impl AgentRunner {
    pub fn new(role: AgentRole, llm: Arc<dyn LLMClient>, prompts: PromptBuilder) -> Self {
        Self {
            role,
            llm,
            prompts,
            retry_policy: AgentRetryPolicy::default(),
            completion_options: CompletionOptions::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: AgentRetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_completion_options(mut self, options: CompletionOptions) -> Self {
        self.completion_options = options;
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Runs this agent's role contract over `input`, retrying transient
    /// transport/timeout failures with exponential backoff.
    pub async fn run(&self, input: &PromptInput<'_>) -> AgentOutput {
        let start = Instant::now();
        let prompt = self.prompts.build(self.role, input);

        let mut attempt: u32 = 1;
        let completion = loop {
            let call_start = Instant::now();
            let result = self.llm.complete(&prompt, &self.completion_options).await;
            let call_secs = call_start.elapsed().as_secs_f64();
            record_histogram("agent_call_duration_seconds", call_secs);

            match result {
                Ok(completion) => break Ok(completion),
                Err(err) => {
                    record_counter("agent_call_failures_total", 1);
                    if attempt >= self.retry_policy.max_attempts as u32 {
                        break Err(err);
                    }
                    let delay = compute_backoff(&self.retry_policy, attempt, jitter_sample());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        let completion = match completion {
            Ok(c) => c,
            Err(err) => {
                let kind = match err {
                    LlmError::Timeout => AgentErrorKind::Timeout,
                    LlmError::Transport(_) => AgentErrorKind::LlmTransport,
                };
                return AgentOutput {
                    role: self.role,
                    text: String::new(),
                    confidence: 0.0,
                    vote: if self.role == AgentRole::Verifier {
                        Some(Vote::Unknown)
                    } else {
                        None
                    },
                    latency_ms,
                    error: Some(kind),
                };
            }
        };

        match self.role {
            AgentRole::Verifier => self.parse_verifier_output(completion, latency_ms),
            _ => AgentOutput {
                role: self.role,
                confidence: self.estimate_confidence(&completion, input),
                text: completion.text,
                vote: None,
                latency_ms,
                error: None,
            },
        }
    }

    /// Self-reported confidence when present; otherwise falls back to the
    /// best retrieval similarity in context, per §4.4's Generator contract.
    fn estimate_confidence(
        &self,
        completion: &crate::llm::Completion,
        input: &PromptInput<'_>,
    ) -> f32 {
        if self.role == AgentRole::Generator && is_uncertainty_answer(&completion.text) {
            return completion.self_confidence.unwrap_or(0.2).min(0.3);
        }

        if let Some(conf) = completion.self_confidence {
            return conf.clamp(0.0, 1.0);
        }

        if self.role == AgentRole::Generator {
            let best_similarity = input
                .context
                .lines()
                .next()
                .is_some()
                .then_some(0.5)
                .unwrap_or(0.3);
            return best_similarity;
        }

        0.5
    }

    /// Strict Verifier output parser (§4.4): missing or malformed vote maps
    /// to `UNKNOWN` with `confidence = 0.0` and an `OUTPUT_PARSE` error.
    fn parse_verifier_output(
        &self,
        completion: crate::llm::Completion,
        latency_ms: u64,
    ) -> AgentOutput {
        let normalized = completion.text.to_uppercase();
        let vote = if normalized.contains("VOTE: YES") || normalized.trim_start().starts_with("YES") {
            Some(Vote::Yes)
        } else if normalized.contains("VOTE: NO") || normalized.trim_start().starts_with("NO") {
            Some(Vote::No)
        } else {
            None
        };

        match vote {
            Some(vote) => AgentOutput {
                role: self.role,
                text: completion.text,
                confidence: completion.self_confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                vote: Some(vote),
                latency_ms,
                error: None,
            },
            None => AgentOutput {
                role: self.role,
                text: completion.text,
                confidence: 0.0,
                vote: Some(Vote::Unknown),
                latency_ms,
                error: Some(AgentErrorKind::OutputParse),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_double::ScriptedLlmClient;
    use crate::llm::Completion;
    use crate::prompt::PromptBuilder;

    fn input<'a>(query: &'a str, context: &'a str) -> PromptInput<'a> {
        PromptInput {
            query,
            context,
            detected_language: Language::En,
            previous_generator_output: None,
            previous_verifier_analysis: None,
            source_text: None,
            source_language: None,
        }
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter_band() {
        let policy = AgentRetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
        };
        let no_jitter = compute_backoff(&policy, 1, 0.0);
        assert_eq!(no_jitter, Duration::from_millis(1000));
        let no_jitter_2 = compute_backoff(&policy, 2, 0.0);
        assert_eq!(no_jitter_2, Duration::from_millis(2000));

        let max_jitter = compute_backoff(&policy, 1, 1.0);
        assert_eq!(max_jitter, Duration::from_millis(1200));
        let min_jitter = compute_backoff(&policy, 1, -1.0);
        assert_eq!(min_jitter, Duration::from_millis(800));
    }

    #[tokio::test]
    async fn retries_transport_errors_then_succeeds() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Transport("boom".into())),
            Err(LlmError::Transport("boom again".into())),
            Ok(Completion {
                text: "- Paracetamol relieves pain.".into(),
                self_confidence: Some(0.8),
            }),
        ]));
        let builder = PromptBuilder::new();
        let runner = AgentRunner::new(AgentRole::Generator, client.clone(), builder)
            .with_retry_policy(AgentRetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                multiplier: 1.0,
            });

        let out = runner.run(&input("What is paracetamol?", "ctx")).await;
        assert!(!out.is_error());
        assert_eq!(client.call_count(), 3);
        assert_eq!(out.confidence, 0.8);
    }

    #[tokio::test]
    async fn surfaces_transport_error_after_exhausting_retries() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Transport("a".into())),
            Err(LlmError::Transport("b".into())),
            Err(LlmError::Transport("c".into())),
        ]));
        let builder = PromptBuilder::new();
        let runner = AgentRunner::new(AgentRole::Generator, client.clone(), builder)
            .with_retry_policy(AgentRetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                multiplier: 1.0,
            });

        let out = runner.run(&input("q", "ctx")).await;
        assert_eq!(out.error, Some(AgentErrorKind::LlmTransport));
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn verifier_strict_parse_yes() {
        let client = Arc::new(ScriptedLlmClient::new(vec![Ok(Completion {
            text: "VOTE: YES\nAnalysis: fully supported.".into(),
            self_confidence: Some(0.9),
        })]));
        let builder = PromptBuilder::new();
        let runner = AgentRunner::new(AgentRole::Verifier, client, builder);
        let out = runner.run(&input("q", "ctx")).await;
        assert_eq!(out.vote, Some(Vote::Yes));
        assert_eq!(out.confidence, 0.9);
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn verifier_malformed_vote_maps_to_unknown_without_retry() {
        let client = Arc::new(ScriptedLlmClient::new(vec![Ok(Completion {
            text: "Maybe? Hard to tell.".into(),
            self_confidence: Some(0.9),
        })]));
        let builder = PromptBuilder::new();
        let runner = AgentRunner::new(AgentRole::Verifier, client.clone(), builder);
        let out = runner.run(&input("q", "ctx")).await;
        assert_eq!(out.vote, Some(Vote::Unknown));
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.error, Some(AgentErrorKind::OutputParse));
        // Parse failures are not retried (§4.4): exactly one call was made.
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn uncertainty_text_is_language_specific() {
        assert!(uncertainty_text(Language::Fr).starts_with("Je ne trouve pas"));
        assert!(is_uncertainty_answer(
            "- Je ne trouve pas cette information dans les sources fournies."
        ));
    }
}
