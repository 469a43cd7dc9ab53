use platform::audit::{AuditEventType, AuditLogger};
use platform::{correlation_span, record_counter, record_histogram};
use shared_types::{
    AgentOutput, AgentRole, Consensus, CoreError, CoreErrorKind, FinalResponse, IterationRecord,
    Query, TriggerKind, ValidationStatus, Vote,
};
use std::sync::Arc;
use std::time::Instant;

use crate::agent::{fallback_text, AgentRunner};
use crate::cache::{fingerprint, InflightLease, ResponseCache};
use crate::config::OrchestratorConfig;
use crate::human_loop::HumanLoopManager;
use crate::llm::LLMClient;
use crate::prompt::{PromptBuilder, PromptInput};
use crate::retrieval::RetrievalClient;
use crate::{language::LanguageDetector, safety::SafetyClassifier};

/// The query-lifecycle state machine (§4.7): sequences retrieval, the four
/// agent roles, the human-loop suspension protocol, and the cache around a
/// single `process_query` entrypoint.
pub struct Orchestrator {
    config: OrchestratorConfig,
    language_detector: LanguageDetector,
    safety_classifier: SafetyClassifier,
    prompts: PromptBuilder,
    generator: AgentRunner,
    verifier: AgentRunner,
    reformer: AgentRunner,
    translator: AgentRunner,
    retrieval: Arc<dyn RetrievalClient>,
    cache: Arc<ResponseCache>,
    human_loop: Arc<HumanLoopManager>,
    audit: Arc<AuditLogger>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        llm: Arc<dyn LLMClient>,
        retrieval: Arc<dyn RetrievalClient>,
        cache: Arc<ResponseCache>,
        human_loop: Arc<HumanLoopManager>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let prompts = PromptBuilder::new();
        let retry_policy = crate::agent::AgentRetryPolicy {
            max_attempts: config.max_retries,
            base_delay: std::time::Duration::from_millis(config.retry_base_delay_ms),
            multiplier: 2.0,
        };
        let completion_options = crate::llm::CompletionOptions {
            timeout: std::time::Duration::from_millis(config.llm_timeout_ms),
            max_tokens: config.llm_max_tokens,
        };

        let generator = AgentRunner::new(AgentRole::Generator, Arc::clone(&llm), prompts.clone())
            .with_retry_policy(retry_policy.clone())
            .with_completion_options(completion_options.clone());
        let verifier = AgentRunner::new(AgentRole::Verifier, Arc::clone(&llm), prompts.clone())
            .with_retry_policy(retry_policy.clone())
            .with_completion_options(completion_options.clone());
        let reformer = AgentRunner::new(AgentRole::Reformer, Arc::clone(&llm), prompts.clone())
            .with_retry_policy(retry_policy.clone())
            .with_completion_options(completion_options.clone());
        let translator = AgentRunner::new(AgentRole::Translator, Arc::clone(&llm), prompts.clone())
            .with_retry_policy(retry_policy)
            .with_completion_options(completion_options);

        Self {
            generator,
            verifier,
            reformer,
            translator,
            language_detector: LanguageDetector::new(),
            safety_classifier: SafetyClassifier::new(),
            prompts,
            retrieval,
            cache,
            human_loop,
            audit,
            config,
        }
    }

    pub fn prompt_builder(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn human_loop(&self) -> &Arc<HumanLoopManager> {
        &self.human_loop
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Drives a single query through the full pipeline (§4.7). `Cache hit`,
    /// `single-flight await`, and `fresh workflow` are the three possible
    /// shapes of this call.
    pub async fn process_query(&self, query: Query) -> Result<FinalResponse, CoreError> {
        validate_query(&query)?;

        let span = correlation_span(query.request_id, "process_query");
        let _enter = span.enter();
        let start = Instant::now();

        let fp = fingerprint(&query);

        match self.cache.acquire_inflight(&fp) {
            InflightLease::Await(mut rx) => {
                record_counter("cache_single_flight_await_total", 1);
                let outcome = match rx.recv().await {
                    Ok(Some(resp)) => Ok(resp),
                    _ => Err(CoreError::new(
                        CoreErrorKind::Internal,
                        "single-flight workflow produced no result",
                    )),
                };
                self.audit
                    .log_workflow_transition(
                        AuditEventType::CacheHit,
                        query.request_id.to_string(),
                        "query".to_string(),
                        if outcome.is_ok() { "hit" } else { "miss" }.to_string(),
                        None,
                    )
                    .await;
                return outcome;
            }
            InflightLease::Owner => {}
        }

        record_counter("workflow_started_total", 1);
        self.audit
            .log_workflow_transition(
                AuditEventType::WorkflowStarted,
                query.request_id.to_string(),
                "query".to_string(),
                "started".to_string(),
                None,
            )
            .await;

        let result = self.run_workflow(query.clone(), start).await;

        match &result {
            Ok(response) => self.cache.complete(&fp, response.clone()),
            Err(_) => self.cache.abandon(&fp),
        }

        record_counter("workflow_completed_total", 1);
        self.audit
            .log_workflow_transition(
                AuditEventType::WorkflowCompleted,
                query.request_id.to_string(),
                "query".to_string(),
                if result.is_ok() { "completed" } else { "failed" }.to_string(),
                None,
            )
            .await;
        result
    }

    async fn run_workflow(
        &self,
        query: Query,
        start: Instant,
    ) -> Result<FinalResponse, CoreError> {
        let detection = self.language_detector.detect(&query.text);
        let detected_language = detection.lang;
        let target_language = query.target_language.unwrap_or(detected_language);

        let safety_match = self.safety_classifier.classify(&query.text);

        // Safety classification runs before retrieval (§4.7) so a trigger is
        // known before any draft is generated; retrieval/generation still
        // proceed afterwards because the human reviewer needs a draft to see.
        let context = match self.retrieval.retrieve(&query.text).await {
            Ok(ctx) => ctx,
            Err(_) => shared_types::Context::default(),
        };

        let mut iterations: Vec<IterationRecord> = Vec::new();

        let gen_input = PromptInput {
            query: &query.text,
            context: &context.text,
            detected_language,
            previous_generator_output: None,
            previous_verifier_analysis: None,
            source_text: None,
            source_language: None,
        };
        let generator_out = self.generator.run(&gen_input).await;
        if generator_out.is_error() {
            self.audit
                .log_workflow_transition(
                    AuditEventType::AgentCallFailed,
                    query.request_id.to_string(),
                    "generator".to_string(),
                    format!("{:?}", generator_out.error),
                    None,
                )
                .await;
            return Ok(self.failed_response(detected_language, target_language, 0, start, "generator call failed"));
        }

        if let (Some(trigger), true) = (&safety_match, query.enable_human_loop) {
            return self
                .enter_human_loop(
                    &query,
                    trigger,
                    &generator_out,
                    detected_language,
                    target_language,
                    start,
                )
                .await;
        }

        let mut best_draft = generator_out.text.clone();
        let mut last_vote: Option<Vote> = None;
        let mut any_reform_yes = false;

        for iter in 1..=self.config.max_iterations {
            let verify_input = PromptInput {
                query: &query.text,
                context: &context.text,
                detected_language,
                previous_generator_output: Some(&best_draft),
                previous_verifier_analysis: None,
                source_text: None,
                source_language: None,
            };
            let verifier_out = self.verifier.run(&verify_input).await;
            let vote = if verifier_out.is_error() {
                Vote::Unknown
            } else {
                verifier_out.vote.unwrap_or(Vote::Unknown)
            };
            last_vote = Some(vote);

            let approve = vote == Vote::Yes
                && verifier_out.confidence >= self.config.verifier_approve_threshold;
            let reject = vote == Vote::No
                || verifier_out.confidence < self.config.verifier_reject_threshold;

            let mut reformer_out: Option<AgentOutput> = None;

            if approve {
                // A YES on iteration 1 approves the Generator's own draft; a
                // YES on any later iteration approves a Reformer-produced
                // draft, which the spec counts as REFORMED_APPROVED (§3, §4.7).
                let consensus = if iter > 1 {
                    Consensus::ReformedApproved
                } else {
                    Consensus::Approved
                };
                iterations.push(IterationRecord {
                    iteration_index: iter,
                    generator_out: Some(generator_out.clone()),
                    verifier_out: Some(verifier_out),
                    reformer_out: None,
                });
                return self
                    .finalize_with_consensus(
                        best_draft,
                        context.sources.clone(),
                        detected_language,
                        target_language,
                        iterations.len() as u32,
                        consensus,
                        start,
                    )
                    .await;
            }

            if reject && iter < self.config.max_iterations {
                let reform_input = PromptInput {
                    query: &query.text,
                    context: &context.text,
                    detected_language,
                    previous_generator_output: Some(&best_draft),
                    previous_verifier_analysis: Some(&verifier_out.text),
                    source_text: None,
                    source_language: None,
                };
                let reform_result = self.reformer.run(&reform_input).await;
                if !reform_result.is_error() {
                    best_draft = reform_result.text.clone();
                }
                reformer_out = Some(reform_result);

                iterations.push(IterationRecord {
                    iteration_index: iter,
                    generator_out: Some(generator_out.clone()),
                    verifier_out: Some(verifier_out),
                    reformer_out,
                });
                continue;
            }

            // UNKNOWN / middle-band or out of iterations: terminate here.
            if vote == Vote::Yes {
                any_reform_yes = any_reform_yes || iter > 1;
            }

            iterations.push(IterationRecord {
                iteration_index: iter,
                generator_out: Some(generator_out.clone()),
                verifier_out: Some(verifier_out),
                reformer_out,
            });
            break;
        }

        let iterations_used = iterations.len() as u32;
        let consensus = match last_vote {
            Some(Vote::Yes) if iterations_used > 1 => Consensus::ReformedApproved,
            Some(Vote::Yes) => Consensus::Approved,
            _ if any_reform_yes => Consensus::ReformedApproved,
            _ => Consensus::Fallback,
        };

        match consensus {
            Consensus::Fallback => Ok(self.fallback_response(
                detected_language,
                target_language,
                iterations_used,
                start,
                None,
            )),
            _ => {
                self.finalize_with_consensus(
                    best_draft,
                    context.sources.clone(),
                    detected_language,
                    target_language,
                    iterations_used,
                    consensus,
                    start,
                )
                .await
            }
        }
    }

    async fn enter_human_loop(
        &self,
        query: &Query,
        trigger: &shared_types::SafetyMatch,
        generator_out: &AgentOutput,
        detected_language: shared_types::Language,
        target_language: shared_types::Language,
        start: Instant,
    ) -> Result<FinalResponse, CoreError> {
        let fp = fingerprint(query);
        let validation = self.human_loop.create(
            fp,
            trigger.trigger_kind,
            trigger.priority,
            generator_out.text.clone(),
            detected_language,
            target_language,
        );
        record_counter("validation_created_total", 1);
        self.audit
            .log_workflow_transition(
                AuditEventType::ValidationCreated,
                query.request_id.to_string(),
                validation.id.to_string(),
                format!("{:?}", trigger.trigger_kind),
                None,
            )
            .await;

        Ok(FinalResponse {
            success: true,
            answer: String::new(),
            sources: vec![],
            detected_language,
            target_language,
            consensus: Consensus::PendingValidation,
            iterations_used: 1,
            processing_time_ms: start.elapsed().as_millis() as u64,
            validation_id: Some(validation.id),
            untranslated: false,
            error: None,
        })
    }

    /// §6.1 `submit_human_decision`: records a reviewer's decision and
    /// returns the updated request (§6.3's `POST /validation/{id}` response
    /// body is this value, unchanged).
    pub async fn submit_human_decision(
        &self,
        validation_id: shared_types::ValidationId,
        decision: shared_types::ValidationDecisionKind,
        modified_text: Option<String>,
        notes: Option<String>,
    ) -> Result<shared_types::ValidationRequest, CoreError> {
        record_counter("validation_resolved_total", 1);
        let result = self
            .human_loop
            .submit_decision(validation_id, decision, modified_text, notes)
            .map_err(|e| match e {
                crate::human_loop::SubmitDecisionError::NotFound => {
                    CoreError::new(CoreErrorKind::Internal, "validation id not found")
                }
                crate::human_loop::SubmitDecisionError::Conflict { current } => CoreError::new(
                    CoreErrorKind::Internal,
                    format!("validation already resolved as {current:?}"),
                ),
            });

        self.audit
            .log_workflow_transition(
                AuditEventType::ValidationResolved,
                validation_id.to_string(),
                "validation".to_string(),
                match &result {
                    Ok(r) => format!("{:?}", r.status),
                    Err(e) => format!("error: {}", e.message),
                },
                None,
            )
            .await;

        result
    }

    /// §6.1 `get_validation_queue`: pending requests ordered by
    /// `(priority desc, created_at asc)`, optionally filtered.
    pub fn get_validation_queue(
        &self,
        min_priority: Option<u8>,
    ) -> Vec<shared_types::ValidationRequest> {
        let pending = self.human_loop.get_pending();
        match min_priority {
            Some(min) => pending.into_iter().filter(|r| r.priority >= min).collect(),
            None => pending,
        }
    }

    /// §6.1 `get_validation_statistics`.
    pub fn get_validation_statistics(&self) -> shared_types::ValidationStatistics {
        self.human_loop.statistics()
    }

    /// §6.1 `health`: liveness of the orchestrator's internal components.
    /// The LLM/retrieval collaborators are only reported reachable in the
    /// trivial sense that this process holds a handle to them; a true
    /// liveness probe would require a round-trip call, which `health` must
    /// not perform since it is on the hot path for load balancer checks.
    pub fn health(&self) -> serde_json::Value {
        serde_json::json!({
            "components": {
                "orchestrator": "ok",
                "cache": { "status": "ok", "entries": self.cache.len() },
                "human_loop": self.human_loop.statistics(),
                "llm": "configured",
                "retrieval": "configured",
            }
        })
    }

    async fn finalize_with_consensus(
        &self,
        answer: String,
        sources: Vec<shared_types::RetrievedSource>,
        detected_language: shared_types::Language,
        target_language: shared_types::Language,
        iterations_used: u32,
        consensus: Consensus,
        start: Instant,
    ) -> Result<FinalResponse, CoreError> {
        let (final_answer, untranslated) = self
            .translate_if_needed(answer, detected_language, target_language)
            .await;

        record_histogram(
            "workflow_processing_time_seconds",
            start.elapsed().as_secs_f64(),
        );

        Ok(FinalResponse {
            success: true,
            answer: final_answer,
            sources,
            detected_language,
            target_language,
            consensus,
            iterations_used,
            processing_time_ms: start.elapsed().as_millis() as u64,
            validation_id: None,
            untranslated,
            error: None,
        })
    }

    /// Invokes the Translator exactly once when the caller's requested
    /// target differs from the detected language (§4.7). Translation
    /// failures downgrade to returning the source-language text with
    /// `untranslated = true` rather than failing the whole workflow.
    async fn translate_if_needed(
        &self,
        text: String,
        detected: shared_types::Language,
        target: shared_types::Language,
    ) -> (String, bool) {
        if target == detected {
            return (text, false);
        }

        let input = PromptInput {
            query: "",
            context: "",
            detected_language: target,
            previous_generator_output: None,
            previous_verifier_analysis: None,
            source_text: Some(&text),
            source_language: Some(detected),
        };
        let out = self.translator.run(&input).await;
        if out.is_error() || out.text.trim().is_empty() {
            (text, true)
        } else {
            (out.text, false)
        }
    }

    fn failed_response(
        &self,
        detected_language: shared_types::Language,
        target_language: shared_types::Language,
        iterations_used: u32,
        start: Instant,
        error: &str,
    ) -> FinalResponse {
        record_counter("workflow_failed_total", 1);
        FinalResponse {
            success: false,
            answer: String::new(),
            sources: vec![],
            detected_language,
            target_language,
            consensus: Consensus::Failed,
            iterations_used,
            processing_time_ms: start.elapsed().as_millis() as u64,
            validation_id: None,
            untranslated: false,
            error: Some(error.to_string()),
        }
    }

    fn fallback_response(
        &self,
        detected_language: shared_types::Language,
        target_language: shared_types::Language,
        iterations_used: u32,
        start: Instant,
        validation_id: Option<shared_types::ValidationId>,
    ) -> FinalResponse {
        self.fallback_response_inner(
            detected_language,
            target_language,
            iterations_used,
            start.elapsed().as_millis() as u64,
            validation_id,
            false,
            None,
        )
    }

    fn fallback_response_inner(
        &self,
        detected_language: shared_types::Language,
        target_language: shared_types::Language,
        iterations_used: u32,
        processing_time_ms: u64,
        validation_id: Option<shared_types::ValidationId>,
        expired: bool,
        error: Option<String>,
    ) -> FinalResponse {
        record_counter("workflow_fallback_total", 1);
        FinalResponse {
            success: true,
            answer: fallback_text(detected_language, expired),
            sources: vec![],
            detected_language,
            target_language,
            consensus: Consensus::Fallback,
            iterations_used,
            processing_time_ms,
            validation_id,
            untranslated: false,
            error,
        }
    }

    /// §6.1 follow-up fetch: once a pending validation has been resolved,
    /// builds the `FinalResponse` its decision implies (§4.6) — `APPROVED`
    /// uses the draft verbatim, `MODIFIED` substitutes the reviewer's text,
    /// `REJECTED`/`EXPIRED` both produce a `FALLBACK` safe-refusal. Returns
    /// `Ok(None)` while the validation is still `PENDING`.
    pub async fn get_validation_result(
        &self,
        validation_id: shared_types::ValidationId,
    ) -> Result<Option<FinalResponse>, CoreError> {
        let request = self
            .human_loop
            .get(validation_id)
            .ok_or_else(|| CoreError::new(CoreErrorKind::Internal, "validation id not found"))?;

        let start = Instant::now();

        let response = match request.status {
            ValidationStatus::Pending => return Ok(None),
            ValidationStatus::Approved => {
                self.finalize_with_consensus(
                    request.draft_response.clone(),
                    vec![],
                    request.detected_language,
                    request.target_language,
                    1,
                    Consensus::Approved,
                    start,
                )
                .await?
            }
            ValidationStatus::Modified => {
                let text = request
                    .modified_text
                    .clone()
                    .unwrap_or_else(|| request.draft_response.clone());
                self.finalize_with_consensus(
                    text,
                    vec![],
                    request.detected_language,
                    request.target_language,
                    1,
                    Consensus::Approved,
                    start,
                )
                .await?
            }
            ValidationStatus::Rejected => self.fallback_response_inner(
                request.detected_language,
                request.target_language,
                1,
                start.elapsed().as_millis() as u64,
                Some(validation_id),
                false,
                None,
            ),
            ValidationStatus::Expired => self.fallback_response_inner(
                request.detected_language,
                request.target_language,
                1,
                start.elapsed().as_millis() as u64,
                Some(validation_id),
                true,
                Some("HUMAN_LOOP_EXPIRED".to_string()),
            ),
        };

        // Only APPROVED/REFORMED_APPROVED are persisted (§4.5); `complete`
        // already no-ops the cache write for FALLBACK responses.
        self.cache.complete(&request.query_fingerprint, response.clone());

        Ok(Some(response))
    }
}

fn validate_query(query: &Query) -> Result<(), CoreError> {
    let len = query.text.chars().count();
    if !(10..=1000).contains(&len) {
        return Err(CoreError::new(
            CoreErrorKind::InputInvalid,
            format!("query text must be 10-1000 characters, got {len}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_double::ScriptedLlmClient;
    use crate::llm::{Completion, LlmError};
    use crate::retrieval::test_double::FixedRetrievalClient;
    use shared_types::{Language, RequestId};
    use std::time::Duration;

    fn base_query(text: &str, human_loop: bool) -> Query {
        Query {
            request_id: RequestId::new_v4(),
            text: text.to_string(),
            target_language: None,
            enable_human_loop: human_loop,
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations: 3,
            retry_base_delay_ms: 1,
            ..OrchestratorConfig::default()
        }
    }

    fn build_orchestrator(
        responses: Vec<Result<Completion, LlmError>>,
        retrieval_text: &str,
    ) -> Orchestrator {
        let llm = Arc::new(ScriptedLlmClient::new(responses));
        let retrieval: Arc<dyn RetrievalClient> = if retrieval_text.is_empty() {
            Arc::new(FixedRetrievalClient::empty())
        } else {
            Arc::new(FixedRetrievalClient::with_text(retrieval_text))
        };
        let cache = Arc::new(ResponseCache::new(3600));
        let human_loop = HumanLoopManager::new(Duration::from_secs(3600));
        let audit = Arc::new(platform::audit::AuditLogger::new());
        Orchestrator::new(fast_config(), llm, retrieval, cache, human_loop, audit)
    }

    #[tokio::test]
    async fn happy_path_approves_on_first_pass() {
        let orch = build_orchestrator(
            vec![
                Ok(Completion {
                    text: "- Paracetamol relieves pain.\n- Dose: 500mg.".into(),
                    self_confidence: Some(0.8),
                }),
                Ok(Completion {
                    text: "VOTE: YES\nAnalysis: grounded.".into(),
                    self_confidence: Some(0.85),
                }),
            ],
            "Paracetamol is an analgesic used for pain relief.",
        );

        let query = base_query("What is the mechanism of action of paracetamol?", true);
        let resp = orch.process_query(query).await.unwrap();

        assert_eq!(resp.consensus, Consensus::Approved);
        assert_eq!(resp.detected_language, Language::En);
        assert_eq!(resp.iterations_used, 1);
        assert!(resp.answer.contains("Paracetamol"));
    }

    #[tokio::test]
    async fn reformer_path_upgrades_to_reformed_approved() {
        let orch = build_orchestrator(
            vec![
                Ok(Completion {
                    text: "Paracetamol peut causer des effets secondaires.".into(),
                    self_confidence: Some(0.5),
                }),
                Ok(Completion {
                    text: "VOTE: NO\nAnalysis: insufficient detail.".into(),
                    self_confidence: Some(0.2),
                }),
                Ok(Completion {
                    text: "- Effets secondaires: nausées, éruptions cutanées.".into(),
                    self_confidence: Some(0.6),
                }),
                Ok(Completion {
                    text: "VOTE: YES\nAnalysis: now well supported.".into(),
                    self_confidence: Some(0.78),
                }),
            ],
            "Le paracétamol peut provoquer des nausées et des éruptions cutanées.",
        );

        let query = base_query(
            "Quels sont les effets secondaires du paracétamol ?",
            false,
        );
        let resp = orch.process_query(query).await.unwrap();

        assert_eq!(resp.consensus, Consensus::ReformedApproved);
        assert_eq!(resp.detected_language, Language::Fr);
        assert_eq!(resp.iterations_used, 2);
    }

    #[tokio::test]
    async fn safety_trigger_forces_human_loop_with_pending_validation() {
        let orch = build_orchestrator(
            vec![Ok(Completion {
                text: "Draft answer about lethal dosage.".into(),
                self_confidence: Some(0.6),
            })],
            "context about dosage",
        );

        let query = base_query("What is the lethal dose of paracetamol for a child?", true);
        let resp = orch.process_query(query).await.unwrap();

        assert_eq!(resp.consensus, Consensus::PendingValidation);
        assert!(resp.validation_id.is_some());

        let pending = orch.human_loop().get_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].trigger_kind, TriggerKind::SafetyReview);
    }

    #[tokio::test]
    async fn empty_retrieval_context_yields_approved_uncertainty_answer() {
        let orch = build_orchestrator(
            vec![
                Ok(Completion {
                    text: "I cannot find this information in the provided sources.".into(),
                    self_confidence: Some(0.1),
                }),
                Ok(Completion {
                    text: "VOTE: YES\nAnalysis: correctly acknowledges missing context.".into(),
                    self_confidence: Some(0.9),
                }),
            ],
            "",
        );

        let query = base_query("What is the weather today in Paris?", true);
        let resp = orch.process_query(query).await.unwrap();

        assert_eq!(resp.consensus, Consensus::Approved);
        assert!(resp.sources.is_empty());
        assert_eq!(resp.iterations_used, 1);
    }

    #[tokio::test]
    async fn transport_failure_then_recovery_still_succeeds() {
        let orch = build_orchestrator(
            vec![
                Err(LlmError::Transport("flaky".into())),
                Err(LlmError::Transport("flaky again".into())),
                Ok(Completion {
                    text: "- Ibuprofen is an NSAID.".into(),
                    self_confidence: Some(0.75),
                }),
                Ok(Completion {
                    text: "VOTE: YES\nAnalysis: supported.".into(),
                    self_confidence: Some(0.8),
                }),
            ],
            "Ibuprofen is a nonsteroidal anti-inflammatory drug.",
        );

        let query = base_query("What class of drug is ibuprofen?", true);
        let resp = orch.process_query(query).await.unwrap();
        assert_eq!(resp.consensus, Consensus::Approved);
        assert_eq!(resp.iterations_used, 1);
    }

    #[tokio::test]
    async fn rejects_queries_outside_length_bounds() {
        let orch = build_orchestrator(vec![], "");
        let short = base_query("hi", true);
        let err = orch.process_query(short).await.unwrap_err();
        assert_eq!(err.kind, CoreErrorKind::InputInvalid);
    }

    #[tokio::test]
    async fn submit_human_decision_resolves_pending_validation() {
        let orch = build_orchestrator(
            vec![Ok(Completion {
                text: "Draft answer about lethal dosage.".into(),
                self_confidence: Some(0.6),
            })],
            "context about dosage",
        );

        let query = base_query("What is the lethal dose of paracetamol for a child?", true);
        let resp = orch.process_query(query).await.unwrap();
        let validation_id = resp.validation_id.unwrap();

        let updated = orch
            .submit_human_decision(
                validation_id,
                shared_types::ValidationDecisionKind::Approved,
                None,
                Some("reviewed by Dr. Lefèvre".into()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ValidationStatus::Approved);
        assert!(orch.get_validation_queue(None).is_empty());
    }

    #[test]
    fn health_reports_all_components() {
        let orch = build_orchestrator(vec![], "");
        let health = orch.health();
        let components = &health["components"];
        assert_eq!(components["orchestrator"], "ok");
        assert!(components["cache"]["entries"].is_number());
    }
}
