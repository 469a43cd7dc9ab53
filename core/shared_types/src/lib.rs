use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type RequestId = Uuid;
pub type ValidationId = Uuid;

/// Languages the pipeline can detect and answer in. Fixed set; requests naming
/// anything else are rejected with `CoreError::InputInvalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "ES")]
    Es,
    #[serde(rename = "DE")]
    De,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "EN" => Some(Language::En),
            "FR" => Some(Language::Fr),
            "ES" => Some(Language::Es),
            "DE" => Some(Language::De),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Fr => "FR",
            Language::Es => "ES",
            Language::De => "DE",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

fn default_enable_human_loop() -> bool {
    true
}

/// Inbound request to answer a medical question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub request_id: RequestId,
    pub text: String,
    pub target_language: Option<Language>,
    #[serde(default = "default_enable_human_loop")]
    pub enable_human_loop: bool,
}

/// A single retrieved source backing the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub doc_id: String,
    pub excerpt: String,
    pub similarity: f32,
}

/// Grounding context returned by the retrieval collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Context {
    pub text: String,
    pub sources: Vec<RetrievedSource>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Role a given `AgentRunner` fulfills in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    Generator,
    Verifier,
    Reformer,
    Translator,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRole::Generator => "generator",
            AgentRole::Verifier => "verifier",
            AgentRole::Reformer => "reformer",
            AgentRole::Translator => "translator",
        };
        write!(f, "{}", s)
    }
}

/// Strict vote parsed from a Verifier response. `Unknown` is reserved for
/// parser failure, never a model choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Yes,
    No,
    Unknown,
}

/// Closed set of failure kinds an `AgentRunner` invocation can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    InputInvalid,
    LlmTransport,
    OutputParse,
    Timeout,
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentErrorKind::InputInvalid => "input_invalid",
            AgentErrorKind::LlmTransport => "llm_transport",
            AgentErrorKind::OutputParse => "output_parse",
            AgentErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Result of one `AgentRunner::run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub role: AgentRole,
    pub text: String,
    pub confidence: f32,
    pub vote: Option<Vote>,
    pub latency_ms: u64,
    pub error: Option<AgentErrorKind>,
}

impl AgentOutput {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One pass through the generate/verify(/reform) loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration_index: u32,
    pub generator_out: Option<AgentOutput>,
    pub verifier_out: Option<AgentOutput>,
    pub reformer_out: Option<AgentOutput>,
}

/// Fixed safety-trigger taxonomy, highest priority wins on a tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    SafetyReview,
    MedicalApproval,
    RegulatoryCompliance,
    CriticalDecision,
    QualityAssurance,
}

impl TriggerKind {
    /// Fixed priority per the taxonomy; higher wins ties among simultaneous matches.
    pub fn priority(&self) -> u8 {
        match self {
            TriggerKind::SafetyReview => 5,
            TriggerKind::CriticalDecision => 5,
            TriggerKind::RegulatoryCompliance => 4,
            TriggerKind::MedicalApproval => 3,
            TriggerKind::QualityAssurance => 2,
        }
    }
}

/// Outcome of a matched `SafetyClassifier` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyMatch {
    pub trigger_kind: TriggerKind,
    pub priority: u8,
    pub matched_terms: Vec<String>,
}

/// State machine for a pending human decision. `Expired` and the three
/// decision states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
    Expired,
}

impl ValidationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationStatus::Pending)
    }
}

/// Decision a human reviewer submits for a pending validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationDecisionKind {
    Approved,
    Rejected,
    Modified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDecisionRequest {
    pub decision: ValidationDecisionKind,
    pub modified_text: Option<String>,
    pub notes: Option<String>,
}

/// A query awaiting human sign-off before it can be finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: ValidationId,
    pub query_fingerprint: String,
    pub trigger_kind: TriggerKind,
    pub priority: u8,
    pub draft_response: String,
    pub detected_language: Language,
    pub target_language: Language,
    pub created_at_epoch_ms: u64,
    pub expires_at_epoch_ms: u64,
    pub status: ValidationStatus,
    pub decision: Option<ValidationDecisionKind>,
    pub modified_text: Option<String>,
    pub reviewer_notes: Option<String>,
}

/// Aggregate counters describing the human-loop queue's health.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationStatistics {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub expired: usize,
    pub avg_wait_ms: u64,
}

/// Terminal verdict of a completed workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consensus {
    Approved,
    ReformedApproved,
    PendingValidation,
    Fallback,
    Failed,
}

/// Closed error taxonomy surfaced at the orchestrator boundary (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreErrorKind {
    InputInvalid,
    RetrievalUnavailable,
    LlmTransport,
    OutputParse,
    Timeout,
    HumanLoopExpired,
    Internal,
}

impl fmt::Display for CoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error raised by the orchestrator at its public boundary. Recoverable
/// conditions never reach this type; see `FinalResponse.error` for those.
#[derive(Debug, thiserror::Error, Clone, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Final envelope for a completed (or terminally-failed) workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<RetrievedSource>,
    pub detected_language: Language,
    pub target_language: Language,
    pub consensus: Consensus,
    pub iterations_used: u32,
    pub processing_time_ms: u64,
    pub validation_id: Option<ValidationId>,
    pub untranslated: bool,
    pub error: Option<String>,
}

/// Memoized response kept by the cache, paired with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub response: FinalResponse,
    pub expires_at_epoch_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_through_code() {
        for code in ["EN", "FR", "ES", "DE"] {
            let lang = Language::from_code(code).unwrap();
            assert_eq!(lang.code(), code);
        }
        assert!(Language::from_code("ZZ").is_none());
    }

    #[test]
    fn query_defaults_enable_human_loop_when_omitted() {
        let json = serde_json::json!({
            "request_id": Uuid::new_v4(),
            "text": "What is paracetamol?",
            "target_language": null,
        });
        let q: Query = serde_json::from_value(json).unwrap();
        assert!(q.enable_human_loop);
    }

    #[test]
    fn trigger_kind_priority_matches_taxonomy() {
        assert_eq!(TriggerKind::SafetyReview.priority(), 5);
        assert_eq!(TriggerKind::CriticalDecision.priority(), 5);
        assert_eq!(TriggerKind::QualityAssurance.priority(), 2);
    }

    #[test]
    fn final_response_serializes_consensus_as_screaming_snake_case() {
        let resp = FinalResponse {
            success: true,
            answer: "ok".into(),
            sources: vec![],
            detected_language: Language::En,
            target_language: Language::En,
            consensus: Consensus::ReformedApproved,
            iterations_used: 2,
            processing_time_ms: 10,
            validation_id: None,
            untranslated: false,
            error: None,
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["consensus"], "REFORMED_APPROVED");
    }

    #[test]
    fn core_error_display_includes_kind_and_message() {
        let err = CoreError::new(CoreErrorKind::Timeout, "generator call exceeded deadline");
        let rendered = err.to_string();
        assert!(rendered.contains("Timeout"));
        assert!(rendered.contains("exceeded deadline"));
    }
}
