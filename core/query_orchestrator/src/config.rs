use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

fn default_max_iterations() -> u32 {
    3
}
fn default_approve_threshold() -> f32 {
    0.7
}
fn default_reject_threshold() -> f32 {
    0.3
}
fn default_max_retries() -> u8 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_cache_ttl_s() -> u64 {
    3600
}
fn default_human_loop_timeout_s() -> u64 {
    3600
}
fn default_workflow_timeout_ms() -> u64 {
    120_000
}
fn default_enable_human_loop() -> bool {
    true
}
fn default_llm_timeout_ms() -> u64 {
    30_000
}
fn default_llm_max_tokens() -> u32 {
    1024
}
fn default_bind_addr() -> String {
    "127.0.0.1:8383".to_string()
}
fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_api_key() -> String {
    String::new()
}
fn default_retrieval_base_url() -> String {
    "http://localhost:8484".to_string()
}

/// Recognized configuration options (§6.4). Loaded from TOML with
/// `{{VAR}}`/`${VAR}` environment interpolation, then overlaid per-`APP_ENV`,
/// mirroring the teacher's two-file base+overlay config loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_approve_threshold")]
    pub verifier_approve_threshold: f32,
    #[serde(default = "default_reject_threshold")]
    pub verifier_reject_threshold: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_cache_ttl_s")]
    pub cache_ttl_s: u64,
    #[serde(default = "default_human_loop_timeout_s")]
    pub human_loop_timeout_s: u64,
    #[serde(default = "default_workflow_timeout_ms")]
    pub workflow_timeout_ms: u64,
    #[serde(default = "default_enable_human_loop")]
    pub enable_human_loop_default: bool,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base URL of the OpenAI-compatible chat completions endpoint backing
    /// all four agent roles.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Bearer token for the LLM endpoint; typically supplied via
    /// `{{LLM_API_KEY}}` interpolation rather than committed to the file.
    #[serde(default = "default_llm_api_key")]
    pub llm_api_key: String,
    /// Base URL of the external retrieval service's `retrieve` endpoint
    /// (§8 Non-goals: ingestion/embedding/vector-search live behind this
    /// boundary, not in this crate).
    #[serde(default = "default_retrieval_base_url")]
    pub retrieval_base_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            verifier_approve_threshold: default_approve_threshold(),
            verifier_reject_threshold: default_reject_threshold(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            cache_ttl_s: default_cache_ttl_s(),
            human_loop_timeout_s: default_human_loop_timeout_s(),
            workflow_timeout_ms: default_workflow_timeout_ms(),
            enable_human_loop_default: default_enable_human_loop(),
            llm_timeout_ms: default_llm_timeout_ms(),
            llm_max_tokens: default_llm_max_tokens(),
            bind_addr: default_bind_addr(),
            llm_base_url: default_llm_base_url(),
            llm_model: default_llm_model(),
            llm_api_key: default_llm_api_key(),
            retrieval_base_url: default_retrieval_base_url(),
        }
    }
}

/// Load a single TOML config file, interpolating `{{VAR}}`/`${VAR}` from the
/// process environment before parsing.
pub fn load_single_config(path: &str) -> Result<OrchestratorConfig, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let re = Regex::new(r"(\{\{|\$\{)([a-zA-Z0-9_]+)(\}\}|\})")
        .map_err(|e| format!("Failed to create regex: {}", e))?;

    let processed = re.replace_all(&content, |caps: &regex::Captures| {
        let var_name = &caps[2];
        env::var(var_name).unwrap_or_else(|_| format!("{{{{{{{}}}}}}}", var_name))
    });

    toml::from_str(&processed).map_err(|e| format!("Failed to parse config file: {}", e))
}

/// Overlay `overlay` on top of `base`: every field present in the overlay
/// file always wins since `OrchestratorConfig` has no sparse/optional
/// fields, so this is a field-replace rather than the teacher's `Option`-
/// aware merge in `config_service::merge_app_config`.
pub fn merge(base: OrchestratorConfig, overlay: OrchestratorConfig) -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    macro_rules! pick {
        ($field:ident) => {
            if overlay.$field != defaults.$field {
                overlay.$field.clone()
            } else {
                base.$field.clone()
            }
        };
    }

    OrchestratorConfig {
        max_iterations: pick!(max_iterations),
        verifier_approve_threshold: pick!(verifier_approve_threshold),
        verifier_reject_threshold: pick!(verifier_reject_threshold),
        max_retries: pick!(max_retries),
        retry_base_delay_ms: pick!(retry_base_delay_ms),
        cache_ttl_s: pick!(cache_ttl_s),
        human_loop_timeout_s: pick!(human_loop_timeout_s),
        workflow_timeout_ms: pick!(workflow_timeout_ms),
        enable_human_loop_default: pick!(enable_human_loop_default),
        llm_timeout_ms: pick!(llm_timeout_ms),
        llm_max_tokens: pick!(llm_max_tokens),
        bind_addr: pick!(bind_addr),
        llm_base_url: pick!(llm_base_url),
        llm_model: pick!(llm_model),
        llm_api_key: pick!(llm_api_key),
        retrieval_base_url: pick!(retrieval_base_url),
    }
}

/// Loads `base_path`, then overlays `<dir>/config.<env>.toml` if present,
/// matching the teacher's `load_app_config_with_env` base+overlay scheme.
/// Missing overlay files are treated as "no overlay", not an error.
pub fn load_with_env(base_path: &str, env_name: &str) -> Result<OrchestratorConfig, String> {
    let base = load_single_config(base_path)?;

    let overlay_path = std::path::Path::new(base_path)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join(format!("config.{}.toml", env_name.to_lowercase()));

    match load_single_config(overlay_path.to_string_lossy().as_ref()) {
        Ok(overlay) => Ok(merge(base, overlay)),
        Err(e) if e.contains("Failed to read config file") => Ok(base),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_single_config_substitutes_env_vars() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "max_iterations = 5\nbind_addr = \"{{{{BIND_ADDR}}}}\"\n"
        )
        .expect("write config");
        env::set_var("BIND_ADDR", "0.0.0.0:9090");

        let path = file.path().to_str().unwrap().to_string();
        let cfg = load_single_config(&path).expect("config should load");
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.bind_addr, "0.0.0.0:9090");
    }

    #[test]
    fn missing_fields_fall_back_to_documented_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "max_iterations = 7\n").expect("write config");
        let cfg = load_single_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.max_iterations, 7);
        assert_eq!(cfg.verifier_approve_threshold, 0.7);
        assert_eq!(cfg.cache_ttl_s, 3600);
    }

    #[test]
    fn merge_overlay_field_wins_when_non_default() {
        let base = OrchestratorConfig {
            max_iterations: 3,
            bind_addr: "127.0.0.1:8383".into(),
            ..OrchestratorConfig::default()
        };
        let overlay = OrchestratorConfig {
            max_iterations: 5,
            ..OrchestratorConfig::default()
        };

        let merged = merge(base, overlay);
        assert_eq!(merged.max_iterations, 5);
        // Overlay's bind_addr equals the documented default, so base's
        // (identical) value is retained rather than treated as an override.
        assert_eq!(merged.bind_addr, "127.0.0.1:8383");
    }

    #[test]
    fn load_with_env_falls_back_to_base_when_overlay_missing() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "max_iterations = 2\n").expect("write config");
        let cfg = load_with_env(file.path().to_str().unwrap(), "nonexistent_env").unwrap();
        assert_eq!(cfg.max_iterations, 2);
    }
}
