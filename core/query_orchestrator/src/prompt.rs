use shared_types::{AgentRole, Language};
use std::sync::{Arc, RwLock};

/// Input to a single `PromptBuilder::build` call.
pub struct PromptInput<'a> {
    pub query: &'a str,
    pub context: &'a str,
    pub detected_language: Language,
    pub previous_generator_output: Option<&'a str>,
    pub previous_verifier_analysis: Option<&'a str>,
    pub source_text: Option<&'a str>,
    pub source_language: Option<Language>,
}

/// One template per role. Replacing the whole set is how `update_templates`
/// achieves an atomic swap: readers either see the fully-old or fully-new
/// set, never a mix of per-role templates from different versions.
#[derive(Clone)]
pub struct TemplateSet {
    generator: String,
    verifier: String,
    reformer: String,
    translator: String,
}

impl TemplateSet {
    fn default_templates() -> Self {
        Self {
            generator: "You are a medical information assistant. Answer in {lang}. \
                Use the following context to answer the question. If the context does \
                not contain the answer, say so explicitly in {lang} rather than \
                guessing. Structure the answer as bullet points, one fact per line.\n\
                Context:\n{context}\n\nQuestion: {query}"
                .to_string(),
            verifier: "Review the following answer for factual grounding in the given \
                context. Respond with a strict verdict: YES if the answer is fully \
                supported by the context, NO otherwise. Include a brief analysis.\n\
                Context:\n{context}\n\nQuestion: {query}\n\nAnswer:\n{previous_output}"
                .to_string(),
            reformer: "Improve the following answer using the analysis below, keeping \
                all factual content and answering in {lang} with bullet structure.\n\
                Context:\n{context}\n\nQuestion: {query}\n\nPrevious answer:\n\
                {previous_output}\n\nVerifier analysis:\n{verifier_analysis}"
                .to_string(),
            translator: "Translate the following text from {source_lang} to {lang}, \
                preserving medical terminology precisely.\n\nText:\n{source_text}"
                .to_string(),
        }
    }

    fn template_for(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Generator => &self.generator,
            AgentRole::Verifier => &self.verifier,
            AgentRole::Reformer => &self.reformer,
            AgentRole::Translator => &self.translator,
        }
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::default_templates()
    }
}

/// Builds role-specific prompts from a single shared template set. The set
/// is held behind `Arc<RwLock<..>>` so `update_templates` is an atomic
/// pointer swap: a clone of the `Arc` taken under a short read lock is
/// either entirely pre- or entirely post-update, never a torn mix.
#[derive(Clone)]
pub struct PromptBuilder {
    templates: Arc<RwLock<Arc<TemplateSet>>>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(RwLock::new(Arc::new(TemplateSet::default()))),
        }
    }

    pub fn update_templates(&self, new_templates: TemplateSet) {
        let mut guard = self.templates.write().expect("template lock poisoned");
        *guard = Arc::new(new_templates);
    }

    pub fn build(&self, role: AgentRole, input: &PromptInput<'_>) -> String {
        let snapshot = {
            let guard = self.templates.read().expect("template lock poisoned");
            Arc::clone(&guard)
        };
        let template = snapshot.template_for(role);

        template
            .replace("{lang}", input.detected_language.code())
            .replace("{context}", input.context)
            .replace("{query}", input.query)
            .replace(
                "{previous_output}",
                input.previous_generator_output.unwrap_or(""),
            )
            .replace(
                "{verifier_analysis}",
                input.previous_verifier_analysis.unwrap_or(""),
            )
            .replace("{source_text}", input.source_text.unwrap_or(""))
            .replace(
                "{source_lang}",
                input
                    .source_language
                    .map(|l| l.code())
                    .unwrap_or("unknown"),
            )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(query: &'static str) -> PromptInput<'static> {
        PromptInput {
            query,
            context: "Paracetamol is an analgesic.",
            detected_language: Language::En,
            previous_generator_output: None,
            previous_verifier_analysis: None,
            source_text: None,
            source_language: None,
        }
    }

    #[test]
    fn build_substitutes_query_and_context() {
        let builder = PromptBuilder::new();
        let input = base_input("What is paracetamol?");
        let prompt = builder.build(AgentRole::Generator, &input);
        assert!(prompt.contains("What is paracetamol?"));
        assert!(prompt.contains("Paracetamol is an analgesic."));
    }

    #[test]
    fn update_is_visible_to_subsequent_builds_and_never_torn() {
        let builder = PromptBuilder::new();
        let mut updated = TemplateSet::default_templates();
        updated.generator = "CUSTOM {query} {lang}".to_string();
        builder.update_templates(updated);

        let input = base_input("dosage question");
        let prompt = builder.build(AgentRole::Generator, &input);
        assert!(prompt.starts_with("CUSTOM dosage question EN"));
    }

    #[test]
    fn shared_instance_is_observed_across_clones() {
        let builder = PromptBuilder::new();
        let cloned_for_agent = builder.clone();

        let mut updated = TemplateSet::default_templates();
        updated.verifier = "STRICT VERIFY {query}".to_string();
        builder.update_templates(updated);

        let input = base_input("is this supported?");
        let prompt = cloned_for_agent.build(AgentRole::Verifier, &input);
        assert!(prompt.starts_with("STRICT VERIFY"));
    }
}
