use shared_types::{SafetyMatch, TriggerKind};

struct TriggerLexicon {
    kind: TriggerKind,
    terms: &'static [&'static str],
}

/// Fixed safety-trigger taxonomy. Priority is derived from `TriggerKind::priority`,
/// not from table order; table order only affects tie-breaking among equal
/// priorities, which follows this declaration order.
const TRIGGERS: &[TriggerLexicon] = &[
    TriggerLexicon {
        kind: TriggerKind::SafetyReview,
        terms: &[
            "overdose", "toxicity", "pregnancy", "pregnant", "child", "children",
            "contraindication", "warning", "surdosage", "toxicité", "grossesse",
            "enfant", "sobredosis", "embarazo", "niño", "überdosis", "schwangerschaft",
            "kind",
        ],
    },
    TriggerLexicon {
        kind: TriggerKind::CriticalDecision,
        terms: &["lethal", "emergency", "life-threatening", "létale", "urgence", "letal", "lebensbedrohlich"],
    },
    TriggerLexicon {
        kind: TriggerKind::RegulatoryCompliance,
        terms: &["fda", "ema", "regulatory", "approval", "compliance", "réglementaire", "regulatorio"],
    },
    TriggerLexicon {
        kind: TriggerKind::MedicalApproval,
        terms: &["diagnosis", "treatment", "dosage", "clinical", "diagnostic", "traitement", "diagnóstico", "tratamiento"],
    },
    TriggerLexicon {
        kind: TriggerKind::QualityAssurance,
        terms: &["verify", "double-check", "vérifier", "verificar"],
    },
];

/// Classifies a query against the fixed validation-trigger taxonomy. Matching
/// is case-insensitive, whole-word, across all supported languages.
pub struct SafetyClassifier;

impl SafetyClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Option<SafetyMatch> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<SafetyMatch> = None;

        for lexicon in TRIGGERS {
            let matched: Vec<String> = lexicon
                .terms
                .iter()
                .filter(|term| {
                    if term.contains(' ') || term.contains('-') {
                        normalized.contains(*term)
                    } else {
                        words.iter().any(|w| w == term)
                    }
                })
                .map(|s| s.to_string())
                .collect();

            if matched.is_empty() {
                continue;
            }

            let priority = lexicon.kind.priority();
            let is_better = match &best {
                None => true,
                Some(current) => priority > current.priority,
            };

            if is_better {
                best = Some(SafetyMatch {
                    trigger_kind: lexicon.kind,
                    priority,
                    matched_terms: matched,
                });
            }
        }

        best
    }
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_overdose_as_safety_review() {
        let c = SafetyClassifier::new();
        let m = c.classify("What is the lethal dose for a child overdose?").unwrap();
        // "lethal" and "child"/"overdose" both match; SAFETY_REVIEW and
        // CRITICAL_DECISION share priority 5, table order breaks the tie.
        assert_eq!(m.trigger_kind, TriggerKind::SafetyReview);
        assert_eq!(m.priority, 5);
    }

    #[test]
    fn flags_dosage_as_medical_approval() {
        let c = SafetyClassifier::new();
        let m = c.classify("What is the recommended dosage for adults?").unwrap();
        assert_eq!(m.trigger_kind, TriggerKind::MedicalApproval);
    }

    #[test]
    fn returns_none_for_benign_query() {
        let c = SafetyClassifier::new();
        assert!(c.classify("What is the weather today?").is_none());
    }

    #[test]
    fn higher_priority_wins_when_multiple_triggers_match() {
        let c = SafetyClassifier::new();
        let m = c
            .classify("Please verify the FDA approval status and dosage for this treatment")
            .unwrap();
        assert_eq!(m.trigger_kind, TriggerKind::RegulatoryCompliance);
        assert_eq!(m.priority, 4);
    }

    #[test]
    fn matches_are_whole_word_not_substring() {
        let c = SafetyClassifier::new();
        // "kind" would spuriously substring-match "kindness"; ensure whole-word matching.
        assert!(c.classify("Thank you for your kindness").is_none());
    }
}
