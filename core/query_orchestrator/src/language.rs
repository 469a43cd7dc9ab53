use shared_types::Language;

struct LanguageLexicon {
    lang: Language,
    indicators: &'static [&'static str],
}

/// Keyword/indicator tables per supported language. English carries the
/// broadest list since it is the tie-break default for international
/// medical queries.
const LEXICONS: &[LanguageLexicon] = &[
    LanguageLexicon {
        lang: Language::En,
        indicators: &[
            "what", "how", "why", "when", "which", "does", "is", "are", "side effects",
            "dosage", "dose", "treatment", "symptom", "paracetamol", "ibuprofen",
        ],
    },
    LanguageLexicon {
        lang: Language::Fr,
        indicators: &[
            "quel", "quels", "quelle", "comment", "pourquoi", "quand", "effets",
            "secondaires", "dose", "traitement", "paracétamol", "paracetamol",
        ],
    },
    LanguageLexicon {
        lang: Language::Es,
        indicators: &[
            "qué", "que", "cómo", "como", "por qué", "porque", "cuándo", "efectos",
            "secundarios", "dosis", "tratamiento", "paracetamol",
        ],
    },
    LanguageLexicon {
        lang: Language::De,
        indicators: &[
            "was", "wie", "warum", "wann", "welche", "nebenwirkungen", "dosis",
            "behandlung", "paracetamol",
        ],
    },
];

/// Result of a `LanguageDetector::detect` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub lang: Language,
    pub confidence: f32,
}

/// Deterministic, dependency-free language classifier. Total function: never
/// fails, always returns a supported language.
pub struct LanguageDetector;

impl LanguageDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, text: &str) -> Detection {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut scores: Vec<(Language, usize)> = LEXICONS
            .iter()
            .map(|lex| {
                let count = lex
                    .indicators
                    .iter()
                    .filter(|indicator| {
                        if indicator.contains(' ') {
                            normalized.contains(*indicator)
                        } else {
                            words.iter().any(|w| w == indicator)
                        }
                    })
                    .count();
                (lex.lang, count)
            })
            .collect();

        let total: usize = scores.iter().map(|(_, c)| c).sum();
        let en_score = scores
            .iter()
            .find(|(l, _)| *l == Language::En)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        let max_score = scores.iter().map(|(_, c)| *c).max().unwrap_or(0);

        if total == 0 {
            return Detection {
                lang: Language::En,
                confidence: 0.0,
            };
        }

        if en_score > 0 && en_score >= max_score {
            return Detection {
                lang: Language::En,
                confidence: en_score as f32 / total as f32,
            };
        }

        // English doesn't win the tie-break; pick the strictly highest non-EN score.
        scores.retain(|(l, _)| *l != Language::En);
        let (winner, winner_score) = scores
            .into_iter()
            .max_by_key(|(_, c)| *c)
            .unwrap_or((Language::En, 0));

        Detection {
            lang: winner,
            confidence: winner_score as f32 / total as f32,
        }
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}
