//! Local phrase-table translator.
//!
//! Serves the language pairs listed in `[[translator.glossary]]`. A text is
//! matched as a whole phrase first, then word by word; words without an entry
//! are kept as-is. Text with no known phrase or word at all is a failure.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::GlossaryPairConfig;
use crate::translation::{TranslateError, Translator};

/// Translator backed by static phrase tables.
#[derive(Debug, Clone, Default)]
pub struct GlossaryTranslator {
    name: String,
    /// (source, target) -> lowercase phrase -> translation.
    pairs: HashMap<(String, String), HashMap<String, String>>,
}

impl GlossaryTranslator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pairs: HashMap::new(),
        }
    }

    /// Build from `[[translator.glossary]]` entries.
    pub fn from_config(name: impl Into<String>, pairs: &[GlossaryPairConfig]) -> Self {
        let mut translator = Self::new(name);
        for pair in pairs {
            for (phrase, translation) in &pair.entries {
                translator.insert(&pair.source, &pair.target, phrase, translation);
            }
            // Register pairs with no entries too, so they are "supported".
            translator
                .pairs
                .entry((pair.source.to_lowercase(), pair.target.to_lowercase()))
                .or_default();
        }
        translator
    }

    pub fn insert(&mut self, source: &str, target: &str, phrase: &str, translation: &str) {
        self.pairs
            .entry((source.to_lowercase(), target.to_lowercase()))
            .or_default()
            .insert(phrase.trim().to_lowercase(), translation.to_string());
    }

    pub fn supports(&self, source: &str, target: &str) -> bool {
        self.pairs
            .contains_key(&(source.to_lowercase(), target.to_lowercase()))
    }

    fn lookup(table: &HashMap<String, String>, text: &str) -> Option<String> {
        if let Some(phrase) = table.get(&text.trim().to_lowercase()) {
            return Some(phrase.clone());
        }

        let mut known = 0;
        let words: Vec<String> = text
            .split_whitespace()
            .map(|word| {
                let core = word.trim_matches(|c: char| !c.is_alphanumeric());
                match table.get(&core.to_lowercase()) {
                    Some(t) if !core.is_empty() => {
                        known += 1;
                        word.replacen(core, t, 1)
                    }
                    _ => word.to_string(),
                }
            })
            .collect();

        if known == 0 {
            None
        } else {
            Some(words.join(" "))
        }
    }
}

#[async_trait]
impl Translator for GlossaryTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError> {
        let table = self
            .pairs
            .get(&(source_lang.to_lowercase(), target_lang.to_lowercase()))
            .ok_or_else(|| TranslateError::unsupported(source_lang, target_lang))?;

        Self::lookup(table, text).ok_or_else(|| {
            TranslateError::Failure(format!(
                "no glossary coverage for text in {}->{}",
                source_lang, target_lang
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> GlossaryTranslator {
        let mut t = GlossaryTranslator::new("glossary");
        t.insert("en", "de", "Hello", "Hallo");
        t.insert("en", "de", "world", "Welt");
        t.insert("en", "de", "good morning", "Guten Morgen");
        t
    }

    #[tokio::test]
    async fn test_phrase_match_is_case_insensitive() {
        let t = translator();
        assert_eq!(t.translate("Hello", "en", "de").await.unwrap(), "Hallo");
        assert_eq!(t.translate("GOOD MORNING", "EN", "de").await.unwrap(), "Guten Morgen");
    }

    #[tokio::test]
    async fn test_word_by_word_keeps_punctuation_and_unknown_words() {
        let t = translator();
        assert_eq!(
            t.translate("hello, big world!", "en", "de").await.unwrap(),
            "Hallo, big Welt!"
        );
    }

    #[tokio::test]
    async fn test_unsupported_pair_and_uncovered_text() {
        let t = translator();
        assert!(matches!(
            t.translate("Hello", "en", "fr").await,
            Err(TranslateError::UnsupportedLanguagePair { .. })
        ));
        assert!(matches!(
            t.translate("completely unknown", "en", "de").await,
            Err(TranslateError::Failure(_))
        ));
    }

    #[test]
    fn test_from_config_registers_empty_pairs() {
        let pairs = vec![GlossaryPairConfig {
            source: "en".into(),
            target: "it".into(),
            entries: Default::default(),
        }];
        let t = GlossaryTranslator::from_config("local", &pairs);
        assert!(t.supports("en", "it"));
        assert!(!t.supports("it", "en"));
    }
}
