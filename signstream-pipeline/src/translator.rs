//! Sign translator trait and the gloss-lookup reference implementation

use crate::error::{PipelineError, Result};
use signstream_types::SignDirective;
use std::collections::HashMap;

/// Maps normalized text to an ordered list of sign directives.
///
/// The dictionary content itself lives outside this crate; implementations
/// are expected to be pure: same text in, same directives out.
pub trait SignTranslator: Send + Sync {
    fn translate(&self, text: &str) -> Result<Vec<SignDirective>>;
}

/// Dictionary-backed translator: known words become a single gloss,
/// unknown words degrade to letter-by-letter fingerspelling.
pub struct GlossTranslator {
    lexicon: HashMap<String, SignDirective>,
    letter_duration_ms: u64,
}

impl GlossTranslator {
    /// Build from a gloss dictionary keyed by lowercase word.
    pub fn new(lexicon: HashMap<String, SignDirective>) -> Self {
        Self {
            lexicon,
            letter_duration_ms: 250,
        }
    }

    /// Convenience constructor: every word in `words` gets a default
    /// directive with its uppercase gloss.
    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lexicon = words
            .into_iter()
            .map(|w| {
                let word = w.as_ref().to_lowercase();
                let directive = SignDirective {
                    gloss: word.to_uppercase(),
                    duration_ms: 800,
                    handshape: "neutral".to_string(),
                    location: "neutral".to_string(),
                    movement: "default".to_string(),
                    non_manual_markers: Vec::new(),
                };
                (word, directive)
            })
            .collect();
        Self::new(lexicon)
    }

    fn fingerspell(&self, word: &str) -> Vec<SignDirective> {
        word.chars()
            .filter(|c| c.is_alphanumeric())
            .map(|c| SignDirective {
                gloss: c.to_uppercase().to_string(),
                duration_ms: self.letter_duration_ms,
                handshape: format!("fs-{}", c.to_lowercase()),
                location: "fingerspelling".to_string(),
                movement: "hold".to_string(),
                non_manual_markers: Vec::new(),
            })
            .collect()
    }
}

impl SignTranslator for GlossTranslator {
    fn translate(&self, text: &str) -> Result<Vec<SignDirective>> {
        if text.trim().is_empty() {
            return Err(PipelineError::Translator("empty batch text".to_string()));
        }

        let mut signs = Vec::new();
        for word in text.split_whitespace() {
            let key = word.to_lowercase();
            match self.lexicon.get(&key) {
                Some(directive) => signs.push(directive.clone()),
                None => signs.extend(self.fingerspell(&key)),
            }
        }
        Ok(signs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_word_maps_to_single_gloss() {
        let translator = GlossTranslator::with_words(["hello"]);
        let signs = translator.translate("hello").unwrap();
        assert_eq!(signs.len(), 1);
        assert_eq!(signs[0].gloss, "HELLO");
    }

    #[test]
    fn test_unknown_word_is_fingerspelled() {
        let translator = GlossTranslator::with_words(["hello"]);
        let signs = translator.translate("xyz").unwrap();
        let glosses: Vec<&str> = signs.iter().map(|s| s.gloss.as_str()).collect();
        assert_eq!(glosses, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_mixed_batch_keeps_word_order() {
        let translator = GlossTranslator::with_words(["hello", "world"]);
        let signs = translator.translate("hello ab world").unwrap();
        let glosses: Vec<&str> = signs.iter().map(|s| s.gloss.as_str()).collect();
        assert_eq!(glosses, vec!["HELLO", "A", "B", "WORLD"]);
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let translator = GlossTranslator::with_words(["hello"]);
        assert!(translator.translate("   ").is_err());
    }
}
