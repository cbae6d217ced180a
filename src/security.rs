use std::collections::HashSet;

use tracing::debug;

/// Minimum fraction of a bank key's words that must appear in an observed
/// question for the token-overlap tier to accept it.
const TOKEN_OVERLAP_THRESHOLD: f64 = 0.7;

/// Token-overlap matching is only attempted against keys longer than this
/// many words; short keys produce too many accidental hits.
const MIN_KEY_WORDS_FOR_OVERLAP: usize = 3;

/// The configured security question→answer pairs, ordered as loaded.
/// Entries with empty answers are kept so their question text still
/// participates in matching diagnostics, but they never produce an answer.
#[derive(Debug, Clone)]
pub struct SecurityQuestionBank {
    entries: Vec<(String, String)>,
}

impl SecurityQuestionBank {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// True when no entry has a usable answer.
    pub fn is_empty(&self) -> bool {
        self.answerable_count() == 0
    }

    pub fn answerable_count(&self) -> usize {
        self.entries.iter().filter(|(_, a)| !a.is_empty()).count()
    }

    /// Resolves an observed question to a configured answer.
    ///
    /// Tiers, first hit wins: exact (case-sensitive), case-insensitive
    /// substring in either direction, then token overlap against keys with
    /// more than three words. Live pages rephrase and truncate enrolled
    /// question text, so exactness is preferred but cannot be required.
    pub fn match_question(&self, observed: &str) -> Option<&str> {
        let question = normalize_question(observed);
        if question.is_empty() {
            return None;
        }

        for (key, answer) in &self.entries {
            if key == &question && !answer.is_empty() {
                debug!(question = %question, "security question matched exactly");
                return Some(answer);
            }
        }

        let question_lower = question.to_lowercase();
        for (key, answer) in &self.entries {
            let key_lower = key.to_lowercase();
            if (key_lower.contains(&question_lower) || question_lower.contains(&key_lower))
                && !answer.is_empty()
            {
                debug!(question = %question, key = %key, "security question matched by substring");
                return Some(answer);
            }
        }

        let question_words = word_set(&question);
        for (key, answer) in &self.entries {
            let key_words = word_set(key);
            if key_words.len() <= MIN_KEY_WORDS_FOR_OVERLAP {
                continue;
            }
            let overlap = key_words.intersection(&question_words).count();
            if overlap as f64 >= TOKEN_OVERLAP_THRESHOLD * key_words.len() as f64
                && !answer.is_empty()
            {
                debug!(
                    question = %question,
                    key = %key,
                    overlap,
                    "security question matched by token overlap"
                );
                return Some(answer);
            }
        }

        debug!(question = %question, "security question unanswerable");
        None
    }
}

/// Strips presentation markers (required-field asterisks, surrounding
/// whitespace) from a question as scraped off the page.
fn normalize_question(text: &str) -> String {
    text.trim().trim_end_matches('*').trim_end().to_string()
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> SecurityQuestionBank {
        SecurityQuestionBank::new(vec![
            ("What was your first car?".to_string(), "Corolla".to_string()),
            (
                "Where did you meet your spouse?".to_string(),
                "Ankara".to_string(),
            ),
            ("security_question_3".to_string(), String::new()),
        ])
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(bank().match_question("What was your first car?"), Some("Corolla"));
    }

    #[test]
    fn test_normalization_strips_required_marker() {
        assert_eq!(
            bank().match_question("  What was your first car? *  "),
            Some("Corolla")
        );
    }

    #[test]
    fn test_substring_match_either_direction() {
        // Observed text is a truncation of the bank key.
        assert_eq!(bank().match_question("your first car?"), Some("Corolla"));
        // Observed text wraps the bank key.
        assert_eq!(
            bank().match_question("Please answer: what was your first car? (required)"),
            Some("Corolla")
        );
    }

    #[test]
    fn test_token_overlap_match() {
        // Rephrased, not a substring: 6 of 6 key words present.
        assert_eq!(
            bank().match_question("Where did you first meet your spouse"),
            Some("Ankara")
        );
    }

    #[test]
    fn test_token_overlap_below_threshold() {
        // Shares only {where, your} with the spouse key: 2/6 < 0.7.
        assert_eq!(bank().match_question("Where is your favorite beach resort located"), None);
    }

    #[test]
    fn test_unanswerable_question() {
        assert_eq!(bank().match_question("What is your favorite color?"), None);
    }

    #[test]
    fn test_empty_answer_never_matches() {
        assert_eq!(bank().match_question("security_question_3"), None);
    }

    #[test]
    fn test_answerable_count() {
        assert_eq!(bank().answerable_count(), 2);
        assert!(!bank().is_empty());
        assert!(SecurityQuestionBank::new(vec![(
            "q".to_string(),
            String::new()
        )])
        .is_empty());
    }
}
