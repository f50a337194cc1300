//! Recall engine: decides whether prior knowledge is relevant to an
//! incoming message and, if so, builds a compact context block for prompt
//! injection.
//!
//! Matching is deliberately lexical (case-insensitive substring overlap
//! with known vocabulary and topics) rather than semantic: zero extra
//! infrastructure, recall quality traded away knowingly.

use crate::config::Config;
use crate::knowledge::KnowledgeBook;

/// A vocabulary word that matched the incoming message
#[derive(Debug, Clone)]
pub struct MatchedWord {
    pub word: String,
    pub meaning: String,
    pub mastery: f64,
    pub uses: u32,
}

/// Recalled learner knowledge ready for prompt injection
#[derive(Debug, Clone)]
pub struct RecallContext {
    pub language: String,
    pub avg_fluency: u32,
    pub total_sessions: usize,
    pub total_messages: usize,
    pub matched_words: Vec<MatchedWord>,
    pub matched_topics: Vec<String>,
    pub weak_topics: Vec<String>,
    pub strong_topics: Vec<String>,

    /// Lowest-mastery words worth reinforcing, weakest first
    pub reinforcement: Vec<MatchedWord>,
}

impl RecallContext {
    /// Serialize the recall block for injection into a system prompt
    pub fn format_for_prompt(&self) -> String {
        let mut parts = Vec::new();

        parts.push("[LEARNER MEMORY - AUTO-RECALLED]".to_string());
        parts.push(format!(
            "Language: {} | Overall fluency: {}/100 | Sessions: {} | Messages: {}",
            self.language, self.avg_fluency, self.total_sessions, self.total_messages
        ));

        if !self.matched_words.is_empty() {
            let details: Vec<String> = self
                .matched_words
                .iter()
                .map(|w| {
                    format!(
                        "\"{}\" ({}, mastery {}%, {}x used)",
                        w.word,
                        if w.meaning.is_empty() { "?" } else { &w.meaning },
                        (w.mastery * 100.0).round() as u32,
                        w.uses
                    )
                })
                .collect();
            parts.push(format!("Relevant known vocabulary: {}", details.join(", ")));
        }

        if !self.weak_topics.is_empty() {
            parts.push(format!(
                "Weak areas needing reinforcement: {}",
                self.weak_topics.join(", ")
            ));
        }
        if !self.strong_topics.is_empty() {
            parts.push(format!("Already confident in: {}", self.strong_topics.join(", ")));
        }

        if !self.reinforcement.is_empty() {
            let details: Vec<String> = self
                .reinforcement
                .iter()
                .map(|w| {
                    format!(
                        "\"{}\" ({}, {}%)",
                        w.word,
                        if w.meaning.is_empty() { "?" } else { &w.meaning },
                        (w.mastery * 100.0).round() as u32
                    )
                })
                .collect();
            parts.push(format!(
                "Low-mastery vocabulary to reinforce if relevant: {}",
                details.join(", ")
            ));
        }

        parts.push("[END LEARNER MEMORY]".to_string());
        parts.join("\n")
    }
}

/// Build recall for a message, or None when the language has no profile,
/// no vocabulary, or the message shares no substring with any known word
/// or topic. Recall is opt-in by relevance, not always-on.
pub fn build_recall(
    book: &KnowledgeBook,
    message: &str,
    language: &str,
    config: &Config,
) -> Option<RecallContext> {
    let profile = book.profile(language)?;
    if profile.vocabulary.is_empty() {
        return None;
    }

    let message_lower = message.to_lowercase();

    let mut matched_words: Vec<MatchedWord> = profile
        .vocabulary
        .iter()
        .filter(|(word, _)| message_lower.contains(&word.to_lowercase()))
        .map(|(word, entry)| MatchedWord {
            word: word.clone(),
            meaning: entry.meaning.clone(),
            mastery: entry.mastery,
            uses: entry.uses,
        })
        .collect();

    let matched_topics: Vec<String> = profile
        .strong_topics
        .iter()
        .chain(profile.weak_topics.iter())
        .filter(|topic| message_lower.contains(&topic.to_lowercase()))
        .cloned()
        .collect();

    if matched_words.is_empty() && matched_topics.is_empty() {
        tracing::debug!(language, "no lexical overlap, skipping recall");
        return None;
    }
    tracing::debug!(
        language,
        words = matched_words.len(),
        topics = matched_topics.len(),
        "recall overlap found"
    );

    matched_words.truncate(config.max_recalled_words);

    let mut reinforcement: Vec<MatchedWord> = profile
        .vocabulary
        .iter()
        .filter(|(_, entry)| entry.mastery < config.reinforcement_cutoff)
        .map(|(word, entry)| MatchedWord {
            word: word.clone(),
            meaning: entry.meaning.clone(),
            mastery: entry.mastery,
            uses: entry.uses,
        })
        .collect();
    reinforcement.sort_by(|a, b| a.mastery.partial_cmp(&b.mastery).unwrap_or(std::cmp::Ordering::Equal));
    reinforcement.truncate(config.max_reinforcement_words);

    Some(RecallContext {
        language: language.to_string(),
        avg_fluency: profile.avg_fluency,
        total_sessions: profile.total_sessions,
        total_messages: profile.total_messages,
        matched_words,
        matched_topics,
        weak_topics: profile.weak_topics.clone(),
        strong_topics: profile.strong_topics.clone(),
        reinforcement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::merge_turn_facts;
    use crate::session::{TurnEvaluation, VocabularyItem};
    use chrono::Utc;

    fn book_with(words: &[(&str, &str)], topics: &[&str]) -> KnowledgeBook {
        let mut book = KnowledgeBook::default();
        let evaluation = TurnEvaluation {
            score: 50,
            new_vocabulary: words
                .iter()
                .map(|(w, m)| VocabularyItem { word: (*w).into(), meaning: (*m).into() })
                .collect(),
            topics: topics.iter().map(|t| (*t).into()).collect(),
            ..Default::default()
        };
        merge_turn_facts(&mut book, "Hindi", &evaluation, &[], Utc::now());
        book
    }

    #[test]
    fn no_profile_means_no_recall() {
        let book = KnowledgeBook::default();
        assert!(build_recall(&book, "anything", "Hindi", &Config::default()).is_none());
    }

    #[test]
    fn no_overlap_means_no_recall() {
        let book = book_with(&[("paani", "water")], &["food"]);
        let recall = build_recall(&book, "tell me about the weather", "Hindi", &Config::default());
        assert!(recall.is_none());
    }

    #[test]
    fn word_overlap_is_case_insensitive() {
        let book = book_with(&[("paani", "water")], &[]);
        let recall = build_recall(&book, "How do I ask for PAANI?", "Hindi", &Config::default())
            .expect("overlap should trigger recall");
        assert_eq!(recall.matched_words.len(), 1);
        assert_eq!(recall.matched_words[0].word, "paani");
    }

    #[test]
    fn topic_overlap_alone_triggers_recall() {
        let book = book_with(&[("paani", "water")], &["food"]);
        let recall = build_recall(&book, "let's talk about food today", "Hindi", &Config::default())
            .expect("topic overlap should trigger recall");
        assert!(recall.matched_words.is_empty());
        assert_eq!(recall.matched_topics, vec!["food".to_string()]);

        let block = recall.format_for_prompt();
        assert!(block.starts_with("[LEARNER MEMORY"));
        assert!(block.ends_with("[END LEARNER MEMORY]"));
        assert!(block.contains("food"));
    }

    #[test]
    fn reinforcement_lists_lowest_mastery_first() {
        let mut book = book_with(&[("alpha", "a"), ("beta", "b")], &[]);
        // push beta well above alpha
        for _ in 0..4 {
            let evaluation = TurnEvaluation {
                score: 50,
                new_vocabulary: vec![VocabularyItem { word: "beta".into(), meaning: "b".into() }],
                ..Default::default()
            };
            merge_turn_facts(&mut book, "Hindi", &evaluation, &[], Utc::now());
        }

        let recall = build_recall(&book, "alpha?", "Hindi", &Config::default()).unwrap();
        assert_eq!(recall.reinforcement[0].word, "alpha");
    }

    #[test]
    fn matched_words_are_bounded() {
        let words: Vec<(String, String)> =
            (0..30).map(|i| (format!("word{i}"), "meaning".to_string())).collect();
        let refs: Vec<(&str, &str)> =
            words.iter().map(|(w, m)| (w.as_str(), m.as_str())).collect();
        let book = book_with(&refs, &[]);

        let message = words.iter().map(|(w, _)| w.clone()).collect::<Vec<_>>().join(" ");
        let recall = build_recall(&book, &message, "Hindi", &Config::default()).unwrap();
        assert_eq!(recall.matched_words.len(), 15);
    }
}
