//! Session memory types: one record per conversation session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message stored in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Fluency score attached to user messages that were evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluency: Option<u32>,
}

/// A vocabulary word touched during a session, with its touch count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyUse {
    pub word: String,
    pub meaning: String,
    pub count: u32,
}

/// A vocabulary item reported by the turn evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    #[serde(default)]
    pub meaning: String,
}

/// Per-turn evaluation produced by the external completion service and
/// handed to the engine by the caller. The engine never parses model
/// output for this; it only folds the structured result in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnEvaluation {
    /// Fluency score 0-100; zero means "could not evaluate this turn"
    #[serde(default)]
    pub score: u32,

    #[serde(default)]
    pub feedback: String,

    #[serde(default)]
    pub new_vocabulary: Vec<VocabularyItem>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// One conversation session. Mutated on every turn, never auto-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Raw per-turn fluency scores; `avg_fluency` is always derived from
    /// this list on save, never maintained independently.
    pub fluency_scores: Vec<u32>,
    pub avg_fluency: u32,

    /// Unique topics in insertion order
    pub topics_covered: Vec<String>,
    pub vocabulary_used: Vec<VocabularyUse>,
    pub messages: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Create a brand-new session
    pub fn new(id: impl Into<String>, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            language: language.into(),
            created_at: now,
            updated_at: now,
            fluency_scores: Vec::new(),
            avg_fluency: 0,
            topics_covered: Vec::new(),
            vocabulary_used: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Fold one conversational turn into the session: both messages, the
    /// fluency score, vocabulary touch counts, and topics.
    pub fn apply_turn(
        &mut self,
        user_message: impl Into<String>,
        assistant_reply: impl Into<String>,
        evaluation: &TurnEvaluation,
        now: DateTime<Utc>,
    ) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: user_message.into(),
            timestamp: now,
            fluency: Some(evaluation.score),
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: assistant_reply.into(),
            timestamp: now,
            fluency: None,
        });

        if evaluation.score > 0 {
            self.fluency_scores.push(evaluation.score);
        }

        for item in &evaluation.new_vocabulary {
            if item.word.is_empty() {
                continue;
            }
            match self.vocabulary_used.iter_mut().find(|v| v.word == item.word) {
                Some(existing) => existing.count += 1,
                None => self.vocabulary_used.push(VocabularyUse {
                    word: item.word.clone(),
                    meaning: item.meaning.clone(),
                    count: 1,
                }),
            }
        }

        for topic in &evaluation.topics {
            if !topic.is_empty() && !self.topics_covered.contains(topic) {
                self.topics_covered.push(topic.clone());
            }
        }
    }

    /// Recompute `avg_fluency` as the rounded mean of `fluency_scores`
    pub fn recompute_avg_fluency(&mut self) {
        if self.fluency_scores.is_empty() {
            return;
        }
        let sum: u64 = self.fluency_scores.iter().map(|s| u64::from(*s)).sum();
        self.avg_fluency =
            ((sum as f64 / self.fluency_scores.len() as f64).round()) as u32;
    }
}

/// Lightweight session metadata for listings (no full message history)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub avg_fluency: u32,
    pub topics_covered: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(session: &SessionRecord) -> Self {
        let preview = session.messages.last().map(|m| {
            let mut text: String = m.content.chars().take(120).collect();
            if text.len() < m.content.len() {
                text.push('…');
            }
            text
        });

        Self {
            id: session.id.clone(),
            language: session.language.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            message_count: session.messages.len(),
            avg_fluency: session.avg_fluency,
            topics_covered: session.topics_covered.clone(),
            last_message_preview: preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(score: u32, words: &[(&str, &str)], topics: &[&str]) -> TurnEvaluation {
        TurnEvaluation {
            score,
            new_vocabulary: words
                .iter()
                .map(|(w, m)| VocabularyItem { word: (*w).into(), meaning: (*m).into() })
                .collect(),
            topics: topics.iter().map(|t| (*t).into()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn apply_turn_accumulates_vocabulary_counts() {
        let mut session = SessionRecord::new("s1", "Hindi");
        let now = Utc::now();

        session.apply_turn("hello", "namaste", &evaluation(80, &[("paani", "water")], &["greetings"]), now);
        session.apply_turn("more", "aur", &evaluation(60, &[("paani", "water"), ("garam", "hot")], &["greetings", "food"]), now);

        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.fluency_scores, vec![80, 60]);

        let paani = session.vocabulary_used.iter().find(|v| v.word == "paani").unwrap();
        assert_eq!(paani.count, 2);
        let garam = session.vocabulary_used.iter().find(|v| v.word == "garam").unwrap();
        assert_eq!(garam.count, 1);

        // topics stay unique, insertion ordered
        assert_eq!(session.topics_covered, vec!["greetings".to_string(), "food".to_string()]);
    }

    #[test]
    fn zero_score_turns_do_not_pollute_fluency() {
        let mut session = SessionRecord::new("s1", "Hindi");
        session.apply_turn("hi", "hello", &evaluation(0, &[], &[]), Utc::now());

        assert!(session.fluency_scores.is_empty());
        session.recompute_avg_fluency();
        assert_eq!(session.avg_fluency, 0);
    }

    #[test]
    fn avg_fluency_is_rounded_mean() {
        let mut session = SessionRecord::new("s1", "Hindi");
        session.fluency_scores = vec![70, 75];
        session.recompute_avg_fluency();
        assert_eq!(session.avg_fluency, 73); // 72.5 rounds up
    }
}
