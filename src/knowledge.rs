//! Facts memory: the durable per-language knowledge profile
//!
//! Built by folding session turns in via [`merge_turn_facts`], read by the
//! recall engine and the profile aggregator. Vocabulary mastery only ever
//! increases; a topic is always in exactly one of the strong/weak sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionSummary, TurnEvaluation};

/// Document key for the knowledge book
pub const KNOWLEDGE_KEY: &str = "knowledge.json";

/// Mastery gained per reinforcement of a known word
const MASTERY_STEP: f64 = 0.08;

/// Fluency at or above which a weak topic is promoted to strong
const PROMOTE_THRESHOLD: u32 = 70;

/// Fluency below which a strong topic is demoted back to weak.
/// Scores between the two thresholds move nothing (hysteresis band).
const DEMOTE_THRESHOLD: u32 = 40;

/// Bound on the fluency trend window
const FLUENCY_TREND_CAP: usize = 100;

/// Mastery state for one vocabulary word
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyEntry {
    #[serde(default)]
    pub meaning: String,

    /// Mastery in [0, 1]; monotonically non-decreasing
    pub mastery: f64,

    pub uses: u32,

    /// Example sentences this word appeared in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,

    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl VocabularyEntry {
    fn new(meaning: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            meaning: meaning.into(),
            mastery: 0.0,
            uses: 0,
            contexts: Vec::new(),
            first_seen: now,
            last_used: now,
        }
    }

    /// One reinforcement event: bump the use count and raise mastery by a
    /// fixed step, capped at 1.0. Mastery never decreases.
    fn reinforce(&mut self, now: DateTime<Utc>) {
        self.uses += 1;
        self.mastery = (self.mastery + MASTERY_STEP).min(1.0);
        self.last_used = now;
    }
}

/// Durable aggregate for one language
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub avg_fluency: u32,

    /// Last 100 per-turn fluency scores, oldest first
    pub fluency_trend: Vec<u32>,

    /// Topic sets: insertion ordered, mutually exclusive
    pub strong_topics: Vec<String>,
    pub weak_topics: Vec<String>,

    pub vocabulary: BTreeMap<String, VocabularyEntry>,
}

/// The persisted facts memory document: one profile per language
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBook {
    pub languages: BTreeMap<String, LanguageProfile>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl KnowledgeBook {
    pub fn profile(&self, language: &str) -> Option<&LanguageProfile> {
        self.languages.get(language)
    }
}

/// Fold one turn's evaluation into the knowledge book. Safe to call again
/// with the same inputs: counts are re-derived, vocabulary and topic
/// updates converge.
pub fn merge_turn_facts(
    book: &mut KnowledgeBook,
    language: &str,
    evaluation: &TurnEvaluation,
    sessions: &[SessionSummary],
    now: DateTime<Utc>,
) {
    let profile = book.languages.entry(language.to_string()).or_default();

    // Session and message counts are always derived fresh from the session
    // summaries rather than incremented in place, so they self-heal from
    // any missed update.
    let for_language: Vec<_> = sessions.iter().filter(|s| s.language == language).collect();
    profile.total_sessions = for_language.len();
    profile.total_messages = for_language.iter().map(|s| s.message_count).sum();

    if evaluation.score > 0 {
        profile.fluency_trend.push(evaluation.score);
        if profile.fluency_trend.len() > FLUENCY_TREND_CAP {
            let overflow = profile.fluency_trend.len() - FLUENCY_TREND_CAP;
            profile.fluency_trend.drain(..overflow);
        }
        let sum: u64 = profile.fluency_trend.iter().map(|s| u64::from(*s)).sum();
        profile.avg_fluency =
            ((sum as f64 / profile.fluency_trend.len() as f64).round()) as u32;
    }

    for item in &evaluation.new_vocabulary {
        if item.word.is_empty() {
            continue;
        }
        let entry = profile
            .vocabulary
            .entry(item.word.clone())
            .or_insert_with(|| VocabularyEntry::new(&item.meaning, now));
        entry.reinforce(now);
        if entry.meaning.is_empty() && !item.meaning.is_empty() {
            entry.meaning = item.meaning.clone();
        }
    }

    for topic in &evaluation.topics {
        if topic.is_empty() {
            continue;
        }
        // membership is checked once up front; a brand-new topic therefore
        // spends at least one turn in the weak set before it can promote
        let in_strong = profile.strong_topics.contains(topic);
        let in_weak = profile.weak_topics.contains(topic);

        if !in_strong && !in_weak {
            profile.weak_topics.push(topic.clone());
        }

        if evaluation.score >= PROMOTE_THRESHOLD && in_weak {
            profile.weak_topics.retain(|t| t != topic);
            if !in_strong {
                profile.strong_topics.push(topic.clone());
            }
        }

        if evaluation.score < DEMOTE_THRESHOLD && in_strong {
            profile.strong_topics.retain(|t| t != topic);
            if !in_weak {
                profile.weak_topics.push(topic.clone());
            }
        }
    }
}
