//! Learner profile aggregator
//!
//! Unifies vocabulary and context signals from the word bank, the raw
//! exposure tally, the knowledge profile, the interaction log, and recent
//! sessions into one weakest-first ranked vocabulary list. Sources fold in
//! a fixed order; a later source fills gaps or raises strength but never
//! overwrites a populated field. Quiz generation depends on the ordering
//! contract of the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeBook;
use crate::progress::{difficulty_for_level, level_for_xp, Difficulty, ProgressionState};
use crate::session::SessionRecord;

/// Document key for the word bank
pub const WORD_BANK_KEY: &str = "words.json";

/// Document key for the interaction log
pub const INTERACTIONS_KEY: &str = "interactions.json";

/// Strength estimate per raw exposure when converting the tally
const EXPOSURE_STRENGTH_STEP: f64 = 0.15;

/// Mastery floor granted to vocabulary touched in a recent session
const SESSION_STRENGTH_FLOOR: f64 = 0.3;

/// How many mined example sentences the profile keeps (most recent)
const CONTEXT_SENTENCE_CAP: usize = 20;

/// One word in the explicit exposure log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordRecord {
    pub word: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default)]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The persisted word bank: three exposure lists in priority order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordBank {
    #[serde(default)]
    pub all: Vec<WordRecord>,
    #[serde(default)]
    pub user_used: Vec<WordRecord>,
    #[serde(default)]
    pub scene_used: Vec<WordRecord>,
}

/// A word surfaced by a historical interaction, with its sentence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordExposure {
    pub word: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_sentence: Option<String>,
}

/// One historical scene interaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default)]
    pub words_to_add: Vec<WordExposure>,
}

/// The persisted interaction log
pub type InteractionLog = Vec<InteractionRecord>;

/// Which source first contributed a vocabulary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabSource {
    UserUsed,
    SceneUsed,
    Bank,
    Exposure,
    Knowledge,
}

/// One entry of the aggregated, ranked vocabulary list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedWord {
    pub word: String,
    pub meaning: String,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    pub source: VocabSource,
}

/// The unified learner view that seeds quiz generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub language: String,
    pub xp: u64,
    pub level: u32,
    pub difficulty: Difficulty,

    /// Entries with a known meaning, sorted ascending by strength
    pub vocabulary: Vec<RankedWord>,
    pub vocab_count: usize,

    pub context_sentences: Vec<String>,
    pub chat_topics: Vec<String>,
    pub weak_topics: Vec<String>,
    pub strong_topics: Vec<String>,
    pub avg_fluency: u32,
    pub total_sessions: usize,
}

fn fill_from(
    map: &mut BTreeMap<String, RankedWord>,
    record: &WordRecord,
    source: VocabSource,
) {
    if record.word.is_empty() || map.contains_key(&record.word) {
        return;
    }
    map.insert(
        record.word.clone(),
        RankedWord {
            word: record.word.clone(),
            meaning: record.meaning.clone(),
            strength: record.strength,
            contexts: record.context.clone().into_iter().collect(),
            source,
        },
    );
}

/// Merge every memory source into one learner profile for `language`.
/// `recent_sessions` is expected to hold the most recent sessions for the
/// language, newest last.
pub fn aggregate(
    language: &str,
    word_bank: &WordBank,
    progression: &ProgressionState,
    knowledge: &KnowledgeBook,
    interactions: &InteractionLog,
    recent_sessions: &[SessionRecord],
) -> LearnerProfile {
    let mut map: BTreeMap<String, RankedWord> = BTreeMap::new();

    // 1. explicit exposure lists, in priority order
    for record in &word_bank.user_used {
        fill_from(&mut map, record, VocabSource::UserUsed);
    }
    for record in &word_bank.scene_used {
        fill_from(&mut map, record, VocabSource::SceneUsed);
    }
    for record in &word_bank.all {
        let mut record = record.clone();
        record.strength = 0.0;
        fill_from(&mut map, &record, VocabSource::Bank);
    }

    // 2. raw exposure tally, converted to a strength estimate
    for (word, count) in &progression.words_learned {
        let estimate = (f64::from(*count) * EXPOSURE_STRENGTH_STEP).min(1.0);
        match map.get_mut(word) {
            Some(entry) => entry.strength = entry.strength.max(estimate),
            None => {
                map.insert(
                    word.clone(),
                    RankedWord {
                        word: word.clone(),
                        meaning: String::new(),
                        strength: estimate,
                        contexts: Vec::new(),
                        source: VocabSource::Exposure,
                    },
                );
            }
        }
    }

    // 3. knowledge profile mastery map
    let language_profile = knowledge.profile(language);
    if let Some(profile) = language_profile {
        for (word, entry) in &profile.vocabulary {
            match map.get_mut(word) {
                Some(existing) => {
                    existing.strength = existing.strength.max(entry.mastery);
                    if existing.meaning.is_empty() && !entry.meaning.is_empty() {
                        existing.meaning = entry.meaning.clone();
                    }
                }
                None => {
                    map.insert(
                        word.clone(),
                        RankedWord {
                            word: word.clone(),
                            meaning: entry.meaning.clone(),
                            strength: entry.mastery,
                            contexts: Vec::new(),
                            source: VocabSource::Knowledge,
                        },
                    );
                }
            }
        }
    }

    // 4. literal example sentences mined from the interaction log
    let mut context_sentences = Vec::new();
    for interaction in interactions {
        if let Some(input) = &interaction.user_input {
            context_sentences.push(input.clone());
        }
        for exposure in &interaction.words_to_add {
            let Some(sentence) = &exposure.context_sentence else { continue };
            if let Some(entry) = map.get_mut(&exposure.word) {
                if !entry.contexts.contains(sentence) {
                    entry.contexts.push(sentence.clone());
                }
            }
        }
    }
    if context_sentences.len() > CONTEXT_SENTENCE_CAP {
        context_sentences.drain(..context_sentences.len() - CONTEXT_SENTENCE_CAP);
    }

    // 5. topics and vocabulary touched in recent sessions
    let mut chat_topics = Vec::new();
    for session in recent_sessions {
        for topic in &session.topics_covered {
            if !chat_topics.contains(topic) {
                chat_topics.push(topic.clone());
            }
        }
        for used in &session.vocabulary_used {
            if let Some(entry) = map.get_mut(&used.word) {
                entry.strength = entry.strength.max(SESSION_STRENGTH_FLOOR);
            }
        }
    }

    // 6. final ranking: meaning required, weakest first
    let mut vocabulary: Vec<RankedWord> =
        map.into_values().filter(|w| !w.meaning.is_empty()).collect();
    vocabulary.sort_by(|a, b| {
        a.strength.partial_cmp(&b.strength).unwrap_or(std::cmp::Ordering::Equal)
    });

    let level = level_for_xp(progression.xp);
    let vocab_count = vocabulary.len();

    LearnerProfile {
        language: language.to_string(),
        xp: progression.xp,
        level,
        difficulty: difficulty_for_level(level),
        vocabulary,
        vocab_count,
        context_sentences,
        chat_topics,
        weak_topics: language_profile.map(|p| p.weak_topics.clone()).unwrap_or_default(),
        strong_topics: language_profile.map(|p| p.strong_topics.clone()).unwrap_or_default(),
        avg_fluency: language_profile.map(|p| p.avg_fluency).unwrap_or(0),
        total_sessions: language_profile.map(|p| p.total_sessions).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::merge_turn_facts;
    use crate::session::{TurnEvaluation, VocabularyItem};
    use chrono::Utc;

    fn record(word: &str, meaning: &str, strength: f64) -> WordRecord {
        WordRecord {
            word: word.into(),
            meaning: meaning.into(),
            strength,
            context: None,
        }
    }

    #[test]
    fn earlier_sources_win_per_word() {
        let bank = WordBank {
            user_used: vec![record("paani", "water", 0.6)],
            scene_used: vec![record("paani", "WRONG", 0.1), record("garam", "hot", 0.2)],
            all: vec![record("paani", "WRONG", 0.0)],
        };

        let profile = aggregate(
            "Hindi",
            &bank,
            &ProgressionState::default(),
            &KnowledgeBook::default(),
            &Vec::new(),
            &[],
        );

        let paani = profile.vocabulary.iter().find(|w| w.word == "paani").unwrap();
        assert_eq!(paani.meaning, "water");
        assert_eq!(paani.source, VocabSource::UserUsed);
        assert!((paani.strength - 0.6).abs() < 1e-9);
    }

    #[test]
    fn exposure_tally_converts_and_only_raises() {
        let bank = WordBank {
            user_used: vec![record("paani", "water", 0.9)],
            ..Default::default()
        };
        let mut progression = ProgressionState::default();
        progression.words_learned.insert("paani".into(), 2); // 0.30 estimate
        progression.words_learned.insert("naya".into(), 10); // capped at 1.0

        let profile = aggregate(
            "Hindi",
            &bank,
            &progression,
            &KnowledgeBook::default(),
            &Vec::new(),
            &[],
        );

        let paani = profile.vocabulary.iter().find(|w| w.word == "paani").unwrap();
        assert!((paani.strength - 0.9).abs() < 1e-9); // 0.30 does not lower 0.9

        // tally-only words carry no meaning, so they are filtered out of
        // the final ranking
        assert!(profile.vocabulary.iter().all(|w| w.word != "naya"));
    }

    #[test]
    fn knowledge_backfills_meanings() {
        let mut progression = ProgressionState::default();
        progression.words_learned.insert("garam".into(), 1);

        let mut knowledge = KnowledgeBook::default();
        let evaluation = TurnEvaluation {
            score: 50,
            new_vocabulary: vec![VocabularyItem { word: "garam".into(), meaning: "hot".into() }],
            ..Default::default()
        };
        merge_turn_facts(&mut knowledge, "Hindi", &evaluation, &[], Utc::now());

        let profile = aggregate(
            "Hindi",
            &WordBank::default(),
            &progression,
            &knowledge,
            &Vec::new(),
            &[],
        );

        let garam = profile.vocabulary.iter().find(|w| w.word == "garam").unwrap();
        assert_eq!(garam.meaning, "hot");
        assert_eq!(garam.source, VocabSource::Exposure);
        // exposure estimate 0.15 beats knowledge mastery 0.08
        assert!((garam.strength - 0.15).abs() < 1e-9);
    }

    #[test]
    fn recent_sessions_floor_strength() {
        let bank = WordBank {
            user_used: vec![record("paani", "water", 0.1)],
            ..Default::default()
        };
        let mut session = SessionRecord::new("s1", "Hindi");
        session.apply_turn(
            "hi",
            "hello",
            &TurnEvaluation {
                score: 60,
                new_vocabulary: vec![VocabularyItem { word: "paani".into(), meaning: "water".into() }],
                topics: vec!["water".into()],
                ..Default::default()
            },
            Utc::now(),
        );

        let profile = aggregate(
            "Hindi",
            &bank,
            &ProgressionState::default(),
            &KnowledgeBook::default(),
            &Vec::new(),
            &[session],
        );

        let paani = profile.vocabulary.iter().find(|w| w.word == "paani").unwrap();
        assert!((paani.strength - 0.3).abs() < 1e-9);
        assert_eq!(profile.chat_topics, vec!["water".to_string()]);
    }

    #[test]
    fn ranking_is_weakest_first_with_meanings_only() {
        let bank = WordBank {
            user_used: vec![
                record("strong", "known well", 0.8),
                record("weak", "barely known", 0.1),
                record("middle", "somewhat", 0.5),
                record("nameless", "", 0.0),
            ],
            ..Default::default()
        };

        let profile = aggregate(
            "Hindi",
            &bank,
            &ProgressionState::default(),
            &KnowledgeBook::default(),
            &Vec::new(),
            &[],
        );

        let order: Vec<&str> = profile.vocabulary.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(order, vec!["weak", "middle", "strong"]);
        assert_eq!(profile.vocab_count, 3);
    }

    #[test]
    fn interaction_log_supplies_contexts_and_sentences() {
        let bank = WordBank {
            user_used: vec![record("paani", "water", 0.2)],
            ..Default::default()
        };
        let interactions = vec![InteractionRecord {
            user_input: Some("mujhe paani chahiye".into()),
            words_to_add: vec![WordExposure {
                word: "paani".into(),
                meaning: "water".into(),
                context_sentence: Some("mujhe paani chahiye".into()),
            }],
        }];

        let profile = aggregate(
            "Hindi",
            &bank,
            &ProgressionState::default(),
            &KnowledgeBook::default(),
            &interactions,
            &[],
        );

        assert_eq!(profile.context_sentences, vec!["mujhe paani chahiye".to_string()]);
        let paani = profile.vocabulary.iter().find(|w| w.word == "paani").unwrap();
        assert_eq!(paani.contexts, vec!["mujhe paani chahiye".to_string()]);
    }
}
