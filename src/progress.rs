//! Global progression state: XP, level thresholds, difficulty tiers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Document key for the progression state
pub const PROGRESS_KEY: &str = "progress.json";

/// XP required to reach each level; index 0 is level 1.
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 500, 800, 1200, 1700, 2300, 3000, 4000];

/// Difficulty tier derived from level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Beginner => write!(f, "beginner"),
            Difficulty::Intermediate => write!(f, "intermediate"),
            Difficulty::Advanced => write!(f, "advanced"),
            Difficulty::Expert => write!(f, "expert"),
        }
    }
}

/// Level for a given XP total: the highest threshold not exceeding it
pub fn level_for_xp(xp: u64) -> u32 {
    let mut level = 1;
    for (index, threshold) in LEVEL_THRESHOLDS.iter().enumerate().rev() {
        if xp >= *threshold {
            level = index as u32 + 1;
            break;
        }
    }
    level
}

/// XP threshold of the next level, or None at max level
pub fn xp_for_next_level(level: u32) -> Option<u64> {
    LEVEL_THRESHOLDS.get(level as usize).copied()
}

/// Difficulty tier for a level (four bands)
pub fn difficulty_for_level(level: u32) -> Difficulty {
    match level {
        0..=2 => Difficulty::Beginner,
        3..=4 => Difficulty::Intermediate,
        5..=7 => Difficulty::Advanced,
        _ => Difficulty::Expert,
    }
}

/// Outcome of an XP award
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpAward {
    pub xp_earned: u64,
    pub total_xp: u64,
    pub level: u32,
    pub difficulty: Difficulty,
    pub leveled_up: bool,
}

/// The persisted global progression document. XP only moves forward; no
/// level-down path exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionState {
    pub xp: u64,
    pub level: u32,
    pub difficulty: Difficulty,

    /// Raw exposure tally per word, read by the profile aggregator
    #[serde(default)]
    pub words_learned: BTreeMap<String, u32>,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            difficulty: Difficulty::Beginner,
            words_learned: BTreeMap::new(),
        }
    }
}

impl ProgressionState {
    /// Add XP and rederive level/difficulty, reporting whether a level
    /// boundary was crossed.
    pub fn add_xp(&mut self, amount: u64) -> XpAward {
        let old_level = level_for_xp(self.xp);
        self.xp += amount;
        self.level = level_for_xp(self.xp);
        self.difficulty = difficulty_for_level(self.level);

        XpAward {
            xp_earned: amount,
            total_xp: self.xp,
            level: self.level,
            difficulty: self.difficulty,
            leveled_up: self.level > old_level,
        }
    }

    /// Bump the exposure count for a word
    pub fn record_word_exposure(&mut self, word: &str) {
        *self.words_learned.entry(word.to_string()).or_insert(0) += 1;
    }
}
