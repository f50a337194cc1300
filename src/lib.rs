//! # Lingua Memory
//!
//! A learner memory and adaptive assessment engine for language practice.
//!
//! ## Architecture
//!
//! Learner state is tiered:
//! - **Tier 1: Session Memory** - one JSON document per conversation, with
//!   turn history, fluency scores, and the vocabulary/topics it touched
//! - **Tier 2: Facts Memory** - a durable per-language knowledge profile
//!   built by folding session turns in (vocabulary mastery, strong/weak
//!   topics, fluency trend)
//! - **Tier 3: Progression** - global XP, level, and difficulty tier
//!
//! Around the tiers sit the recall engine (lexical-overlap context
//! injection), the learner profile aggregator (multi-source vocabulary
//! ranking), the quiz lifecycle (generation, grading, XP award), and the
//! daily streak ledger.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lingua_memory::{Config, MemoryStore, TurnRequest};
//!
//! let store = MemoryStore::new(Config::default())?;
//!
//! // fold a conversational turn into session + facts memory
//! store.record_turn(turn_request)?;
//!
//! // recall relevant knowledge for the next prompt
//! let context = store.build_context("tell me about food", "Hindi")?;
//!
//! // drive the quiz lifecycle
//! let quiz = store.generate_quiz("Hindi", Some(6), &completion).await?;
//! let outcome = store.evaluate_quiz(&quiz.quiz_id, answers, &completion).await?;
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod profile;
pub mod progress;
pub mod quiz;
pub mod recall;
pub mod session;
pub mod storage;
pub mod streak;

pub use completion::{CompletionClient, HttpCompletionClient};
pub use config::Config;
pub use error::{Error, Result};
pub use knowledge::{KnowledgeBook, LanguageProfile, VocabularyEntry};
pub use memory::{EvaluationOutcome, MemoryStore, TurnOutcome, TurnRequest};
pub use profile::LearnerProfile;
pub use progress::{Difficulty, ProgressionState};
pub use quiz::{Answer, Question, QuizDocument, QuizResults, QuizStatus};
pub use recall::RecallContext;
pub use session::{Role, SessionRecord, TurnEvaluation};
pub use streak::{StreakLedger, StreakStats};
