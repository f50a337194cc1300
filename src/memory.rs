//! The main memory store that coordinates all storage backends and domain
//! operations: recording turns, recalling knowledge, aggregating the
//! learner profile, and driving the quiz lifecycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::knowledge::{merge_turn_facts, KnowledgeBook, KNOWLEDGE_KEY};
use crate::profile::{
    aggregate, InteractionLog, LearnerProfile, WordBank, INTERACTIONS_KEY, WORD_BANK_KEY,
};
use crate::progress::{ProgressionState, XpAward, PROGRESS_KEY};
use crate::quiz::{
    evaluate_quiz, generate_quiz, Answer, QuizDocument, QuizResults, QuizSummary,
};
use crate::recall::build_recall;
use crate::session::{SessionRecord, SessionSummary, TurnEvaluation};
use crate::storage::{DocumentStore, QuizStore, SessionStore};
use crate::streak::{
    compute_streak, recent_days, record_hit, DayActivity, DayCell, StreakLedger, StreakStats,
    STREAK_KEY,
};

/// One conversational turn handed to the engine after a reply was produced
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// Existing session to continue, or None to start a new one
    pub session_id: Option<String>,
    pub language: String,
    pub user_message: String,
    pub assistant_reply: String,
    pub evaluation: TurnEvaluation,
}

/// Result of folding a turn into session and facts memory
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub message_count: usize,
    pub avg_fluency: u32,
}

/// Result of a quiz evaluation, including the progression delta
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub quiz_id: String,
    pub results: QuizResults,
    pub progression: XpAward,
}

/// The main memory store coordinating all storage backends
pub struct MemoryStore {
    config: Config,
    documents: DocumentStore,
    sessions: SessionStore,
    quizzes: QuizStore,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_dirs()?;

        let documents = DocumentStore::new(&config)?;
        let sessions = SessionStore::new(&config)?;
        let quizzes = QuizStore::new(&config)?;

        Ok(Self {
            config,
            documents,
            sessions,
            quizzes,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the session storage
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Get the quiz storage
    pub fn quizzes(&self) -> &QuizStore {
        &self.quizzes
    }

    /// Get the document storage
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    // --- Facts memory ---

    /// Load the knowledge book
    pub fn knowledge(&self) -> Result<KnowledgeBook> {
        self.documents.read_or_default(KNOWLEDGE_KEY, KnowledgeBook::default())
    }

    fn save_knowledge(&self, mut book: KnowledgeBook) -> Result<()> {
        book.last_updated = Some(Utc::now());
        self.documents.write(KNOWLEDGE_KEY, &book)
    }

    // --- Progression ---

    /// Load the global progression state
    pub fn progression(&self) -> Result<ProgressionState> {
        self.documents.read_or_default(PROGRESS_KEY, ProgressionState::default())
    }

    fn save_progression(&self, state: &ProgressionState) -> Result<()> {
        self.documents.write(PROGRESS_KEY, state)
    }

    // --- Streak ---

    /// Record one qualifying interaction for today's streak entry
    pub fn record_activity(&self) -> Result<DayActivity> {
        let mut ledger: StreakLedger =
            self.documents.read_or_default(STREAK_KEY, StreakLedger::new())?;
        let entry = record_hit(&mut ledger, Utc::now());
        self.documents.write(STREAK_KEY, &ledger)?;
        Ok(entry)
    }

    /// Current streak statistics plus an n-day calendar window
    pub fn streak(&self, window: usize) -> Result<(StreakStats, Vec<DayCell>)> {
        let ledger: StreakLedger =
            self.documents.read_or_default(STREAK_KEY, StreakLedger::new())?;
        let today = Utc::now().date_naive();
        Ok((compute_streak(&ledger, today), recent_days(&ledger, today, window)))
    }

    // --- Turns ---

    /// Fold one conversational turn into session memory, then into the
    /// per-language knowledge profile, and record a streak hit.
    pub fn record_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        if request.language.is_empty() {
            return Err(Error::invalid_input("language is required"));
        }
        if request.user_message.is_empty() {
            return Err(Error::invalid_input("user_message is required"));
        }

        let session_id = request
            .session_id
            .unwrap_or_else(|| format!("chat_{}", Uuid::new_v4().simple()));

        let mut session = match self.sessions.load(&session_id)? {
            Some(session) => session,
            None => {
                tracing::info!(session_id = %session_id, language = %request.language, "new session");
                SessionRecord::new(&session_id, &request.language)
            }
        };

        session.apply_turn(
            &request.user_message,
            &request.assistant_reply,
            &request.evaluation,
            Utc::now(),
        );
        self.sessions.save(&mut session)?;

        // facts memory fold: counts are re-derived from the full session
        // listing, so the listing must reflect the save above
        let mut book = self.knowledge()?;
        let summaries = self.sessions.list()?;
        merge_turn_facts(&mut book, &request.language, &request.evaluation, &summaries, Utc::now());
        self.save_knowledge(book)?;

        self.record_activity()?;

        Ok(TurnOutcome {
            session_id,
            message_count: session.messages.len(),
            avg_fluency: session.avg_fluency,
        })
    }

    // --- Recall ---

    /// Build the recall block for an incoming message, or None when no
    /// prior knowledge is relevant.
    pub fn build_context(&self, message: &str, language: &str) -> Result<Option<String>> {
        let book = self.knowledge()?;
        Ok(build_recall(&book, message, language, &self.config).map(|c| c.format_for_prompt()))
    }

    // --- Sessions ---

    /// Lightweight list of all sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.sessions.list()
    }

    /// Full session record by id
    pub fn session(&self, session_id: &str) -> Result<SessionRecord> {
        self.sessions
            .load(session_id)?
            .ok_or_else(|| Error::not_found(format!("session \"{session_id}\"")))
    }

    // --- Learner profile ---

    /// Aggregate every memory source into the unified learner profile
    pub fn learner_profile(&self, language: &str) -> Result<LearnerProfile> {
        let word_bank: WordBank =
            self.documents.read_or_default(WORD_BANK_KEY, WordBank::default())?;
        let interactions: InteractionLog =
            self.documents.read_or_default(INTERACTIONS_KEY, InteractionLog::default())?;
        let progression = self.progression()?;
        let knowledge = self.knowledge()?;

        // the most recent sessions for this language, oldest of the window
        // first so later sessions win ties
        let mut recent: Vec<SessionRecord> = Vec::new();
        for summary in self.sessions.list()? {
            if recent.len() >= self.config.recent_session_window {
                break;
            }
            if summary.language == language {
                if let Some(session) = self.sessions.load(&summary.id)? {
                    recent.push(session);
                }
            }
        }
        recent.reverse();

        Ok(aggregate(language, &word_bank, &progression, &knowledge, &interactions, &recent))
    }

    // --- Quiz lifecycle ---

    /// Generate and persist a pending quiz for a language
    pub async fn generate_quiz(
        &self,
        language: &str,
        num_questions: Option<u32>,
        completion: &dyn CompletionClient,
    ) -> Result<QuizDocument> {
        if language.is_empty() {
            return Err(Error::invalid_input("language is required"));
        }

        let profile = self.learner_profile(language)?;
        let quiz =
            generate_quiz(&profile, num_questions, completion, self.config.completion_retries)
                .await?;
        self.quizzes.save(&quiz)?;
        Ok(quiz)
    }

    /// Grade a pending quiz, award XP, and persist the completed document
    pub async fn evaluate_quiz(
        &self,
        quiz_id: &str,
        answers: Vec<Answer>,
        completion: &dyn CompletionClient,
    ) -> Result<EvaluationOutcome> {
        let mut quiz = self
            .quizzes
            .load(quiz_id)?
            .ok_or_else(|| Error::not_found(format!("quiz \"{quiz_id}\"")))?;

        let mut progression = self.progression()?;
        let (results, award) = evaluate_quiz(
            &mut quiz,
            answers,
            &mut progression,
            completion,
            self.config.completion_retries,
        )
        .await?;

        self.save_progression(&progression)?;
        self.quizzes.save(&quiz)?;
        self.record_activity()?;

        Ok(EvaluationOutcome {
            quiz_id: quiz.quiz_id,
            results,
            progression: award,
        })
    }

    /// All past quizzes with grading data, newest first
    pub fn quiz_history(&self) -> Result<Vec<QuizSummary>> {
        self.quizzes.list()
    }

    /// One quiz document by id
    pub fn quiz(&self, quiz_id: &str) -> Result<QuizDocument> {
        self.quizzes
            .load(quiz_id)?
            .ok_or_else(|| Error::not_found(format!("quiz \"{quiz_id}\"")))
    }

    // --- Reset ---

    /// Reset every document to its default shape and clear the session and
    /// quiz collections. The only path that ever deletes a language profile.
    pub fn reset_all(&self) -> Result<()> {
        self.documents.write(KNOWLEDGE_KEY, &KnowledgeBook::default())?;
        self.documents.write(PROGRESS_KEY, &ProgressionState::default())?;
        self.documents.write(WORD_BANK_KEY, &WordBank::default())?;
        self.documents.write(INTERACTIONS_KEY, &InteractionLog::default())?;
        self.documents.write(STREAK_KEY, &StreakLedger::new())?;

        let sessions = self.sessions.delete_all()?;
        let quizzes = self.quizzes.delete_all()?;
        tracing::info!(sessions, quizzes, "reset all learner data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedClient;
    use crate::session::VocabularyItem;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(Config::with_data_dir(dir.path())).unwrap();
        (dir, store)
    }

    fn turn(session_id: Option<&str>, score: u32, word: &str, topic: &str) -> TurnRequest {
        TurnRequest {
            session_id: session_id.map(String::from),
            language: "Hindi".into(),
            user_message: format!("how do I say {word}?"),
            assistant_reply: "like this".into(),
            evaluation: TurnEvaluation {
                score,
                new_vocabulary: vec![VocabularyItem { word: word.into(), meaning: "meaning".into() }],
                topics: vec![topic.into()],
                ..Default::default()
            },
        }
    }

    #[test]
    fn record_turn_updates_session_facts_and_streak() {
        let (_dir, store) = store();

        let outcome = store.record_turn(turn(None, 80, "paani", "basics")).unwrap();
        assert_eq!(outcome.message_count, 2);
        assert_eq!(outcome.avg_fluency, 80);

        // continue the same session
        let outcome =
            store.record_turn(turn(Some(&outcome.session_id), 60, "garam", "food")).unwrap();
        assert_eq!(outcome.message_count, 4);
        assert_eq!(outcome.avg_fluency, 70);

        let book = store.knowledge().unwrap();
        let profile = book.profile("Hindi").unwrap();
        assert_eq!(profile.total_sessions, 1);
        assert_eq!(profile.total_messages, 4);
        assert!(profile.vocabulary.contains_key("paani"));
        assert!(profile.vocabulary.contains_key("garam"));

        let (stats, _) = store.streak(7).unwrap();
        assert_eq!(stats.current, 1);
        assert_eq!(stats.today_hits, 2);
    }

    #[test]
    fn record_turn_validates_input() {
        let (_dir, store) = store();
        let mut request = turn(None, 50, "paani", "basics");
        request.language = String::new();
        assert!(matches!(store.record_turn(request), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn recall_gates_on_overlap() {
        let (_dir, store) = store();
        store.record_turn(turn(None, 80, "paani", "basics")).unwrap();

        assert!(store.build_context("totally unrelated", "Hindi").unwrap().is_none());
        let context = store.build_context("more about paani please", "Hindi").unwrap().unwrap();
        assert!(context.contains("paani"));
        assert!(store.build_context("paani", "Spanish").unwrap().is_none());
    }

    #[tokio::test]
    async fn quiz_round_trip_awards_xp_once() {
        let (_dir, store) = store();
        for word in ["ek", "do", "teen", "char", "paanch"] {
            store.record_turn(turn(None, 80, word, "numbers")).unwrap();
        }

        let generation_reply = serde_json::json!({
            "questions": [
                {"id": 0, "type": "listening_mcq", "word": "ek", "correct_answer": "one",
                 "options": ["one", "two", "three", "four"]},
                {"id": 1, "type": "listening_mcq", "word": "do", "correct_answer": "two",
                 "options": ["one", "two", "three", "four"]},
                {"id": 2, "type": "listening_mcq", "word": "teen", "correct_answer": "three",
                 "options": ["one", "two", "three", "four"]},
                {"id": 3, "type": "listening_mcq", "word": "char", "correct_answer": "four",
                 "options": ["one", "two", "three", "four"]}
            ]
        });
        let client = ScriptedClient::new(vec![&generation_reply.to_string()]);

        let quiz = store.generate_quiz("Hindi", Some(4), &client).await.unwrap();
        assert_eq!(store.quiz(&quiz.quiz_id).unwrap().num_questions, 4);

        let answers: Vec<Answer> = [(0, "one"), (1, "two"), (2, "three"), (3, "four")]
            .iter()
            .map(|(id, a)| Answer { question_id: *id, answer: (*a).into() })
            .collect();

        let outcome = store.evaluate_quiz(&quiz.quiz_id, answers.clone(), &client).await.unwrap();
        assert_eq!(outcome.results.total_score, 100);
        assert_eq!(outcome.results.xp_earned, 20);
        assert_eq!(store.progression().unwrap().xp, 20);

        // second evaluation is rejected with the prior results, no new XP
        let err = store.evaluate_quiz(&quiz.quiz_id, answers, &client).await.unwrap_err();
        assert!(matches!(err, Error::QuizCompleted(_)));
        assert_eq!(store.progression().unwrap().xp, 20);

        let history = store.quiz_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_score, Some(100));
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let (_dir, store) = store();
        let client = ScriptedClient::new(vec![]);
        let err = store.evaluate_quiz("quiz_missing", Vec::new(), &client).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn reset_all_restores_defaults() {
        let (_dir, store) = store();
        store.record_turn(turn(None, 80, "paani", "basics")).unwrap();

        store.reset_all().unwrap();
        assert!(store.knowledge().unwrap().languages.is_empty());
        assert_eq!(store.progression().unwrap().xp, 0);
        assert!(store.list_sessions().unwrap().is_empty());
        let (stats, _) = store.streak(7).unwrap();
        assert_eq!(stats.current, 0);
    }
}
