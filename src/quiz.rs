//! Quiz lifecycle: generation, defensive normalization, grading, XP award
//!
//! Question authoring and speaking-answer grading are delegated to the
//! external completion service; everything it returns is treated as
//! untrusted and normalized before it reaches a persisted document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::error::{Error, Result};
use crate::profile::{LearnerProfile, RankedWord};
use crate::progress::{Difficulty, ProgressionState, XpAward};

/// Allowed question-count range; requests are clamped into it
pub const MIN_QUESTIONS: u32 = 4;
pub const MAX_QUESTIONS: u32 = 8;
pub const DEFAULT_QUESTIONS: u32 = 6;

/// XP granted per question at a perfect score
const XP_PER_QUESTION: f64 = 5.0;

/// Strength below which a word belongs to the weak half of the target set
const WEAK_CUTOFF: f64 = 0.5;

/// Share of the target set drawn from the weak half
const WEAK_SHARE: f64 = 0.7;

const MCQ_OPTION_COUNT: usize = 4;
const OPTION_PLACEHOLDER: &str = "(no option)";
const FALLBACK_FEEDBACK: &str = "Could not evaluate this answer automatically.";

/// Quiz document state; the pending -> completed transition is one-way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Pending,
    Completed,
}

/// A key vocabulary hint shown alongside a speaking prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintWord {
    pub word: String,
    #[serde(default)]
    pub meaning: String,
}

/// A quiz question, tagged by type. Grading and normalization match on
/// this exhaustively, so a new question type surfaces every site needing
/// an update at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    ListeningMcq {
        id: u32,
        word: String,
        #[serde(default)]
        word_romanized: String,
        correct_answer: String,
        options: Vec<String>,
        #[serde(default)]
        audio_text: String,
    },
    Speaking {
        id: u32,
        sentence_en: String,
        expected_answer: String,
        #[serde(default)]
        expected_answer_romanized: String,
        #[serde(default)]
        acceptable_variations: Vec<String>,
        #[serde(default)]
        hint_words: Vec<HintWord>,
        #[serde(default)]
        audio_text: String,
    },
}

impl Question {
    pub fn id(&self) -> u32 {
        match self {
            Question::ListeningMcq { id, .. } | Question::Speaking { id, .. } => *id,
        }
    }

    fn set_id(&mut self, new_id: u32) {
        match self {
            Question::ListeningMcq { id, .. } | Question::Speaking { id, .. } => *id = new_id,
        }
    }
}

/// One submitted answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(alias = "questionId")]
    pub question_id: u32,
    pub answer: String,
}

/// Theme metadata reported by the generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizMetadata {
    pub theme: String,
    pub focus_area: String,
    pub estimated_difficulty: String,
}

/// Learner state captured at generation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub xp: u64,
    pub level: u32,
    pub vocab_count: usize,
    pub avg_fluency: u32,
}

/// Question kind discriminant used in grading results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    ListeningMcq,
    Speaking,
}

/// Per-question grading outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: u32,
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_en: Option<String>,
    pub user_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation_tip: Option<String>,
    pub correct: bool,
    pub score: u32,
    pub feedback: String,
}

/// Aggregate grading attached to a completed quiz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResults {
    pub question_results: Vec<QuestionResult>,
    pub total_score: u32,
    pub correct_count: usize,
    pub total_questions: usize,
    pub xp_earned: u64,
    pub leveled_up: bool,
    pub graded_at: DateTime<Utc>,
}

/// The persisted quiz document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDocument {
    pub quiz_id: String,
    pub language: String,
    pub level: u32,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub questions: Vec<Question>,
    pub quiz_metadata: QuizMetadata,
    pub learner_snapshot: LearnerSnapshot,
    pub status: QuizStatus,
    pub answers: Option<Vec<Answer>>,
    pub results: Option<QuizResults>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// History view of a quiz: headline numbers flattened out of the results,
/// plus the full question/answer/grading data for a review screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSummary {
    pub quiz_id: String,
    pub language: String,
    pub level: u32,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub status: QuizStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_score: Option<u32>,
    pub xp_earned: Option<u64>,
    pub correct_count: Option<usize>,
    pub questions: Vec<Question>,
    pub answers: Option<Vec<Answer>>,
    pub question_results: Option<Vec<QuestionResult>>,
}

impl From<&QuizDocument> for QuizSummary {
    fn from(quiz: &QuizDocument) -> Self {
        Self {
            quiz_id: quiz.quiz_id.clone(),
            language: quiz.language.clone(),
            level: quiz.level,
            difficulty: quiz.difficulty,
            num_questions: quiz.num_questions,
            status: quiz.status,
            created_at: quiz.created_at,
            completed_at: quiz.completed_at,
            total_score: quiz.results.as_ref().map(|r| r.total_score),
            xp_earned: quiz.results.as_ref().map(|r| r.xp_earned),
            correct_count: quiz.results.as_ref().map(|r| r.correct_count),
            questions: quiz.questions.clone(),
            answers: quiz.answers.clone(),
            question_results: quiz.results.as_ref().map(|r| r.question_results.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Pick the words a quiz should target: mostly the weak half, order
/// preserved from the aggregator's weakest-first ranking, topped up with
/// strong words for reinforcement.
fn select_target_words(vocabulary: &[RankedWord], question_count: u32) -> Vec<&RankedWord> {
    let weak: Vec<&RankedWord> = vocabulary.iter().filter(|w| w.strength < WEAK_CUTOFF).collect();
    let strong: Vec<&RankedWord> = vocabulary.iter().filter(|w| w.strength >= WEAK_CUTOFF).collect();

    let target = usize::min(question_count as usize * 2, vocabulary.len());
    let weak_count = usize::min((target as f64 * WEAK_SHARE).ceil() as usize, weak.len());
    let strong_count = usize::min(target - weak_count, strong.len());

    weak.into_iter()
        .take(weak_count)
        .chain(strong.into_iter().take(strong_count))
        .collect()
}

fn difficulty_calibration(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Beginner => {
            "BEGINNER MODE: only simple, high-frequency words; MCQ distractors \
             clearly different from the correct answer; speaking sentences of \
             2-4 words; be generous and build confidence."
        }
        Difficulty::Intermediate => {
            "INTERMEDIATE MODE: mix simple and moderately complex vocabulary; \
             plausible but distinguishable MCQ distractors; speaking sentences \
             of 4-6 words; challenge without frustrating."
        }
        Difficulty::Advanced => {
            "ADVANCED MODE: complex vocabulary and idiomatic expressions; \
             subtle MCQ distractors with related meanings; speaking sentences \
             of 6-10 words with proper grammar."
        }
        Difficulty::Expert => {
            "EXPERT MODE: advanced vocabulary, idioms, compound sentences; \
             near-synonym MCQ distractors; speaking sentences of 8+ words; \
             expect near-native answers and grade demandingly."
        }
    }
}

fn build_generation_prompts(profile: &LearnerProfile, question_count: u32) -> (String, String) {
    let topics_or = |topics: &[String]| {
        if topics.is_empty() { "none yet".to_string() } else { topics.join(", ") }
    };

    let system = format!(
        "You are an expert language quiz generator for a {language} learning \
         application. Generate a quiz with EXACTLY {question_count} questions.\n\n\
         LEARNER PROFILE\n\
         - Level {level}/10 ({difficulty}), total XP {xp}\n\
         - Known vocabulary: {vocab_count} words, average fluency {avg_fluency}/100\n\
         - Strong topics: {strong}\n\
         - Weak topics: {weak}\n\n\
         DIFFICULTY CALIBRATION\n{calibration}\n\n\
         QUESTION TYPES\n\
         1. \"listening_mcq\" - a {language} word is played via TTS and the \
         learner picks its English meaning from 4 options:\n\
         {{\"id\": 0, \"type\": \"listening_mcq\", \"word\": \"<{language} word>\", \
         \"word_romanized\": \"<romanization>\", \"correct_answer\": \"<English meaning>\", \
         \"options\": [\"A\", \"B\", \"C\", \"D\"], \"audio_text\": \"<{language} text for TTS>\"}}\n\
         Options must be exactly 4 unique, plausible English strings, one of \
         them exactly equal to correct_answer, its position varied.\n\
         2. \"speaking\" - an English sentence is shown and the learner speaks \
         the {language} translation, transcribed by speech recognition:\n\
         {{\"id\": 1, \"type\": \"speaking\", \"sentence_en\": \"<English sentence>\", \
         \"expected_answer\": \"<ideal {language} translation>\", \
         \"expected_answer_romanized\": \"<romanization>\", \
         \"acceptable_variations\": [\"<alt 1>\", \"<alt 2>\"], \
         \"hint_words\": [{{\"word\": \"<key word>\", \"meaning\": \"<meaning>\"}}], \
         \"audio_text\": \"<the English sentence>\"}}\n\n\
         OUTPUT FORMAT\n\
         Return ONLY a valid JSON object, no markdown fences, no extra text:\n\
         {{\"questions\": [...], \"quiz_metadata\": {{\"theme\": \"<topic>\", \
         \"focus_area\": \"<skill tested>\", \"estimated_difficulty\": \"easy | medium | hard\"}}}}\n\n\
         RULES\n\
         - sequential ids starting from 0\n\
         - roughly half listening_mcq and half speaking\n\
         - every question must use words from the provided vocabulary list\n\
         - never repeat the same word across questions\n\
         - all {language} text in its correct native script",
        language = profile.language,
        question_count = question_count,
        level = profile.level,
        difficulty = profile.difficulty,
        xp = profile.xp,
        vocab_count = profile.vocab_count,
        avg_fluency = profile.avg_fluency,
        strong = topics_or(&profile.strong_topics),
        weak = topics_or(&profile.weak_topics),
        calibration = difficulty_calibration(profile.difficulty),
    );

    let target_words = select_target_words(&profile.vocabulary, question_count);
    let vocab_lines: Vec<String> = target_words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let context = w
                .contexts
                .first()
                .map(|c| format!(", used in: \"{c}\""))
                .unwrap_or_default();
            format!(
                "{}. \"{}\" = \"{}\" (strength {}%{})",
                i + 1,
                w.word,
                w.meaning,
                (w.strength * 100.0).round() as u32,
                context
            )
        })
        .collect();

    let mut user = format!(
        "Generate a {question_count}-question {} quiz.\n\nVOCABULARY TO USE\n{}",
        profile.language,
        vocab_lines.join("\n")
    );
    if !profile.context_sentences.is_empty() {
        let recent: Vec<String> = profile
            .context_sentences
            .iter()
            .rev()
            .take(5)
            .map(|s| format!("- \"{s}\""))
            .collect();
        user.push_str(&format!("\n\nRecent sentences the learner practiced:\n{}", recent.join("\n")));
    }
    if !profile.chat_topics.is_empty() {
        user.push_str(&format!("\n\nTopics from recent chats: {}", profile.chat_topics.join(", ")));
    }
    if !profile.weak_topics.is_empty() {
        user.push_str(&format!("\n\nWeak areas to focus on: {}", profile.weak_topics.join(", ")));
    }
    user.push_str("\n\nGenerate the quiz now. Return ONLY the JSON.");

    (system, user)
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value[key]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Normalize one raw question from the generation reply. Returns None for
/// an unrecognized type.
fn normalize_question(raw: &Value) -> Option<Question> {
    match raw["type"].as_str()? {
        "listening_mcq" => {
            let word = string_field(raw, "word");
            let correct_answer = string_field(raw, "correct_answer");

            let mut options = string_list(raw, "options");
            if options.is_empty() {
                options = vec![
                    correct_answer.clone(),
                    "unknown".to_string(),
                    "unclear".to_string(),
                    "other".to_string(),
                ];
            }
            // the correct answer must be selectable even when the service
            // forgot to include it
            if !options.contains(&correct_answer) {
                options[0] = correct_answer.clone();
            }
            options.truncate(MCQ_OPTION_COUNT);
            while options.len() < MCQ_OPTION_COUNT {
                options.push(OPTION_PLACEHOLDER.to_string());
            }

            let audio_text = match string_field(raw, "audio_text") {
                text if text.is_empty() => word.clone(),
                text => text,
            };

            Some(Question::ListeningMcq {
                id: 0,
                word,
                word_romanized: string_field(raw, "word_romanized"),
                correct_answer,
                options,
                audio_text,
            })
        }
        "speaking" => {
            let sentence_en = string_field(raw, "sentence_en");
            let hint_words = raw["hint_words"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|h| {
                            h["word"].as_str().map(|word| HintWord {
                                word: word.to_string(),
                                meaning: string_field(h, "meaning"),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            let audio_text = match string_field(raw, "audio_text") {
                text if text.is_empty() => sentence_en.clone(),
                text => text,
            };

            Some(Question::Speaking {
                id: 0,
                sentence_en,
                expected_answer: string_field(raw, "expected_answer"),
                expected_answer_romanized: string_field(raw, "expected_answer_romanized"),
                acceptable_variations: string_list(raw, "acceptable_variations"),
                hint_words,
                audio_text,
            })
        }
        _ => None,
    }
}

fn normalize_questions(reply: &Value) -> Result<Vec<Question>> {
    let raw = reply["questions"]
        .as_array()
        .ok_or_else(|| Error::completion("generation reply carried no questions array"))?;

    let mut questions: Vec<Question> = raw.iter().filter_map(normalize_question).collect();
    if questions.is_empty() {
        return Err(Error::completion("generation reply carried no usable questions"));
    }

    // ids are reassigned sequentially regardless of what the service returned
    for (index, question) in questions.iter_mut().enumerate() {
        question.set_id(index as u32);
    }
    Ok(questions)
}

/// Generate a quiz from the aggregated learner profile. Fails without
/// writing anything when the profile has too little vocabulary.
pub async fn generate_quiz(
    profile: &LearnerProfile,
    requested_questions: Option<u32>,
    completion: &dyn CompletionClient,
    retries: u32,
) -> Result<QuizDocument> {
    let question_count = requested_questions
        .unwrap_or(DEFAULT_QUESTIONS)
        .clamp(MIN_QUESTIONS, MAX_QUESTIONS);

    if profile.vocabulary.len() < MIN_QUESTIONS as usize {
        return Err(Error::insufficient_data(format!(
            "need at least {MIN_QUESTIONS} vocabulary words with meanings, have {}",
            profile.vocabulary.len()
        )));
    }

    let (system, user) = build_generation_prompts(profile, question_count);
    let reply = completion.complete_json(&system, &user, retries).await?;
    let questions = normalize_questions(&reply)?;

    let quiz_metadata = serde_json::from_value(reply["quiz_metadata"].clone()).unwrap_or(
        QuizMetadata {
            theme: "Mixed".to_string(),
            focus_area: "vocabulary".to_string(),
            estimated_difficulty: profile.difficulty.to_string(),
        },
    );

    let quiz = QuizDocument {
        quiz_id: format!("quiz_{}", Uuid::new_v4().simple()),
        language: profile.language.clone(),
        level: profile.level,
        difficulty: profile.difficulty,
        num_questions: questions.len(),
        questions,
        quiz_metadata,
        learner_snapshot: LearnerSnapshot {
            xp: profile.xp,
            level: profile.level,
            vocab_count: profile.vocab_count,
            avg_fluency: profile.avg_fluency,
        },
        status: QuizStatus::Pending,
        answers: None,
        results: None,
        created_at: Utc::now(),
        completed_at: None,
    };

    tracing::info!(
        quiz_id = %quiz.quiz_id,
        language = %quiz.language,
        questions = quiz.num_questions,
        difficulty = %quiz.difficulty,
        "generated quiz"
    );
    Ok(quiz)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// One speaking question queued for the batched grading call
struct SpeakingItem {
    question_id: u32,
    sentence_en: String,
    expected_answer: String,
    expected_answer_romanized: String,
    acceptable_variations: Vec<String>,
    answer: String,
}

fn build_grading_prompts(quiz: &QuizDocument, speaking: &[SpeakingItem]) -> (String, String) {
    let system = format!(
        "You are a {language} language quiz evaluator. Learner level: \
         {level}/10 ({difficulty}).\n\n\
         The learner translated English sentences into {language} by voice; \
         answers come from speech recognition and may be romanized, \
         transliterated, colloquial, or carry transcription noise.\n\n\
         EVALUATION RULES\n\
         1. Meaning matters most; if the core meaning matches, score well.\n\
         2. Accept romanized text, compared phonetically to the expected answer.\n\
         3. Accept mixed-script and informal alternatives.\n\
         4. Minor spelling or transcription errors reduce the score only slightly.\n\
         5. Empty or nonsensical answers score 0-10.\n\
         6. Compare against expected_answer AND acceptable_variations.\n\n\
         A question is correct when its score is 60 or above.\n\n\
         Return ONLY valid JSON, no markdown:\n\
         {{\"evaluations\": [{{\"questionId\": <number>, \"score\": <0-100>, \
         \"correct\": <true|false>, \"feedback\": \"<specific feedback>\", \
         \"corrected_answer\": \"<ideal {language} answer>\", \
         \"pronunciation_tip\": \"<optional tip>\"}}]}}",
        language = quiz.language,
        level = quiz.level,
        difficulty = quiz.difficulty,
    );

    let blocks: Vec<String> = speaking
        .iter()
        .map(|item| {
            format!(
                "Question {}:\n  English prompt: \"{}\"\n  Expected {}: \"{}\"\n  \
                 Romanized expected: \"{}\"\n  Acceptable alternatives: {}\n  \
                 Answer from speech recognition: \"{}\"",
                item.question_id,
                item.sentence_en,
                quiz.language,
                item.expected_answer,
                item.expected_answer_romanized,
                serde_json::to_string(&item.acceptable_variations)
                    .unwrap_or_else(|_| "[]".to_string()),
                item.answer,
            )
        })
        .collect();

    let user = format!(
        "Evaluate these {} speaking answers:\n\n{}\n\nGrade each one carefully. Return the JSON.",
        speaking.len(),
        blocks.join("\n---\n")
    );

    (system, user)
}

fn fallback_speaking_result(item: &SpeakingItem) -> QuestionResult {
    QuestionResult {
        question_id: item.question_id,
        kind: QuestionKind::Speaking,
        word: None,
        sentence_en: Some(item.sentence_en.clone()),
        user_answer: item.answer.clone(),
        expected_answer: Some(item.expected_answer.clone()),
        corrected_answer: Some(item.expected_answer.clone()),
        pronunciation_tip: None,
        correct: false,
        score: 0,
        feedback: FALLBACK_FEEDBACK.to_string(),
    }
}

fn grade_mcq(id: u32, word: &str, correct_answer: &str, answer: &str) -> QuestionResult {
    let correct = !answer.is_empty() && answer.to_lowercase() == correct_answer.to_lowercase();
    QuestionResult {
        question_id: id,
        kind: QuestionKind::ListeningMcq,
        word: Some(word.to_string()),
        sentence_en: None,
        user_answer: answer.to_string(),
        expected_answer: Some(correct_answer.to_string()),
        corrected_answer: None,
        pronunciation_tip: None,
        correct,
        score: if correct { 100 } else { 0 },
        feedback: if correct {
            "Correct! Great listening.".to_string()
        } else {
            format!("Incorrect. \"{word}\" means \"{correct_answer}\".")
        },
    }
}

/// Grade a pending quiz in place and award XP to the progression state.
///
/// MCQ questions are graded deterministically; speaking questions are
/// batched into one completion call and fall back to zero scores when that
/// call fails, so the quiz is never left ungraded. A completed quiz is
/// rejected with its original results attached.
pub async fn evaluate_quiz(
    quiz: &mut QuizDocument,
    answers: Vec<Answer>,
    progression: &mut ProgressionState,
    completion: &dyn CompletionClient,
    retries: u32,
) -> Result<(QuizResults, XpAward)> {
    if quiz.status == QuizStatus::Completed {
        let results = quiz
            .results
            .clone()
            .ok_or_else(|| Error::storage("completed quiz is missing its results"))?;
        return Err(Error::QuizCompleted(Box::new(results)));
    }

    let answer_for = |id: u32| -> String {
        answers
            .iter()
            .find(|a| a.question_id == id)
            .map(|a| a.answer.trim().to_string())
            .unwrap_or_default()
    };

    let mut question_results = Vec::new();
    let mut speaking_batch: Vec<SpeakingItem> = Vec::new();

    for question in &quiz.questions {
        let answer = answer_for(question.id());
        match question {
            Question::ListeningMcq { id, word, correct_answer, .. } => {
                question_results.push(grade_mcq(*id, word, correct_answer, &answer));
            }
            Question::Speaking {
                id,
                sentence_en,
                expected_answer,
                expected_answer_romanized,
                acceptable_variations,
                ..
            } => speaking_batch.push(SpeakingItem {
                question_id: *id,
                sentence_en: sentence_en.clone(),
                expected_answer: expected_answer.clone(),
                expected_answer_romanized: expected_answer_romanized.clone(),
                acceptable_variations: acceptable_variations.clone(),
                answer,
            }),
        }
    }

    if !speaking_batch.is_empty() {
        let (system, user) = build_grading_prompts(quiz, &speaking_batch);
        match completion.complete_json(&system, &user, retries).await {
            Ok(reply) => {
                let evaluations = reply["evaluations"].as_array().cloned().unwrap_or_default();
                for item in &speaking_batch {
                    let graded = evaluations
                        .iter()
                        .find(|e| e["questionId"].as_u64() == Some(u64::from(item.question_id)));
                    match graded {
                        Some(evaluation) => {
                            let mut result = fallback_speaking_result(item);
                            let score = evaluation["score"].as_f64().unwrap_or(0.0);
                            result.score = score.clamp(0.0, 100.0).round() as u32;
                            result.correct = evaluation["correct"].as_bool().unwrap_or(false);
                            result.feedback = evaluation["feedback"]
                                .as_str()
                                .unwrap_or("No feedback available.")
                                .to_string();
                            if let Some(corrected) = evaluation["corrected_answer"].as_str() {
                                result.corrected_answer = Some(corrected.to_string());
                            }
                            result.pronunciation_tip =
                                evaluation["pronunciation_tip"].as_str().map(String::from);
                            question_results.push(result);
                        }
                        // the service skipped this question; grade it as
                        // unevaluated rather than dropping it
                        None => question_results.push(fallback_speaking_result(item)),
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "speaking evaluation failed, applying zero-score fallback");
                for item in &speaking_batch {
                    question_results.push(fallback_speaking_result(item));
                }
            }
        }
    }

    question_results.sort_by_key(|r| r.question_id);

    let total_questions = question_results.len();
    let correct_count = question_results.iter().filter(|r| r.correct).count();
    let total_score = if total_questions > 0 {
        let sum: u64 = question_results.iter().map(|r| u64::from(r.score)).sum();
        (sum as f64 / total_questions as f64).round() as u32
    } else {
        0
    };

    let xp_earned =
        ((f64::from(total_score) / 100.0) * total_questions as f64 * XP_PER_QUESTION).round() as u64;
    let award = progression.add_xp(xp_earned);

    let results = QuizResults {
        question_results,
        total_score,
        correct_count,
        total_questions,
        xp_earned,
        leveled_up: award.leveled_up,
        graded_at: Utc::now(),
    };

    quiz.status = QuizStatus::Completed;
    quiz.completed_at = Some(results.graded_at);
    quiz.answers = Some(answers);
    quiz.results = Some(results.clone());

    tracing::info!(
        quiz_id = %quiz.quiz_id,
        total_score,
        correct_count,
        total_questions,
        xp_earned,
        leveled_up = award.leveled_up,
        "evaluated quiz"
    );
    Ok((results, award))
}
