//! Per-quiz JSON file storage

use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::quiz::{QuizDocument, QuizSummary};

/// Storage backend holding one JSON file per quiz
pub struct QuizStore {
    base_path: PathBuf,
}

impl QuizStore {
    /// Create a new quiz store
    pub fn new(config: &Config) -> Result<Self> {
        let base_path = config.quizzes_dir();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    fn quiz_path(&self, quiz_id: &str) -> PathBuf {
        self.base_path.join(format!("{quiz_id}.json"))
    }

    /// Persist a quiz document (full overwrite)
    pub fn save(&self, quiz: &QuizDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(quiz)?;
        fs::write(self.quiz_path(&quiz.quiz_id), json)?;
        tracing::debug!(quiz_id = %quiz.quiz_id, status = ?quiz.status, "saved quiz");
        Ok(())
    }

    /// Load a quiz. Returns None when missing; a corrupt file is logged
    /// and treated as missing.
    pub fn load(&self, quiz_id: &str) -> Result<Option<QuizDocument>> {
        let path = self.quiz_path(quiz_id);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(quiz) => Ok(Some(quiz)),
            Err(err) => {
                tracing::warn!(quiz_id, %err, "corrupt quiz file, ignoring");
                Ok(None)
            }
        }
    }

    /// List all quizzes as history summaries, newest first
    pub fn list(&self) -> Result<Vec<QuizSummary>> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let Ok(raw) = fs::read_to_string(&path) else { continue };
                if let Ok(quiz) = serde_json::from_str::<QuizDocument>(&raw) {
                    summaries.push(QuizSummary::from(&quiz));
                }
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Delete every quiz file. Returns the number deleted.
    pub fn delete_all(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && fs::remove_file(&path).is_ok()
            {
                count += 1;
            }
        }
        Ok(count)
    }
}
