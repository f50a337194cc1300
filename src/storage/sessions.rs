//! Per-session JSON file storage

use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use crate::config::Config;
use crate::error::Result;
use crate::session::{SessionRecord, SessionSummary};

/// Storage backend holding one JSON file per conversation session
pub struct SessionStore {
    base_path: PathBuf,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(config: &Config) -> Result<Self> {
        let base_path = config.sessions_dir();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join(format!("{session_id}.json"))
    }

    /// Load a session. Returns None when missing; a corrupt file is logged
    /// and treated as missing.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(session_id, %err, "corrupt session file, ignoring");
                Ok(None)
            }
        }
    }

    /// Persist a session. Stamps `updated_at` and recomputes the derived
    /// `avg_fluency` before writing.
    pub fn save(&self, session: &mut SessionRecord) -> Result<()> {
        session.updated_at = Utc::now();
        session.recompute_avg_fluency();

        let json = serde_json::to_string_pretty(session)?;
        fs::write(self.session_path(&session.id), json)?;
        tracing::debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            avg_fluency = session.avg_fluency,
            "saved session"
        );
        Ok(())
    }

    /// List all sessions as lightweight summaries, newest first.
    /// Unparsable files are skipped.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let Ok(raw) = fs::read_to_string(&path) else { continue };
                if let Ok(session) = serde_json::from_str::<SessionRecord>(&raw) {
                    summaries.push(SessionSummary::from(&session));
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete one session. Returns true when a file was removed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.session_path(session_id);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!(session_id, "deleted session");
            return Ok(true);
        }
        Ok(false)
    }

    /// Delete every session file. Returns the number deleted.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TurnEvaluation;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let store = SessionStore::new(&config).unwrap();
        (dir, store)
    }

    #[test]
    fn save_load_round_trips() {
        let (_dir, store) = store();
        let mut session = SessionRecord::new("s1", "Hindi");
        session.apply_turn(
            "hello",
            "namaste",
            &TurnEvaluation { score: 80, ..Default::default() },
            Utc::now(),
        );
        store.save(&mut session).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.avg_fluency, 80);
    }

    #[test]
    fn save_recomputes_average() {
        let (_dir, store) = store();
        let mut session = SessionRecord::new("s1", "Hindi");
        session.fluency_scores = vec![40, 60];
        session.avg_fluency = 999; // stale value must be overwritten on save

        store.save(&mut session).unwrap();
        assert_eq!(session.avg_fluency, 50);
    }

    #[test]
    fn list_skips_corrupt_files() {
        let (dir, store) = store();
        let mut session = SessionRecord::new("good", "Hindi");
        store.save(&mut session).unwrap();
        std::fs::write(dir.path().join("sessions/bad.json"), "oops").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }

    #[test]
    fn delete_all_clears_collection() {
        let (_dir, store) = store();
        for id in ["a", "b", "c"] {
            store.save(&mut SessionRecord::new(id, "Hindi")).unwrap();
        }
        assert_eq!(store.delete_all().unwrap(), 3);
        assert!(store.list().unwrap().is_empty());
    }
}
