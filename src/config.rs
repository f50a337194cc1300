//! Configuration for lingua-memory

use std::path::PathBuf;

/// Configuration for the learner memory engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all persisted documents
    pub data_dir: PathBuf,

    /// OpenAI-compatible chat completions endpoint
    pub completion_url: String,

    /// Model name sent to the completion service
    pub completion_model: String,

    /// API key for the completion service (None = unconfigured)
    pub completion_api_key: Option<String>,

    /// Attempts per completion call before surfacing a terminal error
    pub completion_retries: u32,

    /// Maximum matched vocabulary items in a recall block
    pub max_recalled_words: usize,

    /// Maximum low-mastery reinforcement candidates in a recall block
    pub max_reinforcement_words: usize,

    /// Mastery below which a word counts as a reinforcement candidate
    pub reinforcement_cutoff: f64,

    /// How many recent sessions the profile aggregator folds in
    pub recent_session_window: usize,

    /// HTTP server port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lingua-memory");

        Self {
            data_dir,
            completion_url: "https://integrate.api.nvidia.com/v1/chat/completions".to_string(),
            completion_model: "qwen/qwen3-next-80b-a3b-instruct".to_string(),
            completion_api_key: std::env::var("NVIDIA_API_KEY").ok().filter(|k| !k.is_empty()),
            completion_retries: 3,
            max_recalled_words: 15,
            max_reinforcement_words: 8,
            reinforcement_cutoff: 0.4,
            recent_session_window: 5,
            server_port: 8430,
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Directory holding one JSON file per conversation session
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Directory holding one JSON file per quiz
    pub fn quizzes_dir(&self) -> PathBuf {
        self.data_dir.join("quizzes")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.quizzes_dir())?;
        Ok(())
    }
}
