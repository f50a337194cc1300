//! Storage backends for the learner memory engine

pub mod documents;
pub mod quizzes;
pub mod sessions;

pub use documents::DocumentStore;
pub use quizzes::QuizStore;
pub use sessions::SessionStore;
