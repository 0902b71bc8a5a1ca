//! Practice sessions: lifecycle, answer attempts and accuracy.

mod attempt;
mod session;
mod stats;
mod store;

pub use attempt::{grade, AnswerAttempt, AttemptDraft, AttemptTracker, SelectedAnswer};
pub use session::{ScenarioSnapshot, Session, SessionMachine, SessionStatus};
pub use stats::{accuracy, question_stats, round2, summarize, QuestionStats, SessionSummary};
pub use store::{MemoryPracticeStore, PracticeStore, SessionDraft};
