//! Practice session lifecycle.
//!
//! `IN_PROGRESS` is the only non-terminal state. `COMPLETED` and `ABORTED` are terminal,
//! mutually exclusive and have no transitions out. A student may hold any number of
//! sessions in progress at once.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::stats::{summarize, SessionSummary};
use super::store::{PracticeStore, SessionDraft};
use crate::directory::{QuestionKey, ScenarioCatalog, ScenarioRecord};
use crate::error::{AppError, AppResult};
use crate::identity::{ResourceOwnership, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool { self != SessionStatus::InProgress }

    /// Validate a move from `self` to `to` for session `id`.
    pub fn transition(self, id: i64, to: SessionStatus) -> AppResult<SessionStatus> {
        match (self, to) {
            (SessionStatus::Completed, _) => Err(AppError::AlreadyCompleted(id)),
            (SessionStatus::Aborted, _) => Err(AppError::AlreadyAborted(id)),
            (SessionStatus::InProgress, SessionStatus::InProgress) => {
                Err(AppError::invalid(format!("session {} is already in progress", id)))
            }
            (SessionStatus::InProgress, next) => Ok(next),
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        })
    }
}

/// Scenario metadata frozen when the session starts. Later catalog edits do not reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    pub title: String,
    pub difficulty: String,
    pub question_count: usize,
    /// Answer keys; never serialized to clients.
    #[serde(skip)]
    pub questions: Vec<QuestionKey>,
}

impl From<&ScenarioRecord> for ScenarioSnapshot {
    fn from(s: &ScenarioRecord) -> Self {
        Self {
            title: s.title.clone(),
            difficulty: s.difficulty.clone(),
            question_count: s.questions.len(),
            questions: s.questions.clone(),
        }
    }
}

impl ScenarioSnapshot {
    pub fn question(&self, question_id: i64) -> Option<&QuestionKey> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub student_id: i64,
    pub scenario_id: i64,
    pub snapshot: ScenarioSnapshot,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session is owned by whoever owns its student.
    pub fn ownership(&self, student: &ResourceOwnership) -> ResourceOwnership {
        ResourceOwnership {
            resource_type: ResourceType::Session,
            resource_id: self.id,
            owner_id: student.owner_id,
            org_id: student.org_id,
        }
    }
}

#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<dyn PracticeStore>,
    catalog: Arc<dyn ScenarioCatalog>,
}

impl SessionMachine {
    pub fn new(store: Arc<dyn PracticeStore>, catalog: Arc<dyn ScenarioCatalog>) -> Self { Self { store, catalog } }

    pub fn start(&self, student_id: i64, scenario_id: i64) -> AppResult<Session> {
        let scenario = self
            .catalog
            .scenario(scenario_id)
            .ok_or_else(|| AppError::not_found(format!("scenario {}", scenario_id)))?;
        let session = self.store.insert_session(SessionDraft {
            student_id,
            scenario_id,
            snapshot: ScenarioSnapshot::from(&scenario),
            at: Utc::now(),
        })?;
        info!(target: "practicum::session", session = session.id, student = student_id, scenario = scenario_id, "session started");
        Ok(session)
    }

    pub fn get(&self, id: i64) -> AppResult<Session> { self.store.session(id) }

    pub fn complete(&self, id: i64) -> AppResult<Session> { self.finish(id, SessionStatus::Completed) }

    pub fn abort(&self, id: i64) -> AppResult<Session> { self.finish(id, SessionStatus::Aborted) }

    fn finish(&self, id: i64, to: SessionStatus) -> AppResult<Session> {
        let session = self.store.transition(id, to, Utc::now())?;
        info!(target: "practicum::session", session = id, status = %to, "session finished");
        Ok(session)
    }

    pub fn summary(&self, id: i64) -> AppResult<SessionSummary> {
        let session = self.store.session(id)?;
        let attempts = self.store.attempts(id)?;
        Ok(summarize(&session, &attempts))
    }
}
