//! Persistence seam for sessions and attempts.
//!
//! `MemoryPracticeStore` keeps one mutex per session. Status transitions and attempt
//! appends both run under it, which makes "check status, assign next ordinal, append"
//! atomic per session and orders appends against a concurrent complete or abort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use super::attempt::{AnswerAttempt, AttemptDraft};
use super::session::{ScenarioSnapshot, Session, SessionStatus};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub student_id: i64,
    pub scenario_id: i64,
    pub snapshot: ScenarioSnapshot,
    pub at: DateTime<Utc>,
}

pub trait PracticeStore: Send + Sync {
    /// Persist a new `IN_PROGRESS` session and assign its id.
    fn insert_session(&self, draft: SessionDraft) -> AppResult<Session>;
    fn session(&self, id: i64) -> AppResult<Session>;
    /// Compare-and-set status change; see `SessionStatus::transition` for legal moves.
    fn transition(&self, id: i64, to: SessionStatus, at: DateTime<Utc>) -> AppResult<Session>;
    /// Append an attempt with the next ordinal for its (session, question). Fails with
    /// `SessionNotActive` unless the session is in progress at append time.
    fn append_attempt(&self, session_id: i64, draft: AttemptDraft) -> AppResult<AnswerAttempt>;
    /// All attempts of a session in submission order.
    fn attempts(&self, session_id: i64) -> AppResult<Vec<AnswerAttempt>>;
}

struct SessionRecord {
    session: Session,
    attempts: Vec<AnswerAttempt>,
    last_attempt_no: HashMap<i64, u32>,
}

#[derive(Default)]
pub struct MemoryPracticeStore {
    sessions: RwLock<HashMap<i64, Arc<Mutex<SessionRecord>>>>,
    session_seq: AtomicI64,
    attempt_seq: AtomicI64,
}

impl MemoryPracticeStore {
    pub fn new() -> Self { Self::default() }

    fn record(&self, id: i64) -> AppResult<Arc<Mutex<SessionRecord>>> {
        self.sessions.read().get(&id).cloned().ok_or_else(|| AppError::not_found(format!("session {}", id)))
    }
}

impl PracticeStore for MemoryPracticeStore {
    fn insert_session(&self, draft: SessionDraft) -> AppResult<Session> {
        let id = self.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session {
            id,
            student_id: draft.student_id,
            scenario_id: draft.scenario_id,
            snapshot: draft.snapshot,
            status: SessionStatus::InProgress,
            created_at: draft.at,
            updated_at: draft.at,
        };
        let record = SessionRecord { session: session.clone(), attempts: Vec::new(), last_attempt_no: HashMap::new() };
        self.sessions.write().insert(id, Arc::new(Mutex::new(record)));
        Ok(session)
    }

    fn session(&self, id: i64) -> AppResult<Session> {
        let rec = self.record(id)?;
        let guard = rec.lock();
        Ok(guard.session.clone())
    }

    fn transition(&self, id: i64, to: SessionStatus, at: DateTime<Utc>) -> AppResult<Session> {
        let rec = self.record(id)?;
        let mut guard = rec.lock();
        guard.session.status = guard.session.status.transition(id, to)?;
        guard.session.updated_at = at;
        Ok(guard.session.clone())
    }

    fn append_attempt(&self, session_id: i64, draft: AttemptDraft) -> AppResult<AnswerAttempt> {
        let rec = self.record(session_id)?;
        let mut guard = rec.lock();
        if guard.session.status != SessionStatus::InProgress {
            return Err(AppError::SessionNotActive(session_id));
        }
        let attempt_no = {
            let last = guard.last_attempt_no.entry(draft.question_id).or_insert(0);
            *last += 1;
            *last
        };
        let attempt = AnswerAttempt {
            id: self.attempt_seq.fetch_add(1, Ordering::SeqCst) + 1,
            session_id,
            question_id: draft.question_id,
            attempt_no,
            is_correct: draft.is_correct,
            selected_option: draft.selected_option,
            media_ref: draft.media_ref,
            transcript: draft.transcript,
            similarity: draft.similarity,
            created_at: Utc::now(),
        };
        guard.attempts.push(attempt.clone());
        Ok(attempt)
    }

    fn attempts(&self, session_id: i64) -> AppResult<Vec<AnswerAttempt>> {
        let rec = self.record(session_id)?;
        let guard = rec.lock();
        Ok(guard.attempts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> SessionDraft {
        SessionDraft {
            student_id: 4,
            scenario_id: 7,
            snapshot: ScenarioSnapshot { title: "t".into(), difficulty: String::new(), question_count: 2, questions: vec![] },
            at: Utc::now(),
        }
    }

    fn answer(question_id: i64, is_correct: bool) -> AttemptDraft {
        AttemptDraft { question_id, is_correct, selected_option: Some(1), media_ref: None, transcript: None, similarity: None }
    }

    #[test]
    fn ordinals_are_per_question() {
        let store = MemoryPracticeStore::new();
        let s = store.insert_session(draft()).unwrap();
        let nos: Vec<(i64, u32)> = [1, 1, 2, 1, 2]
            .iter()
            .map(|q| {
                let a = store.append_attempt(s.id, answer(*q, false)).unwrap();
                (a.question_id, a.attempt_no)
            })
            .collect();
        assert_eq!(nos, vec![(1, 1), (1, 2), (2, 1), (1, 3), (2, 2)]);
        assert_eq!(store.attempts(s.id).unwrap().len(), 5);
    }

    #[test]
    fn ordinals_do_not_leak_across_sessions() {
        let store = MemoryPracticeStore::new();
        let a = store.insert_session(draft()).unwrap();
        let b = store.insert_session(draft()).unwrap();
        assert_ne!(a.id, b.id);
        store.append_attempt(a.id, answer(1, false)).unwrap();
        assert_eq!(store.append_attempt(b.id, answer(1, false)).unwrap().attempt_no, 1);
    }

    #[test]
    fn append_rejected_after_terminal_transition() {
        let store = MemoryPracticeStore::new();
        let s = store.insert_session(draft()).unwrap();
        store.append_attempt(s.id, answer(1, true)).unwrap();
        let done = store.transition(s.id, SessionStatus::Completed, Utc::now()).unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(store.append_attempt(s.id, answer(1, true)).unwrap_err(), AppError::SessionNotActive(s.id));
        assert_eq!(store.transition(s.id, SessionStatus::Aborted, Utc::now()).unwrap_err(), AppError::AlreadyCompleted(s.id));
        assert_eq!(store.attempts(s.id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = MemoryPracticeStore::new();
        assert!(matches!(store.session(42), Err(AppError::ResourceNotFound(_))));
        assert!(matches!(store.append_attempt(42, answer(1, true)), Err(AppError::ResourceNotFound(_))));
    }

    #[test]
    fn concurrent_submissions_get_gap_free_ordinals() {
        let store = Arc::new(MemoryPracticeStore::new());
        let s = store.insert_session(draft()).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..25).map(|_| store.append_attempt(s.id, answer(1, false)).unwrap().attempt_no).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=200).collect::<Vec<u32>>());
        let recorded: Vec<u32> = store.attempts(s.id).unwrap().iter().map(|a| a.attempt_no).collect();
        assert_eq!(recorded, (1..=200).collect::<Vec<u32>>(), "append order matches ordinal order");
    }
}
