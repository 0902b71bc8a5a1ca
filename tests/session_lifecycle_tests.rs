//! Practice session lifecycle and attempt accounting through the public API.

use std::sync::Arc;

use anyhow::Result;

use practicum::directory::{AnswerKey, MemoryDirectory, QuestionKey, ScenarioRecord};
use practicum::error::AppError;
use practicum::practice::{AttemptTracker, MemoryPracticeStore, PracticeStore, SelectedAnswer, SessionMachine, SessionStatus};

fn scenario_seven() -> ScenarioRecord {
    ScenarioRecord {
        id: 7,
        title: "Ordering at a cafe".into(),
        difficulty: "EASY".into(),
        owner_id: 2,
        org_id: 10,
        deleted_at: None,
        questions: vec![
            QuestionKey { id: 1, seq_no: 1, prompt: "Pick the greeting".into(), answer: AnswerKey::Choice { correct_option: 3, option_count: 4 } },
            QuestionKey { id: 2, seq_no: 2, prompt: "Say hello".into(), answer: AnswerKey::Audio { expected_transcript: "hello".into() } },
            QuestionKey { id: 3, seq_no: 3, prompt: "Pick the farewell".into(), answer: AnswerKey::Choice { correct_option: 1, option_count: 2 } },
        ],
    }
}

fn setup() -> (SessionMachine, AttemptTracker, Arc<MemoryDirectory>) {
    let directory = Arc::new(MemoryDirectory::new());
    directory.insert_scenario(scenario_seven());
    let store: Arc<dyn PracticeStore> = Arc::new(MemoryPracticeStore::new());
    (SessionMachine::new(store.clone(), directory.clone()), AttemptTracker::new(store, 0.7), directory)
}

fn pick(option_no: u32) -> SelectedAnswer { SelectedAnswer::Choice { option_no } }

#[test]
fn wrong_then_correct_gives_fifty_percent() -> Result<()> {
    let (sessions, attempts, _) = setup();
    let s = sessions.start(4, 7)?;
    assert_eq!(s.status, SessionStatus::InProgress);

    let a1 = attempts.submit_answer(s.id, 1, &pick(2))?;
    assert_eq!((a1.attempt_no, a1.is_correct), (1, false));
    let a2 = attempts.submit_answer(s.id, 1, &pick(3))?;
    assert_eq!((a2.attempt_no, a2.is_correct), (2, true));
    assert_eq!(attempts.question_stats(s.id, 1)?.accuracy, 50.0);

    let done = sessions.complete(s.id)?;
    assert_eq!(done.status, SessionStatus::Completed);
    let summary = sessions.summary(s.id)?;
    assert_eq!(summary.average_accuracy, 50.0);
    assert_eq!(summary.attempted_questions, 1);
    assert_eq!(summary.total_questions, 3);
    Ok(())
}

#[test]
fn terminal_sessions_reject_everything() -> Result<()> {
    let (sessions, attempts, _) = setup();
    let s = sessions.start(4, 7)?;
    for (n, opt) in [(1, 1), (2, 2), (3, 3)] {
        assert_eq!(attempts.submit_answer(s.id, 1, &pick(opt))?.attempt_no, n);
    }
    sessions.complete(s.id)?;
    assert_eq!(sessions.complete(s.id).unwrap_err(), AppError::AlreadyCompleted(s.id));
    assert!(sessions.abort(s.id).is_err());
    assert_eq!(attempts.submit_answer(s.id, 1, &pick(3)).unwrap_err(), AppError::SessionNotActive(s.id));
    assert_eq!(attempts.attempts(s.id, 1)?.len(), 3);

    let aborted = sessions.start(4, 7)?;
    sessions.abort(aborted.id)?;
    assert_eq!(sessions.complete(aborted.id).unwrap_err(), AppError::AlreadyAborted(aborted.id));
    assert_eq!(sessions.abort(aborted.id).unwrap_err(), AppError::AlreadyAborted(aborted.id));
    Ok(())
}

#[test]
fn audio_answers_use_the_similarity_threshold() -> Result<()> {
    let (sessions, attempts, _) = setup();
    let s = sessions.start(4, 7)?;
    let spoken = |similarity| SelectedAnswer::Audio { media_ref: "rec/1.webm".into(), transcript: "hallo".into(), similarity };
    assert!(!attempts.submit_answer(s.id, 2, &spoken(0.42))?.is_correct);
    assert!(!attempts.submit_answer(s.id, 2, &spoken(0.69))?.is_correct);
    let third = attempts.submit_answer(s.id, 2, &spoken(0.81))?;
    assert!(third.is_correct);
    assert_eq!(third.attempt_no, 3);
    assert_eq!(third.media_ref.as_deref(), Some("rec/1.webm"));
    assert_eq!(attempts.question_stats(s.id, 2)?.accuracy, 33.33);
    Ok(())
}

#[test]
fn bad_submissions_are_not_recorded() -> Result<()> {
    let (sessions, attempts, _) = setup();
    let s = sessions.start(4, 7)?;
    assert!(matches!(attempts.submit_answer(s.id, 99, &pick(1)), Err(AppError::ResourceNotFound(_))));
    assert!(matches!(attempts.submit_answer(s.id, 1, &pick(9)), Err(AppError::ValidationFailed(_))));
    assert!(matches!(attempts.submit_answer(s.id, 2, &pick(1)), Err(AppError::ValidationFailed(_))));
    assert!(matches!(attempts.submit_answer(404, 1, &pick(1)), Err(AppError::ResourceNotFound(_))));
    // a rejected submission does not consume an ordinal
    assert_eq!(attempts.submit_answer(s.id, 1, &pick(3))?.attempt_no, 1);
    Ok(())
}

#[test]
fn unknown_scenario_cannot_start() {
    let (sessions, _, _) = setup();
    assert!(matches!(sessions.start(4, 8), Err(AppError::ResourceNotFound(_))));
}

#[test]
fn snapshot_survives_catalog_edits() -> Result<()> {
    let (sessions, attempts, directory) = setup();
    let s = sessions.start(4, 7)?;
    let mut edited = scenario_seven();
    edited.title = "Renamed".into();
    edited.questions.clear();
    directory.insert_scenario(edited);

    let now = sessions.get(s.id)?;
    assert_eq!(now.snapshot.title, "Ordering at a cafe");
    assert_eq!(now.snapshot.question_count, 3);
    assert!(attempts.submit_answer(s.id, 1, &pick(3))?.is_correct);
    Ok(())
}

#[test]
fn students_may_hold_parallel_sessions() -> Result<()> {
    let (sessions, attempts, _) = setup();
    let a = sessions.start(4, 7)?;
    let b = sessions.start(4, 7)?;
    attempts.submit_answer(a.id, 1, &pick(1))?;
    assert_eq!(attempts.submit_answer(b.id, 1, &pick(3))?.attempt_no, 1);
    sessions.abort(a.id)?;
    assert_eq!(sessions.get(b.id)?.status, SessionStatus::InProgress);
    Ok(())
}
