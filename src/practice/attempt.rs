//! Answer submission and grading.
//!
//! Attempts are append-only. Ordinals are scoped to (session, question), start at 1 and
//! are assigned by the store under the session's lock, so concurrent submissions never
//! share or skip a number.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::session::SessionStatus;
use super::stats::{question_stats, QuestionStats};
use super::store::PracticeStore;
use crate::directory::{AnswerKey, QuestionKey};
use crate::error::{AppError, AppResult};

/// What the learner submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectedAnswer {
    /// 1-based option number.
    Choice { option_no: u32 },
    /// Recorded speech. `similarity` is the speech service's score against the expected
    /// transcript, in [0, 1].
    Audio {
        media_ref: String,
        #[serde(default)]
        transcript: String,
        similarity: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerAttempt {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub attempt_no: u32,
    pub is_correct: bool,
    pub selected_option: Option<u32>,
    pub media_ref: Option<String>,
    pub transcript: Option<String>,
    pub similarity: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A graded submission waiting for its ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptDraft {
    pub question_id: i64,
    pub is_correct: bool,
    pub selected_option: Option<u32>,
    pub media_ref: Option<String>,
    pub transcript: Option<String>,
    pub similarity: Option<f64>,
}

/// Grade `answer` against `question`. Choice answers are looked up directly, audio
/// answers pass when `similarity >= threshold`.
pub fn grade(question: &QuestionKey, answer: &SelectedAnswer, threshold: f64) -> AppResult<AttemptDraft> {
    match (&question.answer, answer) {
        (AnswerKey::Choice { correct_option, option_count }, SelectedAnswer::Choice { option_no }) => {
            if *option_no == 0 || option_no > option_count {
                return Err(AppError::invalid(format!(
                    "option {} out of range 1..={} for question {}",
                    option_no, option_count, question.id
                )));
            }
            Ok(AttemptDraft {
                question_id: question.id,
                is_correct: option_no == correct_option,
                selected_option: Some(*option_no),
                media_ref: None,
                transcript: None,
                similarity: None,
            })
        }
        (AnswerKey::Audio { .. }, SelectedAnswer::Audio { media_ref, transcript, similarity }) => {
            if !(0.0..=1.0).contains(similarity) {
                return Err(AppError::invalid(format!("similarity {} outside [0, 1]", similarity)));
            }
            if media_ref.trim().is_empty() {
                return Err(AppError::invalid("audio answer without media_ref"));
            }
            Ok(AttemptDraft {
                question_id: question.id,
                is_correct: *similarity >= threshold,
                selected_option: None,
                media_ref: Some(media_ref.clone()),
                transcript: Some(transcript.clone()),
                similarity: Some(*similarity),
            })
        }
        (AnswerKey::Choice { .. }, _) => Err(AppError::invalid(format!("question {} expects a choice answer", question.id))),
        (AnswerKey::Audio { .. }, _) => Err(AppError::invalid(format!("question {} expects an audio answer", question.id))),
    }
}

#[derive(Clone)]
pub struct AttemptTracker {
    store: Arc<dyn PracticeStore>,
    audio_threshold: f64,
}

impl AttemptTracker {
    pub fn new(store: Arc<dyn PracticeStore>, audio_threshold: f64) -> Self { Self { store, audio_threshold } }

    pub fn audio_threshold(&self) -> f64 { self.audio_threshold }

    pub fn submit_answer(&self, session_id: i64, question_id: i64, answer: &SelectedAnswer) -> AppResult<AnswerAttempt> {
        let session = self.store.session(session_id)?;
        // The store re-checks under its lock; this only avoids grading for a closed session.
        if session.status != SessionStatus::InProgress {
            return Err(AppError::SessionNotActive(session_id));
        }
        let question = session
            .snapshot
            .question(question_id)
            .ok_or_else(|| AppError::not_found(format!("question {} in session {}", question_id, session_id)))?;
        let draft = grade(question, answer, self.audio_threshold)?;
        let attempt = self.store.append_attempt(session_id, draft)?;
        debug!(
            target: "practicum::session",
            session = session_id,
            question = question_id,
            attempt_no = attempt.attempt_no,
            correct = attempt.is_correct,
            "answer recorded"
        );
        Ok(attempt)
    }

    pub fn attempts(&self, session_id: i64, question_id: i64) -> AppResult<Vec<AnswerAttempt>> {
        Ok(self.store.attempts(session_id)?.into_iter().filter(|a| a.question_id == question_id).collect())
    }

    pub fn question_stats(&self, session_id: i64, question_id: i64) -> AppResult<QuestionStats> {
        Ok(question_stats(question_id, &self.attempts(session_id, question_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: i64) -> QuestionKey {
        QuestionKey { id, seq_no: 1, prompt: String::new(), answer: AnswerKey::Choice { correct_option: 2, option_count: 4 } }
    }

    fn audio(id: i64) -> QuestionKey {
        QuestionKey { id, seq_no: 2, prompt: String::new(), answer: AnswerKey::Audio { expected_transcript: "hello".into() } }
    }

    fn spoken(similarity: f64) -> SelectedAnswer {
        SelectedAnswer::Audio { media_ref: "media/1.webm".into(), transcript: "helo".into(), similarity }
    }

    #[test]
    fn grades_choice_answers() {
        assert!(grade(&choice(1), &SelectedAnswer::Choice { option_no: 2 }, 0.7).unwrap().is_correct);
        assert!(!grade(&choice(1), &SelectedAnswer::Choice { option_no: 3 }, 0.7).unwrap().is_correct);
        assert!(matches!(grade(&choice(1), &SelectedAnswer::Choice { option_no: 0 }, 0.7), Err(AppError::ValidationFailed(_))));
        assert!(matches!(grade(&choice(1), &SelectedAnswer::Choice { option_no: 5 }, 0.7), Err(AppError::ValidationFailed(_))));
    }

    #[test]
    fn grades_audio_against_threshold() {
        assert!(grade(&audio(2), &spoken(0.7), 0.7).unwrap().is_correct);
        assert!(grade(&audio(2), &spoken(0.95), 0.7).unwrap().is_correct);
        let miss = grade(&audio(2), &spoken(0.69), 0.7).unwrap();
        assert!(!miss.is_correct);
        assert_eq!(miss.media_ref.as_deref(), Some("media/1.webm"));
        assert_eq!(miss.similarity, Some(0.69));
    }

    #[test]
    fn rejects_bad_similarity_and_kind_mismatch() {
        assert!(grade(&audio(2), &spoken(f64::NAN), 0.7).is_err());
        assert!(grade(&audio(2), &spoken(1.01), 0.7).is_err());
        assert!(grade(&audio(2), &spoken(-0.1), 0.7).is_err());
        assert!(grade(&audio(2), &SelectedAnswer::Choice { option_no: 1 }, 0.7).is_err());
        assert!(grade(&choice(1), &spoken(0.9), 0.7).is_err());
        let no_media = SelectedAnswer::Audio { media_ref: " ".into(), transcript: String::new(), similarity: 0.9 };
        assert!(grade(&audio(2), &no_media, 0.7).is_err());
    }

    #[test]
    fn selected_answer_wire_format() {
        let a: SelectedAnswer = serde_json::from_str(r#"{"kind":"choice","option_no":3}"#).unwrap();
        assert_eq!(a, SelectedAnswer::Choice { option_no: 3 });
        let a: SelectedAnswer = serde_json::from_str(r#"{"kind":"audio","media_ref":"m","similarity":0.5}"#).unwrap();
        assert!(matches!(a, SelectedAnswer::Audio { ref transcript, .. } if transcript.is_empty()));
    }
}
