//! Accuracy statistics derived from recorded attempts. Read-only; nothing here is state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::attempt::AnswerAttempt;
use super::session::{Session, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub attempts: u32,
    pub first_correct_attempt: Option<u32>,
    /// `100 / first_correct_attempt`, or 0 if never answered correctly. Two decimals.
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: i64,
    pub status: SessionStatus,
    pub total_questions: usize,
    pub attempted_questions: usize,
    pub solved_questions: usize,
    /// Mean over attempted questions only. 0 when nothing was attempted.
    pub average_accuracy: f64,
    /// Attempted questions, by question id.
    pub questions: Vec<QuestionStats>,
}

pub fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

pub fn accuracy(first_correct_attempt: Option<u32>) -> f64 {
    match first_correct_attempt {
        Some(n) if n > 0 => round2(100.0 / n as f64),
        _ => 0.0,
    }
}

/// Stats for one question from that question's attempts, in any order.
pub fn question_stats(question_id: i64, attempts: &[AnswerAttempt]) -> QuestionStats {
    let mine = attempts.iter().filter(|a| a.question_id == question_id);
    let mut count = 0u32;
    let mut first_correct: Option<u32> = None;
    for a in mine {
        count += 1;
        if a.is_correct {
            first_correct = Some(first_correct.map_or(a.attempt_no, |n| n.min(a.attempt_no)));
        }
    }
    QuestionStats { question_id, attempts: count, first_correct_attempt: first_correct, accuracy: accuracy(first_correct) }
}

pub fn summarize(session: &Session, attempts: &[AnswerAttempt]) -> SessionSummary {
    let mut by_question: BTreeMap<i64, Vec<AnswerAttempt>> = BTreeMap::new();
    for a in attempts.iter().filter(|a| a.session_id == session.id) {
        by_question.entry(a.question_id).or_default().push(a.clone());
    }
    let questions: Vec<QuestionStats> = by_question.iter().map(|(qid, list)| question_stats(*qid, list)).collect();
    let average_accuracy = if questions.is_empty() {
        0.0
    } else {
        round2(questions.iter().map(|q| q.accuracy).sum::<f64>() / questions.len() as f64)
    };
    SessionSummary {
        session_id: session.id,
        status: session.status,
        total_questions: session.snapshot.question_count,
        attempted_questions: questions.len(),
        solved_questions: questions.iter().filter(|q| q.first_correct_attempt.is_some()).count(),
        average_accuracy,
        questions,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::practice::session::ScenarioSnapshot;

    fn attempt(question_id: i64, attempt_no: u32, is_correct: bool) -> AnswerAttempt {
        AnswerAttempt {
            id: attempt_no as i64,
            session_id: 1,
            question_id,
            attempt_no,
            is_correct,
            selected_option: Some(1),
            media_ref: None,
            transcript: None,
            similarity: None,
            created_at: Utc::now(),
        }
    }

    fn session(question_count: usize) -> Session {
        Session {
            id: 1,
            student_id: 4,
            scenario_id: 7,
            snapshot: ScenarioSnapshot { title: "t".into(), difficulty: "EASY".into(), question_count, questions: vec![] },
            status: SessionStatus::InProgress,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accuracy_from_first_correct_attempt() {
        assert_eq!(accuracy(Some(1)), 100.0);
        assert_eq!(accuracy(Some(2)), 50.0);
        assert_eq!(accuracy(Some(3)), 33.33);
        assert_eq!(accuracy(Some(6)), 16.67);
        assert_eq!(accuracy(None), 0.0);
    }

    #[test]
    fn correct_after_first_correct_does_not_matter() {
        let s = question_stats(1, &[attempt(1, 1, false), attempt(1, 2, true), attempt(1, 3, true)]);
        assert_eq!(s.attempts, 3);
        assert_eq!(s.first_correct_attempt, Some(2));
        assert_eq!(s.accuracy, 50.0);
    }

    #[test]
    fn unattempted_questions_are_excluded_from_average() {
        let attempts = vec![
            attempt(1, 1, false),
            attempt(1, 2, true),
            attempt(2, 1, true),
            attempt(3, 1, false),
        ];
        let sum = summarize(&session(5), &attempts);
        assert_eq!(sum.total_questions, 5);
        assert_eq!(sum.attempted_questions, 3);
        assert_eq!(sum.solved_questions, 2);
        // (50 + 100 + 0) / 3
        assert_eq!(sum.average_accuracy, 50.0);
        assert_eq!(sum.questions.iter().map(|q| q.question_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_session_averages_zero() {
        let sum = summarize(&session(3), &[]);
        assert_eq!(sum.average_accuracy, 0.0);
        assert!(sum.questions.is_empty());
    }

    #[test]
    fn average_is_rounded() {
        let attempts = vec![attempt(1, 1, false), attempt(1, 2, false), attempt(1, 3, true), attempt(2, 1, true)];
        // (33.33 + 100) / 2 = 66.665
        let sum = summarize(&session(2), &attempts);
        assert!((sum.average_accuracy - 66.67).abs() < 0.011, "{}", sum.average_accuracy);
    }
}
