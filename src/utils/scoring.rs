// src/utils/scoring.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::utils::answer_key::AnswerKey;

/// Outcome of grading one submission against a test's answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Grade {
    pub correct_count: usize,
    pub total_questions: usize,
    /// Percentage in `0..=100`.
    pub score: i32,
}

/// Grades `answers` against `answer_key`.
///
/// Only question ids present in the key count. Missing or wrong answers are
/// simply not correct, and ids the key does not know are ignored. An empty
/// key scores 0.
pub fn grade(answer_key: &AnswerKey, answers: &HashMap<String, i32>) -> Grade {
    let mut total: usize = 0;
    let mut correct: usize = 0;

    for (q_id, expected) in answer_key {
        total += 1;
        if answers.get(q_id) == Some(expected) {
            correct += 1;
        }
    }

    let score = (100.0 * correct as f64 / total.max(1) as f64).round() as i32;

    Grade {
        correct_count: correct,
        total_questions: total,
        score,
    }
}
