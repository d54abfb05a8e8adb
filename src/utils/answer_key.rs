// src/utils/answer_key.rs

use std::collections::BTreeMap;

use thiserror::Error;

/// Letters available to label choices, in order.
pub const CHOICE_ALPHABET: &str = "ABCDE";

/// Question id (`"q1"`, `"q2"`, ...) to zero-based index of the correct choice.
pub type AnswerKey = BTreeMap<String, i32>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerKeyError {
    #[error("answer key has {actual} letters but the test has {expected} questions")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("answer key letter '{letter}' at position {position} is not one of {allowed}")]
    InvalidLetter {
        position: usize,
        letter: char,
        allowed: String,
    },

    #[error("choices count must be 4 or 5, got {0}")]
    UnsupportedChoiceCount(i32),
}

/// Returns the first `choices_count` letters of [`CHOICE_ALPHABET`].
pub fn choice_letters(choices_count: i32) -> Result<Vec<String>, AnswerKeyError> {
    if !(4..=5).contains(&choices_count) {
        return Err(AnswerKeyError::UnsupportedChoiceCount(choices_count));
    }

    Ok(CHOICE_ALPHABET
        .chars()
        .take(choices_count as usize)
        .map(String::from)
        .collect())
}

/// Question id for the 1-based question number `n`.
pub fn question_id(n: usize) -> String {
    format!("q{}", n)
}

/// Encodes a letter string such as `"BAD"` into `{q1: 1, q2: 0, q3: 3}`.
///
/// The input is taken as-is: callers trim and upper-case admin input first.
pub fn encode_answer_key(
    letters: &str,
    num_questions: usize,
    choices_count: i32,
) -> Result<AnswerKey, AnswerKeyError> {
    let allowed: String = choice_letters(choices_count)?.concat();

    let actual = letters.chars().count();
    if actual != num_questions {
        return Err(AnswerKeyError::LengthMismatch {
            expected: num_questions,
            actual,
        });
    }

    letters
        .chars()
        .enumerate()
        .map(|(i, letter)| match allowed.find(letter) {
            Some(index) => Ok((question_id(i + 1), index as i32)),
            None => Err(AnswerKeyError::InvalidLetter {
                position: i + 1,
                letter,
                allowed: allowed.clone(),
            }),
        })
        .collect()
}
