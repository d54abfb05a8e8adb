// src/models/submission.rs

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

/// Title reported for submissions whose test has been deleted.
pub const DELETED_TEST_TITLE: &str = "(deleted test)";

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-]{3,23}$").expect("phone pattern is valid"));

/// Aggregated row for the admin submission list.
/// Joined from `submissions` and (optionally) `tests`.
#[derive(Debug, Serialize, FromRow)]
pub struct SubmissionSummary {
    pub id: i64,
    pub test_id: Option<i64>,
    pub test_title: String,
    pub name: String,
    pub grade: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: String,
    pub level: String,
    pub score: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Full submission including the recorded answers.
#[derive(Debug, Serialize, FromRow)]
pub struct SubmissionDetail {
    pub id: i64,
    pub test_id: Option<i64>,
    pub test_title: String,
    pub name: String,
    pub grade: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: String,
    pub level: String,
    pub answers: Json<HashMap<String, i32>>,
    pub score: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for submitting a test attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubmissionRequest {
    pub test_id: i64,
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(length(max = 50))]
    pub grade: Option<String>,
    #[validate(email(message = "email is not valid"))]
    pub email: Option<String>,
    #[validate(custom(function = validate_phone))]
    pub phone: Option<String>,

    /// User's answers map.
    /// Key: question id ("q1", "q2", ...)
    /// Value: selected choice index, `null` when left unanswered
    #[serde(default)]
    pub answers: HashMap<String, Option<i32>>,
}

impl CreateSubmissionRequest {
    /// Trims identity fields and turns blank optional ones into `None`.
    pub fn normalized(self) -> Self {
        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            test_id: self.test_id,
            name: self.name.trim().to_string(),
            grade: optional(self.grade),
            email: optional(self.email),
            phone: optional(self.phone),
            answers: self.answers,
        }
    }

    /// Answers that carry a choice. Unanswered (`null`) questions are dropped.
    pub fn answered(&self) -> HashMap<String, i32> {
        self.answers
            .iter()
            .filter_map(|(q_id, choice)| choice.map(|c| (q_id.clone(), c)))
            .collect()
    }
}

fn validate_phone(phone: &str) -> Result<(), validator::ValidationError> {
    if !PHONE_RE.is_match(phone) {
        return Err(validator::ValidationError::new("invalid_phone"));
    }
    Ok(())
}
