// src/handlers/submissions.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    extract::AppJson,
    models::submission::CreateSubmissionRequest,
    utils::{answer_key::AnswerKey, scoring::grade},
};

/// Helper struct for fetching what grading needs from a test.
#[derive(sqlx::FromRow)]
struct GradingSource {
    subject: String,
    level: String,
    answer_key: SqlJson<AnswerKey>,
}

/// Grades a test-taker's answers and stores the submission.
///
/// * Loads the answer key of the referenced test (404 if absent).
/// * Scores the answers as a rounded percentage.
/// * Snapshots the test's subject and level into the submission.
pub async fn create_submission(
    State(pool): State<PgPool>,
    AppJson(req): AppJson<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = req.normalized();
    req.validate()?;

    let source = sqlx::query_as::<_, GradingSource>(
        "SELECT subject, level, answer_key FROM tests WHERE id = $1",
    )
    .bind(req.test_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load answer key: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let answers = req.answered();
    let result = grade(&source.answer_key.0, &answers);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO submissions
        (test_id, name, grade, email, phone, subject, level, answers, score)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(req.test_id)
    .bind(&req.name)
    .bind(&req.grade)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&source.subject)
    .bind(&source.level)
    .bind(SqlJson(&answers))
    .bind(result.score)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(
        "Submission {} for test {} scored {} ({}/{})",
        id,
        req.test_id,
        result.score,
        result.correct_count,
        result.total_questions
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "score": result.score,
            "correct_count": result.correct_count,
            "total_questions": result.total_questions,
        })),
    ))
}
