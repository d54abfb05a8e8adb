// src/handlers/admin.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    extract::{AppMultipart, AppPath, AppQuery},
    models::{
        submission::{DELETED_TEST_TITLE, SubmissionDetail, SubmissionSummary},
        test::{ImageChange, NewTest, PublicTest, QuestionsDoc, TEST_COLUMNS, Test, TestEdit},
    },
    storage::AssetStore,
    utils::upload::TestForm,
};

/// Query parameters for listing tests.
#[derive(Debug, Deserialize)]
pub struct TestListParams {
    pub subject: Option<String>,
    pub level: Option<String>,
}

/// Lists tests, newest first, optionally filtered by subject and level.
/// Admin only.
pub async fn list_tests(
    State(pool): State<PgPool>,
    AppQuery(params): AppQuery<TestListParams>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!(
        r#"
        SELECT {}
        FROM tests
        WHERE ($1::TEXT IS NULL OR subject = $1)
          AND ($2::TEXT IS NULL OR level = $2)
        ORDER BY created_at DESC, id DESC
        "#,
        TEST_COLUMNS
    );

    let tests = sqlx::query_as::<_, Test>(&sql)
        .bind(params.subject)
        .bind(params.level)
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list tests: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let tests: Vec<PublicTest> = tests.into_iter().map(PublicTest::from).collect();
    Ok(Json(tests))
}

/// Retrieves a single test including its answer key.
/// Admin only.
pub async fn get_test(
    State(pool): State<PgPool>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = fetch_test(&pool, id).await?;
    Ok(Json(test))
}

/// Creates a test from a multipart upload.
/// Admin only.
///
/// * Validates counts and the answer key before touching the filesystem.
/// * Stores the image, then inserts the record.
/// * Removes the stored image again if the insert fails.
pub async fn upload_test(
    State(pool): State<PgPool>,
    State(assets): State<AssetStore>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = TestForm::read(&mut multipart).await?;

    let new = NewTest::from_form(&form)?;
    new.validate()?;
    let answer_key = new.encoded_key()?;

    let image = form
        .take_image()
        .ok_or_else(|| AppError::BadRequest("An image file is required".to_string()))?;

    let image_url = assets
        .save(image.file_name.as_deref(), &image.bytes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store test image: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let questions = QuestionsDoc::image(Some(image_url.clone()), new.num_questions, new.choices_count)?;

    let sql = format!(
        r#"
        INSERT INTO tests (subject, level, title, questions, answer_key)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        TEST_COLUMNS
    );

    let inserted = sqlx::query_as::<_, Test>(&sql)
        .bind(&new.subject)
        .bind(&new.level)
        .bind(new.resolved_title())
        .bind(SqlJson(&questions))
        .bind(SqlJson(&answer_key))
        .fetch_one(&pool)
        .await;

    let test = match inserted {
        Ok(test) => test,
        Err(e) => {
            tracing::error!("Failed to create test: {:?}", e);
            assets.delete_best_effort(Some(&image_url)).await;
            return Err(AppError::InternalServerError(e.to_string()));
        }
    };

    tracing::info!("Created test {} ({} / {})", test.id, test.subject, test.level);
    Ok((StatusCode::CREATED, Json(test)))
}

/// Edits a test from a multipart form. Fields are optional.
/// Admin only.
///
/// `remove_image` clears the image and wins over an uploaded file; an
/// uploaded file replaces the image. The unreferenced asset is deleted
/// once the update is stored.
pub async fn update_test(
    State(pool): State<PgPool>,
    State(assets): State<AssetStore>,
    AppPath(id): AppPath<i64>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = TestForm::read(&mut multipart).await?;

    let edit = TestEdit::from_form(&form)?;
    edit.validate()?;

    let test = fetch_test(&pool, id).await?;
    let mut changes = edit.apply(&test)?;

    let image_change = if edit.remove_image {
        ImageChange::Remove
    } else if let Some(image) = form.take_image() {
        let url = assets
            .save(image.file_name.as_deref(), &image.bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store test image: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;
        ImageChange::Replace(url)
    } else {
        ImageChange::Keep
    };

    let (next_image, stale_image) =
        image_change.resolve(test.questions.0.image_url.as_deref());
    changes.questions.image_url = next_image;

    let sql = format!(
        r#"
        UPDATE tests
        SET subject = $1, level = $2, title = $3, questions = $4, answer_key = $5
        WHERE id = $6
        RETURNING {}
        "#,
        TEST_COLUMNS
    );

    let updated = sqlx::query_as::<_, Test>(&sql)
        .bind(&changes.subject)
        .bind(&changes.level)
        .bind(&changes.title)
        .bind(SqlJson(&changes.questions))
        .bind(SqlJson(&changes.answer_key))
        .bind(id)
        .fetch_optional(&pool)
        .await;

    let updated = match updated {
        Ok(Some(test)) => test,
        Ok(None) => {
            discard_new_image(&assets, &image_change).await;
            return Err(AppError::NotFound("Test not found".to_string()));
        }
        Err(e) => {
            tracing::error!("Failed to update test: {:?}", e);
            discard_new_image(&assets, &image_change).await;
            return Err(AppError::InternalServerError(e.to_string()));
        }
    };

    assets.delete_best_effort(stale_image.as_deref()).await;

    Ok(Json(updated))
}

/// Replaces only the image of a test.
/// Admin only.
///
/// The previous asset is deleted only after the record points at the new one.
/// The old URL is read under the same row lock as the update, so concurrent
/// replacements each delete exactly the asset they displaced.
pub async fn replace_test_image(
    State(pool): State<PgPool>,
    State(assets): State<AssetStore>,
    AppPath(id): AppPath<i64>,
    AppMultipart(mut multipart): AppMultipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = TestForm::read(&mut multipart).await?;
    let image = form
        .take_image()
        .ok_or_else(|| AppError::BadRequest("An image file is required".to_string()))?;

    let image_url = assets
        .save(image.file_name.as_deref(), &image.bytes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store test image: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let (updated, previous) = match swap_image_url(&pool, id, &image_url).await {
        Ok(swapped) => swapped,
        Err(e) => {
            assets.delete_best_effort(Some(&image_url)).await;
            return Err(e);
        }
    };

    let (_, stale) = ImageChange::Replace(image_url).resolve(previous.as_deref());
    assets.delete_best_effort(stale.as_deref()).await;

    Ok(Json(updated))
}

/// Points the test at `image_url` and returns it with the URL it had before.
async fn swap_image_url(
    pool: &PgPool,
    id: i64,
    image_url: &str,
) -> Result<(Test, Option<String>), AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let previous: Option<String> =
        sqlx::query_scalar("SELECT questions->>'image_url' FROM tests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let sql = format!(
        r#"
        UPDATE tests
        SET questions = jsonb_set(questions, '{{image_url}}', to_jsonb($1::TEXT))
        WHERE id = $2
        RETURNING {}
        "#,
        TEST_COLUMNS
    );

    let updated = sqlx::query_as::<_, Test>(&sql)
        .bind(image_url)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to replace test image: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok((updated, previous))
}

/// Deletes a test by ID.
/// Admin only.
///
/// Submissions of the test are detached (kept, with `test_id` cleared) in the
/// same transaction as the delete. The image asset is removed afterwards on a
/// best-effort basis.
pub async fn delete_test(
    State(pool): State<PgPool>,
    State(assets): State<AssetStore>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let questions: SqlJson<QuestionsDoc> =
        sqlx::query_scalar("SELECT questions FROM tests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let detached = sqlx::query("UPDATE submissions SET test_id = NULL WHERE test_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to detach submissions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .rows_affected();

    sqlx::query("DELETE FROM tests WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete test: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    tracing::info!("Deleted test {} ({} submissions detached)", id, detached);
    assets
        .delete_best_effort(questions.0.image_url.as_deref())
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Query parameters for listing submissions.
#[derive(Debug, Deserialize)]
pub struct SubmissionListParams {
    pub test_id: Option<i64>,
    pub subject: Option<String>,
    pub level: Option<String>,
}

/// Lists submissions, newest first.
/// Admin only. Submissions of deleted tests report "(deleted test)".
pub async fn list_submissions(
    State(pool): State<PgPool>,
    AppQuery(params): AppQuery<SubmissionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let submissions = sqlx::query_as::<_, SubmissionSummary>(
        r#"
        SELECT
            s.id, s.test_id,
            COALESCE(t.title, $4) AS test_title,
            s.name, s.grade, s.email, s.phone,
            s.subject, s.level, s.score, s.created_at
        FROM submissions s
        LEFT JOIN tests t ON t.id = s.test_id
        WHERE ($1::BIGINT IS NULL OR s.test_id = $1)
          AND ($2::TEXT IS NULL OR s.subject = $2)
          AND ($3::TEXT IS NULL OR s.level = $3)
        ORDER BY s.created_at DESC, s.id DESC
        "#,
    )
    .bind(params.test_id)
    .bind(params.subject)
    .bind(params.level)
    .bind(DELETED_TEST_TITLE)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list submissions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(submissions))
}

/// Retrieves a single submission with its answers.
/// Admin only.
pub async fn get_submission(
    State(pool): State<PgPool>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let submission = sqlx::query_as::<_, SubmissionDetail>(
        r#"
        SELECT
            s.id, s.test_id,
            COALESCE(t.title, $2) AS test_title,
            s.name, s.grade, s.email, s.phone,
            s.subject, s.level, s.answers, s.score, s.created_at
        FROM submissions s
        LEFT JOIN tests t ON t.id = s.test_id
        WHERE s.id = $1
        "#,
    )
    .bind(id)
    .bind(DELETED_TEST_TITLE)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Submission not found".to_string()))?;

    Ok(Json(submission))
}

/// Deletes a submission by ID.
/// Admin only.
pub async fn delete_submission(
    State(pool): State<PgPool>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM submissions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Submission not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_test(pool: &PgPool, id: i64) -> Result<Test, AppError> {
    let sql = format!("SELECT {} FROM tests WHERE id = $1", TEST_COLUMNS);
    sqlx::query_as::<_, Test>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch test: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Test not found".to_string()))
}

async fn discard_new_image(assets: &AssetStore, change: &ImageChange) {
    if let ImageChange::Replace(url) = change {
        assets.delete_best_effort(Some(url)).await;
    }
}
