// tests/flow_tests.rs
//
// End-to-end flows against a real Postgres. Set DATABASE_URL to run them;
// without it each test returns early.

use std::path::PathBuf;

use reqwest::multipart::{Form, Part};
use sqlx::postgres::PgPoolOptions;
use testdesk::{config::Config, routes, state::AppState};

const ADMIN_KEY: &str = "flow_test_admin_key";

struct TestApp {
    address: String,
    upload_dir: PathBuf,
    client: reqwest::Client,
}

impl TestApp {
    fn admin(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.address, path))
            .header("x-admin-key", ADMIN_KEY)
    }

    /// Filesystem path of an asset URL such as `/uploads/123-abc.png`.
    fn asset_path(&self, url: &str) -> PathBuf {
        let name = url.strip_prefix("/uploads/").expect("asset url");
        self.upload_dir.join(name)
    }
}

/// Helper function to spawn the app on a random port for testing.
/// Returns `None` when no database is configured.
async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database flow test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let upload_dir = std::env::temp_dir().join(format!("testdesk-flow-{}", uuid::Uuid::new_v4()));

    let config = Config {
        database_url,
        admin_key: ADMIN_KEY.to_string(),
        rust_log: "error".to_string(),
        upload_dir: upload_dir.clone(),
        port: 0,
        cors_origins: vec![],
    };

    let app = routes::create_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        upload_dir,
        client: reqwest::Client::new(),
    })
}

/// Subject unique to one test run, so picks never see other runs' tests.
fn unique_subject() -> String {
    format!("english_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn image_part(file_name: &str, bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .unwrap()
}

async fn upload_example_test(app: &TestApp, subject: &str) -> serde_json::Value {
    let form = Form::new()
        .text("subject", subject.to_string())
        .text("level", "beginner")
        .text("num_questions", "3")
        .text("choices_count", "4")
        .text("answer_key", "BAD")
        .part("image", image_part("sheet.png", b"first image"));

    let response = app
        .admin(reqwest::Method::POST, "/admin/tests")
        .multipart(form)
        .send()
        .await
        .expect("upload failed");

    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn upload_pick_and_grade() {
    let Some(app) = spawn_app().await else { return };
    let subject = unique_subject();

    // 1. Upload
    let test = upload_example_test(&app, &subject).await;
    assert_eq!(test["answer_key"], serde_json::json!({"q1": 1, "q2": 0, "q3": 3}));
    assert_eq!(test["title"], format!("{} beginner Test", subject.to_uppercase()));
    assert_eq!(test["questions"]["type"], "image");
    assert_eq!(
        test["questions"]["choices"],
        serde_json::json!(["A", "B", "C", "D"])
    );
    let image_url = test["questions"]["image_url"].as_str().unwrap().to_string();
    assert!(app.asset_path(&image_url).exists());

    // 2. Public pick hides the answer key
    let picked: serde_json::Value = app
        .client
        .get(format!(
            "{}/tests?subject={}&level=beginner&pick=latest",
            app.address, subject
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(picked["id"], test["id"]);
    assert!(picked.get("answer_key").is_none());

    // 3. Submit: two of three correct
    let response = app
        .client
        .post(format!("{}/submissions", app.address))
        .json(&serde_json::json!({
            "test_id": test["id"],
            "name": "Ada",
            "grade": "7",
            "email": "ada@example.com",
            "answers": {"q1": 1, "q2": 0, "q3": 0, "q99": 2}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["score"], 67);
    assert_eq!(result["correct_count"], 2);
    assert_eq!(result["total_questions"], 3);

    // 4. Admin sees the submission with the snapshot of subject and level
    let submission: serde_json::Value = app
        .admin(
            reqwest::Method::GET,
            &format!("/admin/submissions/{}", result["id"]),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submission["subject"], subject);
    assert_eq!(submission["level"], "beginner");
    assert_eq!(submission["test_title"], test["title"]);
    assert_eq!(submission["answers"]["q3"], 0);
}

#[tokio::test]
async fn pick_without_match_is_404() {
    let Some(app) = spawn_app().await else { return };

    let response = app
        .client
        .get(format!(
            "{}/tests?subject={}&level=none",
            app.address,
            unique_subject()
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn replacing_image_deletes_only_the_previous_asset() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let old_url = test["questions"]["image_url"].as_str().unwrap().to_string();

    let response = app
        .admin(
            reqwest::Method::PUT,
            &format!("/admin/tests/{}/image", test["id"]),
        )
        .multipart(Form::new().part("image", image_part("new.png", b"second image")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let updated: serde_json::Value = response.json().await.unwrap();
    let new_url = updated["questions"]["image_url"].as_str().unwrap().to_string();

    assert_ne!(old_url, new_url);
    assert!(!app.asset_path(&old_url).exists());
    assert_eq!(
        std::fs::read(app.asset_path(&new_url)).unwrap(),
        b"second image"
    );
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 1);
    assert_eq!(updated["answer_key"], test["answer_key"]);
}

#[tokio::test]
async fn edit_keeps_key_unless_supplied_and_can_remove_image() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let old_url = test["questions"]["image_url"].as_str().unwrap().to_string();
    let path = format!("/admin/tests/{}", test["id"]);

    // Title and count change, key omitted: key kept as-is
    let edited: serde_json::Value = app
        .admin(reqwest::Method::PUT, &path)
        .multipart(
            Form::new()
                .text("title", "Renamed")
                .text("num_questions", "4")
                .text("choices_count", "5"),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(edited["title"], "Renamed");
    assert_eq!(edited["questions"]["num_questions"], 4);
    assert_eq!(
        edited["questions"]["choices"],
        serde_json::json!(["A", "B", "C", "D", "E"])
    );
    assert_eq!(edited["answer_key"], test["answer_key"]);
    assert_eq!(edited["questions"]["image_url"], old_url.as_str());

    // Key supplied: re-encoded against the new counts
    let rekeyed: serde_json::Value = app
        .admin(reqwest::Method::PUT, &path)
        .multipart(Form::new().text("answer_key", "eadc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        rekeyed["answer_key"],
        serde_json::json!({"q1": 4, "q2": 0, "q3": 3, "q4": 2})
    );

    // Remove the image
    let cleared: serde_json::Value = app
        .admin(reqwest::Method::PUT, &path)
        .multipart(Form::new().text("remove_image", "true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(cleared["questions"]["image_url"].is_null());
    assert!(!app.asset_path(&old_url).exists());

    // Unknown test
    let response = app
        .admin(reqwest::Method::PUT, "/admin/tests/999999999")
        .multipart(Form::new().text("title", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn deleting_a_test_keeps_its_submissions() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let image_url = test["questions"]["image_url"].as_str().unwrap().to_string();

    let submission: serde_json::Value = app
        .client
        .post(format!("{}/submissions", app.address))
        .json(&serde_json::json!({
            "test_id": test["id"],
            "name": "Grace",
            "answers": {"q1": 1, "q2": 0, "q3": 3}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submission["score"], 100);

    let response = app
        .admin(reqwest::Method::DELETE, &format!("/admin/tests/{}", test["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert!(!app.asset_path(&image_url).exists());

    let detail: serde_json::Value = app
        .admin(
            reqwest::Method::GET,
            &format!("/admin/submissions/{}", submission["id"]),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(detail["test_id"].is_null());
    assert_eq!(detail["test_title"], "(deleted test)");
    assert_eq!(detail["score"], 100);

    // Second delete: test is gone
    let response = app
        .admin(reqwest::Method::DELETE, &format!("/admin/tests/{}", test["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // Submissions can still be removed explicitly
    let response = app
        .admin(
            reqwest::Method::DELETE,
            &format!("/admin/submissions/{}", submission["id"]),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn submission_for_missing_test_is_404() {
    let Some(app) = spawn_app().await else { return };

    let response = app
        .client
        .post(format!("{}/submissions", app.address))
        .json(&serde_json::json!({
            "test_id": 999999999,
            "name": "Nobody",
            "answers": {}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn unanswered_questions_score_as_incorrect() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;

    let response = app
        .client
        .post(format!("{}/submissions", app.address))
        .json(&serde_json::json!({
            "test_id": test["id"],
            "name": "Ada",
            "answers": {"q1": 1, "q2": null, "q3": 3}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["correct_count"], 2);
    assert_eq!(result["score"], 67);

    let detail: serde_json::Value = app
        .admin(
            reqwest::Method::GET,
            &format!("/admin/submissions/{}", result["id"]),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(detail["answers"].get("q2").is_none());
}

#[tokio::test]
async fn edit_with_new_image_replaces_previous_asset() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let old_url = test["questions"]["image_url"].as_str().unwrap().to_string();

    let response = app
        .admin(reqwest::Method::PUT, &format!("/admin/tests/{}", test["id"]))
        .multipart(
            Form::new()
                .text("title", "With new sheet")
                .part("image", image_part("edited.png", b"edited image")),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let edited: serde_json::Value = response.json().await.unwrap();
    let new_url = edited["questions"]["image_url"].as_str().unwrap().to_string();

    assert_ne!(old_url, new_url);
    assert_eq!(edited["title"], "With new sheet");
    assert!(!app.asset_path(&old_url).exists());
    assert_eq!(
        std::fs::read(app.asset_path(&new_url)).unwrap(),
        b"edited image"
    );
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn remove_image_wins_over_uploaded_file() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let old_url = test["questions"]["image_url"].as_str().unwrap().to_string();

    let response = app
        .admin(reqwest::Method::PUT, &format!("/admin/tests/{}", test["id"]))
        .multipart(
            Form::new()
                .text("remove_image", "true")
                .part("image", image_part("ignored.png", b"ignored image")),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let edited: serde_json::Value = response.json().await.unwrap();
    assert!(edited["questions"]["image_url"].is_null());
    assert!(!app.asset_path(&old_url).exists());
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn concurrent_image_replacements_leave_one_asset() {
    let Some(app) = spawn_app().await else { return };
    let test = upload_example_test(&app, &unique_subject()).await;
    let path = format!("/admin/tests/{}/image", test["id"]);

    let first = app
        .admin(reqwest::Method::PUT, &path)
        .multipart(Form::new().part("image", image_part("a.png", b"image a")))
        .send();
    let second = app
        .admin(reqwest::Method::PUT, &path)
        .multipart(Form::new().part("image", image_part("b.png", b"image b")))
        .send();
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().status().as_u16(), 200);
    assert_eq!(second.unwrap().status().as_u16(), 200);

    let stored: serde_json::Value = app
        .admin(reqwest::Method::GET, &format!("/admin/tests/{}", test["id"]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let current = stored["questions"]["image_url"].as_str().unwrap();

    let remaining: Vec<PathBuf> = std::fs::read_dir(&app.upload_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(remaining, vec![app.asset_path(current)]);
}
