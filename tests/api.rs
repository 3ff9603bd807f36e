//! Generic CRUD endpoints against a migrated schema.

mod common;

use axum::http::{Method, StatusCode};
use common::{course_body, course_tree, user, TestDb, TEST_DATABASE_URL};
use serde_json::json;

#[tokio::test]
async fn enrollment_date_is_fixed_at_creation() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let instructor = user(&db, "grace@example.com", "grace").await;
    let student = user(&db, "alan@example.com", "alan").await;
    let course = db.create("courses", course_body(&instructor["id"])).await;
    let enrollment = db
        .create(
            "enrollments",
            json!({"user_id": student["id"], "course_id": course["id"], "enrollment_date": "2000-01-01T00:00:00Z"}),
        )
        .await;
    let enrolled_at = enrollment["enrollment_date"].as_str().unwrap().to_string();
    assert!(!enrolled_at.starts_with("2000-01-01"));
    assert_eq!(enrollment["completion_status"], false);
    assert!(enrollment["grade"].is_null());

    let uri = format!("/api/v1/enrollments/{}", enrollment["id"]);
    let (status, body) = db
        .request(
            Method::PATCH,
            &uri,
            Some(json!({"completion_status": true, "grade": "91.50", "enrollment_date": "2001-01-01T00:00:00Z"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completion_status"], true);
    assert_eq!(body["data"]["grade"], "91.50");
    assert_eq!(body["data"]["enrollment_date"], enrolled_at.as_str());
    db.cleanup().await;
}

#[tokio::test]
async fn missing_parent_is_a_reference_error() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let (status, body) = db
        .request(Method::POST, "/api/v1/courses", Some(course_body(&json!(4242))))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "reference_error");
    db.cleanup().await;
}

#[tokio::test]
async fn negative_values_are_rejected_by_the_database_too() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let tree = course_tree(&db).await;
    let err = sqlx::query(&format!(
        "UPDATE \"{}\".courses SET duration = -1 WHERE id = $1",
        db.schema
    ))
    .bind(tree.course["id"].as_i64().unwrap())
    .execute(&db.state.pool)
    .await
    .unwrap_err();
    assert!(matches!(onset_api::AppError::from(err), onset_api::AppError::Validation(_)));
    db.cleanup().await;
}

#[tokio::test]
async fn list_filters_pages_and_includes() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let tree = course_tree(&db).await;
    let mut second = course_body(&tree.instructor["id"]);
    second["title"] = json!("Networking");
    second["level"] = json!("advanced");
    db.create("courses", second).await;

    let (status, body) = db.request(Method::GET, "/api/v1/courses?level=advanced", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["title"], "Networking");
    assert_eq!(body["data"][0]["enrollment_fee"], "49.99");

    let (_, body) = db.request(Method::GET, "/api/v1/courses?limit=1&offset=1", None).await;
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["title"], "Networking");

    let uri = format!("/api/v1/courses/{}?include=instructor,lessons", tree.course["id"]);
    let (status, body) = db.request(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["instructor"]["username"], "grace");
    assert!(body["data"]["instructor"].get("password").is_none());
    assert_eq!(body["data"]["lessons"].as_array().unwrap().len(), 1);
    db.cleanup().await;
}

#[tokio::test]
async fn put_replaces_and_patch_merges() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let tree = course_tree(&db).await;
    let uri = format!("/api/v1/courses/{}", tree.course["id"]);

    let mut replacement = course_body(&tree.instructor["id"]);
    replacement["title"] = json!("Systems Programming II");
    let (status, body) = db.request(Method::PUT, &uri, Some(replacement)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Systems Programming II");

    let (status, body) = db.request(Method::PATCH, &uri, Some(json!({"duration": 20}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duration"], 20);
    assert_eq!(body["data"]["title"], "Systems Programming II");

    let (status, _) = db
        .request(Method::PATCH, "/api/v1/courses/999", Some(json!({"duration": 1})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    db.cleanup().await;
}

#[tokio::test]
async fn migrations_can_run_twice() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    onset_api::apply_migrations(&db.state.pool, &db.state.config).await.unwrap();
    db.cleanup().await;
}

#[tokio::test]
async fn numeric_writes_store_their_value_whatever_the_json_type() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::with_connections(1).await;
    let tree = course_tree(&db).await;
    let (_, listed) = db.request(Method::GET, "/api/v1/enrollments", None).await;
    let uri = format!("/api/v1/enrollments/{}", listed["data"][0]["id"]);

    for (grade, stored) in [
        (json!(91.5), "91.50"),
        (json!(90), "90.00"),
        (json!("88.25"), "88.25"),
        (json!(91.5), "91.50"),
        (json!(90), "90.00"),
    ] {
        let (status, body) = db.request(Method::PATCH, &uri, Some(json!({ "grade": grade }))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["grade"], stored);
        let (_, read) = db.request(Method::GET, &uri, None).await;
        assert_eq!(read["data"]["grade"], stored);
    }

    let course_uri = format!("/api/v1/courses/{}", tree.course["id"]);
    for (fee, stored) in [(json!(10), "10.00"), (json!(12.5), "12.50"), (json!("7"), "7.00")] {
        let (status, body) = db
            .request(Method::PATCH, &course_uri, Some(json!({ "enrollment_fee": fee })))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["enrollment_fee"], stored);
    }
    db.cleanup().await;
}

#[tokio::test]
async fn json_column_stores_the_value_as_sent() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::with_connections(1).await;
    course_tree(&db).await;
    let (_, quizzes) = db.request(Method::GET, "/api/v1/quizzes", None).await;
    let quiz_id = quizzes["data"][0]["id"].clone();

    for options in [json!("[1,2]"), json!(5), json!({"a": true}), json!(["x", "y"])] {
        let question = db
            .create(
                "questions",
                json!({
                    "text": "Pick one",
                    "type": "multiple-choice",
                    "options": options,
                    "correct_answer": "x",
                    "quiz_id": quiz_id
                }),
            )
            .await;
        assert_eq!(question["options"], options);
        let (_, read) = db
            .request(Method::GET, &format!("/api/v1/questions/{}", question["id"]), None)
            .await;
        assert_eq!(read["data"]["options"], options);
    }
    db.cleanup().await;
}

#[tokio::test]
async fn wrongly_typed_values_are_validation_errors() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let tree = course_tree(&db).await;

    let (status, body) = db
        .request(
            Method::POST,
            "/api/v1/users",
            Some(json!({"email": "kay@example.com", "username": "kay", "password": "pw", "date_of_birth": 19900101})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let user_uri = format!("/api/v1/users/{}", tree.student["id"]);
    let (status, body) = db.request(Method::PATCH, &user_uri, Some(json!({"is_active": 5}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, body) = db
        .request(Method::GET, "/api/v1/lessons?duration=abc", None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    db.cleanup().await;
}
