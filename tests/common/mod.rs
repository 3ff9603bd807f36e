//! Shared helpers for database-backed tests.
//!
//! Every test gets its own PostgreSQL schema (`onset_test_<uuid>`) on the server named by
//! `TEST_DATABASE_URL`; tests skip when the variable is unset.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use onset_api::{
    app_router, apply_migrations, course_schema, resolve, AppState, NewUser, ResolvedEntity, UserManager,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use tower::ServiceExt;

pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Skip test if environment variable is not set
#[macro_export]
macro_rules! skip_without_env {
    ($var:expr) => {
        if std::env::var($var).is_err() {
            eprintln!("Skipping test: {} environment variable not set", $var);
            return;
        }
    };
}

/// Migrated, isolated schema plus the state the server would run with.
pub struct TestDb {
    pub schema: String,
    pub state: AppState,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_connections(2).await
    }

    /// A pool of exactly `n` connections; with one, every request reuses the same cached statements.
    pub async fn with_connections(n: u32) -> Self {
        let url = std::env::var(TEST_DATABASE_URL).expect("TEST_DATABASE_URL set");
        let pool = PgPoolOptions::new()
            .max_connections(n)
            .connect(&url)
            .await
            .expect("connect to test database");
        let schema = format!("onset_test_{}", uuid::Uuid::new_v4().simple());
        let config = course_schema(&schema);
        apply_migrations(&pool, &config).await.expect("migrations apply");
        let model = resolve(&config).expect("schema resolves");
        Self {
            schema,
            state: AppState::new(pool, config, model),
        }
    }

    pub fn entity(&self, path: &str) -> &ResolvedEntity {
        self.state.model.entity_by_path(path).expect("entity exists")
    }

    pub fn router(&self) -> Router {
        app_router(self.state.clone(), 1024 * 1024)
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// POST and return the created row, panicking on anything but 201.
    pub async fn create(&self, path: &str, body: Value) -> Value {
        let (status, body) = self.request(Method::POST, &format!("/api/v1/{}", path), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "create {}: {}", path, body);
        body["data"].clone()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\".\"{}\"", self.schema, table))
            .fetch_one(&self.state.pool)
            .await
            .expect("count rows")
    }

    pub async fn cleanup(self) {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema))
            .execute(&self.state.pool)
            .await
            .expect("drop test schema");
        self.state.pool.close().await;
    }
}

pub fn new_user(email: &str, username: &str) -> NewUser {
    let mut extra = HashMap::new();
    extra.insert("date_of_birth".to_string(), json!("1990-01-01"));
    NewUser {
        email: Some(email.to_string()),
        username: username.to_string(),
        password: Some("correct horse battery".to_string()),
        extra,
    }
}

pub async fn user(db: &TestDb, email: &str, username: &str) -> Value {
    UserManager::create_user(&db.state.pool, db.entity("users"), new_user(email, username))
        .await
        .expect("user created")
}

pub fn course_body(instructor_id: &Value) -> Value {
    json!({
        "title": "Systems Programming",
        "description": "Ownership, borrowing and lifetimes",
        "duration": 12,
        "level": "intermediate",
        "category": "programming",
        "instructor_id": instructor_id,
        "enrollment_fee": "49.99"
    })
}

/// A course with one of each dependent row: lesson, enrollment, review, quiz, question, answer.
pub struct CourseTree {
    pub instructor: Value,
    pub student: Value,
    pub course: Value,
}

pub async fn course_tree(db: &TestDb) -> CourseTree {
    let instructor = user(db, "grace@example.com", "grace").await;
    let student = user(db, "alan@example.com", "alan").await;
    let course = db.create("courses", course_body(&instructor["id"])).await;
    let course_id = &course["id"];
    db.create(
        "lessons",
        json!({"title": "Moves", "description": "d", "content": "c", "duration": 30, "sequence_number": 1, "course_id": course_id}),
    )
    .await;
    db.create("enrollments", json!({"user_id": student["id"], "course_id": course_id})).await;
    db.create(
        "reviews",
        json!({"user_id": student["id"], "course_id": course_id, "rating": 5, "comment": "great"}),
    )
    .await;
    let quiz = db
        .create(
            "quizzes",
            json!({"title": "Quiz 1", "description": "d", "course_id": course_id, "pass_mark": "60.00", "duration": 15}),
        )
        .await;
    let question = db
        .create(
            "questions",
            json!({
                "text": "Is a &mut T aliasable?",
                "type": "true-false",
                "options": ["true", "false"],
                "correct_answer": "false",
                "quiz_id": quiz["id"]
            }),
        )
        .await;
    db.create(
        "answers",
        json!({"user_id": student["id"], "question_id": question["id"], "response": "false"}),
    )
    .await;
    CourseTree {
        instructor,
        student,
        course,
    }
}
