//! User and superuser creation, password storage and login against a real database.

mod common;

use axum::http::{Method, StatusCode};
use common::{new_user, user, TestDb, TEST_DATABASE_URL};
use onset_api::{AppError, UserManager};
use serde_json::json;

#[tokio::test]
async fn stored_password_is_hashed_and_never_returned() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let created = user(&db, "Ada@Example.COM", "ada").await;
    assert_eq!(created["email"], "Ada@example.com");
    assert_eq!(created["role"], "student");
    assert_eq!(created["is_superuser"], false);
    assert!(created.get("password").is_none());

    let stored: String = sqlx::query_scalar(&format!("SELECT password FROM \"{}\".users", db.schema))
        .fetch_one(&db.state.pool)
        .await
        .unwrap();
    assert_ne!(stored, "correct horse battery");
    assert!(stored.starts_with("$argon2"));
    db.cleanup().await;
}

#[tokio::test]
async fn superuser_has_both_flags() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let admin = UserManager::create_superuser(&db.state.pool, db.entity("users"), new_user("root@example.com", "root"))
        .await
        .unwrap();
    assert_eq!(admin["is_staff"], true);
    assert_eq!(admin["is_superuser"], true);
    db.cleanup().await;
}

#[tokio::test]
async fn superuser_override_is_rejected_before_insert() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let mut u = new_user("root@example.com", "root");
    u.extra.insert("is_superuser".into(), json!(false));
    let err = UserManager::create_superuser(&db.state.pool, db.entity("users"), u)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Privilege(_)));
    assert_eq!(db.count("users").await, 0);
    db.cleanup().await;
}

#[tokio::test]
async fn email_and_username_are_unique() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    user(&db, "ada@example.com", "ada").await;

    let err = UserManager::create_user(&db.state.pool, db.entity("users"), new_user("ada@example.com", "ada2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let (status, body) = db
        .request(
            Method::POST,
            "/api/v1/users",
            Some(json!({"email": "other@example.com", "username": "ada", "password": "pw", "date_of_birth": "1990-01-01"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(db.count("users").await, 1);
    db.cleanup().await;
}

#[tokio::test]
async fn api_cannot_grant_superuser() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let created = db
        .create(
            "users",
            json!({"email": "eve@example.com", "username": "eve", "password": "pw", "date_of_birth": "1990-01-01", "is_superuser": true}),
        )
        .await;
    assert_eq!(created["is_superuser"], false);
    db.cleanup().await;
}

#[tokio::test]
async fn login_with_email_and_password() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    user(&db, "ada@example.com", "ada").await;

    let (status, body) = db
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"email": "ada@EXAMPLE.com", "password": "correct horse battery"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "ada");
    assert!(body["data"]["last_login"].is_string());
    assert!(body["data"].get("password").is_none());

    let (status, body) = db
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"email": "ada@example.com", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    db.cleanup().await;
}

#[tokio::test]
async fn inactive_users_cannot_log_in() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let created = user(&db, "ada@example.com", "ada").await;
    let (status, _) = db
        .request(
            Method::PATCH,
            &format!("/api/v1/users/{}", created["id"]),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let err = UserManager::authenticate(&db.state.pool, db.entity("users"), "ada@example.com", "correct horse battery")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    db.cleanup().await;
}

#[tokio::test]
async fn password_change_through_patch_is_hashed() {
    skip_without_env!(TEST_DATABASE_URL);
    let db = TestDb::new().await;
    let created = user(&db, "ada@example.com", "ada").await;
    let (status, _) = db
        .request(
            Method::PATCH,
            &format!("/api/v1/users/{}", created["id"]),
            Some(json!({"password": "new secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    UserManager::authenticate(&db.state.pool, db.entity("users"), "ada@example.com", "new secret")
        .await
        .unwrap();
    db.cleanup().await;
}
