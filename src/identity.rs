//! User identity: validated user creation, superuser creation, password hashing and email-based authentication.

use crate::config::{CredentialSpec, ResolvedEntity};
use crate::error::AppError;
use crate::service::CrudService;
use crate::sql::{qualified_table, quoted};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

/// Prefix of stored passwords that can never verify.
pub const UNUSABLE_PASSWORD_PREFIX: char = '!';

const STAFF_FLAG: &str = "is_staff";
const SUPERUSER_FLAG: &str = "is_superuser";

/// Input for [`UserManager::create_user`] and [`UserManager::create_superuser`].
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub username: String,
    pub password: Option<String>,
    /// Any other user columns (first_name, date_of_birth, role, ...).
    pub extra: HashMap<String, Value>,
}

/// Lower-case the domain part of an email address; the local part is kept as given.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Hash a password with Argon2 (PHC string format).
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Validation(format!("password could not be hashed: {}", e)))
}

/// Verify a password against a stored hash. Unusable and malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with(UNUSABLE_PASSWORD_PREFIX) {
        return false;
    }
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// A stored value that marks the account as having no usable password.
pub fn unusable_password() -> String {
    format!("{}{}", UNUSABLE_PASSWORD_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Normalize the login email and hash the password in a request body before it is written.
/// With `require_login`, a missing or blank email is rejected; without it (partial update) only present fields are touched.
pub fn apply_credentials(
    body: &mut HashMap<String, Value>,
    spec: &CredentialSpec,
    require_login: bool,
) -> Result<(), AppError> {
    match body.get(&spec.login_column) {
        Some(Value::String(email)) if !email.trim().is_empty() => {
            let normalized = normalize_email(email);
            body.insert(spec.login_column.clone(), Value::String(normalized));
        }
        Some(Value::String(_)) | Some(Value::Null) | None if require_login || body.contains_key(&spec.login_column) => {
            return Err(AppError::Validation(format!("{} must be set", spec.login_column)));
        }
        Some(Value::String(_)) | Some(Value::Null) | None => {}
        Some(_) => {
            return Err(AppError::Validation(format!("{} must be a string", spec.login_column)));
        }
    }
    let stored = match body.get(&spec.password_column) {
        Some(Value::String(plain)) => Some(hash_password(plain)?),
        Some(Value::Null) => Some(unusable_password()),
        Some(_) => return Err(AppError::Validation(format!("{} must be a string", spec.password_column))),
        None if require_login => Some(unusable_password()),
        None => None,
    };
    if let Some(stored) = stored {
        body.insert(spec.password_column.clone(), Value::String(stored));
    }
    Ok(())
}

fn user_spec() -> CredentialSpec {
    CredentialSpec {
        login_column: "email".into(),
        password_column: "password".into(),
        active_column: "is_active".into(),
    }
}

/// Row body for a new user: email required and normalized, password hashed (or unusable when absent).
pub fn prepare_user(new: NewUser) -> Result<HashMap<String, Value>, AppError> {
    let NewUser {
        email,
        username,
        password,
        extra,
    } = new;
    let email = email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::Validation("the email field must be set".into()))?;
    let mut body = extra;
    body.insert("email".into(), Value::String(email));
    body.insert("username".into(), Value::String(username));
    body.insert("password".into(), password.map(Value::String).unwrap_or(Value::Null));
    apply_credentials(&mut body, &user_spec(), true)?;
    Ok(body)
}

/// Row body for a new superuser. Staff and superuser flags default to true; any other explicit value is rejected.
pub fn prepare_superuser(mut new: NewUser) -> Result<HashMap<String, Value>, AppError> {
    for flag in [STAFF_FLAG, SUPERUSER_FLAG] {
        let value = new.extra.entry(flag.to_string()).or_insert(Value::Bool(true));
        if *value != Value::Bool(true) {
            return Err(AppError::Privilege(format!("superuser must have {}=true", flag)));
        }
    }
    prepare_user(new)
}

/// Creates and authenticates users through the resolved `users` entity.
pub struct UserManager;

impl UserManager {
    pub async fn create_user(pool: &PgPool, users: &ResolvedEntity, new: NewUser) -> Result<Value, AppError> {
        let body = prepare_user(new)?;
        let row = CrudService::create(pool, users, &body).await?;
        tracing::info!(id = %row["id"], "user created");
        Ok(row)
    }

    pub async fn create_superuser(pool: &PgPool, users: &ResolvedEntity, new: NewUser) -> Result<Value, AppError> {
        let body = prepare_superuser(new)?;
        let row = CrudService::create(pool, users, &body).await?;
        tracing::info!(id = %row["id"], "superuser created");
        Ok(row)
    }

    /// Look the user up by normalized email, verify the password, reject inactive accounts, record last_login.
    /// Returns the user row (without the password) or `Unauthorized`.
    pub async fn authenticate(
        pool: &PgPool,
        users: &ResolvedEntity,
        email: &str,
        password: &str,
    ) -> Result<Value, AppError> {
        let spec = users
            .credentials
            .as_ref()
            .ok_or_else(|| AppError::BadRequest(format!("{} has no credentials", users.path_segment)))?;
        let sql = format!(
            "SELECT {}, {}, {} FROM {} WHERE {} = $1",
            quoted(&users.pk_columns[0]),
            quoted(&spec.password_column),
            quoted(&spec.active_column),
            qualified_table(users),
            quoted(&spec.login_column)
        );
        tracing::debug!(sql = %sql, "query");
        let row: Option<(i64, String, bool)> = sqlx::query_as(&sql)
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;
        let Some((id, hash, is_active)) = row else {
            // Keep timing roughly uniform for unknown accounts.
            let _ = hash_password(password);
            return Err(AppError::Unauthorized("invalid credentials".into()));
        };
        if !verify_password(password, &hash) || !is_active {
            return Err(AppError::Unauthorized("invalid credentials".into()));
        }
        let mut touch = HashMap::new();
        touch.insert("last_login".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
        CrudService::update(pool, users, &Value::from(id), &touch)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid credentials".into()))
    }
}
