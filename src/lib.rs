//! Onset: course-management backend. Users, courses, lessons, enrollments, reviews, quizzes,
//! questions and answers served as generic CRUD resources over PostgreSQL.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod migration;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use config::{resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use db::{bootstrap, ensure_database_exists};
pub use error::{AppError, ConfigError};
pub use identity::{NewUser, UserManager};
pub use migration::{apply_migrations, plan_migrations};
pub use routes::app_router;
pub use schema::course_schema;
pub use service::CrudService;
pub use settings::Settings;
pub use state::AppState;
