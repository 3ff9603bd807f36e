//! Create an administrative user with staff and superuser flags set.

use clap::Parser;
use onset_api::{bootstrap, AppError, NewUser, Settings, UserManager};
use serde_json::Value;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "createsuperuser")]
#[command(about = "Create a superuser in the course database.")]
struct Args {
    /// Login email address
    #[arg(long)]
    email: String,
    #[arg(long)]
    username: String,
    /// Without a password the account cannot log in until one is set
    #[arg(long)]
    password: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    date_of_birth: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
}

impl Args {
    fn into_new_user(self) -> NewUser {
        let mut extra = HashMap::new();
        for (col, value) in [
            ("date_of_birth", self.date_of_birth),
            ("first_name", self.first_name),
            ("last_name", self.last_name),
        ] {
            if let Some(v) = value {
                extra.insert(col.to_string(), Value::String(v));
            }
        }
        extra.insert("role".to_string(), Value::String("admin".into()));
        NewUser {
            email: Some(self.email),
            username: self.username,
            password: self.password,
            extra,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onset_api=warn")))
        .init();

    let args = Args::parse();
    if args.password.is_none() {
        tracing::warn!("no password given; the account has an unusable password");
    }
    let settings = Settings::from_env()?;
    let state = bootstrap(&settings).await?;
    let users = state
        .model
        .entity_by_path("users")
        .ok_or_else(|| AppError::NotFound("users".into()))?;

    let user = UserManager::create_superuser(&state.pool, users, args.into_new_user()).await?;
    println!("Superuser created: {}", serde_json::to_string_pretty(&user)?);
    Ok(())
}
