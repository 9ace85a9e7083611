//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::identity::UserRole;
use crate::jwt::{DEFAULT_ACCESS_LIFETIME_SECS, DEFAULT_REFRESH_LIFETIME_SECS, TokenLifetimes};
use crate::password::hash_password;
use clap::Parser;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const GENERATED_PASSWORD_LENGTH: usize = 24;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Courtside",
    about = "League platform authentication service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7419")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "courtside.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ACCESS_LIFETIME_SECS)]
    pub access_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_LIFETIME_SECS)]
    pub refresh_ttl: u64,

    /// Set the Secure flag on refresh cookies. Required behind HTTPS
    #[arg(long)]
    pub secure_cookies: bool,

    /// Create an admin user with this email on startup and print the generated password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Handle the --create-admin flag: create an admin account with a random
/// password and print the credentials once.
pub async fn handle_create_admin(db: &Database, email: &str) {
    match db.users().get_by_email(email).await {
        Ok(Some(_)) => {
            error!(email = %email, "User already exists, not creating admin");
            std::process::exit(1);
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }

    let password: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect();

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            std::process::exit(1);
        }
    };

    let display_name = email.split('@').next().unwrap_or("admin");
    let uuid = Uuid::new_v4().to_string();

    match db
        .users()
        .create(&uuid, email, display_name, &password_hash, UserRole::Admin)
        .await
    {
        Ok(_) => {
            println!();
            println!("Admin user created: {}", email);
            println!("Password: {}", password);
            println!("Change this password after first login.");
            println!();
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        lifetimes: TokenLifetimes {
            access_secs: args.access_ttl,
            refresh_secs: args.refresh_ttl,
        },
        secure_cookies: args.secure_cookies,
        rate_limit: true,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
