pub mod commission;
pub mod email;
pub mod notify;
pub mod password;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod time;

use actix_cors::Cors;
use actix_identity::IdentityMiddleware;
use actix_session::{
    SessionMiddleware, config::BrowserSession, storage::CookieSessionStore,
};
use actix_web::cookie::{Key, time::Duration as CookieDuration};
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use secrecy::{ExposeSecret, SecretBox};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::time::Duration;

use crate::notify::{Notifier, TelegramConfig};
use crate::store::StoreTimeout;
use crate::time::TimeSource;

/// Build the server, but not await it.
///
/// Returns the port that the server has bound to by modifying the config.
pub async fn build(
    config: &mut Config,
    time_source: TimeSource,
) -> anyhow::Result<Server> {
    // key for signing session cookies
    let secret_key = match &config.session_key {
        Some(key) => Key::try_from(key.expose_secret().as_bytes())
            .context("SESSION_KEY must be at least 64 bytes")?,
        None => Key::generate(),
    };
    let pool = connect(config).await?;
    let notifier =
        web::Data::new(Notifier::from_config(config, pool.clone(), time_source.clone()));
    let db_pool = web::Data::new(pool);
    let time_source = web::Data::new(time_source);
    let store_timeout = web::Data::new(StoreTimeout(config.store_timeout));

    // Clone config values for use in closure
    let allowed_origins = config.allowed_origins.clone();

    // OS assigns the port if binding to 0
    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))
        .context("Failed to bind listener")?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        // Configure CORS based on allowed origins
        let cors = if allowed_origins.contains(&"*".to_string()) {
            // Allow any origin (for development)
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        } else {
            let mut cors = Cors::default()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials();
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(cors)
            // Use signed cookie to track user id
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(
                    CookieSessionStore::default(),
                    secret_key.clone(),
                )
                .cookie_name("ledger".into())
                .session_lifecycle(
                    BrowserSession::default()
                        .state_ttl(CookieDuration::days(30)),
                )
                .build(),
            )
            .app_data(routes::json_config())
            .service(routes::api_services())
            .app_data(db_pool.clone())
            .app_data(time_source.clone())
            .app_data(notifier.clone())
            .app_data(store_timeout.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Open a connection pool whose acquire waits are bounded by the store
/// timeout.
pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")
}

pub struct Config {
    pub database_url: String,
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin (development only)
    pub allowed_origins: Vec<String>,
    pub email_api_key: SecretBox<String>,
    pub email_from_address: String,
    /// Chat-ops announcements are only logged when unset.
    pub telegram: Option<TelegramConfig>,
    pub scheduler_tick: Duration,
    pub store_timeout: Duration,
    /// Signing key for session cookies. A random key is generated when
    /// unset, which logs everyone out on restart.
    pub session_key: Option<SecretBox<String>>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        use std::env::var;

        let required = |name: &str| {
            var(name).with_context(|| format!("{name} must be set"))
        };
        let seconds = |name: &str, default: u64| -> anyhow::Result<Duration> {
            match var(name) {
                Ok(value) => value
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{name} must be a whole number of seconds")),
                Err(_) => Ok(Duration::from_secs(default)),
            }
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string()) // Default to allow any origin for development
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let telegram = match (var("TELEGRAM_BOT_TOKEN"), var("TELEGRAM_CHAT_ID"))
        {
            (Ok(token), Ok(chat_id)) => Some(TelegramConfig {
                bot_token: SecretBox::new(Box::new(token)),
                chat_id,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            ip: required("IP_ADDRESS")?,
            port: required("PORT")?
                .parse()
                .context("PORT must be a port number")?,
            allowed_origins,
            email_api_key: SecretBox::new(Box::new(required("EMAIL_API_KEY")?)),
            email_from_address: required("EMAIL_FROM_ADDRESS")?,
            telegram,
            scheduler_tick: seconds("SCHEDULER_TICK_SECS", 1)?,
            store_timeout: seconds("STORE_TIMEOUT_SECS", 10)?,
            session_key: var("SESSION_KEY")
                .ok()
                .map(|key| SecretBox::new(Box::new(key))),
        })
    }
}
