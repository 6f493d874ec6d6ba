use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Port the inbound callback API listens on (default: 3000)
    pub api_port: u16,

    /// Secret used to encrypt queued callback payloads
    pub callback_secret: String,

    /// Timeout for outbound HTTP calls in seconds (default: 30)
    pub http_timeout_seconds: u64,

    /// Maximum retry attempts for a failed task (default: 3)
    pub max_retry_attempts: u32,

    /// Delay before a retried task is re-run, in seconds (default: 60)
    pub retry_delay_seconds: u64,

    /// Base URL of the contact-profile resolution service
    pub contact_profile_url: Option<String>,

    /// Internal webhook notified whenever a provider reports a complaint
    pub operator_complaint_url: Option<String>,

    /// Sender address used for verification mail; callbacks referencing it
    /// are not trackable notifications
    pub verify_sender_email: String,

    /// Sender address used for invitation mail; callbacks referencing it
    /// are not trackable notifications
    pub invitation_sender_email: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            callback_secret: std::env::var("CALLBACK_SECRET")
                .map_err(|_| anyhow::anyhow!("CALLBACK_SECRET environment variable is required"))?,
            http_timeout_seconds: std::env::var("HTTP_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECONDS must be a valid u64"))?,
            max_retry_attempts: std::env::var("MAX_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_RETRY_ATTEMPTS must be a valid u32"))?,
            retry_delay_seconds: std::env::var("RETRY_DELAY_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_DELAY_SECONDS must be a valid u64"))?,
            contact_profile_url: std::env::var("CONTACT_PROFILE_URL").ok(),
            operator_complaint_url: std::env::var("OPERATOR_COMPLAINT_URL").ok(),
            verify_sender_email: std::env::var("VERIFY_SENDER_EMAIL")
                .unwrap_or_else(|_| "verify@courier.example".to_string()),
            invitation_sender_email: std::env::var("INVITATION_SENDER_EMAIL")
                .unwrap_or_else(|_| "invite@courier.example".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
