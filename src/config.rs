use std::env;

/// Runtime configuration. All values read from environment variables with
/// sensible defaults.
///
/// Environment variables:
/// - `DATABASE_PATH` — SQLite database file (default: data/relay.db)
/// - `AMQP_URL` — message bus address (default: amqp://127.0.0.1:5672/%2f)
/// - `REDIS_URL` — tail cache address (default: redis://127.0.0.1:6379/1)
/// - `TOKEN_SECRET` — HMAC key for bearer tokens
/// - `DIGEST_BATCH_SIZE` — messages per write-behind flush (default: 10)
/// - `DIGEST_FLUSH_SECS` — seconds between background flushes (default: 5)
/// - `HEARTBEAT_SECS` — seconds between STATUS_UPDATE frames (default: 30)
/// - `EXPIRY_TIMEOUT_SECS` — silence before a connection is dropped (default: 100)
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub database_path: String,
    pub amqp_url: String,
    pub redis_url: String,
    pub token_secret: String,
    pub digest_batch_size: usize,
    pub digest_flush_secs: u64,
    pub heartbeat_secs: u64,
    pub expiry_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_path: "data/relay.db".to_string(),
            amqp_url: "amqp://127.0.0.1:5672/%2f".to_string(),
            redis_url: "redis://127.0.0.1:6379/1".to_string(),
            token_secret: "change-me-in-production".to_string(),
            digest_batch_size: 10,
            digest_flush_secs: 5,
            heartbeat_secs: 30,
            expiry_timeout_secs: 100,
        }
    }
}

impl RelayConfig {
    /// Create a RelayConfig from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("DATABASE_PATH") {
            config.database_path = val;
        }
        if let Ok(val) = env::var("AMQP_URL") {
            config.amqp_url = val;
        }
        if let Ok(val) = env::var("REDIS_URL") {
            config.redis_url = val;
        }
        if let Ok(val) = env::var("TOKEN_SECRET") {
            config.token_secret = val;
        }
        if let Ok(val) = env::var("DIGEST_BATCH_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            config.digest_batch_size = n;
        }
        if let Ok(val) = env::var("DIGEST_FLUSH_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.digest_flush_secs = n;
        }
        if let Ok(val) = env::var("HEARTBEAT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.heartbeat_secs = n;
        }
        if let Ok(val) = env::var("EXPIRY_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.expiry_timeout_secs = n;
        }

        config
    }
}
