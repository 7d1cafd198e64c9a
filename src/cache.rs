use crate::error::Result;
use crate::models::MessageEnvelope;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Entries kept per channel tail list.
const TAIL_LEN: isize = 100;

/// Hash holding `user_id -> status`, authoritative across processes.
const STATUS_HASH: &str = "user_status";

/// Thin typed wrapper over the shared key-value store. The cache is
/// advisory: callers use the `*_logged` variants on the hot path, which
/// swallow failures after printing them.
pub struct TailCache {
    url: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

pub fn tail_key(room_id: &str, channel_id: &str) -> String {
    format!("room:{room_id}:channel:{channel_id}:messages")
}

impl TailCache {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            conn: Mutex::new(None),
        }
    }

    /// Lazily (re)connect. Concurrent callers share one attempt.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let client = redis::Client::open(self.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_connection(&self) {
        *self.conn.lock().await = None;
    }

    pub async fn push_tail(&self, room_id: &str, channel_id: &str, envelope_json: &str) -> Result<()> {
        let key = tail_key(room_id, channel_id);
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = async {
            conn.lpush::<_, _, ()>(&key, envelope_json).await?;
            conn.ltrim::<_, ()>(&key, 0, TAIL_LEN - 1).await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            self.drop_connection().await;
        }
        Ok(result?)
    }

    /// Best-effort push. Failures are logged and swallowed.
    pub async fn push_tail_logged(&self, room_id: &str, channel_id: &str, envelope: &MessageEnvelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("⚠️ Tail cache: failed to encode envelope: {e}");
                return;
            }
        };
        if let Err(e) = self.push_tail(room_id, channel_id, &payload).await {
            eprintln!("⚠️ Tail cache: push failed for room {room_id}: {e}");
        }
    }

    /// Full tail for one channel, newest first.
    pub async fn load_tail(&self, room_id: &str, channel_id: &str) -> Result<Vec<String>> {
        let key = tail_key(room_id, channel_id);
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<Vec<String>> = conn.lrange(&key, 0, -1).await;
        if result.is_err() {
            self.drop_connection().await;
        }
        Ok(result?)
    }

    pub async fn set_status(&self, user_id: &str, status: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = conn.hset(STATUS_HASH, user_id, status).await;
        if result.is_err() {
            self.drop_connection().await;
        }
        Ok(result?)
    }

    /// Best-effort status mirror. Failures are logged and swallowed.
    pub async fn set_status_logged(&self, user_id: &str, status: &str) {
        if let Err(e) = self.set_status(user_id, status).await {
            eprintln!("⚠️ Tail cache: status write failed for {user_id}: {e}");
        }
    }

    pub async fn get_status(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<Option<String>> = conn.hget(STATUS_HASH, user_id).await;
        if result.is_err() {
            self.drop_connection().await;
        }
        Ok(result?)
    }

    pub async fn get_all_statuses(&self) -> Result<HashMap<String, String>> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<HashMap<String, String>> = conn.hgetall(STATUS_HASH).await;
        if result.is_err() {
            self.drop_connection().await;
        }
        Ok(result?)
    }
}
