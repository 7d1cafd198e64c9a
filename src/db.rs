use crate::error::{RelayError, Result};
use crate::models::User;
use chrono::NaiveDateTime;
use rusqlite::{Connection, params};
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    pub conn: Mutex<Connection>,
}

/// A row bound for a per-room message table.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: NaiveDateTime,
}

/// A persisted chat message row in a per-room table.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: String,
}

/// Resolve the per-room message table name. Room ids must be UUIDs so the
/// identifier is never attacker-controlled.
pub fn message_table(room_id: &str) -> Result<String> {
    checked_room_id(room_id)?;
    Ok(format!("messages_{room_id}"))
}

/// Resolve the per-room channel table name.
pub fn channel_table(room_id: &str) -> Result<String> {
    checked_room_id(room_id)?;
    Ok(format!("channels_{room_id}"))
}

fn checked_room_id(room_id: &str) -> Result<()> {
    uuid::Uuid::parse_str(room_id)
        .map(|_| ())
        .map_err(|_| RelayError::Protocol(format!("invalid room id: {room_id}")))
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                hashed_password TEXT NOT NULL,
                profile_pic TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);",
        )
        .expect("Failed to run migrations");
    }

    /// Idempotently create the per-room message and channel tables, seeding
    /// a default `general` channel the way rooms are bootstrapped.
    pub fn create_room_tables(&self, room_id: &str) -> Result<()> {
        let messages = message_table(room_id)?;
        let channels = channel_table(room_id)?;
        let conn = self.conn();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{messages}\" (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS \"idx_{messages}_channel\" ON \"{messages}\"(channel_id);

            CREATE TABLE IF NOT EXISTS \"{channels}\" (
                id TEXT PRIMARY KEY,
                channel_name TEXT NOT NULL,
                channel_description TEXT DEFAULT '',
                author TEXT NOT NULL,
                time_created TEXT NOT NULL
            );"
        ))?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{channels}\""),
            [],
            |r| r.get(0),
        )?;
        if count == 0 {
            conn.execute(
                &format!(
                    "INSERT INTO \"{channels}\" (id, channel_name, channel_description, author, time_created)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    uuid::Uuid::new_v4().to_string(),
                    "general",
                    "Default channel",
                    "system",
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    /// Append a batch of rows to a room's message table in one transaction.
    /// Inserts are keyed by message id, so a retried flush never
    /// double-inserts a row that already landed.
    pub fn append_messages(&self, room_id: &str, rows: &[MessageRow]) -> Result<()> {
        let table = message_table(room_id)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO \"{table}\" (id, channel_id, sender_id, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.id,
                    row.channel_id,
                    row.sender_id,
                    row.message,
                    row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch every message of one channel as a list, oldest first.
    pub fn fetch_channel_messages(
        &self,
        room_id: &str,
        channel_id: &str,
    ) -> Result<Vec<StoredMessage>> {
        let table = message_table(room_id)?;
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, channel_id, sender_id, message, timestamp FROM \"{table}\"
             WHERE channel_id = ?1 ORDER BY timestamp ASC"
        ))?;
        let rows = stmt
            .query_map(params![channel_id], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    message: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Delete one message from a room's table. Returns rows removed.
    pub fn delete_message(&self, room_id: &str, message_id: &str) -> Result<usize> {
        let table = message_table(room_id)?;
        let conn = self.conn();
        let deleted = conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE id = ?1"),
            params![message_id],
        )?;
        Ok(deleted)
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, hashed_password, profile_pic FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    hashed_password: row.get(3)?,
                    profile_pic: row.get(4)?,
                })
            },
        )
        .ok()
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, email, hashed_password, profile_pic FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    hashed_password: row.get(3)?,
                    profile_pic: row.get(4)?,
                })
            },
        )
        .ok()
    }

    pub fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (id, username, email, hashed_password, profile_pic)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.username,
                user.email,
                user.hashed_password,
                user.profile_pic
            ],
        )?;
        Ok(())
    }
}
