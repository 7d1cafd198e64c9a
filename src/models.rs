use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inbound chat frame on `/message/<room_id>`.
#[derive(Debug, Deserialize, Clone)]
pub struct MessageIn {
    pub channel_id: String,
    pub message: String,
    pub timestamp: String,
}

/// The authoritative envelope: every message that leaves the broadcaster
/// toward a client carries all seven fields.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageEnvelope {
    pub mid: String,
    pub uid: String,
    pub username: String,
    pub room_id: String,
    pub channel_id: String,
    pub message: String,
    pub timestamp: String,
}

/// Connection state of a user.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Dnd,
    Idle,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserStatus::Online => "online",
            UserStatus::Offline => "offline",
            UserStatus::Dnd => "dnd",
            UserStatus::Idle => "idle",
        };
        f.write_str(s)
    }
}

impl FromStr for UserStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(UserStatus::Online),
            "offline" => Ok(UserStatus::Offline),
            "dnd" => Ok(UserStatus::Dnd),
            "idle" => Ok(UserStatus::Idle),
            _ => Err(()),
        }
    }
}

/// Inbound frame on `/connection` (unknown frames are ignored).
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: Option<String>,
}

/// Notification identifier space. Not enforced at the dispatch layer;
/// the consumer decides what each kind means.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    RoomPost,
    FriendRequest,
    RoomInvitation,
    DM,
}

/// A user row from the consumed identity store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub profile_pic: Option<String>,
}

/// Generate a message id: 8 chars, lowercase letters + digits.
pub fn new_mid() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut n = uuid::Uuid::new_v4().as_u128();
    (0..8)
        .map(|_| {
            let c = ALPHABET[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}
