use crate::common::{test_client, token_for};
use rocket::http::Status;
use room_relay::db::{Db, MessageRow};
use room_relay::models::User;

// --- Channel tail cache route ---

#[test]
fn test_cache_route_requires_token() {
    let client = test_client();
    let res = client
        .get("/message/channel/cache?room_id=r1&channel_id=c1&token=bad")
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_cache_route_empty_room() {
    let client = test_client();
    let token = token_for("user-1");
    let room_id = uuid::Uuid::new_v4();
    let res = client
        .get(format!(
            "/message/channel/cache?room_id={room_id}&channel_id=c1&token={token}"
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(body.is_empty());
}

#[test]
fn test_cache_route_falls_back_to_store() {
    let client = test_client();
    let token = token_for("user-1");
    let room_id = uuid::Uuid::new_v4().to_string();
    let channel_id = uuid::Uuid::new_v4().to_string();

    // Seed the durable store directly: the cache is unreachable in tests,
    // so the route must serve the DB fallback path.
    let db = Db::new(&client.db_path);
    db.create_room_tables(&room_id).unwrap();
    db.insert_user(&User {
        id: "user-1".to_string(),
        username: "nanook".to_string(),
        email: "nanook@example.com".to_string(),
        hashed_password: "x".to_string(),
        profile_pic: None,
    })
    .unwrap();

    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    for i in 0..3i64 {
        db.append_messages(
            &room_id,
            &[MessageRow {
                id: format!("mid0000{i}"),
                channel_id: channel_id.clone(),
                sender_id: "user-1".to_string(),
                message: format!("message {i}"),
                timestamp: base + chrono::Duration::minutes(i),
            }],
        )
        .unwrap();
    }

    let res = client
        .get(format!(
            "/message/channel/cache?room_id={room_id}&channel_id={channel_id}&token={token}"
        ))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(body.len(), 3);
    // Newest first
    assert_eq!(body[0]["mid"], "mid00002");
    assert_eq!(body[0]["username"], "nanook");
    assert_eq!(body[0]["room_id"], room_id);
    assert_eq!(body[2]["mid"], "mid00000");
}

#[test]
fn test_cache_route_resolves_unknown_sender_to_id() {
    let client = test_client();
    let token = token_for("user-1");
    let room_id = uuid::Uuid::new_v4().to_string();

    let db = Db::new(&client.db_path);
    db.create_room_tables(&room_id).unwrap();
    db.append_messages(
        &room_id,
        &[MessageRow {
            id: "mid00000".to_string(),
            channel_id: "c1".to_string(),
            sender_id: "ghost-user".to_string(),
            message: "hello".to_string(),
            timestamp: chrono::Utc::now().naive_utc(),
        }],
    )
    .unwrap();

    let res = client
        .get(format!(
            "/message/channel/cache?room_id={room_id}&channel_id=c1&token={token}"
        ))
        .dispatch();
    let body: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["username"], "ghost-user");
}
