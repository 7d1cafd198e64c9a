use crate::common::{test_client, token_for};
use rocket::http::Status;
use room_relay::db::{Db, MessageRow};

// --- Message deletion ---

#[test]
fn test_delete_message_requires_token() {
    let client = test_client();
    let room_id = uuid::Uuid::new_v4();
    let res = client
        .delete(format!("/message/{room_id}/mid00000?token=bad"))
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_delete_message_from_store() {
    let client = test_client();
    let token = token_for("user-1");
    let room_id = uuid::Uuid::new_v4().to_string();

    let db = Db::new(&client.db_path);
    db.create_room_tables(&room_id).unwrap();
    db.append_messages(
        &room_id,
        &[MessageRow {
            id: "gone0001".to_string(),
            channel_id: "c1".to_string(),
            sender_id: "user-1".to_string(),
            message: "delete me".to_string(),
            timestamp: chrono::Utc::now().naive_utc(),
        }],
    )
    .unwrap();

    let res = client
        .delete(format!("/message/{room_id}/gone0001?token={token}"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["deleted"], true);

    // Already gone
    let res = client
        .delete(format!("/message/{room_id}/gone0001?token={token}"))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_delete_message_unknown_room() {
    let client = test_client();
    let token = token_for("user-1");
    let room_id = uuid::Uuid::new_v4();
    let res = client
        .delete(format!("/message/{room_id}/mid00000?token={token}"))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
