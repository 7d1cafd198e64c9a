use crate::common::{test_client, token_for};
use rocket::http::Status;

// --- Status surface ---

#[test]
fn test_status_get_requires_token() {
    let client = test_client();
    let res = client.get("/status/get?token=garbage").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_status_get_defaults_online() {
    let client = test_client();
    let token = token_for("user-1");
    let res = client.get(format!("/status/get?token={token}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "online");
}

#[test]
fn test_status_change_round_trip() {
    let client = test_client();
    let token = token_for("user-2");

    let res = client
        .post(format!("/status/change?token={token}&new_status=dnd"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "200");

    let res = client.get(format!("/status/get?token={token}")).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "dnd");
}

#[test]
fn test_status_change_validates_value() {
    let client = test_client();
    let token = token_for("user-3");
    let res = client
        .post(format!("/status/change?token={token}&new_status=busy"))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().contains("busy"));
}

#[test]
fn test_status_change_requires_token() {
    let client = test_client();
    let res = client
        .post("/status/change?token=garbage&new_status=idle")
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_status_all_empty_without_cache() {
    // The shared cache is unreachable in tests; the route degrades to an
    // empty map instead of failing.
    let client = test_client();
    let token = token_for("user-4");
    let res = client.get(format!("/status/all?token={token}")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body.as_object().unwrap().is_empty());
}

#[test]
fn test_unknown_route_404() {
    let client = test_client();
    let res = client.get("/definitely/not/here").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}
