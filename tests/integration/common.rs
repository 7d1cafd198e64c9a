use rocket::local::blocking::Client;
use room_relay::auth::TokenKeeper;
use room_relay::config::RelayConfig;

/// Wrapper around Client that auto-deletes the temp DB on drop.
/// Uses Option<Client> so we can drop the DB connection before deleting the file.
pub struct TestClient {
    client: Option<Client>,
    pub db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        // Drop client first to release SQLite connection (WAL mode holds the file)
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

/// Config pinned to defaults (plus a unique temp DB) so environment
/// variables can't race between parallel tests. The bus and cache point
/// at unroutable addresses; both are advisory for the HTTP surface.
fn test_config() -> RelayConfig {
    RelayConfig {
        database_path: format!(
            "/tmp/relay_test_{}.db",
            uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
        ),
        amqp_url: "amqp://127.0.0.1:1/%2f".to_string(),
        redis_url: "redis://127.0.0.1:1/0".to_string(),
        ..RelayConfig::default()
    }
}

pub fn test_client() -> TestClient {
    let config = test_config();
    let db_path = config.database_path.clone();
    let rocket = room_relay::rocket_with_config(config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient {
        client: Some(client),
        db_path,
    }
}

/// Mint a token the server under test accepts.
pub fn token_for(user_id: &str) -> String {
    let keeper = TokenKeeper::new(&RelayConfig::default().token_secret);
    urlencoding::encode(&keeper.mint(user_id)).into_owned()
}
