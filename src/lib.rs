pub mod auth;
pub mod bus;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod digestion;
pub mod error;
pub mod models;
pub mod notify;
pub mod observer;
pub mod presence;
pub mod rooms;
pub mod routes;

use auth::TokenKeeper;
use bus::BusGateway;
use cache::TailCache;
use config::RelayConfig;
use db::Db;
use digestion::DigestionBroker;
use notify::Notifier;
use presence::PresenceRegistry;
use rocket_cors::CorsOptions;
use rooms::RoomHub;
use std::sync::Arc;
use std::time::Duration;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    build_rocket(RelayConfig::from_env())
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    let mut config = RelayConfig::from_env();
    config.database_path = db_path.to_string();
    build_rocket(config)
}

pub fn rocket_with_config(config: RelayConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(config)
}

fn build_rocket(config: RelayConfig) -> rocket::Rocket<rocket::Build> {
    // Ensure data directory exists
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Arc::new(Db::new(&config.database_path));
    let tokens = Arc::new(TokenKeeper::new(&config.token_secret));
    let gateway = Arc::new(BusGateway::new(&config.amqp_url));
    let cache = Arc::new(TailCache::new(&config.redis_url));
    let broker = Arc::new(DigestionBroker::new(
        db.clone(),
        config.digest_batch_size,
        Duration::from_secs(config.digest_flush_secs),
    ));
    let presence = Arc::new(PresenceRegistry::new(cache.clone()));
    let notifier = Arc::new(Notifier::new(presence.clone()));
    let hub = Arc::new(RoomHub::new(
        gateway.clone(),
        cache.clone(),
        broker.clone(),
        db.clone(),
    ));

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let flush_broker = broker.clone();

    rocket::build()
        .manage(Arc::new(config))
        .manage(db)
        .manage(tokens)
        .manage(gateway)
        .manage(cache)
        .manage(broker)
        .manage(presence)
        .manage(notifier)
        .manage(hub)
        .attach(cors)
        .register(
            "/",
            rocket::catchers![routes::not_found, routes::unauthorized],
        )
        .mount(
            "/",
            rocket::routes![
                routes::message_socket,
                routes::channel_cache,
                routes::delete_message,
                routes::connection_socket,
                routes::status_get,
                routes::status_change,
                routes::status_all,
                routes::logs_socket,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Digestion Flush Loop",
            move |_rocket| {
                Box::pin(async move {
                    flush_broker.spawn_flush_loop();
                    println!("💾 Digestion flush loop started");
                })
            },
        ))
}
