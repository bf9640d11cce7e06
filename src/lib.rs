#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;

/// Name of the MongoDB database the server uses.
pub const DATABASE: &str = "polls";

/// Everything is served under this prefix.
pub const API_BASE: &str = "/api/v1";

/// Build the server: logging, config and database fairings, plus every route.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .mount(API_BASE, api::routes())
}

/// Connect to the database named in the figment, for tests.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to test database")
}

/// A fresh database name, so tests can run in parallel.
#[cfg(test)]
fn database() -> String {
    use rand::Rng;

    format!("test{}", rand::thread_rng().gen::<u32>())
}

/// Build a server for the given test database, with indexes and the default admin in place.
#[cfg(test)]
async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    // Tests enter the request handlers, so enable logging.
    log4rs_test_utils::test_logging::init_logging_once_for(["polls_backend"], None, None);

    let db = client.database(db_name);
    config::prepare_database(&db)
        .await
        .expect("Failed to prepare test database");

    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
        .mount(API_BASE, api::routes())
}
