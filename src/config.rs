use std::sync::Arc;

use chrono::Duration;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    clock::SystemClock,
    engine::Engine,
    notify::{LogDispatcher, MongoDispatcher, NotificationDispatcher},
    store::{MemoryStore, MongoStore, SharedStore},
};

const DEFAULT_CLOSE_RETRY_SECS: u32 = 300;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_close_retry_secs")]
    close_retry_secs: u32,
    // secrets
    jwt_secret: String,
}

fn default_close_retry_secs() -> u32 {
    DEFAULT_CLOSE_RETRY_SECS
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// How long to wait before retrying a failed automatic close.
    pub fn close_retry(&self) -> Duration {
        Duration::seconds(self.close_retry_secs.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: Option<String>,
}

/// A fairing that picks a store, connects to it if needed, and places the
/// resulting `Engine` into managed state.
///
/// With a `db_uri` configured the engine runs on MongoDB and lifecycle events
/// are written to its `notifications` collection. Without one it runs in
/// memory, which is only suitable for a single development process.
pub struct EngineFairing;

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Engine",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let (store, dispatcher): (SharedStore, Arc<dyn NotificationDispatcher>) =
            match config.db_uri {
                Some(uri) => {
                    info!("Loaded database config, connecting...");
                    let store = match MongoStore::connect(&uri, &get_database_name()).await {
                        Ok(store) => store,
                        Err(e) => {
                            error!("Failed to connect to database: {e}");
                            return Err(rocket);
                        }
                    };
                    info!("...database connection online!");
                    let dispatcher = MongoDispatcher::new(store.database());
                    (Arc::new(store), Arc::new(dispatcher))
                }
                None => {
                    warn!("No `db_uri` configured, keeping all elections in memory");
                    (Arc::new(MemoryStore::new()), Arc::new(LogDispatcher))
                }
            };

        // Manage the state.
        rocket = rocket.manage(Engine::new(store, dispatcher, Arc::new(SystemClock)));
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "elections".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    use rocket::figment::Figment;

    #[test]
    fn retry_interval_defaults_to_five_minutes() {
        let figment = Figment::new()
            .merge(("jwt_secret", "secret"))
            .merge(("auth_ttl", 3600));
        let config: Config = figment.extract().unwrap();
        assert_eq!(config.close_retry(), Duration::minutes(5));
        assert_eq!(config.auth_ttl(), Duration::hours(1));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let figment = Figment::new().merge(("auth_ttl", 3600));
        assert!(figment.extract::<Config>().is_err());
    }
}
