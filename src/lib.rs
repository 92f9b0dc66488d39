#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, EngineFairing};
use crate::engine::ElectionCloserFairing;
use crate::logging::LoggerFairing;

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod scheduled_task;
pub mod store;

pub use engine::Engine;

/// Build the server: config, then the engine on whichever store is
/// configured, then the closers for its active elections.
pub fn build() -> Rocket<Build> {
    mount(rocket::build())
        .attach(ConfigFairing)
        .attach(EngineFairing)
        .attach(ElectionCloserFairing)
}

/// Routes, catchers and request logging, common to every configuration.
fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
}

/// A server around an existing engine, for tests.
#[cfg(test)]
pub(crate) fn rocket_for_engine(engine: Engine) -> Rocket<Build> {
    use rocket::figment::Figment;

    let figment = Figment::from(rocket::Config::debug_default())
        .merge(("jwt_secret", "test secret"))
        .merge(("auth_ttl", 3600));
    mount(rocket::custom(figment))
        .manage(engine)
        .attach(ConfigFairing)
        .attach(ElectionCloserFairing)
}
