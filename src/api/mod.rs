use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

mod admin;
pub mod auth;
mod public;
mod voter;

pub use admin::StatusChange;
pub use voter::Ballot;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes
}

/// JSON bodies for failures that happen before a route runs, e.g. a missing
/// auth cookie or an unparseable request body.
pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

#[catch(default)]
fn default_catcher(status: Status, req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    let kind = match status.code {
        400 | 422 => "malformed_request",
        401 => "unauthenticated",
        403 => "unauthorized",
        404 => "not_found",
        _ if status.code >= 500 => "internal_error",
        _ => "request_failed",
    };
    let message = format!("{} {}: {}", req.method(), req.uri(), status.reason_lossy());
    (status, Json(ErrorBody::new(kind, message)))
}
