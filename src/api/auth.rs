use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{errors::Error as JwtError, DecodingKey, EncodingKey, Header, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{Identity, Role, VoterId};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A cookie carrying an [`AuthToken`], ready to attach to a request.
pub type AuthCookie = Cookie<'static>;

/// An authentication token naming a subject and the role they act in.
///
/// Tokens are issued by the identity provider, which shares our JWT secret;
/// this server only ever verifies them, except in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub voter_id: VoterId,
    #[serde(rename = "rgt")]
    pub role: Role,
}

impl AuthToken {
    pub fn new(identity: &Identity) -> Self {
        Self {
            voter_id: identity.voter_id.clone(),
            role: identity.role,
        }
    }

    /// Serialize this token into a signed cookie.
    pub fn into_cookie(self, config: &Config) -> Result<AuthCookie, JwtError> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build((AUTH_TOKEN_COOKIE, token))
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .build())
    }

    /// Deserialize and verify a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, JwtError> {
        let claims = jsonwebtoken::decode::<Claims>(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        Ok(claims.claims.token)
    }
}

impl From<AuthToken> for Identity {
    fn from(token: AuthToken) -> Self {
        Identity::new(token.voter_id, token.role)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Every route takes the caller's [`Identity`] from a valid auth cookie.
/// Without one the request fails with `401 Unauthorized`.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Config>>().await {
            Outcome::Success(config) => config,
            _ => {
                error!("Config is not managed, cannot authenticate");
                return Outcome::Error((
                    Status::InternalServerError,
                    Error::Unauthorized("authentication is unavailable".to_string()),
                ));
            }
        };

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthorized("no auth token".to_string()),
                ))
            }
        };

        match AuthToken::from_cookie(cookie, config) {
            Ok(token) => Outcome::Success(token.into()),
            Err(e) => {
                debug!("Rejected auth token: {e}");
                Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthorized(format!("invalid auth token: {e}")),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::Figment;

    use super::*;

    fn config(secret: &str) -> Config {
        Figment::new()
            .merge(("jwt_secret", secret))
            .merge(("auth_ttl", 600))
            .extract()
            .unwrap()
    }

    #[test]
    fn token_round_trips_through_cookie() {
        let config = config("shh");
        let identity = Identity::student_example();
        let cookie = AuthToken::new(&identity).into_cookie(&config).unwrap();
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        let token = AuthToken::from_cookie(&cookie, &config).unwrap();
        assert_eq!(Identity::from(token), identity);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let cookie = AuthToken::new(&Identity::admin_example())
            .into_cookie(&config("one"))
            .unwrap();
        assert!(AuthToken::from_cookie(&cookie, &config("two")).is_err());
    }
}
