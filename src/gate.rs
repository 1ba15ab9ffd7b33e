//! Access gate: who is calling, and may they?
//!
//! Callers authenticate with an opaque bearer token issued at registration or
//! login. Handlers then state which roles they accept through
//! [`Caller::require`].

use crate::error::{Error, Result};
use crate::model::{Role, UserId};
use crate::store::users;
use crate::web::AppState;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use rand::distr::{Alphanumeric, SampleString};
use tracing::trace;

const TOKEN_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            trace!(caller = %self.id, role = %self.role, ?roles, "role refused");
            Err(Error::Forbidden("access this resource"))
        }
    }
}

pub fn issue_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN)
}

/// PHC string of `password`, with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<()> {
    let hash = PasswordHash::new(hash)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .map_err(|_| Error::InvalidCredentials)
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer(parts).ok_or(Error::Unauthenticated)?;
        let (id, role) = users::find_by_token(state.store.pool(), token)
            .await?
            .ok_or(Error::Unauthenticated)?;
        Ok(Caller { id, role })
    }
}
