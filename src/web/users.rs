use super::AppState;
use super::extract::Json;
use crate::error::{Error, Result};
use crate::gate::{self, Caller};
use crate::model::{Credentials, NewUser, ProfileUpdate, User};
use crate::store::users;
use crate::validation;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct Session {
    token: String,
    user: User,
}

pub async fn register(
    State(state): State<AppState>,
    Json(mut user): Json<NewUser>,
) -> Result<(StatusCode, Json<Session>)> {
    validation::registration(&mut user)?;
    let password_hash = gate::hash_password(&user.password)?;
    let token = gate::issue_token();
    let now = Utc::now();
    let mut tx = state.store.begin().await?;
    let user = users::register(&mut *tx, &user, &password_hash, now).await?;
    users::open_session(&mut *tx, user.id, &token, now).await?;
    tx.commit().await?;
    info!(user = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(Session { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(mut credentials): Json<Credentials>,
) -> Result<Json<Session>> {
    validation::login(&mut credentials)?;
    let Some((id, password_hash)) =
        users::credentials(state.store.pool(), &credentials.email).await?
    else {
        debug!("login with unknown email");
        return Err(Error::InvalidCredentials);
    };
    gate::verify_password(&credentials.password, &password_hash)?;
    let token = gate::issue_token();
    users::open_session(state.store.pool(), id, &token, Utc::now()).await?;
    let user = users::find(state.store.pool(), id)
        .await?
        .ok_or(Error::NotFound("user"))?;
    info!(user = %id, "user logged in");
    Ok(Json(Session { token, user }))
}

pub async fn profile(State(state): State<AppState>, caller: Caller) -> Result<Json<User>> {
    users::find(state.store.pool(), caller.id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("user"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    validation::profile(&mut update)?;
    users::update_profile(state.store.pool(), caller.id, &update)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("user"))
}

pub async fn departments(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(users::departments(state.store.pool()).await?))
}

pub async fn skills(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(users::skills(state.store.pool()).await?))
}
