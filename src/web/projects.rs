use super::extract::{Json, Path, Query};
use super::{Ack, AppState};
use crate::error::{Error, Result};
use crate::gate::Caller;
use crate::model::{
    Capacity, NewProject, Project, ProjectDetails, ProjectId, ProjectPage, ProjectQuery,
    ProjectStatus, ProjectUpdate, Role,
};
use crate::store::projects;
use crate::validation;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<ProjectPage>> {
    let mut conn = state.store.pool().acquire().await?;
    let page = projects::list(&mut conn, &query, state.default_limit, state.max_limit).await?;
    Ok(Json(page))
}

async fn details(conn: &mut SqliteConnection, id: ProjectId) -> Result<ProjectDetails> {
    projects::find_details(conn, id)
        .await?
        .ok_or(Error::NotFound("project"))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<Json<ProjectDetails>> {
    let mut conn = state.store.pool().acquire().await?;
    Ok(Json(details(&mut conn, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut project): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectDetails>)> {
    caller.require(&[Role::Professor])?;
    validation::new_project(&mut project)?;
    let mut conn = state.store.pool().acquire().await?;
    let project = projects::create(&mut *conn, caller.id, &project, Utc::now()).await?;
    info!(project = %project.id, professor = %caller.id, "project created");
    Ok((StatusCode::CREATED, Json(details(&mut conn, project.id).await?)))
}

/// Load a project and check that the caller owns it.
async fn owned(
    state: &AppState,
    caller: &Caller,
    id: ProjectId,
    action: &'static str,
) -> Result<Project> {
    caller.require(&[Role::Professor])?;
    let project = projects::find(state.store.pool(), id)
        .await?
        .ok_or(Error::NotFound("project"))?;
    if project.is_owned_by(caller.id) {
        Ok(project)
    } else {
        Err(Error::Forbidden(action))
    }
}

pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
    Json(mut update): Json<ProjectUpdate>,
) -> Result<Json<ProjectDetails>> {
    owned(&state, &caller, id, "update this project").await?;
    validation::project_update(&mut update)?;
    let mut conn = state.store.pool().acquire().await?;
    projects::update(&mut conn, id, &update, Utc::now()).await?;
    info!(project = %id, "project updated");
    Ok(Json(details(&mut conn, id).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> Result<Json<Ack>> {
    owned(&state, &caller, id, "delete this project").await?;
    let mut tx = state.store.begin().await?;
    if !projects::delete(&mut tx, id).await? {
        return Err(Error::NotFound("project"));
    }
    tx.commit().await?;
    info!(project = %id, "project deleted");
    Ok(Json(Ack {
        message: "Project deleted successfully",
    }))
}

pub async fn mine(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ProjectDetails>>> {
    caller.require(&[Role::Professor])?;
    Ok(Json(projects::for_professor(state.store.pool(), caller.id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seats {
    current_students: i64,
    max_students: i64,
    open_seats: i64,
    full: bool,
    status: ProjectStatus,
}

impl From<Capacity> for Seats {
    fn from(capacity: Capacity) -> Self {
        Seats {
            current_students: capacity.current_students,
            max_students: capacity.max_students,
            open_seats: capacity.open_seats(),
            full: capacity.is_full(),
            status: capacity.status,
        }
    }
}

pub async fn capacity(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Seats>> {
    projects::capacity(state.store.pool(), id)
        .await?
        .map(|c| Json(c.into()))
        .ok_or(Error::NotFound("project"))
}
