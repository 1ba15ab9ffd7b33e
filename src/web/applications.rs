use super::extract::{Json, Path};
use super::{Ack, AppState};
use crate::error::{Error, FieldError, Result};
use crate::gate::Caller;
use crate::lifecycle::Lifecycle;
use crate::model::{ApplicationDetails, ApplicationId, Decision, NewApplication, Role};
use crate::store::applications;
use crate::validation;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

/// Reload an application with its project and participants.
async fn details(state: &AppState, id: ApplicationId) -> Result<ApplicationDetails> {
    applications::find_details(state.store.pool(), id)
        .await?
        .ok_or(Error::NotFound("application"))
}

pub async fn submit(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut application): Json<NewApplication>,
) -> Result<(StatusCode, Json<ApplicationDetails>)> {
    caller.require(&[Role::Student])?;
    validation::application(&mut application)?;
    let application = Lifecycle::new(&state.store)
        .submit(caller.id, &application)
        .await?;
    Ok((StatusCode::CREATED, Json(details(&state, application.id).await?)))
}

pub async fn for_student(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ApplicationDetails>>> {
    caller.require(&[Role::Student])?;
    Ok(Json(
        Lifecycle::new(&state.store)
            .applications_for_student(caller.id)
            .await?,
    ))
}

pub async fn for_professor(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ApplicationDetails>>> {
    caller.require(&[Role::Professor])?;
    Ok(Json(
        Lifecycle::new(&state.store)
            .applications_for_professor(caller.id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    status: String,
    #[serde(default)]
    professor_notes: Option<String>,
}

impl StatusChange {
    fn decision(&self) -> Result<Decision> {
        match self.status.as_str() {
            "accepted" => Ok(Decision::Accept),
            "rejected" => Ok(Decision::Reject),
            _ => Err(Error::Validation(vec![FieldError::new(
                "status",
                "Status must be accepted or rejected",
            )])),
        }
    }
}

pub async fn decide(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ApplicationId>,
    Json(mut change): Json<StatusChange>,
) -> Result<Json<ApplicationDetails>> {
    caller.require(&[Role::Professor])?;
    let decision = change.decision()?;
    validation::professor_notes(&mut change.professor_notes)?;
    Lifecycle::new(&state.store)
        .decide(caller.id, id, decision, change.professor_notes.as_deref())
        .await?;
    Ok(Json(details(&state, id).await?))
}

pub async fn withdraw(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ApplicationId>,
) -> Result<Json<Ack>> {
    caller.require(&[Role::Student])?;
    Lifecycle::new(&state.store).withdraw(caller.id, id).await?;
    Ok(Json(Ack {
        message: "Application withdrawn successfully",
    }))
}
