use super::{ProjectId, ProjectSummary, UserId, UserSummary};
use crate::error::Conflict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an application. `Pending` is the only state an
/// application can leave.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    /// Target state of `transition` from `self`. This is the whole
    /// transition table: any pair not listed here is refused.
    pub fn apply(self, transition: Transition) -> Result<ApplicationStatus, Conflict> {
        use ApplicationStatus::*;
        match (self, transition) {
            (Pending, Transition::Accept) => Ok(Accepted),
            (Pending, Transition::Reject) => Ok(Rejected),
            (Pending, Transition::Withdraw) => Ok(Withdrawn),
            (from @ (Accepted | Rejected | Withdrawn), transition) => {
                Err(Conflict::InvalidTransition { from, transition })
            }
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A move out of `Pending`. Submission is not a transition since it creates
/// the application.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Transition {
    Accept,
    Reject,
    Withdraw,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::Withdraw => "withdraw",
        })
    }
}

/// What a professor decides about a pending application. On the wire, this
/// is the requested target status.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum Decision {
    #[serde(rename = "accepted")]
    Accept,
    #[serde(rename = "rejected")]
    Reject,
}

impl From<Decision> for Transition {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accept => Transition::Accept,
            Decision::Reject => Transition::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    #[sqlx(rename = "student_id")]
    pub student: UserId,
    #[sqlx(rename = "project_id")]
    pub project: ProjectId,
    #[sqlx(rename = "professor_id")]
    pub professor: UserId,
    pub cover_letter: String,
    pub relevant_experience: Option<String>,
    pub motivation: String,
    pub status: ApplicationStatus,
    pub professor_notes: Option<String>,
    pub application_date: DateTime<Utc>,
    pub response_date: Option<DateTime<Utc>>,
}

/// An application together with the project and people it references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetails {
    #[serde(flatten)]
    pub application: Application,
    #[serde(rename = "projectInfo")]
    pub project: ProjectSummary,
    #[serde(rename = "studentInfo")]
    pub student: UserSummary,
    #[serde(rename = "professorInfo")]
    pub professor: UserSummary,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub project_id: ProjectId,
    pub cover_letter: String,
    pub relevant_experience: Option<String>,
    pub motivation: String,
}
