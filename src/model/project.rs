use super::{UserId, UserSummary, Year};
use crate::error::Conflict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Compensation {
    #[default]
    Unpaid,
    Stipend,
    CourseCredit,
    Hourly,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Document,
    Image,
    Video,
    Link,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub gpa: Option<f64>,
    #[serde(default)]
    pub year: Vec<Year>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "professor_id")]
    #[serde(skip)]
    pub professor: UserId,
    pub department: String,
    #[sqlx(json)]
    pub skills: Vec<String>,
    #[sqlx(json)]
    pub requirements: Requirements,
    pub duration: String,
    pub time_commitment: String,
    pub compensation: Compensation,
    pub compensation_amount: Option<String>,
    pub status: ProjectStatus,
    pub max_students: i64,
    pub current_students: i64,
    #[sqlx(json)]
    pub materials: Vec<Material>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Check that a new application may be submitted at `now`.
    pub fn accepts_applications_at(&self, now: DateTime<Utc>) -> Result<(), Conflict> {
        if self.status != ProjectStatus::Active {
            return Err(Conflict::NotAcceptingApplications);
        }
        match self.application_deadline {
            Some(deadline) if now > deadline => Err(Conflict::DeadlinePassed),
            _ => Ok(()),
        }
    }

    pub fn is_owned_by(&self, professor: UserId) -> bool {
        self.professor == professor
    }
}

/// A project together with the professor offering it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetails {
    #[serde(flatten)]
    pub project: Project,
    pub professor: UserSummary,
}

/// Capacity fields of a project, read in a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Capacity {
    pub current_students: i64,
    pub max_students: i64,
    pub status: ProjectStatus,
}

impl Capacity {
    pub fn open_seats(&self) -> i64 {
        self.max_students - self.current_students
    }

    pub fn is_full(&self) -> bool {
        self.open_seats() <= 0
    }
}

/// The public part of a project, embedded in application listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
    pub department: String,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub department: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
    pub duration: String,
    pub time_commitment: String,
    #[serde(default)]
    pub compensation: Compensation,
    pub compensation_amount: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default = "default_max_students")]
    pub max_students: i64,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub application_deadline: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn default_max_students() -> i64 {
    1
}

/// Partial update of a project. The owner and the number of enrolled
/// students cannot be changed this way.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub skills: Option<Vec<String>>,
    pub requirements: Option<Requirements>,
    pub duration: Option<String>,
    pub time_commitment: Option<String>,
    pub compensation: Option<Compensation>,
    #[serde(default, deserialize_with = "nullable")]
    pub compensation_amount: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub max_students: Option<i64>,
    pub materials: Option<Vec<Material>>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub application_deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

/// Tell an explicit `null`, which clears a field, from a missing field,
/// which leaves it alone.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectQuery {
    pub search: Option<String>,
    pub department: Option<String>,
    /// Comma separated list, a project matches if it requires any of them.
    pub skills: Option<String>,
    pub status: Option<ProjectStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProjectQuery {
    pub fn skills(&self) -> Vec<String> {
        self.skills
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPage {
    pub projects: Vec<ProjectDetails>,
    pub total_pages: u32,
    pub current_page: u32,
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn project(status: ProjectStatus, deadline: Option<DateTime<Utc>>) -> Project {
        let now = Utc::now();
        Project {
            id: ProjectId(1),
            title: "Protein folding".into(),
            description: "dummy".into(),
            professor: UserId(7),
            department: "Biology".into(),
            skills: vec![],
            requirements: Requirements::default(),
            duration: "6 months".into(),
            time_commitment: "10h/week".into(),
            compensation: Compensation::Unpaid,
            compensation_amount: None,
            status,
            max_students: 2,
            current_students: 0,
            materials: vec![],
            tags: vec![],
            application_deadline: deadline,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_accepts_applications() {
        let now = Utc::now();
        assert_eq!(
            project(ProjectStatus::Active, None).accepts_applications_at(now),
            Ok(())
        );
        assert_eq!(
            project(ProjectStatus::Active, Some(now + Duration::days(1)))
                .accepts_applications_at(now),
            Ok(())
        );
        assert_eq!(
            project(ProjectStatus::Active, Some(now - Duration::seconds(1)))
                .accepts_applications_at(now),
            Err(Conflict::DeadlinePassed)
        );
        for status in [
            ProjectStatus::Paused,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ] {
            assert_eq!(
                project(status, None).accepts_applications_at(now),
                Err(Conflict::NotAcceptingApplications)
            );
        }
    }

    #[test]
    fn test_query_skills() {
        let q = ProjectQuery {
            skills: Some(" rust, python ,,ml".into()),
            ..ProjectQuery::default()
        };
        assert_eq!(q.skills(), vec!["rust", "python", "ml"]);
        assert!(ProjectQuery::default().skills().is_empty());
    }

    #[test]
    fn test_update_tells_null_from_missing() {
        let update: ProjectUpdate = serde_json::from_str(
            r#"{"applicationDeadline": null, "startDate": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(update.application_deadline, Some(None));
        assert_eq!(
            update.start_date,
            Some(Some("2030-01-01T00:00:00Z".parse().unwrap()))
        );
        assert_eq!(update.end_date, None);
        assert_eq!(update.compensation_amount, None);
    }

    #[test]
    fn test_capacity() {
        let c = Capacity {
            current_students: 2,
            max_students: 2,
            status: ProjectStatus::Active,
        };
        assert!(c.is_full());
        assert!(!Capacity { current_students: 1, ..c }.is_full());
    }
}
