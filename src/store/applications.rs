use crate::error::{Conflict, Result, unique_violation};
use crate::model::{
    Application, ApplicationDetails, ApplicationId, ApplicationStatus, NewApplication, Project,
    ProjectSummary, UserId, UserSummary,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::{FromRow, Row};

const DETAILS: &str = "SELECT a.*, \
     p.title AS project_title, p.department AS project_department, p.status AS project_status, \
     s.name AS student_name, s.email AS student_email, s.department AS student_department, \
     s.bio AS student_bio, \
     f.name AS professor_name, f.email AS professor_email, \
     f.department AS professor_department, f.bio AS professor_bio \
     FROM applications a \
     JOIN projects p ON p.id = a.project_id \
     JOIN users s ON s.id = a.student_id \
     JOIN users f ON f.id = a.professor_id";

fn details(row: &SqliteRow) -> Result<ApplicationDetails, sqlx::Error> {
    let application = Application::from_row(row)?;
    Ok(ApplicationDetails {
        project: ProjectSummary {
            id: application.project,
            title: row.try_get("project_title")?,
            department: row.try_get("project_department")?,
            status: row.try_get("project_status")?,
        },
        student: UserSummary {
            id: application.student,
            name: row.try_get("student_name")?,
            email: row.try_get("student_email")?,
            department: row.try_get("student_department")?,
            bio: row.try_get("student_bio")?,
        },
        professor: UserSummary {
            id: application.professor,
            name: row.try_get("professor_name")?,
            email: row.try_get("professor_email")?,
            department: row.try_get("professor_department")?,
            bio: row.try_get("professor_bio")?,
        },
        application,
    })
}

/// Record a new pending application of `student` to `project`. A second
/// application for the same pair is refused by the unique constraint on
/// `(student_id, project_id)`, whatever the status of the first one.
pub async fn insert<'e>(
    db: impl SqliteExecutor<'e>,
    student: UserId,
    project: &Project,
    application: &NewApplication,
    now: DateTime<Utc>,
) -> Result<Application> {
    sqlx::query_as::<_, Application>(
        "INSERT INTO applications (student_id, project_id, professor_id, cover_letter, \
         relevant_experience, motivation, status, application_date) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(student)
    .bind(project.id)
    .bind(project.professor)
    .bind(&application.cover_letter)
    .bind(&application.relevant_experience)
    .bind(&application.motivation)
    .bind(ApplicationStatus::Pending)
    .bind(now)
    .fetch_one(db)
    .await
    .map_err(unique_violation(Conflict::AlreadyApplied))
}

pub async fn find<'e>(
    db: impl SqliteExecutor<'e>,
    id: ApplicationId,
) -> Result<Option<Application>> {
    Ok(
        sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn find_details<'e>(
    db: impl SqliteExecutor<'e>,
    id: ApplicationId,
) -> Result<Option<ApplicationDetails>> {
    Ok(sqlx::query(&format!("{DETAILS} WHERE a.id = ?"))
        .bind(id)
        .try_map(|row: SqliteRow| details(&row))
        .fetch_optional(db)
        .await?)
}

/// Move a pending application to `target`. Returns `None` if the
/// application does not exist or is not pending anymore, in which case
/// nothing has been written.
pub async fn leave_pending<'e>(
    db: impl SqliteExecutor<'e>,
    id: ApplicationId,
    target: ApplicationStatus,
    professor_notes: Option<&str>,
    response_date: Option<DateTime<Utc>>,
) -> Result<Option<Application>> {
    Ok(sqlx::query_as::<_, Application>(
        "UPDATE applications SET status = ?, \
         professor_notes = COALESCE(?, professor_notes), \
         response_date = COALESCE(?, response_date) \
         WHERE id = ? AND status = ? RETURNING *",
    )
    .bind(target)
    .bind(professor_notes)
    .bind(response_date)
    .bind(id)
    .bind(ApplicationStatus::Pending)
    .fetch_optional(db)
    .await?)
}

/// All applications submitted by `student`, most recent first.
pub async fn for_student<'e>(
    db: impl SqliteExecutor<'e>,
    student: UserId,
) -> Result<Vec<ApplicationDetails>> {
    Ok(sqlx::query(&format!(
        "{DETAILS} WHERE a.student_id = ? ORDER BY a.application_date DESC, a.id DESC"
    ))
    .bind(student)
    .try_map(|row: SqliteRow| details(&row))
    .fetch_all(db)
    .await?)
}

/// All applications made to projects of `professor`, most recent first.
pub async fn for_professor<'e>(
    db: impl SqliteExecutor<'e>,
    professor: UserId,
) -> Result<Vec<ApplicationDetails>> {
    Ok(sqlx::query(&format!(
        "{DETAILS} WHERE a.professor_id = ? ORDER BY a.application_date DESC, a.id DESC"
    ))
    .bind(professor)
    .try_map(|row: SqliteRow| details(&row))
    .fetch_all(db)
    .await?)
}

#[cfg(test)]
pub async fn count_with_status<'e>(
    db: impl SqliteExecutor<'e>,
    project: crate::model::ProjectId,
    status: ApplicationStatus,
) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE project_id = ? AND status = ?")
            .bind(project)
            .bind(status)
            .fetch_one(db)
            .await?,
    )
}
