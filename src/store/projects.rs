use crate::error::{Conflict, Error, Result};
use crate::model::{
    Capacity, NewProject, Project, ProjectDetails, ProjectId, ProjectPage, ProjectQuery,
    ProjectUpdate, UserId, UserSummary,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, trace};

const DETAILS: &str = "SELECT p.*, \
     u.name AS professor_name, u.email AS professor_email, \
     u.department AS professor_department, u.bio AS professor_bio \
     FROM projects p \
     JOIN users u ON u.id = p.professor_id";

fn details(row: &SqliteRow) -> Result<ProjectDetails, sqlx::Error> {
    let project = Project::from_row(row)?;
    Ok(ProjectDetails {
        professor: UserSummary {
            id: project.professor,
            name: row.try_get("professor_name")?,
            email: row.try_get("professor_email")?,
            department: row.try_get("professor_department")?,
            bio: row.try_get("professor_bio")?,
        },
        project,
    })
}

pub async fn create<'e>(
    db: impl SqliteExecutor<'e>,
    professor: UserId,
    project: &NewProject,
    now: DateTime<Utc>,
) -> Result<Project> {
    Ok(sqlx::query_as::<_, Project>(
        "INSERT INTO projects (title, description, professor_id, department, skills, \
         requirements, duration, time_commitment, compensation, compensation_amount, status, \
         max_students, current_students, materials, tags, application_deadline, start_date, \
         end_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(&project.title)
    .bind(&project.description)
    .bind(professor)
    .bind(&project.department)
    .bind(Json(&project.skills))
    .bind(Json(&project.requirements))
    .bind(&project.duration)
    .bind(&project.time_commitment)
    .bind(project.compensation)
    .bind(&project.compensation_amount)
    .bind(project.status)
    .bind(project.max_students)
    .bind(Json(&project.materials))
    .bind(Json(&project.tags))
    .bind(project.application_deadline)
    .bind(project.start_date)
    .bind(project.end_date)
    .bind(now)
    .bind(now)
    .fetch_one(db)
    .await?)
}

pub async fn find<'e>(db: impl SqliteExecutor<'e>, id: ProjectId) -> Result<Option<Project>> {
    Ok(
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn find_details<'e>(
    db: impl SqliteExecutor<'e>,
    id: ProjectId,
) -> Result<Option<ProjectDetails>> {
    Ok(sqlx::query(&format!("{DETAILS} WHERE p.id = ?"))
        .bind(id)
        .try_map(|row: SqliteRow| details(&row))
        .fetch_optional(db)
        .await?)
}

/// Update the metadata of a project. Lowering `max_students` below the
/// number of accepted students is refused, in the same statement as the
/// update itself.
pub async fn update(
    conn: &mut SqliteConnection,
    id: ProjectId,
    update: &ProjectUpdate,
    now: DateTime<Utc>,
) -> Result<Project> {
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE projects SET updated_at = ");
    query.push_bind(now);
    if let Some(title) = &update.title {
        query.push(", title = ").push_bind(title.clone());
    }
    if let Some(description) = &update.description {
        query.push(", description = ").push_bind(description.clone());
    }
    if let Some(department) = &update.department {
        query.push(", department = ").push_bind(department.clone());
    }
    if let Some(skills) = &update.skills {
        query.push(", skills = ").push_bind(Json(skills.clone()));
    }
    if let Some(requirements) = &update.requirements {
        query
            .push(", requirements = ")
            .push_bind(Json(requirements.clone()));
    }
    if let Some(duration) = &update.duration {
        query.push(", duration = ").push_bind(duration.clone());
    }
    if let Some(time_commitment) = &update.time_commitment {
        query
            .push(", time_commitment = ")
            .push_bind(time_commitment.clone());
    }
    if let Some(compensation) = update.compensation {
        query.push(", compensation = ").push_bind(compensation);
    }
    if let Some(amount) = &update.compensation_amount {
        query.push(", compensation_amount = ").push_bind(amount.clone());
    }
    if let Some(status) = update.status {
        query.push(", status = ").push_bind(status);
    }
    if let Some(max_students) = update.max_students {
        query.push(", max_students = ").push_bind(max_students);
    }
    if let Some(materials) = &update.materials {
        query.push(", materials = ").push_bind(Json(materials.clone()));
    }
    if let Some(tags) = &update.tags {
        query.push(", tags = ").push_bind(Json(tags.clone()));
    }
    if let Some(deadline) = update.application_deadline {
        query.push(", application_deadline = ").push_bind(deadline);
    }
    if let Some(start) = update.start_date {
        query.push(", start_date = ").push_bind(start);
    }
    if let Some(end) = update.end_date {
        query.push(", end_date = ").push_bind(end);
    }
    query.push(" WHERE id = ").push_bind(id);
    if let Some(max_students) = update.max_students {
        query
            .push(" AND current_students <= ")
            .push_bind(max_students);
    }
    query.push(" RETURNING *");
    if let Some(project) = query
        .build_query_as::<Project>()
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok(project);
    }
    match capacity(&mut *conn, id).await? {
        Some(capacity) => Err(Conflict::CapacityBelowEnrolled {
            current: capacity.current_students,
        }
        .into()),
        None => Err(Error::NotFound("project")),
    }
}

/// Delete a project and every application made to it.
pub async fn delete(conn: &mut SqliteConnection, id: ProjectId) -> Result<bool> {
    let applications = sqlx::query("DELETE FROM applications WHERE project_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let deleted = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    debug!(project = %id, applications, "deleted project");
    Ok(deleted == 1)
}

pub async fn for_professor<'e>(
    db: impl SqliteExecutor<'e>,
    professor: UserId,
) -> Result<Vec<ProjectDetails>> {
    Ok(sqlx::query(&format!(
        "{DETAILS} WHERE p.professor_id = ? ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(professor)
    .try_map(|row: SqliteRow| details(&row))
    .fetch_all(db)
    .await?)
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filters: &ProjectQuery) {
    query
        .push(" WHERE p.status = ")
        .push_bind(filters.status.unwrap_or_default());
    if let Some(search) = filters.search.as_deref().map(str::trim) {
        if !search.is_empty() {
            let pattern = like_pattern(search);
            query.push(" AND (");
            for (i, column) in ["p.title", "p.description", "p.department", "p.skills", "p.tags"]
                .into_iter()
                .enumerate()
            {
                if i > 0 {
                    query.push(" OR ");
                }
                query
                    .push(column)
                    .push(" LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            query.push(")");
        }
    }
    if let Some(department) = filters.department.as_deref().map(str::trim) {
        if !department.is_empty() {
            query
                .push(" AND p.department LIKE ")
                .push_bind(like_pattern(department))
                .push(" ESCAPE '\\'");
        }
    }
    let skills = filters.skills();
    if !skills.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM json_each(p.skills) AS skill WHERE skill.value IN (",
        );
        let mut separated = query.separated(", ");
        for skill in skills {
            separated.push_bind(skill);
        }
        query.push("))");
    }
}

/// Case-insensitive substring pattern for `LIKE … ESCAPE '\'`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// One page of projects matching `filters`, newest first.
pub async fn list(
    conn: &mut SqliteConnection,
    filters: &ProjectQuery,
    default_limit: u32,
    max_limit: u32,
) -> Result<ProjectPage> {
    let page = filters.page.unwrap_or(1).max(1);
    let limit = filters.limit.unwrap_or(default_limit).clamp(1, max_limit);
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p");
    push_filters(&mut count, filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;
    let mut select = QueryBuilder::<Sqlite>::new(DETAILS);
    push_filters(&mut select, filters);
    select
        .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(i64::from(page - 1) * i64::from(limit));
    trace!(sql = select.sql(), "listing projects");
    let projects = select
        .build()
        .try_map(|row: SqliteRow| details(&row))
        .fetch_all(&mut *conn)
        .await?;
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    Ok(ProjectPage {
        projects,
        total_pages: total.div_ceil(limit),
        current_page: page,
        total,
    })
}

pub async fn capacity<'e>(db: impl SqliteExecutor<'e>, id: ProjectId) -> Result<Option<Capacity>> {
    Ok(sqlx::query_as::<_, Capacity>(
        "SELECT current_students, max_students, status FROM projects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?)
}

/// Take one seat of the project if one is still open. The check and the
/// increment are a single conditional statement, so that two callers can
/// never both take the last seat.
pub async fn try_increment<'e>(db: impl SqliteExecutor<'e>, id: ProjectId) -> Result<bool> {
    let taken = sqlx::query(
        "UPDATE projects SET current_students = current_students + 1 \
         WHERE id = ? AND current_students < max_students",
    )
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(taken == 1)
}
