use crate::error::{Conflict, Result, unique_violation};
use crate::model::{NewUser, ProfileUpdate, Role, User, UserId};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Sqlite};

const USER_COLUMNS: &str = "id, name, email, role, department, bio, skills, interests, gpa, \
                            year, avatar, created_at";

/// Create a user. The password is stored as `password_hash` only.
pub async fn register<'e>(
    db: impl SqliteExecutor<'e>,
    user: &NewUser,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (name, email, role, department, bio, skills, interests, gpa, year, \
         password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.name)
    .bind(&user.email)
    .bind(user.role)
    .bind(&user.department)
    .bind(&user.bio)
    .bind(Json(&user.skills))
    .bind(Json(&user.interests))
    .bind(user.gpa)
    .bind(user.year)
    .bind(password_hash)
    .bind(now)
    .fetch_one(db)
    .await
    .map_err(unique_violation(Conflict::EmailTaken))
}

pub async fn find<'e>(db: impl SqliteExecutor<'e>, id: UserId) -> Result<Option<User>> {
    Ok(
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

/// Identity and stored password hash of the user registered with `email`.
pub async fn credentials<'e>(
    db: impl SqliteExecutor<'e>,
    email: &str,
) -> Result<Option<(UserId, String)>> {
    Ok(sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(email)
        .map(|row: SqliteRow| {
            (
                row.get::<UserId, _>("id"),
                row.get::<String, _>("password_hash"),
            )
        })
        .fetch_optional(db)
        .await?)
}

/// Record a bearer token for `user`. A user may hold several tokens at once.
pub async fn open_session<'e>(
    db: impl SqliteExecutor<'e>,
    user: UserId,
    token: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind(token)
        .bind(user)
        .bind(now)
        .execute(db)
        .await?;
    Ok(())
}

/// Resolve a bearer token into the identity and role of its owner.
pub async fn find_by_token<'e>(
    db: impl SqliteExecutor<'e>,
    token: &str,
) -> Result<Option<(UserId, Role)>> {
    Ok(sqlx::query(
        "SELECT u.id, u.role FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?",
    )
        .bind(token)
        .map(|row: SqliteRow| (row.get::<UserId, _>("id"), row.get::<Role, _>("role")))
        .fetch_optional(db)
        .await?)
}

pub async fn update_profile<'e>(
    db: impl SqliteExecutor<'e>,
    id: UserId,
    update: &ProfileUpdate,
) -> Result<Option<User>> {
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE users SET id = id");
    if let Some(name) = &update.name {
        query.push(", name = ").push_bind(name.clone());
    }
    if let Some(bio) = &update.bio {
        query.push(", bio = ").push_bind(bio.clone());
    }
    if let Some(skills) = &update.skills {
        query.push(", skills = ").push_bind(Json(skills.clone()));
    }
    if let Some(interests) = &update.interests {
        query.push(", interests = ").push_bind(Json(interests.clone()));
    }
    if let Some(gpa) = update.gpa {
        query.push(", gpa = ").push_bind(gpa);
    }
    if let Some(year) = update.year {
        query.push(", year = ").push_bind(year);
    }
    if let Some(avatar) = &update.avatar {
        query.push(", avatar = ").push_bind(avatar.clone());
    }
    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {USER_COLUMNS}"));
    Ok(query.build_query_as::<User>().fetch_optional(db).await?)
}

pub async fn departments<'e>(db: impl SqliteExecutor<'e>) -> Result<Vec<String>> {
    Ok(
        sqlx::query_scalar("SELECT DISTINCT department FROM users ORDER BY department")
            .fetch_all(db)
            .await?,
    )
}

pub async fn skills<'e>(db: impl SqliteExecutor<'e>) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT DISTINCT skill.value FROM users, json_each(users.skills) AS skill \
         ORDER BY skill.value",
    )
    .fetch_all(db)
    .await?)
}
