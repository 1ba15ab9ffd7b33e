//! Persistent storage for users, projects and applications.
//!
//! A [`Store`] owns the connection pool and is handed explicitly to whoever
//! needs the database. Query functions in the submodules take any SQLite
//! executor so that they can run either directly on the pool or inside a
//! transaction opened with [`Store::begin`].

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod applications;
pub mod projects;
pub mod users;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL CHECK (role IN ('student', 'professor')),
        department TEXT NOT NULL,
        bio TEXT,
        skills TEXT NOT NULL DEFAULT '[]',
        interests TEXT NOT NULL DEFAULT '[]',
        gpa REAL,
        year TEXT,
        avatar TEXT,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        professor_id INTEGER NOT NULL REFERENCES users (id),
        department TEXT NOT NULL,
        skills TEXT NOT NULL DEFAULT '[]',
        requirements TEXT NOT NULL DEFAULT '{}',
        duration TEXT NOT NULL,
        time_commitment TEXT NOT NULL,
        compensation TEXT NOT NULL DEFAULT 'unpaid',
        compensation_amount TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        max_students INTEGER NOT NULL DEFAULT 1 CHECK (max_students >= 1),
        current_students INTEGER NOT NULL DEFAULT 0,
        materials TEXT NOT NULL DEFAULT '[]',
        tags TEXT NOT NULL DEFAULT '[]',
        application_deadline TEXT,
        start_date TEXT,
        end_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (current_students BETWEEN 0 AND max_students)
    )",
    "CREATE TABLE IF NOT EXISTS applications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES users (id),
        project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
        professor_id INTEGER NOT NULL REFERENCES users (id),
        cover_letter TEXT NOT NULL,
        relevant_experience TEXT,
        motivation TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        professor_notes TEXT,
        application_date TEXT NOT NULL,
        response_date TEXT,
        UNIQUE (student_id, project_id)
    )",
    "CREATE INDEX IF NOT EXISTS applications_by_student
        ON applications (student_id, application_date)",
    "CREATE INDEX IF NOT EXISTS applications_by_professor
        ON applications (professor_id, application_date)",
    "CREATE INDEX IF NOT EXISTS projects_by_professor ON projects (professor_id, created_at)",
];

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(url, max_connections, "connected to database");
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// A private database living as long as the store. A single connection
    /// is used, since every SQLite connection to `:memory:` sees its own
    /// database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}
