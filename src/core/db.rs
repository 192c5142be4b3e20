// user, session, and progress storage on sqlite
// sqlite serializes writers, which covers the per-user ordering the
// streak update needs

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::Error;
use crate::core::progress::Progress;

pub struct Db {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub is_premium: bool,
    pub billing_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: String,
    pub meditation_id: String,
    pub duration_seconds: i64,
    pub completed_at: DateTime<Utc>,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let applied: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = 1")
                .fetch_optional(&self.pool)
                .await?;
        if applied.is_some() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                email       TEXT,
                is_premium  INTEGER NOT NULL DEFAULT 0,
                billing_ref TEXT,
                created_at  TEXT NOT NULL
            )",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id          TEXT NOT NULL REFERENCES users(id),
                meditation_id    TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                completed_at     TEXT NOT NULL
            )",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS progress (
                user_id            TEXT PRIMARY KEY REFERENCES users(id),
                total_minutes      INTEGER NOT NULL DEFAULT 0,
                current_streak     INTEGER NOT NULL DEFAULT 0,
                longest_streak     INTEGER NOT NULL DEFAULT 0,
                sessions_completed INTEGER NOT NULL DEFAULT 0,
                last_session_date  TEXT
            )",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user_completed
                ON sessions(user_id, completed_at)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?1)
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // idempotent: an existing id comes back untouched, created = false
    pub async fn register_user(
        &self,
        id: Option<String>,
        email: Option<String>,
    ) -> Result<(UserRecord, bool), Error> {
        let id = id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(existing) = self.get_user(&id).await? {
            return Ok((existing, false));
        }

        let created_at = Utc::now();
        match self.insert_user(&id, email.as_deref(), created_at).await {
            Ok(()) => Ok((
                UserRecord {
                    id,
                    email,
                    is_premium: false,
                    billing_ref: None,
                    created_at,
                },
                true,
            )),
            // lost a race with a concurrent registration for the same id
            Err(Error::Storage(e)) if is_unique_violation(&e) => {
                let existing = self
                    .get_user(&id)
                    .await?
                    .ok_or_else(|| Error::Server("user missing after insert conflict".into()))?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    // user row and its zero progress row land together or not at all
    async fn insert_user(
        &self,
        id: &str,
        email: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(email)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO progress (user_id) VALUES (?1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, Error> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, is_premium, billing_ref, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // insert the session and fold it into the aggregate in one transaction;
    // neither half can land without the other
    pub async fn record_session(
        &self,
        user_id: &str,
        meditation_id: &str,
        duration_seconds: i64,
        today: NaiveDate,
    ) -> Result<i64, Error> {
        if user_id.trim().is_empty() || meditation_id.trim().is_empty() {
            return Err(Error::validation("userId and meditationId are required"));
        }
        if duration_seconds < 0 {
            return Err(Error::validation("durationSeconds must be non-negative"));
        }

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO sessions (user_id, meditation_id, duration_seconds, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(meditation_id)
        .bind(duration_seconds)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        let session_id = inserted.last_insert_rowid();

        let prev: Option<(i64, i64, i64, i64, Option<NaiveDate>)> = sqlx::query_as(
            "SELECT total_minutes, current_streak, longest_streak, sessions_completed,
                    last_session_date
             FROM progress WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let prev = prev
            .map(|(tm, cs, ls, sc, last)| Progress {
                total_minutes: tm,
                current_streak: cs,
                longest_streak: ls,
                sessions_completed: sc,
                last_session_date: last,
            })
            .unwrap_or_else(Progress::zero);
        let next = prev.after_session(duration_seconds, today);

        sqlx::query(
            "INSERT INTO progress
                (user_id, total_minutes, current_streak, longest_streak,
                 sessions_completed, last_session_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                total_minutes = excluded.total_minutes,
                current_streak = excluded.current_streak,
                longest_streak = excluded.longest_streak,
                sessions_completed = excluded.sessions_completed,
                last_session_date = excluded.last_session_date",
        )
        .bind(user_id)
        .bind(next.total_minutes)
        .bind(next.current_streak)
        .bind(next.longest_streak)
        .bind(next.sessions_completed)
        .bind(next.last_session_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session_id)
    }

    // a user we have never seen reads as all zeros, not an error
    pub async fn get_progress(&self, user_id: &str) -> Result<Progress, Error> {
        let row: Option<(i64, i64, i64, i64, Option<NaiveDate>)> = sqlx::query_as(
            "SELECT total_minutes, current_streak, longest_streak, sessions_completed,
                    last_session_date
             FROM progress WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|(tm, cs, ls, sc, last)| Progress {
                total_minutes: tm,
                current_streak: cs,
                longest_streak: ls,
                sessions_completed: sc,
                last_session_date: last,
            })
            .unwrap_or_else(Progress::zero))
    }

    pub async fn recent_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<SessionRecord>, Error> {
        let sessions = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, meditation_id, duration_seconds, completed_at
             FROM sessions WHERE user_id = ?1
             ORDER BY completed_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
