use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Pool, Sqlite, SqlitePool};
use tracing::{info, instrument};

use crate::{
    auth::{DbUser, DbUserSession, Role, User, UserSession},
    error::AppError,
};

#[instrument]
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    info!("Connecting to SQLite database");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations completed successfully");
    Ok(())
}

#[derive(sqlx::FromRow)]
pub struct DbCredentials {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub password: String,
}

#[instrument(skip(executor))]
pub async fn get_user<'e, E>(executor: E, id: i64) -> Result<User, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, username, role FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(executor))]
pub async fn find_user_by_username<'e, E>(
    executor: E,
    username: &str,
) -> Result<Option<User>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting user by username");
    let row =
        sqlx::query_as::<_, DbUser>("SELECT id, username, role FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(executor)
            .await?;

    row.map(User::try_from).transpose()
}

/// Looks a user up together with their stored password hash. Only the
/// authentication service should need this.
#[instrument(skip(executor))]
pub async fn find_credentials<'e, E>(
    executor: E,
    username: &str,
) -> Result<Option<DbCredentials>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting credentials by username");
    let row = sqlx::query_as::<_, DbCredentials>(
        "SELECT id, username, role, password FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

#[instrument(skip(executor, password_hash))]
pub async fn insert_user<'e, E>(
    executor: E,
    username: &str,
    password_hash: &str,
    role: Role,
) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Creating new user");
    let res = sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Username '{}' already exists", username))
            }
            other => AppError::Database(other),
        })?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor))]
pub async fn update_user_role<'e, E>(executor: E, username: &str, role: Role) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Updating user role");
    let res = sqlx::query("UPDATE users SET role = ? WHERE username = ?")
        .bind(role.as_str())
        .bind(username)
        .execute(executor)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with username {} not found in database",
            username
        )));
    }

    Ok(())
}

#[instrument(skip(executor, token))]
pub async fn create_user_session<'e, E>(
    executor: E,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(executor)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(executor, token))]
pub async fn get_session_by_token<'e, E>(executor: E, token: &str) -> Result<UserSession, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(executor)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(executor, token))]
pub async fn invalidate_session<'e, E>(executor: E, token: &str) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(executor)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
