//! Account registration, login sessions and principal lookup.

use chrono::{Duration, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::db;
use crate::error::AppError;

use super::{DbUser, Principal, Role, User, UserSession};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = bcrypt::MIN_COST;

/// A freshly established login session.
#[derive(Debug)]
pub struct LoginSession {
    pub user: User,
    pub token: String,
}

pub struct Accounts {
    pool: Pool<Sqlite>,
    session_ttl: Duration,
}

impl Accounts {
    pub fn new(pool: Pool<Sqlite>, session_ttl: Duration) -> Self {
        Self { pool, session_ttl }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Creates a customer account. Usernames are compared exactly, so
    /// "Alice" and "alice" are different accounts.
    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = db::find_user_by_username(&mut *tx, username).await? {
            debug!(user_id = existing.id, "user exists");
            return Err(AppError::Conflict(
                "A user with the same name is already registered".to_string(),
            ));
        }

        let hash = bcrypt::hash(password, PASSWORD_HASH_COST)?;
        let id = db::insert_user(&mut *tx, username, &hash, Role::default()).await?;
        tx.commit().await?;

        info!(user_id = id, username = %username, "user_registered");
        Ok(User {
            id,
            username: username.to_string(),
            role: Role::default(),
        })
    }

    /// Checks credentials and opens a session. Unknown usernames and wrong
    /// passwords fail identically.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginSession, AppError> {
        let Some(credentials) = db::find_credentials(&self.pool, username).await? else {
            warn!("Login attempt for unknown user");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        };

        let valid = bcrypt::verify(password, &credentials.password).unwrap_or(false);
        if !valid {
            warn!(user_id = credentials.id, "Login attempt with wrong password");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        let user = User::try_from(DbUser {
            id: credentials.id,
            username: credentials.username,
            role: credentials.role,
        })?;

        let token = UserSession::generate_token();
        let expires_at = (Utc::now() + self.session_ttl).naive_utc();
        db::create_user_session(&self.pool, user.id, &token, expires_at).await?;

        info!(user_id = user.id, "Authentication successful");
        Ok(LoginSession { user, token })
    }

    /// Ends the session behind `token`. Succeeds when there is none.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: Option<&str>) -> Result<(), AppError> {
        if let Some(token) = token {
            db::invalidate_session(&self.pool, token).await?;
        }
        Ok(())
    }

    /// Resolves the principal for a request. Missing, unknown and expired
    /// sessions all resolve to `Anonymous`.
    #[instrument(skip_all)]
    pub async fn current_principal(&self, token: Option<&str>) -> Result<Principal, AppError> {
        let Some(token) = token else {
            return Ok(Principal::Anonymous);
        };

        let session = match db::get_session_by_token(&self.pool, token).await {
            Ok(session) => session,
            Err(AppError::Authentication(_)) => {
                warn!("Invalid session token");
                return Ok(Principal::Anonymous);
            }
            Err(e) => return Err(e),
        };

        if !session.is_valid() {
            warn!(session_id = session.id, "Session token expired");
            return Ok(Principal::Anonymous);
        }

        match db::get_user(&self.pool, session.user_id).await {
            Ok(user) => Ok(Principal::User(user)),
            Err(AppError::NotFound(_)) => Ok(Principal::Anonymous),
            Err(e) => Err(e),
        }
    }

    pub async fn clean_expired_sessions(&self) -> Result<u64, AppError> {
        db::clean_expired_sessions(&self.pool).await
    }
}
