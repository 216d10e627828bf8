use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user.role.parse().map_err(|_| {
            AppError::Internal(format!(
                "User {} has unrecognised role '{}'",
                user.id, user.role
            ))
        })?;

        Ok(Self {
            id: user.id,
            username: user.username,
            role,
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }
}

pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow)]
pub struct DbUserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: NaiveDateTime,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            token: session.token,
            created_at: session.created_at.unwrap_or_else(|| Utc::now().naive_utc()),
            expires_at: session.expires_at,
        }
    }
}

impl UserSession {
    const TOKEN_LENGTH: usize = 48;

    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(Self::TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}

/// The identity a request acts as. Derived per request from the session
/// cookie, never stored anywhere process-wide.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|u| u.role)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user().is_some_and(|u| u.has_permission(permission))
    }

    /// Elevated catalog operations require an `Admin`, and this is the only
    /// way to obtain one.
    pub fn require_admin(&self) -> Result<Admin, AppError> {
        match self {
            Principal::User(user) if user.has_permission(Permission::ManageCatalog) => {
                Ok(Admin { user_id: user.id })
            }
            Principal::User(user) => {
                tracing::warn!(
                    username = %user.username,
                    role = %user.role.as_str(),
                    permission = ?Permission::ManageCatalog,
                    "Permission denied"
                );
                Err(AppError::Authorization(format!(
                    "{} may not manage the catalog",
                    user.username
                )))
            }
            Principal::Anonymous => Err(AppError::Authorization(
                "Anonymous principal may not manage the catalog".to_string(),
            )),
        }
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            authenticated: self.is_authenticated(),
            username: self.user().map(|u| u.username.clone()),
            is_admin: self.has_permission(Permission::ManageCatalog),
        }
    }
}

/// Proof that the current principal is a catalog administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admin {
    user_id: i64,
}

impl Admin {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

/// What templates get to know about the principal.
#[derive(Debug, Serialize, Clone, Default)]
pub struct Viewer {
    pub authenticated: bool,
    pub username: Option<String>,
    pub is_admin: bool,
}
