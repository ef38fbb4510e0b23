//! Caller identity forwarded by the auth gateway
//!
//! Login and sessions live upstream. By the time a request reaches this
//! service the gateway has replaced credentials with plain identity headers.

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use uuid::Uuid;

use crate::error::{AppError, AppErrorKind, AuthenticationError};
use crate::middleware::error::tag_request_id;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
    }
}

/// Signed-in user when present, guest otherwise
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn user_from_headers(headers: &HeaderMap) -> Result<Option<AuthUser>, AppError> {
    let Some(raw_id) = header(headers, USER_ID_HEADER) else {
        return Ok(None);
    };
    let id = Uuid::parse_str(&raw_id).map_err(|_| {
        tag_request_id(headers)(AppError::new(AppErrorKind::Authentication(
            AuthenticationError::MissingCredentials,
        )))
    })?;
    Ok(Some(AuthUser {
        id,
        email: header(headers, USER_EMAIL_HEADER),
        role: header(headers, USER_ROLE_HEADER),
    }))
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(user_from_headers(&parts.headers)?))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)?.ok_or_else(|| {
            tag_request_id(&parts.headers)(AppError::new(AppErrorKind::Authentication(
                AuthenticationError::MissingCredentials,
            )))
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, "Non-admin caller on operator endpoint");
            return Err(tag_request_id(&parts.headers)(AppError::new(
                AppErrorKind::Authentication(AuthenticationError::Forbidden),
            )));
        }
        Ok(AdminUser(user))
    }
}
