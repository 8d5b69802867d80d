//! Bearer-token authentication and the owner-or-admin authorization rule.

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Role;

pub mod password;
pub mod token;

pub use token::{TokenError, TokenService};

/// Who is making the request, as proven by a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized, token not found!")]
    MissingToken,
    #[error("Invalid authorization scheme")]
    InvalidScheme,
    #[error("Invalid authorization header")]
    InvalidHeader,
    #[error(transparent)]
    InvalidToken(#[from] TokenError),
}

/// Finds the raw token: `Authorization: Bearer <token>` first, then the
/// `token` cookie.
pub fn extract_token(req: &HttpRequest) -> Result<String, AuthError> {
    if let Some(header) = req.headers().get("Authorization") {
        let value = header.to_str().map_err(|_| AuthError::InvalidHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?
            .trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        return Ok(token.to_string());
    }

    match req.cookie("token") {
        Some(cookie) if !cookie.value().is_empty() => Ok(cookie.value().to_string()),
        _ => Err(AuthError::MissingToken),
    }
}

pub fn authenticate(req: &HttpRequest, tokens: &TokenService) -> Result<Identity, AuthError> {
    let token = extract_token(req)?;
    Ok(tokens.verify(&token)?)
}

pub fn authorize_owner_or_admin(identity: &Identity, resource_owner_id: i64) -> bool {
    identity.is_admin() || identity.user_id == resource_owner_id
}

/// Same rule as [`authorize_owner_or_admin`], as a `Forbidden` error.
pub fn require_owner_or_admin(
    identity: &Identity,
    resource_owner_id: i64,
    message: &str,
) -> Result<(), ApiError> {
    if authorize_owner_or_admin(identity, resource_owner_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(message))
    }
}

pub fn require_admin(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Unauthorized - Admin access required"))
    }
}

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let identity = req.extensions().get::<Identity>().copied();
        ready(identity.ok_or_else(|| ApiError::Unauthenticated("Login required".to_string())))
    }
}
