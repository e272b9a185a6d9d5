//! # Auth
//!
//! Registration, login and password resets over the `users` table.
//!
//! - Passwords are bcrypt hashes, computed on the blocking pool
//! - Login hands out an HS256 token carrying the user id and role, valid for the
//!   configured window (2 hours by default)
//! - Requests present it as `Authorization: Bearer <token>`. No header is a 401, a bad or
//!   expired token a 403
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{PublicUser, Role, User},
    payloads::{Credentials, NewUser},
    state::AppState,
    utils::offload,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub exp: i64,
}

/// [`Claims`] of a caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl_secs: i64,
    bcrypt_cost: u32,
}

impl AuthKeys {
    pub fn new(secret: &str, token_ttl_secs: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl_secs,
            bcrypt_cost,
        }
    }

    pub fn issue_token(&self, user_id: i64, role: Role) -> Result<String, AppError> {
        let claims = Claims {
            sub: user_id,
            role,
            exp: Utc::now().timestamp() + self.token_ttl_secs,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::InternalError(Box::new(e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("Rejected token: {e}");
                AppError::Forbidden("invalid token")
            })
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let cost = self.bcrypt_cost;

        offload(move || bcrypt::hash(password, cost))
            .await?
            .map_err(|e| AppError::InternalError(Box::new(e)))
    }
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    offload(move || bcrypt::verify(password, &hash))
        .await?
        .map_err(|e| AppError::InternalError(Box::new(e)))
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    phone: String,
    email: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|_| AppError::InternalError(format!("Unknown role: {}", row.role).into()))?;

        Ok(User {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            password_hash: row.password_hash,
            role,
        })
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, name, phone, email, password_hash, role FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .map(User::try_from)
    .transpose()
}

pub async fn register(pool: &SqlitePool, keys: &AuthKeys, user: NewUser) -> Result<i64, AppError> {
    let already_exists = || AppError::validation("User already exists");

    if find_by_email(pool, &user.email).await?.is_some() {
        return Err(already_exists());
    }

    let password_hash = keys.hash_password(user.password).await?;

    let result = sqlx::query(
        "INSERT INTO users (name, phone, email, password_hash, role) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&user.name)
    .bind(&user.phone)
    .bind(&user.email)
    .bind(password_hash)
    .bind(user.role.as_str())
    .execute(pool)
    .await
    .map_err(|e| {
        let unique = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());

        if unique { already_exists() } else { AppError::Storage(e) }
    })?;

    info!("Registered {} as {}", user.email, user.role);
    Ok(result.last_insert_rowid())
}

/// Returns a fresh token and the public view of the user.
pub async fn login(
    pool: &SqlitePool,
    keys: &AuthKeys,
    credentials: Credentials,
) -> Result<(String, PublicUser), AppError> {
    let user = find_by_email(pool, &credentials.email)
        .await?
        .ok_or(AppError::Unauthorized("User not found"))?;

    if !verify_password(credentials.password, user.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Incorrect password"));
    }

    let token = keys.issue_token(user.id, user.role)?;

    Ok((token, user.into()))
}

pub async fn reset_password(
    pool: &SqlitePool,
    keys: &AuthKeys,
    credentials: Credentials,
) -> Result<(), AppError> {
    if find_by_email(pool, &credentials.email).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    let password_hash = keys.hash_password(credentials.password).await?;

    sqlx::query("UPDATE users SET password_hash = ? WHERE email = ?")
        .bind(password_hash)
        .bind(&credentials.email)
        .execute(pool)
        .await?;

    info!("Password reset for {}", credentials.email);
    Ok(())
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for Claims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or(AppError::Unauthorized("Access denied: not authenticated"))?;
        let state = state.clone();

        offload(move || state.auth.verify_token(&token)).await?
    }
}

impl FromRequestParts<Arc<AppState>> for AdminClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = Claims::from_request_parts(parts, state).await?;

        if claims.role != Role::Admin {
            return Err(AppError::Forbidden("administrator role required"));
        }

        Ok(AdminClaims(claims))
    }
}
