use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, Environment};
use crate::error::{AppError, Result};
use crate::server::AppState;

//////
// Credential formats

pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

pub fn validate_password_format(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(AppError::ValidationError(format!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

pub fn validate_username_format(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AppError::ValidationError(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username.chars().all(is_username_char) {
        return Err(AppError::ValidationError(
            "Username may only contain letters, numbers, '_', '.' and '-'".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email_format(email: &str) -> Result<()> {
    let invalid = || AppError::ValidationError("Please enter a valid email".to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && tld.len() >= 2 => Ok(()),
        _ => Err(invalid()),
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Turns a display name or email local part into a valid username stem.
pub fn username_stem(raw: &str) -> String {
    let mut stem: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| is_username_char(*c))
        .take(USERNAME_MAX_LEN - 5)
        .collect();
    if stem.chars().count() < USERNAME_MIN_LEN {
        stem = format!("user{}", stem);
    }
    stem
}

//////
// Password hashing

/// Plaintext of the hash that unknown accounts are verified against.
pub const TIMING_GUARD_PASSWORD: &str = "persona-notes-timing-guard";

pub async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await?
        .map_err(|e| AppError::HashingError(e.to_string()))
}

/// A malformed hash counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(AppError::from)
}

//////
// Signing keys

/// Random 256-bit key, base64 encoded.
pub fn generate_secret_key() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut rng = rand::rng();
    let mut key = vec![0u8; 32];
    rng.fill_bytes(&mut key);
    general_purpose::STANDARD.encode(&key)
}

/// The configured JWT secret. Development falls back to a per-process key.
pub fn resolve_jwt_secret(config: &Config) -> Result<String> {
    let secret = config.jwt.secret.trim();
    if !secret.is_empty() {
        return Ok(secret.to_string());
    }
    match config.server.env {
        Environment::Production => Err(AppError::EnvironmentError(
            "JWT_SECRET must be set in production".to_string(),
        )),
        Environment::Development => {
            tracing::warn!(
                "JWT_SECRET not set, generated a key for this process; sessions end on restart"
            );
            Ok(generate_secret_key())
        }
    }
}

pub fn create_encoding_key(secret: &str) -> EncodingKey {
    EncodingKey::from_secret(secret.as_bytes())
}

pub fn create_decoding_key(secret: &str) -> DecodingKey {
    DecodingKey::from_secret(secret.as_bytes())
}

//////
// Session tokens

static JWT_ALGORITHM: Algorithm = Algorithm::HS256;
pub const TOKEN_ISSUER: &str = "persona-notes";
pub const TOKEN_AUDIENCE: &str = "persona-notes-client";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    iss: String,
    aud: String,
    sub: String, // user id
    iat: usize,
    nbf: usize,
    exp: usize,
    jti: String,
}

pub fn issue_session_token(user_id: &str, secret: &str, ttl_days: i64) -> Result<String> {
    let now = Utc::now();
    let expiration = now + Duration::days(ttl_days);

    let claims = SessionClaims {
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        nbf: now.timestamp() as usize,
        exp: expiration.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
    };

    let header = Header::new(JWT_ALGORITHM);
    encode(&header, &claims, &create_encoding_key(secret))
        .map_err(|e| AppError::EnvironmentError(e.to_string()))
}

pub fn extract_user_id_from_token(token: &str, key: &DecodingKey) -> Result<String> {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation.set_issuer(&[TOKEN_ISSUER]);
    let token_data = decode::<SessionClaims>(token, key, &validation)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    Ok(token_data.claims.sub)
}

//////
// Request extractor

/// The authenticated caller, resolved from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: ObjectId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("No token, authorization denied".to_string()))?;

        let invalid = || AppError::Unauthorized("Token is not valid".to_string());
        let subject = extract_user_id_from_token(bearer.token(), &state.jwt_decoding_key)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                invalid()
            })?;
        let user_id = ObjectId::parse_str(&subject).map_err(|_| invalid())?;

        // tokens outlive deleted accounts
        if state.users.find_by_id(user_id).await?.is_none() {
            return Err(invalid());
        }
        Ok(AuthUser { user_id })
    }
}
