use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        codes::{self, CodeKind},
        dto::{
            Ack, AuthResponse, LoginRequest, PublicUser, RegisterRequest, RegisteredResponse,
            ResendRequest, ResetConfirmRequest, ResetRequest, UpdateProfileRequest, VerifyRequest,
        },
        jwt::{CurrentUser, JwtKeys},
        password::{hash_password, verify_password},
        repo::User,
    },
    error::{ApiError, ApiResponse, Result},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify", post(verify))
        .route("/auth/resend", post(resend))
        .route("/auth/login", post(login))
        .route("/auth/password-reset/request", post(reset_request))
        .route("/auth/password-reset/confirm", post(reset_confirm))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-()]{6,18}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

/// Rate-limit key: first X-Forwarded-For hop when present, else socket IP.
fn caller_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredResponse>>)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    if let Some(phone) = payload.phone.as_deref() {
        if !is_valid_phone(phone) {
            return Err(ApiError::BadRequest("Invalid phone number".into()));
        }
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.email, &hash, name, payload.phone.as_deref())
        .await?;

    let code = codes::issue(
        &state.db,
        state.config.code_ttl_minutes,
        &user.email,
        CodeKind::Verification,
    )
    .await?;
    state.mailer.send_code(&user.email, "verification", &code).await?;

    info!(user_id = %user.id, email = %user.email, "user registered, verification pending");
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(RegisteredResponse {
            user: user.into(),
            verification_required: true,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(mut payload): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>> {
    payload.email = normalize_email(&payload.email);

    if !codes::consume(&state.db, &payload.email, CodeKind::Verification, &payload.code).await? {
        warn!(email = %payload.email, "verification code rejected");
        return Err(ApiError::CodeInvalidOrExpired);
    }

    // A consumed code without a user row means the account was deleted in
    // between; surface the same generic failure.
    let user = User::mark_verified(&state.db, &payload.email)
        .await?
        .ok_or(ApiError::CodeInvalidOrExpired)?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "email verified");
    Ok(ApiResponse::ok(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Always acknowledges; a code is only issued for an existing, still
/// unverified account.
#[instrument(skip(state, payload))]
pub async fn resend(
    State(state): State<AppState>,
    Json(mut payload): Json<ResendRequest>,
) -> Result<Json<ApiResponse<Ack>>> {
    payload.email = normalize_email(&payload.email);

    if let Some(user) = User::find_by_email(&state.db, &payload.email).await? {
        if !user.verified {
            let code = codes::issue(
                &state.db,
                state.config.code_ttl_minutes,
                &user.email,
                CodeKind::Verification,
            )
            .await?;
            state.mailer.send_code(&user.email, "verification", &code).await?;
        }
    }

    Ok(ApiResponse::ok(Ack {
        message: "If the account exists, a new code has been sent",
    }))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>> {
    let caller = caller_key(&headers, addr);
    if !state.limiter.check(&caller) {
        warn!(%caller, "login rate limited");
        return Err(ApiError::RateLimited);
    }

    payload.email = normalize_email(&payload.email);

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        state.limiter.record_failure(&caller);
        warn!(email = %payload.email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        state.limiter.record_failure(&caller);
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    if !user.verified {
        warn!(user_id = %user.id, "login before verification");
        return Err(ApiError::NotVerified);
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(ApiResponse::ok(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Always acknowledges identically whether or not the email is registered;
/// no code row is created for unknown emails.
#[instrument(skip(state, payload))]
pub async fn reset_request(
    State(state): State<AppState>,
    Json(mut payload): Json<ResetRequest>,
) -> Result<Json<ApiResponse<Ack>>> {
    payload.email = normalize_email(&payload.email);

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        let code = codes::issue(
            &state.db,
            state.config.code_ttl_minutes,
            &payload.email,
            CodeKind::Reset,
        )
        .await?;
        state.mailer.send_code(&payload.email, "password reset", &code).await?;
    }

    Ok(ApiResponse::ok(Ack {
        message: "If the account exists, a reset code has been sent",
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_confirm(
    State(state): State<AppState>,
    Json(mut payload): Json<ResetConfirmRequest>,
) -> Result<Json<ApiResponse<Ack>>> {
    payload.email = normalize_email(&payload.email);

    if payload.new_password.len() < 8 {
        return Err(ApiError::BadRequest("Password too short".into()));
    }

    if !codes::consume(&state.db, &payload.email, CodeKind::Reset, &payload.code).await? {
        warn!(email = %payload.email, "reset code rejected");
        return Err(ApiError::CodeInvalidOrExpired);
    }

    let hash = hash_password(&payload.new_password)?;
    if !User::set_password_hash(&state.db, &payload.email, &hash).await? {
        return Err(ApiError::CodeInvalidOrExpired);
    }

    info!(email = %payload.email, "password reset");
    Ok(ApiResponse::ok(Ack {
        message: "Password updated",
    }))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Result<Json<ApiResponse<PublicUser>>> {
    Ok(ApiResponse::ok(user.into()))
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<PublicUser>>> {
    if let Some(name) = payload.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Name is required".into()));
        }
    }
    if let Some(phone) = payload.phone.as_deref() {
        if !is_valid_phone(phone) {
            return Err(ApiError::BadRequest("Invalid phone number".into()));
        }
    }
    if let Some(password) = payload.password.as_deref() {
        if password.len() < 8 {
            return Err(ApiError::BadRequest("Password too short".into()));
        }
    }

    // Re-hash iff a new plaintext password was supplied on this write.
    let hash = payload
        .password
        .as_deref()
        .map(hash_password)
        .transpose()?;

    let updated = User::update_profile(
        &state.db,
        user.id,
        payload.name.as_deref().map(str::trim),
        payload.phone.as_deref(),
        hash.as_deref(),
    )
    .await?
    .ok_or(ApiError::Unauthorized)?;

    info!(user_id = %updated.id, "profile updated");
    Ok(ApiResponse::ok(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("+1 555 010-0100"));
        assert!(is_valid_phone("0123456789"));
        assert!(!is_valid_phone("abc"));
        assert!(!is_valid_phone("12"));
    }

    #[test]
    fn caller_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(caller_key(&headers, addr), "203.0.113.9");
    }

    #[test]
    fn caller_key_falls_back_to_socket_ip() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.0.2.7:1234".parse().unwrap();
        assert_eq!(caller_key(&headers, addr), "192.0.2.7");
    }
}
