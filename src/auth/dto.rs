use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::{Tier, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Request body for email verification.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

/// Request body for re-sending a verification code.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for starting a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Request body for confirming a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub email: String,
    pub code: String,
    #[serde(rename = "newPassword", alias = "new_password")]
    pub new_password: String,
}

/// Request body for a partial profile update. A supplied password is
/// re-hashed; absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub tier: Tier,
    pub tier_expires_at: Option<OffsetDateTime>,
    pub verified: bool,
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            phone: u.phone,
            tier: u.tier,
            tier_expires_at: u.tier_expires_at,
            verified: u.verified,
            created_at: u.created_at,
        }
    }
}

/// Returned after successful verification or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Returned after registration; the account stays unusable until verified.
#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub user: PublicUser,
    pub verification_required: bool,
}

/// Generic acknowledgment used where the response must not reveal whether an
/// account exists.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
}
