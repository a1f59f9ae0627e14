//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Either a session was started, or the caller must complete 2FA with the
/// returned pending token.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub two_factor_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyRequest {
    /// Pending token from the login step.
    pub token: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub recovery_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyResponse {
    pub used_recovery_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_recovery_codes: Option<usize>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorEnrollStartResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub qr_data_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorEnrollFinishRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoveryCodesResponse {
    /// Plaintext codes, shown exactly once.
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    pub level: String,
    pub impersonating: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SelectProfileRequest {
    pub member_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImpersonateRequest {
    pub member_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OAuthRegisterRequest {
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangeEmailRequest {
    pub new_email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmEmailChangeRequest {
    pub token: String,
}
