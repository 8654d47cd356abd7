use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

/// One password-reset code. Only the HMAC digest of the code is stored,
/// never the code itself.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PasswordResetOtp {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub otp_digest: String,
    pub expires_at: DateTime,
    pub verified: bool,
    pub attempts: i32,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ForgotPasswordDto {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ResetPasswordDto {
    pub email: String,
    pub otp: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}
