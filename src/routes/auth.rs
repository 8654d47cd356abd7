use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, DateTime};
use mongodb::options::FindOneOptions;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use crate::db::DbConn;
use crate::models::{
    ForgotPasswordDto, LoginDto, PasswordResetOtp, RefreshTokenDto, RegisterDto,
    ResetPasswordDto, Subscription, User, UserResponse,
};
use crate::services::{EmailService, JwtService};
use crate::utils::{generate_otp, validate_email, ApiError, ApiResponse};
use mongodb::bson::oid::ObjectId;
use validator::Validate;

const OTP_WINDOW_MS: i64 = 10 * 60 * 1000;
const OTP_LIMIT: i32 = 3;
const OTP_TTL_MS: i64 = 10 * 60 * 1000;
const OTP_MAX_ATTEMPTS: i32 = 5;

/// --------------------
/// Rate limiter helper
/// --------------------
async fn rate_limit(
    db: &DbConn,
    key: &str,
    limit: i32,
    window_ms: i64,
) -> Result<(), ApiError> {
    let now = chrono::Utc::now().timestamp_millis();
    let window_expires = DateTime::from_millis(now + window_ms);

    let collection = db.collection::<mongodb::bson::Document>("rate_limits");

    let doc = collection
        .find_one(doc! { "key": key }, None)
        .await
        .map_err(|_| ApiError::internal_error("Rate limiter lookup failed"))?;

    match doc {
        // First request OR expired window
        None => {
            collection
                .insert_one(
                    doc! {
                        "key": key,
                        "count": 1,
                        "expires_at": window_expires
                    },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter insert failed"))?;
            Ok(())
        }

        Some(d) => {
            let count = d.get_i32("count").unwrap_or(0);
            let expires_at = d.get_datetime("expires_at").ok();

            // Window expired → reset
            if expires_at.map(|e| *e < DateTime::now()).unwrap_or(true) {
                collection
                    .update_one(
                        doc! { "key": key },
                        doc! {
                            "$set": {
                                "count": 1,
                                "expires_at": window_expires
                            }
                        },
                        None,
                    )
                    .await
                    .map_err(|_| ApiError::internal_error("Rate limiter reset failed"))?;
                return Ok(());
            }

            // Limit exceeded
            if count >= limit {
                return Err(ApiError::too_many_requests(
                    "Too many requests. Please try later.",
                ));
            }

            // Increment count
            collection
                .update_one(
                    doc! { "key": key },
                    doc! { "$inc": { "count": 1 } },
                    None,
                )
                .await
                .map_err(|_| ApiError::internal_error("Rate limiter increment failed"))?;

            Ok(())
        }
    }
}

/// Reset codes are stored as keyed digests, never in the clear.
fn reset_otp_digest(email: &str, otp: &str) -> Result<String, ApiError> {
    let secret = crate::config::Config::jwt_secret();

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::internal_error("Invalid HMAC key"))?;

    mac.update(format!("{}|{}", email, otp).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn token_pair(user_id: &ObjectId, email: &str) -> Result<(String, String), ApiError> {
    let access_token = JwtService::generate_access_token(user_id, email)
        .map_err(|_| ApiError::internal_error("Failed to generate access token"))?;
    let refresh_token = JwtService::generate_refresh_token(user_id, email)
        .map_err(|_| ApiError::internal_error("Failed to generate refresh token"))?;
    Ok((access_token, refresh_token))
}

/// --------------------
/// Register
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let email = dto.email.trim().to_lowercase();

    let existing = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    if existing.is_some() {
        return Err(ApiError::bad_request("An account with this email already exists"));
    }

    let password_hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST)
        .map_err(|_| ApiError::internal_error("Failed to hash password"))?;

    let now = DateTime::now();
    let mut user = User {
        id: None,
        email: email.clone(),
        password_hash,
        name: dto.name.clone(),
        is_active: true,
        subscription: Subscription::default(),
        last_login_at: now,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<User>("users")
        .insert_one(&user, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create account: {}", e)))?;

    let user_id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid user ID"))?;
    user.id = Some(user_id);

    let (access_token, refresh_token) = token_pair(&user_id, &email)?;

    EmailService::send_welcome_email(&email, user.name.as_deref().unwrap_or("")).await;

    Ok(Json(ApiResponse::success_with_message(
        "Account created successfully".to_string(),
        serde_json::json!({
            "user": UserResponse::from(user),
            "access_token": access_token,
            "refresh_token": refresh_token
        }),
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let email = dto.email.trim().to_lowercase();

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("This account has been deactivated"));
    }

    let password_ok = bcrypt::verify(&dto.password, &user.password_hash)
        .map_err(|_| ApiError::internal_error("Failed to verify password"))?;
    if !password_ok {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("Invalid user ID"))?;

    db.collection::<User>("users")
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "last_login_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    let (access_token, refresh_token) = token_pair(&user_id, &email)?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "user": UserResponse::from(user),
        "access_token": access_token,
        "refresh_token": refresh_token
    }))))
}

/// --------------------
/// Refresh token
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/refresh-token", data = "<dto>")]
pub async fn refresh_token(
    db: &State<DbConn>,
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("This account has been deactivated"));
    }

    let (access_token, refresh_token) = token_pair(&user_id, &user.email)?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "access_token": access_token,
        "refresh_token": refresh_token
    }))))
}

/// --------------------
/// Forgot password (send OTP)
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/forgot-password", data = "<dto>")]
pub async fn forgot_password(
    db: &State<DbConn>,
    dto: Json<ForgotPasswordDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let email = dto.email.trim().to_lowercase();
    if !validate_email(&email) {
        return Err(ApiError::bad_request("Invalid email"));
    }

    rate_limit(
        db,
        &format!("forgot_password:{}", email),
        OTP_LIMIT,
        OTP_WINDOW_MS,
    ).await?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    // The response is the same whether or not the account exists.
    if let Some(_user) = user {
        let otp = generate_otp();
        let otp_digest = reset_otp_digest(&email, &otp)?;
        let now = chrono::Utc::now().timestamp_millis();

        let otps = db.collection::<PasswordResetOtp>("password_reset_otps");
        otps.delete_many(doc! { "email": &email }, None)
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        otps.insert_one(
            &PasswordResetOtp {
                id: None,
                email: email.clone(),
                otp_digest,
                expires_at: DateTime::from_millis(now + OTP_TTL_MS),
                verified: false,
                attempts: 0,
                created_at: DateTime::now(),
            },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

        EmailService::send_password_reset_otp(&email, &otp).await;
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "If an account with this email exists, a reset code has been sent"
    }))))
}

/// --------------------
/// Reset password (verify OTP)
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/reset-password", data = "<dto>")]
pub async fn reset_password(
    db: &State<DbConn>,
    dto: Json<ResetPasswordDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let email = dto.email.trim().to_lowercase();
    let otps = db.collection::<PasswordResetOtp>("password_reset_otps");

    let newest_first = FindOneOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let record = otps
        .find_one(doc! { "email": &email }, newest_first)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset code"))?;

    if record.verified {
        return Err(ApiError::bad_request("This reset code has already been used"));
    }
    if record.expires_at < DateTime::now() {
        return Err(ApiError::bad_request("Reset code has expired"));
    }
    if record.attempts >= OTP_MAX_ATTEMPTS {
        return Err(ApiError::too_many_requests(
            "Too many incorrect attempts. Request a new code.",
        ));
    }

    let expected_digest = reset_otp_digest(&email, dto.otp.trim())?;
    if expected_digest != record.otp_digest {
        otps.update_one(
            doc! { "_id": record.id },
            doc! { "$inc": { "attempts": 1 } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
        return Err(ApiError::bad_request("Invalid reset code"));
    }

    let password_hash = bcrypt::hash(&dto.new_password, bcrypt::DEFAULT_COST)
        .map_err(|_| ApiError::internal_error("Failed to hash password"))?;

    let result = db
        .collection::<User>("users")
        .update_one(
            doc! { "email": &email },
            doc! {
                "$set": {
                    "password_hash": password_hash,
                    "updated_at": DateTime::now()
                }
            },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("Account not found"));
    }

    otps.update_one(
        doc! { "_id": record.id },
        doc! { "$set": { "verified": true } },
        None,
    )
    .await
    .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Password has been reset successfully"
    }))))
}
