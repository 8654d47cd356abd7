use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{self, doc, DateTime};
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{Subscription, SubscriptionPlan, SubscriptionStatus, User};
use crate::quota::{load_job_counts, plan_expires_at, posting_status, PostingStatus};
use crate::utils::{ApiError, ApiResponse};

/// --------------------
/// Posting status
/// --------------------
/// Read-only: reports the lazily-computed status without writing the
/// correction back (only the posting flow persists it).
#[openapi(tag = "Subscription")]
#[get("/subscription/posting-status")]
pub async fn get_posting_status(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<PostingStatus>>, ApiError> {
    let now = chrono::Utc::now();

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let counts = load_job_counts(db, auth.user_id, now)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(posting_status(
        &user.subscription,
        &counts,
        now,
    ))))
}

/// --------------------
/// Upgrade plan
/// --------------------
/// Activates the plan immediately; payment collection happens outside
/// this service.
#[openapi(tag = "Subscription")]
#[post("/subscription/upgrade/<plan>")]
pub async fn upgrade_plan(
    db: &State<DbConn>,
    auth: AuthGuard,
    plan: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let plan_id = match plan.to_lowercase().as_str() {
        "basic" => SubscriptionPlan::Basic,
        "premium" => SubscriptionPlan::Premium,
        _ => return Err(ApiError::bad_request("Invalid plan. Choose 'basic' or 'premium'")),
    };

    let subscription = Subscription {
        plan_id,
        plan_name: plan_id.display_name().to_string(),
        status: SubscriptionStatus::Active,
        subscribed_at: Some(DateTime::now()),
    };

    let subscription_bson = bson::to_bson(&subscription)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    let result = db
        .collection::<User>("users")
        .update_one(
            doc! { "_id": auth.user_id },
            doc! {
                "$set": {
                    "subscription": subscription_bson,
                    "updated_at": DateTime::now()
                }
            },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    let expires_at = plan_expires_at(&subscription)
        .map(|e| e.to_rfc3339())
        .unwrap_or_default();

    Ok(Json(ApiResponse::success_with_message(
        format!("{} plan activated", subscription.plan_name),
        serde_json::json!({
            "plan_id": format!("{:?}", plan_id).to_lowercase(),
            "plan_name": subscription.plan_name,
            "status": "active",
            "expires_at": expires_at
        }),
    )))
}

/// --------------------
/// Cancel subscription
/// --------------------
#[openapi(tag = "Subscription")]
#[post("/subscription/cancel")]
pub async fn cancel_subscription(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.subscription.plan_id == SubscriptionPlan::Free {
        return Err(ApiError::bad_request("Free accounts have no subscription to cancel"));
    }
    if user.subscription.status == SubscriptionStatus::Cancelled {
        return Err(ApiError::bad_request("Subscription is already cancelled"));
    }

    db.collection::<User>("users")
        .update_one(
            doc! { "_id": auth.user_id },
            doc! {
                "$set": {
                    "subscription.status": "cancelled",
                    "updated_at": DateTime::now()
                }
            },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Subscription cancelled"
    }))))
}
