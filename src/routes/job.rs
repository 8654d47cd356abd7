use rocket::serde::json::Json;
use rocket::State;
use rocket::form::FromForm;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{CreateJobDto, Job, JobResponse, User};
use crate::quota::{evaluate_job_post, load_job_counts, persist_status_correction, PostDecision};
use crate::utils::{ApiError, ApiResponse};

/// --------------------
/// Create job (quota-gated)
/// --------------------
#[openapi(tag = "Jobs")]
#[post("/jobs", data = "<dto>")]
pub async fn create_job(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateJobDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if dto.title.trim().is_empty() {
        return Err(ApiError::bad_request("Job title is required"));
    }
    if dto.description.trim().is_empty() {
        return Err(ApiError::bad_request("Job description is required"));
    }
    if dto.category.trim().is_empty() {
        return Err(ApiError::bad_request("Job category is required"));
    }
    if let (Some(min), Some(max)) = (dto.budget_min, dto.budget_max) {
        if min > max {
            return Err(ApiError::bad_request("Minimum budget cannot exceed maximum budget"));
        }
    }

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

    let evaluation = evaluate_job_post(&user.subscription, &counts, now);

    if let Some(status) = evaluation.status_correction {
        persist_status_correction(db, auth.user_id, status)
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
    }

    if let PostDecision::Denied(denial) = evaluation.decision {
        let details = serde_json::to_value(&denial)
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        return Err(ApiError::forbidden(denial.message, details));
    }

    // The quota check above and this insert are not transactional; two
    // simultaneous posts by the same user can both pass the check.
    let job = Job {
        id: None,
        posted_by: auth.user_id,
        title: dto.title.trim().to_string(),
        description: dto.description.trim().to_string(),
        category: dto.category.trim().to_lowercase(),
        job_type: dto.job_type.clone(),
        location: dto.location.clone(),
        budget_min: dto.budget_min,
        budget_max: dto.budget_max,
        is_open: true,
        created_at: DateTime::from_chrono(now),
        updated_at: DateTime::from_chrono(now),
    };

    let result = db
        .collection::<Job>("jobs")
        .insert_one(&job, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create job: {}", e)))?;

    let job_id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid job ID"))?
        .to_hex();

    Ok(Json(ApiResponse::success_with_message(
        "Job posted successfully".to_string(),
        serde_json::json!({ "job_id": job_id }),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct BrowseJobsQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub include_closed: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// --------------------
/// Browse jobs
/// --------------------
#[openapi(tag = "Jobs")]
#[get("/jobs?<query..>")]
pub async fn browse_jobs(
    db: &State<DbConn>,
    query: BrowseJobsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).min(100);
    let skip = (page - 1) * limit;

    let mut filter = doc! {};

    if !query.include_closed.unwrap_or(false) {
        filter.insert("is_open", true);
    }

    if let Some(q) = query.q {
        filter.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": &q, "$options": "i" } },
                doc! { "description": { "$regex": &q, "$options": "i" } },
            ],
        );
    }

    if let Some(category) = query.category {
        filter.insert("category", category.to_lowercase());
    }

    if let Some(job_type) = query.job_type {
        filter.insert("job_type", job_type);
    }

    if let Some(location) = query.location {
        filter.insert("location", doc! { "$regex": &location, "$options": "i" });
    }

    let find_options = FindOptions::builder()
        .skip(skip as u64)
        .limit(limit)
        .sort(doc! { "created_at": -1 })
        .build();

    let mut cursor = db
        .collection::<Job>("jobs")
        .find(filter.clone(), find_options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let mut jobs = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?
    {
        let job = cursor
            .deserialize_current()
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        jobs.push(JobResponse::from(job));
    }

    let total = db
        .collection::<Job>("jobs")
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "jobs": jobs,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "pages": (total as f64 / limit as f64).ceil() as i64,
        }
    }))))
}

/// --------------------
/// Own postings
/// --------------------
#[openapi(tag = "Jobs")]
#[get("/jobs/mine")]
pub async fn my_jobs(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let find_options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();

    let mut cursor = db
        .collection::<Job>("jobs")
        .find(doc! { "posted_by": auth.user_id }, find_options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let mut jobs = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?
    {
        let job = cursor
            .deserialize_current()
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        jobs.push(JobResponse::from(job));
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "jobs": jobs
    }))))
}

/// --------------------
/// Single job
/// --------------------
#[openapi(tag = "Jobs")]
#[get("/jobs/<job_id>")]
pub async fn get_job(
    db: &State<DbConn>,
    job_id: String,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let object_id = ObjectId::parse_str(&job_id)
        .map_err(|_| ApiError::bad_request("Invalid job ID"))?;

    let job = db
        .collection::<Job>("jobs")
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(ApiResponse::success(JobResponse::from(job))))
}
