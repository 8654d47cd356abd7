use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

/// A job posting. `posted_by` and `created_at` are written once at
/// creation and never change; the monthly posting quota is derived from
/// them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Job {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub posted_by: ObjectId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub job_type: Option<String>, // "fulltime", "parttime", "contract", "freelance"
    pub location: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub is_open: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateJobDto {
    pub title: String,
    pub description: String,
    pub category: String,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct JobResponse {
    pub id: String,
    pub posted_by: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub is_open: bool,
    pub created_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        JobResponse {
            id: job.id.unwrap().to_hex(),
            posted_by: job.posted_by.to_hex(),
            title: job.title,
            description: job.description,
            category: job.category,
            job_type: job.job_type,
            location: job.location,
            budget_min: job.budget_min,
            budget_max: job.budget_max,
            is_open: job.is_open,
            created_at: job.created_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}
