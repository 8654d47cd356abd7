use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, oid::ObjectId};

use crate::db::DbConn;
use crate::models::{Job, SubscriptionStatus, User};
use super::evaluator::{month_start, JobCounts};

/// Posting counts for one user: all-time, and since the start of the
/// calendar month containing `now`.
pub async fn load_job_counts(
    db: &DbConn,
    user_id: ObjectId,
    now: DateTime<Utc>,
) -> Result<JobCounts, mongodb::error::Error> {
    let jobs = db.collection::<Job>("jobs");

    let total = jobs
        .count_documents(doc! { "posted_by": user_id }, None)
        .await?;
    let monthly = jobs
        .count_documents(
            doc! {
                "posted_by": user_id,
                "created_at": { "$gte": bson::DateTime::from_chrono(month_start(now)) }
            },
            None,
        )
        .await?;

    Ok(JobCounts {
        total: total as i64,
        monthly: monthly as i64,
    })
}

/// The one write the quota flow performs: correcting a subscription
/// status that evaluation observed to be stale.
pub async fn persist_status_correction(
    db: &DbConn,
    user_id: ObjectId,
    status: SubscriptionStatus,
) -> Result<(), mongodb::error::Error> {
    let status = bson::to_bson(&status)?;
    db.collection::<User>("users")
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$set": {
                    "subscription.status": status,
                    "updated_at": bson::DateTime::now()
                }
            },
            None,
        )
        .await?;
    Ok(())
}
