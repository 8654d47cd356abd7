use chrono::{DateTime, Utc};
use serde::Serialize;
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::models::{Subscription, SubscriptionPlan, SubscriptionStatus};
use super::evaluator::{
    self, JobCounts, PostDecision, BASIC_MONTHLY_LIMIT, FREE_LIFETIME_LIMIT, UNLIMITED,
};

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    Lifetime,
    Monthly,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct PlanLimits {
    #[serde(rename = "type")]
    pub kind: LimitKind,
    pub limit: i64,
    pub current: i64,
    pub remaining: i64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct PostingStats {
    pub total_jobs: i64,
    pub monthly_jobs: i64,
}

/// Read-only posting snapshot for one user, shaped for display. Safe to
/// build on every page load: the lazily-computed status is reported but
/// never persisted here.
#[derive(Debug, Serialize, Clone, PartialEq, JsonSchema)]
pub struct PostingStatus {
    pub plan_id: SubscriptionPlan,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub subscribed_at: Option<DateTime<Utc>>,
    pub can_post: bool,
    pub message: String,
    pub limits: PlanLimits,
    pub stats: PostingStats,
}

pub fn posting_status(
    subscription: &Subscription,
    counts: &JobCounts,
    now: DateTime<Utc>,
) -> PostingStatus {
    let evaluation = evaluator::evaluate_job_post(subscription, counts, now);
    let status = evaluation.status_correction.unwrap_or(subscription.status);
    let expires_at = evaluator::plan_expires_at(subscription);
    let is_expired = subscription.plan_id != SubscriptionPlan::Free
        && expires_at.map(|e| now > e).unwrap_or(true);
    let (can_post, message) = match evaluation.decision {
        PostDecision::Allowed => (true, String::new()),
        PostDecision::Denied(denial) => (false, denial.message),
    };

    PostingStatus {
        plan_id: subscription.plan_id,
        plan_name: subscription.plan_name.clone(),
        status,
        is_expired,
        expires_at,
        subscribed_at: subscription.subscribed_at.map(|at| at.to_chrono()),
        can_post,
        message,
        limits: plan_limits(subscription, counts),
        stats: PostingStats {
            total_jobs: counts.total,
            monthly_jobs: counts.monthly,
        },
    }
}

/// The window that actually governs this account: the lifetime allowance
/// for free plans and for paid plans whose stored status has lapsed, the
/// plan's own monthly window otherwise.
fn plan_limits(subscription: &Subscription, counts: &JobCounts) -> PlanLimits {
    let lifetime_fallback = subscription.plan_id != SubscriptionPlan::Free
        && matches!(
            subscription.status,
            SubscriptionStatus::Expired | SubscriptionStatus::Cancelled
        );
    if subscription.plan_id == SubscriptionPlan::Free || lifetime_fallback {
        return PlanLimits {
            kind: LimitKind::Lifetime,
            limit: FREE_LIFETIME_LIMIT,
            current: counts.total,
            remaining: remaining(FREE_LIFETIME_LIMIT, counts.total),
        };
    }

    let limit = match subscription.plan_id {
        SubscriptionPlan::Basic => BASIC_MONTHLY_LIMIT,
        _ => UNLIMITED,
    };
    PlanLimits {
        kind: LimitKind::Monthly,
        limit,
        current: counts.monthly,
        remaining: remaining(limit, counts.monthly),
    }
}

fn remaining(limit: i64, current: i64) -> i64 {
    if limit == UNLIMITED {
        UNLIMITED
    } else {
        (limit - current).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mongodb::bson;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn subscription(
        plan: SubscriptionPlan,
        status: SubscriptionStatus,
        subscribed_at: Option<DateTime<Utc>>,
    ) -> Subscription {
        Subscription {
            plan_id: plan,
            plan_name: plan.display_name().to_string(),
            status,
            subscribed_at: subscribed_at.map(bson::DateTime::from_chrono),
        }
    }

    fn counts(total: i64, monthly: i64) -> JobCounts {
        JobCounts { total, monthly }
    }

    #[test]
    fn free_account_snapshot() {
        let snapshot = posting_status(
            &subscription(SubscriptionPlan::Free, SubscriptionStatus::Active, None),
            &counts(1, 1),
            at(2024, 3, 15, 12),
        );
        assert!(snapshot.can_post);
        assert!(snapshot.message.is_empty());
        assert_eq!(snapshot.status, SubscriptionStatus::Active);
        assert!(!snapshot.is_expired);
        assert_eq!(snapshot.expires_at, None);
        assert_eq!(snapshot.subscribed_at, None);
        assert_eq!(snapshot.limits.kind, LimitKind::Lifetime);
        assert_eq!(snapshot.limits.limit, 3);
        assert_eq!(snapshot.limits.current, 1);
        assert_eq!(snapshot.limits.remaining, 2);
        assert_eq!(snapshot.stats.total_jobs, 1);
        assert_eq!(snapshot.stats.monthly_jobs, 1);
    }

    #[test]
    fn free_account_remaining_clamps_at_zero() {
        let snapshot = posting_status(
            &subscription(SubscriptionPlan::Free, SubscriptionStatus::Active, None),
            &counts(7, 0),
            at(2024, 3, 15, 12),
        );
        assert!(!snapshot.can_post);
        assert!(!snapshot.message.is_empty());
        assert_eq!(snapshot.limits.remaining, 0);
    }

    #[test]
    fn premium_reports_the_unlimited_sentinel() {
        let now = at(2024, 3, 15, 12);
        let snapshot = posting_status(
            &subscription(
                SubscriptionPlan::Premium,
                SubscriptionStatus::Active,
                Some(now - Duration::days(5)),
            ),
            &counts(100, 42),
            now,
        );
        assert!(snapshot.can_post);
        assert_eq!(snapshot.limits.kind, LimitKind::Monthly);
        assert_eq!(snapshot.limits.limit, -1);
        assert_eq!(snapshot.limits.remaining, -1);
        assert_eq!(snapshot.limits.current, 42);
    }

    #[test]
    fn basic_in_window_reports_the_monthly_window() {
        let now = at(2024, 3, 15, 12);
        let subscribed = now - Duration::days(5);
        let snapshot = posting_status(
            &subscription(
                SubscriptionPlan::Basic,
                SubscriptionStatus::Active,
                Some(subscribed),
            ),
            &counts(12, 4),
            now,
        );
        assert!(snapshot.can_post);
        assert!(!snapshot.is_expired);
        assert_eq!(snapshot.expires_at, Some(at(2024, 4, 10, 12)));
        assert_eq!(snapshot.subscribed_at, Some(subscribed));
        assert_eq!(snapshot.limits.kind, LimitKind::Monthly);
        assert_eq!(snapshot.limits.limit, 10);
        assert_eq!(snapshot.limits.current, 4);
        assert_eq!(snapshot.limits.remaining, 6);
    }

    #[test]
    fn lazily_detected_lapse_is_reported_but_not_written_back() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(now - Duration::days(40)),
        );
        let snapshot = posting_status(&sub, &counts(0, 0), now);
        assert_eq!(snapshot.status, SubscriptionStatus::Expired);
        assert!(snapshot.is_expired);
        assert!(!snapshot.can_post);
        // The input record itself is untouched.
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn lapsed_paid_account_is_reported_under_the_lifetime_allowance() {
        let now = at(2024, 3, 15, 12);
        let snapshot = posting_status(
            &subscription(
                SubscriptionPlan::Basic,
                SubscriptionStatus::Cancelled,
                Some(now - Duration::days(61)),
            ),
            &counts(1, 0),
            now,
        );
        assert!(snapshot.can_post);
        assert_eq!(snapshot.status, SubscriptionStatus::Cancelled);
        assert_eq!(snapshot.limits.kind, LimitKind::Lifetime);
        assert_eq!(snapshot.limits.limit, 3);
        assert_eq!(snapshot.limits.current, 1);
        assert_eq!(snapshot.limits.remaining, 2);
    }

    #[test]
    fn snapshot_is_identical_across_repeated_reads() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(now - Duration::days(40)),
        );
        let first = posting_status(&sub, &counts(5, 2), now);
        let second = posting_status(&sub, &counts(5, 2), now);
        assert_eq!(first, second);
    }
}
