use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use serde::Serialize;
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::models::{Subscription, SubscriptionPlan, SubscriptionStatus};

/// Jobs a free (or lapsed paid) account may post over its lifetime.
pub const FREE_LIFETIME_LIMIT: i64 = 3;
/// Jobs a basic account may post per calendar month.
pub const BASIC_MONTHLY_LIMIT: i64 = 10;
/// Sentinel reported for plans with no numeric cap.
pub const UNLIMITED: i64 = -1;

/// Already-fetched posting counts for one user. `monthly` counts jobs
/// created since the start of the calendar month containing the
/// evaluation instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub total: i64,
    pub monthly: i64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    SubscriptionExpiredLifetimeLimit,
    FreeTrialLifetimeLimitReached,
    MonthlyLimitReached,
    SubscriptionInactive,
}

/// Why a post was refused. `observed_count` and `limit` are present for
/// the numeric caps and absent for `SUBSCRIPTION_INACTIVE`, where there
/// is no number the user exceeded.
#[derive(Debug, Serialize, Clone, PartialEq, JsonSchema)]
pub struct Denial {
    pub code: DenialCode,
    pub message: String,
    pub current_plan: SubscriptionPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    pub is_lifetime_limit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostDecision {
    Allowed,
    Denied(Denial),
}

impl PostDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PostDecision::Allowed)
    }
}

/// Outcome of one evaluation. `status_correction` carries the lazy
/// write-back (stored status observed stale) as data; the caller decides
/// whether to persist it. Emitted only for a stored-active paid plan
/// whose window has lapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaEvaluation {
    pub decision: PostDecision,
    pub status_correction: Option<SubscriptionStatus>,
}

/// First instant of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Effective expiry of a paid plan: one calendar month after purchase,
/// clamped to the end of the target month. Free plans have no expiry; a
/// paid plan missing its purchase timestamp reports none and is treated
/// as lapsed.
pub fn plan_expires_at(subscription: &Subscription) -> Option<DateTime<Utc>> {
    if subscription.plan_id == SubscriptionPlan::Free {
        return None;
    }
    subscription
        .subscribed_at
        .map(|at| at.to_chrono())
        .and_then(|at| at.checked_add_months(Months::new(1)))
}

/// `now == expiry` is still inside the window; only `now > expiry` lapses.
fn window_lapsed(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    match plan_expires_at(subscription) {
        Some(expires_at) => now > expires_at,
        None => true,
    }
}

/// Decide whether one more job post is permitted. Pure: `now` is an
/// explicit parameter and the counts are already fetched, so every rule
/// is testable against fixed instants.
pub fn evaluate_job_post(
    subscription: &Subscription,
    counts: &JobCounts,
    now: DateTime<Utc>,
) -> QuotaEvaluation {
    let plan = subscription.plan_id;

    // A paid account whose stored status already says expired/cancelled
    // is governed by the free lifetime allowance, not its old plan
    // window. Under the allowance it may still post.
    if plan != SubscriptionPlan::Free
        && matches!(
            subscription.status,
            SubscriptionStatus::Expired | SubscriptionStatus::Cancelled
        )
    {
        let decision = if counts.total >= FREE_LIFETIME_LIMIT {
            PostDecision::Denied(Denial {
                code: DenialCode::SubscriptionExpiredLifetimeLimit,
                message: format!(
                    "Your {} subscription has ended and the {} free job posts are used up. Renew your plan to keep posting.",
                    plan.display_name(),
                    FREE_LIFETIME_LIMIT
                ),
                current_plan: plan,
                observed_count: Some(counts.total),
                limit: Some(FREE_LIFETIME_LIMIT),
                is_lifetime_limit: true,
            })
        } else {
            PostDecision::Allowed
        };
        return QuotaEvaluation {
            decision,
            status_correction: None,
        };
    }

    if plan == SubscriptionPlan::Free {
        let decision = if counts.total >= FREE_LIFETIME_LIMIT {
            PostDecision::Denied(Denial {
                code: DenialCode::FreeTrialLifetimeLimitReached,
                message: format!(
                    "Free accounts can post up to {} jobs. Upgrade to a paid plan to post more.",
                    FREE_LIFETIME_LIMIT
                ),
                current_plan: plan,
                observed_count: Some(counts.total),
                limit: Some(FREE_LIFETIME_LIMIT),
                is_lifetime_limit: true,
            })
        } else {
            PostDecision::Allowed
        };
        return QuotaEvaluation {
            decision,
            status_correction: None,
        };
    }

    // Paid plan whose stored status still says active: check the real
    // window and flag the stale field for correction when it has passed.
    if window_lapsed(subscription, now) {
        return QuotaEvaluation {
            decision: PostDecision::Denied(Denial {
                code: DenialCode::SubscriptionInactive,
                message: "Your subscription is no longer active. Renew your plan to keep posting."
                    .to_string(),
                current_plan: plan,
                observed_count: None,
                limit: None,
                is_lifetime_limit: false,
            }),
            status_correction: Some(SubscriptionStatus::Expired),
        };
    }

    let decision = match plan {
        SubscriptionPlan::Basic if counts.monthly >= BASIC_MONTHLY_LIMIT => {
            PostDecision::Denied(Denial {
                code: DenialCode::MonthlyLimitReached,
                message: format!(
                    "You have used all {} job posts included in the Basic plan this month.",
                    BASIC_MONTHLY_LIMIT
                ),
                current_plan: plan,
                observed_count: Some(counts.monthly),
                limit: Some(BASIC_MONTHLY_LIMIT),
                is_lifetime_limit: false,
            })
        }
        _ => PostDecision::Allowed,
    };
    QuotaEvaluation {
        decision,
        status_correction: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
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

    fn denial_code(evaluation: &QuotaEvaluation) -> DenialCode {
        match &evaluation.decision {
            PostDecision::Denied(denial) => denial.code,
            PostDecision::Allowed => panic!("expected a denial"),
        }
    }

    #[test]
    fn free_account_under_lifetime_allowance_may_post() {
        let sub = subscription(SubscriptionPlan::Free, SubscriptionStatus::Active, None);
        let evaluation = evaluate_job_post(&sub, &counts(2, 2), at(2024, 3, 15, 12));
        assert!(evaluation.decision.is_allowed());
        assert_eq!(evaluation.status_correction, None);
    }

    #[test]
    fn free_account_at_lifetime_allowance_is_denied_the_fourth_post() {
        let sub = subscription(SubscriptionPlan::Free, SubscriptionStatus::Active, None);
        let evaluation = evaluate_job_post(&sub, &counts(3, 0), at(2024, 3, 15, 12));
        match evaluation.decision {
            PostDecision::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::FreeTrialLifetimeLimitReached);
                assert_eq!(denial.limit, Some(3));
                assert_eq!(denial.observed_count, Some(3));
                assert!(denial.is_lifetime_limit);
            }
            PostDecision::Allowed => panic!("fourth free post must be denied"),
        }
        assert_eq!(evaluation.status_correction, None);
    }

    #[test]
    fn basic_with_lapsed_window_is_inactive_even_at_zero_monthly_posts() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(now - Duration::days(40)),
        );
        let evaluation = evaluate_job_post(&sub, &counts(20, 0), now);
        assert_eq!(denial_code(&evaluation), DenialCode::SubscriptionInactive);
        assert_eq!(
            evaluation.status_correction,
            Some(SubscriptionStatus::Expired)
        );
    }

    #[test]
    fn basic_in_window_is_capped_at_ten_per_month() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(now - Duration::days(5)),
        );

        let under = evaluate_job_post(&sub, &counts(30, 9), now);
        assert!(under.decision.is_allowed());
        assert_eq!(under.status_correction, None);

        let at_cap = evaluate_job_post(&sub, &counts(30, 10), now);
        match at_cap.decision {
            PostDecision::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::MonthlyLimitReached);
                assert_eq!(denial.limit, Some(10));
                assert_eq!(denial.observed_count, Some(10));
                assert!(!denial.is_lifetime_limit);
            }
            PostDecision::Allowed => panic!("tenth monthly post already used"),
        }
    }

    #[test]
    fn premium_in_window_has_no_numeric_cap() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Premium,
            SubscriptionStatus::Active,
            Some(now - Duration::days(5)),
        );
        let evaluation = evaluate_job_post(&sub, &counts(1000, 500), now);
        assert!(evaluation.decision.is_allowed());
        assert_eq!(evaluation.status_correction, None);
    }

    #[test]
    fn premium_with_lazily_detected_lapse_is_inactive_for_any_counts() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Premium,
            SubscriptionStatus::Active,
            Some(now - Duration::days(61)),
        );
        for c in [counts(0, 0), counts(2, 0), counts(50, 10)] {
            let evaluation = evaluate_job_post(&sub, &c, now);
            assert_eq!(denial_code(&evaluation), DenialCode::SubscriptionInactive);
            assert_eq!(
                evaluation.status_correction,
                Some(SubscriptionStatus::Expired)
            );
        }
    }

    #[test]
    fn cancelled_paid_account_falls_back_to_the_free_allowance() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Cancelled,
            Some(now - Duration::days(61)),
        );
        let evaluation = evaluate_job_post(&sub, &counts(1, 0), now);
        assert!(evaluation.decision.is_allowed());
        assert_eq!(evaluation.status_correction, None);
    }

    #[test]
    fn expired_paid_account_over_the_allowance_hits_the_lifetime_limit() {
        let now = at(2024, 3, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Premium,
            SubscriptionStatus::Expired,
            Some(now - Duration::days(61)),
        );
        let evaluation = evaluate_job_post(&sub, &counts(5, 0), now);
        match evaluation.decision {
            PostDecision::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::SubscriptionExpiredLifetimeLimit);
                assert_eq!(denial.limit, Some(3));
                assert_eq!(denial.observed_count, Some(5));
                assert!(denial.is_lifetime_limit);
            }
            PostDecision::Allowed => panic!("lapsed account over the allowance must be denied"),
        }
        assert_eq!(evaluation.status_correction, None);
    }

    #[test]
    fn expiry_comparison_is_strict() {
        let subscribed = at(2024, 1, 15, 12);
        let expiry = at(2024, 2, 15, 12);
        let sub = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(subscribed),
        );
        assert_eq!(plan_expires_at(&sub), Some(expiry));

        let at_expiry = evaluate_job_post(&sub, &counts(0, 0), expiry);
        assert!(at_expiry.decision.is_allowed());
        assert_eq!(at_expiry.status_correction, None);

        let past_expiry = evaluate_job_post(&sub, &counts(0, 0), expiry + Duration::seconds(1));
        assert_eq!(denial_code(&past_expiry), DenialCode::SubscriptionInactive);
    }

    #[test]
    fn expiry_clamps_at_the_end_of_short_months() {
        let sub = subscription(
            SubscriptionPlan::Premium,
            SubscriptionStatus::Active,
            Some(at(2024, 1, 31, 12)),
        );
        // 2024 is a leap year: Jan 31 + 1 month clamps to Feb 29.
        assert_eq!(plan_expires_at(&sub), Some(at(2024, 2, 29, 12)));

        let inside = evaluate_job_post(&sub, &counts(0, 0), at(2024, 2, 29, 11));
        assert!(inside.decision.is_allowed());

        let outside = evaluate_job_post(&sub, &counts(0, 0), at(2024, 3, 1, 0));
        assert_eq!(denial_code(&outside), DenialCode::SubscriptionInactive);
    }

    #[test]
    fn paid_plan_without_purchase_timestamp_is_inactive() {
        let evaluation = evaluate_job_post(
            &subscription(SubscriptionPlan::Basic, SubscriptionStatus::Active, None),
            &counts(0, 0),
            at(2024, 3, 15, 12),
        );
        assert_eq!(denial_code(&evaluation), DenialCode::SubscriptionInactive);
        assert_eq!(
            evaluation.status_correction,
            Some(SubscriptionStatus::Expired)
        );
    }

    #[test]
    fn correction_is_emitted_only_for_stored_active_lapsed_paid_plans() {
        let now = at(2024, 3, 15, 12);
        let lapsed = Some(now - Duration::days(40));
        let in_window = Some(now - Duration::days(5));

        let cases = [
            (SubscriptionPlan::Free, SubscriptionStatus::Active, None, None),
            (SubscriptionPlan::Basic, SubscriptionStatus::Active, in_window, None),
            (
                SubscriptionPlan::Basic,
                SubscriptionStatus::Active,
                lapsed,
                Some(SubscriptionStatus::Expired),
            ),
            (SubscriptionPlan::Basic, SubscriptionStatus::Expired, lapsed, None),
            (SubscriptionPlan::Premium, SubscriptionStatus::Cancelled, lapsed, None),
        ];
        for (plan, status, subscribed_at, expected) in cases {
            let sub = subscription(plan, status, subscribed_at);
            let evaluation = evaluate_job_post(&sub, &counts(0, 0), now);
            assert_eq!(evaluation.status_correction, expected, "{plan:?}/{status:?}");
        }
    }

    #[test]
    fn rising_counts_never_turn_a_denial_into_an_allow() {
        let now = at(2024, 3, 15, 12);
        let free = subscription(SubscriptionPlan::Free, SubscriptionStatus::Active, None);
        for total in FREE_LIFETIME_LIMIT..FREE_LIFETIME_LIMIT + 20 {
            let evaluation = evaluate_job_post(&free, &counts(total, 0), now);
            assert!(!evaluation.decision.is_allowed(), "total={total}");
        }

        let basic = subscription(
            SubscriptionPlan::Basic,
            SubscriptionStatus::Active,
            Some(now - Duration::days(5)),
        );
        for monthly in BASIC_MONTHLY_LIMIT..BASIC_MONTHLY_LIMIT + 20 {
            let evaluation = evaluate_job_post(&basic, &counts(monthly, monthly), now);
            assert!(!evaluation.decision.is_allowed(), "monthly={monthly}");
        }
    }

    #[test]
    fn month_start_is_the_first_instant_of_the_month() {
        assert_eq!(
            month_start(Utc.with_ymd_and_hms(2024, 3, 15, 22, 45, 9).unwrap()),
            at(2024, 3, 1, 0)
        );
        assert_eq!(month_start(at(2024, 3, 1, 0)), at(2024, 3, 1, 0));
    }
}
