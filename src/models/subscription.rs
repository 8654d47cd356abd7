use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Basic,
    Premium,
}

impl SubscriptionPlan {
    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "Free",
            SubscriptionPlan::Basic => "Basic",
            SubscriptionPlan::Premium => "Premium",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

/// Subscription sub-document embedded in a user record.
///
/// The stored `status` is advisory: a paid plan whose window has passed is
/// treated as expired even while the field still says `active`, and the
/// field is corrected lazily when the staleness is observed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub plan_id: SubscriptionPlan,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<DateTime>,
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription {
            plan_id: SubscriptionPlan::Free,
            plan_name: SubscriptionPlan::Free.display_name().to_string(),
            status: SubscriptionStatus::Active,
            subscribed_at: None,
        }
    }
}
