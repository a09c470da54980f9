//! Plan tiers and what each one allows.
//!
//! Authorization decides whether a user may do something; entitlements
//! decide whether the team's plan covers it.

mod plan;
mod usage;

pub use plan::{
    ai_credit_cost, plan_tier_from, tier_has_feature, LimitKey, PlanLimit, PlanTier,
    DEFAULT_CREDIT_COST,
};
pub use usage::{usage_level, usage_percentage, UsageLevel};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntitlementError {
    #[error("Reached the {key} limit of the {tier} plan ({current}/{limit})")]
    PlanLimitExceeded {
        tier: PlanTier,
        key: LimitKey,
        current: u64,
        limit: u64,
    },
}

/// Fails when `current` has already reached the tier's limit for `key`.
/// Call after authorization, before performing the action.
pub fn check_entitlement(
    tier: PlanTier,
    key: LimitKey,
    current: u64,
) -> Result<(), EntitlementError> {
    match tier.limit(key) {
        PlanLimit::Unlimited => Ok(()),
        PlanLimit::Limited(limit) if current >= limit => {
            Err(EntitlementError::PlanLimitExceeded {
                tier,
                key,
                current,
                limit,
            })
        }
        PlanLimit::Limited(_) => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub tier: PlanTier,
    pub display_name: &'static str,
    pub limits: BTreeMap<&'static str, PlanLimit>,
    pub features: &'static [&'static str],
}

impl PlanSummary {
    pub fn of(tier: PlanTier) -> Self {
        Self {
            tier,
            display_name: tier.display_name(),
            limits: LimitKey::ALL
                .iter()
                .map(|key| (key.as_str(), tier.limit(*key)))
                .collect(),
            features: tier.features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_entitlement_fails_at_limit() {
        assert!(check_entitlement(PlanTier::Free, LimitKey::Members, 2).is_ok());
        assert_eq!(
            check_entitlement(PlanTier::Free, LimitKey::Members, 3),
            Err(EntitlementError::PlanLimitExceeded {
                tier: PlanTier::Free,
                key: LimitKey::Members,
                current: 3,
                limit: 3,
            })
        );
    }

    #[test]
    fn test_unlimited_is_never_exceeded() {
        assert!(check_entitlement(PlanTier::Pro, LimitKey::Notes, u64::MAX).is_ok());
        assert!(check_entitlement(PlanTier::Enterprise, LimitKey::AiCredits, 1_000_000).is_ok());
    }

    #[test]
    fn test_error_message_names_key_and_plan() {
        let err = check_entitlement(PlanTier::Pro, LimitKey::StorageQuotaMb, 1500).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reached the storageQuotaMB limit of the pro plan (1500/1000)"
        );
    }

    #[test]
    fn test_plan_summary() {
        let summary = serde_json::to_value(PlanSummary::of(PlanTier::Pro)).unwrap();
        assert_eq!(summary["tier"], "pro");
        assert_eq!(summary["displayName"], "Pro");
        assert_eq!(summary["limits"]["notes"], -1);
        assert_eq!(summary["limits"]["members"], 20);
        assert_eq!(summary["features"].as_array().unwrap().len(), 5);
    }
}
