use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Pro => "Pro",
            PlanTier::Enterprise => "Enterprise",
        }
    }

    pub fn limit(&self, key: LimitKey) -> PlanLimit {
        use PlanLimit::{Limited, Unlimited};
        match (self, key) {
            (PlanTier::Free, LimitKey::Members) => Limited(3),
            (PlanTier::Free, LimitKey::AiCredits) => Limited(100),
            (PlanTier::Free, LimitKey::Notes) => Limited(50),
            (PlanTier::Free, LimitKey::StorageQuotaMb) => Limited(100),
            (PlanTier::Pro, LimitKey::Members) => Limited(20),
            (PlanTier::Pro, LimitKey::AiCredits) => Limited(5000),
            (PlanTier::Pro, LimitKey::Notes) => Unlimited,
            (PlanTier::Pro, LimitKey::StorageQuotaMb) => Limited(1000),
            (PlanTier::Enterprise, _) => Unlimited,
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            PlanTier::Free => &["basic", "notes"],
            PlanTier::Pro => &["basic", "notes", "ai", "api", "analytics"],
            PlanTier::Enterprise => &[
                "basic",
                "notes",
                "ai",
                "api",
                "analytics",
                "custom-roles",
                "sso",
            ],
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Teams without a recognised subscription tier are on the free plan.
pub fn plan_tier_from(subscription_tier: Option<&str>) -> PlanTier {
    match subscription_tier {
        Some("pro") => PlanTier::Pro,
        Some("enterprise") => PlanTier::Enterprise,
        _ => PlanTier::Free,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitKey {
    Members,
    AiCredits,
    Notes,
    #[serde(rename = "storageQuotaMB")]
    StorageQuotaMb,
}

impl LimitKey {
    pub const ALL: [LimitKey; 4] = [
        LimitKey::Members,
        LimitKey::AiCredits,
        LimitKey::Notes,
        LimitKey::StorageQuotaMb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKey::Members => "members",
            LimitKey::AiCredits => "aiCredits",
            LimitKey::Notes => "notes",
            LimitKey::StorageQuotaMb => "storageQuotaMB",
        }
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanLimit {
    Limited(u64),
    Unlimited,
}

impl PlanLimit {
    pub fn as_limited(&self) -> Option<u64> {
        match self {
            PlanLimit::Limited(n) => Some(*n),
            PlanLimit::Unlimited => None,
        }
    }
}

impl fmt::Display for PlanLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanLimit::Limited(n) => write!(f, "{}", n),
            PlanLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Unlimited goes over the wire as -1, the way billing clients expect it.
impl Serialize for PlanLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PlanLimit::Limited(n) => serializer.serialize_u64(*n),
            PlanLimit::Unlimited => serializer.serialize_i64(-1),
        }
    }
}

pub fn tier_has_feature(tier: PlanTier, feature: &str) -> bool {
    tier.features().contains(&feature)
}

const AI_CREDIT_COSTS: &[(&str, u64)] = &[
    ("gpt-4o", 10),
    ("gpt-4o-mini", 2),
    ("claude-sonnet-4-5-20250929", 8),
    ("claude-haiku-4-5-20251001", 2),
];

pub const DEFAULT_CREDIT_COST: u64 = 5;

pub fn ai_credit_cost(model: &str) -> u64 {
    AI_CREDIT_COSTS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, cost)| *cost)
        .unwrap_or(DEFAULT_CREDIT_COST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_or_missing_tier_is_free() {
        assert_eq!(plan_tier_from(None), PlanTier::Free);
        assert_eq!(plan_tier_from(Some("platinum")), PlanTier::Free);
        assert_eq!(plan_tier_from(Some("Pro")), PlanTier::Free);
        assert_eq!(plan_tier_from(Some("pro")), PlanTier::Pro);
        assert_eq!(plan_tier_from(Some("enterprise")), PlanTier::Enterprise);
    }

    #[test]
    fn test_limits_table() {
        assert_eq!(PlanTier::Free.limit(LimitKey::Members), PlanLimit::Limited(3));
        assert_eq!(PlanTier::Free.limit(LimitKey::Notes), PlanLimit::Limited(50));
        assert_eq!(PlanTier::Pro.limit(LimitKey::AiCredits), PlanLimit::Limited(5000));
        assert_eq!(PlanTier::Pro.limit(LimitKey::Notes), PlanLimit::Unlimited);
        for key in LimitKey::ALL {
            assert_eq!(PlanTier::Enterprise.limit(key), PlanLimit::Unlimited);
        }
    }

    #[test]
    fn test_features_are_cumulative() {
        assert!(tier_has_feature(PlanTier::Free, "notes"));
        assert!(!tier_has_feature(PlanTier::Free, "ai"));
        assert!(tier_has_feature(PlanTier::Pro, "analytics"));
        assert!(!tier_has_feature(PlanTier::Pro, "sso"));
        for feature in PlanTier::Pro.features() {
            assert!(tier_has_feature(PlanTier::Enterprise, feature));
        }
        assert!(tier_has_feature(PlanTier::Enterprise, "custom-roles"));
    }

    #[test]
    fn test_ai_credit_cost() {
        assert_eq!(ai_credit_cost("gpt-4o"), 10);
        assert_eq!(ai_credit_cost("claude-haiku-4-5-20251001"), 2);
        assert_eq!(ai_credit_cost("some-new-model"), DEFAULT_CREDIT_COST);
    }

    #[test]
    fn test_limit_serialization() {
        assert_eq!(
            serde_json::to_value(PlanLimit::Unlimited).unwrap(),
            serde_json::json!(-1)
        );
        assert_eq!(
            serde_json::to_value(PlanLimit::Limited(20)).unwrap(),
            serde_json::json!(20)
        );
        assert_eq!(
            serde_json::to_value(LimitKey::StorageQuotaMb).unwrap(),
            serde_json::json!("storageQuotaMB")
        );
    }
}
