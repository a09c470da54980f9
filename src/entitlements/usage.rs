use super::plan::PlanLimit;
use serde::Serialize;

const WARNING_ABOVE_PCT: f64 = 70.0;
const CRITICAL_ABOVE_PCT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    Normal,
    Warning,
    Critical,
}

/// Share of `limit` used, in percent, capped at 100. Unlimited or
/// zero limits report 0.
pub fn usage_percentage(current: u64, limit: PlanLimit) -> f64 {
    match limit {
        PlanLimit::Limited(limit) if limit > 0 => {
            (current as f64 / limit as f64 * 100.0).min(100.0)
        }
        _ => 0.0,
    }
}

pub fn usage_level(percentage: f64) -> UsageLevel {
    if percentage > CRITICAL_ABOVE_PCT {
        UsageLevel::Critical
    } else if percentage > WARNING_ABOVE_PCT {
        UsageLevel::Warning
    } else {
        UsageLevel::Normal
    }
}
