//! Quota policy tables.
//!
//! The `policy` module holds the static configuration the quota
//! engine derives per-type quotas from: where each leave type's base
//! allotment comes from, the label shown for each type, and the
//! carry-over rule applied when no explicit rule exists.  A policy is
//! an immutable value injected into the engine so that organisations
//! can change allotments without code edits.  Policies are stored as
//! JSON and loaded with [`load_policy`].

use crate::errors::{LeaveError, LeaveResult};
use crate::models::{CarryOverRuleType, LeaveBalance, LeaveType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Source of a leave type's yearly base allotment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allotment {
    /// The balance's `initial_allowance`.
    InitialAllowance,
    /// The balance's `additional_allowance`.
    AdditionalAllowance,
    /// A fixed number of days per year.
    Fixed(f64),
}

impl Allotment {
    pub fn resolve(&self, balance: &LeaveBalance) -> f64 {
        match self {
            Allotment::InitialAllowance => balance.initial_allowance,
            Allotment::AdditionalAllowance => balance.additional_allowance,
            Allotment::Fixed(days) => *days,
        }
    }
}

/// Carry-over rule used for a leave type that has no active rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarryOverDefaults {
    pub rule_type: CarryOverRuleType,
    pub value: f64,
    pub expiry_months: u32,
}

impl Default for CarryOverDefaults {
    fn default() -> Self {
        Self {
            rule_type: CarryOverRuleType::Percentage,
            value: 50.0,
            expiry_months: 6,
        }
    }
}

/// Deserialized policy.  Entries given here override the built-in
/// tables one leave type at a time; everything else keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PolicyOverrides")]
pub struct QuotaPolicy {
    /// Base allotment per leave type.  Types missing from the map
    /// get zero days.
    pub allotments: BTreeMap<LeaveType, Allotment>,
    pub labels: BTreeMap<LeaveType, String>,
    pub carry_over: CarryOverDefaults,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PolicyOverrides {
    allotments: BTreeMap<LeaveType, Allotment>,
    labels: BTreeMap<LeaveType, String>,
    carry_over: Option<CarryOverDefaults>,
}

impl From<PolicyOverrides> for QuotaPolicy {
    fn from(overrides: PolicyOverrides) -> Self {
        let mut policy = QuotaPolicy::default();
        policy.allotments.extend(overrides.allotments);
        policy.labels.extend(overrides.labels);
        if let Some(carry_over) = overrides.carry_over {
            policy.carry_over = carry_over;
        }
        policy
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        let allotments = BTreeMap::from([
            (LeaveType::Annual, Allotment::InitialAllowance),
            (LeaveType::Recovery, Allotment::Fixed(0.0)),
            (LeaveType::Training, Allotment::Fixed(5.0)),
            (LeaveType::Sick, Allotment::Fixed(0.0)),
            (LeaveType::Maternity, Allotment::Fixed(0.0)),
            (LeaveType::Special, Allotment::Fixed(0.0)),
            (LeaveType::Unpaid, Allotment::Fixed(0.0)),
            (LeaveType::Other, Allotment::Fixed(0.0)),
        ]);
        let labels = [
            (LeaveType::Annual, "Annual leave"),
            (LeaveType::Recovery, "Recovery"),
            (LeaveType::Training, "Training"),
            (LeaveType::Sick, "Sick leave"),
            (LeaveType::Maternity, "Maternity"),
            (LeaveType::Special, "Special leave"),
            (LeaveType::Unpaid, "Unpaid leave"),
            (LeaveType::Other, "Other"),
        ]
        .into_iter()
        .map(|(t, label)| (t, label.to_string()))
        .collect();
        Self {
            allotments,
            labels,
            carry_over: CarryOverDefaults::default(),
        }
    }
}

impl QuotaPolicy {
    /// Base days granted for `leave_type` on `balance`.
    pub fn base_allotment(&self, leave_type: LeaveType, balance: &LeaveBalance) -> f64 {
        self.allotments
            .get(&leave_type)
            .map_or(0.0, |allotment| allotment.resolve(balance))
    }

    /// Display label, falling back to the type's code.
    pub fn label(&self, leave_type: LeaveType) -> String {
        self.labels
            .get(&leave_type)
            .cloned()
            .unwrap_or_else(|| leave_type.to_string())
    }

    /// Rejects negative allotments and out-of-range carry-over defaults.
    pub fn validate(&self) -> LeaveResult<()> {
        for (leave_type, allotment) in &self.allotments {
            if let Allotment::Fixed(days) = allotment {
                if !(*days >= 0.0) {
                    return Err(LeaveError::Policy(format!(
                        "{} allotment must not be negative",
                        leave_type
                    )));
                }
            }
        }
        let defaults = &self.carry_over;
        if !(defaults.value >= 0.0) {
            return Err(LeaveError::Policy("carry-over value must not be negative".into()));
        }
        if defaults.rule_type == CarryOverRuleType::Percentage && defaults.value > 100.0 {
            return Err(LeaveError::Policy(format!(
                "carry-over percentage {} exceeds 100",
                defaults.value
            )));
        }
        Ok(())
    }
}

/// Load a quota policy from a JSON file.
///
/// Allotments and labels are merged over the built-in tables, so a
/// file may override only the leave types it cares about.
pub fn load_policy(path: &Path) -> Result<QuotaPolicy> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading quota policy {:?}", path))?;
    let policy: QuotaPolicy = serde_json::from_str(&data)
        .with_context(|| format!("parsing quota policy {:?}", path))?;
    policy
        .validate()
        .with_context(|| format!("validating quota policy {:?}", path))?;
    info!(path = %path.display(), types = policy.allotments.len(), "quota policy loaded");
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn balance() -> LeaveBalance {
        serde_json::from_value(json!({
            "userId": "u1",
            "year": 2024,
            "initialAllowance": 25.0,
            "additionalAllowance": 3.0,
            "used": 0.0,
            "pending": 0.0,
            "remaining": 28.0
        }))
        .unwrap()
    }

    #[test]
    fn test_default_allotments() {
        let policy = QuotaPolicy::default();
        let balance = balance();
        assert_eq!(policy.base_allotment(LeaveType::Annual, &balance), 25.0);
        assert_eq!(policy.base_allotment(LeaveType::Training, &balance), 5.0);
        assert_eq!(policy.base_allotment(LeaveType::Recovery, &balance), 0.0);
        assert_eq!(policy.label(LeaveType::Sick), "Sick leave");
    }

    #[test]
    fn test_partial_policy_keeps_defaults() {
        let policy: QuotaPolicy = serde_json::from_value(json!({
            "allotments": {
                "ANNUAL": "initial_allowance",
                "RECOVERY": "additional_allowance",
                "TRAINING": { "fixed": 8.0 }
            }
        }))
        .unwrap();
        let balance = balance();
        assert_eq!(policy.base_allotment(LeaveType::Recovery, &balance), 3.0);
        assert_eq!(policy.base_allotment(LeaveType::Training, &balance), 8.0);
        assert_eq!(policy.base_allotment(LeaveType::Sick, &balance), 0.0);
        assert_eq!(policy.label(LeaveType::Annual), "Annual leave");
        assert_eq!(policy.carry_over.value, 50.0);
    }

    #[test]
    fn test_omitted_types_keep_builtin_allotment() {
        let policy: QuotaPolicy = serde_json::from_value(json!({
            "allotments": { "TRAINING": { "fixed": 8.0 } },
            "labels": { "TRAINING": "Courses" }
        }))
        .unwrap();
        let balance = balance();
        assert_eq!(policy.base_allotment(LeaveType::Annual, &balance), 25.0);
        assert_eq!(policy.base_allotment(LeaveType::Training, &balance), 8.0);
        assert_eq!(policy.label(LeaveType::Training), "Courses");
        assert_eq!(policy.label(LeaveType::Sick), "Sick leave");
        assert_eq!(policy.carry_over, CarryOverDefaults::default());

        let empty: QuotaPolicy = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, QuotaPolicy::default());
    }

    #[test]
    fn test_load_policy_from_file() {
        let path = std::env::temp_dir().join(format!("leave-policy-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "carryOver": { "ruleType": "FIXED", "value": 5.0, "expiryMonths": 3 } }"#)
            .unwrap();
        let policy = load_policy(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(policy.carry_over.rule_type, CarryOverRuleType::Fixed);
        assert_eq!(policy.base_allotment(LeaveType::Training, &balance()), 5.0);
        assert!(load_policy(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        assert_eq!(QuotaPolicy::default().validate(), Ok(()));

        let mut negative = QuotaPolicy::default();
        negative.allotments.insert(LeaveType::Special, Allotment::Fixed(-1.0));
        assert!(matches!(negative.validate(), Err(LeaveError::Policy(_))));

        let mut greedy = QuotaPolicy::default();
        greedy.carry_over.value = 150.0;
        assert!(greedy.validate().is_err());
        greedy.carry_over.rule_type = CarryOverRuleType::Fixed;
        assert!(greedy.validate().is_ok());
    }
}
