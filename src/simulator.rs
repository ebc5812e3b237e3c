//! Local simulation of quota transfers and carry-overs.
//!
//! When a balance is flagged for simulation the engine answers
//! transfer and carry-over requests here instead of asking the quota
//! service.  Both simulations are pure: they read a balance snapshot
//! and the active rules and return a result without changing
//! anything.

use crate::engine::derive_quota;
use crate::models::{
    CarryOverParams, CarryOverResult, CarryOverRuleType, LeaveBalance, QuotaCarryOverRule,
    QuotaTransferResult, QuotaTransferRule, TransferQuotaParams,
};
use crate::policy::QuotaPolicy;
use chrono::{Days, Months, NaiveDate};

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to the nearest half day.
pub fn round_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// Simulates converting `request.source_amount` days of the source
/// type into the target type.
///
/// The transfer needs an applicable rule for the type pair; its
/// limits are checked in order (available days, `max_transfer_days`,
/// `max_transfer_percentage`, `minimum_remaining_days`) and the first
/// violation is reported.
pub fn simulate_transfer(
    balance: &LeaveBalance,
    rules: &[QuotaTransferRule],
    policy: &QuotaPolicy,
    request: &TransferQuotaParams,
    today: NaiveDate,
) -> QuotaTransferResult {
    let source = derive_quota(balance, policy, request.source_type);
    let target = derive_quota(balance, policy, request.target_type);
    let amount = request.source_amount;
    let reject = |message: String| QuotaTransferResult {
        success: false,
        source_amount: 0.0,
        target_amount: 0.0,
        source_remaining: source.remaining,
        target_total: target.total,
        requires_approval: false,
        applied_rule_id: None,
        message,
    };

    if request.source_type == request.target_type {
        return reject("Source and target leave types must differ.".to_string());
    }
    if !(amount > 0.0) {
        return reject("The number of days to transfer must be positive.".to_string());
    }
    let Some(rule) = rules.iter().find(|rule| {
        rule.source_type == request.source_type
            && rule.target_type == request.target_type
            && rule.is_applicable(today)
    }) else {
        return reject(format!(
            "No transfer rule allows converting {} into {}.",
            source.label, target.label
        ));
    };

    if amount > source.remaining {
        return reject(format!(
            "Insufficient quota. {} day(s) of {} remain.",
            source.remaining, source.label
        ));
    }
    if let Some(max) = rule.max_transfer_days {
        if amount > max {
            return reject(format!(
                "At most {} day(s) can be transferred under this rule.",
                max
            ));
        }
    }
    if let Some(percentage) = rule.max_transfer_percentage {
        let cap = source.remaining * percentage / 100.0;
        if amount > cap {
            return reject(format!(
                "At most {}% of the remaining {} days ({}) can be transferred.",
                percentage,
                source.label,
                round1(cap)
            ));
        }
    }
    if let Some(minimum) = rule.minimum_remaining_days {
        if source.remaining - amount < minimum {
            return reject(format!(
                "At least {} day(s) of {} must remain after the transfer.",
                minimum, source.label
            ));
        }
    }

    let target_amount = round1(amount * rule.conversion_rate);
    QuotaTransferResult {
        success: true,
        source_amount: amount,
        target_amount,
        source_remaining: source.remaining - amount,
        target_total: target.total + target_amount,
        requires_approval: rule.requires_approval,
        applied_rule_id: Some(rule.id.clone()),
        message: format!(
            "Transfer of {} day(s) of {} into {} day(s) of {} at a rate of {}.",
            amount, source.label, target_amount, target.label, rule.conversion_rate
        ),
    }
}

/// Simulates rolling the unused days of `request.leave_type` from
/// `from_year` into `to_year`.
///
/// The first active rule for the type applies; without one the
/// policy's default carry-over is used.  Eligible days are rounded to
/// the nearest half day.
pub fn simulate_carry_over(
    balance: &LeaveBalance,
    rules: &[QuotaCarryOverRule],
    policy: &QuotaPolicy,
    request: &CarryOverParams,
    today: NaiveDate,
) -> CarryOverResult {
    let quota = derive_quota(balance, policy, request.leave_type);
    let remaining = quota.remaining;

    if request.to_year <= request.from_year {
        return CarryOverResult {
            success: false,
            original_remaining: remaining,
            eligible_for_carry_over: 0.0,
            carry_over_amount: 0.0,
            expiry_date: None,
            requires_approval: false,
            message: format!(
                "Days can only be carried forward: {} does not follow {}.",
                request.to_year, request.from_year
            ),
        };
    }

    let rule = rules
        .iter()
        .find(|rule| rule.leave_type == request.leave_type && rule.is_active);
    let (rule_type, value, cap, requires_approval, expiry_date) = match rule {
        Some(rule) => (
            rule.rule_type,
            rule.value,
            rule.max_carry_over_days,
            rule.requires_approval,
            rule.expiration_days
                .and_then(|days| today.checked_add_days(Days::new(u64::from(days)))),
        ),
        None => {
            let defaults = policy.carry_over;
            (
                defaults.rule_type,
                defaults.value,
                None,
                false,
                today.checked_add_months(Months::new(defaults.expiry_months)),
            )
        }
    };

    let mut eligible = match rule_type {
        CarryOverRuleType::Percentage => remaining * value / 100.0,
        CarryOverRuleType::Fixed => remaining.min(value),
        CarryOverRuleType::Unlimited | CarryOverRuleType::Expirable => remaining,
    };
    if let Some(cap) = cap {
        eligible = eligible.min(cap);
    }
    let eligible = round_half(eligible).max(0.0);

    let message = if eligible > 0.0 {
        let mut message = format!(
            "Carry-over of {} day(s) of {} from {} to {}.",
            eligible, quota.label, request.from_year, request.to_year
        );
        if let Some(expiry) = expiry_date {
            message.push_str(&format!(" Expires on {}.", expiry.format("%d/%m/%Y")));
        }
        message
    } else {
        format!("No {} days are eligible for carry-over.", quota.label)
    };

    CarryOverResult {
        success: eligible > 0.0,
        original_remaining: remaining,
        eligible_for_carry_over: eligible,
        carry_over_amount: eligible,
        expiry_date,
        requires_approval,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeaveType, TypeDetails};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn balance() -> LeaveBalance {
        let mut details = BTreeMap::new();
        details.insert(
            LeaveType::Annual,
            TypeDetails {
                used: 10.0,
                pending: 2.0,
                ..TypeDetails::default()
            },
        );
        details.insert(
            LeaveType::Training,
            TypeDetails {
                used: 1.0,
                ..TypeDetails::default()
            },
        );
        LeaveBalance {
            user_id: "u1".into(),
            year: 2024,
            initial_allowance: 25.0,
            additional_allowance: 0.0,
            used: 11.0,
            pending: 2.0,
            remaining: 12.0,
            details_by_type: details,
            work_schedule: None,
            use_simulation: true,
        }
    }

    fn rule(rate: f64) -> QuotaTransferRule {
        QuotaTransferRule {
            id: "annual-to-training".into(),
            source_type: LeaveType::Annual,
            target_type: LeaveType::Training,
            conversion_rate: rate,
            max_transfer_days: None,
            max_transfer_percentage: None,
            minimum_remaining_days: None,
            requires_approval: false,
            is_active: true,
            start_date: None,
            end_date: None,
        }
    }

    fn transfer(amount: f64) -> TransferQuotaParams {
        TransferQuotaParams {
            user_id: "u1".into(),
            source_type: LeaveType::Annual,
            target_type: LeaveType::Training,
            source_amount: amount,
            comment: None,
        }
    }

    fn today() -> NaiveDate {
        date(2024, 11, 1)
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(3.0 * 0.5), 1.5);
        assert_eq!(round1(1.0 / 3.0), 0.3);
        assert_eq!(round1(7.0 * 0.75), 5.3);
    }

    #[test]
    fn test_transfer_applies_conversion_rate() {
        let result = simulate_transfer(&balance(), &[rule(0.5)], &QuotaPolicy::default(), &transfer(3.0), today());
        assert!(result.success, "{}", result.message);
        assert_eq!(result.target_amount, 1.5);
        assert_eq!(result.source_remaining, 10.0);
        assert_eq!(result.target_total, 6.5);
        assert_eq!(result.applied_rule_id.as_deref(), Some("annual-to-training"));
    }

    #[test]
    fn test_transfer_without_rule_is_rejected() {
        let result = simulate_transfer(&balance(), &[], &QuotaPolicy::default(), &transfer(1.0), today());
        assert!(!result.success);
        assert_eq!(result.target_amount, 0.0);
        assert!(result.message.contains("No transfer rule"));

        let expired = QuotaTransferRule {
            end_date: Some(date(2024, 10, 31)),
            ..rule(1.0)
        };
        let result = simulate_transfer(&balance(), &[expired], &QuotaPolicy::default(), &transfer(1.0), today());
        assert!(!result.success);
    }

    #[test]
    fn test_transfer_limits() {
        let policy = QuotaPolicy::default();
        let over = simulate_transfer(&balance(), &[rule(1.0)], &policy, &transfer(14.0), today());
        assert!(over.message.starts_with("Insufficient quota"));
        assert_eq!(over.source_remaining, 13.0);

        let capped = QuotaTransferRule {
            max_transfer_days: Some(2.0),
            ..rule(1.0)
        };
        assert!(!simulate_transfer(&balance(), &[capped], &policy, &transfer(3.0), today()).success);

        let percentage = QuotaTransferRule {
            max_transfer_percentage: Some(20.0),
            ..rule(1.0)
        };
        assert!(simulate_transfer(&balance(), &[percentage.clone()], &policy, &transfer(2.5), today()).success);
        assert!(!simulate_transfer(&balance(), &[percentage], &policy, &transfer(3.0), today()).success);

        let keep = QuotaTransferRule {
            minimum_remaining_days: Some(10.0),
            ..rule(1.0)
        };
        assert!(simulate_transfer(&balance(), &[keep.clone()], &policy, &transfer(3.0), today()).success);
        assert!(!simulate_transfer(&balance(), &[keep], &policy, &transfer(4.0), today()).success);

        assert!(!simulate_transfer(&balance(), &[rule(1.0)], &policy, &transfer(0.0), today()).success);
    }

    fn carry(from_year: i32, to_year: i32) -> CarryOverParams {
        CarryOverParams {
            user_id: "u1".into(),
            leave_type: LeaveType::Annual,
            from_year,
            to_year,
        }
    }

    fn carry_rule(rule_type: CarryOverRuleType, value: f64) -> QuotaCarryOverRule {
        QuotaCarryOverRule {
            id: "co".into(),
            leave_type: LeaveType::Annual,
            rule_type,
            value,
            max_carry_over_days: None,
            expiration_days: None,
            requires_approval: false,
            is_active: true,
        }
    }

    #[test]
    fn test_carry_over_default_rule() {
        let result = simulate_carry_over(&balance(), &[], &QuotaPolicy::default(), &carry(2024, 2025), today());
        assert!(result.success);
        assert_eq!(result.original_remaining, 13.0);
        assert_eq!(result.eligible_for_carry_over, 6.5);
        assert_eq!(result.expiry_date, Some(date(2025, 5, 1)));
    }

    #[test]
    fn test_carry_over_rule_types() {
        let policy = QuotaPolicy::default();
        let fixed = simulate_carry_over(&balance(), &[carry_rule(CarryOverRuleType::Fixed, 5.0)], &policy, &carry(2024, 2025), today());
        assert_eq!(fixed.carry_over_amount, 5.0);
        assert_eq!(fixed.expiry_date, None);

        let capped = QuotaCarryOverRule {
            max_carry_over_days: Some(8.0),
            ..carry_rule(CarryOverRuleType::Unlimited, 0.0)
        };
        let unlimited = simulate_carry_over(&balance(), &[capped], &policy, &carry(2024, 2025), today());
        assert_eq!(unlimited.carry_over_amount, 8.0);

        let expirable = QuotaCarryOverRule {
            expiration_days: Some(90),
            requires_approval: true,
            ..carry_rule(CarryOverRuleType::Expirable, 0.0)
        };
        let result = simulate_carry_over(&balance(), &[expirable], &policy, &carry(2024, 2025), today());
        assert_eq!(result.carry_over_amount, 13.0);
        assert_eq!(result.expiry_date, Some(date(2025, 1, 30)));
        assert!(result.requires_approval);
        assert!(result.message.contains("30/01/2025"));

        let percentage = simulate_carry_over(&balance(), &[carry_rule(CarryOverRuleType::Percentage, 30.0)], &policy, &carry(2024, 2025), today());
        assert_eq!(percentage.carry_over_amount, 4.0);
    }

    #[test]
    fn test_carry_over_must_move_forward() {
        let result = simulate_carry_over(&balance(), &[], &QuotaPolicy::default(), &carry(2024, 2024), today());
        assert!(!result.success);
        assert_eq!(result.carry_over_amount, 0.0);
    }
}
