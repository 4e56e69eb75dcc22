use crate::model::node::LegPosition;
use crate::model::plan::PlatformConfig;

use super::ConfigError;

fn check_rate(errors: &mut Vec<ConfigError>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::RateOutOfRange {
            field: field.to_string(),
            value,
        });
    }
}

/// Check the compensation plan: rate ranges, the level table, and the
/// matched-network knobs.
pub fn check_plan(config: &PlatformConfig) -> Vec<ConfigError> {
    let plan = &config.plan;
    let mut errors = Vec::new();

    check_rate(&mut errors, "direct_sales_rate", plan.direct_sales_rate);
    check_rate(&mut errors, "binary_match_rate", plan.binary_match_rate);
    if let Some(cap) = plan.match_cap {
        if cap < 0 {
            errors.push(ConfigError::NegativeValue {
                field: "match_cap".to_string(),
                value: cap,
            });
        }
    }

    if plan.network_type.is_matched() {
        if plan.binary_match_rate == 0.0 {
            errors.push(ConfigError::MatchRateMissing {
                network_type: plan.network_type.as_str().to_string(),
            });
        }
        if let Some(position) = plan.power_leg {
            if !LegPosition::slots_for(plan.network_type).contains(&position) {
                errors.push(ConfigError::PowerLegInvalid {
                    network_type: plan.network_type.as_str().to_string(),
                    position: position.as_str().to_string(),
                });
            }
        }
    } else {
        // Unilevel pays per level; the table is the whole plan.
        if plan.levels.is_empty() {
            errors.push(ConfigError::NoLevels);
        }
        if plan.power_leg.is_some() {
            errors.push(ConfigError::PowerLegUnsupported {
                network_type: plan.network_type.as_str().to_string(),
            });
        }
    }

    let mut seen = std::collections::HashSet::new();
    for entry in &plan.levels {
        check_rate(&mut errors, &format!("levels[{}]", entry.level), entry.rate);
        if !seen.insert(entry.level) {
            errors.push(ConfigError::DuplicateLevelRate { level: entry.level });
        }
    }
    // Depth must be contiguous from 1; a gap would silently skip an
    // ancestor tier.
    let depth = plan.payout_depth();
    for level in 1..=depth {
        if !seen.contains(&level) {
            errors.push(ConfigError::MissingLevelRate { level });
        }
    }

    if let Some(fs) = &plan.fast_start {
        check_rate(&mut errors, "fast_start.rate", fs.rate);
        if fs.window_days == 0 {
            errors.push(ConfigError::FastStartWindowZero);
        }
    }

    errors
}

/// Check the withdrawal policy.
pub fn check_withdrawal(config: &PlatformConfig) -> Vec<ConfigError> {
    let w = &config.withdrawal;
    let mut errors = Vec::new();

    check_rate(&mut errors, "withdrawal.fee_percentage", w.fee_percentage);
    if w.minimum_amount < 0 {
        errors.push(ConfigError::NegativeValue {
            field: "withdrawal.minimum_amount".to_string(),
            value: w.minimum_amount,
        });
    }
    if w.fee_fixed < 0 {
        errors.push(ConfigError::NegativeValue {
            field: "withdrawal.fee_fixed".to_string(),
            value: w.fee_fixed,
        });
    }
    if let Some(max) = w.maximum_amount {
        if max < w.minimum_amount {
            errors.push(ConfigError::WithdrawalBoundsInverted);
        }
    }
    if let Some(threshold) = w.auto_approve_under {
        if threshold < 0 {
            errors.push(ConfigError::NegativeValue {
                field: "withdrawal.auto_approve_under".to_string(),
                value: threshold,
            });
        }
    }
    if w.methods.is_empty() {
        errors.push(ConfigError::NoPayoutMethods);
    }

    errors
}
