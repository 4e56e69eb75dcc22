use std::collections::HashMap;

use crate::model::plan::PlatformConfig;

use super::ConfigError;

/// Check the rank ladder: unique ids and levels, resolvable references,
/// sane benefit rates.
pub fn check_ranks(config: &PlatformConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    let mut by_id: HashMap<&str, &str> = HashMap::new();
    let mut by_level: HashMap<u32, &str> = HashMap::new();
    for rank in &config.ranks {
        if by_id.insert(&rank.id, &rank.id).is_some() {
            errors.push(ConfigError::DuplicateRankId {
                rank_id: rank.id.clone(),
            });
        }
        if rank.level == 0 {
            errors.push(ConfigError::RankLevelZero {
                rank_id: rank.id.clone(),
            });
        }
        if let Some(other) = by_level.insert(rank.level, &rank.id) {
            errors.push(ConfigError::DuplicateRankLevel {
                rank_id: rank.id.clone(),
                other: other.to_string(),
                level: rank.level,
            });
        }
    }

    for rank in &config.ranks {
        if let Some(needed) = &rank.requirements.rank_referrals {
            for referenced in needed.keys() {
                if config.rank(referenced).is_none() {
                    errors.push(ConfigError::UnknownRankReference {
                        rank_id: rank.id.clone(),
                        referenced: referenced.clone(),
                    });
                }
            }
        }
        if let Some(rate) = rank.benefits.commission_rate {
            if !(0.0..=1.0).contains(&rate) {
                errors.push(ConfigError::RateOutOfRange {
                    field: format!("ranks[{}].benefits.commission_rate", rank.id),
                    value: rate,
                });
            }
        }
        for program_id in &rank.benefits.unlocked_bonuses {
            if !config.programs.iter().any(|p| &p.id == program_id) {
                errors.push(ConfigError::UnknownProgramReference {
                    rank_id: rank.id.clone(),
                    program_id: program_id.clone(),
                });
            }
        }
    }

    errors
}
