use std::collections::HashSet;

use crate::model::bonus::RequirementKind;
use crate::model::plan::PlatformConfig;

use super::ConfigError;

/// Check bonus programs. Anything the distributor cannot evaluate must be
/// rejected here; at runtime an unevaluatable requirement fails closed and
/// silently disqualifies everyone.
pub fn check_programs(config: &PlatformConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for program in &config.programs {
        if !seen.insert(program.id.as_str()) {
            errors.push(ConfigError::DuplicateProgramId {
                program_id: program.id.clone(),
            });
        }

        for requirement in &program.requirements {
            match requirement.kind {
                RequirementKind::Custom => {
                    errors.push(ConfigError::UnsupportedRequirement {
                        program_id: program.id.clone(),
                        requirement_id: requirement.id.clone(),
                    });
                }
                _ => {
                    if requirement.minimum_value.is_none() {
                        errors.push(ConfigError::MissingRequirementValue {
                            program_id: program.id.clone(),
                            requirement_id: requirement.id.clone(),
                        });
                    }
                }
            }
        }

        if let Some(rank_id) = &program.minimum_rank {
            if config.rank(rank_id).is_none() {
                errors.push(ConfigError::UnknownMinimumRank {
                    program_id: program.id.clone(),
                    rank_id: rank_id.clone(),
                });
            }
        }

        if program.is_pool {
            match program.pool_percentage {
                None => errors.push(ConfigError::PoolMissingPercentage {
                    program_id: program.id.clone(),
                }),
                Some(value) if !(0.0..=1.0).contains(&value) => {
                    errors.push(ConfigError::PoolPercentageOutOfRange {
                        program_id: program.id.clone(),
                        value,
                    });
                }
                Some(_) => {}
            }
        } else if program.reward_amount.is_none() {
            errors.push(ConfigError::FixedMissingReward {
                program_id: program.id.clone(),
            });
        }

        if let (Some(start), Some(end)) = (program.start_date, program.end_date) {
            if end <= start {
                errors.push(ConfigError::DateFenceInverted {
                    program_id: program.id.clone(),
                });
            }
        }
        if program.max_winners_per_period == Some(0) {
            errors.push(ConfigError::ZeroWinnerCap {
                program_id: program.id.clone(),
            });
        }
    }

    errors
}
