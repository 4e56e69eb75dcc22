mod plan;
mod programs;
mod ranks;

use std::path::Path;

use thiserror::Error;

use crate::model::plan::PlatformConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate `{field}` is {value}, outside 0.0..=1.0")]
    RateOutOfRange { field: String, value: f64 },

    #[error("`{field}` is negative ({value})")]
    NegativeValue { field: String, value: i64 },

    #[error("Unilevel plan has no level rates")]
    NoLevels,

    #[error("Level rate table skips level {level}")]
    MissingLevelRate { level: u32 },

    #[error("Level {level} appears more than once in the rate table")]
    DuplicateLevelRate { level: u32 },

    #[error("Matched plan ({network_type}) has binary_match_rate 0")]
    MatchRateMissing { network_type: String },

    #[error("power_leg `{position}` is not a slot of a {network_type} network")]
    PowerLegInvalid {
        network_type: String,
        position: String,
    },

    #[error("power_leg is set but a {network_type} network has no legs")]
    PowerLegUnsupported { network_type: String },

    #[error("Fast start window is 0 days")]
    FastStartWindowZero,

    #[error("Duplicate rank id `{rank_id}`")]
    DuplicateRankId { rank_id: String },

    #[error("Ranks `{rank_id}` and `{other}` share level {level}")]
    DuplicateRankLevel {
        rank_id: String,
        other: String,
        level: u32,
    },

    #[error("Rank `{rank_id}` uses level 0, which is reserved for unranked members")]
    RankLevelZero { rank_id: String },

    #[error("Rank `{rank_id}` requires referrals at unknown rank `{referenced}`")]
    UnknownRankReference { rank_id: String, referenced: String },

    #[error("Rank `{rank_id}` unlocks unknown program `{program_id}`")]
    UnknownProgramReference { rank_id: String, program_id: String },

    #[error("Duplicate program id `{program_id}`")]
    DuplicateProgramId { program_id: String },

    #[error("Program `{program_id}` requirement `{requirement_id}` has kind `custom`, which this engine cannot evaluate")]
    UnsupportedRequirement {
        program_id: String,
        requirement_id: String,
    },

    #[error("Program `{program_id}` requirement `{requirement_id}` has no minimum_value")]
    MissingRequirementValue {
        program_id: String,
        requirement_id: String,
    },

    #[error("Program `{program_id}` gates on unknown rank `{rank_id}`")]
    UnknownMinimumRank { program_id: String, rank_id: String },

    #[error("Pool program `{program_id}` has no pool_percentage")]
    PoolMissingPercentage { program_id: String },

    #[error("Pool program `{program_id}` has pool_percentage {value}, outside 0.0..=1.0")]
    PoolPercentageOutOfRange { program_id: String, value: f64 },

    #[error("Fixed program `{program_id}` has no reward_amount")]
    FixedMissingReward { program_id: String },

    #[error("Program `{program_id}` ends before it starts")]
    DateFenceInverted { program_id: String },

    #[error("Program `{program_id}` caps winners at 0")]
    ZeroWinnerCap { program_id: String },

    #[error("Withdrawal maximum_amount is below minimum_amount")]
    WithdrawalBoundsInverted,

    #[error("Withdrawal settings allow no payout methods")]
    NoPayoutMethods,
}

/// Load and fully validate a platform config from a JSON file.
pub fn load_and_validate(path: &Path) -> Result<PlatformConfig, Vec<ConfigError>> {
    let contents = std::fs::read_to_string(path).map_err(|e| vec![ConfigError::Io(e)])?;
    let config: PlatformConfig =
        serde_json::from_str(&contents).map_err(|e| vec![ConfigError::Json(e)])?;
    validate(&config)?;
    Ok(config)
}

/// Validate a platform config, collecting all errors. A config that fails
/// here must never reach a period run.
pub fn validate(config: &PlatformConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    errors.extend(plan::check_plan(config));
    errors.extend(plan::check_withdrawal(config));
    errors.extend(ranks::check_ranks(config));
    errors.extend(programs::check_programs(config));

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// CLI entry point for the `validate` subcommand.
pub fn run(path: &Path) -> anyhow::Result<()> {
    match load_and_validate(path) {
        Ok(config) => {
            println!(
                "Config '{}' is valid. {} ranks, {} programs, {} payout levels.",
                config.platform,
                config.ranks.len(),
                config.programs.len(),
                config.plan.payout_depth(),
            );
            Ok(())
        }
        Err(errors) => {
            eprintln!("Validation failed with {} error(s):", errors.len());
            for (i, e) in errors.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, e);
            }
            std::process::exit(1);
        }
    }
}
