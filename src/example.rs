use std::collections::BTreeMap;

use crate::model::node::{LegPosition, NetworkType};
use crate::model::period::Cadence;
use crate::model::plan::{
    CompensationPlan, FastStart, LevelRate, PaymentSchedule, PlatformConfig, Rank, RankBenefits,
    RankRequirements,
};
use crate::model::bonus::{
    BonusFrequency, BonusProgram, BonusRequirement, BonusType, PoolDistribution, RequirementKind,
    Timeframe,
};
use crate::model::wallet::{PayoutMethod, WithdrawalSettings};

/// A monthly binary platform: 10% direct sales, 10% leg matching with a
/// per-period cap, fast start, five ranks, a leadership pool and a car
/// program. Cash figures are minor units; volumes are catalog BV.
pub fn binary_platform() -> PlatformConfig {
    PlatformConfig {
        platform: "acme-binary".to_string(),
        name: "Acme Binary".to_string(),
        description: Some("Two-leg matching plan with a monthly leadership pool".to_string()),
        plan: CompensationPlan {
            network_type: NetworkType::Binary,
            max_levels: None,
            levels: Vec::new(),
            direct_sales_rate: 0.10,
            binary_match_rate: 0.10,
            match_cap: Some(500_000),
            power_leg: Some(LegPosition::Left),
            fast_start: Some(FastStart {
                rate: 0.20,
                window_days: 30,
            }),
            schedule: PaymentSchedule {
                calculation: Cadence::Monthly,
                payout: Cadence::Monthly,
                rank_calculation: Cadence::Monthly,
            },
        },
        ranks: vec![
            Rank {
                id: "bronze".to_string(),
                name: "Bronze".to_string(),
                level: 1,
                requirements: RankRequirements {
                    personal_volume: Some(100),
                    active_referrals: Some(2),
                    ..Default::default()
                },
                benefits: RankBenefits::default(),
                can_downgrade: true,
                is_meritorious: false,
                color: Some("#cd7f32".to_string()),
            },
            Rank {
                id: "silver".to_string(),
                name: "Silver".to_string(),
                level: 2,
                requirements: RankRequirements {
                    personal_volume: Some(150),
                    team_volume: Some(2_500),
                    active_referrals: Some(4),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    commission_rate: Some(0.11),
                    ..Default::default()
                },
                can_downgrade: true,
                is_meritorious: false,
                color: Some("#c0c0c0".to_string()),
            },
            Rank {
                id: "gold".to_string(),
                name: "Gold".to_string(),
                level: 3,
                requirements: RankRequirements {
                    personal_volume: Some(200),
                    team_volume: Some(10_000),
                    active_referrals: Some(6),
                    rank_referrals: Some(BTreeMap::from([("silver".to_string(), 2)])),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    commission_rate: Some(0.12),
                    bonus_rate: Some(1.10),
                    ..Default::default()
                },
                can_downgrade: true,
                is_meritorious: false,
                color: Some("#ffd700".to_string()),
            },
            Rank {
                id: "platinum".to_string(),
                name: "Platinum".to_string(),
                level: 4,
                requirements: RankRequirements {
                    personal_volume: Some(200),
                    team_volume: Some(40_000),
                    active_referrals: Some(8),
                    rank_referrals: Some(BTreeMap::from([("gold".to_string(), 2)])),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    commission_rate: Some(0.13),
                    bonus_rate: Some(1.15),
                    ..Default::default()
                },
                can_downgrade: false,
                is_meritorious: false,
                color: Some("#e5e4e2".to_string()),
            },
            Rank {
                id: "diamond".to_string(),
                name: "Diamond".to_string(),
                level: 5,
                requirements: RankRequirements {
                    personal_volume: Some(300),
                    team_volume: Some(150_000),
                    active_referrals: Some(10),
                    rank_referrals: Some(BTreeMap::from([("platinum".to_string(), 2)])),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    commission_rate: Some(0.15),
                    bonus_rate: Some(1.25),
                    unlocked_bonuses: vec!["leadership-pool".to_string()],
                },
                can_downgrade: true,
                is_meritorious: true,
                color: Some("#b9f2ff".to_string()),
            },
        ],
        programs: vec![
            BonusProgram {
                id: "leadership-pool".to_string(),
                name: "Leadership Pool".to_string(),
                bonus_type: BonusType::Pool,
                description: Some("3% of company sales split by rank".to_string()),
                is_active: true,
                start_date: None,
                end_date: None,
                frequency: BonusFrequency::Monthly,
                requirements: vec![BonusRequirement {
                    id: "team-volume".to_string(),
                    kind: RequirementKind::TeamVolume,
                    description: None,
                    minimum_value: Some(10_000),
                    timeframe: Some(Timeframe::CurrentPeriod),
                }],
                minimum_rank: Some("gold".to_string()),
                reward_amount: None,
                is_pool: true,
                pool_percentage: Some(0.03),
                pool_distribution: Some(PoolDistribution::Ranked),
                max_winners_per_period: Some(20),
                max_payout_per_person: Some(1_000_000),
            },
            BonusProgram {
                id: "car-bonus".to_string(),
                name: "Car Bonus".to_string(),
                bonus_type: BonusType::Car,
                description: Some("Fixed monthly allowance for platinum builders".to_string()),
                is_active: true,
                start_date: None,
                end_date: None,
                frequency: BonusFrequency::Monthly,
                requirements: vec![
                    BonusRequirement {
                        id: "team-volume".to_string(),
                        kind: RequirementKind::TeamVolume,
                        description: None,
                        minimum_value: Some(40_000),
                        timeframe: Some(Timeframe::CurrentPeriod),
                    },
                    BonusRequirement {
                        id: "active-referrals".to_string(),
                        kind: RequirementKind::Referrals,
                        description: None,
                        minimum_value: Some(6),
                        timeframe: Some(Timeframe::CurrentPeriod),
                    },
                ],
                minimum_rank: Some("platinum".to_string()),
                reward_amount: Some(60_000),
                is_pool: false,
                pool_percentage: None,
                pool_distribution: None,
                max_winners_per_period: None,
                max_payout_per_person: None,
            },
        ],
        withdrawal: WithdrawalSettings {
            minimum_amount: 5_000,
            maximum_amount: Some(2_000_000),
            fee_percentage: 0.02,
            fee_fixed: 100,
            processing_days: 5,
            methods: vec![PayoutMethod::Stripe, PayoutMethod::Crypto],
            requires_approval: true,
            auto_approve_under: Some(20_000),
        },
    }
}

/// A monthly unilevel platform paying five compressed levels.
pub fn unilevel_platform() -> PlatformConfig {
    PlatformConfig {
        platform: "acme-unilevel".to_string(),
        name: "Acme Unilevel".to_string(),
        description: Some("Five-level unilevel plan with active-member compression".to_string()),
        plan: CompensationPlan {
            network_type: NetworkType::Unilevel,
            max_levels: Some(5),
            levels: vec![
                LevelRate { level: 1, rate: 0.15 },
                LevelRate { level: 2, rate: 0.08 },
                LevelRate { level: 3, rate: 0.05 },
                LevelRate { level: 4, rate: 0.03 },
                LevelRate { level: 5, rate: 0.02 },
            ],
            direct_sales_rate: 0.20,
            binary_match_rate: 0.0,
            match_cap: None,
            power_leg: None,
            fast_start: Some(FastStart {
                rate: 0.25,
                window_days: 30,
            }),
            schedule: PaymentSchedule {
                calculation: Cadence::Monthly,
                payout: Cadence::Monthly,
                rank_calculation: Cadence::Monthly,
            },
        },
        ranks: vec![
            Rank {
                id: "starter".to_string(),
                name: "Starter".to_string(),
                level: 1,
                requirements: RankRequirements {
                    personal_volume: Some(50),
                    ..Default::default()
                },
                benefits: RankBenefits::default(),
                can_downgrade: true,
                is_meritorious: false,
                color: None,
            },
            Rank {
                id: "builder".to_string(),
                name: "Builder".to_string(),
                level: 2,
                requirements: RankRequirements {
                    personal_volume: Some(100),
                    team_volume: Some(1_000),
                    active_referrals: Some(3),
                    points: Some(50),
                    ..Default::default()
                },
                benefits: RankBenefits::default(),
                can_downgrade: true,
                is_meritorious: false,
                color: None,
            },
            Rank {
                id: "leader".to_string(),
                name: "Leader".to_string(),
                level: 3,
                requirements: RankRequirements {
                    personal_volume: Some(100),
                    team_volume: Some(7_500),
                    active_referrals: Some(5),
                    rank_referrals: Some(BTreeMap::from([("builder".to_string(), 2)])),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    bonus_rate: Some(1.10),
                    ..Default::default()
                },
                can_downgrade: true,
                is_meritorious: false,
                color: None,
            },
            Rank {
                id: "director".to_string(),
                name: "Director".to_string(),
                level: 4,
                requirements: RankRequirements {
                    personal_volume: Some(150),
                    team_volume: Some(30_000),
                    active_referrals: Some(8),
                    rank_referrals: Some(BTreeMap::from([("leader".to_string(), 2)])),
                    ..Default::default()
                },
                benefits: RankBenefits {
                    bonus_rate: Some(1.20),
                    ..Default::default()
                },
                can_downgrade: true,
                is_meritorious: true,
                color: None,
            },
        ],
        programs: vec![BonusProgram {
            id: "momentum-pool".to_string(),
            name: "Momentum Pool".to_string(),
            bonus_type: BonusType::Pool,
            description: Some("2% of company sales, volume weighted".to_string()),
            is_active: true,
            start_date: None,
            end_date: None,
            frequency: BonusFrequency::Monthly,
            requirements: vec![BonusRequirement {
                id: "personal-volume".to_string(),
                kind: RequirementKind::Volume,
                description: None,
                minimum_value: Some(100),
                timeframe: Some(Timeframe::CurrentPeriod),
            }],
            minimum_rank: Some("leader".to_string()),
            reward_amount: None,
            is_pool: true,
            pool_percentage: Some(0.02),
            pool_distribution: Some(PoolDistribution::VolumeWeighted),
            max_winners_per_period: None,
            max_payout_per_person: None,
        }],
        withdrawal: WithdrawalSettings {
            minimum_amount: 2_500,
            maximum_amount: None,
            fee_percentage: 0.015,
            fee_fixed: 0,
            processing_days: 3,
            methods: vec![PayoutMethod::BankTransfer, PayoutMethod::InternalWallet],
            requires_approval: false,
            auto_approve_under: None,
        },
    }
}

/// Print an example platform config JSON to stdout.
pub fn run(network: &str) -> anyhow::Result<()> {
    let config = match network {
        "unilevel" => unilevel_platform(),
        _ => binary_platform(),
    };
    let json = serde_json::to_string_pretty(&config)?;
    println!("{json}");
    Ok(())
}
