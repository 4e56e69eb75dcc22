use chrono::{DateTime, NaiveDate, Utc};

use mlm_engine::engine::bonus::distribute;
use mlm_engine::graph::NetworkGraph;
use mlm_engine::model::bonus::{
    BonusFrequency, BonusProgram, BonusRequirement, BonusType, PoolDistribution, RequirementKind,
    Timeframe,
};
use mlm_engine::model::node::{NetworkType, Placement};
use mlm_engine::model::period::{Cadence, Period};
use mlm_engine::model::plan::{
    CompensationPlan, PaymentSchedule, PlatformConfig, Rank, RankBenefits, RankRequirements,
};
use mlm_engine::model::wallet::WithdrawalSettings;

// ── Builders ────────────────────────────────────────────────────────

fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

fn rank(id: &str, level: u32) -> Rank {
    Rank {
        id: id.to_string(),
        name: id.to_string(),
        level,
        requirements: RankRequirements::default(),
        benefits: RankBenefits::default(),
        can_downgrade: true,
        is_meritorious: false,
        color: None,
    }
}

fn pool_program() -> BonusProgram {
    BonusProgram {
        id: "leadership-pool".to_string(),
        name: "Leadership Pool".to_string(),
        bonus_type: BonusType::Pool,
        description: None,
        is_active: true,
        start_date: None,
        end_date: None,
        frequency: BonusFrequency::Monthly,
        requirements: vec![BonusRequirement {
            id: "team-volume".to_string(),
            kind: RequirementKind::TeamVolume,
            description: None,
            minimum_value: Some(1_000),
            timeframe: Some(Timeframe::CurrentPeriod),
        }],
        minimum_rank: None,
        reward_amount: None,
        is_pool: true,
        pool_percentage: Some(0.03),
        pool_distribution: Some(PoolDistribution::Equal),
        max_winners_per_period: None,
        max_payout_per_person: None,
    }
}

fn fixed_program() -> BonusProgram {
    BonusProgram {
        id: "car-bonus".to_string(),
        name: "Car Bonus".to_string(),
        bonus_type: BonusType::Car,
        description: None,
        is_active: true,
        start_date: None,
        end_date: None,
        frequency: BonusFrequency::Monthly,
        requirements: vec![BonusRequirement {
            id: "team-volume".to_string(),
            kind: RequirementKind::TeamVolume,
            description: None,
            minimum_value: Some(1_000),
            timeframe: Some(Timeframe::CurrentPeriod),
        }],
        minimum_rank: None,
        reward_amount: Some(10_000),
        is_pool: false,
        pool_percentage: None,
        pool_distribution: None,
        max_winners_per_period: None,
        max_payout_per_person: None,
    }
}

fn config(programs: Vec<BonusProgram>) -> PlatformConfig {
    PlatformConfig {
        platform: "test-platform".to_string(),
        name: "Test Platform".to_string(),
        description: None,
        plan: CompensationPlan {
            network_type: NetworkType::Unilevel,
            max_levels: None,
            levels: Vec::new(),
            direct_sales_rate: 0.0,
            binary_match_rate: 0.0,
            match_cap: None,
            power_leg: None,
            fast_start: None,
            schedule: PaymentSchedule {
                calculation: Cadence::Monthly,
                payout: Cadence::Monthly,
                rank_calculation: Cadence::Monthly,
            },
        },
        ranks: vec![rank("bronze", 1), rank("silver", 2), rank("gold", 3)],
        programs,
        withdrawal: WithdrawalSettings {
            minimum_amount: 1_000,
            maximum_amount: None,
            fee_percentage: 0.0,
            fee_fixed: 0,
            processing_days: 0,
            methods: Vec::new(),
            requires_approval: false,
            auto_approve_under: None,
        },
    }
}

/// Flat sponsorship under root; team volume set per member.
fn graph_with_volumes(volumes: &[(&str, i64)]) -> NetworkGraph {
    let plan = config(Vec::new()).plan;
    let mut graph = NetworkGraph::new(NetworkType::Unilevel);
    graph
        .place(&Placement::auto("root", "root", ts(2025, 1, 1)), &plan)
        .unwrap();
    for (id, _) in volumes {
        if *id != "root" {
            graph
                .place(&Placement::auto(*id, "root", ts(2025, 1, 2)), &plan)
                .unwrap();
        }
    }
    for (id, volume) in volumes {
        graph.get_mut(id).unwrap().team_volume = *volume;
    }
    graph
}

fn period() -> Period {
    Period::monthly(2025, 3).unwrap()
}

// ── Eligibility gates ───────────────────────────────────────────────

#[test]
fn test_minimum_rank_gates_before_requirements() {
    let mut program = fixed_program();
    program.minimum_rank = Some("silver".to_string());
    let cfg = config(vec![program]);
    let mut graph = graph_with_volumes(&[("root", 0), ("a", 5_000), ("b", 5_000)]);
    graph.get_mut("a").unwrap().rank = "bronze".to_string();
    graph.get_mut("b").unwrap().rank = "gold".to_string();

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert_eq!(outcome.awards.len(), 1);
    assert_eq!(outcome.awards[0].user_id, "b");
    let a = outcome
        .eligibilities
        .iter()
        .find(|e| e.user_id == "a")
        .unwrap();
    assert!(!a.is_eligible);
    assert!(
        a.missing.iter().any(|m| m.contains("rank")),
        "the failed rank gate must be named: {:?}",
        a.missing
    );
}

#[test]
fn test_unlocked_bonus_short_circuits_requirements() {
    let mut program = fixed_program();
    program.minimum_rank = Some("gold".to_string());
    let mut cfg = config(vec![program]);
    // Silver normally fails the gold gate, but the rank unlocks the program.
    cfg.ranks[1].benefits.unlocked_bonuses = vec!["car-bonus".to_string()];
    let mut graph = graph_with_volumes(&[("root", 0), ("a", 0)]);
    graph.get_mut("a").unwrap().rank = "silver".to_string();

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert_eq!(outcome.awards.len(), 1);
    assert_eq!(outcome.awards[0].user_id, "a", "unlock bypasses gate and requirements");
}

#[test]
fn test_inactive_members_are_never_eligible() {
    let cfg = config(vec![fixed_program()]);
    let mut graph = graph_with_volumes(&[("root", 0), ("a", 5_000)]);
    graph.get_mut("a").unwrap().is_active = false;

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert!(outcome.awards.is_empty());
    let a = outcome
        .eligibilities
        .iter()
        .find(|e| e.user_id == "a")
        .unwrap();
    assert!(!a.is_eligible);
    assert!(a.missing.contains(&"active".to_string()));
}

#[test]
fn test_custom_requirement_fails_closed() {
    let mut program = fixed_program();
    program.requirements = vec![BonusRequirement {
        id: "external-check".to_string(),
        kind: RequirementKind::Custom,
        description: None,
        minimum_value: Some(1),
        timeframe: None,
    }];
    let cfg = config(vec![program]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 5_000)]);

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert!(outcome.awards.is_empty(), "unevaluatable requirements must not pass");
}

#[test]
fn test_program_respects_its_date_fence_and_frequency() {
    let mut fenced = fixed_program();
    fenced.end_date = Some(ts(2025, 2, 1));
    let mut annual = fixed_program();
    annual.id = "annual-bonus".to_string();
    annual.frequency = BonusFrequency::Annual;
    let cfg = config(vec![fenced, annual]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 5_000)]);

    // March: the fenced program ended in February, the annual one only
    // fires in January.
    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert!(outcome.awards.is_empty());
    assert!(outcome.eligibilities.is_empty(), "programs not due leave no trace");
}

// ── Fixed awards ────────────────────────────────────────────────────

#[test]
fn test_fixed_award_applies_the_rank_multiplier() {
    let cfg = {
        let mut cfg = config(vec![fixed_program()]);
        cfg.ranks[2].benefits.bonus_rate = Some(1.25);
        cfg
    };
    let mut graph = graph_with_volumes(&[("root", 0), ("a", 5_000), ("b", 5_000)]);
    graph.get_mut("b").unwrap().rank = "gold".to_string();

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    let a = outcome.awards.iter().find(|w| w.user_id == "a").unwrap();
    assert_eq!(a.amount, 10_000, "no multiplier without the rank benefit");
    let b = outcome.awards.iter().find(|w| w.user_id == "b").unwrap();
    assert_eq!(b.amount, 12_500);
}

#[test]
fn test_fixed_award_caps_per_person() {
    let mut program = fixed_program();
    program.max_payout_per_person = Some(4_000);
    let cfg = config(vec![program]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 5_000)]);

    let outcome = distribute(&graph, &cfg, &period(), 0, ts(2025, 4, 1));

    assert_eq!(outcome.awards[0].amount, 4_000);
}

// ── Pool splits ─────────────────────────────────────────────────────

#[test]
fn test_equal_split_hands_remainder_to_first_users() {
    let cfg = config(vec![pool_program()]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 2_000), ("b", 2_000), ("c", 2_000)]);

    // 3% of 333_467 rounds to a 10_004 pot, which splits three ways with
    // two cents of remainder.
    let outcome = distribute(&graph, &cfg, &period(), 333_467, ts(2025, 4, 1));

    let pool = &outcome.pools[0];
    assert_eq!(pool.total_pool, 10_004);
    assert_eq!(pool.total_qualified, 3);
    assert_eq!(pool.distributed_amount, 10_004, "equal split leaves no dust");
    let amounts: Vec<(String, i64)> = pool
        .participants
        .iter()
        .map(|p| (p.user_id.clone(), p.bonus_amount))
        .collect();
    assert_eq!(
        amounts,
        [
            ("a".to_string(), 3_335),
            ("b".to_string(), 3_335),
            ("c".to_string(), 3_334),
        ],
        "remainder cents go to the first members in id order"
    );
}

#[test]
fn test_volume_weighted_split_keeps_dust_in_the_pot() {
    let mut program = pool_program();
    program.pool_distribution = Some(PoolDistribution::VolumeWeighted);
    let cfg = config(vec![program]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 3_000), ("b", 7_000)]);

    // Pot 10_001; a: floor(10_001*3/10) = 3_000, b: floor(10_001*7/10) = 7_000.
    let outcome = distribute(&graph, &cfg, &period(), 333_367, ts(2025, 4, 1));

    let pool = &outcome.pools[0];
    assert_eq!(pool.total_pool, 10_001);
    assert_eq!(pool.distributed_amount, 10_000);
    assert!(pool.distributed_amount <= pool.total_pool);
    let b = pool.participants.iter().find(|p| p.user_id == "b").unwrap();
    assert_eq!(b.bonus_amount, 7_000);
    assert!((b.share_percentage - 0.7).abs() < 1e-9);
}

#[test]
fn test_ranked_split_weights_by_ladder_level() {
    let mut program = pool_program();
    program.pool_distribution = Some(PoolDistribution::Ranked);
    let cfg = config(vec![program]);
    let mut graph = graph_with_volumes(&[("root", 0), ("a", 2_000), ("b", 2_000)]);
    graph.get_mut("a").unwrap().rank = "bronze".to_string();
    graph.get_mut("b").unwrap().rank = "gold".to_string();

    // Pot 12_000, weights 1 and 3.
    let outcome = distribute(&graph, &cfg, &period(), 400_000, ts(2025, 4, 1));

    let pool = &outcome.pools[0];
    assert_eq!(pool.total_pool, 12_000);
    let a = pool.participants.iter().find(|p| p.user_id == "a").unwrap();
    let b = pool.participants.iter().find(|p| p.user_id == "b").unwrap();
    assert_eq!(a.bonus_amount, 3_000);
    assert_eq!(b.bonus_amount, 9_000);
    assert_eq!(a.rank, "bronze");
}

#[test]
fn test_max_winners_keeps_the_strongest_qualifiers() {
    let mut program = pool_program();
    program.max_winners_per_period = Some(2);
    let cfg = config(vec![program]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 2_000), ("b", 9_000), ("c", 5_000)]);

    let outcome = distribute(&graph, &cfg, &period(), 400_000, ts(2025, 4, 1));

    let pool = &outcome.pools[0];
    assert_eq!(pool.total_qualified, 2);
    let winners: Vec<&str> = pool.participants.iter().map(|p| p.user_id.as_str()).collect();
    assert_eq!(winners, ["b", "c"], "cut by metric, then listed in id order");
}

#[test]
fn test_pool_payout_cap_rebates_nothing() {
    let mut program = pool_program();
    program.max_payout_per_person = Some(4_000);
    let cfg = config(vec![program]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 2_000), ("b", 2_000)]);

    // Pot 12_000 would be 6_000 each; the cap shrinks shares and the
    // difference stays undistributed.
    let outcome = distribute(&graph, &cfg, &period(), 400_000, ts(2025, 4, 1));

    let pool = &outcome.pools[0];
    assert_eq!(pool.total_pool, 12_000);
    assert_eq!(pool.distributed_amount, 8_000);
    assert!(pool.participants.iter().all(|p| p.bonus_amount == 4_000));
    for p in &pool.participants {
        assert!((p.share_percentage - 0.5).abs() < 1e-9);
    }
}

#[test]
fn test_pool_with_no_qualifiers_still_records_the_run() {
    let cfg = config(vec![pool_program()]);
    let graph = graph_with_volumes(&[("root", 0), ("a", 10)]);

    let outcome = distribute(&graph, &cfg, &period(), 400_000, ts(2025, 4, 1));

    assert_eq!(outcome.pools.len(), 1);
    let pool = &outcome.pools[0];
    assert_eq!(pool.total_qualified, 0);
    assert_eq!(pool.distributed_amount, 0);
    assert!(pool.participants.is_empty());
    assert_eq!(pool.total_pool, 12_000, "the pot is reported even when unpaid");
}
