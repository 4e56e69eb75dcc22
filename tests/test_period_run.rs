use chrono::{DateTime, NaiveDate, Utc};

use mlm_engine::engine::aggregate::AggregateSummary;
use mlm_engine::engine::{Engine, EngineError};
use mlm_engine::graph::NetworkGraph;
use mlm_engine::model::bonus::{
    BonusFrequency, BonusProgram, BonusRequirement, BonusType, RequirementKind, Timeframe,
};
use mlm_engine::model::commission::CommissionStatus;
use mlm_engine::model::node::{LegPosition, NetworkType, Placement};
use mlm_engine::model::order::Order;
use mlm_engine::model::period::{Cadence, Period};
use mlm_engine::model::plan::{
    CompensationPlan, PaymentSchedule, PlatformConfig, Rank, RankBenefits, RankRequirements,
};
use mlm_engine::model::wallet::{
    PayoutMethod, WithdrawalDestination, WithdrawalSettings, WithdrawalStatus,
};
use mlm_engine::source::StaticOrders;
use mlm_engine::store::{RunStatus, Store};
use mlm_engine::validate::ConfigError;
use mlm_engine::withdraw;

const PLATFORM: &str = "acme";

// ── Builders ────────────────────────────────────────────────────────

fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

fn rank(id: &str, level: u32, requirements: RankRequirements) -> Rank {
    Rank {
        id: id.to_string(),
        name: id.to_string(),
        level,
        requirements,
        benefits: RankBenefits::default(),
        can_downgrade: true,
        is_meritorious: false,
        color: None,
    }
}

/// 10% on direct sales and on the matched leg; bronze at pv 500, silver
/// at tv 2500; one fixed bonus for builders with tv 1500.
fn config() -> PlatformConfig {
    PlatformConfig {
        platform: PLATFORM.to_string(),
        name: "Acme".to_string(),
        description: None,
        plan: CompensationPlan {
            network_type: NetworkType::Binary,
            max_levels: None,
            levels: Vec::new(),
            direct_sales_rate: 0.10,
            binary_match_rate: 0.10,
            match_cap: None,
            power_leg: None,
            fast_start: None,
            schedule: PaymentSchedule {
                calculation: Cadence::Monthly,
                payout: Cadence::Monthly,
                rank_calculation: Cadence::Monthly,
            },
        },
        ranks: vec![
            rank(
                "bronze",
                1,
                RankRequirements {
                    personal_volume: Some(500),
                    ..Default::default()
                },
            ),
            rank(
                "silver",
                2,
                RankRequirements {
                    team_volume: Some(2_500),
                    ..Default::default()
                },
            ),
        ],
        programs: vec![BonusProgram {
            id: "team-builder".to_string(),
            name: "Team Builder".to_string(),
            bonus_type: BonusType::Leadership,
            description: None,
            is_active: true,
            start_date: None,
            end_date: None,
            frequency: BonusFrequency::Monthly,
            requirements: vec![BonusRequirement {
                id: "team-volume".to_string(),
                kind: RequirementKind::TeamVolume,
                description: None,
                minimum_value: Some(1_500),
                timeframe: Some(Timeframe::CurrentPeriod),
            }],
            minimum_rank: None,
            reward_amount: Some(1_000),
            is_pool: false,
            pool_percentage: None,
            pool_distribution: None,
            max_winners_per_period: None,
            max_payout_per_person: None,
        }],
        withdrawal: WithdrawalSettings {
            minimum_amount: 100,
            maximum_amount: None,
            fee_percentage: 0.0,
            fee_fixed: 0,
            processing_days: 0,
            methods: vec![PayoutMethod::BankTransfer],
            requires_approval: false,
            auto_approve_under: None,
        },
    }
}

/// root with `a` on the left leg and `b` on the right.
fn binary_trio() -> NetworkGraph {
    let plan = config().plan;
    let mut graph = NetworkGraph::new(NetworkType::Binary);
    graph
        .place(&Placement::auto("root", "root", ts(2025, 1, 1)), &plan)
        .unwrap();
    graph
        .place(
            &Placement::manual("a", "root", "root", LegPosition::Left, ts(2025, 1, 2)),
            &plan,
        )
        .unwrap();
    graph
        .place(
            &Placement::manual("b", "root", "root", LegPosition::Right, ts(2025, 1, 3)),
            &plan,
        )
        .unwrap();
    graph
}

fn march_orders() -> StaticOrders {
    StaticOrders(vec![
        Order::new("o1", "a", 20_000, 2_000, ts(2025, 3, 5)),
        Order::new("o2", "b", 10_000, 1_000, ts(2025, 3, 8)),
    ])
}

// ── One full period ─────────────────────────────────────────────────

// March: root sees legs 2000/1000, so 1000 matches at 10% and 1000
// carries on the left. Both orders pay root a direct sale. Root clears
// silver on team volume, a and b clear bronze on their own orders, and
// root alone qualifies for the 1000 team-builder bonus.
#[test]
fn test_march_run_reports_every_phase() {
    let mut store = Store::open_in_memory().unwrap();
    let mut engine = Engine::new(config(), binary_trio());
    let mut source = march_orders();

    let period = engine.period_for(ts(2025, 3, 15));
    assert_eq!(period.key, "2025-03");

    let now = ts(2025, 4, 1);
    let report = engine.run_period(&mut store, &mut source, &period, now).unwrap();

    assert_eq!(report.platform, PLATFORM);
    assert_eq!(report.period, "2025-03");
    assert_eq!(
        report.orders,
        AggregateSummary {
            credited_orders: 2,
            orphan_orders: 0,
            out_of_window: 0,
            company_volume: 3_000,
            company_sales: 30_000,
            active_members: 3,
            total_members: 3,
        }
    );

    assert_eq!(report.commissions.total_count, 3);
    assert_eq!(report.commissions.total_amount, 3_100);
    assert_eq!(report.commissions.by_type["direct_sale"].count, 2);
    assert_eq!(report.commissions.by_type["direct_sale"].amount, 3_000);
    assert_eq!(report.commissions.by_type["binary_match"].amount, 100);

    assert_eq!(report.matches, 1);
    assert_eq!(report.carrying, 1);
    assert_eq!(report.promotions, 3);
    assert_eq!(report.downgrades, 0);
    assert_eq!(report.rank_holds, 0);
    assert_eq!(report.bonus_awards, 1);
    assert_eq!(report.pools_run, 0);
    assert_eq!(report.pool_distributed, 0);
    assert_eq!(report.sync.inserted, 3);
    assert_eq!(report.approved, 3);
    assert_eq!(report.posting.posted, 4, "3 commissions and 1 bonus");
    assert_eq!(report.posting.duplicates, 0);
    assert_eq!(report.posting.credited, 4_100);

    // The run mutates the live graph.
    assert_eq!(engine.graph.get("root").unwrap().rank, "silver");
    assert_eq!(engine.graph.get("a").unwrap().rank, "bronze");
    assert_eq!(engine.graph.get("b").unwrap().rank, "bronze");

    // And the store holds the paid rows, the match row, and the lock record.
    let paid = store
        .commissions_for_period(PLATFORM, "2025-03", Some(CommissionStatus::Paid))
        .unwrap();
    assert_eq!(paid.len(), 3);

    let matches = store.matches_for_period(PLATFORM, "2025-03").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matched_volume, 1_000);
    assert_eq!(matches[0].carry_left, 1_000);
    assert_eq!(matches[0].carry_right, 0);

    let record = store.run_record(PLATFORM, "2025-03").unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.finished_at.is_some() && record.error.is_none());

    let history = store.rank_history_for(PLATFORM, "root").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].rank_id, "silver");

    let balance = store.balance_for(PLATFORM, "root", now).unwrap();
    assert_eq!(balance.available, 4_100);
    assert_eq!(balance.total_earned, 4_100);
}

// ── Rerun ───────────────────────────────────────────────────────────

#[test]
fn test_rerunning_a_period_credits_nothing_twice() {
    let mut store = Store::open_in_memory().unwrap();
    let mut engine = Engine::new(config(), binary_trio());
    let mut source = march_orders();
    let period = Period::monthly(2025, 3).unwrap();

    engine
        .run_period(&mut store, &mut source, &period, ts(2025, 4, 1))
        .unwrap();
    let second = engine
        .run_period(&mut store, &mut source, &period, ts(2025, 4, 2))
        .unwrap();

    // The calculation reproduces itself exactly.
    assert_eq!(second.commissions.total_count, 3);
    assert_eq!(second.commissions.total_amount, 3_100);
    assert_eq!(second.matches, 1);

    // But ranks are already held and the money already moved.
    assert_eq!(second.promotions, 0);
    assert_eq!(second.downgrades, 0);
    assert_eq!(second.sync.inserted, 0);
    assert_eq!(second.sync.protected, 3, "paid rows are off limits");
    assert_eq!(second.approved, 0);
    assert_eq!(second.posting.posted, 0);
    assert_eq!(second.posting.duplicates, 1, "the bonus repost bounces");
    assert_eq!(second.posting.credited, 0);

    let balance = store.balance_for(PLATFORM, "root", ts(2025, 4, 2)).unwrap();
    assert_eq!(balance.available, 4_100, "rerun must not double-credit");
    assert_eq!(store.transactions_for(PLATFORM, "root").unwrap().len(), 4);
}

// ── Carry across periods ────────────────────────────────────────────

// April: only b orders (500 bv). Root's left leg is pure carry: totals
// are 1000/500, so 500 matches and 500 keeps carrying. Root and a lose
// their ranks on the quiet month; b re-qualifies bronze on its order.
#[test]
fn test_carry_rolls_into_april() {
    let mut store = Store::open_in_memory().unwrap();
    let mut engine = Engine::new(config(), binary_trio());

    let march = Period::monthly(2025, 3).unwrap();
    engine
        .run_period(&mut store, &mut march_orders(), &march, ts(2025, 4, 1))
        .unwrap();

    let april = Period::monthly(2025, 4).unwrap();
    let mut source = StaticOrders(vec![Order::new("o3", "b", 5_000, 500, ts(2025, 4, 10))]);
    let report = engine
        .run_period(&mut store, &mut source, &april, ts(2025, 5, 1))
        .unwrap();

    assert_eq!(report.orders.credited_orders, 1);
    assert_eq!(report.orders.company_volume, 500);
    assert_eq!(report.commissions.total_amount, 550, "500 direct + 50 match");
    assert_eq!(report.promotions, 0);
    assert_eq!(report.downgrades, 2, "root and a slip on a quiet month");
    assert_eq!(report.bonus_awards, 0);
    assert_eq!(report.posting.posted, 2);
    assert_eq!(report.posting.credited, 550);

    let matches = store.matches_for_period(PLATFORM, "2025-04").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].left_volume, 1_000, "all carry, no fresh volume");
    assert_eq!(matches[0].right_volume, 500);
    assert_eq!(matches[0].matched_volume, 500);
    assert_eq!(matches[0].carry_left, 500);
    assert_eq!(matches[0].amount, 50);

    assert_eq!(engine.graph.get("root").unwrap().rank, "none");
    assert_eq!(engine.graph.get("a").unwrap().rank, "none");
    assert_eq!(engine.graph.get("b").unwrap().rank, "bronze");

    let balance = store.balance_for(PLATFORM, "root", ts(2025, 5, 1)).unwrap();
    assert_eq!(balance.available, 4_650);
}

// ── Guard rails ─────────────────────────────────────────────────────

#[test]
fn test_concurrent_run_is_rejected() {
    let mut store = Store::open_in_memory().unwrap();
    let mut engine = Engine::new(config(), binary_trio());
    let period = Period::monthly(2025, 3).unwrap();

    // Another worker already holds the period.
    store.try_begin_run(PLATFORM, "2025-03", ts(2025, 4, 1)).unwrap();

    let err = engine
        .run_period(&mut store, &mut march_orders(), &period, ts(2025, 4, 1))
        .unwrap_err();
    match err {
        EngineError::PeriodLocked { platform, period } => {
            assert_eq!(platform, PLATFORM);
            assert_eq!(period, "2025-03");
        }
        other => panic!("Expected PeriodLocked, got: {other:?}"),
    }

    // The rejected run wrote nothing and left the foreign lock alone.
    assert!(store.commissions_for_period(PLATFORM, "2025-03", None).unwrap().is_empty());
    let record = store.run_record(PLATFORM, "2025-03").unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Running);
}

#[test]
fn test_bad_config_stops_the_run_before_money_moves() {
    let mut store = Store::open_in_memory().unwrap();
    let mut bad = config();
    bad.plan.binary_match_rate = 0.0;
    let mut engine = Engine::new(bad, binary_trio());
    let period = Period::monthly(2025, 3).unwrap();

    let err = engine
        .run_period(&mut store, &mut march_orders(), &period, ts(2025, 4, 1))
        .unwrap_err();
    match err {
        EngineError::InvalidConfig(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(
                matches!(errors[0], ConfigError::MatchRateMissing { .. }),
                "Expected MatchRateMissing, got: {:?}",
                errors[0]
            );
        }
        other => panic!("Expected InvalidConfig, got: {other:?}"),
    }

    assert!(store.commissions_for_period(PLATFORM, "2025-03", None).unwrap().is_empty());
    assert!(store.transactions_for(PLATFORM, "root").unwrap().is_empty());

    // The failed attempt is on record and the lock is free again.
    let record = store.run_record(PLATFORM, "2025-03").unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.as_deref().unwrap_or("").contains("config rejected"));

    let mut fixed = Engine::new(config(), binary_trio());
    let report = fixed
        .run_period(&mut store, &mut march_orders(), &period, ts(2025, 4, 2))
        .unwrap();
    assert_eq!(report.posting.posted, 4);
}

// ── Wallet ──────────────────────────────────────────────────────────

#[test]
fn test_earnings_flow_out_through_withdrawal() {
    let mut store = Store::open_in_memory().unwrap();
    let mut engine = Engine::new(config(), binary_trio());
    let period = Period::monthly(2025, 3).unwrap();
    engine
        .run_period(&mut store, &mut march_orders(), &period, ts(2025, 4, 1))
        .unwrap();

    let destination = WithdrawalDestination {
        method: PayoutMethod::BankTransfer,
        account: Some("ES7620770024003102575766".to_string()),
        holder: None,
        network: None,
    };
    let w = withdraw::request(
        &mut store,
        PLATFORM,
        &engine.config.withdrawal,
        "root",
        2_000,
        "EUR",
        destination,
        ts(2025, 4, 2),
    )
    .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Approved, "review is off for this platform");

    withdraw::complete(&mut store, PLATFORM, &w.id, Some("po_42".to_string()), ts(2025, 4, 3))
        .unwrap();

    let balance = store.balance_for(PLATFORM, "root", ts(2025, 4, 3)).unwrap();
    assert_eq!(balance.available, 2_100);
    assert_eq!(balance.pending, 0);
    assert_eq!(balance.total_withdrawn, 2_000);
    assert_eq!(balance.total_earned, 4_100);

    // Engine postings and the withdrawal lifecycle settle cleanly.
    assert!(store.reconcile_balances(PLATFORM).unwrap().is_empty());
}
