use chrono::{DateTime, NaiveDate, Utc};

use mlm_engine::engine::aggregate::aggregate;
use mlm_engine::graph::NetworkGraph;
use mlm_engine::model::node::{LegPosition, NetworkType, Placement};
use mlm_engine::model::order::Order;
use mlm_engine::model::period::{Cadence, Period};
use mlm_engine::model::plan::{CompensationPlan, PaymentSchedule};

// ── Fixture ─────────────────────────────────────────────────────────
//
//   root
//   ├─ L: a ── L: c (inactive)
//   │       └─ R: d
//   └─ R: b
//
// a and b are sponsored by root; c and d by a.

fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc()
}

fn plan() -> CompensationPlan {
    CompensationPlan {
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
    }
}

fn graph() -> NetworkGraph {
    let plan = plan();
    let mut graph = NetworkGraph::new(NetworkType::Binary);
    graph
        .place(&Placement::auto("root", "root", ts(2025, 1, 1)), &plan)
        .unwrap();
    for (user, sponsor, parent, position) in [
        ("a", "root", "root", LegPosition::Left),
        ("b", "root", "root", LegPosition::Right),
        ("c", "a", "a", LegPosition::Left),
        ("d", "a", "a", LegPosition::Right),
    ] {
        graph
            .place(
                &Placement::manual(user, sponsor, parent, position, ts(2025, 1, 2)),
                &plan,
            )
            .unwrap();
    }
    graph.get_mut("c").unwrap().is_active = false;
    graph
}

fn orders() -> Vec<Order> {
    vec![
        Order::new("o1", "root", 10_000, 8_000, ts(2025, 3, 3)),
        Order::new("o2", "a", 20_000, 15_000, ts(2025, 3, 5)),
        Order::new("o3", "c", 30_000, 25_000, ts(2025, 3, 10)),
        Order::new("o4", "d", 5_000, 4_000, ts(2025, 3, 28)),
        Order::new("o5", "ghost", 9_999, 9_999, ts(2025, 3, 12)),
        Order::new("o6", "a", 7_000, 6_000, ts(2025, 4, 1)),
    ]
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn test_summary_counts_and_company_totals() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();

    let summary = aggregate(&mut graph, &orders(), &period);

    assert_eq!(summary.credited_orders, 4);
    assert_eq!(summary.orphan_orders, 1, "unknown buyer must be counted, not dropped");
    assert_eq!(summary.out_of_window, 1);
    assert_eq!(summary.company_volume, 52_000);
    assert_eq!(summary.company_sales, 65_000);
    assert_eq!(summary.total_members, 5);
    assert_eq!(summary.active_members, 4);
}

#[test]
fn test_personal_and_team_volume_roll_up() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();

    aggregate(&mut graph, &orders(), &period);

    let root = graph.get("root").unwrap();
    assert_eq!(root.personal_volume, 8_000);
    assert_eq!(root.team_volume, 44_000, "team volume excludes own orders");
    assert_eq!(root.team_sales, 55_000);

    let a = graph.get("a").unwrap();
    assert_eq!(a.personal_volume, 15_000);
    assert_eq!(a.team_volume, 29_000);

    let b = graph.get("b").unwrap();
    assert_eq!(b.personal_volume, 0);
    assert_eq!(b.team_volume, 0);
}

#[test]
fn test_points_land_on_the_buyer_only() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();
    let mut orders = orders();
    orders[1].points = 200; // o2, a
    orders[3].points = 40; // o4, d
    orders[5].points = 70; // o6, a, April

    aggregate(&mut graph, &orders, &period);

    assert_eq!(graph.get("a").unwrap().personal_points, 200, "o6 is out of window");
    assert_eq!(graph.get("d").unwrap().personal_points, 40);
    assert_eq!(graph.get("root").unwrap().personal_points, 0, "points never roll upward");

    aggregate(&mut graph, &orders, &period);
    assert_eq!(graph.get("a").unwrap().personal_points, 200, "a rerun must not double points");
}

#[test]
fn test_leg_volumes_split_by_slot() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();

    aggregate(&mut graph, &orders(), &period);

    let root = graph.get("root").unwrap();
    assert_eq!(root.leg_volumes.get(LegPosition::Left), 44_000);
    assert_eq!(root.leg_volumes.get(LegPosition::Right), 0);

    let a = graph.get("a").unwrap();
    assert_eq!(a.leg_volumes.get(LegPosition::Left), 25_000);
    assert_eq!(a.leg_volumes.get(LegPosition::Right), 4_000);
}

#[test]
fn test_inactive_member_still_accrues_and_flows_upward() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();

    aggregate(&mut graph, &orders(), &period);

    let c = graph.get("c").unwrap();
    assert!(!c.is_active);
    assert_eq!(c.personal_volume, 25_000);
    // c's volume reaches a and root untouched.
    assert_eq!(graph.get("a").unwrap().leg_volumes.get(LegPosition::Left), 25_000);
    assert_eq!(graph.get("root").unwrap().team_volume, 44_000);
}

#[test]
fn test_downline_and_referral_counts() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();

    aggregate(&mut graph, &orders(), &period);

    let root = graph.get("root").unwrap();
    assert_eq!(root.total_downline, 4);
    assert_eq!(root.active_downline, 3);
    assert_eq!(root.direct_referrals, 2);
    assert_eq!(root.active_referrals, 2);

    let a = graph.get("a").unwrap();
    assert_eq!(a.total_downline, 2);
    assert_eq!(a.active_downline, 1);
    assert_eq!(a.direct_referrals, 2);
    assert_eq!(a.active_referrals, 1, "inactive c must not count as active");
}

#[test]
fn test_aggregation_assigns_instead_of_accumulating() {
    let mut graph = graph();
    let period = Period::monthly(2025, 3).unwrap();
    let orders = orders();

    let first = aggregate(&mut graph, &orders, &period);
    let volumes_first: Vec<(String, i64, i64)> = graph
        .iter()
        .map(|n| (n.user_id.clone(), n.personal_volume, n.team_volume))
        .collect();

    let second = aggregate(&mut graph, &orders, &period);
    let volumes_second: Vec<(String, i64, i64)> = graph
        .iter()
        .map(|n| (n.user_id.clone(), n.personal_volume, n.team_volume))
        .collect();

    assert_eq!(first, second);
    let mut sorted_first = volumes_first;
    let mut sorted_second = volumes_second;
    sorted_first.sort();
    sorted_second.sort();
    assert_eq!(sorted_first, sorted_second, "a rerun must not double figures");
}

#[test]
fn test_empty_period_resets_previous_figures() {
    let mut graph = graph();
    aggregate(&mut graph, &orders(), &Period::monthly(2025, 3).unwrap());
    assert!(graph.get("root").unwrap().team_volume > 0);

    let summary = aggregate(&mut graph, &[], &Period::monthly(2025, 4).unwrap());

    assert_eq!(summary.credited_orders, 0);
    assert_eq!(summary.company_volume, 0);
    let root = graph.get("root").unwrap();
    assert_eq!(root.personal_volume, 0);
    assert_eq!(root.team_volume, 0, "stale figures must not leak into the next period");
}
