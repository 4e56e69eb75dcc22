//! Deterministic demo-data generator.
//!
//! Everything is derived from one seed: the same (members, periods, seed)
//! triple always yields the same forest, the same orders, and therefore the
//! same commission run. Useful for demos and for exercising a full period
//! run without a storefront.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::example;
use crate::graph::NetworkGraph;
use crate::model::node::{NetworkType, Placement, PlacementStrategy};
use crate::model::order::Order;
use crate::model::plan::PlatformConfig;
use crate::report;

// ── Options ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SimOptions {
    pub members: u32,
    pub periods: u32,
    pub seed: u64,
    pub network: NetworkType,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            members: 200,
            periods: 3,
            seed: 42,
            network: NetworkType::Binary,
        }
    }
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

// ── Generation ──────────────────────────────────────────────────────

/// Build a platform, a populated forest, and order history covering
/// monthly periods from 2025-01 onward.
pub fn generate(options: &SimOptions) -> anyhow::Result<(PlatformConfig, NetworkGraph, Vec<Order>)> {
    let mut config = match options.network {
        NetworkType::Unilevel => example::unilevel_platform(),
        _ => example::binary_platform(),
    };
    config.plan.network_type = options.network;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut graph = NetworkGraph::new(options.network);

    // Joins are staggered from 2024-10-01 into the simulated window, so
    // late recruits land inside a period and exercise fast-start.
    let enrollment_start = at(2024, 10, 1, 9);
    let enrollment_days = 92 + (options.periods as i64) * 15;

    let mut ids: Vec<String> = Vec::with_capacity(options.members as usize);
    for i in 0..options.members {
        let user_id = format!("u{:04}", i + 1);
        let joined = enrollment_start
            + Duration::days(i as i64 * enrollment_days / options.members.max(1) as i64)
            + Duration::hours((i % 12) as i64);

        let placement = if ids.is_empty() {
            Placement::auto(&user_id, &user_id, joined)
        } else {
            // Preferential attachment: early joiners sponsor more often.
            let skew: f64 = rng.random();
            let pick = ((skew * skew * ids.len() as f64) as usize).min(ids.len() - 1);
            let strategy = match options.network {
                NetworkType::Unilevel => PlacementStrategy::Balanced,
                _ if rng.random_bool(0.2) => PlacementStrategy::LeftFill,
                _ => PlacementStrategy::Balanced,
            };
            Placement::auto(&user_id, &ids[pick], joined).with_strategy(strategy)
        };
        graph
            .place(&placement, &config.plan)
            .with_context(|| format!("placing simulated member {user_id}"))?;

        // Roughly one in seven members never orders. Decided here, at
        // placement, to keep the rng stream independent of map order.
        if !ids.is_empty() && rng.random_bool(0.15) {
            if let Some(node) = graph.get_mut(&user_id) {
                node.is_active = false;
            }
        }
        ids.push(user_id);
    }

    let mut orders = Vec::new();
    let mut seq = 0u32;
    for p in 0..options.periods {
        let year = 2025 + (p / 12) as i32;
        let month = p % 12 + 1;
        for id in &ids {
            let (dormant, sponsor) = match graph.get(id) {
                Some(node) => (!node.is_active, node.sponsor_id.clone()),
                None => continue,
            };
            if dormant {
                continue;
            }
            for _ in 0..rng.random_range(0..=2) {
                seq += 1;
                let day = rng.random_range(1..=28);
                let hour = rng.random_range(8..=20);
                let total = rng.random_range(40..=400) * 100;
                let bv = total * rng.random_range(50..=70) / 100;
                let mut order =
                    Order::new(format!("o{seq:05}"), id.clone(), total, bv, at(year, month, day, hour));
                // One loyalty point per whole currency unit spent.
                order.points = total / 100;
                if let Some(sponsor) = sponsor.clone() {
                    order = order.with_referrer(sponsor);
                }
                orders.push(order);
            }
        }
    }

    Ok((config, graph, orders))
}

// ── CLI entry ───────────────────────────────────────────────────────

/// Generate a demo platform into `out_dir`: config.json, network.json and
/// orders.csv, ready for a period run.
pub fn run(out_dir: &Path, options: &SimOptions) -> anyhow::Result<()> {
    let (config, graph, orders) = generate(options)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let config_path = out_dir.join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    let network_path = out_dir.join("network.json");
    graph.save(&network_path)?;

    let orders_path = out_dir.join("orders.csv");
    let mut writer = csv::Writer::from_path(&orders_path)
        .with_context(|| format!("writing {}", orders_path.display()))?;
    for order in &orders {
        writer.serialize(order)?;
    }
    writer.flush()?;

    println!(
        "[sim] seed {}: {} members, {} orders over {} period(s) -> {}",
        options.seed,
        graph.len(),
        orders.len(),
        options.periods,
        out_dir.display()
    );
    report::network_stats(&graph).print();
    Ok(())
}
