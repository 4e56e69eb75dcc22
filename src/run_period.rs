//! The `run-period` subcommand: one full calculation for one platform.

use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Utc};

use crate::engine::Engine;
use crate::graph::NetworkGraph;
use crate::model::period::Period;
use crate::source::{CsvOrders, JsonOrders, OrderSource};
use crate::store::Store;
use crate::validate;

/// Load everything, run one period, save the graph back, print the report.
///
/// The period is picked in order of preference: an explicit key, a date the
/// period should contain, or the current date.
pub fn run(
    config_path: &Path,
    network_path: &Path,
    db_path: &Path,
    orders_path: &Path,
    period_key: Option<&str>,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let config = validate::load_and_validate(config_path).map_err(|errors| {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::anyhow!("invalid config {}: {joined}", config_path.display())
    })?;
    let graph = NetworkGraph::load(network_path)?;
    if graph.network_type() != config.plan.network_type {
        anyhow::bail!(
            "network file is {} but the plan expects {}",
            graph.network_type(),
            config.plan.network_type
        );
    }

    let mut store = Store::open(db_path)?;
    let mut source: Box<dyn OrderSource> = match orders_path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Box::new(CsvOrders::new(orders_path)),
        _ => Box::new(JsonOrders::new(orders_path)),
    };

    let now = Utc::now();
    let mut engine = Engine::new(config, graph);
    let period = match (period_key, date) {
        (Some(key), _) => Period::parse(key)?,
        (None, Some(date)) => engine.period_for(date.and_time(NaiveTime::MIN).and_utc()),
        (None, None) => engine.period_for(now),
    };

    let report = engine.run_period(&mut store, source.as_mut(), &period, now)?;

    // Volumes and ranks changed in memory; persist them before reporting.
    engine.graph.save(network_path)?;
    report.print();
    Ok(())
}
