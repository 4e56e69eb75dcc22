pub mod aggregate;
pub mod bonus;
pub mod commission;
pub mod ledger;
pub mod rank;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::graph::NetworkGraph;
use crate::model::period::Period;
use crate::model::plan::PlatformConfig;
use crate::report::{self, PeriodReport};
use crate::source::{self, OrderSource, SourceError};
use crate::store::{Store, StoreError};
use crate::validate::{self, ConfigError};

use rank::RankDirection;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Another run holds the period lock. Rejected, not queued.
    #[error("period {period} on {platform} is already being calculated")]
    PeriodLocked { platform: String, period: String },

    #[error("config rejected with {} problem(s)", .0.len())]
    InvalidConfig(Vec<ConfigError>),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Calculation engine for one platform: holds the validated config and the
/// live network graph, and drives complete period runs against a store.
///
/// A run is all-or-nothing up to the posting phase: nothing is approved
/// until every calculation succeeded, and posting is replay-safe, so a
/// failed run can simply be rerun for the whole period.
pub struct Engine {
    pub config: PlatformConfig,
    pub graph: NetworkGraph,
    /// Fetch attempts beyond the first before a run gives up.
    pub max_fetch_retries: u32,
}

impl Engine {
    pub fn new(config: PlatformConfig, graph: NetworkGraph) -> Self {
        Engine {
            config,
            graph,
            max_fetch_retries: 3,
        }
    }

    /// The calculation period containing `at`, per the plan's schedule.
    pub fn period_for(&self, at: DateTime<Utc>) -> Period {
        Period::containing(self.config.plan.schedule.calculation, at)
    }

    /// Run the full pipeline for one period:
    /// 1. Take the advisory lock (concurrent runs are rejected)
    /// 2. Validate config, fetch orders with retry
    /// 3. Aggregate volumes, then commissions and ranks off one snapshot
    /// 4. Bonuses on post-evaluation ranks
    /// 5. Persist, approve, post to wallets
    ///
    /// Mutates the in-memory graph (volumes, ranks); the caller decides
    /// when to save it.
    pub fn run_period(
        &mut self,
        store: &mut Store,
        source: &mut dyn OrderSource,
        period: &Period,
        now: DateTime<Utc>,
    ) -> Result<PeriodReport, EngineError> {
        let platform = self.config.platform.clone();
        match store.try_begin_run(&platform, &period.key, now) {
            Ok(()) => {}
            Err(StoreError::PeriodLocked { platform, period }) => {
                return Err(EngineError::PeriodLocked { platform, period });
            }
            Err(e) => return Err(e.into()),
        }

        let result = self.run_locked(store, source, period, now);
        let error_text = result.as_ref().err().map(|e| e.to_string());
        if let Err(e) = store.finish_run(&platform, &period.key, error_text.as_deref(), now) {
            eprintln!("[engine] failed to release run lock for {}: {e}", period.key);
        }
        result
    }

    fn run_locked(
        &mut self,
        store: &mut Store,
        source: &mut dyn OrderSource,
        period: &Period,
        now: DateTime<Utc>,
    ) -> Result<PeriodReport, EngineError> {
        let platform = self.config.platform.clone();

        // A bad config aborts before any money moves.
        if let Err(errors) = validate::validate(&self.config) {
            return Err(EngineError::InvalidConfig(errors));
        }

        let orders = source::fetch_with_retry(source, period, self.max_fetch_retries)?;
        println!("[engine] {} orders fetched for {}", orders.len(), period.key);

        let summary = aggregate::aggregate(&mut self.graph, &orders, period);
        let carry = store.carry_for(&platform, &period.previous().key)?;

        // Both passes read the same aggregated snapshot; commissions see
        // the ranks members held entering the period.
        let (outcome, ranks) = rayon::join(
            || commission::calculate(&self.graph, &self.config, period, &orders, &carry, now),
            || rank::evaluate(&self.graph, &self.config, now),
        );

        // Rank changes land before bonuses run: a rank reached this period
        // qualifies for this period's pools.
        let mut promotions = 0;
        let mut downgrades = 0;
        for change in &ranks.changes {
            match change.direction {
                RankDirection::Promoted => promotions += 1,
                RankDirection::Downgraded => downgrades += 1,
            }
            if let Some(node) = self.graph.get_mut(&change.user_id) {
                node.rank = change.to.clone();
            }
        }

        let bonuses =
            bonus::distribute(&self.graph, &self.config, period, summary.company_sales, now);

        store.save_matches(&platform, &outcome.matches)?;
        let sync = store.sync_commissions(&platform, &period.key, &outcome.commissions)?;
        store.append_rank_history(&platform, &ranks.history)?;

        // Everything computed and persisted; only now does money move.
        let approved = store.approve_pending(&platform, &period.key)?;
        let mut posting = ledger::post_commissions(store, &platform, &period.key, now)?;
        posting.absorb(ledger::post_bonuses(store, &platform, &bonuses, now)?);

        let carrying = outcome
            .matches
            .iter()
            .filter(|m| m.carry_left != 0 || m.carry_right != 0 || m.carry_center != 0)
            .count() as u32;

        Ok(PeriodReport {
            platform,
            period: period.key.clone(),
            orders: summary,
            commissions: report::summarize(&outcome.commissions),
            matches: outcome.matches.len() as u32,
            carrying,
            promotions,
            downgrades,
            rank_holds: ranks.holds,
            bonus_awards: bonuses.awards.len() as u32,
            pools_run: bonuses.pools.len() as u32,
            pool_distributed: bonuses.pools.iter().map(|p| p.distributed_amount).sum(),
            sync,
            approved,
            posting,
            calculated_at: now,
        })
    }
}
