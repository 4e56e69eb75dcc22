//! Order ingestion.
//!
//! Sources hand the engine the completed orders of a period. File-backed
//! sources filter on `completed_at`; the aggregation pass re-checks the
//! window anyway, so a sloppy source cannot leak volume across periods.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::order::Order;
use crate::model::period::Period;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient: the source may come back. Retried with backoff.
    #[error("order source unavailable: {0}")]
    Unavailable(String),
    /// Terminal: retrying the same data cannot succeed.
    #[error("order data malformed: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

pub trait OrderSource {
    fn fetch(&mut self, period: &Period) -> Result<Vec<Order>, SourceError>;
}

/// Retry a fetch with exponential backoff. Malformed data fails
/// immediately; only unavailability retries.
pub fn fetch_with_retry(
    source: &mut dyn OrderSource,
    period: &Period,
    max_retries: u32,
) -> Result<Vec<Order>, SourceError> {
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match source.fetch(period) {
            Ok(orders) => return Ok(orders),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                eprintln!("[source] fetch attempt {} failed: {e}", attempt + 1);
                last_err = Some(e);
                if attempt < max_retries {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    std::thread::sleep(delay);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SourceError::Unavailable("no attempts made".to_string())))
}

// ── File-backed sources ─────────────────────────────────────────────

/// Orders from a CSV export with an `order_id,user_id,referrer_id,total,
/// bv,cv,points,completed_at` header. Referrer cells may be empty; exports
/// without a points column parse too.
pub struct CsvOrders {
    path: PathBuf,
}

impl CsvOrders {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvOrders { path: path.into() }
    }
}

impl OrderSource for CsvOrders {
    fn fetch(&mut self, period: &Period) -> Result<Vec<Order>, SourceError> {
        let mut rdr = csv::Reader::from_path(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let mut orders = Vec::new();
        for row in rdr.deserialize::<Order>() {
            let order =
                row.map_err(|e| SourceError::Malformed(format!("{}: {e}", self.path.display())))?;
            if period.contains(order.completed_at) {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

/// Orders from a JSON array file.
pub struct JsonOrders {
    path: PathBuf,
}

impl JsonOrders {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonOrders { path: path.into() }
    }
}

impl OrderSource for JsonOrders {
    fn fetch(&mut self, period: &Period) -> Result<Vec<Order>, SourceError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let orders: Vec<Order> = serde_json::from_str(&contents)
            .map_err(|e| SourceError::Malformed(format!("{}: {e}", self.path.display())))?;
        Ok(orders
            .into_iter()
            .filter(|o| period.contains(o.completed_at))
            .collect())
    }
}

/// In-memory source for simulations and tests. Returns its orders as-is,
/// window checks included, so strays exercise the aggregation guards.
pub struct StaticOrders(pub Vec<Order>);

impl OrderSource for StaticOrders {
    fn fetch(&mut self, _period: &Period) -> Result<Vec<Order>, SourceError> {
        Ok(self.0.clone())
    }
}
