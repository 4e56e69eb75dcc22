//! Withdrawal lifecycle.
//!
//! A request holds its gross amount out of the member's available balance
//! immediately; every later transition either finalizes that hold
//! (complete) or releases it (reject, cancel). Policy comes from the
//! platform's withdrawal settings, already validated at load time.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::model::wallet::{
    Withdrawal, WithdrawalDestination, WithdrawalSettings, WithdrawalStatus,
};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum WithdrawError {
    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: i64, minimum: i64 },

    #[error("amount {amount} is above the maximum of {maximum}")]
    AboveMaximum { amount: i64, maximum: i64 },

    #[error("payout method `{method}` is not offered")]
    MethodNotOffered { method: String },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("withdrawal `{id}` not found")]
    NotFound { id: String },

    #[error("withdrawal `{id}` is {status}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: String,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Submit a new request. Auto-approves when the platform doesn't require
/// review, or when the amount sits under the auto-approve threshold.
pub fn request(
    store: &mut Store,
    platform: &str,
    settings: &WithdrawalSettings,
    user_id: &str,
    amount: i64,
    currency: &str,
    destination: WithdrawalDestination,
    now: DateTime<Utc>,
) -> Result<Withdrawal, WithdrawError> {
    if amount < settings.minimum_amount {
        return Err(WithdrawError::BelowMinimum {
            amount,
            minimum: settings.minimum_amount,
        });
    }
    if let Some(maximum) = settings.maximum_amount {
        if amount > maximum {
            return Err(WithdrawError::AboveMaximum { amount, maximum });
        }
    }
    if !settings.methods.is_empty() && !settings.methods.contains(&destination.method) {
        return Err(WithdrawError::MethodNotOffered {
            method: destination.method.as_str().to_string(),
        });
    }
    let balance = store.balance_for(platform, user_id, now)?;
    if balance.available < amount {
        return Err(WithdrawError::InsufficientFunds {
            requested: amount,
            available: balance.available,
        });
    }

    let auto = !settings.requires_approval
        || settings.auto_approve_under.is_some_and(|limit| amount < limit);
    let fee = settings.fee_for(amount);
    let w = Withdrawal {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount,
        fee,
        net_amount: amount - fee,
        currency: currency.to_string(),
        destination,
        status: if auto {
            WithdrawalStatus::Approved
        } else {
            WithdrawalStatus::Requested
        },
        requested_at: now,
        decided_at: auto.then_some(now),
        decided_by: auto.then(|| "auto".to_string()),
        rejected_reason: None,
        completed_at: None,
        provider_ref: None,
    };
    store.request_withdrawal(platform, &w)?;
    println!(
        "[withdraw] {} requested {} -> {} ({})",
        user_id,
        amount,
        w.id,
        w.status.as_str()
    );
    Ok(w)
}

/// Operator approval of a pending request.
pub fn approve(
    store: &mut Store,
    platform: &str,
    id: &str,
    operator: &str,
    now: DateTime<Utc>,
) -> Result<Withdrawal, WithdrawError> {
    let mut w = load(store, platform, id)?;
    expect_status(&w, WithdrawalStatus::Requested, "approve")?;
    w.status = WithdrawalStatus::Approved;
    w.decided_at = Some(now);
    w.decided_by = Some(operator.to_string());
    store.update_withdrawal(platform, &w)?;
    Ok(w)
}

/// Operator rejection. Releases the hold back to available.
pub fn reject(
    store: &mut Store,
    platform: &str,
    id: &str,
    operator: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Withdrawal, WithdrawError> {
    let mut w = load(store, platform, id)?;
    expect_status(&w, WithdrawalStatus::Requested, "reject")?;
    w.status = WithdrawalStatus::Rejected;
    w.decided_at = Some(now);
    w.decided_by = Some(operator.to_string());
    w.rejected_reason = Some(reason.to_string());
    store.unwind_withdrawal(platform, &w, now)?;
    Ok(w)
}

/// Member-initiated cancellation. Possible until the gateway has the
/// request; releases the hold.
pub fn cancel(
    store: &mut Store,
    platform: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Withdrawal, WithdrawError> {
    let mut w = load(store, platform, id)?;
    if !matches!(
        w.status,
        WithdrawalStatus::Requested | WithdrawalStatus::Approved
    ) {
        return Err(WithdrawError::InvalidTransition {
            id: w.id,
            status: w.status.as_str().to_string(),
            action: "cancel",
        });
    }
    w.status = WithdrawalStatus::Cancelled;
    store.unwind_withdrawal(platform, &w, now)?;
    Ok(w)
}

/// Hand an approved request to the payment gateway.
pub fn begin_processing(
    store: &mut Store,
    platform: &str,
    id: &str,
    provider_ref: Option<String>,
) -> Result<Withdrawal, WithdrawError> {
    let mut w = load(store, platform, id)?;
    expect_status(&w, WithdrawalStatus::Approved, "process")?;
    w.status = WithdrawalStatus::Processing;
    w.provider_ref = provider_ref;
    store.update_withdrawal(platform, &w)?;
    Ok(w)
}

/// Gateway confirmed the payout. The hold becomes withdrawn for good.
pub fn complete(
    store: &mut Store,
    platform: &str,
    id: &str,
    provider_ref: Option<String>,
    now: DateTime<Utc>,
) -> Result<Withdrawal, WithdrawError> {
    let mut w = load(store, platform, id)?;
    if !matches!(
        w.status,
        WithdrawalStatus::Approved | WithdrawalStatus::Processing
    ) {
        return Err(WithdrawError::InvalidTransition {
            id: w.id,
            status: w.status.as_str().to_string(),
            action: "complete",
        });
    }
    w.status = WithdrawalStatus::Completed;
    w.completed_at = Some(now);
    if provider_ref.is_some() {
        w.provider_ref = provider_ref;
    }
    store.complete_withdrawal(platform, &w, now)?;
    println!("[withdraw] {} completed, {} paid out", w.id, w.net_amount);
    Ok(w)
}

fn load(store: &Store, platform: &str, id: &str) -> Result<Withdrawal, WithdrawError> {
    store
        .withdrawal(platform, id)?
        .ok_or_else(|| WithdrawError::NotFound { id: id.to_string() })
}

fn expect_status(
    w: &Withdrawal,
    expected: WithdrawalStatus,
    action: &'static str,
) -> Result<(), WithdrawError> {
    if w.status == expected {
        Ok(())
    } else {
        Err(WithdrawError::InvalidTransition {
            id: w.id.clone(),
            status: w.status.as_str().to_string(),
            action,
        })
    }
}
