use chrono::{DateTime, NaiveDate, Utc};

use mlm_engine::model::wallet::{
    PayoutMethod, TxSource, WithdrawalDestination, WithdrawalSettings, WithdrawalStatus,
};
use mlm_engine::store::Store;
use mlm_engine::withdraw::{self, WithdrawError};

const PLATFORM: &str = "acme";

// ── Builders ────────────────────────────────────────────────────────

fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        .and_utc()
}

fn settings() -> WithdrawalSettings {
    WithdrawalSettings {
        minimum_amount: 1_000,
        maximum_amount: Some(100_000),
        fee_percentage: 0.02,
        fee_fixed: 100,
        processing_days: 5,
        methods: vec![PayoutMethod::BankTransfer, PayoutMethod::Crypto],
        requires_approval: true,
        auto_approve_under: None,
    }
}

fn bank() -> WithdrawalDestination {
    WithdrawalDestination {
        method: PayoutMethod::BankTransfer,
        account: Some("ES7620770024003102575766".to_string()),
        holder: Some("Ada".to_string()),
        network: None,
    }
}

/// Store with `user` holding 50_000 of earned balance.
fn funded(user: &str) -> Store {
    let mut store = Store::open_in_memory().unwrap();
    store
        .post_credit(
            PLATFORM,
            user,
            50_000,
            TxSource::Commission,
            "seed",
            "seeded earnings",
            None,
            ts(2025, 3, 1),
        )
        .unwrap();
    store
}

// ── Request validation ──────────────────────────────────────────────

#[test]
fn test_request_rejects_amounts_outside_policy() {
    let mut store = funded("u1");
    let now = ts(2025, 3, 10);

    let err = withdraw::request(&mut store, PLATFORM, &settings(), "u1", 500, "EUR", bank(), now)
        .unwrap_err();
    assert!(matches!(err, WithdrawError::BelowMinimum { minimum: 1_000, .. }));

    let err = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 200_000, "EUR", bank(), now,
    )
    .unwrap_err();
    assert!(matches!(err, WithdrawError::AboveMaximum { maximum: 100_000, .. }));
}

#[test]
fn test_request_rejects_unoffered_methods() {
    let mut store = funded("u1");
    let destination = WithdrawalDestination {
        method: PayoutMethod::Stripe,
        account: None,
        holder: None,
        network: None,
    };

    let err = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 5_000, "EUR", destination, ts(2025, 3, 10),
    )
    .unwrap_err();
    assert!(matches!(err, WithdrawError::MethodNotOffered { .. }));
}

#[test]
fn test_request_rejects_overdrafts() {
    let mut store = funded("u1");

    let err = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 60_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            WithdrawError::InsufficientFunds { requested: 60_000, available: 50_000 }
        ),
        "got: {err:?}"
    );
    // Held funds do not count as available for a second request.
    withdraw::request(&mut store, PLATFORM, &settings(), "u1", 40_000, "EUR", bank(), ts(2025, 3, 10))
        .unwrap();
    let err = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 20_000, "EUR", bank(), ts(2025, 3, 11),
    )
    .unwrap_err();
    assert!(matches!(err, WithdrawError::InsufficientFunds { available: 10_000, .. }));
}

#[test]
fn test_fee_comes_out_of_the_net() {
    let mut store = funded("u1");

    let w = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();

    // 2% of 10_000 plus the flat 100.
    assert_eq!(w.fee, 300);
    assert_eq!(w.net_amount, 9_700);
    // The hold is the gross amount.
    let balance = store.balance_for(PLATFORM, "u1", ts(2025, 3, 10)).unwrap();
    assert_eq!(balance.available, 40_000);
    assert_eq!(balance.pending, 10_000);
}

// ── Approval rules ──────────────────────────────────────────────────

#[test]
fn test_auto_approval_when_review_is_off() {
    let mut store = funded("u1");
    let mut settings = settings();
    settings.requires_approval = false;

    let w = withdraw::request(
        &mut store, PLATFORM, &settings, "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();

    assert_eq!(w.status, WithdrawalStatus::Approved);
    assert_eq!(w.decided_by.as_deref(), Some("auto"));
    assert!(w.decided_at.is_some());
}

#[test]
fn test_small_requests_skip_review() {
    let mut store = funded("u1");
    let mut settings = settings();
    settings.auto_approve_under = Some(5_000);

    let small = withdraw::request(
        &mut store, PLATFORM, &settings, "u1", 4_999, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();
    assert_eq!(small.status, WithdrawalStatus::Approved);

    let large = withdraw::request(
        &mut store, PLATFORM, &settings, "u1", 5_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();
    assert_eq!(large.status, WithdrawalStatus::Requested, "the threshold is exclusive");
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[test]
fn test_full_lifecycle_to_completion() {
    let mut store = funded("u1");
    let w = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Requested);

    let w = withdraw::approve(&mut store, PLATFORM, &w.id, "ops-1", ts(2025, 3, 11)).unwrap();
    assert_eq!(w.status, WithdrawalStatus::Approved);
    assert_eq!(w.decided_by.as_deref(), Some("ops-1"));

    let w = withdraw::begin_processing(&mut store, PLATFORM, &w.id, Some("po_123".to_string()))
        .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Processing);

    let w = withdraw::complete(&mut store, PLATFORM, &w.id, None, ts(2025, 3, 14)).unwrap();
    assert_eq!(w.status, WithdrawalStatus::Completed);
    assert_eq!(w.provider_ref.as_deref(), Some("po_123"), "the gateway ref survives");

    let balance = store.balance_for(PLATFORM, "u1", ts(2025, 3, 14)).unwrap();
    assert_eq!(balance.available, 40_000);
    assert_eq!(balance.pending, 0);
    assert_eq!(balance.total_withdrawn, 10_000);
    assert!(store.reconcile_balances(PLATFORM).unwrap().is_empty());
}

#[test]
fn test_reject_releases_the_hold() {
    let mut store = funded("u1");
    let w = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();

    let w = withdraw::reject(
        &mut store, PLATFORM, &w.id, "ops-1", "account name mismatch", ts(2025, 3, 11),
    )
    .unwrap();

    assert_eq!(w.status, WithdrawalStatus::Rejected);
    assert_eq!(w.rejected_reason.as_deref(), Some("account name mismatch"));
    let balance = store.balance_for(PLATFORM, "u1", ts(2025, 3, 11)).unwrap();
    assert_eq!(balance.available, 50_000);
    assert_eq!(balance.pending, 0);
}

#[test]
fn test_cancel_is_possible_until_processing_starts() {
    let mut store = funded("u1");
    let w = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();
    withdraw::approve(&mut store, PLATFORM, &w.id, "ops-1", ts(2025, 3, 11)).unwrap();

    // Approved is still cancellable.
    let cancelled = withdraw::cancel(&mut store, PLATFORM, &w.id, ts(2025, 3, 12)).unwrap();
    assert_eq!(cancelled.status, WithdrawalStatus::Cancelled);
    let balance = store.balance_for(PLATFORM, "u1", ts(2025, 3, 12)).unwrap();
    assert_eq!(balance.available, 50_000);

    // Processing is not.
    let w2 = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 13),
    )
    .unwrap();
    withdraw::approve(&mut store, PLATFORM, &w2.id, "ops-1", ts(2025, 3, 13)).unwrap();
    withdraw::begin_processing(&mut store, PLATFORM, &w2.id, None).unwrap();
    let err = withdraw::cancel(&mut store, PLATFORM, &w2.id, ts(2025, 3, 14)).unwrap_err();
    assert!(matches!(err, WithdrawError::InvalidTransition { action: "cancel", .. }));
}

#[test]
fn test_transitions_are_guarded() {
    let mut store = funded("u1");
    let w = withdraw::request(
        &mut store, PLATFORM, &settings(), "u1", 10_000, "EUR", bank(), ts(2025, 3, 10),
    )
    .unwrap();

    // Completing straight from requested is refused.
    let err = withdraw::complete(&mut store, PLATFORM, &w.id, None, ts(2025, 3, 11)).unwrap_err();
    assert!(matches!(err, WithdrawError::InvalidTransition { action: "complete", .. }));

    // Double approval too.
    withdraw::approve(&mut store, PLATFORM, &w.id, "ops-1", ts(2025, 3, 11)).unwrap();
    let err = withdraw::approve(&mut store, PLATFORM, &w.id, "ops-1", ts(2025, 3, 11)).unwrap_err();
    assert!(matches!(err, WithdrawError::InvalidTransition { action: "approve", .. }));

    let err = withdraw::approve(&mut store, PLATFORM, "nope", "ops-1", ts(2025, 3, 11)).unwrap_err();
    assert!(matches!(err, WithdrawError::NotFound { .. }));
}
