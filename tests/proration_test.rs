mod common;

use boxbook::application::compensation::CompensationQueue;
use boxbook::domain::account::Balance;
use boxbook::domain::clock::ManualClock;
use boxbook::domain::ports::FundsLedger;
use boxbook::error::ErrorKind;
use boxbook::infrastructure::in_memory::{InMemoryFundsLedger, InMemoryReservationStore};
use chrono::Duration;
use common::{book, morning, open_account, orchestrator};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn expected_refund(charged: Decimal, remaining_secs: i64, total_secs: i64) -> u64 {
    (charged * Decimal::from(remaining_secs) / Decimal::from(total_secs))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap()
}

#[tokio::test]
async fn test_refund_follows_elapsed_share() {
    // 90 minutes for one person at 300/h + 5/min = 450.
    let charged = dec!(450);

    for minutes_in in [0, 20, 50, 100, 119] {
        let ledger = Arc::new(InMemoryFundsLedger::new());
        let clock = ManualClock::new(morning());
        let service = orchestrator(
            Arc::new(InMemoryReservationStore::new()),
            ledger.clone(),
            &clock,
            CompensationQueue::new(),
        );
        let account = open_account(ledger.as_ref(), "a@x.com", 1000).await;

        // Starts at 08:30, ends at 10:00.
        let receipt = service
            .book(book("a@x.com", "Box1", "2026-10-19T08:30:00Z", 1, 30, 1))
            .await
            .unwrap();
        assert_eq!(Decimal::from(receipt.charged.value()), charged);

        clock.advance(Duration::minutes(minutes_in));
        let elapsed_in_booking = (minutes_in - 30).max(0);
        let remaining = (90 - elapsed_in_booking) * 60;

        let cancel = service
            .cancel_booking("a@x.com", receipt.reservation_id.0 as i64)
            .await
            .unwrap();
        let want = expected_refund(charged, remaining, 90 * 60);
        assert_eq!(cancel.refunded, want, "canceled {minutes_in} minutes after 08:00");
        assert_eq!(ledger.balance(&account).await.unwrap(), Balance(1000 - 450 + want));
    }
}

#[tokio::test]
async fn test_cancel_after_end_is_rejected() {
    let ledger = Arc::new(InMemoryFundsLedger::new());
    let clock = ManualClock::new(morning());
    let service = orchestrator(
        Arc::new(InMemoryReservationStore::new()),
        ledger.clone(),
        &clock,
        CompensationQueue::new(),
    );
    let account = open_account(ledger.as_ref(), "a@x.com", 1000).await;

    let receipt = service
        .book(book("a@x.com", "Box1", "2026-10-19T09:00:00Z", 1, 0, 1))
        .await
        .unwrap();
    clock.advance(Duration::hours(2));

    let err = service
        .cancel_booking("a@x.com", receipt.reservation_id.0 as i64)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(ledger.balance(&account).await.unwrap(), Balance(700));
}
