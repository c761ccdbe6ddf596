#![allow(dead_code)]

use boxbook::application::booking::{BookRequest, BookingOrchestrator, BookingPolicy};
use boxbook::application::compensation::CompensationQueue;
use boxbook::domain::account::{AccountId, Amount, PaymentMethod};
use boxbook::domain::catalog::{BoxEntry, Catalog};
use boxbook::domain::clock::ManualClock;
use boxbook::domain::ports::{FundsLedger, FundsLedgerRef, ReservationStoreRef};
use chrono::{DateTime, TimeZone, Utc};
use std::io::{Error, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const HEADER: &str = "op,account,resource,party,start,hours,minutes,reservation,amount,card,cvc,phone";

pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

/// One box at 300 per hour and 5 per minute.
pub fn box1_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(vec![
            BoxEntry {
                name: "Box1".into(),
                id: 1,
                hour_rate: 300,
                minute_rate: 5,
            },
            BoxEntry {
                name: "Box2".into(),
                id: 2,
                hour_rate: 300,
                minute_rate: 5,
            },
        ])
        .unwrap(),
    )
}

pub fn orchestrator(
    store: ReservationStoreRef,
    ledger: FundsLedgerRef,
    clock: &ManualClock,
    compensations: CompensationQueue,
) -> BookingOrchestrator {
    BookingOrchestrator::new(
        box1_catalog(),
        store,
        ledger,
        Arc::new(clock.clone()),
        compensations,
        BookingPolicy::default(),
    )
}

pub async fn open_account(ledger: &dyn FundsLedger, email: &str, funds: u64) -> AccountId {
    let account = AccountId::new(email).unwrap();
    ledger
        .add_card(
            &account,
            PaymentMethod {
                card_hash: "card".into(),
                cvc_hash: "cvc".into(),
                phone_hash: "phone".into(),
            },
        )
        .await
        .unwrap();
    if funds > 0 {
        ledger.add_funds(&account, Amount::new(funds).unwrap()).await.unwrap();
    }
    account
}

pub fn book(account: &str, resource: &str, start: &str, hours: i64, minutes: i64, party: i64) -> BookRequest {
    BookRequest {
        account: account.into(),
        resource: resource.into(),
        party,
        start: start.into(),
        hours,
        minutes,
    }
}

/// Writes a command file with the standard header followed by `rows`.
pub fn command_file(rows: &[&str]) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{HEADER}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.flush()?;
    Ok(file)
}
