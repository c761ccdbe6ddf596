use crate::domain::account::{AccountId, Amount, Balance, CreditKey, LedgerEntry, PaymentMethod};
use crate::domain::ports::{FundsLedger, ReservationStore};
use crate::domain::reservation::{NewReservation, Reservation, ReservationId, find_conflict};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

type Schedule = Arc<Mutex<Vec<Reservation>>>;

/// A thread-safe in-memory reservation store.
///
/// Reservations are grouped into one schedule per resource, each behind its own
/// `Mutex`. Creating a reservation holds that mutex across the conflict check and
/// the insert, so attempts on the same box serialize while other boxes proceed.
/// Lock order is schedule first, then the id index.
#[derive(Default)]
pub struct InMemoryReservationStore {
    next_id: AtomicU64,
    schedules: RwLock<HashMap<String, Schedule>>,
    index: RwLock<HashMap<ReservationId, String>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn schedule(&self, resource: &str) -> Schedule {
        if let Some(schedule) = self.schedules.read().await.get(resource) {
            return schedule.clone();
        }
        let mut schedules = self.schedules.write().await;
        schedules.entry(resource.to_string()).or_default().clone()
    }

    async fn resource_of(&self, id: ReservationId) -> Result<String> {
        self.index
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(BookingError::ReservationNotFound(id.0))
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn create(&self, new: NewReservation) -> Result<ReservationId> {
        let schedule = self.schedule(&new.resource).await;
        let mut rows = schedule.lock().await;

        if let Some(existing) = find_conflict(rows.iter(), &new.resource, &new.interval) {
            return Err(BookingError::AlreadyBooked {
                resource: existing.resource.clone(),
            });
        }

        let id = ReservationId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.index.write().await.insert(id, new.resource.clone());
        rows.push(Reservation::from_new(id, new));
        Ok(id)
    }

    async fn get(&self, id: ReservationId) -> Result<Reservation> {
        let resource = self.resource_of(id).await?;
        let schedule = self.schedule(&resource).await;
        let rows = schedule.lock().await;
        rows.iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(BookingError::ReservationNotFound(id.0))
    }

    async fn delete(&self, id: ReservationId) -> Result<Reservation> {
        let resource = self.resource_of(id).await?;
        let schedule = self.schedule(&resource).await;
        let mut rows = schedule.lock().await;

        // A concurrent delete may have won while we waited for the lock.
        let position = rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(BookingError::ReservationNotFound(id.0))?;
        let removed = rows.swap_remove(position);
        self.index.write().await.remove(&id);
        Ok(removed)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let schedules: Vec<Schedule> = self.schedules.read().await.values().cloned().collect();

        let mut swept = 0;
        for schedule in schedules {
            let mut rows = schedule.lock().await;
            let (expired, live): (Vec<_>, Vec<_>) =
                rows.drain(..).partition(|r| r.interval.has_ended(now));
            *rows = live;

            if !expired.is_empty() {
                let mut index = self.index.write().await;
                for reservation in &expired {
                    index.remove(&reservation.id);
                }
                swept += expired.len();
            }
        }
        Ok(swept)
    }

    async fn list_for_account(&self, account: &AccountId) -> Result<Vec<Reservation>> {
        let schedules: Vec<Schedule> = self.schedules.read().await.values().cloned().collect();

        let mut found = Vec::new();
        for schedule in schedules {
            let rows = schedule.lock().await;
            found.extend(rows.iter().filter(|r| &r.account == account).cloned());
        }
        found.sort_by_key(|r| (r.interval.start(), r.id));
        Ok(found)
    }
}

/// A thread-safe in-memory funds ledger.
///
/// Each entry sits behind its own `Mutex`, so read-modify-write cycles are
/// serialized per account and never across accounts.
#[derive(Default)]
pub struct InMemoryFundsLedger {
    entries: RwLock<HashMap<AccountId, Arc<Mutex<LedgerEntry>>>>,
}

impl InMemoryFundsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, account: &AccountId) -> Result<Arc<Mutex<LedgerEntry>>> {
        self.entries
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or_else(|| BookingError::CardNotFound(account.to_string()))
    }
}

#[async_trait]
impl FundsLedger for InMemoryFundsLedger {
    async fn add_card(&self, account: &AccountId, method: PaymentMethod) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(account) {
            return Err(BookingError::CardAlreadyExists(account.to_string()));
        }
        let entry = LedgerEntry::new(account.clone(), method);
        entries.insert(account.clone(), Arc::new(Mutex::new(entry)));
        Ok(())
    }

    async fn get_card(&self, account: &AccountId) -> Result<PaymentMethod> {
        let entry = self.entry(account).await?;
        let entry = entry.lock().await;
        Ok(entry.method.clone())
    }

    async fn pay(&self, account: &AccountId, amount: Amount) -> Result<Balance> {
        let entry = self.entry(account).await?;
        let mut entry = entry.lock().await;
        entry.debit(amount)
    }

    async fn add_funds(&self, account: &AccountId, amount: Amount) -> Result<Balance> {
        let entry = self.entry(account).await?;
        let mut entry = entry.lock().await;
        entry.credit(amount)
    }

    async fn credit_once(&self, account: &AccountId, amount: Amount, key: CreditKey) -> Result<Balance> {
        let entry = self.entry(account).await?;
        let mut entry = entry.lock().await;
        entry.credit_once(amount, key)
    }

    async fn balance(&self, account: &AccountId) -> Result<Balance> {
        let entry = self.entry(account).await?;
        let entry = entry.lock().await;
        Ok(entry.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reservation::Interval;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn new_reservation(account: &str, resource: &str, start: (u32, u32), end: (u32, u32)) -> NewReservation {
        NewReservation {
            account: AccountId::new(account).unwrap(),
            resource: resource.to_string(),
            interval: Interval::new(at(start.0, start.1), at(end.0, end.1)).unwrap(),
            charged: Amount::new(780).unwrap(),
        }
    }

    fn method() -> PaymentMethod {
        PaymentMethod {
            card_hash: "card".into(),
            cvc_hash: "cvc".into(),
            phone_hash: "phone".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryReservationStore::new();
        let id = store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();

        let found = store.get(id).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.resource, "LeninaBox");
        assert!(matches!(
            store.get(ReservationId(999)).await,
            Err(BookingError::ReservationNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_monotonic() {
        let store = InMemoryReservationStore::new();
        let first = store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();
        let second = store
            .create(new_reservation("a@x.com", "SibirskayaBox", (10, 0), (11, 0)))
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_conflict_rejected_without_insert() {
        let store = InMemoryReservationStore::new();
        store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();

        let result = store
            .create(new_reservation("b@x.com", "LeninaBox", (10, 30), (11, 30)))
            .await;
        assert!(matches!(result, Err(BookingError::AlreadyBooked { .. })));

        let account = AccountId::new("b@x.com").unwrap();
        assert!(store.list_for_account(&account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjacent_intervals_do_not_conflict() {
        let store = InMemoryReservationStore::new();
        store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();
        assert!(
            store
                .create(new_reservation("b@x.com", "LeninaBox", (11, 0), (12, 0)))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let store = InMemoryReservationStore::new();
        let id = store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();

        let removed = store.delete(id).await.unwrap();
        assert_eq!(removed.id, id);
        assert!(matches!(
            store.delete(id).await,
            Err(BookingError::ReservationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_expired_frees_the_slot() {
        let store = InMemoryReservationStore::new();
        let early = store
            .create(new_reservation("a@x.com", "LeninaBox", (10, 0), (11, 0)))
            .await
            .unwrap();
        let late = store
            .create(new_reservation("a@x.com", "LeninaBox", (12, 0), (13, 0)))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired(at(11, 0)).await.unwrap(), 1);
        assert!(store.get(early).await.is_err());
        assert!(store.get(late).await.is_ok());
        assert_eq!(store.sweep_expired(at(11, 0)).await.unwrap(), 0);
        assert_eq!(store.sweep_expired(at(12, 0) + Duration::hours(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_for_account_is_ordered() {
        let store = InMemoryReservationStore::new();
        store
            .create(new_reservation("a@x.com", "LeninaBox", (14, 0), (15, 0)))
            .await
            .unwrap();
        store
            .create(new_reservation("a@x.com", "SibirskayaBox", (9, 0), (10, 0)))
            .await
            .unwrap();
        store
            .create(new_reservation("b@x.com", "LeninaBox", (9, 0), (10, 0)))
            .await
            .unwrap();

        let account = AccountId::new("a@x.com").unwrap();
        let listed = store.list_for_account(&account).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].resource, "SibirskayaBox");
        assert_eq!(listed[1].resource, "LeninaBox");
    }

    #[tokio::test]
    async fn test_ledger_card_uniqueness() {
        let ledger = InMemoryFundsLedger::new();
        let account = AccountId::new("a@x.com").unwrap();
        ledger.add_card(&account, method()).await.unwrap();
        assert!(matches!(
            ledger.add_card(&account, method()).await,
            Err(BookingError::CardAlreadyExists(_))
        ));
        assert_eq!(ledger.get_card(&account).await.unwrap(), method());
    }

    #[tokio::test]
    async fn test_ledger_pay_and_add_funds() {
        let ledger = InMemoryFundsLedger::new();
        let account = AccountId::new("a@x.com").unwrap();
        ledger.add_card(&account, method()).await.unwrap();

        let balance = ledger.add_funds(&account, Amount::new(5000).unwrap()).await.unwrap();
        assert_eq!(balance, Balance(5000));
        let balance = ledger.pay(&account, Amount::new(1200).unwrap()).await.unwrap();
        assert_eq!(balance, Balance(3800));

        assert!(matches!(
            ledger.pay(&account, Amount::new(3801).unwrap()).await,
            Err(BookingError::InsufficientFunds { .. })
        ));
        assert_eq!(ledger.balance(&account).await.unwrap(), Balance(3800));
    }

    #[tokio::test]
    async fn test_ledger_unknown_account() {
        let ledger = InMemoryFundsLedger::new();
        let account = AccountId::new("ghost@x.com").unwrap();
        assert!(matches!(
            ledger.pay(&account, Amount::new(1).unwrap()).await,
            Err(BookingError::CardNotFound(_))
        ));
        assert!(matches!(
            ledger.add_funds(&account, Amount::new(1).unwrap()).await,
            Err(BookingError::CardNotFound(_))
        ));
        assert!(ledger.get_card(&account).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(InMemoryFundsLedger::new());
        let account = AccountId::new("a@x.com").unwrap();
        ledger.add_card(&account, method()).await.unwrap();
        ledger.add_funds(&account, Amount::new(1000).unwrap()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let account = account.clone();
            handles.push(tokio::spawn(async move {
                ledger.pay(&account, Amount::new(100).unwrap()).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 10);
        assert_eq!(ledger.balance(&account).await.unwrap(), Balance::ZERO);
    }
}
