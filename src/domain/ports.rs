use super::account::{AccountId, Amount, Balance, CreditKey, PaymentMethod};
use super::reservation::{NewReservation, Reservation, ReservationId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Owner of the live reservations.
///
/// Implementations serialize work per resource name: the conflict check and the
/// insert in [`ReservationStore::create`] run under one lock, so two overlapping
/// requests for the same box can never both succeed.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Inserts `new` unless it overlaps a live reservation for the same resource.
    ///
    /// Fails with `AlreadyBooked` and inserts nothing on overlap.
    async fn create(&self, new: NewReservation) -> Result<ReservationId>;

    async fn get(&self, id: ReservationId) -> Result<Reservation>;

    /// Removes and returns the reservation. A second delete of the same id fails with `NotFound`.
    async fn delete(&self, id: ReservationId) -> Result<Reservation>;

    /// Deletes every reservation whose end is at or before `now`.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Live reservations of `account`, ordered by start.
    async fn list_for_account(&self, account: &AccountId) -> Result<Vec<Reservation>>;
}

/// Service of record for balances and payment methods.
///
/// Every operation is an atomic read-modify-write on one account.
#[async_trait]
pub trait FundsLedger: Send + Sync {
    /// Registers the first payment method of `account`; fails with `CardAlreadyExists` afterwards.
    async fn add_card(&self, account: &AccountId, method: PaymentMethod) -> Result<()>;

    async fn get_card(&self, account: &AccountId) -> Result<PaymentMethod>;

    async fn pay(&self, account: &AccountId, amount: Amount) -> Result<Balance>;

    async fn add_funds(&self, account: &AccountId, amount: Amount) -> Result<Balance>;

    /// Like [`FundsLedger::add_funds`], but a key that was already applied is a no-op.
    async fn credit_once(&self, account: &AccountId, amount: Amount, key: CreditKey) -> Result<Balance>;

    async fn balance(&self, account: &AccountId) -> Result<Balance>;
}

pub type ReservationStoreRef = Arc<dyn ReservationStore>;
pub type FundsLedgerRef = Arc<dyn FundsLedger>;
