use super::compensation::CompensationQueue;
use crate::domain::account::{AccountId, Amount, Balance, CreditKey};
use crate::domain::catalog::{BoxEntry, Catalog};
use crate::domain::clock::ClockRef;
use crate::domain::ports::{FundsLedgerRef, ReservationStoreRef};
use crate::domain::reservation::{Interval, NewReservation, Reservation, ReservationId};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info, warn};

/// A booking request as it arrives from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRequest {
    pub account: String,
    pub resource: String,
    pub party: i64,
    /// RFC 3339 start instant.
    pub start: String,
    pub hours: i64,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingReceipt {
    pub reservation_id: ReservationId,
    pub charged: Amount,
    pub balance: Balance,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelReceipt {
    pub refunded: u64,
    pub balance: Balance,
    pub success: bool,
}

/// Limits applied to every booking attempt.
#[derive(Debug, Clone, Copy)]
pub struct BookingPolicy {
    pub max_party: u64,
    /// Deadline for ledger and store calls made on the caller's behalf.
    pub request_timeout: StdDuration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            max_party: 4,
            request_timeout: StdDuration::from_secs(5),
        }
    }
}

/// A request that passed validation and has been priced.
#[derive(Debug, Clone)]
struct PricedOrder {
    account: AccountId,
    resource: String,
    interval: Interval,
    amount: Amount,
}

/// Coordinates the funds ledger and the reservation store for book and cancel.
///
/// Booking runs validate, price, debit and then reserve. The debit always
/// completes before a reservation is attempted. When the reservation fails
/// after a successful debit the debit is credited back before the error is
/// returned. Debit and reserve run together on a detached task bounded by the
/// payment deadline, so dropping the caller's future cannot abandon them half way.
#[derive(Clone)]
pub struct BookingOrchestrator {
    catalog: Arc<Catalog>,
    store: ReservationStoreRef,
    ledger: FundsLedgerRef,
    clock: ClockRef,
    compensations: CompensationQueue,
    policy: BookingPolicy,
}

impl BookingOrchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        store: ReservationStoreRef,
        ledger: FundsLedgerRef,
        clock: ClockRef,
        compensations: CompensationQueue,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            ledger,
            clock,
            compensations,
            policy,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn compensations(&self) -> &CompensationQueue {
        &self.compensations
    }

    /// Catalog entries, ordered by name.
    pub fn list_boxes(&self) -> Vec<BoxEntry> {
        self.catalog.entries().cloned().collect()
    }

    pub async fn list_bookings(&self, account: &str) -> Result<Vec<Reservation>> {
        let account = AccountId::new(account)?;
        self.with_deadline("list bookings", self.store.list_for_account(&account))
            .await
    }

    pub async fn book(&self, request: BookRequest) -> Result<BookingReceipt> {
        let order = self.validate(&request)?;
        info!(
            account = %order.account,
            resource = %order.resource,
            start = %order.interval.start(),
            end = %order.interval.end(),
            amount = %order.amount,
            "booking a box"
        );

        // Detached: once the task starts, dropping the caller cannot strand a debit.
        let saga = self.clone();
        let booking = tokio::spawn(async move { saga.pay_and_reserve(order).await });
        booking
            .await
            .map_err(|err| BookingError::internal(format!("booking task failed: {err}")))?
    }

    async fn pay_and_reserve(&self, order: PricedOrder) -> Result<BookingReceipt> {
        let balance = self
            .with_deadline("payment", self.ledger.pay(&order.account, order.amount))
            .await
            .inspect_err(|err| {
                warn!(account = %order.account, amount = %order.amount, error = %err, "payment for booking refused");
            })?;
        self.reserve_or_compensate(order, balance).await
    }

    async fn reserve_or_compensate(&self, order: PricedOrder, balance: Balance) -> Result<BookingReceipt> {
        let saga_id: u64 = rand::random();
        let new = NewReservation {
            account: order.account.clone(),
            resource: order.resource.clone(),
            interval: order.interval,
            charged: order.amount,
        };

        let reason = match self.store.create(new).await {
            Ok(reservation_id) => {
                info!(account = %order.account, %reservation_id, %balance, "box booked");
                return Ok(BookingReceipt {
                    reservation_id,
                    charged: order.amount,
                    balance,
                    success: true,
                });
            }
            Err(err) => err,
        };

        warn!(account = %order.account, resource = %order.resource, error = %reason, "reservation failed after payment, reversing debit");
        match self
            .compensations
            .credit_or_enqueue(
                self.ledger.as_ref(),
                &order.account,
                order.amount,
                CreditKey::BookingReversal(saga_id),
            )
            .await
        {
            Ok(restored) => {
                info!(account = %order.account, balance = %restored, "debit reversed");
                Err(reason)
            }
            Err(escalated) => {
                error!(account = %order.account, error = %escalated, "debit reversal failed");
                Err(escalated)
            }
        }
    }

    pub async fn cancel_booking(&self, account: &str, reservation_id: i64) -> Result<CancelReceipt> {
        let account = AccountId::new(account)?;
        let id = u64::try_from(reservation_id)
            .ok()
            .filter(|id| *id > 0)
            .map(ReservationId)
            .ok_or_else(|| BookingError::invalid("booking ID is required"))?;

        let reservation = self.with_deadline("lookup", self.store.get(id)).await?;
        if reservation.account != account {
            warn!(%account, reservation_id = %id, "cancel refused, booking belongs to another user");
            return Err(BookingError::NotYourBooking(id.0));
        }

        let now = self.clock.now();
        if reservation.interval.has_ended(now) {
            return Err(BookingError::BookingExpired(id.0));
        }
        let refund = reservation.prorated_refund(now)?;

        let saga = self.clone();
        let finish = tokio::spawn(async move { saga.delete_and_refund(account, id, refund).await });
        finish
            .await
            .map_err(|err| BookingError::internal(format!("cancel task failed: {err}")))?
    }

    async fn delete_and_refund(
        &self,
        account: AccountId,
        id: ReservationId,
        refund: Option<Amount>,
    ) -> Result<CancelReceipt> {
        // Only the caller that actually deletes the row gets to refund it.
        self.store.delete(id).await?;

        let Some(refund) = refund else {
            let balance = self.ledger.balance(&account).await?;
            info!(%account, reservation_id = %id, "booking canceled, nothing to refund");
            return Ok(CancelReceipt {
                refunded: 0,
                balance,
                success: true,
            });
        };

        let balance = self
            .compensations
            .credit_or_enqueue(self.ledger.as_ref(), &account, refund, CreditKey::Refund(id.0))
            .await?;
        info!(%account, reservation_id = %id, %refund, %balance, "booking canceled and refunded");
        Ok(CancelReceipt {
            refunded: refund.value(),
            balance,
            success: true,
        })
    }

    fn validate(&self, request: &BookRequest) -> Result<PricedOrder> {
        if request.resource.trim().is_empty() {
            return Err(BookingError::invalid("box name is required"));
        }
        self.catalog.get(&request.resource)?;
        let account = AccountId::new(request.account.as_str())?;

        let party = u64::try_from(request.party)
            .ok()
            .filter(|p| (1..=self.policy.max_party).contains(p))
            .ok_or_else(|| {
                BookingError::invalid(format!(
                    "party size must be between 1 and {}",
                    self.policy.max_party
                ))
            })?;

        let start = parse_start(&request.start)?;
        if start < self.clock.now() {
            return Err(BookingError::invalid("start time is in the past"));
        }

        let hours = u64::try_from(request.hours).map_err(|_| BookingError::invalid("hours must not be negative"))?;
        let minutes =
            u64::try_from(request.minutes).map_err(|_| BookingError::invalid("minutes must not be negative"))?;
        let length = i64::try_from(hours)
            .ok()
            .zip(i64::try_from(minutes).ok())
            .and_then(|(h, m)| Duration::try_hours(h)?.checked_add(&Duration::try_minutes(m)?))
            .filter(|d| *d > Duration::zero())
            .ok_or_else(|| BookingError::invalid("duration must be positive"))?;
        let interval = Interval::starting_at(start, length)?;

        let amount = self.catalog.price(&request.resource, hours, minutes, party)?;
        Ok(PricedOrder {
            account,
            resource: request.resource.clone(),
            interval,
            amount,
        })
    }

    async fn with_deadline<T>(&self, step: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.policy.request_timeout, call)
            .await
            .map_err(|_| BookingError::Canceled(format!("{step} timed out")))?
    }
}

fn parse_start(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|err| BookingError::invalid(format!("invalid start time '{text}': {err}")))
}
