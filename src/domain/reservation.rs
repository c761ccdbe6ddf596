use super::account::{AccountId, Amount};
use crate::error::{BookingError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned reservation identity. Also the identifier handed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open time interval `[start, end)` with second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(BookingError::invalid("interval must end after it starts"));
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self> {
        let end = start
            .checked_add_signed(length)
            .ok_or_else(|| BookingError::invalid("booking ends out of range"))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// A reservation ending exactly when another starts does not overlap it.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

/// A booking request that has been paid for and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReservation {
    pub account: AccountId,
    pub resource: String,
    pub interval: Interval,
    /// What the account was debited for the full interval.
    pub charged: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub account: AccountId,
    pub resource: String,
    pub interval: Interval,
    pub charged: Amount,
}

impl Reservation {
    pub fn from_new(id: ReservationId, new: NewReservation) -> Self {
        Self {
            id,
            account: new.account,
            resource: new.resource,
            interval: new.interval,
            charged: new.charged,
        }
    }

    /// Share of the original charge covering the unused part of the interval.
    ///
    /// Returns `None` once the interval has ended or when the share rounds to zero.
    /// Before the interval starts the full charge is refunded.
    pub fn prorated_refund(&self, now: DateTime<Utc>) -> Result<Option<Amount>> {
        if self.interval.has_ended(now) {
            return Ok(None);
        }
        let total = Decimal::from(self.interval.length().num_seconds());
        let remaining = Decimal::from((self.interval.end() - now.max(self.interval.start())).num_seconds());
        let charged = Decimal::from(self.charged.value());

        let out_of_range = || BookingError::internal(format!("refund for booking {} is out of range", self.id));
        let share = charged
            .checked_mul(remaining)
            .and_then(|scaled| scaled.checked_div(total))
            // Very long or very expensive bookings: divide first, the share is at most `charged`.
            .or_else(|| remaining.checked_div(total)?.checked_mul(charged))
            .ok_or_else(out_of_range)?;
        let refund = share
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .ok_or_else(out_of_range)?;
        Ok(Amount::new(refund).ok())
    }
}

/// Returns the first live reservation for `resource` whose interval intersects `candidate`.
///
/// Callers must hold the store's lock for `resource` across this check and the insert
/// that follows it.
pub fn find_conflict<'a, I>(existing: I, resource: &str, candidate: &Interval) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    existing
        .into_iter()
        .find(|r| r.resource == resource && r.interval.overlaps(candidate))
}
