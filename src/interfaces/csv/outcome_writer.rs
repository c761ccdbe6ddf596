use crate::application::booking::{BookingReceipt, CancelReceipt};
use crate::application::payments::CardOnFile;
use crate::domain::account::Balance;
use crate::domain::catalog::BoxEntry;
use crate::domain::reservation::Reservation;
use crate::error::{BookingError, Result};
use serde::Serialize;
use std::io::Write;

/// One output row. Columns that do not apply to an operation stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub op: String,
    pub account: String,
    pub status: String,
    pub reservation: Option<u64>,
    pub resource: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub amount: Option<u64>,
    pub balance: Option<u64>,
    pub refunded: Option<u64>,
    pub card_hash: Option<String>,
    pub phone_hash: Option<String>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn ok(op: &str, account: &str) -> Self {
        Self {
            op: op.to_string(),
            account: account.to_string(),
            status: "ok".to_string(),
            ..Self::default()
        }
    }

    pub fn failed(op: &str, account: &str, error: &BookingError) -> Self {
        Self {
            op: op.to_string(),
            account: account.to_string(),
            status: error.kind().to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = Some(balance.value());
        self
    }

    pub fn card(account: &str, card: CardOnFile, balance: Balance) -> Self {
        Self {
            card_hash: Some(card.card_hash),
            phone_hash: Some(card.phone_hash),
            ..Self::ok("get_card", account).with_balance(balance)
        }
    }

    pub fn booked(account: &str, receipt: &BookingReceipt) -> Self {
        Self {
            reservation: Some(receipt.reservation_id.0),
            amount: Some(receipt.charged.value()),
            balance: Some(receipt.balance.value()),
            ..Self::ok("book", account)
        }
    }

    pub fn canceled(account: &str, reservation: i64, receipt: &CancelReceipt) -> Self {
        Self {
            reservation: u64::try_from(reservation).ok(),
            balance: Some(receipt.balance.value()),
            refunded: Some(receipt.refunded),
            ..Self::ok("cancel", account)
        }
    }

    pub fn listed(reservation: &Reservation) -> Self {
        Self {
            reservation: Some(reservation.id.0),
            resource: Some(reservation.resource.clone()),
            start: Some(reservation.interval.start().to_rfc3339()),
            end: Some(reservation.interval.end().to_rfc3339()),
            amount: Some(reservation.charged.value()),
            ..Self::ok("list", reservation.account.as_str())
        }
    }

    pub fn catalog_entry(entry: &BoxEntry) -> Self {
        Self {
            reservation: u64::try_from(entry.id).ok(),
            resource: Some(entry.name.clone()),
            amount: Some(entry.hour_rate),
            ..Self::ok("boxes", "")
        }
    }
}

/// Writes outcomes as CSV, header first, flushing after every command.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(sink),
        }
    }

    pub fn write_all<I>(&mut self, outcomes: I) -> Result<()>
    where
        I: IntoIterator<Item = Outcome>,
    {
        for outcome in outcomes {
            self.writer.serialize(outcome)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| BookingError::internal(format!("flushing output: {}", err.error())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountId, Amount};
    use crate::domain::reservation::{Interval, ReservationId};
    use chrono::{TimeZone, Utc};

    fn render(outcomes: Vec<Outcome>) -> String {
        let mut writer = OutcomeWriter::new(Vec::new());
        writer.write_all(outcomes).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_header_and_success_row() {
        let out = render(vec![Outcome::ok("add_funds", "a@x.com").with_balance(Balance(5000))]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "op,account,status,reservation,resource,start,end,amount,balance,refunded,card_hash,phone_hash,error"
        );
        assert_eq!(lines.next().unwrap(), "add_funds,a@x.com,ok,,,,,,5000,,,,");
    }

    #[test]
    fn test_failure_row_carries_kind_and_message() {
        let err = BookingError::NotYourBooking(3);
        let out = render(vec![Outcome::failed("cancel", "b@x.com", &err)]);
        assert!(out.contains("cancel,b@x.com,permission_denied,,,,,,,,,,booking 3 belongs to another user"));
    }

    #[test]
    fn test_listed_row() {
        let start = Utc.with_ymd_and_hms(2099, 1, 1, 10, 0, 0).unwrap();
        let reservation = Reservation {
            id: ReservationId(4),
            account: AccountId::new("a@x.com").unwrap(),
            resource: "Box1".into(),
            interval: Interval::starting_at(start, chrono::Duration::hours(2)).unwrap(),
            charged: Amount::new(1200).unwrap(),
        };
        let out = render(vec![Outcome::listed(&reservation)]);
        assert!(out.contains("list,a@x.com,ok,4,Box1,2099-01-01T10:00:00+00:00,2099-01-01T12:00:00+00:00,1200,,,,,"));
    }

    #[test]
    fn test_card_row_carries_both_hashes() {
        let card = CardOnFile {
            card_hash: "$argon2id$c".into(),
            phone_hash: "$argon2id$p".into(),
        };
        let out = render(vec![Outcome::card("b@x.com", card, Balance(5000))]);
        assert!(out.contains("get_card,b@x.com,ok,,,,,,5000,,$argon2id$c,$argon2id$p,"));
    }
}
