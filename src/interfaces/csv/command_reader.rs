use crate::application::booking::BookRequest;
use crate::error::{BookingError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    AddCard,
    AddFunds,
    Pay,
    GetCard,
    Book,
    Cancel,
    List,
    Boxes,
    Sweep,
}

/// One input row. Columns an operation does not use may be left empty.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRow {
    pub op: Op,
    pub account: Option<String>,
    pub resource: Option<String>,
    pub party: Option<i64>,
    pub start: Option<String>,
    pub hours: Option<i64>,
    pub minutes: Option<i64>,
    pub reservation: Option<i64>,
    pub amount: Option<i64>,
    pub card: Option<String>,
    pub cvc: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddCard {
        account: String,
        card: String,
        cvc: String,
        phone: String,
    },
    AddFunds { account: String, amount: i64 },
    Pay { account: String, amount: i64 },
    GetCard { account: String },
    Book(BookRequest),
    Cancel { account: String, reservation: i64 },
    List { account: String },
    Boxes,
    Sweep,
}

impl Command {
    pub fn op(&self) -> &'static str {
        match self {
            Command::AddCard { .. } => "add_card",
            Command::AddFunds { .. } => "add_funds",
            Command::Pay { .. } => "pay",
            Command::GetCard { .. } => "get_card",
            Command::Book(_) => "book",
            Command::Cancel { .. } => "cancel",
            Command::List { .. } => "list",
            Command::Boxes => "boxes",
            Command::Sweep => "sweep",
        }
    }

    pub fn account(&self) -> &str {
        match self {
            Command::AddCard { account, .. }
            | Command::AddFunds { account, .. }
            | Command::Pay { account, .. }
            | Command::GetCard { account }
            | Command::Cancel { account, .. }
            | Command::List { account } => account,
            Command::Book(request) => &request.account,
            Command::Boxes | Command::Sweep => "",
        }
    }
}

impl From<CommandRow> for Command {
    // Missing values become empty or zero; the services reject them with a proper message.
    fn from(row: CommandRow) -> Self {
        let account = row.account.unwrap_or_default();
        match row.op {
            Op::AddCard => Command::AddCard {
                account,
                card: row.card.unwrap_or_default(),
                cvc: row.cvc.unwrap_or_default(),
                phone: row.phone.unwrap_or_default(),
            },
            Op::AddFunds => Command::AddFunds {
                account,
                amount: row.amount.unwrap_or_default(),
            },
            Op::Pay => Command::Pay {
                account,
                amount: row.amount.unwrap_or_default(),
            },
            Op::GetCard => Command::GetCard { account },
            Op::Book => Command::Book(BookRequest {
                account,
                resource: row.resource.unwrap_or_default(),
                party: row.party.unwrap_or_default(),
                start: row.start.unwrap_or_default(),
                hours: row.hours.unwrap_or_default(),
                minutes: row.minutes.unwrap_or_default(),
            }),
            Op::Cancel => Command::Cancel {
                account,
                reservation: row.reservation.unwrap_or_default(),
            },
            Op::List => Command::List { account },
            Op::Boxes => Command::Boxes,
            Op::Sweep => Command::Sweep,
        }
    }
}

/// Reads commands from a CSV source, trimming whitespace and tolerating short rows.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows. A malformed row yields an error and the stream continues.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRow>()
            .map(|row| row.map(Command::from).map_err(BookingError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "op,account,resource,party,start,hours,minutes,reservation,amount,card,cvc,phone";

    fn read(body: &str) -> Vec<Result<Command>> {
        let data = format!("{HEADER}\n{body}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_reads_book_row() {
        let rows = read("book, a@x.com, Box1, 2, 2099-01-01T10:00:00Z, 2, 0,,,,,");
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &Command::Book(BookRequest {
                account: "a@x.com".into(),
                resource: "Box1".into(),
                party: 2,
                start: "2099-01-01T10:00:00Z".into(),
                hours: 2,
                minutes: 0,
            })
        );
    }

    #[test]
    fn test_short_rows_and_empty_columns() {
        let rows = read("add_funds,a@x.com,,,,,,,5000\nboxes\ncancel,a@x.com,,,,,,7");
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &Command::AddFunds {
                account: "a@x.com".into(),
                amount: 5000
            }
        );
        assert_eq!(rows[1].as_ref().unwrap(), &Command::Boxes);
        assert_eq!(
            rows[2].as_ref().unwrap(),
            &Command::Cancel {
                account: "a@x.com".into(),
                reservation: 7
            }
        );
    }

    #[test]
    fn test_malformed_rows_do_not_stop_the_stream() {
        let rows = read("refund,a@x.com\nadd_funds,a@x.com,,,,,,,lots\nlist,a@x.com");
        assert!(rows[0].is_err());
        assert!(rows[1].is_err());
        assert_eq!(rows[2].as_ref().unwrap().op(), "list");
        assert_eq!(rows[2].as_ref().unwrap().account(), "a@x.com");
    }
}
