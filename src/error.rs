use std::fmt;
use thiserror::Error;

/// Coarse failure classes a caller can branch on.
///
/// Every [`BookingError`] maps onto exactly one kind, so the outer surface
/// only ever has to report a kind and a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    PermissionDenied,
    InsufficientFunds,
    AlreadyExists,
    Canceled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("box '{0}' not found")]
    ResourceNotFound(String),
    #[error("no payment method on file for {0}")]
    CardNotFound(String),
    #[error("booking {0} not found")]
    ReservationNotFound(u64),
    #[error("box '{resource}' is already booked for this time")]
    AlreadyBooked { resource: String },
    #[error("booking {0} belongs to another user")]
    NotYourBooking(u64),
    #[error("not enough funds for {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        balance: u64,
        requested: u64,
    },
    #[error("a payment method is already on file for {0}")]
    CardAlreadyExists(String),
    #[error("booking {0} has already ended")]
    BookingExpired(u64),
    #[error("operation canceled: {0}")]
    Canceled(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::InvalidArgument(_) | BookingError::BookingExpired(_) => {
                ErrorKind::InvalidArgument
            }
            BookingError::ResourceNotFound(_)
            | BookingError::CardNotFound(_)
            | BookingError::ReservationNotFound(_) => ErrorKind::NotFound,
            BookingError::AlreadyBooked { .. } => ErrorKind::Conflict,
            BookingError::NotYourBooking(_) => ErrorKind::PermissionDenied,
            BookingError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            BookingError::CardAlreadyExists(_) => ErrorKind::AlreadyExists,
            BookingError::Canceled(_) => ErrorKind::Canceled,
            BookingError::Internal(_)
            | BookingError::Csv(_)
            | BookingError::Io(_)
            | BookingError::Json(_) => ErrorKind::Internal,
            #[cfg(feature = "storage-rocksdb")]
            BookingError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BookingError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BookingError::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
