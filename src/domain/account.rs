use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a ledger entry (the client's email).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(BookingError::invalid("email is required"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current funds of an account, in the smallest currency unit. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub u64);

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive amount of money moved by a debit or credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(BookingError::invalid("amount must be positive"))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor).filter(|v| *v > 0).map(Amount)
    }
}

impl TryFrom<i64> for Amount {
    type Error = BookingError;

    fn try_from(value: i64) -> Result<Self> {
        let value = u64::try_from(value)
            .map_err(|_| BookingError::invalid("amount must be positive"))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-way hashes of a registered payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub card_hash: String,
    pub cvc_hash: String,
    pub phone_hash: String,
}

/// Idempotency key for credits that must land at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CreditKey {
    /// Reverses the debit of a booking attempt whose reservation failed.
    BookingReversal(u64),
    /// Prorated refund for a canceled reservation.
    Refund(u64),
}

impl fmt::Display for CreditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditKey::BookingReversal(id) => write!(f, "reversal:{id}"),
            CreditKey::Refund(id) => write!(f, "refund:{id}"),
        }
    }
}

/// The funds ledger's record for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account: AccountId,
    pub method: PaymentMethod,
    pub balance: Balance,
    /// Credit keys already applied to this entry.
    #[serde(default)]
    pub applied_credits: BTreeSet<CreditKey>,
}

impl LedgerEntry {
    pub fn new(account: AccountId, method: PaymentMethod) -> Self {
        Self {
            account,
            method,
            balance: Balance::ZERO,
            applied_credits: BTreeSet::new(),
        }
    }

    /// Removes `amount` from the balance, rejecting rather than clamping.
    pub fn debit(&mut self, amount: Amount) -> Result<Balance> {
        if self.balance.0 < amount.value() {
            return Err(BookingError::InsufficientFunds {
                account: self.account.to_string(),
                balance: self.balance.0,
                requested: amount.value(),
            });
        }
        self.balance.0 -= amount.value();
        Ok(self.balance)
    }

    pub fn credit(&mut self, amount: Amount) -> Result<Balance> {
        self.balance.0 = self
            .balance
            .0
            .checked_add(amount.value())
            .ok_or_else(|| BookingError::internal(format!("balance overflow for {}", self.account)))?;
        Ok(self.balance)
    }

    /// Credits `amount` unless `key` was already applied; either way returns the balance.
    pub fn credit_once(&mut self, amount: Amount, key: CreditKey) -> Result<Balance> {
        if self.applied_credits.contains(&key) {
            return Ok(self.balance);
        }
        self.credit(amount)?;
        self.applied_credits.insert(key);
        Ok(self.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(balance: u64) -> LedgerEntry {
        let mut entry = LedgerEntry::new(
            AccountId::new("a@x.com").unwrap(),
            PaymentMethod {
                card_hash: "c".into(),
                cvc_hash: "v".into(),
                phone_hash: "p".into(),
            },
        );
        entry.balance = Balance(balance);
        entry
    }

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::new("").is_err());
        assert!(AccountId::new("   ").is_err());
        assert_eq!(AccountId::new(" a@x.com ").unwrap().as_str(), "a@x.com");
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(1).is_ok());
        assert!(matches!(Amount::new(0), Err(BookingError::InvalidArgument(_))));
        assert!(Amount::try_from(-5i64).is_err());
        assert_eq!(Amount::new(600).unwrap().checked_mul(2).unwrap().value(), 1200);
        assert!(Amount::new(u64::MAX).unwrap().checked_mul(2).is_none());
    }

    #[test]
    fn test_debit_success() {
        let mut entry = entry(5000);
        let balance = entry.debit(Amount::new(1200).unwrap()).unwrap();
        assert_eq!(balance, Balance(3800));
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let mut entry = entry(100);
        let result = entry.debit(Amount::new(101).unwrap());
        assert!(matches!(result, Err(BookingError::InsufficientFunds { .. })));
        assert_eq!(entry.balance, Balance(100));
    }

    #[test]
    fn test_debit_to_exactly_zero() {
        let mut entry = entry(100);
        assert_eq!(entry.debit(Amount::new(100).unwrap()).unwrap(), Balance::ZERO);
    }

    #[test]
    fn test_credit_once_is_idempotent() {
        let mut entry = entry(0);
        let amount = Amount::new(500).unwrap();
        entry.credit_once(amount, CreditKey::Refund(3)).unwrap();
        let balance = entry.credit_once(amount, CreditKey::Refund(3)).unwrap();
        assert_eq!(balance, Balance(500));

        let balance = entry
            .credit_once(amount, CreditKey::BookingReversal(3))
            .unwrap();
        assert_eq!(balance, Balance(1000));
    }

    #[test]
    fn test_repeated_credit_keys_are_stored_once() {
        let mut entry = entry(0);
        let amount = Amount::new(10).unwrap();
        for _ in 0..3 {
            entry.credit_once(amount, CreditKey::Refund(7)).unwrap();
        }
        assert_eq!(entry.applied_credits.len(), 1);
        assert_eq!(entry.balance, Balance(10));

        // Records persisted as a JSON list still load.
        let mut json = serde_json::to_value(&entry).unwrap();
        json["applied_credits"] = serde_json::json!([{"Refund": 7}, {"Refund": 7}]);
        let loaded: LedgerEntry = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.applied_credits, BTreeSet::from([CreditKey::Refund(7)]));
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut entry = entry(u64::MAX);
        assert!(matches!(
            entry.credit(Amount::new(1).unwrap()),
            Err(BookingError::Internal(_))
        ));
        assert_eq!(entry.balance, Balance(u64::MAX));
    }
}
