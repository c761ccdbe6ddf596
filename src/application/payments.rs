use crate::domain::account::{AccountId, Amount, Balance, PaymentMethod};
use crate::domain::ports::FundsLedgerRef;
use crate::error::{BookingError, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tracing::{info, warn};

/// Front door of the funds ledger.
///
/// Raw card details stop here: only Argon2 PHC strings reach the ledger.
#[derive(Clone)]
pub struct PaymentService {
    ledger: FundsLedgerRef,
}

/// The stored hashes of a card, as returned by [`PaymentService::get_card`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOnFile {
    pub card_hash: String,
    pub phone_hash: String,
}

impl PaymentService {
    pub fn new(ledger: FundsLedgerRef) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> FundsLedgerRef {
        self.ledger.clone()
    }

    pub async fn add_card(&self, account: &str, card_number: &str, cvc: &str, phone_number: &str) -> Result<()> {
        let account = AccountId::new(account)?;
        for (field, value) in [("card number", card_number), ("cvc", cvc), ("phone number", phone_number)] {
            if value.trim().is_empty() {
                return Err(BookingError::invalid(format!("{field} is required")));
            }
        }

        let method = PaymentMethod {
            card_hash: hash_secret(card_number.trim())?,
            cvc_hash: hash_secret(cvc.trim())?,
            phone_hash: hash_secret(phone_number.trim())?,
        };

        match self.ledger.add_card(&account, method).await {
            Ok(()) => {
                info!(%account, "card added");
                Ok(())
            }
            Err(err) => {
                warn!(%account, error = %err, "failed to add card");
                Err(err)
            }
        }
    }

    pub async fn get_card(&self, account: &str) -> Result<CardOnFile> {
        let account = AccountId::new(account)?;
        let method = self.ledger.get_card(&account).await?;
        Ok(CardOnFile {
            card_hash: method.card_hash,
            phone_hash: method.phone_hash,
        })
    }

    pub async fn add_funds(&self, account: &str, amount: i64) -> Result<Balance> {
        let account = AccountId::new(account)?;
        let amount = Amount::try_from(amount)?;
        let balance = self.ledger.add_funds(&account, amount).await?;
        info!(%account, %amount, %balance, "funds added");
        Ok(balance)
    }

    pub async fn balance(&self, account: &str) -> Result<Balance> {
        let account = AccountId::new(account)?;
        self.ledger.balance(&account).await
    }

    pub async fn pay(&self, account: &str, amount: i64) -> Result<Balance> {
        let account = AccountId::new(account)?;
        let amount = Amount::try_from(amount)?;
        match self.ledger.pay(&account, amount).await {
            Ok(balance) => {
                info!(%account, %amount, %balance, "payment provided");
                Ok(balance)
            }
            Err(err) => {
                warn!(%account, %amount, error = %err, "payment refused");
                Err(err)
            }
        }
    }
}

/// Salted Argon2 hash of `secret`, as a PHC string (`$argon2id$v=19$...`).
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| BookingError::internal(format!("failed to hash card details: {err}")))
}

pub fn verify_secret(secret: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|hash| Argon2::default().verify_password(secret.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}
