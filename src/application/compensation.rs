use super::periodic::{FailureSink, spawn_periodic};
use crate::domain::account::{AccountId, Amount, Balance, CreditKey};
use crate::domain::ports::{FundsLedger, FundsLedgerRef};
use crate::error::{BookingError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A credit that must eventually land on the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCredit {
    pub account: AccountId,
    pub amount: Amount,
    pub key: CreditKey,
    pub attempts: u32,
}

/// Credits that failed after their saga had already committed a side effect.
///
/// Every entry is replayed with [`FundsLedger::credit_once`], so retrying an entry
/// that actually landed before its failure was observed cannot credit twice.
#[derive(Debug, Clone, Default)]
pub struct CompensationQueue {
    pending: Arc<Mutex<Vec<PendingCredit>>>,
}

impl CompensationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries the credit once; on failure the credit is queued for the retrier.
    pub async fn credit_or_enqueue(
        &self,
        ledger: &dyn FundsLedger,
        account: &AccountId,
        amount: Amount,
        key: CreditKey,
    ) -> Result<Balance> {
        match ledger.credit_once(account, amount, key.clone()).await {
            Ok(balance) => Ok(balance),
            Err(error) => {
                warn!(%account, %amount, %key, %error, "credit failed, queued for retry");
                self.enqueue(PendingCredit {
                    account: account.clone(),
                    amount,
                    key: key.clone(),
                    attempts: 1,
                })
                .await;
                Err(BookingError::internal(format!(
                    "credit of {amount} to {account} ({key}) failed and was queued for retry: {error}"
                )))
            }
        }
    }

    pub async fn enqueue(&self, credit: PendingCredit) {
        let mut pending = self.pending.lock().await;
        if !pending.iter().any(|p| p.key == credit.key && p.account == credit.account) {
            pending.push(credit);
        }
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<PendingCredit> {
        self.pending.lock().await.clone()
    }

    /// Replays every queued credit once. Credits that fail again stay queued.
    ///
    /// Returns an error naming how many credits are still outstanding, so the
    /// periodic runner reports it.
    pub async fn retry_pending(&self, ledger: &dyn FundsLedger) -> Result<usize> {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if batch.is_empty() {
            return Ok(0);
        }

        let mut landed = 0;
        let mut still_failing = Vec::new();
        for mut credit in batch {
            match ledger
                .credit_once(&credit.account, credit.amount, credit.key.clone())
                .await
            {
                Ok(balance) => {
                    info!(account = %credit.account, key = %credit.key, %balance, "queued credit applied");
                    landed += 1;
                }
                Err(error) => {
                    credit.attempts += 1;
                    warn!(account = %credit.account, key = %credit.key, attempts = credit.attempts, %error, "queued credit failed again");
                    still_failing.push(credit);
                }
            }
        }

        if still_failing.is_empty() {
            return Ok(landed);
        }
        let outstanding = still_failing.len();
        for credit in still_failing {
            self.enqueue(credit).await;
        }
        Err(BookingError::internal(format!(
            "{outstanding} compensating credit(s) still outstanding"
        )))
    }

    /// Replays the queue every `period` until `shutdown` fires.
    pub fn spawn_retrier(
        &self,
        ledger: FundsLedgerRef,
        period: Duration,
        shutdown: CancellationToken,
        failures: FailureSink,
    ) -> JoinHandle<()> {
        let queue = self.clone();
        spawn_periodic("compensation-retrier", period, shutdown, failures, move || {
            let queue = queue.clone();
            let ledger = ledger.clone();
            async move { queue.retry_pending(ledger.as_ref()).await.map(|_| ()) }
        })
    }
}
