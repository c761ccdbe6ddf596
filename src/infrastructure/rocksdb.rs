use crate::domain::account::{AccountId, Amount, Balance, CreditKey, LedgerEntry, PaymentMethod};
use crate::domain::ports::{FundsLedger, ReservationStore};
use crate::domain::reservation::{NewReservation, Reservation, ReservationId, find_conflict};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for reservation records, keyed by big-endian reservation id.
pub const CF_RESERVATIONS: &str = "reservations";
/// Column Family indexing reservations by resource: `resource \0 id`, same value
/// as [`CF_RESERVATIONS`]. The conflict check scans one resource's prefix only.
pub const CF_SCHEDULE: &str = "schedule";
/// Column Family for ledger entries, keyed by account email.
pub const CF_LEDGER: &str = "ledger";
/// Column Family for store bookkeeping (the id sequence).
pub const CF_META: &str = "meta";

const NEXT_ID_KEY: &[u8] = b"next_reservation_id";

/// One async mutex per key, created on first use.
struct KeyedLocks<K> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: &K) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| BookingError::internal("lock table poisoned"))?;
            locks.entry(key.clone()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }
}

/// A persistent store implementation using RocksDB.
///
/// Implements both [`ReservationStore`] and [`FundsLedger`] on separate Column
/// Families. RocksDB has no multi-key transactions here, so atomicity of the
/// check-then-write cycles comes from in-process locks: one per resource name for
/// reservations and one per account for the ledger. A single process must own
/// the database directory.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc`s).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    resource_locks: Arc<KeyedLocks<String>>,
    account_locks: Arc<KeyedLocks<AccountId>>,
    id_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_RESERVATIONS, CF_SCHEDULE, CF_LEDGER, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        let store = Self {
            db: Arc::new(db),
            resource_locks: Arc::new(KeyedLocks::new()),
            account_locks: Arc::new(KeyedLocks::new()),
            id_lock: Arc::new(Mutex::new(())),
        };
        store.backfill_schedule()?;
        Ok(store)
    }

    /// Databases written before the schedule index existed have reservations
    /// but no index rows. Rebuild it once on open.
    fn backfill_schedule(&self) -> Result<()> {
        let schedule = self.cf(CF_SCHEDULE)?;
        if self.db.iterator_cf(schedule, IteratorMode::Start).next().is_some() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for reservation in self.all_reservations()? {
            let key = schedule_key(&reservation.resource, reservation.id);
            batch.put_cf(schedule, key, serde_json::to_vec(&reservation)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BookingError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn all_reservations(&self) -> Result<Vec<Reservation>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_RESERVATIONS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn scheduled_on(&self, resource: &str) -> Result<Vec<Reservation>> {
        let prefix = schedule_prefix(resource);
        let mut rows = Vec::new();
        let mode = IteratorMode::From(&prefix, Direction::Forward);
        for item in self.db.iterator_cf(self.cf(CF_SCHEDULE)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn remove_batch(&self, batch: &mut WriteBatch, reservation: &Reservation) -> Result<()> {
        batch.delete_cf(self.cf(CF_RESERVATIONS)?, reservation.id.0.to_be_bytes());
        batch.delete_cf(self.cf(CF_SCHEDULE)?, schedule_key(&reservation.resource, reservation.id));
        Ok(())
    }

    /// Hands out the next reservation id and persists the sequence before returning it,
    /// so ids are never reused across restarts.
    async fn next_reservation_id(&self) -> Result<ReservationId> {
        let _guard = self.id_lock.lock().await;
        let next: u64 = self.read(CF_META, NEXT_ID_KEY)?.unwrap_or(1);
        self.write(CF_META, NEXT_ID_KEY, &(next + 1))?;
        Ok(ReservationId(next))
    }

    async fn update_entry<T: Send>(
        &self,
        account: &AccountId,
        apply: impl FnOnce(&mut LedgerEntry) -> Result<T> + Send,
    ) -> Result<T> {
        let _guard = self.account_locks.lock(account).await?;
        let key = account.as_str().as_bytes();
        let mut entry: LedgerEntry = self
            .read(CF_LEDGER, key)?
            .ok_or_else(|| BookingError::CardNotFound(account.to_string()))?;
        let outcome = apply(&mut entry)?;
        self.write(CF_LEDGER, key, &entry)?;
        Ok(outcome)
    }

    fn entry(&self, account: &AccountId) -> Result<LedgerEntry> {
        self.read(CF_LEDGER, account.as_str().as_bytes())?
            .ok_or_else(|| BookingError::CardNotFound(account.to_string()))
    }
}

fn schedule_prefix(resource: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(resource.len() + 1);
    prefix.extend_from_slice(resource.as_bytes());
    prefix.push(0);
    prefix
}

fn schedule_key(resource: &str, id: ReservationId) -> Vec<u8> {
    let mut key = schedule_prefix(resource);
    key.extend_from_slice(&id.0.to_be_bytes());
    key
}

#[async_trait]
impl ReservationStore for RocksDBStore {
    async fn create(&self, new: NewReservation) -> Result<ReservationId> {
        let _guard = self.resource_locks.lock(&new.resource).await?;

        let existing = self.scheduled_on(&new.resource)?;
        if let Some(conflict) = find_conflict(&existing, &new.resource, &new.interval) {
            return Err(BookingError::AlreadyBooked {
                resource: conflict.resource.clone(),
            });
        }

        let id = self.next_reservation_id().await?;
        let reservation = Reservation::from_new(id, new);
        let bytes = serde_json::to_vec(&reservation)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_RESERVATIONS)?, id.0.to_be_bytes(), &bytes);
        batch.put_cf(self.cf(CF_SCHEDULE)?, schedule_key(&reservation.resource, id), &bytes);
        self.db.write(batch)?;
        Ok(id)
    }

    async fn get(&self, id: ReservationId) -> Result<Reservation> {
        self.read(CF_RESERVATIONS, &id.0.to_be_bytes())?
            .ok_or(BookingError::ReservationNotFound(id.0))
    }

    async fn delete(&self, id: ReservationId) -> Result<Reservation> {
        let found = self.get(id).await?;
        let _guard = self.resource_locks.lock(&found.resource).await?;

        // Re-read under the lock: a concurrent delete may have removed it.
        let current = self.get(id).await?;
        let mut batch = WriteBatch::default();
        self.remove_batch(&mut batch, &current)?;
        self.db.write(batch)?;
        Ok(current)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut by_resource: HashMap<String, Vec<Reservation>> = HashMap::new();
        for reservation in self.all_reservations()? {
            if reservation.interval.has_ended(now) {
                by_resource
                    .entry(reservation.resource.clone())
                    .or_default()
                    .push(reservation);
            }
        }

        let mut swept = 0;
        for (resource, expired) in by_resource {
            let _guard = self.resource_locks.lock(&resource).await?;
            let mut batch = WriteBatch::default();
            for reservation in &expired {
                self.remove_batch(&mut batch, reservation)?;
            }
            self.db.write(batch)?;
            swept += expired.len();
        }
        Ok(swept)
    }

    async fn list_for_account(&self, account: &AccountId) -> Result<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .all_reservations()?
            .into_iter()
            .filter(|r| &r.account == account)
            .collect();
        found.sort_by_key(|r| (r.interval.start(), r.id));
        Ok(found)
    }
}

#[async_trait]
impl FundsLedger for RocksDBStore {
    async fn add_card(&self, account: &AccountId, method: PaymentMethod) -> Result<()> {
        let _guard = self.account_locks.lock(account).await?;
        let key = account.as_str().as_bytes();
        if self.db.get_pinned_cf(self.cf(CF_LEDGER)?, key)?.is_some() {
            return Err(BookingError::CardAlreadyExists(account.to_string()));
        }
        self.write(CF_LEDGER, key, &LedgerEntry::new(account.clone(), method))
    }

    async fn get_card(&self, account: &AccountId) -> Result<PaymentMethod> {
        Ok(self.entry(account)?.method)
    }

    async fn pay(&self, account: &AccountId, amount: Amount) -> Result<Balance> {
        self.update_entry(account, |entry| entry.debit(amount)).await
    }

    async fn add_funds(&self, account: &AccountId, amount: Amount) -> Result<Balance> {
        self.update_entry(account, |entry| entry.credit(amount)).await
    }

    async fn credit_once(&self, account: &AccountId, amount: Amount, key: CreditKey) -> Result<Balance> {
        self.update_entry(account, |entry| entry.credit_once(amount, key))
            .await
    }

    async fn balance(&self, account: &AccountId) -> Result<Balance> {
        Ok(self.entry(account)?.balance)
    }
}
