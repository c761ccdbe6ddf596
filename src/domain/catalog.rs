use super::account::Amount;
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bookable box and its price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxEntry {
    pub name: String,
    pub id: i64,
    pub hour_rate: u64,
    pub minute_rate: u64,
}

/// Immutable resource catalog, injected at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, BoxEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<BoxEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(BookingError::invalid("catalog entry without a name"));
            }
            if map.contains_key(&entry.name) {
                return Err(BookingError::invalid(format!(
                    "catalog lists '{}' twice",
                    entry.name
                )));
            }
            map.insert(entry.name.clone(), entry);
        }
        Ok(Self { entries: map })
    }

    pub fn get(&self, name: &str) -> Result<&BoxEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| BookingError::ResourceNotFound(name.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &BoxEntry> {
        self.entries.values()
    }

    /// `(hours * hour_rate + minutes * minute_rate) * party`.
    pub fn price(&self, name: &str, hours: u64, minutes: u64, party: u64) -> Result<Amount> {
        let entry = self.get(name)?;
        let per_person = hours
            .checked_mul(entry.hour_rate)
            .zip(minutes.checked_mul(entry.minute_rate))
            .and_then(|(h, m)| h.checked_add(m))
            .ok_or_else(|| BookingError::invalid("booking price out of range"))?;
        let amount = Amount::new(per_person)
            .map_err(|_| BookingError::invalid(format!("box '{name}' has no price for this duration")))?;
        amount
            .checked_mul(party)
            .ok_or_else(|| BookingError::invalid("booking price out of range"))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let minute_rate = 13;
        let entries = [("SibirskayaBox", 1), ("LeninaBox", 2), ("LunacharskogoBox", 3)]
            .into_iter()
            .map(|(name, id)| BoxEntry {
                name: name.to_string(),
                id,
                hour_rate: minute_rate * 60,
                minute_rate,
            })
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        Self { entries }
    }
}
