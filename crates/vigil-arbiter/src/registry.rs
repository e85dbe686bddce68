//! Supplier registry and awareness selection
//!
//! Records are kept in descending priority order so selection is a single
//! forward scan: the first supplier that is either exempt from staleness
//! or still fresh wins.

use std::time::Duration;

use vigil_core::{AwarenessEvent, SupplierConfig, SupplierId, Timestamp, VigilError, VigilResult};

/// Bookkeeping for one registered supplier
#[derive(Debug)]
pub(crate) struct SupplierRecord {
    pub id: SupplierId,
    pub name: String,
    pub priority: u32,
    /// None until the supplier has reported through its sink
    pub config: Option<SupplierConfig>,
    pub last_event: Option<AwarenessEvent>,
}

/// The winning awareness after a selection pass
#[derive(Clone, Copy, Debug)]
pub(crate) struct CurrentAwareness {
    pub event: AwarenessEvent,
    pub supplier: SupplierId,
    pub priority: u32,
    pub max_staleness: Option<Duration>,
}

/// Why an incoming event was not recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecordError {
    Unknown,
    NotReady,
    OutOfOrder,
}

/// Suppliers ordered by descending priority
#[derive(Default)]
pub(crate) struct SupplierTable {
    records: Vec<SupplierRecord>,
    next_id: u64,
}

impl SupplierTable {
    /// Register a supplier at `priority`. Priorities are unique; a
    /// collision is a registration error, never an arbitration tie.
    pub fn insert(&mut self, name: String, priority: u32) -> VigilResult<SupplierId> {
        if self.records.iter().any(|r| r.priority == priority) {
            return Err(VigilError::DuplicatePriority(priority));
        }

        self.next_id += 1;
        let id = SupplierId::new(self.next_id);
        let pos = self.records.partition_point(|r| r.priority > priority);
        self.records.insert(
            pos,
            SupplierRecord {
                id,
                name,
                priority,
                config: None,
                last_event: None,
            },
        );
        Ok(id)
    }

    /// Register a batch in preference order: the first entry receives the
    /// highest priority and the whole batch slots in above every existing
    /// registration. Priorities are assigned positionally, so they are
    /// unique by construction.
    pub fn insert_batch(&mut self, names: Vec<String>) -> VigilResult<Vec<SupplierId>> {
        let base = self.records.iter().map(|r| r.priority).max().unwrap_or(0);
        let count = names.len() as u32;

        let mut ids = Vec::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let priority = base.saturating_add(count - index as u32);
            ids.push(self.insert(name, priority)?);
        }
        Ok(ids)
    }

    pub fn get_mut(&mut self, id: SupplierId) -> Option<&mut SupplierRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn remove(&mut self, id: SupplierId) -> Option<SupplierRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Store `event` for supplier `id` if it is trusted and the event is
    /// newer than what is already recorded
    pub fn record_event(&mut self, id: SupplierId, event: AwarenessEvent) -> Result<(), RecordError> {
        let Some(record) = self.get_mut(id) else {
            return Err(RecordError::Unknown);
        };
        if record.config.is_none() {
            return Err(RecordError::NotReady);
        }
        if record
            .last_event
            .is_some_and(|prev| event.timestamp() <= prev.timestamp())
        {
            return Err(RecordError::OutOfOrder);
        }
        record.last_event = Some(event);
        Ok(())
    }

    /// Pick the winning awareness: highest priority supplier whose last
    /// event is exempt from staleness or still inside its window.
    ///
    /// Returns `None` only while no supplier has reported an event yet.
    /// Panics when events exist but nothing is selectable - that means no
    /// no-staleness fallback is registered, which is a deployment bug.
    pub fn select(&self, now: Timestamp) -> Option<CurrentAwareness> {
        let mut saw_event = false;
        for record in &self.records {
            let (Some(config), Some(event)) = (record.config, record.last_event) else {
                continue;
            };
            saw_event = true;

            let fresh = match config.max_staleness() {
                None => true,
                Some(window) => now.since(event.timestamp()) < window,
            };
            if fresh {
                return Some(CurrentAwareness {
                    event,
                    supplier: record.id,
                    priority: record.priority,
                    max_staleness: config.max_staleness(),
                });
            }
        }

        if saw_event {
            panic!(
                "no selectable awareness supplier: every reporting supplier is stale \
                 and no no-staleness fallback is registered"
            );
        }
        None
    }
}
