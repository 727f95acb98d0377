//! In-memory exchange history
//!
//! Single writer, many readers: every mutation goes through one mutex and then
//! publishes a fresh immutable snapshot. Readers clone the last snapshot and never
//! see a record halfway through an update. Events are sent only after the snapshot
//! they describe is visible.

use crate::models::{ExchangeRecord, ExchangeState};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;

pub const DEFAULT_MAX_ENTRIES: usize = 5_000;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Point-in-time view of the store, oldest first.
pub type LogSnapshot = Arc<Vec<Arc<ExchangeRecord>>>;

/// Change notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Appended { id: String },
    Updated { id: String },
    Evicted { id: String },
    Cleared,
}

pub struct LogStore {
    entries: Mutex<VecDeque<Arc<ExchangeRecord>>>,
    published: RwLock<LogSnapshot>,
    max_entries: usize,
    events: broadcast::Sender<LogEvent>,
}

impl LogStore {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(DEFAULT_MAX_ENTRIES))),
            published: RwLock::new(Arc::new(Vec::new())),
            max_entries,
            events,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Add to the tail, evicting from the head past `max_entries`.
    /// Returns the evicted records.
    pub fn append(&self, record: ExchangeRecord) -> Vec<Arc<ExchangeRecord>> {
        let id = record.id.clone();
        let mut entries = self.lock_entries();
        entries.push_back(Arc::new(record));
        let mut evicted = Vec::new();
        while entries.len() > self.max_entries {
            if let Some(oldest) = entries.pop_front() {
                evicted.push(oldest);
            }
        }
        self.publish(&entries);

        let _ = self.events.send(LogEvent::Appended { id });
        for record in &evicted {
            let _ = self.events.send(LogEvent::Evicted {
                id: record.id.clone(),
            });
        }
        evicted
    }

    /// Apply `update` to the record with `id` if it is still pending.
    /// Returns the updated record, or `None` when the record is gone or already final.
    pub fn update_if_pending<F>(&self, id: &str, update: F) -> Option<Arc<ExchangeRecord>>
    where
        F: FnOnce(&mut ExchangeRecord),
    {
        let mut entries = self.lock_entries();
        let slot = entries.iter_mut().rev().find(|record| record.id == id)?;
        if slot.state.is_terminal() {
            return None;
        }
        update(Arc::make_mut(slot));
        let updated = Arc::clone(slot);
        self.publish(&entries);
        let _ = self.events.send(LogEvent::Updated { id: id.to_string() });
        Some(updated)
    }

    /// Mark pending records older than their horizon as abandoned.
    /// The horizon is `abandon_after`, stretched to the request's own timeout when longer.
    pub fn abandon_stale(
        &self,
        now: DateTime<Utc>,
        abandon_after: std::time::Duration,
    ) -> Vec<Arc<ExchangeRecord>> {
        let mut entries = self.lock_entries();
        let mut abandoned = Vec::new();
        for slot in entries.iter_mut().filter(|record| record.is_pending()) {
            let horizon = slot
                .request_timeout
                .map(|timeout| timeout.max(abandon_after))
                .unwrap_or(abandon_after);
            let horizon = chrono::Duration::from_std(horizon).unwrap_or(chrono::Duration::MAX);
            if now.signed_duration_since(slot.request_date) <= horizon {
                continue;
            }
            let record = Arc::make_mut(slot);
            record.state = ExchangeState::Abandoned;
            record.response_date = Some(now.max(record.request_date));
            abandoned.push(Arc::clone(slot));
        }
        if !abandoned.is_empty() {
            self.publish(&entries);
            for record in &abandoned {
                let _ = self.events.send(LogEvent::Updated {
                    id: record.id.clone(),
                });
            }
        }
        abandoned
    }

    /// Snapshot of every record, oldest first.
    pub fn all(&self) -> LogSnapshot {
        match self.published.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ExchangeRecord>> {
        self.all().iter().rev().find(|record| record.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record. On-disk bodies are left for retention to handle.
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        entries.clear();
        self.publish(&entries);
        let _ = self.events.send(LogEvent::Cleared);
    }

    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<Arc<ExchangeRecord>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, entries: &VecDeque<Arc<ExchangeRecord>>) {
        let snapshot: LogSnapshot = Arc::new(entries.iter().cloned().collect());
        match self.published.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, RequestOptions};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn record(path: &str) -> ExchangeRecord {
        ExchangeRecord::new(
            HttpMethod::Get,
            &format!("https://example.com{path}"),
            BTreeMap::new(),
            RequestOptions::default(),
        )
    }

    #[test]
    fn ring_enforces_max_length_fifo() {
        let store = LogStore::new(3);
        let ids: Vec<String> = (0..5)
            .map(|i| {
                let r = record(&format!("/{i}"));
                let id = r.id.clone();
                store.append(r);
                id
            })
            .collect();

        let snapshot = store.all();
        assert_eq!(snapshot.len(), 3);
        let kept: Vec<_> = snapshot.iter().map(|r| r.id.clone()).collect();
        assert_eq!(kept, ids[2..].to_vec(), "oldest entries evicted first");
        assert!(store.get(&ids[0]).is_none());
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let store = LogStore::new(10);
        let r = record("/a");
        let id = r.id.clone();
        store.append(r);

        let before = store.all();
        let updated = store
            .update_if_pending(&id, |rec| {
                rec.response_status_code = Some(200);
                rec.state = ExchangeState::Completed;
            })
            .expect("pending record updates");

        assert_eq!(updated.response_status_code, Some(200));
        assert_eq!(before[0].response_status_code, None);
        assert_eq!(before[0].state, ExchangeState::Pending);
        assert_eq!(store.get(&id).unwrap().state, ExchangeState::Completed);
    }

    #[test]
    fn final_records_are_not_updated_again() {
        let store = LogStore::new(10);
        let r = record("/a");
        let id = r.id.clone();
        store.append(r);

        assert!(store
            .update_if_pending(&id, |rec| rec.state = ExchangeState::Completed)
            .is_some());
        assert!(store
            .update_if_pending(&id, |rec| rec.response_status_code = Some(500))
            .is_none());
        assert_eq!(store.get(&id).unwrap().response_status_code, None);
        assert!(store.update_if_pending("missing", |_| {}).is_none());
    }

    #[test]
    fn stale_pending_records_are_abandoned() {
        let store = LogStore::new(10);
        let mut old = record("/old");
        old.request_date = Utc::now() - chrono::Duration::minutes(10);
        let old_id = old.id.clone();
        let mut patient = record("/patient");
        patient.request_date = Utc::now() - chrono::Duration::minutes(10);
        patient.request_timeout = Some(Duration::from_secs(3600));
        let fresh = record("/fresh");
        let fresh_id = fresh.id.clone();
        store.append(old);
        store.append(patient);
        store.append(fresh);

        let abandoned = store.abandon_stale(Utc::now(), Duration::from_secs(60));
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].id, old_id);

        let old = store.get(&old_id).unwrap();
        assert_eq!(old.state, ExchangeState::Abandoned);
        assert!(old.response_date.unwrap() >= old.request_date);
        assert!(store.get(&fresh_id).unwrap().is_pending());
        assert!(store
            .update_if_pending(&old_id, |rec| rec.response_status_code = Some(200))
            .is_none());
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let store = LogStore::new(1);
        let mut events = store.subscribe();

        let first = record("/1");
        let first_id = first.id.clone();
        store.append(first);
        let second = record("/2");
        let second_id = second.id.clone();
        store.append(second);
        store.update_if_pending(&second_id, |rec| rec.state = ExchangeState::Completed);
        store.clear();

        assert_eq!(
            events.recv().await.unwrap(),
            LogEvent::Appended {
                id: first_id.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LogEvent::Appended {
                id: second_id.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LogEvent::Evicted { id: first_id }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            LogEvent::Updated { id: second_id }
        );
        assert_eq!(events.recv().await.unwrap(), LogEvent::Cleared);
        assert!(store.is_empty());
    }

    #[test]
    fn announced_changes_are_visible_to_other_threads() {
        for _ in 0..500 {
            let store = Arc::new(LogStore::new(1));
            let mut events = store.subscribe();
            let older = record("/older");
            let older_id = older.id.clone();
            let newer = record("/newer");
            let newer_id = newer.id.clone();

            let writer = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.append(older);
                    store.append(newer);
                    store.update_if_pending(&newer_id, |rec| {
                        rec.response_status_code = Some(204);
                        rec.state = ExchangeState::Completed;
                    });
                })
            };

            let mut seen = 0;
            while seen < 4 {
                match events.blocking_recv().unwrap() {
                    // With room for one record, the older one may already be evicted.
                    LogEvent::Appended { id } => {
                        assert!(id == older_id || store.get(&id).is_some())
                    }
                    LogEvent::Evicted { id } => assert!(store.get(&id).is_none()),
                    LogEvent::Updated { id } => {
                        let rec = store.get(&id).expect("updated record is published");
                        assert_eq!(rec.state, ExchangeState::Completed);
                        assert_eq!(rec.response_status_code, Some(204));
                    }
                    LogEvent::Cleared => unreachable!(),
                }
                seen += 1;
            }
            writer.join().unwrap();
        }
    }

    #[test]
    fn appended_record_is_readable_when_announced() {
        for _ in 0..1000 {
            let store = Arc::new(LogStore::new(10));
            let mut events = store.subscribe();
            let r = record("/seen");
            let writer = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.append(r))
            };
            match events.blocking_recv().unwrap() {
                LogEvent::Appended { id } => assert!(store.get(&id).is_some()),
                other => panic!("unexpected event {:?}", other),
            }
            writer.join().unwrap();
        }
    }

    #[test]
    fn abandoned_state_is_visible_when_announced() {
        let store = Arc::new(LogStore::new(10));
        let mut stale = record("/stale");
        stale.request_date = Utc::now() - chrono::Duration::minutes(10);
        store.append(stale);
        let mut events = store.subscribe();

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.abandon_stale(Utc::now(), Duration::from_secs(1)))
        };
        match events.blocking_recv().unwrap() {
            LogEvent::Updated { id } => {
                assert_eq!(store.get(&id).unwrap().state, ExchangeState::Abandoned)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(writer.join().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let store = Arc::new(LogStore::new(10_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.append(record(&format!("/{t}/{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 2000);
    }
}
