use super::entities::{normalize_command, CommandRecord, SubmitStatus, Submission};
use super::interface::CommandRepository;
use crate::clock::Clock;
use crate::error::{RelayError, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Shelf {
    records: Vec<CommandRecord>,
    last_id: i64,
}

/// Orders records from oldest to most recent, ties broken by id.
///
#[inline(always)]
fn by_age(a: &CommandRecord, b: &CommandRecord) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

/// MemoryWarehouse keeps commands in process memory.
/// Same contract as the SQLite warehouse, nothing survives a restart.
///
#[derive(Debug, Clone)]
pub struct MemoryWarehouse {
    shelf: Arc<Mutex<Shelf>>,
    closed: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl MemoryWarehouse {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            shelf: Arc::new(Mutex::new(Shelf::default())),
            closed: Arc::new(AtomicBool::new(false)),
            clock,
            capacity,
        }
    }

    fn shelf(&self) -> Result<MutexGuard<'_, Shelf>> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(RelayError::StorageUnavailable(
                "warehouse is closed".to_string(),
            ));
        }
        let Ok(shelf) = self.shelf.lock() else {
            return Err(RelayError::StorageUnavailable(
                "command shelf is poisoned".to_string(),
            ));
        };
        Ok(shelf)
    }
}

impl CommandRepository for MemoryWarehouse {
    async fn migrate(&mut self) -> Result<()> {
        Ok(())
    }

    /// The whole upsert runs under one lock, so it is a single unit of work.
    /// The clock is read with the lock held, so timestamps follow lock order.
    ///
    async fn submit(&self, text: &str) -> Result<Submission> {
        let command = normalize_command(text)?;
        let mut shelf = self.shelf()?;
        let now = self.clock.now();

        if let Some(existing) = shelf.records.iter_mut().find(|r| r.command == command) {
            existing.created_at = now;
            debug!(id = existing.id, command = %existing.command, "command refreshed");
            return Ok(Submission {
                status: SubmitStatus::Updated,
                record: existing.clone(),
                evicted: None,
            });
        }

        shelf.last_id += 1;
        let record = CommandRecord {
            id: shelf.last_id,
            command: command.to_string(),
            created_at: now,
        };
        shelf.records.push(record.clone());
        debug!(id = record.id, command = %record.command, "command inserted");

        let mut evicted = None;
        if shelf.records.len() > self.capacity {
            let oldest = shelf
                .records
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| by_age(a, b))
                .map(|(idx, _)| idx);
            if let Some(idx) = oldest {
                let old = shelf.records.swap_remove(idx);
                info!(
                    id = old.id,
                    command = %old.command,
                    capacity = self.capacity,
                    "evicted oldest command"
                );
                evicted = Some(old);
            }
        }

        Ok(Submission {
            status: SubmitStatus::Inserted,
            record,
            evicted,
        })
    }

    async fn latest(&self) -> Result<Option<CommandRecord>> {
        let shelf = self.shelf()?;
        Ok(shelf.records.iter().max_by(|a, b| by_age(a, b)).cloned())
    }

    async fn list(&self) -> Result<Vec<CommandRecord>> {
        let mut records = self.shelf()?.records.clone();
        records.sort_unstable_by(|a, b| by_age(b, a));
        Ok(records)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let mut shelf = self.shelf()?;
        let Some(idx) = shelf.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        shelf.records.swap_remove(idx);
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.shelf()?.records.len())
    }

    async fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use chrono::{DateTime, Utc};
    use rand::{thread_rng, Rng};
    use std::collections::HashSet;

    /// Records whether it was ever read while the shelf lock was free.
    ///
    #[derive(Debug)]
    struct LockWitnessClock {
        shelf: Arc<Mutex<Shelf>>,
        read_unlocked: Arc<AtomicBool>,
    }

    impl Clock for LockWitnessClock {
        fn now(&self) -> DateTime<Utc> {
            if self.shelf.try_lock().is_ok() {
                self.read_unlocked.store(true, AtomicOrdering::SeqCst);
            }
            DateTime::UNIX_EPOCH
        }
    }

    fn warehouse(capacity: usize) -> (MemoryWarehouse, ManualClock) {
        let clock = ManualClock::default();
        (
            MemoryWarehouse::new(capacity, Arc::new(clock.clone())),
            clock,
        )
    }

    fn texts(records: &[CommandRecord]) -> Vec<&str> {
        records.iter().map(|r| r.command.as_str()).collect()
    }

    #[tokio::test]
    async fn on_capacity_two_should_evict_oldest_and_refresh_on_resubmit() {
        let (warehouse, clock) = warehouse(2);

        assert_eq!(warehouse.submit("a").await.unwrap().status, SubmitStatus::Inserted);
        clock.advance(Duration::seconds(1));
        assert_eq!(warehouse.submit("b").await.unwrap().status, SubmitStatus::Inserted);
        clock.advance(Duration::seconds(1));

        let s = warehouse.submit("c").await.unwrap();
        assert_eq!(s.status, SubmitStatus::Inserted);
        assert_eq!(s.evicted.unwrap().command, "a");
        assert_eq!(texts(&warehouse.list().await.unwrap()), vec!["c", "b"]);

        clock.advance(Duration::seconds(1));
        assert_eq!(warehouse.submit("b").await.unwrap().status, SubmitStatus::Updated);
        assert_eq!(texts(&warehouse.list().await.unwrap()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn on_resubmit_should_keep_single_record_with_new_timestamp() {
        let (warehouse, clock) = warehouse(50);

        warehouse.submit("heater:on").await.unwrap();
        clock.advance(Duration::seconds(42));
        let s = warehouse.submit("heater:on").await.unwrap();

        assert_eq!(s.record.created_at, clock.now());
        assert_eq!(warehouse.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn on_same_timestamps_should_break_ties_on_id() {
        let (warehouse, _clock) = warehouse(2);

        warehouse.submit("x").await.unwrap();
        warehouse.submit("y").await.unwrap();
        assert_eq!(warehouse.latest().await.unwrap().unwrap().command, "y");

        let s = warehouse.submit("z").await.unwrap();
        assert_eq!(s.evicted.unwrap().command, "x");
        assert_eq!(texts(&warehouse.list().await.unwrap()), vec!["z", "y"]);
    }

    #[tokio::test]
    async fn on_delete_should_report_whether_record_existed() {
        let (warehouse, _clock) = warehouse(5);

        let s = warehouse.submit("valve:close").await.unwrap();
        assert!(warehouse.delete_by_id(s.record.id).await.unwrap());
        assert!(!warehouse.delete_by_id(s.record.id).await.unwrap());
        assert_eq!(warehouse.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn on_close_should_refuse_operations() {
        let (warehouse, _clock) = warehouse(5);
        warehouse.close().await;
        assert!(matches!(
            warehouse.list().await,
            Err(RelayError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn on_submit_should_read_clock_under_shelf_lock() {
        let (mut warehouse, _clock) = warehouse(1);
        let read_unlocked = Arc::new(AtomicBool::new(false));
        warehouse.clock = Arc::new(LockWitnessClock {
            shelf: warehouse.shelf.clone(),
            read_unlocked: read_unlocked.clone(),
        });

        warehouse.submit("fan:on").await.unwrap();
        warehouse.submit("fan:on").await.unwrap();
        warehouse.submit("fan:off").await.unwrap();

        assert!(!read_unlocked.load(AtomicOrdering::SeqCst));
        assert_eq!(texts(&warehouse.list().await.unwrap()), vec!["fan:off"]);
    }

    #[tokio::test]
    async fn on_random_operations_should_hold_store_invariants() {
        const CAPACITY: usize = 7;
        let (warehouse, clock) = warehouse(CAPACITY);
        let mut rng = thread_rng();

        for _ in 0..2000 {
            match rng.gen_range(0..10) {
                0 => {
                    let id = rng.gen_range(1..=warehouse.shelf().unwrap().last_id + 1);
                    warehouse.delete_by_id(id).await.unwrap();
                }
                _ => {
                    let text = format!("cmd-{}", rng.gen_range(0..20));
                    let s = warehouse.submit(&text).await.unwrap();
                    assert_eq!(s.record.created_at, clock.now());
                }
            }
            if rng.gen_bool(0.7) {
                clock.advance(Duration::milliseconds(rng.gen_range(0..3)));
            }

            let all = warehouse.list().await.unwrap();
            assert!(all.len() <= CAPACITY);

            let distinct: HashSet<&str> = all.iter().map(|r| r.command.as_str()).collect();
            assert_eq!(distinct.len(), all.len());

            let max = all.iter().max_by(|a, b| by_age(a, b)).cloned();
            assert_eq!(warehouse.latest().await.unwrap(), max);
            assert_eq!(all.first().cloned(), max);
        }
    }
}
