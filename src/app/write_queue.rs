// logfacts - app/write_queue.rs
//
// Optional batching of fact statements.
//
// Partition workers enqueue rendered statements and continue; a background
// thread groups them into transactions of `batch_size` statements. The
// channel is bounded, so producers block when the writer falls behind. Every
// statement carries a ticket (the log file id) so a failure is reported to
// the parse that produced it, at that parse's flush barrier.

use crate::core::store::FactStore;
use crate::util::constants;
use crate::util::error::StoreError;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

enum Command {
    Write { ticket: i64, statement: String },
    Flush {
        ticket: i64,
        ack: mpsc::Sender<Result<(), StoreError>>,
    },
    Shutdown,
}

/// Background batching writer in front of a fact store.
pub struct WriteQueue {
    tx: mpsc::SyncSender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue").finish_non_exhaustive()
    }
}

impl WriteQueue {
    /// Start the writer thread.
    pub fn start(store: Arc<dyn FactStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let (tx, rx) = mpsc::sync_channel(capacity(batch_size));
        let handle = std::thread::Builder::new()
            .name("logfacts-writer".to_string())
            .spawn(move || run_writer(store.as_ref(), batch_size, rx))
            .map_err(|e| tracing::error!(error = %e, "Failed to start write queue thread"))
            .ok();
        Self {
            tx,
            handle: Mutex::new(handle),
        }
    }

    /// Queue one statement on behalf of `ticket`.
    pub fn enqueue(&self, ticket: i64, statement: String) -> Result<(), StoreError> {
        self.tx
            .send(Command::Write { ticket, statement })
            .map_err(|_| StoreError::QueueClosed)
    }

    /// Block until every statement queued so far is written. Returns the
    /// first write error recorded for `ticket` since its last flush.
    pub fn flush(&self, ticket: i64) -> Result<(), StoreError> {
        let (ack, done) = mpsc::channel();
        self.tx
            .send(Command::Flush { ticket, ack })
            .map_err(|_| StoreError::QueueClosed)?;
        done.recv().map_err(|_| StoreError::QueueClosed)?
    }

    /// Write what is pending and stop the writer thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Write queue thread panicked");
            }
        }
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Statements that may wait in the channel before `enqueue` blocks.
fn capacity(batch_size: usize) -> usize {
    batch_size.saturating_mul(constants::WRITE_QUEUE_DEPTH_BATCHES)
}

fn run_writer(store: &dyn FactStore, batch_size: usize, rx: mpsc::Receiver<Command>) {
    let mut pending: Vec<(i64, String)> = Vec::with_capacity(batch_size);
    let mut failures: HashMap<i64, StoreError> = HashMap::new();

    tracing::debug!(batch_size, "Write queue started");

    loop {
        match rx.recv() {
            Ok(Command::Write { ticket, statement }) => {
                pending.push((ticket, statement));
                if pending.len() >= batch_size {
                    write_pending(store, &mut pending, &mut failures);
                }
            }
            Ok(Command::Flush { ticket, ack }) => {
                write_pending(store, &mut pending, &mut failures);
                let _ = ack.send(failures.remove(&ticket).map_or(Ok(()), Err));
            }
            Ok(Command::Shutdown) | Err(_) => {
                write_pending(store, &mut pending, &mut failures);
                break;
            }
        }
    }

    if !failures.is_empty() {
        tracing::warn!(
            tickets = failures.len(),
            "Write queue stopped with unreported failures"
        );
    }
    tracing::debug!("Write queue stopped");
}

/// Write `pending` in one transaction. When the transaction fails the
/// statements are replayed one by one so each failure is charged to its own
/// ticket and the others still land.
fn write_pending(
    store: &dyn FactStore,
    pending: &mut Vec<(i64, String)>,
    failures: &mut HashMap<i64, StoreError>,
) {
    if pending.is_empty() {
        return;
    }

    let statements: Vec<String> = pending.iter().map(|(_, s)| s.clone()).collect();
    match store.execute_batch(&statements) {
        Ok(_) => {
            tracing::trace!(count = statements.len(), "Batch written");
        }
        Err(batch_err) => {
            tracing::debug!(
                count = statements.len(),
                error = %batch_err,
                "Batch failed, replaying statements individually"
            );
            for (ticket, statement) in pending.iter() {
                if let Err(e) = store.execute_write(statement) {
                    failures.entry(*ticket).or_insert(e);
                }
            }
        }
    }
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::Value;
    use crate::platform::sqlite::SqliteFactStore;

    fn store() -> Arc<SqliteFactStore> {
        let s = SqliteFactStore::open_in_memory().unwrap();
        s.execute_write("CREATE TABLE T (Id INTEGER PRIMARY KEY, Ticket INTEGER)")
            .unwrap();
        Arc::new(s)
    }

    fn count(store: &SqliteFactStore, ticket: i64) -> i64 {
        store
            .execute_query(&format!("SELECT COUNT(*) FROM T WHERE Ticket = {ticket}"))
            .unwrap()[0][0]
            .as_i64()
            .unwrap()
    }

    #[test]
    fn test_flush_waits_for_all_writes() {
        let s = store();
        let queue = WriteQueue::start(s.clone(), 7);
        for i in 1..=100 {
            queue
                .enqueue(1, format!("INSERT INTO T VALUES ({i}, 1)"))
                .unwrap();
        }
        queue.flush(1).unwrap();
        assert_eq!(count(&s, 1), 100);
    }

    #[test]
    fn test_failure_is_charged_to_its_ticket() {
        let s = store();
        let queue = WriteQueue::start(s.clone(), 10);
        queue.enqueue(1, "INSERT INTO T VALUES (1, 1)".into()).unwrap();
        queue.enqueue(2, "INSERT INTO T VALUES (2, 2)".into()).unwrap();
        // Duplicate primary key.
        queue.enqueue(2, "INSERT INTO T VALUES (1, 2)".into()).unwrap();
        queue.enqueue(1, "INSERT INTO T VALUES (3, 1)".into()).unwrap();

        assert!(queue.flush(2).is_err());
        assert!(queue.flush(1).is_ok());
        assert_eq!(count(&s, 1), 2);
        assert_eq!(count(&s, 2), 1);
        // The failure was reported once.
        assert!(queue.flush(2).is_ok());
    }

    #[test]
    fn test_shutdown_writes_pending_statements() {
        let s = store();
        {
            let queue = WriteQueue::start(s.clone(), 1_000);
            queue.enqueue(5, "INSERT INTO T VALUES (1, 5)".into()).unwrap();
        }
        assert_eq!(s.max_value("T", "Id", "").unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_capacity_is_bounded_by_batches() {
        assert_eq!(capacity(500), 500 * constants::WRITE_QUEUE_DEPTH_BATCHES);
        assert_eq!(capacity(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_blocked_producers_all_land() {
        let s = store();
        // Capacity of a handful of statements against many producers.
        let queue = WriteQueue::start(s.clone(), 1);
        std::thread::scope(|scope| {
            for ticket in 0..4i64 {
                let queue = &queue;
                scope.spawn(move || {
                    for i in 0..250 {
                        let id = ticket * 1_000 + i;
                        queue
                            .enqueue(ticket, format!("INSERT INTO T VALUES ({id}, {ticket})"))
                            .unwrap();
                    }
                });
            }
        });
        for ticket in 0..4 {
            queue.flush(ticket).unwrap();
            assert_eq!(count(&s, ticket), 250);
        }
    }

    #[test]
    fn test_enqueue_after_shutdown_fails() {
        let queue = WriteQueue::start(store(), 10);
        queue.shutdown();
        assert!(matches!(
            queue.enqueue(1, "SELECT 1".into()),
            Err(StoreError::QueueClosed)
        ));
        assert!(matches!(queue.flush(1), Err(StoreError::QueueClosed)));
    }
}
