//! Append-only command log with a single consumer offset

use crate::error::{Error, Result};
use crate::persist::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info};

/// Default number of entries retained in the log
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// What happened to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Not yet consumed
    Pending,
    /// Consumed, result not yet recorded
    Running,
    Succeeded { detail: String },
    Failed { error: String },
}

impl CommandOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOutcome::Pending => "pending",
            CommandOutcome::Running => "running",
            CommandOutcome::Succeeded { .. } => "succeeded",
            CommandOutcome::Failed { .. } => "failed",
        }
    }

    /// Success detail or failure message
    pub fn message(&self) -> Option<&str> {
        match self {
            CommandOutcome::Succeeded { detail } => Some(detail),
            CommandOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// One logged command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub seq: u64,
    pub command: String,
    pub enqueued_at: DateTime<Utc>,
    pub consumed: bool,
    pub outcome: CommandOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogState {
    entries: Vec<CommandEntry>,
    /// Highest sequence number handed to the consumer
    consumed_through: u64,
    next_seq: u64,
}

impl LogState {
    fn trim(&mut self, capacity: usize) {
        if self.entries.len() <= capacity {
            return;
        }
        let excess = self.entries.len() - capacity;
        let finished = self
            .entries
            .iter()
            .take_while(|e| e.consumed && e.outcome != CommandOutcome::Running)
            .count();
        self.entries.drain(..excess.min(finished));
    }
}

/// The command queue behind the `commands` table
pub struct CommandLog {
    state: Mutex<LogState>,
    path: Option<PathBuf>,
    capacity: usize,
    notify: Notify,
    processed: watch::Sender<u64>,
    consumer_taken: AtomicBool,
}

impl CommandLog {
    /// Create an in-memory log
    pub fn new(capacity: usize) -> Self {
        Self::with_state(LogState::default(), None, capacity)
    }

    /// Open a log persisted at `path`, reloading entries and the consumer offset
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let mut state = if path.exists() {
            read_json::<LogState>(&path)?
        } else {
            LogState::default()
        };

        // A command handed out but never finished is not retried.
        for entry in state.entries.iter_mut() {
            if entry.outcome == CommandOutcome::Running {
                entry.outcome = CommandOutcome::Failed {
                    error: "interrupted by shutdown".to_string(),
                };
            }
        }

        info!(
            path = %path.display(),
            entries = state.entries.len(),
            consumed_through = state.consumed_through,
            "Loaded command log"
        );
        Ok(Self::with_state(state, Some(path), capacity))
    }

    fn with_state(state: LogState, path: Option<PathBuf>, capacity: usize) -> Self {
        let (processed, _) = watch::channel(state.consumed_through);
        Self {
            state: Mutex::new(state),
            path,
            capacity: capacity.max(1),
            notify: Notify::new(),
            processed,
            consumer_taken: AtomicBool::new(false),
        }
    }

    fn persist(&self, state: &LogState) -> Result<()> {
        if let Some(path) = &self.path {
            write_json_atomic(path, state)?;
        }
        Ok(())
    }

    /// Persist `next`, then install it; memory is left untouched on failure
    fn commit(&self, state: &mut LogState, next: LogState) -> Result<()> {
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    /// Append a command; returns the new entry
    pub async fn enqueue(&self, command: &str) -> Result<CommandEntry> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.next_seq = next.next_seq.max(next.consumed_through) + 1;
        let entry = CommandEntry {
            seq: next.next_seq,
            command: command.trim().to_string(),
            enqueued_at: Utc::now(),
            consumed: false,
            outcome: CommandOutcome::Pending,
        };
        next.entries.push(entry.clone());
        next.trim(self.capacity);
        self.commit(&mut state, next)?;
        drop(state);

        debug!(seq = entry.seq, command = %entry.command, "Command enqueued");
        self.notify.notify_one();
        Ok(entry)
    }

    /// Hand out the single consumer cursor; `None` once taken
    pub fn take_consumer(self: &Arc<Self>) -> Option<CommandCursor> {
        if self.consumer_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(CommandCursor { log: self.clone() })
    }

    /// Every retained entry in sequence order
    pub async fn entries(&self) -> Vec<CommandEntry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn get(&self, seq: u64) -> Option<CommandEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .find(|e| e.seq == seq)
            .cloned()
    }

    /// Number of commands not yet consumed
    pub async fn pending(&self) -> usize {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| !e.consumed)
            .count()
    }

    /// Wait until the consumer has finished the command with sequence `seq`
    pub async fn wait_processed(&self, seq: u64) {
        let mut rx = self.processed.subscribe();
        let _ = rx.wait_for(|done| *done >= seq).await;
    }

    /// Take the oldest unconsumed entry, advancing the offset first
    async fn claim_next(&self) -> Result<Option<CommandEntry>> {
        let mut state = self.state.lock().await;
        let consumed_through = state.consumed_through;
        let Some(index) = state
            .entries
            .iter()
            .position(|e| !e.consumed && e.seq > consumed_through)
        else {
            return Ok(None);
        };

        let mut next = state.clone();
        let entry = {
            let entry = &mut next.entries[index];
            entry.consumed = true;
            entry.outcome = CommandOutcome::Running;
            entry.clone()
        };
        next.consumed_through = entry.seq;
        self.commit(&mut state, next)?;
        Ok(Some(entry))
    }

    async fn finish(&self, seq: u64, outcome: CommandOutcome) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.seq == seq)
            .ok_or_else(|| Error::NotFound(format!("command {}", seq)))?;
        entry.outcome = outcome;
        let result = self.persist(&state);
        drop(state);
        self.processed.send_replace(seq);
        result
    }
}

/// The one reader of a [`CommandLog`]
pub struct CommandCursor {
    log: Arc<CommandLog>,
}

impl CommandCursor {
    /// Wait for the next command in FIFO order.
    ///
    /// The entry is marked consumed before it is returned, so a crash while
    /// handling it never replays it.
    pub async fn next(&mut self) -> Result<CommandEntry> {
        loop {
            if let Some(entry) = self.log.claim_next().await? {
                return Ok(entry);
            }
            self.log.notify.notified().await;
        }
    }

    /// Record the outcome of a claimed command
    pub async fn finish(&mut self, seq: u64, outcome: CommandOutcome) -> Result<()> {
        self.log.finish(seq, outcome).await
    }

    pub fn log(&self) -> &Arc<CommandLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fifo_and_single_consumer() {
        let log = Arc::new(CommandLog::new(DEFAULT_LOG_CAPACITY));
        let mut cursor = log.take_consumer().unwrap();
        assert!(log.take_consumer().is_none());

        log.enqueue("delete predictor a").await.unwrap();
        log.enqueue("delete predictor b").await.unwrap();
        assert_eq!(log.pending().await, 2);

        let first = cursor.next().await.unwrap();
        let second = cursor.next().await.unwrap();
        assert_eq!((first.seq, first.command.as_str()), (1, "delete predictor a"));
        assert_eq!((second.seq, second.command.as_str()), (2, "delete predictor b"));
        assert_eq!(log.pending().await, 0);
    }

    #[tokio::test]
    async fn test_next_waits_for_enqueue() {
        let log = Arc::new(CommandLog::new(DEFAULT_LOG_CAPACITY));
        let mut cursor = log.take_consumer().unwrap();

        let waiter = tokio::spawn(async move { cursor.next().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.enqueue("delete predictor late").await.unwrap();

        let entry = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.command, "delete predictor late");
    }

    #[tokio::test]
    async fn test_wait_processed_and_outcome() {
        let log = Arc::new(CommandLog::new(DEFAULT_LOG_CAPACITY));
        let mut cursor = log.take_consumer().unwrap();
        let entry = log.enqueue("delete predictor a").await.unwrap();

        let claimed = cursor.next().await.unwrap();
        assert_eq!(log.get(entry.seq).await.unwrap().outcome, CommandOutcome::Running);
        cursor
            .finish(
                claimed.seq,
                CommandOutcome::Failed {
                    error: "'a' not found".into(),
                },
            )
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), log.wait_processed(entry.seq))
            .await
            .unwrap();
        let stored = log.get(entry.seq).await.unwrap();
        assert!(stored.consumed);
        assert_eq!(stored.outcome.as_str(), "failed");
        assert_eq!(stored.outcome.message(), Some("'a' not found"));
    }

    #[tokio::test]
    async fn test_offset_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");

        {
            let log = Arc::new(CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap());
            let mut cursor = log.take_consumer().unwrap();
            log.enqueue("delete predictor a").await.unwrap();
            log.enqueue("delete predictor b").await.unwrap();
            let claimed = cursor.next().await.unwrap();
            cursor
                .finish(
                    claimed.seq,
                    CommandOutcome::Succeeded {
                        detail: "deleted".into(),
                    },
                )
                .await
                .unwrap();
        }

        let log = Arc::new(CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap());
        let mut cursor = log.take_consumer().unwrap();
        let next = cursor.next().await.unwrap();
        assert_eq!(next.command, "delete predictor b");

        let entry = log.enqueue("delete predictor c").await.unwrap();
        assert_eq!(entry.seq, 3);
    }

    #[tokio::test]
    async fn test_claimed_but_unfinished_is_not_replayed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");

        {
            let log = Arc::new(CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap());
            let mut cursor = log.take_consumer().unwrap();
            log.enqueue("delete predictor a").await.unwrap();
            cursor.next().await.unwrap();
        }

        let log = CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap();
        assert_eq!(log.pending().await, 0);
        assert_eq!(log.get(1).await.unwrap().outcome.as_str(), "failed");
    }

    #[tokio::test]
    async fn test_failed_enqueue_leaves_log_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let log = CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap();

        // A directory in place of the log file makes every write fail
        std::fs::create_dir(&path).unwrap();
        assert!(log.enqueue("delete predictor a").await.is_err());
        assert!(log.entries().await.is_empty());
        assert_eq!(log.pending().await, 0);

        std::fs::remove_dir(&path).unwrap();
        let entry = log.enqueue("delete predictor a").await.unwrap();
        assert_eq!(entry.seq, 1);
    }

    #[tokio::test]
    async fn test_failed_claim_keeps_entry_pending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let log = Arc::new(CommandLog::open(&path, DEFAULT_LOG_CAPACITY).unwrap());
        let mut cursor = log.take_consumer().unwrap();
        let entry = log.enqueue("delete predictor a").await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(cursor.next().await.is_err());

        let stored = log.get(entry.seq).await.unwrap();
        assert!(!stored.consumed);
        assert_eq!(stored.outcome, CommandOutcome::Pending);
        assert_eq!(log.pending().await, 1);

        std::fs::remove_dir(&path).unwrap();
        let claimed = tokio::time::timeout(Duration::from_secs(1), cursor.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.seq, entry.seq);
        assert_eq!(log.pending().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_keeps_unconsumed_entries() {
        let log = Arc::new(CommandLog::new(2));
        let mut cursor = log.take_consumer().unwrap();

        for i in 0..3 {
            log.enqueue(&format!("delete predictor p{}", i)).await.unwrap();
        }
        // Nothing consumed yet, so nothing may be dropped
        assert_eq!(log.entries().await.len(), 3);

        for _ in 0..3 {
            let entry = cursor.next().await.unwrap();
            cursor
                .finish(
                    entry.seq,
                    CommandOutcome::Succeeded {
                        detail: "ok".into(),
                    },
                )
                .await
                .unwrap();
        }
        log.enqueue("delete predictor p3").await.unwrap();

        let seqs: Vec<u64> = log.entries().await.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
    }
}
