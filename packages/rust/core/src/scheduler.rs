//! Checkpointed, quota-limited batch scheduler.
//!
//! A run loads the checkpoint, drops keys already completed or terminally
//! failed (missing source, no transcript), caps the rest at
//! the quota window, and processes items one at a time with a fixed delay in
//! between. The checkpoint is saved after every item. A rate-limit error stops
//! the run on the spot (`QuotaExhausted`); a fatal error stops it as
//! `Aborted`; any other error only fails its item.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use postforge_shared::Result;

use crate::checkpoint::{CheckpointStore, FailedKey};

/// Scheduler lifecycle: `Idle -> Running -> {Completed, QuotaExhausted, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    QuotaExhausted,
    Aborted,
}

/// What processing one key amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Succeeded,
    /// Nothing to do (e.g. the source already has an artifact).
    Skipped,
}

/// Operator-facing result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub state: RunState,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<FailedKey>,
    /// Keys still outstanding after this run (not completed, skipped or
    /// terminally failed).
    pub remaining: usize,
    /// The key whose error ended the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

impl RunSummary {
    /// Summary of a run that had nothing to do.
    pub fn empty() -> Self {
        Self {
            state: RunState::Completed,
            succeeded: 0,
            skipped: 0,
            failed: Vec::new(),
            remaining: 0,
            stopped_at: None,
        }
    }
}

/// Sequential batch runner over one checkpoint.
pub struct BatchScheduler<'a> {
    store: &'a dyn CheckpointStore,
    limit: usize,
    delay: Duration,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(store: &'a dyn CheckpointStore, limit: usize, delay: Duration) -> Self {
        Self {
            store,
            limit,
            delay,
        }
    }

    /// Run `process` over `keys`.
    ///
    /// Checkpoint load/save failures are returned as errors; item failures
    /// end up in the summary.
    #[instrument(skip_all, fields(keys = keys.len(), limit = self.limit))]
    pub async fn run<F, Fut>(&self, keys: Vec<String>, mut process: F) -> Result<RunSummary>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<ItemStatus>>,
    {
        let mut state = RunState::Idle;
        let mut checkpoint = self.store.load().await?;

        let mut seen = HashSet::new();
        let pending: Vec<String> = keys
            .into_iter()
            .filter(|k| seen.insert(k.clone()) && !checkpoint.is_settled(k))
            .collect();
        let outstanding = pending.len();

        let mut summary = RunSummary::empty();
        state = transition(state, RunState::Running);

        for (i, key) in pending.into_iter().take(self.limit).enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match process(key.clone()).await {
                Ok(ItemStatus::Succeeded) => {
                    summary.succeeded += 1;
                    checkpoint.mark_completed(&key);
                    info!(%key, "item completed");
                }
                Ok(ItemStatus::Skipped) => {
                    summary.skipped += 1;
                    checkpoint.mark_completed(&key);
                    info!(%key, "item skipped");
                }
                Err(e) => {
                    warn!(%key, error = %e, "item failed");
                    let reason = e.to_string();
                    let terminal = e.is_terminal();
                    checkpoint.mark_failed(&key, reason.clone(), terminal);
                    summary.failed.push(FailedKey {
                        key: key.clone(),
                        error: reason,
                        terminal,
                    });

                    if e.is_rate_limit() {
                        state = transition(state, RunState::QuotaExhausted);
                    } else if e.is_fatal() {
                        state = transition(state, RunState::Aborted);
                    }
                    if state != RunState::Running {
                        summary.stopped_at = Some(key);
                    }
                }
            }

            self.store.save(&checkpoint).await?;

            if state != RunState::Running {
                break;
            }
        }

        if state == RunState::Running {
            state = transition(state, RunState::Completed);
        }

        summary.state = state;
        let terminal = summary.failed.iter().filter(|f| f.terminal).count();
        summary.remaining = outstanding - summary.succeeded - summary.skipped - terminal;

        info!(
            state = ?summary.state,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            remaining = summary.remaining,
            "batch run finished"
        );
        Ok(summary)
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    tracing::debug!(?from, ?to, "scheduler state change");
    to
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use postforge_shared::PostforgeError;

    use super::*;
    use crate::checkpoint::{BatchCheckpoint, MemoryCheckpointStore};

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn limit_caps_run_and_next_run_resumes() {
        let store = MemoryCheckpointStore::default();
        let scheduler = BatchScheduler::new(&store, 2, Duration::ZERO);
        let attempted = Mutex::new(Vec::new());

        let summary = scheduler
            .run(keys(&["v1", "v2", "v3"]), |key| {
                attempted.lock().unwrap().push(key);
                async { Ok(ItemStatus::Succeeded) }
            })
            .await
            .unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.remaining, 1);
        assert_eq!(*attempted.lock().unwrap(), vec!["v1", "v2"]);
        assert_eq!(store.snapshot().completed, vec!["v1", "v2"]);
        assert!(store.snapshot().failed.is_empty());

        attempted.lock().unwrap().clear();
        let summary = scheduler
            .run(keys(&["v1", "v2", "v3"]), |key| {
                attempted.lock().unwrap().push(key);
                async { Ok(ItemStatus::Succeeded) }
            })
            .await
            .unwrap();
        assert_eq!(*attempted.lock().unwrap(), vec!["v3"]);
        assert_eq!(summary.remaining, 0);
    }

    #[tokio::test]
    async fn quota_error_stops_immediately() {
        let store = MemoryCheckpointStore::default();
        let scheduler = BatchScheduler::new(&store, 4, Duration::ZERO);
        let attempted = Mutex::new(Vec::new());

        // Third call hits the quota
        let summary = scheduler
            .run(keys(&["a", "b", "c", "d", "e", "f"]), |key| {
                attempted.lock().unwrap().push(key.clone());
                async move {
                    if key == "c" {
                        Err(PostforgeError::RateLimited("429 Too Many Requests".into()))
                    } else {
                        Ok(ItemStatus::Succeeded)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.state, RunState::QuotaExhausted);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.stopped_at.as_deref(), Some("c"));
        assert_eq!(*attempted.lock().unwrap(), vec!["a", "b", "c"]);

        let checkpoint = store.snapshot();
        assert_eq!(checkpoint.completed, vec!["a", "b"]);
        assert_eq!(checkpoint.failed.len(), 1);
        assert_eq!(checkpoint.failed[0].key, "c");
        for untouched in ["d", "e", "f"] {
            assert!(!checkpoint.is_completed(untouched));
            assert!(checkpoint.failed.iter().all(|f| f.key != untouched));
        }
    }

    #[tokio::test]
    async fn item_errors_continue_and_fatal_errors_abort() {
        let store = MemoryCheckpointStore::default();
        let scheduler = BatchScheduler::new(&store, 10, Duration::ZERO);

        let summary = scheduler
            .run(keys(&["ok", "missing", "dup", "db", "never"]), |key| async move {
                match key.as_str() {
                    "missing" => Err(PostforgeError::TranscriptUnavailable("no captions".into())),
                    "dup" => Ok(ItemStatus::Skipped),
                    "db" => Err(PostforgeError::Storage("disk I/O error".into())),
                    _ => Ok(ItemStatus::Succeeded),
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.stopped_at.as_deref(), Some("db"));
        // "missing" is settled; "db" and "never" are left
        assert_eq!(summary.remaining, 2);
        assert_eq!(store.snapshot().completed, vec!["ok", "dup"]);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried_next_run() {
        let store = MemoryCheckpointStore::default();
        let scheduler = BatchScheduler::new(&store, 1, Duration::ZERO);
        let attempted = Mutex::new(Vec::new());

        for _ in 0..2 {
            scheduler
                .run(keys(&["nocaps", "flaky"]), |key| {
                    attempted.lock().unwrap().push(key.clone());
                    async move {
                        match key.as_str() {
                            "nocaps" => {
                                Err(PostforgeError::TranscriptUnavailable("nocaps".into()))
                            }
                            _ => Err(PostforgeError::Network("connection reset".into())),
                        }
                    }
                })
                .await
                .unwrap();
        }
        // The second run spends its single slot on the retryable key
        assert_eq!(*attempted.lock().unwrap(), vec!["nocaps", "flaky"]);

        let summary = scheduler
            .run(keys(&["nocaps", "flaky"]), |key| {
                attempted.lock().unwrap().push(key);
                async { Ok(ItemStatus::Succeeded) }
            })
            .await
            .unwrap();
        assert_eq!(*attempted.lock().unwrap(), vec!["nocaps", "flaky", "flaky"]);
        assert_eq!(summary.remaining, 0);

        let checkpoint = store.snapshot();
        assert_eq!(checkpoint.failed.len(), 1);
        assert!(checkpoint.failed[0].terminal);
        assert_eq!(checkpoint.failed[0].key, "nocaps");
    }

    #[tokio::test]
    async fn completed_keys_and_duplicates_are_filtered() {
        let mut initial = BatchCheckpoint::default();
        initial.mark_completed("done");
        let store = MemoryCheckpointStore::new(initial);
        let scheduler = BatchScheduler::new(&store, 10, Duration::ZERO);
        let attempted = Mutex::new(Vec::new());

        let summary = scheduler
            .run(keys(&["done", "x", "x", "y"]), |key| {
                attempted.lock().unwrap().push(key);
                async { Ok(ItemStatus::Succeeded) }
            })
            .await
            .unwrap();

        assert_eq!(*attempted.lock().unwrap(), vec!["x", "y"]);
        assert_eq!(summary.succeeded, 2);
    }

    #[test]
    fn summary_serializes_state_in_snake_case() {
        let mut summary = RunSummary::empty();
        summary.state = RunState::QuotaExhausted;
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["state"], "quota_exhausted");
        assert!(json.get("stopped_at").is_none());
    }
}
