//! Named-task supervision with exponential backoff restarts.
//!
//! Every long-running unit of the relay (game link listener, overlay
//! listener, panel session, tally push) runs under this supervisor so a
//! crashed handler is restarted with a bounded, backing-off delay instead of
//! taking the process down.

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop` waits for a single task to acknowledge cancellation.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `stop_all` waits for the whole fleet before abandoning stragglers.
const GLOBAL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Restart behaviour after a clean (`Ok`) exit of the supervised work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart unconditionally; only cancellation ends the task.
    Always,
    /// Restart on failure only; a clean exit retires the task.
    OnFailure,
}

/// Restart delay schedule: exponential from `base` up to `cap`, with an
/// additional minimum `floor` once a failure streak exceeds `floor_after`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on the computed delay.
    pub cap: Duration,
    /// Minimum delay enforced during a long failure streak.
    pub floor: Duration,
    /// Streak length beyond which `floor` kicks in.
    pub floor_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(300),
            floor: Duration::from_secs(5),
            floor_after: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply before the next attempt, given the current streak of
    /// consecutive failures (`failures >= 1`).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32);
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);
        if failures > self.floor_after {
            delay.max(self.floor)
        } else {
            delay
        }
    }
}

struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Runs named units of work, restarting them on failure with backoff.
///
/// At most one live execution exists per name. Cancellation is cooperative:
/// supervised work receives a [`CancellationToken`] and must observe it at
/// its suspension points.
pub struct Supervisor {
    policy: BackoffPolicy,
    root: CancellationToken,
    tasks: Arc<DashMap<String, TaskHandle>>,
}

impl Supervisor {
    /// Build a supervisor with the given backoff policy.
    pub fn new(policy: BackoffPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            root: CancellationToken::new(),
            tasks: Arc::new(DashMap::new()),
        })
    }

    /// Start `work` under supervision as `name`.
    ///
    /// The factory is invoked once per attempt. Returns `false` without
    /// starting anything when a task with the same name is already live.
    pub fn spawn<F, Fut>(&self, name: &str, restart: RestartPolicy, mut work: F) -> bool
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        use dashmap::mapref::entry::Entry;

        let entry = match self.tasks.entry(name.to_string()) {
            Entry::Occupied(_) => {
                warn!(task = %name, "refusing to start duplicate supervised task");
                return false;
            }
            Entry::Vacant(entry) => entry,
        };

        let token = self.root.child_token();
        let loop_token = token.clone();
        let task_name = name.to_string();
        let policy = self.policy.clone();
        let tasks = Arc::clone(&self.tasks);

        let join = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                if loop_token.is_cancelled() {
                    break;
                }

                info!(task = %task_name, failures, "starting supervised task");
                match work(loop_token.clone()).await {
                    Ok(()) => {
                        failures = 0;
                        if loop_token.is_cancelled() {
                            break;
                        }
                        match restart {
                            RestartPolicy::Always => {
                                debug!(task = %task_name, "task finished cleanly; restarting");
                            }
                            RestartPolicy::OnFailure => {
                                debug!(task = %task_name, "task finished cleanly; retiring");
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        if loop_token.is_cancelled() {
                            break;
                        }
                        failures += 1;
                        let delay = policy.delay_for(failures);
                        error!(
                            task = %task_name,
                            error = %err,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            "supervised task failed; restarting after backoff"
                        );
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = loop_token.cancelled() => break,
                        }
                    }
                }
            }

            // Retire our own table entry on natural exit; stop() removes it
            // first when the shutdown is externally driven.
            tasks.remove(&task_name);
            info!(task = %task_name, "supervised task stopped");
        });

        entry.insert(TaskHandle { token, join });
        true
    }

    /// Whether a task with this name is currently registered.
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Cancel the named task and await its termination up to a bounded
    /// timeout. No restart is attempted after cancellation.
    pub async fn stop(&self, name: &str) {
        let Some((_, handle)) = self.tasks.remove(name) else {
            debug!(task = %name, "stop requested for unknown task");
            return;
        };

        handle.token.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, handle.join).await {
            Ok(_) => info!(task = %name, "task stopped"),
            Err(_) => warn!(task = %name, "task did not stop within timeout; abandoning"),
        }
    }

    /// Cancel every task, wait under one global timeout, and abandon any
    /// stragglers with a warning.
    pub async fn stop_all(&self) {
        self.root.cancel();

        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut drained = Vec::new();
            let names: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
            for name in names {
                if let Some((name, handle)) = self.tasks.remove(&name) {
                    drained.push((name, handle.join));
                }
            }
            drained
        };

        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "stopping all supervised tasks");
        let joins = futures::future::join_all(handles.into_iter().map(|(_, join)| join));
        if tokio::time::timeout(GLOBAL_STOP_TIMEOUT, joins).await.is_err() {
            warn!("some supervised tasks did not stop within the global timeout; abandoning them");
        }
    }
}
