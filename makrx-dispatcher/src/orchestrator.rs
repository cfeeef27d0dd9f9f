/// Dispatcher poll loop
///
/// Each cycle:
///
/// ```text
/// DispatchOrchestrator
///   ├─> DispatchService::expire_offers   stale offers back to pending
///   ├─> DispatchQueue::due_orders        rush first, then oldest
///   └─> DispatchService::dispatch_order  per order; failures reschedule themselves
/// ```
///
/// The loop sleeps for the poll interval between cycles and stops when the
/// shutdown token is cancelled. A cycle in progress finishes first.

use crate::config::DispatcherConfig;
use crate::queue::{DispatchQueue, QueueError};
use chrono::Utc;
use makrx_shared::dispatch::{DispatchError, DispatchOutcome, DispatchService};
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub offer_timeout: chrono::Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
            offer_timeout: chrono::Duration::minutes(30),
        }
    }
}

impl From<&DispatcherConfig> for OrchestratorConfig {
    fn from(config: &DispatcherConfig) -> Self {
        OrchestratorConfig {
            poll_interval: config.poll_interval(),
            batch_size: config.batch_size,
            offer_timeout: config.offer_timeout(),
        }
    }
}

/// What happened to one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Dispatched,
    /// No provider; the order carries its next retry time
    Rescheduled,
    /// Another dispatcher or a customer got there first
    Skipped,
    Failed,
}

impl Attempt {
    pub fn classify(result: &Result<DispatchOutcome, DispatchError>) -> Self {
        match result {
            Ok(_) => Attempt::Dispatched,
            Err(DispatchError::NoEligibleProvider { .. }) => Attempt::Rescheduled,
            Err(DispatchError::Busy | DispatchError::NotPending(_) | DispatchError::NotFound) => Attempt::Skipped,
            Err(DispatchError::Transition(_) | DispatchError::Database(_)) => Attempt::Failed,
        }
    }
}

/// Counters for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub expired: usize,
    pub dispatched: usize,
    pub rescheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, attempt: Attempt) {
        match attempt {
            Attempt::Dispatched => self.dispatched += 1,
            Attempt::Rescheduled => self.rescheduled += 1,
            Attempt::Skipped => self.skipped += 1,
            Attempt::Failed => self.failed += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }
}

pub struct DispatchOrchestrator {
    queue: DispatchQueue,
    dispatch: DispatchService,
    config: OrchestratorConfig,
    shutdown_token: CancellationToken,
}

impl DispatchOrchestrator {
    /// The queue skips orders the service's retry policy considers exhausted
    pub fn new(db: PgPool, dispatch: DispatchService, config: OrchestratorConfig) -> Self {
        let queue = DispatchQueue::new(db, dispatch.retry_policy().max_attempts);

        DispatchOrchestrator {
            queue,
            dispatch,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancel to stop the loop after the current cycle
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Polls until shutdown
    pub async fn run(&self) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Dispatcher starting"
        );

        match self.queue.count_stranded().await {
            Ok(0) => {}
            Ok(count) => tracing::warn!(count, "Pending orders are waiting for manual dispatch"),
            Err(e) => tracing::error!(error = %e, "Failed to count stranded orders"),
        }

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.is_idle() => tracing::trace!("Nothing to dispatch"),
                Ok(report) => tracing::info!(
                    expired = report.expired,
                    dispatched = report.dispatched,
                    rescheduled = report.rescheduled,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Dispatch cycle finished"
                ),
                Err(e) => tracing::error!(error = %e, "Failed to read due orders"),
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Dispatcher shut down");
    }

    /// One pass: expire stale offers, then dispatch due orders
    ///
    /// # Errors
    ///
    /// Only a failure to read the queue aborts the cycle; per-order errors
    /// are logged and counted.
    pub async fn run_cycle(&self) -> Result<CycleReport, QueueError> {
        let mut report = CycleReport::default();

        match self
            .dispatch
            .expire_offers(self.config.offer_timeout, self.config.batch_size)
            .await
        {
            Ok(expired) => report.expired = expired,
            Err(e) => tracing::error!(error = %e, "Failed to expire stale offers"),
        }

        let due = self.queue.due_orders(Utc::now(), self.config.batch_size).await?;
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "Due orders selected");
        }

        for order in due {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let result = self.dispatch.dispatch_order(order.id).await;
            let attempt = Attempt::classify(&result);

            match (&result, attempt) {
                (Err(e), Attempt::Skipped) => {
                    tracing::debug!(order_id = %order.id, reason = %e, "Order skipped");
                }
                (Err(e), Attempt::Failed) => {
                    tracing::error!(
                        order_id = %order.id,
                        attempts = order.dispatch_attempts,
                        error = %e,
                        "Dispatch failed"
                    );
                }
                _ => {}
            }

            report.record(attempt);
        }

        Ok(report)
    }
}
