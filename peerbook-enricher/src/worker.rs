//! Enrichment Worker
//!
//! A single dedicated thread that takes pending addresses off the ingestion
//! queue, enriches them through the gateway and hands the results to the
//! persistence batcher. Async gateway and storage calls are driven with a
//! captured tokio runtime handle.
//!
//! The registry lock is never held across an external call or a flush.

use crate::batcher::{FlushOutcome, PersistenceBatcher};
use crate::gateway::Enricher;
use crate::registry::Registry;
use peerbook_common::config::TerminationPolicy;
use peerbook_common::{Error, Peer, Result};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Flush as soon as the batch holds this many peers
    pub batch_size: usize,
    pub termination: TerminationPolicy,
    /// Minimum pause between attempts to save a retained batch
    pub flush_retry_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            termination: TerminationPolicy::RunForever,
            flush_retry_interval: Duration::from_secs(5),
        }
    }
}

/// Counters returned when the worker exits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Peers enriched
    pub processed: usize,
    /// Successful flushes
    pub flushes: usize,
    /// Peers discarded after repeated save failures
    pub dropped: usize,
    /// Peers still in the batch at exit (unsaved)
    pub batch_len: usize,
}

pub struct EnrichmentWorker {
    registry: Arc<Registry>,
    enricher: Arc<Enricher>,
    batcher: PersistenceBatcher,
    settings: WorkerSettings,
    batch: Vec<Peer>,
    /// Earliest time a retained batch may be flushed again
    retry_at: Option<Instant>,
    report: WorkerReport,
}

impl EnrichmentWorker {
    pub fn new(
        registry: Arc<Registry>,
        enricher: Arc<Enricher>,
        batcher: PersistenceBatcher,
        settings: WorkerSettings,
    ) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            registry,
            enricher,
            batcher,
            settings: WorkerSettings {
                batch_size,
                ..settings
            },
            batch: Vec::with_capacity(batch_size),
            retry_at: None,
            report: WorkerReport::default(),
        }
    }

    /// Start the worker thread
    ///
    /// `rt_handle` must belong to a multi-threaded runtime; the worker blocks
    /// on it from outside the runtime's own threads.
    pub fn spawn(self, rt_handle: Handle) -> Result<WorkerHandle> {
        let registry = Arc::clone(&self.registry);
        let thread = thread::Builder::new()
            .name("enrichment-worker".to_string())
            .spawn(move || self.run(&rt_handle))?;

        Ok(WorkerHandle { registry, thread })
    }

    /// Worker main loop; returns when the termination policy says so
    pub fn run(mut self, rt_handle: &Handle) -> WorkerReport {
        info!(
            batch_size = self.settings.batch_size,
            termination = ?self.settings.termination,
            pending = self.registry.pending_len(),
            "Enrichment worker started"
        );

        while let Some(address) = self.next_address(rt_handle) {
            debug!(address = %address, "Enriching peer");
            let enrichment = rt_handle.block_on(self.enricher.enrich(&address));

            match self.registry.apply_enrichment(&address, &enrichment) {
                Some(peer) => {
                    self.batch.push(peer);
                    self.report.processed += 1;
                }
                None => warn!(address = %address, "Enriched address is not registered"),
            }

            if self.batch.len() >= self.settings.batch_size && self.retry_wait().is_none() {
                self.flush(rt_handle);
            }
        }

        self.report.batch_len = self.batch.len();
        if self.report.batch_len > 0 {
            warn!(unsaved = self.report.batch_len, "Worker exiting with unsaved peers");
        }
        info!(
            processed = self.report.processed,
            flushes = self.report.flushes,
            dropped = self.report.dropped,
            "Enrichment worker stopped"
        );
        self.report
    }

    /// Next address to enrich, or `None` when the worker should exit
    ///
    /// Flushes the batch whenever there is no pending work, waiting out the
    /// retry interval after a failed save.
    fn next_address(&mut self, rt_handle: &Handle) -> Option<String> {
        let registry = Arc::clone(&self.registry);
        let mut state = registry.lock_state();

        loop {
            if registry.is_stopping() {
                drop(state);
                debug!("Shutdown requested, final flush");
                self.flush(rt_handle);
                return None;
            }

            if state.has_pending() {
                break;
            }

            if !self.batch.is_empty() {
                if let Some(wait) = self.retry_wait() {
                    state = registry.wait_timeout(state, wait);
                    continue;
                }
                drop(state);
                self.flush(rt_handle);
                state = registry.lock_state();
                continue;
            }

            if self.settings.termination == TerminationPolicy::UntilDrained {
                debug!("No pending peers, worker drained");
                return None;
            }

            state = registry.wait(state);
        }
        drop(state);

        // Pending entries are pushed before their enqueue, so this returns promptly
        let Some(address) = registry.queue().dequeue() else {
            error!("Ingestion queue disconnected");
            self.flush(rt_handle);
            return None;
        };
        registry.lock_state().take_pending(&address);
        Some(address)
    }

    fn flush(&mut self, rt_handle: &Handle) {
        let outcome = rt_handle.block_on(self.batcher.flush(&mut self.batch));
        match outcome {
            FlushOutcome::Saved(_) => self.report.flushes += 1,
            FlushOutcome::Dropped(count) => self.report.dropped += count,
            FlushOutcome::Empty | FlushOutcome::Retained { .. } => {}
        }
        self.retry_at = (!outcome.is_settled())
            .then(|| Instant::now() + self.settings.flush_retry_interval);
    }

    /// Time left before a retained batch may be retried
    fn retry_wait(&self) -> Option<Duration> {
        self.retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .filter(|wait| !wait.is_zero())
    }
}

/// Running worker thread
pub struct WorkerHandle {
    registry: Arc<Registry>,
    thread: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Wait for the worker to exit on its own
    pub fn join(self) -> Result<WorkerReport> {
        self.thread
            .join()
            .map_err(|_| Error::Internal("Enrichment worker panicked".to_string()))
    }

    /// Signal shutdown, then wait for the final flush
    pub fn shutdown(self) -> Result<WorkerReport> {
        info!("Shutting down enrichment worker");
        self.registry.shutdown();
        self.join()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
