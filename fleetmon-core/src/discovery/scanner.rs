//! Concurrent network scanning
//!
//! [`Prober::scan`] expands the ranges lazily and probes them through a
//! bounded pool. Live hosts are delivered through a [`ScanStream`] while the
//! scan runs; [`ScanStream::finish`] reports the totals.

use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::probe::{Probe, ProbeOutcome};
use super::range::{AddressRange, expand, total_addresses};
use crate::cancel::CancellationToken;
use crate::error::{ScanError, ScanResult};
use crate::models::{DiscoveryOrigin, Host};
use crate::registry::FleetRegistry;
use crate::trace_operation;
use crate::tracing::span_names;

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of probes in flight
pub const DEFAULT_SCAN_CONCURRENCY: usize = 64;

/// Tunables for one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Upper bound for each probe; a probe that exceeds it counts as not live
    pub probe_timeout: Duration,
    /// Probes in flight at once
    pub max_concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }
}

/// A live address found by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredHost {
    /// The address that answered
    pub address: Ipv4Addr,
    /// SSH identification string, if the probe read one
    pub banner: Option<String>,
    /// Time to answer
    pub latency: Duration,
}

/// Totals reported when a scan completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Scan job id
    pub job_id: Uuid,
    /// Probes completed
    pub attempted: u64,
    /// Addresses found live
    pub live: u64,
    /// Probes that errored (counted, never fatal)
    pub failed: u64,
    /// True if the scan stopped early
    pub cancelled: bool,
    /// Wall-clock duration
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ScanCounters {
    attempted: AtomicU64,
    live: AtomicU64,
    failed: AtomicU64,
}

/// Progress of a running scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    /// Probes completed so far
    pub attempted: u64,
    /// Live addresses so far
    pub live: u64,
    /// Failed probes so far
    pub failed: u64,
    /// Addresses covered by the ranges
    pub total: u64,
}

/// One in-flight discovery
#[derive(Debug, Clone)]
pub struct ScanJob {
    id: Uuid,
    ranges: Vec<AddressRange>,
    cancel: CancellationToken,
    counters: Arc<ScanCounters>,
}

impl ScanJob {
    /// Job id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Ranges being scanned
    #[must_use]
    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Stops dispatching new probes; in-flight probes finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Results so far
    #[must_use]
    pub fn progress(&self) -> ScanProgress {
        ScanProgress {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            live: self.counters.live.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            total: total_addresses(&self.ranges),
        }
    }
}

/// Runs scans with one probe mechanism; at most one scan at a time
pub struct Prober {
    probe: Arc<dyn Probe>,
    active: Arc<Mutex<Option<Uuid>>>,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("probe", &self.probe.name())
            .field("active", &self.active_job())
            .finish()
    }
}

/// Clears the active-scan slot when the scan task ends
struct ActiveSlot {
    active: Arc<Mutex<Option<Uuid>>>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Prober {
    /// Creates a prober using `probe`
    #[must_use]
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self {
            probe,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Id of the running scan, if any
    #[must_use]
    pub fn active_job(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while a scan is running
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.active_job().is_some()
    }

    /// Starts a scan.
    ///
    /// # Errors
    ///
    /// - [`ScanError::EmptyRanges`] if `ranges` is empty
    /// - [`ScanError::ProbeUnavailable`] if the mechanism cannot run
    /// - [`ScanError::AlreadyRunning`] if another scan is active
    pub async fn scan(
        &self,
        ranges: Vec<AddressRange>,
        options: ScanOptions,
    ) -> ScanResult<ScanStream> {
        self.scan_with_cancel(ranges, options, CancellationToken::new())
            .await
    }

    /// Starts a scan that stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`scan`](Self::scan).
    pub async fn scan_with_cancel(
        &self,
        ranges: Vec<AddressRange>,
        options: ScanOptions,
        cancel: CancellationToken,
    ) -> ScanResult<ScanStream> {
        if ranges.is_empty() {
            return Err(ScanError::EmptyRanges);
        }
        self.probe.check_available().await?;

        let id = Uuid::new_v4();
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(running) = *active {
                return Err(ScanError::AlreadyRunning(running));
            }
            *active = Some(id);
        }
        let slot = ActiveSlot {
            active: Arc::clone(&self.active),
        };

        let job = ScanJob {
            id,
            ranges,
            cancel,
            counters: Arc::new(ScanCounters::default()),
        };
        let concurrency = options.max_concurrency.max(1);
        let (tx, rx) = mpsc::channel(concurrency * 2);

        tracing::info!(
            job = %id,
            ranges = job.ranges.len(),
            addresses = total_addresses(&job.ranges),
            probe = self.probe.name(),
            concurrency,
            timeout_ms = options.probe_timeout.as_millis() as u64,
            "Scan started"
        );

        let span = trace_operation!(span_names::SCAN_RUN, job_id = %id);
        let task = tokio::spawn(
            run_scan(
                job.clone(),
                Arc::clone(&self.probe),
                options.probe_timeout,
                concurrency,
                tx,
                slot,
            )
            .instrument(span),
        );

        Ok(ScanStream {
            rx,
            task: Some(task),
            job,
            started: Instant::now(),
        })
    }
}

async fn run_scan(
    job: ScanJob,
    probe: Arc<dyn Probe>,
    probe_timeout: Duration,
    concurrency: usize,
    tx: mpsc::Sender<DiscoveredHost>,
    _slot: ActiveSlot,
) {
    let gate = job.cancel.clone();
    // take_while is consulted before each dispatch, so cancelling stops new
    // probes while the ones already in the pool drain
    let addresses = expand(&job.ranges).take_while(move |_| !gate.is_cancelled());

    let mut results = stream::iter(addresses)
        .map(|addr| {
            let probe = Arc::clone(&probe);
            async move {
                let outcome = tokio::time::timeout(probe_timeout, probe.probe(addr, probe_timeout))
                    .await
                    .unwrap_or(ProbeOutcome::NotLive);
                (addr, outcome)
            }
        })
        .buffer_unordered(concurrency);

    while let Some((address, outcome)) = results.next().await {
        job.counters.attempted.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ProbeOutcome::Live { banner, latency } => {
                job.counters.live.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job = %job.id, host = %address, latency_ms = latency.as_millis() as u64, "Host live");
                let found = DiscoveredHost {
                    address,
                    banner,
                    latency,
                };
                if tx.send(found).await.is_err() {
                    // Consumer went away
                    job.cancel.cancel();
                }
            }
            ProbeOutcome::NotLive => {}
            ProbeOutcome::Failed(reason) => {
                job.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(job = %job.id, host = %address, error = %reason, "Probe failed");
            }
        }
    }
}

/// Live results of a running scan
///
/// Yields each [`DiscoveredHost`] as it is found. The stream ends when every
/// address has been probed or the scan was cancelled and drained; it cannot
/// be restarted. Dropping the stream before the scan ends cancels it.
pub struct ScanStream {
    rx: mpsc::Receiver<DiscoveredHost>,
    task: Option<JoinHandle<()>>,
    job: ScanJob,
    started: Instant,
}

impl std::fmt::Debug for ScanStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStream").field("job", &self.job.id).finish()
    }
}

impl ScanStream {
    /// The job behind this stream
    #[must_use]
    pub const fn job(&self) -> &ScanJob {
        &self.job
    }

    /// Stops dispatching new probes; already delivered and in-flight
    /// results are still yielded
    pub fn cancel(&self) {
        self.job.cancel();
    }

    /// Waits for the scan to end, discarding undelivered results
    pub async fn finish(mut self) -> ScanSummary {
        while self.rx.recv().await.is_some() {}
        self.complete().await
    }

    /// Waits for the scan to end and returns every remaining result
    pub async fn collect_all(mut self) -> (Vec<DiscoveredHost>, ScanSummary) {
        let mut found = Vec::new();
        while let Some(host) = self.rx.recv().await {
            found.push(host);
        }
        let summary = self.complete().await;
        (found, summary)
    }

    /// Adds every remaining live host to `registry` as `Discovered` /
    /// `Scanned`. Known addresses are left untouched.
    ///
    /// Returns the hosts that were newly registered.
    pub async fn ingest(mut self, registry: &FleetRegistry) -> (Vec<DiscoveredHost>, ScanSummary) {
        let mut added = Vec::new();
        while let Some(found) = self.rx.recv().await {
            if registry.insert(Host::new(found.address.to_string(), DiscoveryOrigin::Scanned)) {
                added.push(found);
            }
        }
        let summary = self.complete().await;
        (added, summary)
    }

    async fn complete(&mut self) -> ScanSummary {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(job = %self.job.id, error = %e, "Scan task failed");
        }

        let progress = self.job.progress();
        let summary = ScanSummary {
            job_id: self.job.id,
            attempted: progress.attempted,
            live: progress.live,
            failed: progress.failed,
            cancelled: self.job.cancel.is_cancelled(),
            elapsed: self.started.elapsed(),
        };
        tracing::info!(
            job = %summary.job_id,
            attempted = summary.attempted,
            live = summary.live,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.elapsed.as_millis() as u64,
            "Scan finished"
        );
        summary
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!(job = %self.job.id, "Scan stream dropped, cancelling");
            self.job.cancel();
        }
    }
}

impl Stream for ScanStream {
    type Item = DiscoveredHost;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
