//! Concurrent fetch engine.
//!
//! A fetch call races `workers` identical attempt loops against the upstream.
//! The first worker to see a 200 hands its response to the caller through a
//! single-slot channel; every other response is released unread. Statuses
//! marked terminal by the [`StatusPolicy`] stop a worker at once, anything
//! else non-200 is retried until the worker's attempt budget runs out.
//!
//! With `workers = 1` the same loop is the sequential fetch path.

use crate::config::FetchConfig;
use crate::error::{ErrorKind, FetchError, Result, TransportError};
use crate::materialize::{materialize, FetchOutcome};
use crate::policy::{StatusPolicy, Verdict};
use crate::request::{FetchRequest, PreparedRequest};
use crate::transport::{Exchange, ReqwestTransport, Transport};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Races parallel attempts of one request and returns the first success.
pub struct FetchEngine<T: Transport = ReqwestTransport> {
    transport: Arc<T>,
    config: FetchConfig,
    policy: Arc<StatusPolicy>,
}

impl<T: Transport> Clone for FetchEngine<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl FetchEngine<ReqwestTransport> {
    /// Engine over a fresh pooled HTTP client.
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self::with_transport(ReqwestTransport::new()?, config))
    }
}

impl<T: Transport> FetchEngine<T> {
    pub fn with_transport(transport: T, config: FetchConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    pub fn from_shared(transport: Arc<T>, config: FetchConfig) -> Self {
        Self {
            transport,
            config: config.validated(),
            policy: Arc::new(StatusPolicy::default()),
        }
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// An engine sharing this one's transport and policy under another profile.
    pub fn profile(&self, config: FetchConfig) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: config.validated(),
            policy: Arc::clone(&self.policy),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn policy(&self) -> &StatusPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Fetch `request` and shape the winning body per its expectation.
    ///
    /// All workers are told to stop before this returns; any still running
    /// are aborted when the call's worker set is dropped.
    pub async fn fetch<D: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome<D>> {
        let prepared = Arc::new(request.prepare()?);
        let Winner {
            exchange,
            worker,
            attempt,
        } = self.race(prepared, cancel).await?;

        let status = exchange.status;
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::cancelled()),
            payload = materialize(exchange.body, request.expectation) => payload?,
        };

        Ok(FetchOutcome {
            status,
            payload,
            worker,
            attempt,
        })
    }

    /// Fetch and decode a JSON body into `D`.
    pub async fn fetch_json<D: DeserializeOwned>(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<D> {
        self.fetch::<D>(&request.json(), cancel)
            .await?
            .payload
            .into_decoded()
            .ok_or_else(|| FetchError::unexpected("JSON fetch produced a raw payload"))
    }

    /// Fetch the raw body.
    pub async fn fetch_bytes(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.fetch::<IgnoredAny>(&request.bytes(), cancel)
            .await?
            .payload
            .into_raw()
            .ok_or_else(|| FetchError::unexpected("bytes fetch produced a decoded payload"))
    }

    /// Fetch the body as text, replacing invalid UTF-8.
    pub async fn fetch_text(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let bytes = self.fetch_bytes(request, cancel).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Diagnostic fetch on a single worker with this engine's attempt budget.
    pub async fn probe(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<String> {
        let sequential = self.profile(self.config.clone().with_workers(1));
        let body = sequential.fetch_text(request, cancel).await?;
        info!(bytes = body.len(), "Probe succeeded");
        Ok(body)
    }

    async fn race(
        &self,
        request: Arc<PreparedRequest>,
        cancel: &CancellationToken,
    ) -> Result<Winner<T::Body>> {
        if cancel.is_cancelled() {
            return Err(FetchError::cancelled());
        }

        // Cancelled on every way out of this function.
        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let (slot, mut winners) = mpsc::channel(1);
        let mut workers = JoinSet::new();
        for id in 1..=self.config.workers {
            let worker = Worker {
                id,
                transport: Arc::clone(&self.transport),
                policy: Arc::clone(&self.policy),
                request: Arc::clone(&request),
                config: self.config.clone(),
                cancel: scope.clone(),
                slot: slot.clone(),
            };
            workers.spawn(worker.run());
        }
        // The channel closes once the last worker is gone.
        drop(slot);

        debug!(
            method = %request.method,
            url = %request.url,
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            "Racing fetch workers"
        );

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(url = %request.url, "Fetch cancelled by caller");
                return Err(FetchError::cancelled());
            }
            delivered = winners.recv() => delivered,
        };

        if let Some(winner) = delivered {
            winners.close();
            scope.cancel();
            debug!(
                url = %request.url,
                worker = winner.worker,
                attempt = winner.attempt,
                "Fetch race won"
            );
            return Ok(winner);
        }

        let mut exits = Vec::with_capacity(self.config.workers);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(exit) => exits.push(exit),
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Fetch worker did not finish");
                    exits.push(WorkerExit::Exhausted(FetchError::service(format!(
                        "worker failed: {}",
                        e
                    ))));
                }
            }
        }

        let error = aggregate_failures(&exits);
        warn!(
            url = %request.url,
            kind = %error.kind(),
            error = %error,
            "No fetch worker succeeded"
        );
        Err(error)
    }
}

struct Winner<B> {
    exchange: Exchange<B>,
    worker: usize,
    attempt: u32,
}

#[derive(Debug)]
enum WorkerExit {
    Delivered,
    /// Got a 200 after the race was already won.
    Discarded,
    Exhausted(FetchError),
    Terminal(FetchError),
    Cancelled,
}

struct Worker<T: Transport> {
    id: usize,
    transport: Arc<T>,
    policy: Arc<StatusPolicy>,
    request: Arc<PreparedRequest>,
    config: FetchConfig,
    cancel: CancellationToken,
    slot: mpsc::Sender<Winner<T::Body>>,
}

impl<T: Transport> Worker<T> {
    async fn run(self) -> WorkerExit {
        let timeout = self.config.attempt_timeout;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            // No attempt starts once the race is decided.
            if self.cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            if attempt > 1 && !self.config.retry_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return WorkerExit::Cancelled,
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WorkerExit::Cancelled,
                sent = tokio::time::timeout(timeout, self.transport.send(&self.request, timeout)) => {
                    sent.unwrap_or_else(|_| Err(TransportError::Timeout(timeout)))
                }
            };

            let exchange = match sent {
                Ok(exchange) => exchange,
                Err(e) => {
                    warn!(
                        worker = self.id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        url = %self.request.url,
                        error = %e,
                        "Fetch attempt failed, retrying"
                    );
                    last_error = Some(FetchError::service(format!(
                        "{} failed: {}",
                        self.request.url, e
                    )));
                    continue;
                }
            };

            let status = exchange.status;
            match self.policy.classify(status) {
                Verdict::Success => return self.deliver(exchange, attempt),
                Verdict::Terminal(kind) => {
                    warn!(
                        worker = self.id,
                        attempt,
                        status = status.as_u16(),
                        kind = %kind,
                        url = %self.request.url,
                        "Terminal status, worker stopping"
                    );
                    return WorkerExit::Terminal(
                        FetchError::new(kind, format!("{} returned {}", self.request.url, status))
                            .with_status(status),
                    );
                }
                Verdict::Retry => {
                    warn!(
                        worker = self.id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        status = status.as_u16(),
                        url = %self.request.url,
                        "Unexpected status, retrying"
                    );
                    drop(exchange);
                    last_error = Some(
                        FetchError::service(format!("{} returned {}", self.request.url, status))
                            .with_status(status),
                    );
                }
            }
        }

        let error = last_error.unwrap_or_else(|| FetchError::service("no attempt was made"));
        warn!(
            worker = self.id,
            max_attempts = self.config.max_attempts,
            url = %self.request.url,
            error = %error,
            "Worker exhausted its attempts"
        );
        WorkerExit::Exhausted(error)
    }

    fn deliver(self, exchange: Exchange<T::Body>, attempt: u32) -> WorkerExit {
        let winner = Winner {
            exchange,
            worker: self.id,
            attempt,
        };
        match self.slot.try_send(winner) {
            Ok(()) => {
                debug!(worker = self.id, attempt, "Worker delivered response");
                WorkerExit::Delivered
            }
            Err(TrySendError::Full(late)) | Err(TrySendError::Closed(late)) => {
                debug!(
                    worker = self.id,
                    attempt,
                    "Race already won, releasing late response"
                );
                drop(late);
                WorkerExit::Discarded
            }
        }
    }
}

/// One error for a race nobody won.
///
/// A single failure kind across all workers is reported as that kind, so a
/// uniform 429 surfaces as `TooManyRequests`. Mixed kinds become a
/// `ServiceError` listing what was seen.
fn aggregate_failures(exits: &[WorkerExit]) -> FetchError {
    let failures: Vec<&FetchError> = exits
        .iter()
        .filter_map(|exit| match exit {
            WorkerExit::Exhausted(e) | WorkerExit::Terminal(e) => Some(e),
            _ => None,
        })
        .collect();

    if failures.is_empty() {
        if !exits.is_empty() && exits.iter().all(|exit| matches!(exit, WorkerExit::Cancelled)) {
            return FetchError::cancelled();
        }
        return FetchError::service("no worker returned a response");
    }

    let mut counts: BTreeMap<ErrorKind, usize> = BTreeMap::new();
    for failure in &failures {
        *counts.entry(failure.kind()).or_default() += 1;
    }
    let statuses: BTreeSet<u16> = failures
        .iter()
        .filter_map(|e| e.status())
        .map(|status| status.as_u16())
        .collect();

    let error = if counts.len() == 1 {
        let kind = failures[0].kind();
        FetchError::new(
            kind,
            format!(
                "all {} workers failed, last error: {}",
                failures.len(),
                failures[0].message()
            ),
        )
    } else {
        let summary = counts
            .iter()
            .map(|(kind, count)| format!("{} x {}", count, kind))
            .collect::<Vec<_>>()
            .join(", ");
        FetchError::service(format!("no worker returned a response ({})", summary))
    };

    match statuses.iter().next() {
        Some(&code) if statuses.len() == 1 => match StatusCode::from_u16(code) {
            Ok(status) => error.with_status(status),
            Err(_) => error,
        },
        _ => error,
    }
}
