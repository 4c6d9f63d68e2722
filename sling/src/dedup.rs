//! In-flight deduplication.
//!
//! A map from fingerprint to the pending result of an already-issued
//! equivalent request. Late arrivals are handed the same eventual result —
//! success or failure — instead of issuing a second network exchange.
//!
//! Entries are removed as soon as the owning attempt settles, in both the
//! success and failure paths, so a future identical request is never joined
//! to a resolved entry. Check-and-register is a single map-entry operation
//! with no suspension point, which upholds the invariant: at most one
//! exchange in flight per fingerprint while deduplication is enabled.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sling_core::{Error, Fingerprint, RequestConfig, ResponseEnvelope};
use tokio::sync::broadcast;
use tracing::{debug, trace};

type Shared = Result<ResponseEnvelope, Error>;

/// Outcome of a deduplication check.
pub enum DedupDecision {
    /// No equivalent request in flight: the caller owns the exchange and
    /// must settle the guard when it completes.
    Execute(InflightGuard),
    /// An equivalent request is in flight: await its shared result.
    Join(broadcast::Receiver<Shared>),
}

/// Table of in-flight requests keyed by fingerprint.
#[derive(Debug, Default)]
pub struct DedupTable {
    inflight: Arc<DashMap<Fingerprint, broadcast::Sender<Shared>>>,
}

impl DedupTable {
    /// New empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether an equivalent request is already in flight.
    pub fn check(&self, fingerprint: &Fingerprint) -> DedupDecision {
        match self.inflight.entry(fingerprint.clone()) {
            Entry::Occupied(occupied) => {
                debug!(%fingerprint, "joining in-flight request");
                DedupDecision::Join(occupied.get().subscribe())
            }
            Entry::Vacant(vacant) => {
                trace!(%fingerprint, "registering in-flight request");
                let (tx, _rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                DedupDecision::Execute(InflightGuard {
                    table: Arc::clone(&self.inflight),
                    fingerprint: fingerprint.clone(),
                    tx,
                    settled: false,
                })
            }
        }
    }

    /// Number of in-flight entries, for tests and introspection.
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether no request is currently registered.
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Registration handle held by the caller that owns the exchange.
///
/// Dropping the guard without settling (e.g. the owner was cancelled)
/// deregisters the entry; joined callers then observe an abort.
pub struct InflightGuard {
    table: Arc<DashMap<Fingerprint, broadcast::Sender<Shared>>>,
    fingerprint: Fingerprint,
    tx: broadcast::Sender<Shared>,
    settled: bool,
}

impl InflightGuard {
    /// Settles the in-flight entry: deregisters it, then hands every joined
    /// caller a clone of the result. Deregistration happens first so no new
    /// caller can join a settled entry.
    pub fn settle(mut self, result: Shared) -> Shared {
        self.table.remove(&self.fingerprint);
        self.settled = true;
        let waiters = self.tx.receiver_count();
        if waiters > 0 {
            trace!(fingerprint = %self.fingerprint, waiters, "broadcasting settled result");
        }
        let _ = self.tx.send(result.clone());
        result
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.table.remove(&self.fingerprint);
        }
    }
}

/// Awaits the shared result of a joined request. A closed channel means the
/// owner went away without settling; the joiner observes an abort.
pub async fn await_shared(
    mut rx: broadcast::Receiver<Shared>,
    config: &RequestConfig,
) -> Shared {
    match rx.recv().await {
        Ok(result) => result,
        Err(_) => Err(Error::aborted(config)),
    }
}
