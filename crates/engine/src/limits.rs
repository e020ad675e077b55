use crate::error::{EngineError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) const MAX_WORKERS: usize = 64;

/// Available cores, clamped to the worker range
pub(crate) fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_WORKERS)
}

pub(crate) fn parse_worker_count(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_WORKERS)
}

/// Zero counts as unparseable: every numeric engine limit must be positive.
pub(crate) fn parse_positive<T>(raw: Option<&str>, default_value: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default_value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// Bounded pool of per-file parse slots shared by analysis and updates
#[derive(Debug, Clone)]
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: Arc<AtomicUsize>,
    waiters: Arc<AtomicUsize>,
}

pub(crate) struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard(Arc<AtomicUsize>);

impl WaiterGuard {
    fn new(waiters: &Arc<AtomicUsize>) -> Self {
        waiters.fetch_add(1, Ordering::Relaxed);
        Self(waiters.clone())
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub(crate) fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_WORKERS);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) async fn acquire(&self) -> Result<WorkerPermit> {
        let waiter = WaiterGuard::new(&self.waiters);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Other("worker pool closed".to_string()))?;
        drop(waiter);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(WorkerPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub(crate) fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            limit: self.limit,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed),
        }
    }
}
