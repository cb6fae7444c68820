//! Host-backed device buffers with an optional byte budget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;
use pwfft_core::{EngineError, EngineResult, MemoryInfo};

/// Tracks bytes handed out to buffers against an optional limit.
#[derive(Debug, Default)]
pub(crate) struct MemoryPool {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl MemoryPool {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub(crate) fn info(&self) -> Option<MemoryInfo> {
        self.limit.map(|total| MemoryInfo {
            free: total.saturating_sub(self.used()),
            total,
        })
    }

    #[track_caller]
    pub(crate) fn reserve(self: &Arc<Self>, what: &'static str, bytes: usize) -> EngineResult<Reservation> {
        if let Some(limit) = self.limit {
            let mut current = self.used.load(Ordering::Acquire);
            loop {
                let next = current
                    .checked_add(bytes)
                    .filter(|&next| next <= limit)
                    .ok_or_else(|| EngineError::exhausted(what, bytes).with_memory(self.info()))?;
                match self
                    .used
                    .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        } else {
            self.used.fetch_add(bytes, Ordering::AcqRel);
        }
        trace!("reserved {bytes} bytes for {what}");
        Ok(Reservation {
            pool: Arc::clone(self),
            bytes,
        })
    }
}

/// Bytes held against a [`MemoryPool`]; returned on drop.
#[derive(Debug)]
pub(crate) struct Reservation {
    pool: Arc<MemoryPool>,
    bytes: usize,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// A buffer of `f64` scalars. Streams share the storage through the
/// inner `Arc` while work on it is queued.
#[derive(Debug)]
pub struct CpuBuffer {
    pub(crate) data: Arc<Mutex<Vec<f64>>>,
    len: usize,
    _reservation: Reservation,
}

impl CpuBuffer {
    pub(crate) fn new(pool: &Arc<MemoryPool>, len: usize) -> EngineResult<Self> {
        let bytes = len
            .checked_mul(std::mem::size_of::<f64>())
            .ok_or_else(|| EngineError::exhausted("buffer", usize::MAX))?;
        let reservation = pool.reserve("buffer", bytes)?;
        Ok(Self {
            data: Arc::new(Mutex::new(vec![0.0; len])),
            len,
            _reservation: reservation,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A buffer of `i32` offsets.
#[derive(Debug)]
pub struct CpuIndexBuffer {
    pub(crate) data: Arc<Mutex<Vec<i32>>>,
    len: usize,
    _reservation: Reservation,
}

impl CpuIndexBuffer {
    pub(crate) fn new(pool: &Arc<MemoryPool>, len: usize) -> EngineResult<Self> {
        let bytes = len
            .checked_mul(std::mem::size_of::<i32>())
            .ok_or_else(|| EngineError::exhausted("index buffer", usize::MAX))?;
        let reservation = pool.reserve("index buffer", bytes)?;
        Ok(Self {
            data: Arc::new(Mutex::new(vec![0; len])),
            len,
            _reservation: reservation,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
