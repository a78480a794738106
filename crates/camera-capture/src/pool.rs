//! Capture buffer pool

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
}

impl PoolInner {
    fn free(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed set of capture buffers owned by the producer.
///
/// Buffers come back automatically when the [`PooledBuffer`] handle drops.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Pre-allocate `count` buffers of `buffer_size` bytes
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let free = (0..count).map(|_| vec![0u8; buffer_size]).collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
            }),
        }
    }

    /// Take a free buffer, `None` when every buffer is in flight
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let data = self.inner.free().pop()?;
        Some(PooledBuffer {
            data: Some(data),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Buffers currently free
    pub fn available(&self) -> usize {
        self.inner.free().len()
    }
}

/// Capture buffer on loan from a [`BufferPool`]
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.free().push(data);
        }
    }
}
