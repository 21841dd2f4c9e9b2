// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Pooled marshal buffers
//!
//! [`BufferPool::acquire`] hands out a [`PooledBuffer`] that owns its bytes
//! exclusively. The buffer goes back to the pool when the guard is dropped, on
//! success and error paths alike, so the release happens exactly once and
//! never while the bytes are still reachable.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use transit_config::Configuration;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferPoolConfigError {
    #[error("max_retained must be greater than zero")]
    NoRetainedBuffers,
    #[error("initial_capacity ({initial}) exceeds max_buffer_capacity ({max})")]
    InitialCapacityTooLarge { initial: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Capacity of freshly allocated buffers
    pub initial_capacity: usize,
    /// Number of idle buffers kept for reuse
    pub max_retained: usize,
    /// Buffers that grew beyond this capacity are dropped instead of reused
    pub max_buffer_capacity: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            initial_capacity: 4 * 1024,
            max_retained: 64,
            max_buffer_capacity: 1024 * 1024,
        }
    }
}

impl Configuration for BufferPoolConfig {
    type Error = BufferPoolConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.max_retained == 0 {
            return Err(BufferPoolConfigError::NoRetainedBuffers);
        }
        if self.initial_capacity > self.max_buffer_capacity {
            return Err(BufferPoolConfigError::InitialCapacityTooLarge {
                initial: self.initial_capacity,
                max: self.max_buffer_capacity,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PoolInner {
    config: BufferPoolConfig,
    idle: Mutex<Vec<BytesMut>>,
    outstanding: AtomicUsize,
}

impl PoolInner {
    fn release(&self, mut buf: BytesMut) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if buf.capacity() > self.config.max_buffer_capacity {
            return;
        }
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_retained {
            idle.push(buf);
        }
    }
}

/// Pool of reusable scratch buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                config,
                idle: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a buffer out of the pool, allocating one if none is idle
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.config.initial_capacity));
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);

        PooledBuffer {
            buf,
            pool: self.inner.clone(),
        }
    }

    /// Number of buffers ready for reuse
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Number of buffers currently handed out
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.inner.config
    }
}

/// A buffer borrowed from a [`BufferPool`], returned on drop
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_buffer_returns_to_pool_on_drop() {
        let pool = BufferPool::default();
        {
            let mut buf = pool.acquire();
            buf.put_slice(b"hello");
            assert_eq!(pool.outstanding(), 1);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle(), 1);

        // the recycled buffer comes back empty
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_concurrent_buffers_are_distinct() {
        let pool = BufferPool::default();
        let mut a = pool.acquire();
        let mut b = pool.acquire();
        a.put_slice(b"aaaa");
        b.put_slice(b"bb");
        assert_eq!(a.as_slice(), b"aaaa");
        assert_eq!(b.as_slice(), b"bb");
        assert_eq!(pool.outstanding(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_oversized_buffers_are_not_retained() {
        let pool = BufferPool::new(BufferPoolConfig {
            initial_capacity: 8,
            max_retained: 4,
            max_buffer_capacity: 16,
        });
        {
            let mut buf = pool.acquire();
            buf.put_slice(&[0u8; 64]);
        }
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_retention_limit() {
        let pool = BufferPool::new(BufferPoolConfig {
            max_retained: 1,
            ..Default::default()
        });
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(BufferPoolConfig::default().validate().is_ok());
        assert_eq!(
            BufferPoolConfig {
                max_retained: 0,
                ..Default::default()
            }
            .validate(),
            Err(BufferPoolConfigError::NoRetainedBuffers)
        );

        let config: BufferPoolConfig =
            serde_yaml::from_str("initial_capacity: 2048\nmax_buffer_capacity: 1024\n").unwrap();
        assert_eq!(config.max_retained, 64);
        assert_eq!(
            config.validate(),
            Err(BufferPoolConfigError::InitialCapacityTooLarge {
                initial: 2048,
                max: 1024
            })
        );
    }
}
