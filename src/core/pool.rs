//! # Buffer Pool
//!
//! Size-classed object pool for packet body buffers, eliminating per-packet
//! allocation on the receive and send paths.
//!
//! Capacity classes grow geometrically (x4) from [`MIN_CLASS_CAPACITY`] up to
//! [`MAX_CLASS_CAPACITY`]; a request is rounded up to the smallest class that
//! fits. Every pooled buffer reserves header room in front of the body so a
//! packet's header and body share one contiguous allocation.
//!
//! Requests below the minimum class get a fresh small buffer that is never
//! pooled; the pool bookkeeping would cost more than the allocation.

use std::sync::{Mutex, OnceLock};

use crate::core::packet::HEADER_LEN;

/// Smallest pooled body capacity.
pub const MIN_CLASS_CAPACITY: usize = 64;

/// Largest pooled body capacity. Bodies above this are allocated directly
/// and returned to the allocator on release.
pub const MAX_CLASS_CAPACITY: usize = 16 * 1024 * 1024;

/// Geometric growth factor between adjacent classes.
const CLASS_GROWTH: usize = 4;

/// Upper bound on retained buffers per class.
const MAX_POOLED_PER_CLASS: usize = 256;

struct SizeClass {
    /// Body capacity of every buffer in this class.
    capacity: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// Thread-safe size-classed buffer pool.
///
/// One process-wide instance is shared by all connections; see
/// [`BufferPool::global`].
pub struct BufferPool {
    classes: Vec<SizeClass>,
}

impl BufferPool {
    /// Build the class ladder: 64, 256, 1K, 4K, ... up to [`MAX_CLASS_CAPACITY`].
    pub fn new() -> Self {
        let mut classes = Vec::new();
        let mut capacity = MIN_CLASS_CAPACITY;
        while capacity <= MAX_CLASS_CAPACITY {
            classes.push(SizeClass {
                capacity,
                free: Mutex::new(Vec::new()),
            });
            capacity *= CLASS_GROWTH;
        }
        Self { classes }
    }

    /// The shared process-wide pool.
    pub fn global() -> &'static BufferPool {
        static GLOBAL: OnceLock<BufferPool> = OnceLock::new();
        GLOBAL.get_or_init(BufferPool::new)
    }

    /// Body capacity of the class a request for `need` bytes rounds up to,
    /// or `None` when the request is below the minimum class or above the
    /// largest class.
    pub fn class_capacity(&self, need: usize) -> Option<usize> {
        if need < MIN_CLASS_CAPACITY {
            return None;
        }
        self.classes
            .iter()
            .map(|c| c.capacity)
            .find(|&capacity| capacity >= need)
    }

    /// Obtain an empty buffer with room for the header plus at least `need`
    /// body bytes. Pool-sourced when `need` lands in a class, freshly
    /// allocated otherwise.
    pub fn acquire(&self, need: usize) -> Vec<u8> {
        let Some(class) = self
            .classes
            .iter()
            .find(|c| c.capacity >= need && need >= MIN_CLASS_CAPACITY)
        else {
            return Vec::with_capacity(HEADER_LEN + need);
        };

        let reused = match class.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => None,
        };
        reused.unwrap_or_else(|| Vec::with_capacity(HEADER_LEN + class.capacity))
    }

    /// Return a buffer to its class. Buffers whose capacity does not match a
    /// class exactly (small inline buffers, oversized one-offs) are dropped.
    pub fn release(&self, mut buf: Vec<u8>) {
        // Length reset so the next owner can never observe stale bytes.
        buf.clear();

        let Some(class) = self
            .classes
            .iter()
            .find(|c| c.capacity + HEADER_LEN == buf.capacity())
        else {
            return;
        };

        if let Ok(mut free) = class.free.lock() {
            if free.len() < MAX_POOLED_PER_CLASS {
                free.push(buf);
            }
        }
    }

    /// Number of idle buffers currently held for the class that would serve
    /// a request of `need` bytes.
    pub fn available(&self, need: usize) -> usize {
        self.class_capacity(need)
            .and_then(|capacity| self.classes.iter().find(|c| c.capacity == capacity))
            .and_then(|class| class.free.lock().ok().map(|f| f.len()))
            .unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
