// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::{
        config::BufferPoolConfig,
        memzone::MemZone,
    },
};
use ::std::sync::Arc;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Maximum number of buffers moved by a single hardware acquire or release command.
pub const DPAA2_MBUF_MAX_ACQ_REL: usize = 7;

/// Buffer pool ids are below this value.
pub const MAX_BPID: usize = 256;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Hardware Buffer Pool
///
/// A pool of fixed-size DMA buffers managed by the buffer manager. Buffers cross this boundary as bus addresses. A
/// single call moves at most [DPAA2_MBUF_MAX_ACQ_REL] buffers, and implementations must be safe to call from several
/// cores at once.
pub trait HwBufferPool: Send + Sync {
    /// Id of this pool.
    fn bpid(&self) -> u16;

    /// Memory zone that backs the buffers of this pool.
    fn zone(&self) -> MemZone;

    /// Acquires up to `min(bufs.len(), DPAA2_MBUF_MAX_ACQ_REL)` buffers, writing their bus addresses to the front of
    /// `bufs`. Returns how many buffers were acquired, which is zero when the pool is empty.
    fn acquire(&self, bufs: &mut [u64]) -> usize;

    /// Releases the buffers whose bus addresses are in `bufs` back to this pool.
    fn release(&self, bufs: &[u64]) -> Result<(), Fail>;

    /// Number of free buffers in this pool.
    fn available(&self) -> usize;

    /// Returns `true` if `addr` is the bus address of the start of one of the buffers of this pool.
    fn owns(&self, addr: u64) -> bool;
}

/// Buffer Pool Provider
///
/// Registers and tears down hardware buffer pools.
pub trait PoolProvider {
    /// Registers a new hardware buffer pool seeded as described by `config`.
    fn create_pool(&self, config: &BufferPoolConfig) -> Result<Arc<dyn HwBufferPool>, Fail>;

    /// Tears down a hardware buffer pool previously registered by [PoolProvider::create_pool].
    fn destroy_pool(&self, pool: &Arc<dyn HwBufferPool>);
}
