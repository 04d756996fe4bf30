// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::{
        config::BufferPoolConfig,
        hw_pool::{
            HwBufferPool,
            DPAA2_MBUF_MAX_ACQ_REL,
        },
        memzone::MemZone,
    },
};
use ::std::{
    fmt,
    sync::Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// This structure pairs a registered [HwBufferPool] with the configuration it was created from. Hardware moves at most
/// [DPAA2_MBUF_MAX_ACQ_REL] buffers per command, so the bulk operations here loop over batches of that size.
pub struct BufferPool {
    config: BufferPoolConfig,
    hw: Arc<dyn HwBufferPool>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BufferPool {
    pub fn new(config: BufferPoolConfig, hw: Arc<dyn HwBufferPool>) -> Self {
        Self { config, hw }
    }

    pub fn bpid(&self) -> u16 {
        self.hw.bpid()
    }

    /// Size of each buffer, headroom included.
    pub fn buf_size(&self) -> u32 {
        self.config.get_buf_size()
    }

    /// Bytes available for frame data in each buffer.
    pub fn data_room(&self) -> u32 {
        self.config.get_data_room()
    }

    pub fn meta_data_size(&self) -> u16 {
        self.config.get_meta_data_size()
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    pub fn zone(&self) -> MemZone {
        self.hw.zone()
    }

    /// Number of free buffers in the underlying hardware pool.
    pub fn available(&self) -> usize {
        self.hw.available()
    }

    /// Get a reference to the underlying [HwBufferPool].
    pub fn hw(&self) -> &Arc<dyn HwBufferPool> {
        &self.hw
    }

    /// Acquires exactly `n` buffers, appending their bus addresses to `out`. Either all `n` buffers are acquired or
    /// none are: on exhaustion, the buffers acquired by this call are released and `out` is left as it was.
    pub fn acquire_n(&self, n: usize, out: &mut Vec<u64>) -> Result<(), Fail> {
        let start: usize = out.len();
        let mut batch: [u64; DPAA2_MBUF_MAX_ACQ_REL] = [0; DPAA2_MBUF_MAX_ACQ_REL];
        while out.len() - start < n {
            let want: usize = (n - (out.len() - start)).min(DPAA2_MBUF_MAX_ACQ_REL);
            let got: usize = self.hw.acquire(&mut batch[..want]);
            if got == 0 {
                let acquired: Vec<u64> = out.split_off(start);
                if let Err(e) = self.release_all(&acquired) {
                    warn!("acquire_n(): failed to return partial allocation (bpid={:?}): {:?}", self.bpid(), e);
                }
                let cause: String = format!(
                    "buffer pool exhausted (bpid={:?}, requested={:?}, acquired={:?})",
                    self.bpid(),
                    n,
                    acquired.len()
                );
                error!("acquire_n(): {}", cause);
                return Err(Fail::exhausted(&cause));
            }
            out.extend_from_slice(&batch[..got]);
        }
        Ok(())
    }

    /// Releases every buffer in `bufs` back to this pool.
    pub fn release_all(&self, bufs: &[u64]) -> Result<(), Fail> {
        for chunk in bufs.chunks(DPAA2_MBUF_MAX_ACQ_REL) {
            self.hw.release(chunk)?;
        }
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("bpid", &self.bpid())
            .field("buf_size", &self.buf_size())
            .field("num_bufs", &self.config.get_num_bufs())
            .field("available", &self.available())
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
