// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    memory::{
        buffer_pool::BufferPool,
        config::BpListConfig,
        hw_pool::{
            HwBufferPool,
            PoolProvider,
        },
        mbuf::{
            Dpaa2Mbuf,
            Segment,
        },
    },
};
use ::std::{
    slice,
    sync::Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Buffer Pool List
///
/// A set of buffer pools sorted ascending by buffer size and used as a unit for allocation.
#[derive(Debug)]
pub struct BufferPoolList {
    pools: Vec<Arc<BufferPool>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BufferPoolList {
    /// Registers one hardware pool per entry of `config` through `provider`. If any registration fails, the pools
    /// registered so far are torn down and the failure is reported with `EAGAIN`.
    pub fn create(config: &BpListConfig, provider: &dyn PoolProvider) -> Result<Self, Fail> {
        config.validate()?;

        let mut pools: Vec<Arc<BufferPool>> = Vec::with_capacity(config.len());
        for pool_config in config.pools() {
            match provider.create_pool(pool_config) {
                Ok(hw) => pools.push(Arc::new(BufferPool::new(pool_config.clone(), hw))),
                Err(e) => {
                    for pool in pools.drain(..) {
                        provider.destroy_pool(pool.hw());
                    }
                    let cause: String = format!(
                        "failed to register buffer pool (buf_size={:?}): {}",
                        pool_config.get_buf_size(),
                        e.cause
                    );
                    error!("create(): {}", cause);
                    return Err(Fail::config(&cause));
                },
            }
        }
        pools.sort_by_key(|pool: &Arc<BufferPool>| pool.buf_size());

        debug!(
            "create(): bpids={:?}",
            pools.iter().map(|pool| pool.bpid()).collect::<Vec<u16>>()
        );
        Ok(Self { pools })
    }

    /// Tears down every hardware pool in this list through `provider`.
    pub fn destroy(self, provider: &dyn PoolProvider) {
        for pool in &self.pools {
            let hw: &Arc<dyn HwBufferPool> = pool.hw();
            provider.destroy_pool(hw);
        }
    }

    /// Iterates over the pools in ascending order of buffer size.
    pub fn iter(&self) -> slice::Iter<'_, Arc<BufferPool>> {
        self.pools.iter()
    }

    pub fn pools(&self) -> &[Arc<BufferPool>] {
        &self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Looks up a pool by id.
    pub fn find(&self, bpid: u16) -> Option<&Arc<BufferPool>> {
        self.pools.iter().find(|pool| pool.bpid() == bpid)
    }

    /// Pool with the largest buffers.
    pub fn largest(&self) -> Option<&Arc<BufferPool>> {
        self.pools.last()
    }

    /// Pool with the smallest buffers whose data room holds `size` bytes.
    pub fn smallest_fitting(&self, size: usize) -> Option<&Arc<BufferPool>> {
        self.pools.iter().find(|pool| pool.data_room() as usize >= size)
    }

    /// Allocates a single-segment buffer of `size` bytes from the smallest pool that fits it.
    pub fn alloc(&self, size: usize) -> Result<Dpaa2Mbuf, Fail> {
        let pool: &Arc<BufferPool> = match self.smallest_fitting(size) {
            Some(pool) => pool,
            None => {
                let cause: String = format!("no buffer pool fits a single buffer (size={:?})", size);
                error!("alloc(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let mut mbuf: Dpaa2Mbuf = Dpaa2Mbuf::from_segments(Vec::with_capacity(1));
        acquire_segments(&mut mbuf, pool, 1)?;
        set_frame_lengths(&mut mbuf, size)?;
        Ok(mbuf)
    }

    /// Allocates a buffer of `size` bytes using the fewest segments.
    ///
    /// A size that fits one buffer takes a single segment from the smallest pool that fits it. Larger sizes take full
    /// segments from the pool with the largest buffers, and the remainder goes to the smallest pool that fits it.
    /// Frame lengths are set so that the buffer holds exactly `size` bytes.
    pub fn alloc_sg(&self, size: usize) -> Result<Dpaa2Mbuf, Fail> {
        let largest: &Arc<BufferPool> = match self.largest() {
            Some(pool) => pool,
            None => {
                let cause: String = String::from("buffer pool list is empty");
                error!("alloc_sg(): {}", cause);
                return Err(Fail::new(libc::ENODEV, &cause));
            },
        };

        if let Some(pool) = self.smallest_fitting(size) {
            let mut mbuf: Dpaa2Mbuf = Dpaa2Mbuf::from_segments(Vec::with_capacity(1));
            acquire_segments(&mut mbuf, pool, 1)?;
            set_frame_lengths(&mut mbuf, size)?;
            return Ok(mbuf);
        }

        let room: usize = largest.data_room() as usize;
        let nsegs: usize = size.div_ceil(room);
        let remainder: usize = size - (nsegs - 1) * room;
        let tail: &Arc<BufferPool> = self.smallest_fitting(remainder).unwrap_or(largest);

        // Dropping the buffer on failure returns whatever was acquired so far.
        let mut mbuf: Dpaa2Mbuf = Dpaa2Mbuf::from_segments(Vec::with_capacity(nsegs));
        acquire_segments(&mut mbuf, largest, nsegs - 1)?;
        acquire_segments(&mut mbuf, tail, 1)?;
        set_frame_lengths(&mut mbuf, size)?;
        trace!("alloc_sg(): size={:?} segs={:?}", size, mbuf.num_segs());
        Ok(mbuf)
    }

    /// Allocates a buffer of `len` bytes using only the pool identified by `bpid`.
    pub fn alloc_sg_from_bpid(&self, bpid: u16, len: usize) -> Result<Dpaa2Mbuf, Fail> {
        let pool: &Arc<BufferPool> = match self.find(bpid) {
            Some(pool) => pool,
            None => {
                let cause: String = format!("unknown buffer pool (bpid={:?})", bpid);
                error!("alloc_sg_from_bpid(): {}", cause);
                return Err(Fail::new(libc::ENODEV, &cause));
            },
        };
        let nsegs: usize = len.div_ceil(pool.data_room() as usize).max(1);
        let mut mbuf: Dpaa2Mbuf = Dpaa2Mbuf::from_segments(Vec::with_capacity(nsegs));
        acquire_segments(&mut mbuf, pool, nsegs)?;
        set_frame_lengths(&mut mbuf, len)?;
        Ok(mbuf)
    }
}

//======================================================================================================================
// Helper Functions
//======================================================================================================================

/// Acquires `count` buffers from `pool` and appends them to `mbuf` as segments.
fn acquire_segments(mbuf: &mut Dpaa2Mbuf, pool: &Arc<BufferPool>, count: usize) -> Result<(), Fail> {
    let mut addrs: Vec<u64> = Vec::with_capacity(count);
    pool.acquire_n(count, &mut addrs)?;
    for (i, addr) in addrs.iter().enumerate() {
        match Segment::fresh(pool, *addr) {
            Ok(seg) => mbuf.push_segment(seg),
            Err(e) => {
                if let Err(e) = pool.release_all(&addrs[i..]) {
                    warn!("acquire_segments(): failed to return buffers (bpid={:?}): {:?}", pool.bpid(), e);
                }
                return Err(e);
            },
        }
    }
    Ok(())
}

/// Spreads `size` bytes over the segments of `mbuf`, filling each one before moving to the next.
fn set_frame_lengths(mbuf: &mut Dpaa2Mbuf, size: usize) -> Result<(), Fail> {
    let mut rest: usize = size;
    for seg in mbuf.segments_mut() {
        let n: usize = rest.min(seg.capacity() as usize);
        seg.set_len(n as u32)?;
        rest -= n;
    }
    Ok(())
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
