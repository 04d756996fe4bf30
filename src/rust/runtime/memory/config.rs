// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::arch::CPU_DATA_CACHE_LINE_SIZE,
    runtime::fail::Fail,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Maximum number of buffer pools in a single buffer pool list.
pub const DPAA2_MAX_BUF_POOLS: usize = 8;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Buffer Pool Configuration Descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Size of each buffer in the pool, headroom included.
    buf_size: u32,

    /// How many buffers are seeded into the pool?
    num_bufs: u32,

    /// Free-buffer count at or below which the pool enters depletion. Zero disables depletion tracking.
    depletion_entry: u32,

    /// Free-buffer count at or above which the pool leaves depletion.
    depletion_exit: u32,

    /// Headroom reserved at the start of each buffer, ahead of the frame data.
    meta_data_size: u16,

    /// Alignment of each buffer in the backing memory zone.
    alignment: usize,
}

/// Buffer Pool List Configuration Descriptor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BpListConfig {
    pools: Vec<BufferPoolConfig>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Associate Functions for Buffer Pool Configuration Descriptors
impl BufferPoolConfig {
    pub fn new(buf_size: u32, num_bufs: u32) -> Self {
        Self {
            buf_size,
            num_bufs,
            depletion_entry: 0,
            depletion_exit: 0,
            meta_data_size: 0,
            alignment: CPU_DATA_CACHE_LINE_SIZE,
        }
    }

    /// Sets the number of buffers seeded into the pool.
    pub fn with_num_bufs(mut self, num_bufs: u32) -> Self {
        self.num_bufs = num_bufs;
        self
    }

    /// Sets the depletion thresholds.
    pub fn with_depletion(mut self, entry: u32, exit: u32) -> Self {
        self.depletion_entry = entry;
        self.depletion_exit = exit;
        self
    }

    /// Sets the headroom reserved at the start of each buffer.
    pub fn with_meta_data_size(mut self, meta_data_size: u16) -> Self {
        self.meta_data_size = meta_data_size;
        self
    }

    /// Sets the buffer alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Returns the buffer size stored in the target [BufferPoolConfig].
    pub fn get_buf_size(&self) -> u32 {
        self.buf_size
    }

    /// Returns the buffer count stored in the target [BufferPoolConfig].
    pub fn get_num_bufs(&self) -> u32 {
        self.num_bufs
    }

    pub fn get_depletion_entry(&self) -> u32 {
        self.depletion_entry
    }

    pub fn get_depletion_exit(&self) -> u32 {
        self.depletion_exit
    }

    pub fn get_meta_data_size(&self) -> u16 {
        self.meta_data_size
    }

    pub fn get_alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes available for frame data in each buffer.
    pub fn get_data_room(&self) -> u32 {
        self.buf_size.saturating_sub(self.meta_data_size as u32)
    }

    /// Checks that the descriptor describes a pool that can be registered.
    pub fn validate(&self) -> Result<(), Fail> {
        let cause: String = if self.buf_size == 0 {
            String::from("buffer size must be non-zero")
        } else if self.num_bufs == 0 {
            format!("buffer count must be non-zero (buf_size={:?})", self.buf_size)
        } else if self.meta_data_size as u32 >= self.buf_size {
            format!(
                "headroom leaves no data room (buf_size={:?}, meta_data_size={:?})",
                self.buf_size, self.meta_data_size
            )
        } else if !self.alignment.is_power_of_two() {
            format!("alignment must be a power of two (alignment={:?})", self.alignment)
        } else if self.depletion_exit < self.depletion_entry {
            format!(
                "depletion exit threshold below entry threshold (entry={:?}, exit={:?})",
                self.depletion_entry, self.depletion_exit
            )
        } else {
            return Ok(());
        };
        error!("validate(): {}", cause);
        Err(Fail::new(libc::EINVAL, &cause))
    }
}

/// Associate Functions for Buffer Pool List Configuration Descriptors
impl BpListConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the configuration of one more pool.
    pub fn push(&mut self, pool: BufferPoolConfig) -> Result<(), Fail> {
        if self.pools.len() == DPAA2_MAX_BUF_POOLS {
            let cause: String = format!("too many buffer pools (max={:?})", DPAA2_MAX_BUF_POOLS);
            error!("push(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        self.pools.push(pool);
        Ok(())
    }

    /// Same as [BpListConfig::push] in builder style.
    pub fn with_pool(mut self, pool: BufferPoolConfig) -> Result<Self, Fail> {
        self.push(pool)?;
        Ok(self)
    }

    pub fn pools(&self) -> &[BufferPoolConfig] {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut [BufferPoolConfig] {
        &mut self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Checks every pool descriptor and the list as a whole.
    pub fn validate(&self) -> Result<(), Fail> {
        if self.pools.is_empty() {
            let cause: String = String::from("buffer pool list has no pools");
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        self.pools.iter().try_for_each(BufferPoolConfig::validate)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
