// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod bp_list;
mod buffer_pool;
pub mod config;
mod hw_pool;
mod mbuf;
pub mod memory_pool;
pub mod memzone;
pub mod registry;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    bp_list::BufferPoolList,
    buffer_pool::BufferPool,
    config::{
        BpListConfig,
        BufferPoolConfig,
        DPAA2_MAX_BUF_POOLS,
    },
    hw_pool::{
        HwBufferPool,
        PoolProvider,
        DPAA2_MBUF_MAX_ACQ_REL,
        MAX_BPID,
    },
    mbuf::{
        sg_copy,
        Dpaa2Mbuf,
        Segment,
    },
    memory_pool::{
        SoftBufferPool,
        SoftPoolProvider,
    },
    memzone::{
        physical_from_virtual,
        virtual_from_physical,
        MemZone,
    },
    registry::{
        register_global,
        BpListRegistry,
    },
};
