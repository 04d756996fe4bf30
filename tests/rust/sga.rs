// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::anyhow::{
    ensure,
    Result,
};
use ::dpaa2_mbuf::{
    ensure_eq,
    runtime::{
        logging,
        memory::{
            register_global,
            registry,
            sg_copy,
            BpListConfig,
            BufferPoolConfig,
            BufferPoolList,
            Dpaa2Mbuf,
            SoftPoolProvider,
        },
    },
    Dpaa2Device,
    FrameDescriptor,
    FrameListEntry,
};
use ::std::sync::Arc;

//==============================================================================
// Constants
//==============================================================================

/// Headroom reserved in every buffer.
const HEADROOM: u16 = 128;

/// Buffers per pool.
const NUM_BUFS: u32 = 32;

//==============================================================================
// Helper Functions
//==============================================================================

/// Creates a list with 512, 2048 and 4096-byte pools, registers it and returns a device affined to it.
fn setup(id: u32) -> Result<(Dpaa2Device, Arc<BufferPoolList>)> {
    logging::initialize();
    let config: BpListConfig = BpListConfig::new()
        .with_pool(BufferPoolConfig::new(2048, NUM_BUFS).with_meta_data_size(HEADROOM))?
        .with_pool(BufferPoolConfig::new(512, NUM_BUFS).with_meta_data_size(HEADROOM))?
        .with_pool(BufferPoolConfig::new(4096, NUM_BUFS).with_meta_data_size(HEADROOM))?;
    let list: Arc<BufferPoolList> = register_global(BufferPoolList::create(&config, &SoftPoolProvider::new())?);
    Ok((Dpaa2Device::new(id).with_bp_list(list.clone()), list))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i: usize| (i % 251) as u8).collect()
}

//==============================================================================
// Unit Tests
//==============================================================================

/// Tests that the pools of a list are ordered by buffer size.
#[test]
fn test_unit_bp_list_ordering() -> Result<()> {
    let (_, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(0)?;
    let sizes: Vec<u32> = list.iter().map(|pool| pool.buf_size()).collect();
    ensure_eq!(sizes, vec![512, 2048, 4096]);
    ensure!(registry::global().is_initialized());
    Ok(())
}

/// Tests that allocations larger than any single buffer take the fewest segments.
#[test]
fn test_unit_sga_alloc_min_segments() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(1)?;
    let largest_room: usize = list.pools()[2].data_room() as usize;

    for size in [1usize, 384, 385, 1920, largest_room, largest_room + 1, 3 * largest_room + 17] {
        let mbuf: Dpaa2Mbuf = registry::global().alloc_sg(&dev, size)?;
        ensure!(mbuf.capacity() >= size);
        ensure_eq!(mbuf.len(), size);
        ensure_eq!(mbuf.num_segs(), size.div_ceil(largest_room).max(1), "size={}", size);
    }
    Ok(())
}

/// Tests that a pool can be drained, fails once empty, and recovers after a release.
#[test]
fn test_unit_sga_exhaustion() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(2)?;
    let bpid: u16 = list.pools()[0].bpid();

    let mut held: Vec<Dpaa2Mbuf> = Vec::new();
    for _ in 0..NUM_BUFS {
        held.push(registry::global().alloc_sg_from_bpid(bpid, 64)?);
    }
    match registry::global().alloc_sg_from_bpid(bpid, 64) {
        Ok(_) => anyhow::bail!("allocation from an empty pool should fail"),
        Err(e) => ensure!(e.is_exhausted()),
    }

    // Sizes served by the drained pool fail as well; larger sizes are unaffected.
    ensure!(registry::global().alloc_sg(&dev, 100).is_err_and(|e| e.is_exhausted()));
    let other: Dpaa2Mbuf = registry::global().alloc_sg(&dev, 1000)?;
    ensure_eq!(other.segments()[0].pool().buf_size(), 2048);

    held.pop();
    let again: Dpaa2Mbuf = registry::global().alloc_sg_from_bpid(bpid, 64)?;
    ensure_eq!(again.segments()[0].bpid(), bpid);
    Ok(())
}

/// Tests copying between chains of different shapes.
#[test]
fn test_unit_sga_copy() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(3)?;
    let data: Vec<u8> = pattern(5000);

    let mut from: Dpaa2Mbuf = registry::global().alloc_sg(&dev, data.len())?;
    from.write(&data)?;
    from.set_hash(0x5a5a);

    let mut to: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), data.len())?;
    ensure!(to.num_segs() > from.num_segs());
    sg_copy(&mut to, &from)?;
    ensure_eq!(to.to_vec(), data);
    ensure_eq!(to.hash(), 0x5a5a);
    Ok(())
}

/// Tests that a failed copy leaves the already copied prefix intact.
#[test]
fn test_unit_sga_copy_insufficient_capacity() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(4)?;
    let data: Vec<u8> = pattern(3000);

    let mut from: Dpaa2Mbuf = registry::global().alloc_sg(&dev, data.len())?;
    from.write(&data)?;

    let mut to: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), 1000)?;
    let capacity: usize = to.capacity();
    ensure!(capacity < data.len());
    match sg_copy(&mut to, &from) {
        Ok(()) => anyhow::bail!("copy into a smaller chain should fail"),
        Err(e) => ensure!(e.is_no_capacity()),
    }
    ensure_eq!(to.to_vec(), data[..capacity].to_vec());
    Ok(())
}

/// Tests handing a single buffer to hardware and taking it back through the global registry.
#[test]
fn test_unit_sga_single_fd_round_trip() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(5)?;
    let data: Vec<u8> = pattern(1000);

    let mut mbuf: Dpaa2Mbuf = registry::global().alloc_sg(&dev, data.len())?;
    mbuf.write(&data)?;
    let bpid: u16 = mbuf.segments()[0].bpid();
    let fd: FrameDescriptor = mbuf.into_fd()?;
    ensure_eq!(fd.offset(), HEADROOM);
    ensure_eq!(fd.bpid(), bpid);

    // Simulate the descriptor crossing the wire.
    let fd: FrameDescriptor = FrameDescriptor::from_le_bytes(&fd.to_le_bytes());
    let available: usize = list.pools()[1].available();
    // Safety: `fd` came from `into_fd()` and is reclaimed once.
    let mbuf: Dpaa2Mbuf = unsafe { registry::global().mbuf_from_fd(&fd)? };
    ensure_eq!(mbuf.to_vec(), data);
    drop(mbuf);
    ensure_eq!(list.pools()[1].available(), available + 1);
    Ok(())
}

/// Tests handing a chain to hardware through a frame list and taking it back.
#[test]
fn test_unit_sga_fle_round_trip() -> Result<()> {
    let (dev, list): (Dpaa2Device, Arc<BufferPoolList>) = setup(6)?;
    let data: Vec<u8> = pattern(9000);

    let mut mbuf: Dpaa2Mbuf = registry::global().alloc_sg(&dev, data.len())?;
    mbuf.write(&data)?;
    let nsegs: usize = mbuf.num_segs();

    let mut table: Vec<FrameListEntry> = vec![FrameListEntry::new(); 8];
    ensure_eq!(mbuf.fill_fle_chain(&mut table)?, nsegs);
    let fd: FrameDescriptor = mbuf.into_compound_fd(0xC000_0000);
    ensure_eq!(fd.len() as usize, data.len());

    let in_use: usize = list.iter().map(|pool| NUM_BUFS as usize - pool.available()).sum();
    ensure_eq!(in_use, nsegs);

    // Safety: the table was filled for a buffer consumed by `into_compound_fd()`.
    let mbuf: Dpaa2Mbuf = unsafe { registry::global().mbuf_from_fle_chain(&table)? };
    ensure_eq!(mbuf.to_vec(), data);
    drop(mbuf);
    ensure!(list.iter().all(|pool| pool.available() == NUM_BUFS as usize));
    Ok(())
}
