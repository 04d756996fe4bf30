// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    qbman::{
        fd::{
            FdFormat,
            FrameDescriptor,
        },
        fle::{
            FleChain,
            FrameListEntry,
        },
    },
    runtime::{
        fail::Fail,
        memory::{
            buffer_pool::BufferPool,
            hw_pool::DPAA2_MBUF_MAX_ACQ_REL,
            memzone::MemZone,
        },
    },
};
use ::arrayvec::ArrayVec;
use ::std::{
    fmt,
    ptr::NonNull,
    slice,
    sync::Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// One pooled DMA buffer within a [Dpaa2Mbuf].
///
/// Frame data starts `data_off` bytes into the buffer, after the headroom, and runs for `frame_len` bytes.
pub struct Segment {
    pool: Arc<BufferPool>,
    /// Virtual address of the start of the buffer.
    buf_addr: NonNull<u8>,
    /// Bus address of the start of the buffer.
    bus_addr: u64,
    data_off: u16,
    buf_len: u32,
    frame_len: u32,
}

/// DPAA2 Buffer
///
/// An owned frame made of one or more pooled segments. The first segment is the head. When the buffer has more than one
/// segment it is a scatter-gather buffer, and each segment may come from a different pool.
///
/// Dropping a [Dpaa2Mbuf] releases every segment back to its origin pool.
pub struct Dpaa2Mbuf {
    segs: Vec<Segment>,
    flags: u32,
    user_context: u64,
    hash: u32,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Segment {
    /// Wraps the buffer at bus address `bus_addr`, which must come from `pool`.
    pub(crate) fn from_bus(pool: Arc<BufferPool>, bus_addr: u64, data_off: u16, frame_len: u32) -> Result<Self, Fail> {
        let buf_len: u32 = pool.buf_size();
        let zone: MemZone = pool.zone();
        let fits_zone: bool = zone.contains_physical(bus_addr)
            && bus_addr - zone.phys_base() + buf_len as u64 <= zone.len() as u64;
        if !fits_zone {
            let cause: String = format!("buffer is outside of its pool (bpid={:?}, addr={:#x})", pool.bpid(), bus_addr);
            error!("from_bus(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if !pool.hw().owns(bus_addr) {
            let cause: String = format!("not a buffer of its pool (bpid={:?}, addr={:#x})", pool.bpid(), bus_addr);
            error!("from_bus(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if data_off as u32 > buf_len || frame_len > buf_len - data_off as u32 {
            let cause: String = format!(
                "frame does not fit in buffer (buf_len={:?}, offset={:?}, len={:?})",
                buf_len, data_off, frame_len
            );
            error!("from_bus(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let buf_addr: NonNull<u8> = match NonNull::new(pool.zone().virtual_from_physical(bus_addr) as *mut u8) {
            Some(ptr) => ptr,
            None => {
                let cause: String = format!("buffer translates to a null address (addr={:#x})", bus_addr);
                error!("from_bus(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        Ok(Self {
            pool,
            buf_addr,
            bus_addr,
            data_off,
            buf_len,
            frame_len,
        })
    }

    /// Wraps a freshly acquired buffer. Frame data starts right after the pool headroom.
    pub(crate) fn fresh(pool: &Arc<BufferPool>, bus_addr: u64) -> Result<Self, Fail> {
        let data_off: u16 = pool.meta_data_size();
        Self::from_bus(pool.clone(), bus_addr, data_off, 0)
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn bpid(&self) -> u16 {
        self.pool.bpid()
    }

    /// Bus address of the start of the buffer.
    pub fn bus_addr(&self) -> u64 {
        self.bus_addr
    }

    /// Bus address of the first byte of frame data.
    pub fn data_bus_addr(&self) -> u64 {
        self.bus_addr + self.data_off as u64
    }

    pub fn data_off(&self) -> u16 {
        self.data_off
    }

    pub fn buf_len(&self) -> u32 {
        self.buf_len
    }

    /// Bytes of frame data this segment can hold.
    pub fn capacity(&self) -> u32 {
        self.buf_len - self.data_off as u32
    }

    /// Bytes of frame data held in this segment.
    pub fn len(&self) -> u32 {
        self.frame_len
    }

    pub fn is_empty(&self) -> bool {
        self.frame_len == 0
    }

    pub fn set_len(&mut self, len: u32) -> Result<(), Fail> {
        if len > self.capacity() {
            let cause: String =
                format!("length exceeds segment capacity (len={:?}, capacity={:?})", len, self.capacity());
            error!("set_len(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        self.frame_len = len;
        Ok(())
    }

    /// Frame data held in this segment.
    pub fn as_slice(&self) -> &[u8] {
        // Safety: the data room lies inside a live buffer of the pool, which this segment owns exclusively.
        unsafe { slice::from_raw_parts(self.data_ptr(), self.frame_len as usize) }
    }

    /// Frame data held in this segment.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: the data room lies inside a live buffer of the pool, which this segment owns exclusively.
        unsafe { slice::from_raw_parts_mut(self.data_ptr(), self.frame_len as usize) }
    }

    /// Whole data room of this segment, regardless of the frame length.
    pub fn room_mut(&mut self) -> &mut [u8] {
        // Safety: the data room lies inside a live buffer of the pool, which this segment owns exclusively.
        unsafe { slice::from_raw_parts_mut(self.data_ptr(), self.capacity() as usize) }
    }

    fn data_ptr(&self) -> *mut u8 {
        // Safety: `data_off` is within the buffer, as checked on construction.
        unsafe { self.buf_addr.as_ptr().add(self.data_off as usize) }
    }
}

impl Dpaa2Mbuf {
    /// Builds a buffer out of `segs`, the first of which is the head.
    pub(crate) fn from_segments(segs: Vec<Segment>) -> Self {
        Self {
            segs,
            flags: 0,
            user_context: 0,
            hash: 0,
        }
    }

    /// Appends `seg` to the end of the chain.
    pub(crate) fn push_segment(&mut self, seg: Segment) {
        self.segs.push(seg);
    }

    pub fn num_segs(&self) -> usize {
        self.segs.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segs
    }

    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segs
    }

    /// Returns `true` if this buffer spans more than one segment.
    pub fn is_sg(&self) -> bool {
        self.segs.len() > 1
    }

    /// Bytes of frame data held across all segments.
    pub fn len(&self) -> usize {
        self.segs.iter().map(|seg| seg.len() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of frame data this buffer can hold across all segments.
    pub fn capacity(&self) -> usize {
        self.segs.iter().map(|seg| seg.capacity() as usize).sum()
    }

    /// Replaces the frame data of this buffer with `data`, filling segments in order.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Fail> {
        if data.len() > self.capacity() {
            let cause: String = format!(
                "data does not fit in buffer (len={:?}, capacity={:?})",
                data.len(),
                self.capacity()
            );
            error!("write(): {}", cause);
            return Err(Fail::no_capacity(&cause));
        }
        let mut rest: &[u8] = data;
        for seg in self.segs.iter_mut() {
            let n: usize = rest.len().min(seg.capacity() as usize);
            seg.room_mut()[..n].copy_from_slice(&rest[..n]);
            seg.frame_len = n as u32;
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Gathers the frame data of all segments.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut data: Vec<u8> = Vec::with_capacity(self.len());
        for seg in &self.segs {
            data.extend_from_slice(seg.as_slice());
        }
        data
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn user_context(&self) -> u64 {
        self.user_context
    }

    pub fn set_user_context(&mut self, user_context: u64) {
        self.user_context = user_context;
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn set_hash(&mut self, hash: u32) {
        self.hash = hash;
    }

    /// Releases all segments back to their pools.
    pub fn free(self) {
        drop(self)
    }

    /// Builds a single-format frame descriptor for this buffer, which must have exactly one segment. The buffer stays
    /// owned by `self`; use [Dpaa2Mbuf::into_fd] to hand it over.
    pub fn to_fd(&self) -> Result<FrameDescriptor, Fail> {
        let seg: &Segment = match self.segs.as_slice() {
            [seg] => seg,
            segs => {
                let cause: String = format!("single-buffer descriptor needs one segment (segs={:?})", segs.len());
                error!("to_fd(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let mut fd: FrameDescriptor = FrameDescriptor::new();
        fd.set_addr(seg.bus_addr());
        fd.set_len(seg.len());
        fd.set_offset(seg.data_off());
        fd.set_bpid(seg.bpid());
        fd.set_format(FdFormat::Single);
        Ok(fd)
    }

    /// Same as [Dpaa2Mbuf::to_fd], but hands ownership of the buffer to whoever consumes the descriptor.
    pub fn into_fd(self) -> Result<FrameDescriptor, Fail> {
        let fd: FrameDescriptor = self.to_fd()?;
        self.forget();
        Ok(fd)
    }

    /// Writes one frame list entry per segment to the start of `table` and marks the last one final. Returns the
    /// number of entries written.
    pub fn fill_fle_chain(&self, table: &mut [FrameListEntry]) -> Result<usize, Fail> {
        let mut chain: FleChain = FleChain::new(table);
        for seg in &self.segs {
            chain.push(seg.bus_addr(), seg.len(), seg.bpid(), seg.data_off())?;
        }
        chain.finish()
    }

    /// Builds a compound-format frame descriptor that points at a frame list located at bus address `fle_bus_addr`.
    /// The frame list is not a pool buffer, so the descriptor is marked with an invalid pool.
    pub fn to_compound_fd(&self, fle_bus_addr: u64) -> FrameDescriptor {
        let mut fd: FrameDescriptor = FrameDescriptor::new();
        fd.set_addr(fle_bus_addr);
        fd.set_len(self.len() as u32);
        fd.set_compound_format();
        fd.set_ivp();
        fd
    }

    /// Same as [Dpaa2Mbuf::to_compound_fd], but hands ownership of the segments to whoever consumes the frame list.
    pub fn into_compound_fd(self, fle_bus_addr: u64) -> FrameDescriptor {
        let fd: FrameDescriptor = self.to_compound_fd(fle_bus_addr);
        self.forget();
        fd
    }

    /// Drops this buffer without releasing its segments.
    fn forget(mut self) {
        self.segs.clear();
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Copies the frame data and metadata of `from` into the segments that `to` already owns.
///
/// Data is streamed across segment boundaries, so the two chains need not have the same shape. If `to` runs out of
/// room this fails with `ENOSPC`. The data copied up to that point stays in place and nothing is rolled back.
pub fn sg_copy(to: &mut Dpaa2Mbuf, from: &Dpaa2Mbuf) -> Result<(), Fail> {
    let capacity: usize = to.capacity();
    let mut dst_idx: usize = 0;
    let mut dst_off: usize = 0;
    for src in &from.segs {
        let mut data: &[u8] = src.as_slice();
        while !data.is_empty() {
            let dst: &mut Segment = match to.segs.get_mut(dst_idx) {
                Some(dst) => dst,
                None => {
                    let cause: String = format!(
                        "destination buffer too small (capacity={:?}, required={:?})",
                        capacity,
                        from.len()
                    );
                    error!("sg_copy(): {}", cause);
                    return Err(Fail::no_capacity(&cause));
                },
            };
            let room: usize = dst.capacity() as usize - dst_off;
            if room == 0 {
                dst_idx += 1;
                dst_off = 0;
                continue;
            }
            let n: usize = room.min(data.len());
            dst.room_mut()[dst_off..dst_off + n].copy_from_slice(&data[..n]);
            dst_off += n;
            dst.frame_len = dst_off as u32;
            data = &data[n..];
        }
    }

    // Segments past the copied data hold no frame data.
    let first_unused: usize = if dst_off == 0 { dst_idx } else { dst_idx + 1 };
    for seg in to.segs.iter_mut().skip(first_unused) {
        seg.frame_len = 0;
    }
    to.flags = from.flags;
    to.user_context = from.user_context;
    to.hash = from.hash;
    Ok(())
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for Dpaa2Mbuf {
    fn drop(&mut self) {
        let mut batch: ArrayVec<u64, DPAA2_MBUF_MAX_ACQ_REL> = ArrayVec::new();
        let mut current: Option<Arc<BufferPool>> = None;
        for seg in self.segs.drain(..) {
            let same_pool: bool = current.as_ref().is_some_and(|pool| Arc::ptr_eq(pool, &seg.pool));
            if !same_pool || batch.is_full() {
                if let Some(pool) = current.take() {
                    release_batch(&pool, &mut batch);
                }
                current = Some(seg.pool.clone());
            }
            batch.push(seg.bus_addr);
        }
        if let Some(pool) = current.take() {
            release_batch(&pool, &mut batch);
        }
    }
}

fn release_batch(pool: &BufferPool, batch: &mut ArrayVec<u64, DPAA2_MBUF_MAX_ACQ_REL>) {
    if let Err(e) = pool.hw().release(batch.as_slice()) {
        warn!("drop(): failed to release buffers (bpid={:?}): {:?}", pool.bpid(), e);
    }
    batch.clear();
}

// Safety: a segment owns its buffer exclusively, and the pool it points into outlives it through the `Arc`. Moving a
// buffer to another thread moves that exclusive ownership along with it.
unsafe impl Send for Dpaa2Mbuf {}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("bpid", &self.bpid())
            .field("bus_addr", &format_args!("{:#x}", self.bus_addr))
            .field("data_off", &self.data_off)
            .field("buf_len", &self.buf_len)
            .field("frame_len", &self.frame_len)
            .finish()
    }
}

impl fmt::Debug for Dpaa2Mbuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dpaa2Mbuf")
            .field("segs", &self.segs)
            .field("flags", &self.flags)
            .field("user_context", &self.user_context)
            .field("hash", &self.hash)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        sg_copy,
        Dpaa2Mbuf,
        Segment,
    };
    use crate::{
        ensure_eq,
        qbman::{
            fd::{
                FdFormat,
                FrameDescriptor,
            },
            fle::FrameListEntry,
        },
        runtime::{
            fail::Fail,
            memory::{
                bp_list::BufferPoolList,
                buffer_pool::BufferPool,
                config::{
                    BpListConfig,
                    BufferPoolConfig,
                },
                memory_pool::SoftPoolProvider,
                memzone::MemZone,
            },
        },
    };
    use ::anyhow::{
        bail,
        ensure,
        Result,
    };
    use ::std::sync::Arc;

    /// Pools with 128, 448 and 960 bytes of data room.
    fn make_list(num_bufs: u32) -> Result<BufferPoolList> {
        let config: BpListConfig = BpListConfig::new()
            .with_pool(BufferPoolConfig::new(1024, num_bufs).with_meta_data_size(64))?
            .with_pool(BufferPoolConfig::new(192, num_bufs).with_meta_data_size(64))?
            .with_pool(BufferPoolConfig::new(512, num_bufs).with_meta_data_size(64))?;
        Ok(BufferPoolList::create(&config, &SoftPoolProvider::new())?)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i: usize| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn write_spans_segments() -> Result<()> {
        let list: BufferPoolList = make_list(8)?;
        let mut mbuf: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), 300)?;
        ensure_eq!(mbuf.num_segs(), 3);
        ensure!(mbuf.is_sg());

        let data: Vec<u8> = pattern(300, 7);
        mbuf.write(&data)?;
        ensure_eq!(mbuf.to_vec(), data);
        let lens: Vec<u32> = mbuf.segments().iter().map(|seg| seg.len()).collect();
        ensure_eq!(lens, vec![128, 128, 44]);

        let e: Fail = match mbuf.write(&pattern(385, 0)) {
            Ok(_) => bail!("write beyond capacity should fail"),
            Err(e) => e,
        };
        ensure!(e.is_no_capacity());
        Ok(())
    }

    #[test]
    fn drop_releases_every_segment() -> Result<()> {
        let list: BufferPoolList = make_list(16)?;
        let mbuf: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), 128 * 9)?;
        ensure_eq!(mbuf.num_segs(), 9);
        ensure_eq!(list.pools()[0].available(), 7);
        mbuf.free();
        ensure_eq!(list.pools()[0].available(), 16);
        Ok(())
    }

    #[test]
    fn bus_addresses_must_name_a_whole_buffer() -> Result<()> {
        let list: BufferPoolList = make_list(4)?;
        let pool: Arc<BufferPool> = list.pools()[2].clone();
        let zone: MemZone = pool.zone();
        let mbuf: Dpaa2Mbuf = list.alloc(900)?;
        let bus_addr: u64 = mbuf.segments()[0].bus_addr();

        // Inside the zone, but in the middle of a live buffer.
        ensure!(zone.contains_physical(bus_addr + 8));
        let e: Fail = match Segment::from_bus(pool.clone(), bus_addr + 8, 64, 0) {
            Ok(_) => bail!("unaligned bus address should be rejected"),
            Err(e) => e,
        };
        ensure_eq!(e.errno, libc::EINVAL);

        // A buffer starting here would run past the end of the zone.
        let tail: u64 = zone.phys_base() + zone.len() as u64 - 8;
        ensure!(zone.contains_physical(tail));
        ensure!(Segment::from_bus(pool.clone(), tail, 0, 0).is_err_and(|e| e.errno == libc::EINVAL));

        ensure_eq!(pool.available(), 3);
        drop(mbuf);
        ensure_eq!(pool.available(), 4);
        Ok(())
    }

    #[test]
    fn metadata_accessors() -> Result<()> {
        let list: BufferPoolList = make_list(2)?;
        let mut mbuf: Dpaa2Mbuf = list.alloc(10)?;
        mbuf.set_flags(0x5);
        mbuf.set_user_context(0xfeed_beef);
        mbuf.set_hash(0x1234);
        ensure_eq!(mbuf.flags(), 0x5);
        ensure_eq!(mbuf.user_context(), 0xfeed_beef);
        ensure_eq!(mbuf.hash(), 0x1234);
        Ok(())
    }

    #[test]
    fn fd_requires_single_segment() -> Result<()> {
        let list: BufferPoolList = make_list(8)?;
        let mbuf: Dpaa2Mbuf = list.alloc(100)?;
        let fd: FrameDescriptor = mbuf.to_fd()?;
        ensure_eq!(fd.format(), FdFormat::Single);
        ensure_eq!(fd.bpid(), mbuf.segments()[0].bpid());
        ensure_eq!(fd.addr(), mbuf.segments()[0].bus_addr());
        ensure_eq!(fd.offset(), 64);
        ensure_eq!(fd.len(), 100);
        ensure!(!fd.ivp());

        let sg: Dpaa2Mbuf = list.alloc_sg(2000)?;
        ensure!(sg.to_fd().is_err());
        Ok(())
    }

    #[test]
    fn fle_chain_has_one_final_entry() -> Result<()> {
        let list: BufferPoolList = make_list(8)?;
        let mbuf: Dpaa2Mbuf = list.alloc_sg(2000)?;
        ensure_eq!(mbuf.num_segs(), 3);

        let mut table: [FrameListEntry; 8] = [FrameListEntry::new(); 8];
        table[5].set_final(true);
        ensure_eq!(mbuf.fill_fle_chain(&mut table)?, 3);
        let finals: Vec<usize> = (0..3).filter(|i: &usize| table[*i].is_final()).collect();
        ensure_eq!(finals, vec![2]);
        for (fle, seg) in table.iter().zip(mbuf.segments()) {
            ensure_eq!(fle.addr(), seg.bus_addr());
            ensure_eq!(fle.len(), seg.len());
            ensure_eq!(fle.bpid(), seg.bpid());
            ensure_eq!(fle.offset(), seg.data_off());
        }

        let mut short: [FrameListEntry; 2] = [FrameListEntry::new(); 2];
        ensure!(mbuf.fill_fle_chain(&mut short).is_err());

        let fd: FrameDescriptor = mbuf.to_compound_fd(0x9000);
        ensure_eq!(fd.format(), FdFormat::Compound);
        ensure_eq!(fd.addr(), 0x9000);
        ensure_eq!(fd.len(), 2000);
        Ok(())
    }

    #[test]
    fn sg_copy_streams_across_shapes() -> Result<()> {
        let list: BufferPoolList = make_list(16)?;
        let mut from: Dpaa2Mbuf = list.alloc_sg(1500)?;
        let data: Vec<u8> = pattern(1500, 3);
        from.write(&data)?;
        from.set_flags(0x11);
        from.set_user_context(42);
        from.set_hash(0xabcd);

        // Destination built from small buffers, with one segment to spare.
        let mut to: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), 128 * 13)?;
        sg_copy(&mut to, &from)?;
        ensure_eq!(to.to_vec(), data);
        ensure_eq!(to.len(), 1500);
        ensure_eq!(to.segments()[12].len(), 0);
        ensure_eq!(to.flags(), 0x11);
        ensure_eq!(to.user_context(), 42);
        ensure_eq!(to.hash(), 0xabcd);
        Ok(())
    }

    #[test]
    fn sg_copy_keeps_prefix_on_failure() -> Result<()> {
        let list: BufferPoolList = make_list(16)?;
        let mut from: Dpaa2Mbuf = list.alloc_sg(1000)?;
        let data: Vec<u8> = pattern(1000, 9);
        from.write(&data)?;

        let mut to: Dpaa2Mbuf = list.alloc_sg_from_bpid(list.pools()[0].bpid(), 128 * 3)?;
        let e: Fail = match sg_copy(&mut to, &from) {
            Ok(_) => bail!("copy into a smaller buffer should fail"),
            Err(e) => e,
        };
        ensure!(e.is_no_capacity());
        ensure_eq!(to.to_vec(), data[..384].to_vec());
        ensure_eq!(to.flags(), 0);
        Ok(())
    }
}
