// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::arch::PAGE_SIZE,
    runtime::{
        fail::Fail,
        memory::{
            config::BufferPoolConfig,
            hw_pool::{
                HwBufferPool,
                PoolProvider,
                DPAA2_MBUF_MAX_ACQ_REL,
                MAX_BPID,
            },
            memzone::MemZone,
        },
    },
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
    TrySendError,
};
use ::std::{
    alloc::{
        self,
        Layout,
    },
    ptr::NonNull,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Bus address handed to the first memory zone of a [SoftPoolProvider].
pub const SOFT_IOVA_BASE: u64 = 0x8_0000_0000;

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Buffer pool ids in use. Ids are unique process-wide, as they are on hardware. Id zero is never handed out.
static BPIDS_IN_USE: Mutex<[bool; MAX_BPID]> = Mutex::new([false; MAX_BPID]);

/// Next free bus address. Memory zones of software pools never overlap.
static NEXT_IOVA: AtomicU64 = AtomicU64::new(SOFT_IOVA_BASE);

//======================================================================================================================
// Structures
//======================================================================================================================

/// A zeroed, page-aligned heap region standing in for a DMA memory zone.
struct DmaRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

/// An iterator which will pack objects of a specific layout into a series of memory pages, yielding the offset of each
/// object. The algorithm will try to minimize the number of pages each object spans, which may result in unused bytes
/// at the end of each page. When the aligned size is a factor or multiple of the page size, objects will be tightly
/// packed. Offsets are relative to a page-aligned base.
struct PackingIterator {
    cursor: usize,
    end: usize,
    layout: Layout,
    page_size: usize,
}

/// A software buffer pool.
///
/// Buffers live in a private [DmaRegion] mapped at a synthetic bus address. Free buffers are kept in a bounded
/// lock-free channel, so acquire and release can run concurrently on several cores. Only the carved buffer slots are
/// accepted back, and each one only while it is acquired.
pub struct SoftBufferPool {
    bpid: u16,
    zone: MemZone,
    num_bufs: usize,
    /// Bus address of every buffer, in ascending order.
    slots: Vec<u64>,
    /// Whether the buffer in the matching slot is currently acquired.
    in_use: Vec<AtomicBool>,
    free_tx: Sender<u64>,
    free_rx: Receiver<u64>,
    depletion_entry: usize,
    depletion_exit: usize,
    depleted: AtomicBool,
    /// Must be dropped last, since `zone` points into it.
    _region: DmaRegion,
}

/// A provider of [SoftBufferPool]s.
pub struct SoftPoolProvider {
    live: AtomicUsize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl DmaRegion {
    fn new(len: usize) -> Result<Self, Fail> {
        let layout: Layout = match Layout::from_size_align(len, PAGE_SIZE) {
            Ok(layout) if layout.size() > 0 => layout,
            _ => {
                let cause: String = format!("invalid memory region length (len={:?})", len);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };

        // Safety: the layout has a non-zero size.
        let ptr: *mut u8 = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, layout }),
            None => {
                let cause: String = format!("failed to allocate memory region (len={:?})", len);
                error!("new(): {}", cause);
                Err(Fail::exhausted(&cause))
            },
        }
    }

    fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl PackingIterator {
    fn new(len: usize, page_size: usize, layout: Layout) -> Result<Self, Fail> {
        if len == 0 {
            return Err(Fail::new(libc::EINVAL, "memory buffer too short"));
        }

        if !page_size.is_power_of_two() || page_size < layout.align() {
            return Err(Fail::new(libc::EINVAL, "page size is not valid"));
        }

        Ok(Self {
            cursor: 0,
            end: len,
            layout,
            page_size,
        })
    }

    /// Offset of the first byte after the last packed object.
    fn cursor(&self) -> usize {
        self.cursor
    }
}

impl SoftBufferPool {
    /// Creates a pool seeded as described by `config`. The pool gets the lowest free pool id and a fresh bus address
    /// range; the id is given back when the pool is dropped.
    pub fn new(config: &BufferPoolConfig) -> Result<Self, Fail> {
        let bpid: u16 = match alloc_bpid() {
            Some(bpid) => bpid,
            None => {
                let cause: String = format!("out of buffer pool ids (max={:?})", MAX_BPID);
                error!("new(): {}", cause);
                return Err(Fail::config(&cause));
            },
        };

        // Reserve a bus address range large enough for any layout of this pool.
        let span: u64 = (config.get_buf_size() as u64 + config.get_alignment() as u64 + PAGE_SIZE as u64)
            .saturating_mul(config.get_num_bufs() as u64)
            .next_multiple_of(PAGE_SIZE as u64);
        let phys_base: u64 = NEXT_IOVA.fetch_add(span, Ordering::AcqRel);

        Self::with_bpid(bpid, phys_base, config).inspect_err(|_| free_bpid(bpid))
    }

    fn with_bpid(bpid: u16, phys_base: u64, config: &BufferPoolConfig) -> Result<Self, Fail> {
        config.validate()?;
        let num_bufs: usize = config.get_num_bufs() as usize;
        let layout: Layout = match Layout::from_size_align(config.get_buf_size() as usize, config.get_alignment()) {
            Ok(layout) => layout,
            Err(e) => {
                let cause: String = format!("invalid buffer layout: {}", e);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };

        // Lay the buffers out over an unbounded span first, then allocate exactly what the layout consumed.
        let bound: usize = match (layout.size() + layout.align() + PAGE_SIZE).checked_mul(num_bufs) {
            Some(bound) => bound,
            None => {
                let cause: String = format!("pool too large (num_bufs={:?})", num_bufs);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let mut packer: PackingIterator = PackingIterator::new(bound, PAGE_SIZE, layout)?;
        let offsets: Vec<usize> = packer.by_ref().take(num_bufs).collect();
        if offsets.len() != num_bufs {
            let cause: String = format!("failed to lay out buffers (expected={:?}, got={:?})", num_bufs, offsets.len());
            error!("new(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let region: DmaRegion = DmaRegion::new(packer.cursor().next_multiple_of(PAGE_SIZE))?;
        let zone: MemZone = MemZone::new(region.addr(), phys_base, region.len());

        let slots: Vec<u64> = offsets.iter().map(|offset: &usize| phys_base + *offset as u64).collect();
        let (free_tx, free_rx): (Sender<u64>, Receiver<u64>) = crossbeam_channel::bounded(num_bufs);
        for addr in &slots {
            if free_tx.try_send(*addr).is_err() {
                let cause: String = format!("failed to seed buffer pool (bpid={:?})", bpid);
                error!("new(): {}", cause);
                return Err(Fail::config(&cause));
            }
        }

        Ok(Self {
            bpid,
            zone,
            num_bufs,
            in_use: slots.iter().map(|_| AtomicBool::new(false)).collect(),
            slots,
            free_tx,
            free_rx,
            depletion_entry: config.get_depletion_entry() as usize,
            depletion_exit: config.get_depletion_exit() as usize,
            depleted: AtomicBool::new(false),
            _region: region,
        })
    }

    /// Number of buffers seeded into this pool.
    pub fn num_bufs(&self) -> usize {
        self.num_bufs
    }

    /// Returns `true` if this pool is in depletion.
    pub fn is_depleted(&self) -> bool {
        self.depleted.load(Ordering::Acquire)
    }

    /// Index of the buffer slot that starts at bus address `addr`.
    fn slot(&self, addr: u64) -> Option<usize> {
        self.slots.binary_search(&addr).ok()
    }

    fn update_depletion(&self) {
        if self.depletion_entry == 0 {
            return;
        }
        let free: usize = self.free_rx.len();
        if free <= self.depletion_entry {
            if !self.depleted.swap(true, Ordering::AcqRel) {
                warn!(
                    "buffer pool entered depletion (bpid={:?}, free={:?}, entry={:?})",
                    self.bpid, free, self.depletion_entry
                );
            }
        } else if free >= self.depletion_exit && self.depleted.swap(false, Ordering::AcqRel) {
            debug!(
                "buffer pool left depletion (bpid={:?}, free={:?}, exit={:?})",
                self.bpid, free, self.depletion_exit
            );
        }
    }
}

impl SoftPoolProvider {
    pub fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
        }
    }

    /// Number of pools created and not yet destroyed.
    pub fn live_pools(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

//======================================================================================================================
// Helper Functions
//======================================================================================================================

/// Reserves the lowest free buffer pool id.
fn alloc_bpid() -> Option<u16> {
    let mut in_use: MutexGuard<'_, [bool; MAX_BPID]> = BPIDS_IN_USE.lock().unwrap_or_else(PoisonError::into_inner);
    let bpid: usize = in_use.iter().skip(1).position(|used: &bool| !*used)? + 1;
    in_use[bpid] = true;
    Some(bpid as u16)
}

fn free_bpid(bpid: u16) {
    let mut in_use: MutexGuard<'_, [bool; MAX_BPID]> = BPIDS_IN_USE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(used) = in_use.get_mut(bpid as usize) {
        *used = false;
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for SoftBufferPool {
    fn drop(&mut self) {
        free_bpid(self.bpid);
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        // Safety: the pointer was allocated in `new()` with this very layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// Safety: the region is plain memory owned exclusively by this value. Concurrent access to its contents is arbitrated
// by the pool that hands out its buffers.
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl Iterator for PackingIterator {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        // Work on a temporary cursor so we can back out our changes if we fail.
        let mut temp: usize = self.cursor.next_multiple_of(self.layout.align());
        if temp >= self.end {
            return None;
        }

        // The number of bytes required to be in a page to span the minimum number of pages. The algorithm here
        // prioritizes minimizing the number of pages per object, which can result in sparse "packing".
        let req_bytes_in_page: usize = self.layout.size() % self.page_size;

        // Check how many bytes left in the page; see if we need to realign to reduce page spanning.
        let next_page_align: usize = (temp + 1).next_multiple_of(self.page_size) - temp;
        if next_page_align < req_bytes_in_page {
            temp += next_page_align;
            if temp >= self.end {
                return None;
            }
        }

        match temp.checked_add(self.layout.size()) {
            Some(next) if next <= self.end => {
                // Commit the cursor update.
                self.cursor = next;
                Some(temp)
            },
            _ => None,
        }
    }
}

impl HwBufferPool for SoftBufferPool {
    fn bpid(&self) -> u16 {
        self.bpid
    }

    fn zone(&self) -> MemZone {
        self.zone
    }

    fn acquire(&self, bufs: &mut [u64]) -> usize {
        let n: usize = bufs.len().min(DPAA2_MBUF_MAX_ACQ_REL);
        let mut count: usize = 0;
        while count < n {
            match self.free_rx.try_recv() {
                Ok(addr) => {
                    if let Some(idx) = self.slot(addr) {
                        self.in_use[idx].store(true, Ordering::Release);
                    }
                    bufs[count] = addr;
                    count += 1;
                },
                Err(_) => break,
            }
        }
        trace!("acquire(): bpid={:?} requested={:?} acquired={:?}", self.bpid, n, count);
        self.update_depletion();
        count
    }

    fn release(&self, bufs: &[u64]) -> Result<(), Fail> {
        if bufs.len() > DPAA2_MBUF_MAX_ACQ_REL {
            let cause: String = format!(
                "too many buffers in a single release (bpid={:?}, count={:?})",
                self.bpid,
                bufs.len()
            );
            error!("release(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        for addr in bufs {
            match self.slot(*addr) {
                Some(idx) if self.in_use[idx].load(Ordering::Acquire) => (),
                Some(_) => {
                    let cause: String = format!("buffer is already free (bpid={:?}, addr={:#x})", self.bpid, addr);
                    error!("release(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, &cause));
                },
                None => {
                    let cause: String =
                        format!("buffer does not belong to pool (bpid={:?}, addr={:#x})", self.bpid, addr);
                    error!("release(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, &cause));
                },
            }
        }
        if self.free_rx.len() + bufs.len() > self.num_bufs {
            let cause: String = format!("release would overflow pool (bpid={:?})", self.bpid);
            error!("release(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }

        for addr in bufs {
            // Checked above. A repeated address within `bufs` is only released once.
            let idx: usize = match self.slot(*addr) {
                Some(idx) => idx,
                None => continue,
            };
            if !self.in_use[idx].swap(false, Ordering::AcqRel) {
                let cause: String = format!("buffer released twice (bpid={:?}, addr={:#x})", self.bpid, addr);
                error!("release(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            }
            if let Err(e) = self.free_tx.try_send(*addr) {
                let cause: String = match e {
                    TrySendError::Full(addr) => format!("pool overflow (bpid={:?}, addr={:#x})", self.bpid, addr),
                    TrySendError::Disconnected(addr) => {
                        format!("pool is gone (bpid={:?}, addr={:#x})", self.bpid, addr)
                    },
                };
                error!("release(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            }
        }
        trace!("release(): bpid={:?} released={:?}", self.bpid, bufs.len());
        self.update_depletion();
        Ok(())
    }

    fn available(&self) -> usize {
        self.free_rx.len()
    }

    fn owns(&self, addr: u64) -> bool {
        self.slot(addr).is_some()
    }
}

impl PoolProvider for SoftPoolProvider {
    fn create_pool(&self, config: &BufferPoolConfig) -> Result<Arc<dyn HwBufferPool>, Fail> {
        let pool: SoftBufferPool = match SoftBufferPool::new(config) {
            Ok(pool) => pool,
            Err(e) => {
                let cause: String =
                    format!("failed to create buffer pool (buf_size={:?}): {}", config.get_buf_size(), e.cause);
                error!("create_pool(): {}", cause);
                return Err(Fail::config(&cause));
            },
        };
        self.live.fetch_add(1, Ordering::AcqRel);
        debug!(
            "create_pool(): bpid={:?} buf_size={:?} num_bufs={:?} phys_base={:#x}",
            pool.bpid,
            config.get_buf_size(),
            config.get_num_bufs(),
            pool.zone.phys_base()
        );
        Ok(Arc::new(pool))
    }

    fn destroy_pool(&self, pool: &Arc<dyn HwBufferPool>) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!("destroy_pool(): bpid={:?}", pool.bpid());
    }
}

impl Default for SoftPoolProvider {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
