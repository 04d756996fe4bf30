// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    dpaa2::device::Dpaa2Device,
    qbman::{
        fd::{
            FdFormat,
            FrameDescriptor,
        },
        fle::{
            self,
            FrameListEntry,
        },
    },
    runtime::{
        fail::Fail,
        memory::{
            bp_list::BufferPoolList,
            buffer_pool::BufferPool,
            mbuf::{
                Dpaa2Mbuf,
                Segment,
            },
        },
    },
};
use ::std::sync::{
    Arc,
    PoisonError,
    RwLock,
    RwLockReadGuard,
    RwLockWriteGuard,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Buffer Pool List Registry
///
/// Holds the registered buffer pool lists, most recently registered first. Registration is expected to happen at
/// configuration time; lookups on an empty registry fail with `ENODEV`.
#[derive(Debug, Default)]
pub struct BpListRegistry {
    lists: RwLock<Vec<Arc<BufferPoolList>>>,
}

//======================================================================================================================
// Static Variables
//======================================================================================================================

static GLOBAL_REGISTRY: BpListRegistry = BpListRegistry::new();

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BpListRegistry {
    pub const fn new() -> Self {
        Self {
            lists: RwLock::new(Vec::new()),
        }
    }

    /// Inserts `list` at the head of this registry.
    pub fn register(&self, list: Arc<BufferPoolList>) {
        debug!(
            "register(): bpids={:?}",
            list.iter().map(|pool| pool.bpid()).collect::<Vec<u16>>()
        );
        self.write().insert(0, list);
    }

    /// Returns `true` if at least one list is registered.
    pub fn is_initialized(&self) -> bool {
        !self.read().is_empty()
    }

    /// Most recently registered list.
    pub fn head(&self) -> Result<Arc<BufferPoolList>, Fail> {
        match self.read().first() {
            Some(list) => Ok(list.clone()),
            None => {
                let cause: String = String::from("no buffer pool list registered");
                error!("head(): {}", cause);
                Err(Fail::new(libc::ENODEV, &cause))
            },
        }
    }

    /// Snapshot of the registered lists, head first.
    pub fn lists(&self) -> Vec<Arc<BufferPoolList>> {
        self.read().clone()
    }

    /// Looks up a pool by id across all registered lists.
    pub fn find_pool(&self, bpid: u16) -> Result<Arc<BufferPool>, Fail> {
        match self.read().iter().find_map(|list| list.find(bpid)) {
            Some(pool) => Ok(pool.clone()),
            None => {
                let cause: String = format!("unknown buffer pool (bpid={:?})", bpid);
                error!("find_pool(): {}", cause);
                Err(Fail::new(libc::ENODEV, &cause))
            },
        }
    }

    /// Resolves the list affined to `dev`, falling back to the head of this registry.
    pub fn resolve(&self, dev: &Dpaa2Device) -> Result<Arc<BufferPoolList>, Fail> {
        match dev.bp_list() {
            Some(list) => Ok(list.clone()),
            None => self.head(),
        }
    }

    /// Allocates a buffer of `size` bytes from the list affined to `dev`.
    pub fn alloc_sg(&self, dev: &Dpaa2Device, size: usize) -> Result<Dpaa2Mbuf, Fail> {
        self.resolve(dev)?.alloc_sg(size)
    }

    /// Allocates a buffer of `len` bytes from the pool identified by `bpid`.
    pub fn alloc_sg_from_bpid(&self, bpid: u16, len: usize) -> Result<Dpaa2Mbuf, Fail> {
        let list: Arc<BufferPoolList> = match self.read().iter().find(|list| list.find(bpid).is_some()) {
            Some(list) => list.clone(),
            None => {
                let cause: String = format!("unknown buffer pool (bpid={:?})", bpid);
                error!("alloc_sg_from_bpid(): {}", cause);
                return Err(Fail::new(libc::ENODEV, &cause));
            },
        };
        list.alloc_sg_from_bpid(bpid, len)
    }

    /// Takes back ownership of the buffer described by a single-format frame descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must carry ownership of its buffer: it was produced by [Dpaa2Mbuf::into_fd] or handed over by a hardware
    /// dequeue, and no other [Dpaa2Mbuf] owns the same buffer. Each such descriptor may be reclaimed at most once.
    /// Reclaiming a descriptor obtained from the non-consuming [Dpaa2Mbuf::to_fd], or reclaiming twice, yields two
    /// owners of one buffer.
    pub unsafe fn mbuf_from_fd(&self, fd: &FrameDescriptor) -> Result<Dpaa2Mbuf, Fail> {
        if fd.format() != FdFormat::Single {
            let cause: String = format!("not a single-buffer descriptor (format={:?})", fd.format());
            error!("mbuf_from_fd(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if fd.ivp() {
            let cause: String = format!("descriptor has no valid pool (addr={:#x})", fd.addr());
            error!("mbuf_from_fd(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let pool: Arc<BufferPool> = self.find_pool(fd.bpid())?;
        let seg: Segment = Segment::from_bus(pool, fd.addr(), fd.offset(), fd.len())?;
        Ok(Dpaa2Mbuf::from_segments(vec![seg]))
    }

    /// Takes back ownership of the buffers described by the frame list at the start of `table`. Nothing is taken if
    /// any entry fails to resolve.
    ///
    /// # Safety
    ///
    /// Every entry up to the final one must carry ownership of its buffer: the table was filled for a buffer that
    /// was then consumed by [Dpaa2Mbuf::into_compound_fd], or it was handed over by a hardware dequeue. The chain may
    /// be reclaimed at most once.
    pub unsafe fn mbuf_from_fle_chain(&self, table: &[FrameListEntry]) -> Result<Dpaa2Mbuf, Fail> {
        let len: usize = match fle::chain_len(table) {
            Some(len) => len,
            None => {
                let cause: String = format!("frame list is not terminated (entries={:?})", table.len());
                error!("mbuf_from_fle_chain(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };

        let mut segs: Vec<Segment> = Vec::with_capacity(len);
        for entry in &table[..len] {
            if entry.is_sg_ext() || entry.ivp() {
                let cause: String =
                    format!("frame list entry does not describe a pool buffer (addr={:#x})", entry.addr());
                error!("mbuf_from_fle_chain(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            }
            let pool: Arc<BufferPool> = self.find_pool(entry.bpid())?;
            segs.push(Segment::from_bus(pool, entry.addr(), entry.offset(), entry.len())?);
        }
        Ok(Dpaa2Mbuf::from_segments(segs))
    }

    /// Unregisters every list and hands them back to the caller.
    pub fn teardown(&self) -> Vec<Arc<BufferPoolList>> {
        let lists: Vec<Arc<BufferPoolList>> = std::mem::take(&mut *self.write());
        debug!("teardown(): lists={:?}", lists.len());
        lists
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<BufferPoolList>>> {
        self.lists.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<BufferPoolList>>> {
        self.lists.write().unwrap_or_else(PoisonError::into_inner)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Process-wide registry.
pub fn global() -> &'static BpListRegistry {
    &GLOBAL_REGISTRY
}

/// Inserts `list` at the head of the process-wide registry.
pub fn register_global(list: BufferPoolList) -> Arc<BufferPoolList> {
    let list: Arc<BufferPoolList> = Arc::new(list);
    GLOBAL_REGISTRY.register(list.clone());
    list
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
