// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::memory::BufferPoolList;
use ::std::sync::Arc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A DPAA2 network interface or accelerator, as seen by buffer allocation. A device may be affined to a buffer pool
/// list; otherwise it allocates from the head of the registry.
#[derive(Clone, Debug)]
pub struct Dpaa2Device {
    id: u32,
    bp_list: Option<Arc<BufferPoolList>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Dpaa2Device {
    pub fn new(id: u32) -> Self {
        Self { id, bp_list: None }
    }

    /// Affines this device to `bp_list`.
    pub fn with_bp_list(mut self, bp_list: Arc<BufferPoolList>) -> Self {
        self.bp_list = Some(bp_list);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn bp_list(&self) -> Option<&Arc<BufferPoolList>> {
        self.bp_list.as_ref()
    }

    pub fn set_bp_list(&mut self, bp_list: Option<Arc<BufferPoolList>>) {
        self.bp_list = bp_list;
    }
}
