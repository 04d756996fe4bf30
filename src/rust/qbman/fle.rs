// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use super::{
    get_field,
    join_u64,
    set_field,
    split_u64,
    words_from_le_bytes,
    words_to_le_bytes,
};
use crate::runtime::fail::Fail;
use ::std::fmt;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Size of a frame list entry in bytes.
pub const FLE_SIZE: usize = 32;

/// Number of 32-bit words in a frame list entry.
pub const FLE_WORDS: usize = FLE_SIZE / 4;

// Word indexes.
const ADDR_LO: usize = 0;
const ADDR_HI: usize = 1;
const LEN: usize = 2;
const FIN_BPID_OFFSET: usize = 3;
const FRC: usize = 4;

// Fields of the `FIN_BPID_OFFSET` word. The format field must stay zero except for the scatter-gather extension bit.
const BPID_SHIFT: u32 = 0;
const BPID_MASK: u32 = 0x3FFF;
const IVP_SHIFT: u32 = 14;
const OFFSET_SHIFT: u32 = 16;
const OFFSET_MASK: u32 = 0x0FFF;
const SG_EXT_SHIFT: u32 = 29;
const FINAL_SHIFT: u32 = 31;

/// Marker OR-ed into the length when the entry carries an internal job descriptor.
pub const FLE_INTERNAL_JD_MARKER: u32 = 0x8000_0000;

//======================================================================================================================
// Structures
//======================================================================================================================

/// QBMan Frame List Entry
///
/// One node of the frame list referenced by a compound [crate::FrameDescriptor]. Entries are chained by their position
/// in a contiguous array; the last entry of the outermost chain carries the final bit.
///
/// | Word | Contents                                                                 |
/// |------|--------------------------------------------------------------------------|
/// | 0-1  | Bus address                                                              |
/// | 2    | Length                                                                   |
/// | 3    | bpid\[0:13\] ivp\[14\] offset\[16:27\] sg-extension\[29\] final\[31\]       |
/// | 4    | Frame context                                                            |
/// | 5-7  | Reserved                                                                 |
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameListEntry {
    words: [u32; FLE_WORDS],
}

const _: () = assert!(std::mem::size_of::<FrameListEntry>() == FLE_SIZE);

/// Builder that lays out a frame list in a caller-provided table.
///
/// The final bit is written exactly once, by [FleChain::finish], on the last entry pushed.
pub struct FleChain<'a> {
    table: &'a mut [FrameListEntry],
    len: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl FrameListEntry {
    pub const fn new() -> Self {
        Self { words: [0; FLE_WORDS] }
    }

    pub const fn from_words(words: [u32; FLE_WORDS]) -> Self {
        Self { words }
    }

    pub const fn words(&self) -> &[u32; FLE_WORDS] {
        &self.words
    }

    pub fn from_le_bytes(bytes: &[u8; FLE_SIZE]) -> Self {
        Self {
            words: words_from_le_bytes(bytes),
        }
    }

    pub fn to_le_bytes(&self) -> [u8; FLE_SIZE] {
        let mut bytes: [u8; FLE_SIZE] = [0; FLE_SIZE];
        words_to_le_bytes(&self.words, &mut bytes);
        bytes
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        join_u64(self.words[ADDR_LO], self.words[ADDR_HI])
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u64) {
        (self.words[ADDR_LO], self.words[ADDR_HI]) = split_u64(addr);
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.words[LEN]
    }

    #[inline]
    pub fn set_len(&mut self, len: u32) {
        self.words[LEN] = len;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records the length of an internal job descriptor.
    #[inline]
    pub fn set_internal_jd(&mut self, len: u32) {
        self.set_len(FLE_INTERNAL_JD_MARKER | len);
    }

    #[inline]
    pub fn bpid(&self) -> u16 {
        get_field(self.words[FIN_BPID_OFFSET], BPID_SHIFT, BPID_MASK) as u16
    }

    #[inline]
    pub fn set_bpid(&mut self, bpid: u16) {
        set_field(&mut self.words[FIN_BPID_OFFSET], BPID_SHIFT, BPID_MASK, bpid as u32);
    }

    #[inline]
    pub fn ivp(&self) -> bool {
        get_field(self.words[FIN_BPID_OFFSET], IVP_SHIFT, 1) != 0
    }

    #[inline]
    pub fn set_ivp(&mut self) {
        set_field(&mut self.words[FIN_BPID_OFFSET], IVP_SHIFT, 1, 1);
    }

    #[inline]
    pub fn offset(&self) -> u16 {
        get_field(self.words[FIN_BPID_OFFSET], OFFSET_SHIFT, OFFSET_MASK) as u16
    }

    #[inline]
    pub fn set_offset(&mut self, offset: u16) {
        set_field(&mut self.words[FIN_BPID_OFFSET], OFFSET_SHIFT, OFFSET_MASK, offset as u32);
    }

    /// Returns `true` if this entry terminates the frame list.
    #[inline]
    pub fn is_final(&self) -> bool {
        get_field(self.words[FIN_BPID_OFFSET], FINAL_SHIFT, 1) != 0
    }

    #[inline]
    pub fn set_final(&mut self, fin: bool) {
        set_field(&mut self.words[FIN_BPID_OFFSET], FINAL_SHIFT, 1, fin as u32);
    }

    /// Returns `true` if the address of this entry points at a further frame list rather than at data.
    #[inline]
    pub fn is_sg_ext(&self) -> bool {
        get_field(self.words[FIN_BPID_OFFSET], SG_EXT_SHIFT, 1) != 0
    }

    #[inline]
    pub fn set_sg_ext(&mut self, ext: bool) {
        set_field(&mut self.words[FIN_BPID_OFFSET], SG_EXT_SHIFT, 1, ext as u32);
    }

    #[inline]
    pub fn frc(&self) -> u32 {
        self.words[FRC]
    }

    #[inline]
    pub fn set_frc(&mut self, frc: u32) {
        self.words[FRC] = frc;
    }
}

impl<'a> FleChain<'a> {
    /// Starts a frame list at the beginning of `table`. Stale entries are cleared as they are pushed.
    pub fn new(table: &'a mut [FrameListEntry]) -> Self {
        Self { table, len: 0 }
    }

    /// Appends an entry describing a data segment.
    pub fn push(&mut self, addr: u64, len: u32, bpid: u16, offset: u16) -> Result<&mut FrameListEntry, Fail> {
        let fle: &mut FrameListEntry = self.next_slot()?;
        fle.set_addr(addr);
        fle.set_len(len);
        fle.set_bpid(bpid);
        fle.set_offset(offset);
        Ok(fle)
    }

    /// Appends an entry that points at a further frame list located at bus address `table_addr`.
    ///
    /// Multi-level frame lists are not consumed by every accelerator. The nested list is laid out with its own builder
    /// and closed with [FleChain::finish_nested], since only the outermost list carries the final bit.
    pub fn link_extension(&mut self, table_addr: u64, len: u32) -> Result<&mut FrameListEntry, Fail> {
        let fle: &mut FrameListEntry = self.next_slot()?;
        fle.set_addr(table_addr);
        fle.set_len(len);
        fle.set_sg_ext(true);
        Ok(fle)
    }

    /// Number of entries pushed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Terminates the frame list and returns the number of entries in it.
    pub fn finish(self) -> Result<usize, Fail> {
        if self.len == 0 {
            let cause: String = String::from("cannot terminate an empty frame list");
            error!("finish(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        self.table[self.len - 1].set_final(true);
        Ok(self.len)
    }

    /// Closes a nested frame list without writing the final bit and returns the number of entries in it.
    pub fn finish_nested(self) -> usize {
        self.len
    }

    fn next_slot(&mut self) -> Result<&mut FrameListEntry, Fail> {
        if self.len == self.table.len() {
            let cause: String = format!("frame list table is full (entries={:?})", self.table.len());
            error!("push(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let fle: &mut FrameListEntry = &mut self.table[self.len];
        *fle = FrameListEntry::new();
        self.len += 1;
        Ok(fle)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Returns the number of entries in the frame list stored at the start of `table`, counting up to and including the
/// first final entry. Returns `None` if no entry in `table` is final.
pub fn chain_len(table: &[FrameListEntry]) -> Option<usize> {
    table.iter().position(FrameListEntry::is_final).map(|idx: usize| idx + 1)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for FrameListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameListEntry")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .field("bpid", &self.bpid())
            .field("offset", &self.offset())
            .field("final", &self.is_final())
            .field("sg_ext", &self.is_sg_ext())
            .field("frc", &format_args!("{:#x}", self.frc()))
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
