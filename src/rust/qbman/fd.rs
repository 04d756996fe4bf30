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
use ::std::fmt;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Size of a frame descriptor in bytes.
pub const FD_SIZE: usize = 32;

/// Number of 32-bit words in a frame descriptor.
pub const FD_WORDS: usize = FD_SIZE / 4;

// Word indexes.
const ADDR_LO: usize = 0;
const ADDR_HI: usize = 1;
const LEN: usize = 2;
const BPID_OFFSET: usize = 3;
const FRC: usize = 4;
const CTRL: usize = 5;
const FLC_LO: usize = 6;
const FLC_HI: usize = 7;

// Fields of the `BPID_OFFSET` word.
const BPID_SHIFT: u32 = 0;
const BPID_MASK: u32 = 0x3FFF;
const IVP_SHIFT: u32 = 14;
const BMT_SHIFT: u32 = 15;
const OFFSET_SHIFT: u32 = 16;
const OFFSET_MASK: u32 = 0x0FFF;
const FORMAT_SHIFT: u32 = 28;
const FORMAT_MASK: u32 = 0x3;
const SL_SHIFT: u32 = 30;

// Fields of the `CTRL` word.
const ASAL_SHIFT: u32 = 16;
const ASAL_MASK: u32 = 0xF;

/// Marker OR-ed into the frame context when the flow context carries an internal job descriptor.
pub const FD_INTERNAL_JD_MARKER: u32 = 0x8000_0000;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Frame format encoded in a [FrameDescriptor].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FdFormat {
    /// The address points at a single data buffer.
    Single = 0,
    /// The address points at an array of frame list entries.
    Compound = 1,
    /// The address points at a scatter-gather table.
    ScatterGather = 2,
    /// Reserved encoding.
    Reserved = 3,
}

/// QBMan Frame Descriptor
///
/// A frame descriptor is the 32-byte record through which software and the DPAA2 accelerators describe a frame. The
/// layout is fixed by hardware:
///
/// | Word | Contents                                                                         |
/// |------|----------------------------------------------------------------------------------|
/// | 0-1  | Buffer bus address                                                               |
/// | 2    | Frame length                                                                     |
/// | 3    | bpid\[0:13\] ivp\[14\] bmt\[15\] offset\[16:27\] format\[28:29\] short-length\[30\] |
/// | 4    | Frame context (FRC)                                                              |
/// | 5    | Control (ASAL\[16:19\] and error bits)                                           |
/// | 6-7  | Flow context (FLC)                                                               |
///
/// None of the accessors validate their input. Setters mask the value to the width of the field; callers are
/// responsible for keeping the offset and length within the addressed buffer.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    words: [u32; FD_WORDS],
}

const _: () = assert!(std::mem::size_of::<FrameDescriptor>() == FD_SIZE);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl FdFormat {
    fn from_bits(bits: u32) -> Self {
        match bits & FORMAT_MASK {
            0 => FdFormat::Single,
            1 => FdFormat::Compound,
            2 => FdFormat::ScatterGather,
            _ => FdFormat::Reserved,
        }
    }
}

impl FrameDescriptor {
    /// Creates an all-zero frame descriptor.
    pub const fn new() -> Self {
        Self { words: [0; FD_WORDS] }
    }

    /// Creates a frame descriptor from its raw words.
    pub const fn from_words(words: [u32; FD_WORDS]) -> Self {
        Self { words }
    }

    /// Returns the raw words of the frame descriptor.
    pub const fn words(&self) -> &[u32; FD_WORDS] {
        &self.words
    }

    /// Decodes a frame descriptor from its little-endian wire representation.
    pub fn from_le_bytes(bytes: &[u8; FD_SIZE]) -> Self {
        Self {
            words: words_from_le_bytes(bytes),
        }
    }

    /// Encodes the frame descriptor into its little-endian wire representation.
    pub fn to_le_bytes(&self) -> [u8; FD_SIZE] {
        let mut bytes: [u8; FD_SIZE] = [0; FD_SIZE];
        words_to_le_bytes(&self.words, &mut bytes);
        bytes
    }

    /// Clears every field.
    pub fn reset(&mut self) {
        self.words = [0; FD_WORDS];
    }

    // -------
    // Address
    // -------

    /// Bus address of the frame (or of its frame list, for compound frames).
    #[inline]
    pub fn addr(&self) -> u64 {
        join_u64(self.words[ADDR_LO], self.words[ADDR_HI])
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u64) {
        (self.words[ADDR_LO], self.words[ADDR_HI]) = split_u64(addr);
    }

    // ------
    // Length
    // ------

    #[inline]
    pub fn len(&self) -> u32 {
        self.words[LEN]
    }

    #[inline]
    pub fn set_len(&mut self, len: u32) {
        self.words[LEN] = len;
    }

    /// Returns `true` if the frame length is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------
    // Offset
    // ------

    /// Offset of the frame data from the start of the buffer. The hardware field is 12 bits wide.
    #[inline]
    pub fn offset(&self) -> u16 {
        get_field(self.words[BPID_OFFSET], OFFSET_SHIFT, OFFSET_MASK) as u16
    }

    #[inline]
    pub fn set_offset(&mut self, offset: u16) {
        set_field(&mut self.words[BPID_OFFSET], OFFSET_SHIFT, OFFSET_MASK, offset as u32);
    }

    // ---------------
    // Buffer Pool Id
    // ---------------

    /// Identifier of the buffer pool the frame buffer belongs to (14 bits).
    #[inline]
    pub fn bpid(&self) -> u16 {
        get_field(self.words[BPID_OFFSET], BPID_SHIFT, BPID_MASK) as u16
    }

    #[inline]
    pub fn set_bpid(&mut self, bpid: u16) {
        set_field(&mut self.words[BPID_OFFSET], BPID_SHIFT, BPID_MASK, bpid as u32);
    }

    /// Invalid-pool bit. When set, hardware must not release the buffer into any pool.
    #[inline]
    pub fn ivp(&self) -> bool {
        get_field(self.words[BPID_OFFSET], IVP_SHIFT, 1) != 0
    }

    /// Marks the buffer as not belonging to any pool.
    #[inline]
    pub fn set_ivp(&mut self) {
        set_field(&mut self.words[BPID_OFFSET], IVP_SHIFT, 1, 1);
    }

    #[inline]
    pub fn clear_ivp(&mut self) {
        set_field(&mut self.words[BPID_OFFSET], IVP_SHIFT, 1, 0);
    }

    /// Bypass-memory-translation bit.
    #[inline]
    pub fn bmt(&self) -> bool {
        get_field(self.words[BPID_OFFSET], BMT_SHIFT, 1) != 0
    }

    #[inline]
    pub fn set_bmt(&mut self, bmt: bool) {
        set_field(&mut self.words[BPID_OFFSET], BMT_SHIFT, 1, bmt as u32);
    }

    // ------
    // Format
    // ------

    #[inline]
    pub fn format(&self) -> FdFormat {
        FdFormat::from_bits(get_field(self.words[BPID_OFFSET], FORMAT_SHIFT, FORMAT_MASK))
    }

    #[inline]
    pub fn set_format(&mut self, format: FdFormat) {
        set_field(&mut self.words[BPID_OFFSET], FORMAT_SHIFT, FORMAT_MASK, format as u32);
    }

    /// Marks the frame as compound: the address points at an array of frame list entries.
    #[inline]
    pub fn set_compound_format(&mut self) {
        self.set_format(FdFormat::Compound);
    }

    /// Short-length bit.
    #[inline]
    pub fn short_len(&self) -> bool {
        get_field(self.words[BPID_OFFSET], SL_SHIFT, 1) != 0
    }

    // -------------
    // Frame Context
    // -------------

    #[inline]
    pub fn frc(&self) -> u32 {
        self.words[FRC]
    }

    #[inline]
    pub fn set_frc(&mut self, frc: u32) {
        self.words[FRC] = frc;
    }

    /// Records the length of an internal job descriptor carried through the flow context.
    #[inline]
    pub fn set_internal_jd(&mut self, len: u32) {
        self.set_frc(FD_INTERNAL_JD_MARKER | len);
    }

    /// Returns `true` if the frame context announces an internal job descriptor.
    #[inline]
    pub fn has_internal_jd(&self) -> bool {
        self.frc() & FD_INTERNAL_JD_MARKER != 0
    }

    // -------
    // Control
    // -------

    #[inline]
    pub fn ctrl(&self) -> u32 {
        self.words[CTRL]
    }

    #[inline]
    pub fn set_ctrl(&mut self, ctrl: u32) {
        self.words[CTRL] = ctrl;
    }

    #[inline]
    pub fn reset_ctrl(&mut self) {
        self.set_ctrl(0);
    }

    /// Annotation stash amount, in units of 64 bytes.
    #[inline]
    pub fn asal(&self) -> u8 {
        get_field(self.words[CTRL], ASAL_SHIFT, ASAL_MASK) as u8
    }

    #[inline]
    pub fn set_asal(&mut self, asal: u8) {
        set_field(&mut self.words[CTRL], ASAL_SHIFT, ASAL_MASK, asal as u32);
    }

    // ------------
    // Flow Context
    // ------------

    #[inline]
    pub fn flc(&self) -> u64 {
        join_u64(self.words[FLC_LO], self.words[FLC_HI])
    }

    #[inline]
    pub fn set_flc(&mut self, flc: u64) {
        (self.words[FLC_LO], self.words[FLC_HI]) = split_u64(flc);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .field("offset", &self.offset())
            .field("bpid", &self.bpid())
            .field("ivp", &self.ivp())
            .field("format", &self.format())
            .field("frc", &format_args!("{:#x}", self.frc()))
            .field("ctrl", &format_args!("{:#x}", self.ctrl()))
            .field("flc", &format_args!("{:#x}", self.flc()))
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
