// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use super::{
    fd::{
        FrameDescriptor,
        FD_WORDS,
    },
    get_field,
    join_u64,
    words_from_le_bytes,
    words_to_le_bytes,
};
use ::std::fmt;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Size of a dequeue result in bytes.
pub const DQ_SIZE: usize = 64;

/// Number of 32-bit words in a dequeue result.
pub const DQ_WORDS: usize = DQ_SIZE / 4;

/// Number of header words preceding the embedded frame descriptor.
const HEADER_WORDS: usize = DQ_WORDS - FD_WORDS;

// Word 0: verb, stat and sequence number.
const VERB_STAT_SEQNUM: usize = 0;
const VERB_SHIFT: u32 = 0;
const VERB_MASK: u32 = 0xFF;
const STAT_SHIFT: u32 = 8;
const STAT_MASK: u32 = 0xFF;
const SEQNUM_SHIFT: u32 = 16;
const SEQNUM_MASK: u32 = 0x3FFF;

// Word 1: order definition point id and token.
const ODPID_TOKEN: usize = 1;
const ODPID_SHIFT: u32 = 0;
const ODPID_MASK: u32 = 0xFFFF;
const TOKEN_SHIFT: u32 = 24;
const TOKEN_MASK: u32 = 0xFF;

// Remaining header words.
const FQID: usize = 2;
const FQID_MASK: u32 = 0x00FF_FFFF;
const BYTE_COUNT: usize = 4;
const FRAME_COUNT: usize = 5;
const FRAME_COUNT_MASK: u32 = 0x00FF_FFFF;
const FQD_CTX_LO: usize = 6;
const FQD_CTX_HI: usize = 7;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Status byte of a [DequeueResult].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DqFlags(u8);

/// QBMan Dequeue Result
///
/// The 16-word record written by the queue manager when a frame is dequeued. Software never fills one in; the queue
/// driver hands it over and the accessors below read it. Not every dequeue result carries a frame: check
/// [DequeueResult::has_valid_frame] before trusting [DequeueResult::fd] or [DequeueResult::seqnum], and
/// [DequeueResult::has_valid_odp] before trusting [DequeueResult::odpid].
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DequeueResult {
    header: [u32; HEADER_WORDS],
    fd: FrameDescriptor,
}

const _: () = assert!(std::mem::size_of::<DequeueResult>() == DQ_SIZE);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl DqFlags {
    /// Frame queue is empty.
    pub const FQ_EMPTY: Self = Self(0x80);
    /// Frame queue is held active.
    pub const HELD_ACTIVE: Self = Self(0x40);
    /// Frame queue was forced eligible.
    pub const FORCE_ELIGIBLE: Self = Self(0x20);
    /// The result carries a valid frame.
    pub const VALID_FRAME: Self = Self(0x10);
    /// The order definition point id is valid.
    pub const ODP_VALID: Self = Self(0x04);
    /// Result of a volatile (pull) dequeue command.
    pub const VOLATILE: Self = Self(0x02);
    /// The volatile dequeue command has expired.
    pub const EXPIRED: Self = Self(0x01);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl DequeueResult {
    /// Wraps the raw words written by the queue manager.
    pub fn from_words(words: [u32; DQ_WORDS]) -> Self {
        let mut header: [u32; HEADER_WORDS] = [0; HEADER_WORDS];
        header.copy_from_slice(&words[..HEADER_WORDS]);
        let mut fd: [u32; FD_WORDS] = [0; FD_WORDS];
        fd.copy_from_slice(&words[HEADER_WORDS..]);
        Self {
            header,
            fd: FrameDescriptor::from_words(fd),
        }
    }

    /// Decodes a dequeue result from its little-endian wire representation.
    pub fn from_le_bytes(bytes: &[u8; DQ_SIZE]) -> Self {
        Self::from_words(words_from_le_bytes(bytes))
    }

    pub fn to_words(&self) -> [u32; DQ_WORDS] {
        let mut words: [u32; DQ_WORDS] = [0; DQ_WORDS];
        words[..HEADER_WORDS].copy_from_slice(&self.header);
        words[HEADER_WORDS..].copy_from_slice(self.fd.words());
        words
    }

    pub fn to_le_bytes(&self) -> [u8; DQ_SIZE] {
        let mut bytes: [u8; DQ_SIZE] = [0; DQ_SIZE];
        words_to_le_bytes(&self.to_words(), &mut bytes);
        bytes
    }

    /// Response verb.
    #[inline]
    pub fn verb(&self) -> u8 {
        get_field(self.header[VERB_STAT_SEQNUM], VERB_SHIFT, VERB_MASK) as u8
    }

    /// Status byte.
    #[inline]
    pub fn flags(&self) -> DqFlags {
        DqFlags(get_field(self.header[VERB_STAT_SEQNUM], STAT_SHIFT, STAT_MASK) as u8)
    }

    /// Returns `true` if this result answers a volatile (pull) dequeue command.
    #[inline]
    pub fn is_pull(&self) -> bool {
        self.flags().contains(DqFlags::VOLATILE)
    }

    /// Returns `true` if the pull command has completed. Only meaningful when [DequeueResult::is_pull] holds.
    #[inline]
    pub fn is_pull_complete(&self) -> bool {
        self.flags().contains(DqFlags::EXPIRED)
    }

    #[inline]
    pub fn is_fq_empty(&self) -> bool {
        self.flags().contains(DqFlags::FQ_EMPTY)
    }

    #[inline]
    pub fn has_valid_frame(&self) -> bool {
        self.flags().contains(DqFlags::VALID_FRAME)
    }

    #[inline]
    pub fn has_valid_odp(&self) -> bool {
        self.flags().contains(DqFlags::ODP_VALID)
    }

    /// Order restoration sequence number. Valid only if the valid-frame flag is set.
    #[inline]
    pub fn seqnum(&self) -> u16 {
        get_field(self.header[VERB_STAT_SEQNUM], SEQNUM_SHIFT, SEQNUM_MASK) as u16
    }

    /// Order definition point id. Valid only if the ODP-valid flag is set.
    #[inline]
    pub fn odpid(&self) -> u16 {
        get_field(self.header[ODPID_TOKEN], ODPID_SHIFT, ODPID_MASK) as u16
    }

    /// Token of the pull command this result answers.
    #[inline]
    pub fn token(&self) -> u8 {
        get_field(self.header[ODPID_TOKEN], TOKEN_SHIFT, TOKEN_MASK) as u8
    }

    /// Frame queue id.
    #[inline]
    pub fn fqid(&self) -> u32 {
        self.header[FQID] & FQID_MASK
    }

    /// Number of bytes remaining in the frame queue.
    #[inline]
    pub fn byte_count(&self) -> u32 {
        self.header[BYTE_COUNT]
    }

    /// Number of frames remaining in the frame queue.
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.header[FRAME_COUNT] & FRAME_COUNT_MASK
    }

    /// Frame queue context programmed at enqueue configuration time.
    #[inline]
    pub fn fq_context(&self) -> u64 {
        join_u64(self.header[FQD_CTX_LO], self.header[FQD_CTX_HI])
    }

    /// Embedded frame descriptor.
    #[inline]
    pub fn fd(&self) -> &FrameDescriptor {
        &self.fd
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for DqFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(DqFlags, &str); 7] = [
            (DqFlags::FQ_EMPTY, "FQ_EMPTY"),
            (DqFlags::HELD_ACTIVE, "HELD_ACTIVE"),
            (DqFlags::FORCE_ELIGIBLE, "FORCE_ELIGIBLE"),
            (DqFlags::VALID_FRAME, "VALID_FRAME"),
            (DqFlags::ODP_VALID, "ODP_VALID"),
            (DqFlags::VOLATILE, "VOLATILE"),
            (DqFlags::EXPIRED, "EXPIRED"),
        ];
        let mut list: fmt::DebugList<'_, '_> = f.debug_list();
        for (flag, name) in NAMES.iter() {
            if self.contains(*flag) {
                list.entry(&format_args!("{}", name));
            }
        }
        list.finish()
    }
}

impl fmt::Debug for DequeueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DequeueResult")
            .field("verb", &format_args!("{:#x}", self.verb()))
            .field("flags", &self.flags())
            .field("seqnum", &self.seqnum())
            .field("odpid", &self.odpid())
            .field("fqid", &self.fqid())
            .field("byte_count", &self.byte_count())
            .field("frame_count", &self.frame_count())
            .field("fq_context", &format_args!("{:#x}", self.fq_context()))
            .field("fd", &self.fd)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
