// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// QBMan Records
//======================================================================================================================

// Binary records exchanged with the DPAA2 queue and buffer manager. Every record here is a fixed array of 32-bit
// words laid out exactly as the hardware DMA engines expect them. Accessors are unchecked: setters mask the value to
// the width of the field and never validate it against the addressed buffer.

pub mod dq;
pub mod fd;
pub mod fle;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Extracts the field of `mask` width starting at bit `shift` of `word`.
#[inline]
pub(crate) const fn get_field(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

/// Overwrites the field of `mask` width starting at bit `shift` of `word`, leaving every other bit untouched.
#[inline]
pub(crate) fn set_field(word: &mut u32, shift: u32, mask: u32, value: u32) {
    *word = (*word & !(mask << shift)) | ((value & mask) << shift);
}

/// Joins a low and a high word into a 64-bit value.
#[inline]
pub(crate) const fn join_u64(lo: u32, hi: u32) -> u64 {
    ((hi as u64) << 32) | (lo as u64)
}

/// Splits a 64-bit value into its low and high words.
#[inline]
pub(crate) const fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

/// Decodes little-endian bytes into 32-bit words.
pub(crate) fn words_from_le_bytes<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words: [u32; N] = [0; N];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Encodes 32-bit words as little-endian bytes. `out` must hold `4 * words.len()` bytes.
pub(crate) fn words_to_le_bytes(words: &[u32], out: &mut [u8]) {
    for (word, chunk) in words.iter().zip(out.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
