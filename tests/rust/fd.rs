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
    qbman::{
        dq::DqFlags,
        fle::{
            self,
            FleChain,
        },
    },
    DequeueResult,
    FdFormat,
    FrameDescriptor,
    FrameListEntry,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};

//==============================================================================
// Helper Functions
//==============================================================================

/// Builds the wire image of a dequeue result as a queue driver would hand it over.
fn dq_bytes(header: [u32; 8], fd: &FrameDescriptor) -> [u8; 64] {
    let mut bytes: [u8; 64] = [0; 64];
    for (i, word) in header.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    bytes[32..].copy_from_slice(&fd.to_le_bytes());
    bytes
}

//==============================================================================
// Unit Tests
//==============================================================================

/// Tests that a frame descriptor matches the hardware layout bit for bit.
#[test]
fn test_unit_fd_wire_layout() -> Result<()> {
    let mut fd: FrameDescriptor = FrameDescriptor::new();
    fd.set_addr(0x0000_0012_3456_7800);
    fd.set_len(1514);
    fd.set_bpid(0x2A);
    fd.set_offset(0x80);
    fd.set_format(FdFormat::Single);
    fd.set_frc(0x0BAD_CAFE);
    fd.set_flc(0x1122_3344_5566_7788);

    let bytes: [u8; 32] = fd.to_le_bytes();
    ensure_eq!(bytes[0..4], 0x3456_7800u32.to_le_bytes());
    ensure_eq!(bytes[4..8], 0x0000_0012u32.to_le_bytes());
    ensure_eq!(bytes[8..12], 1514u32.to_le_bytes());
    ensure_eq!(bytes[12..16], (0x2Au32 | (0x80 << 16)).to_le_bytes());
    ensure_eq!(bytes[16..20], 0x0BAD_CAFEu32.to_le_bytes());
    ensure_eq!(bytes[24..28], 0x5566_7788u32.to_le_bytes());
    ensure_eq!(bytes[28..32], 0x1122_3344u32.to_le_bytes());

    fd.set_compound_format();
    fd.set_ivp();
    ensure_eq!(fd.words()[3], 0x2A | (1 << 14) | (0x80 << 16) | (1 << 28));
    Ok(())
}

/// Tests that every field survives whatever the other fields hold.
#[test]
fn test_unit_fd_fields_are_independent() -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(0x5eed);
    for _ in 0..1000 {
        let addr: u64 = rng.gen();
        let len: u32 = rng.gen();
        let bpid: u16 = rng.gen_range(0..0x4000);
        let offset: u16 = rng.gen_range(0..0x1000);
        let frc: u32 = rng.gen();
        let flc: u64 = rng.gen();

        let mut fd: FrameDescriptor = FrameDescriptor::from_words(rng.gen());
        fd.set_addr(addr);
        fd.set_len(len);
        fd.set_bpid(bpid);
        fd.set_offset(offset);
        fd.set_format(FdFormat::Compound);
        fd.set_frc(frc);
        fd.set_flc(flc);

        ensure_eq!(fd.addr(), addr);
        ensure_eq!(fd.len(), len);
        ensure_eq!(fd.bpid(), bpid);
        ensure_eq!(fd.offset(), offset);
        ensure_eq!(fd.format(), FdFormat::Compound);
        ensure_eq!(fd.frc(), frc);
        ensure_eq!(fd.flc(), flc);
    }
    Ok(())
}

/// Tests decoding of a volatile dequeue response.
#[test]
fn test_unit_dq_decode() -> Result<()> {
    let mut fd: FrameDescriptor = FrameDescriptor::new();
    fd.set_addr(0x8_0000_1000);
    fd.set_len(60);
    fd.set_bpid(3);

    let header: [u32; 8] = [
        0x60 | (0x13 << 8) | (0x1ABC << 16),
        0x0042 | (0x7E << 24),
        0x00AB_CDEF,
        0,
        4096,
        12,
        0xDEAD_BEEF,
        0x0000_0001,
    ];
    let dq: DequeueResult = DequeueResult::from_le_bytes(&dq_bytes(header, &fd));

    ensure_eq!(dq.verb(), 0x60);
    ensure_eq!(dq.flags(), DqFlags::from_bits(0x13));
    ensure!(dq.is_pull());
    ensure!(dq.is_pull_complete());
    ensure!(dq.has_valid_frame());
    ensure!(!dq.has_valid_odp());
    ensure!(!dq.is_fq_empty());
    ensure_eq!(dq.seqnum(), 0x1ABC);
    ensure_eq!(dq.odpid(), 0x42);
    ensure_eq!(dq.token(), 0x7E);
    ensure_eq!(dq.fqid(), 0xAB_CDEF);
    ensure_eq!(dq.byte_count(), 4096);
    ensure_eq!(dq.frame_count(), 12);
    ensure_eq!(dq.fq_context(), 0x1_DEAD_BEEF);
    ensure_eq!(*dq.fd(), fd);
    ensure_eq!(dq.to_le_bytes(), dq_bytes(header, &fd));
    Ok(())
}

/// Tests the pull flags on the documented status bytes.
#[test]
fn test_unit_dq_pull_flags() -> Result<()> {
    for (stat, pull, complete) in [(0x10u32, false, false), (0x12, true, false), (0x13, true, true)] {
        let header: [u32; 8] = [stat << 8, 0, 0, 0, 0, 0, 0, 0];
        let dq: DequeueResult = DequeueResult::from_le_bytes(&dq_bytes(header, &FrameDescriptor::new()));
        ensure_eq!(dq.is_pull(), pull, "stat={:#x}", stat);
        ensure_eq!(dq.is_pull_complete(), complete, "stat={:#x}", stat);
    }
    Ok(())
}

/// Tests a two-level frame list: only the outer list is terminated.
#[test]
fn test_unit_fle_nested_chain() -> Result<()> {
    let mut inner: [FrameListEntry; 2] = [FrameListEntry::new(); 2];
    let mut chain: FleChain = FleChain::new(&mut inner);
    chain.push(0x1000, 64, 1, 0)?;
    chain.push(0x2000, 64, 1, 0)?;
    ensure_eq!(chain.finish_nested(), 2);
    ensure!(inner.iter().all(|entry| !entry.is_final()));

    let mut outer: [FrameListEntry; 3] = [FrameListEntry::new(); 3];
    let mut chain: FleChain = FleChain::new(&mut outer);
    chain.push(0x3000, 128, 2, 64)?;
    chain.link_extension(0x9000, 128)?;
    ensure_eq!(chain.finish()?, 2);

    ensure!(!outer[0].is_sg_ext());
    ensure!(outer[1].is_sg_ext());
    ensure!(outer[1].is_final());
    ensure_eq!(fle::chain_len(&outer), Some(2));
    ensure_eq!(fle::chain_len(&inner), None);

    let copy: FrameListEntry = FrameListEntry::from_le_bytes(&outer[0].to_le_bytes());
    ensure_eq!(copy.addr(), 0x3000);
    ensure_eq!(copy.offset(), 64);
    ensure_eq!(copy.bpid(), 2);
    Ok(())
}

/// Tests that job descriptor lengths carry the internal marker.
#[test]
fn test_unit_internal_jd_marker() -> Result<()> {
    let mut fd: FrameDescriptor = FrameDescriptor::new();
    fd.set_internal_jd(0x40);
    ensure!(fd.has_internal_jd());
    ensure_eq!(fd.frc(), 0x8000_0040);

    let mut entry: FrameListEntry = FrameListEntry::new();
    entry.set_internal_jd(0x40);
    ensure_eq!(entry.len(), 0x8000_0040);
    Ok(())
}
