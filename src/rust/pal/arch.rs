// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

// This file is for CPU architecture-specific things.

// ------------------------
// CPU Data Cache Line Size
// ------------------------
::cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))] {
        pub const CPU_DATA_CACHE_LINE_SIZE: usize = 64;
    } else {
        pub const CPU_DATA_CACHE_LINE_SIZE: usize = 128;
    }
}

// ---------
// Page Size
// ---------
// DPAA2 SoCs map DMA zones with 4 KiB granules through the SMMU.
pub const PAGE_SIZE: usize = 4096;
