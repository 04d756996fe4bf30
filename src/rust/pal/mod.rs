// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// PAL: Platform Abstraction Layer
//======================================================================================================================

// This is the platform abstraction layer designed to hide architecture specific details, such as the data cache line
// size and the page granularity used when carving DMA regions into buffers.

pub mod arch;
