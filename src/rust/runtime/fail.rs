// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::libc::{
    c_int,
    EAGAIN,
    EINVAL,
    EIO,
    ENOMEM,
    ENOSPC,
};
use ::std::{
    error,
    fmt,
    io,
};
use ::yaml_rust::ScanError;

//==============================================================================
// Structures
//==============================================================================

/// Failure
///
/// Every fallible operation in this crate reports through this type. The errno classifies the failure:
///
/// - `ENOMEM`: a buffer pool ran out of buffers.
/// - `ENOSPC`: a destination buffer chain is too small for a copy.
/// - `EAGAIN`: a hardware buffer pool could not be registered.
/// - `ENODEV`: no buffer pool list or buffer pool could be resolved.
/// - `EINVAL`: the request is malformed.
#[derive(Clone)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Creates a failure reporting that a buffer pool is exhausted.
    pub fn exhausted(cause: &str) -> Self {
        Self::new(ENOMEM, cause)
    }

    /// Creates a failure reporting that a destination buffer lacks capacity.
    pub fn no_capacity(cause: &str) -> Self {
        Self::new(ENOSPC, cause)
    }

    /// Creates a failure reporting that a buffer pool could not be configured.
    pub fn config(cause: &str) -> Self {
        Self::new(EAGAIN, cause)
    }

    /// Returns `true` if this failure reports buffer pool exhaustion.
    pub fn is_exhausted(&self) -> bool {
        self.errno == ENOMEM
    }

    /// Returns `true` if this failure reports insufficient destination capacity.
    pub fn is_no_capacity(&self) -> bool {
        self.errno == ENOSPC
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

/// Conversion Trait Implementation for Fail
impl From<io::Error> for Fail {
    fn from(_: io::Error) -> Self {
        Self {
            errno: EIO,
            cause: "I/O error".to_string(),
        }
    }
}

/// Conversion Trait Implementation for Fail
impl From<ScanError> for Fail {
    fn from(e: ScanError) -> Self {
        Self {
            errno: EINVAL,
            cause: format!("malformed configuration: {}", e),
        }
    }
}
