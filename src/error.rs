// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::driver::DriverError;

/// Result alias used throughout the wrapper.
pub type Result<T> = std::result::Result<T, VpuError>;

/// Error taxonomy of the VPU wrapper.
///
/// Every public operation returns exactly one of these variants.  Parameter
/// problems are detected before any driver entry point is called, so an
/// `InvalidParam` guarantees that no hardware state was touched.
#[derive(Debug, thiserror::Error)]
pub enum VpuError {
    /// A precondition was violated; no driver call was made.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A host, device or media memory allocation failed.
    #[error("allocation failed: {0}")]
    AllocFail(String),

    /// A memory copy primitive failed mid-transfer.
    #[error("memory copy failed: {0}")]
    BadCopy(String),

    /// Channel or system creation failed, or the device context switch did.
    #[error("initialization failed: {0}")]
    InitFail(String),

    /// A native driver call returned a non-success code.
    #[error("driver failure: {0}")]
    DriverFail(#[from] DriverError),

    /// A channel id, device id or size is outside the configured bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Internal invariant violation, e.g. a pool that does not exist.
    #[error("internal failure: {0}")]
    CommFailure(String),
}

impl VpuError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        VpuError::InvalidParam(msg.into())
    }
}
