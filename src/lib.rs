// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst VPU Wrapper Library
//!
//! This library manages the fixed set of hardware codec and VPC channels of
//! the EdgeFirst media accelerator and exposes them through a uniform
//! synchronous-looking API.  Two structurally different driver back ends
//! exist for the two chip generations; the right one is selected once at
//! construction from a runtime probe.
//!
//! ## Features
//!
//! - **Channel Pooling**: scarce hardware channels are pre-created per
//!   device and operation type, and handed out safely across threads.
//! - **Dual-Backend Dispatch**: first-generation parts submit onto an
//!   ordered execution stream, second-generation parts acquire a channel
//!   per call and poll a task id; callers never see the difference.
//! - **Cross-Domain Buffers**: byte-accurate copies among host memory,
//!   device memory and the accelerator-local media memory, with ownership
//!   tracked per buffer.
//! - **Video Sessions**: background worker threads drain decoded frames and
//!   encoded streams and deliver them through user callbacks, with a
//!   cooperative flush handshake.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use edgefirst_vpu::config::WrapperConfig;
//! use edgefirst_vpu::driver::{Driver, PixelFormat};
//! use edgefirst_vpu::memory::{MemoryKind, Picture};
//! use edgefirst_vpu::sim::SimDriver;
//! use edgefirst_vpu::vpu::VpuWrapper;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
//! let vpu = VpuWrapper::new(driver.clone(), WrapperConfig::default())?;
//!
//! let src = Picture::alloc(&driver, 1920, 1080, PixelFormat::Nv12, MemoryKind::Device, 0)?;
//! let mut dst = Picture::alloc(&driver, 1280, 720, PixelFormat::Nv12, MemoryKind::Device, 0)?;
//! vpu.resize(&src, &mut dst, 0)?;
//! vpu.deinit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Hardware Acceleration**: an EdgeFirst VPU with `libvpu.so.1`
//!   installed (a software simulation is available on other platforms)
//!
//! ## Safety
//!
//! This library uses `unsafe` code for FFI interactions with the hardware
//! driver and for raw buffer handling.  All unsafe operations are isolated
//! to specific modules and wrapped with safe APIs.

mod backend;

pub mod checks;
pub mod config;
pub mod driver;
pub mod error;
pub mod memory;
pub mod native;
pub mod pool;
pub mod sim;
pub mod vdec;
pub mod venc;
pub mod vpu;

pub use error::{Result, VpuError};
