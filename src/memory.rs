// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::driver::{CopyDirection, Driver, DriverError, PicInfo, PixelFormat};
use crate::error::{Result, VpuError};

/// Upper bound accepted by the allocator, 4 GiB.
pub const MAX_ALLOC_SIZE: u64 = 4_294_967_296;

pub(crate) const VPC_STRIDE_WIDTH: u32 = 16;
pub(crate) const VPC_STRIDE_HEIGHT: u32 = 2;

pub(crate) const fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// Row stride in bytes for an aligned image width.
pub const fn width_stride(format: PixelFormat, width: u32) -> u32 {
    match format {
        PixelFormat::Nv12 | PixelFormat::Nv21 => align_up(width, VPC_STRIDE_WIDTH),
        PixelFormat::Rgb888 | PixelFormat::Bgr888 => align_up(width, VPC_STRIDE_WIDTH) * 3,
    }
}

pub const fn height_stride(height: u32) -> u32 {
    align_up(height, VPC_STRIDE_HEIGHT)
}

/// Total buffer size for an image with the given strides.
pub const fn frame_size(format: PixelFormat, width_stride: u32, height_stride: u32) -> usize {
    match format {
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            width_stride as usize * height_stride as usize * 3 / 2
        }
        PixelFormat::Rgb888 | PixelFormat::Bgr888 => width_stride as usize * height_stride as usize,
    }
}

/// Memory domain a buffer lives in.
///
/// `Media` is the accelerator-local kind used by the codec units.  It counts
/// as device-like for copy-path selection but keeps its own allocate/free
/// primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Host,
    Device,
    Media,
}

impl MemoryKind {
    pub fn is_device_like(&self) -> bool {
        matches!(self, MemoryKind::Device | MemoryKind::Media)
    }
}

/// Who frees the buffer memory.
///
/// Release dispatch resolves from `(release, kind, device)`; borrowed
/// buffers wrap caller memory and are never freed by the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Owned,
    Borrowed,
}

/// A memory region in one of the three domains.
///
/// Buffers allocated through [`DeviceBuffer::alloc`] own their memory and
/// release it exactly once on drop, re-asserting the device context first so
/// the free primitive runs against the right device.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use edgefirst_vpu::driver::Driver;
/// use edgefirst_vpu::memory::{copy, DeviceBuffer, MemoryKind};
/// use edgefirst_vpu::sim::SimDriver;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
/// let mut host = DeviceBuffer::alloc(&driver, 4096, MemoryKind::Host, 0)?;
/// host.write_from_slice(&[0xa5; 4096])?;
///
/// let mut dev = DeviceBuffer::alloc(&driver, 4096, MemoryKind::Device, 0)?;
/// copy(&mut dev, &host)?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceBuffer {
    ptr: *mut u8,
    len: usize,
    kind: MemoryKind,
    device: u32,
    release: Release,
    driver: Arc<dyn Driver>,
}

// The buffer is a plain byte region; the driver serializes device access.
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

pub(crate) fn check_data_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(VpuError::invalid("data size must not be zero"));
    }
    if len as u64 > MAX_ALLOC_SIZE {
        return Err(VpuError::OutOfRange(format!(
            "data size {len} exceeds maximum {MAX_ALLOC_SIZE}"
        )));
    }
    Ok(())
}

impl DeviceBuffer {
    /// Allocates a buffer of `len` bytes in the requested memory domain.
    ///
    /// # Errors
    ///
    /// - `InvalidParam` when `len` is zero
    /// - `OutOfRange` when `len` exceeds [`MAX_ALLOC_SIZE`] or `device` is
    ///   not present
    /// - `AllocFail` when the underlying allocator reports out-of-memory
    pub fn alloc(
        driver: &Arc<dyn Driver>,
        len: usize,
        kind: MemoryKind,
        device: u32,
    ) -> Result<Self> {
        check_data_size(len)?;
        if device >= driver.device_count() {
            return Err(VpuError::OutOfRange(format!(
                "device {device} out of range [0, {})",
                driver.device_count()
            )));
        }
        let ptr = match kind {
            MemoryKind::Host => driver.alloc_host(len),
            MemoryKind::Device => {
                driver.set_device(device)?;
                driver.alloc_device(len)
            }
            MemoryKind::Media => {
                driver.set_device(device)?;
                driver.alloc_media(device, len)
            }
        }
        .map_err(|err| match err {
            DriverError::NoMemory => {
                VpuError::AllocFail(format!("{len} bytes of {kind:?} memory on device {device}"))
            }
            other => VpuError::DriverFail(other),
        })?;
        debug!(len, ?kind, device, "buffer allocated");
        Ok(DeviceBuffer {
            ptr,
            len,
            kind,
            device,
            release: Release::Owned,
            driver: driver.clone(),
        })
    }

    /// Wraps caller-owned memory.  The wrapper never frees such a buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for `len` bytes in the named memory domain for
    /// the lifetime of the returned buffer.
    pub unsafe fn from_raw(
        driver: &Arc<dyn Driver>,
        ptr: *mut u8,
        len: usize,
        kind: MemoryKind,
        device: u32,
    ) -> Self {
        DeviceBuffer {
            ptr,
            len,
            kind,
            device,
            release: Release::Borrowed,
            driver: driver.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// Host-kind buffers are directly readable.
    pub fn as_slice(&self) -> Option<&[u8]> {
        if self.kind == MemoryKind::Host && !self.ptr.is_null() {
            Some(unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
        } else {
            None
        }
    }

    /// Copies `data` into the buffer, staging through the driver copy
    /// primitive for device-like kinds.
    pub fn write_from_slice(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.len {
            return Err(VpuError::invalid(format!(
                "slice length {} does not match buffer length {}",
                data.len(),
                self.len
            )));
        }
        let dir = if self.kind.is_device_like() {
            self.driver.set_device(self.device)?;
            CopyDirection::HostToDevice
        } else {
            CopyDirection::HostToHost
        };
        self.driver
            .memcpy(self.ptr, data.as_ptr(), self.len, dir)
            .map_err(|err| VpuError::BadCopy(err.to_string()))
    }

    /// Reads the buffer contents back into host memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.len];
        let dir = if self.kind.is_device_like() {
            self.driver.set_device(self.device)?;
            CopyDirection::DeviceToHost
        } else {
            CopyDirection::HostToHost
        };
        self.driver
            .memcpy(out.as_mut_ptr(), self.ptr, self.len, dir)
            .map_err(|err| VpuError::BadCopy(err.to_string()))?;
        Ok(out)
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.len)
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("release", &self.release)
            .finish()
    }
}

impl fmt::Display for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}B {:?} dev:{}", self.len, self.kind, self.device)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if self.release == Release::Borrowed || self.ptr.is_null() {
            return;
        }
        let result = match self.kind {
            MemoryKind::Host => self.driver.free_host(self.ptr),
            MemoryKind::Device => self
                .driver
                .set_device(self.device)
                .and_then(|_| self.driver.free_device(self.ptr)),
            MemoryKind::Media => self
                .driver
                .set_device(self.device)
                .and_then(|_| self.driver.free_media(self.ptr)),
        };
        if let Err(err) = result {
            warn!(kind = ?self.kind, device = self.device, %err, "buffer release failed");
        }
        self.ptr = std::ptr::null_mut();
    }
}

/// Copies `src` into `dst` across memory domains.
///
/// Both buffers must have the same byte size.  The pair is classified into
/// one of four paths: host to host, host/device in either direction, same
/// device, or device to device across device indices.  The last path stages
/// through a temporary host buffer sized like `src`; the staging buffer is
/// released no matter which leg fails.
///
/// # Errors
///
/// `InvalidParam` for size mismatches or null pointers, `BadCopy` when any
/// copy primitive fails.  On failure the destination contents are
/// unspecified but the buffer remains valid to release.
pub fn copy(dst: &mut DeviceBuffer, src: &DeviceBuffer) -> Result<()> {
    if dst.ptr.is_null() || src.ptr.is_null() {
        return Err(VpuError::invalid("copy with null pointer"));
    }
    if dst.len != src.len {
        return Err(VpuError::invalid(format!(
            "copy size mismatch: dst {} != src {}",
            dst.len, src.len
        )));
    }
    if !Arc::ptr_eq(&dst.driver, &src.driver) {
        return Err(VpuError::invalid("buffers belong to different drivers"));
    }
    let driver = dst.driver.clone();
    let bad_copy = |err: DriverError| VpuError::BadCopy(err.to_string());

    match (dst.kind.is_device_like(), src.kind.is_device_like()) {
        (false, false) => driver
            .memcpy(dst.ptr, src.ptr, src.len, CopyDirection::HostToHost)
            .map_err(bad_copy),
        (true, false) => {
            driver.set_device(dst.device)?;
            driver
                .memcpy(dst.ptr, src.ptr, src.len, CopyDirection::HostToDevice)
                .map_err(bad_copy)
        }
        (false, true) => {
            driver.set_device(src.device)?;
            driver
                .memcpy(dst.ptr, src.ptr, src.len, CopyDirection::DeviceToHost)
                .map_err(bad_copy)
        }
        (true, true) if dst.device == src.device => {
            driver.set_device(dst.device)?;
            driver
                .memcpy(dst.ptr, src.ptr, src.len, CopyDirection::DeviceToDevice)
                .map_err(bad_copy)
        }
        (true, true) => {
            let mut staging = DeviceBuffer::alloc(&driver, src.len, MemoryKind::Host, src.device)?;
            copy(&mut staging, src)?;
            copy(dst, &staging)
        }
    }
}

/// An image in device-visible memory: a buffer plus geometry.
///
/// The stride fields describe the driver-aligned layout; `width`/`height`
/// are the visible dimensions.
pub struct Picture {
    buf: DeviceBuffer,
    width: u32,
    height: u32,
    width_stride: u32,
    height_stride: u32,
    format: PixelFormat,
}

impl Picture {
    /// Allocates an aligned picture buffer in the given memory domain.
    pub fn alloc(
        driver: &Arc<dyn Driver>,
        width: u32,
        height: u32,
        format: PixelFormat,
        kind: MemoryKind,
        device: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VpuError::invalid("picture dimensions must not be zero"));
        }
        let ws = width_stride(format, width);
        let hs = height_stride(height);
        let buf = DeviceBuffer::alloc(driver, frame_size(format, ws, hs), kind, device)?;
        Ok(Picture {
            buf,
            width,
            height,
            width_stride: ws,
            height_stride: hs,
            format,
        })
    }

    /// Wraps an existing buffer with explicit geometry.
    ///
    /// Fails with `InvalidParam` when the buffer is smaller than the layout
    /// requires.
    pub fn from_buffer(
        buf: DeviceBuffer,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        let ws = width_stride(format, width);
        let hs = height_stride(height);
        let required = frame_size(format, ws, hs);
        if buf.len() < required {
            return Err(VpuError::invalid(format!(
                "buffer of {} bytes too small for {}x{} {:?} ({} bytes required)",
                buf.len(),
                width,
                height,
                format,
                required
            )));
        }
        Ok(Picture {
            buf,
            width,
            height,
            width_stride: ws,
            height_stride: hs,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width_stride(&self) -> u32 {
        self.width_stride
    }

    pub fn height_stride(&self) -> u32 {
        self.height_stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut DeviceBuffer {
        &mut self.buf
    }

    pub fn into_buffer(self) -> DeviceBuffer {
        self.buf
    }

    pub(crate) fn pic_info(&self) -> PicInfo {
        PicInfo {
            addr: self.buf.ptr,
            size: self.buf.len,
            width: self.width,
            height: self.height,
            width_stride: self.width_stride,
            height_stride: self.height_stride,
            format: self.format,
        }
    }
}

impl fmt::Display for Picture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {:?} {}",
            self.width, self.height, self.format, self.buf
        )
    }
}
