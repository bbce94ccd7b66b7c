// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Public wrapper facade.
//!
//! `VpuWrapper` presents one operation set regardless of the chip
//! generation.  The dispatch variant is chosen once at construction from the
//! driver's generation probe; every operation validates its parameters
//! before any driver entry point is reached.

use std::sync::Arc;

use tracing::info;

use crate::backend::{Backend, PoolBackend, StreamBackend};
use crate::checks;
use crate::config::{VdecConfig, VencConfig, WrapperConfig};
use crate::driver::{Border, Driver, PicInfo, PixelFormat, Roi, SocGeneration, VpcOp};
use crate::error::Result;
use crate::error::VpuError;
use crate::memory::{check_data_size, DeviceBuffer, Picture};
use crate::pool::ChannelPool;
use crate::vdec::{DecodeCallback, VdecSession};
use crate::venc::{EncodeCallback, VencSession};

/// Uniform front end over the two driver back ends.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use edgefirst_vpu::config::WrapperConfig;
/// use edgefirst_vpu::driver::{Driver, PixelFormat};
/// use edgefirst_vpu::memory::{MemoryKind, Picture};
/// use edgefirst_vpu::sim::SimDriver;
/// use edgefirst_vpu::vpu::VpuWrapper;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
/// let vpu = VpuWrapper::new(driver.clone(), WrapperConfig::default())?;
///
/// let src = Picture::alloc(&driver, 1920, 1080, PixelFormat::Nv12, MemoryKind::Device, 0)?;
/// let mut dst = Picture::alloc(&driver, 1920, 1080, PixelFormat::Rgb888, MemoryKind::Device, 0)?;
/// vpu.convert_color(&src, &mut dst)?;
/// # Ok(())
/// # }
/// ```
pub struct VpuWrapper {
    driver: Arc<dyn Driver>,
    pool: Arc<ChannelPool>,
    device: u32,
    backend: Backend,
}

impl VpuWrapper {
    /// Probes the driver generation and constructs the matching back end.
    pub fn new(driver: Arc<dyn Driver>, config: WrapperConfig) -> Result<Self> {
        config.validate(driver.as_ref())?;
        let pool = Arc::new(ChannelPool::new(driver.clone(), config.pool));
        let backend = match driver.generation() {
            SocGeneration::Gen1 => {
                info!("first-generation runtime detected, using the stream backend");
                Backend::Stream(StreamBackend::new(driver.clone(), config.device)?)
            }
            SocGeneration::Gen2 => {
                info!("second-generation runtime detected, using the pooled backend");
                Backend::Pool(PoolBackend::new(
                    driver.clone(),
                    pool.clone(),
                    config.device,
                ))
            }
        };
        Ok(VpuWrapper {
            driver,
            pool,
            device: config.device,
            backend,
        })
    }

    pub fn generation(&self) -> SocGeneration {
        self.driver.generation()
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    /// Crops `roi` out of `input`.  The output picture must match the
    /// aligned crop size exactly; scaling crops is a crop followed by a
    /// resize.
    pub fn crop(&self, input: &Picture, output: &mut Picture, roi: &Roi) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        let aligned = checks::check_crop_roi(input, roi)?;
        if output.width() != aligned.width() || output.height() != aligned.height() {
            return Err(VpuError::invalid(format!(
                "crop output {}x{} does not match aligned region {}x{}",
                output.width(),
                output.height(),
                aligned.width(),
                aligned.height()
            )));
        }
        self.backend
            .execute(&VpcOp::Crop { roi: aligned }, &input.pic_info(), &output.pic_info())?;
        Ok(())
    }

    /// Scales `input` onto `output`.  The per-axis ratio must stay within
    /// [1/32, 16] and the pixel format is preserved.
    pub fn resize(&self, input: &Picture, output: &mut Picture, interpolation: u32) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        if input.format() != output.format() {
            return Err(VpuError::invalid("resize must keep the pixel format"));
        }
        checks::check_resize_ratio(
            input.width(),
            input.height(),
            output.width(),
            output.height(),
        )?;
        self.backend.execute(
            &VpcOp::Resize { interpolation },
            &input.pic_info(),
            &output.pic_info(),
        )?;
        Ok(())
    }

    /// Converts `input` into the pixel format of `output`, same geometry.
    pub fn convert_color(&self, input: &Picture, output: &mut Picture) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        checks::check_convert(input, output)?;
        self.backend
            .execute(&VpcOp::ConvertColor, &input.pic_info(), &output.pic_info())?;
        Ok(())
    }

    /// Pads `input` with the given border.  Unsupported on first-generation
    /// parts.
    pub fn pad(&self, input: &Picture, output: &mut Picture, border: &Border) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        checks::check_pad(
            input,
            output,
            border.top,
            border.bottom,
            border.left,
            border.right,
        )?;
        self.backend.execute(
            &VpcOp::MakeBorder { border: *border },
            &input.pic_info(),
            &output.pic_info(),
        )?;
        Ok(())
    }

    /// Decodes one JPEG image into `output`.
    pub fn jpeg_decode(&self, input: &DeviceBuffer, output: &mut Picture) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        check_data_size(input.len())?;
        self.backend
            .execute(&VpcOp::JpegDecode, &bitstream_info(input), &output.pic_info())?;
        Ok(())
    }

    /// Decodes one PNG image into `output`.
    pub fn png_decode(&self, input: &DeviceBuffer, output: &mut Picture) -> Result<()> {
        checks::check_output_kind(output.buffer())?;
        check_data_size(input.len())?;
        self.backend
            .execute(&VpcOp::PngDecode, &bitstream_info(input), &output.pic_info())?;
        Ok(())
    }

    /// Encodes `input` as JPEG into `output` and returns the number of
    /// encoded bytes.
    pub fn jpeg_encode(&self, input: &Picture, output: &mut DeviceBuffer) -> Result<usize> {
        checks::check_output_kind(output)?;
        check_data_size(output.len())?;
        let out_info = PicInfo {
            addr: output.as_mut_ptr(),
            size: output.len(),
            width: input.width(),
            height: input.height(),
            width_stride: input.width_stride(),
            height_stride: input.height_stride(),
            format: input.format(),
        };
        self.backend
            .execute(&VpcOp::JpegEncode, &input.pic_info(), &out_info)
    }

    /// Starts a video decode session; decoded frames arrive through the
    /// callback.
    pub fn init_vdec(&self, config: VdecConfig, callback: DecodeCallback) -> Result<VdecSession> {
        VdecSession::new(self.driver.clone(), config, callback)
    }

    /// Starts a video encode session; encoded chunks arrive through the
    /// callback.
    pub fn init_venc(&self, config: VencConfig, callback: EncodeCallback) -> Result<VencSession> {
        VencSession::new(self.driver.clone(), config, callback)
    }

    /// Tears the wrapper down: the stream backend's channel and stream, then
    /// every channel pool.  Best-effort; the last error observed is
    /// returned.
    pub fn deinit(&self) -> Result<()> {
        let backend_result = self.backend.deinit();
        let pool_result = self.pool.deinit();
        backend_result.and(pool_result)
    }
}

/// Geometry-free picture descriptor for an encoded bitstream buffer.
fn bitstream_info(buf: &DeviceBuffer) -> PicInfo {
    PicInfo {
        addr: buf.as_ptr() as *mut u8,
        size: buf.len(),
        width: 0,
        height: 0,
        width_stride: 0,
        height_stride: 0,
        format: PixelFormat::Nv12,
    }
}
