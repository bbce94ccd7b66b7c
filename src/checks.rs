// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Operation preconditions shared by both dispatch backends.
//!
//! Every check rejects with `InvalidParam` (dimension bounds with
//! `OutOfRange`) before any driver entry point is reached.

use crate::driver::{PixelFormat, Roi, SocGeneration};
use crate::error::{Result, VpuError};
use crate::memory::{DeviceBuffer, Picture};

pub const MIN_CROP_WIDTH: u32 = 10;
pub const MIN_CROP_HEIGHT: u32 = 6;

pub const MAX_RESIZE_RATIO: f64 = 16.0;
pub const MIN_RESIZE_RATIO: f64 = 1.0 / 32.0;

pub const MIN_VDEC_WIDTH: u32 = 128;
pub const MIN_VDEC_HEIGHT: u32 = 128;
pub const MAX_VDEC_DIM_GEN1: u32 = 4096;
pub const MAX_VDEC_DIM_GEN2: u32 = 8192;

const fn to_even(value: u32) -> u32 {
    value & !1
}

const fn align_even(value: u32) -> u32 {
    (value + 1) & !1
}

/// Output buffers of decode/convert/crop/resize/pad results must live in
/// device-visible memory.
pub fn check_output_kind(buf: &DeviceBuffer) -> Result<()> {
    if !buf.kind().is_device_like() {
        return Err(VpuError::invalid(format!(
            "operation output must be Device or Media memory, got {:?}",
            buf.kind()
        )));
    }
    Ok(())
}

/// Validates a crop region against the input picture and returns the
/// driver-aligned region.
///
/// YUV regions are normalized to even start and even end coordinates before
/// checking; RGB regions are taken as-is.  The region must not be inverted,
/// must meet the minimum crop size, and must fall within the 2-aligned input
/// bounds.
pub fn check_crop_roi(input: &Picture, roi: &Roi) -> Result<Roi> {
    let aligned = match input.format() {
        PixelFormat::Rgb888 | PixelFormat::Bgr888 => *roi,
        PixelFormat::Nv12 | PixelFormat::Nv21 => Roi {
            x0: to_even(roi.x0),
            y0: to_even(roi.y0),
            x1: align_even(roi.x1),
            y1: align_even(roi.y1),
        },
    };
    if aligned.x1 <= aligned.x0 || aligned.y1 <= aligned.y0 {
        return Err(VpuError::invalid(format!(
            "crop region ({}, {}) .. ({}, {}) is inverted or empty",
            aligned.x0, aligned.y0, aligned.x1, aligned.y1
        )));
    }
    let crop_width = align_even(aligned.width());
    let crop_height = align_even(aligned.height());
    if crop_width < MIN_CROP_WIDTH || crop_height < MIN_CROP_HEIGHT {
        return Err(VpuError::invalid(format!(
            "crop region {crop_width}x{crop_height} below minimum \
             {MIN_CROP_WIDTH}x{MIN_CROP_HEIGHT}"
        )));
    }
    if aligned.x1 > align_even(input.width()) || aligned.y1 > align_even(input.height()) {
        return Err(VpuError::invalid(format!(
            "crop region ({}, {}) .. ({}, {}) exceeds input {}x{}",
            aligned.x0,
            aligned.y0,
            aligned.x1,
            aligned.y1,
            input.width(),
            input.height()
        )));
    }
    Ok(aligned)
}

/// The per-axis scale factor must stay within [1/32, 16], inclusive.
pub fn check_resize_ratio(in_w: u32, in_h: u32, out_w: u32, out_h: u32) -> Result<()> {
    if in_w == 0 || in_h == 0 || out_w == 0 || out_h == 0 {
        return Err(VpuError::invalid("resize dimensions must not be zero"));
    }
    let ratio_w = out_w as f64 / in_w as f64;
    let ratio_h = out_h as f64 / in_h as f64;
    for (axis, ratio) in [("width", ratio_w), ("height", ratio_h)] {
        if !(MIN_RESIZE_RATIO..=MAX_RESIZE_RATIO).contains(&ratio) {
            return Err(VpuError::invalid(format!(
                "{axis} zoom ratio {ratio} out of range [1/32, 16]"
            )));
        }
    }
    Ok(())
}

/// Convert-color keeps the geometry and changes only the pixel format.
pub fn check_convert(input: &Picture, output: &Picture) -> Result<()> {
    if input.width() != output.width() || input.height() != output.height() {
        return Err(VpuError::invalid(format!(
            "convert output {}x{} does not match input {}x{}",
            output.width(),
            output.height(),
            input.width(),
            input.height()
        )));
    }
    Ok(())
}

/// Pad output must be exactly input plus the border on each side, same
/// pixel format.
pub fn check_pad(
    input: &Picture,
    output: &Picture,
    top: u32,
    bottom: u32,
    left: u32,
    right: u32,
) -> Result<()> {
    if input.format() != output.format() {
        return Err(VpuError::invalid("pad must keep the pixel format"));
    }
    let want_w = input.width() + left + right;
    let want_h = input.height() + top + bottom;
    if output.width() != want_w || output.height() != want_h {
        return Err(VpuError::invalid(format!(
            "pad output {}x{} does not match input plus border {want_w}x{want_h}",
            output.width(),
            output.height()
        )));
    }
    Ok(())
}

/// Session dimensions are bounded per chip generation.
pub fn check_vdec_dims(generation: SocGeneration, width: u32, height: u32) -> Result<()> {
    let max = match generation {
        SocGeneration::Gen1 => MAX_VDEC_DIM_GEN1,
        SocGeneration::Gen2 => MAX_VDEC_DIM_GEN2,
    };
    if width < MIN_VDEC_WIDTH || width > max {
        return Err(VpuError::OutOfRange(format!(
            "width {width} out of range [{MIN_VDEC_WIDTH}, {max}]"
        )));
    }
    if height < MIN_VDEC_HEIGHT || height > max {
        return Err(VpuError::OutOfRange(format!(
            "height {height} out of range [{MIN_VDEC_HEIGHT}, {max}]"
        )));
    }
    Ok(())
}

/// First-generation parts only produce semi-planar YUV; the second
/// generation adds packed RGB.
pub fn check_session_format(generation: SocGeneration, format: PixelFormat) -> Result<()> {
    match (generation, format) {
        (_, PixelFormat::Nv12) | (_, PixelFormat::Nv21) => Ok(()),
        (SocGeneration::Gen2, PixelFormat::Rgb888) | (SocGeneration::Gen2, PixelFormat::Bgr888) => {
            Ok(())
        }
        (SocGeneration::Gen1, other) => Err(VpuError::invalid(format!(
            "pixel format {other:?} is not supported on first-generation parts"
        ))),
    }
}
