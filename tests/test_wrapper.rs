// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_vpu::config::{PoolSizes, WrapperConfig};
use edgefirst_vpu::driver::{Border, Driver, PixelFormat, Roi, SocGeneration};
use edgefirst_vpu::memory::{DeviceBuffer, MemoryKind, Picture};
use edgefirst_vpu::sim::SimDriver;
use edgefirst_vpu::vpu::VpuWrapper;
use edgefirst_vpu::VpuError;
use serial_test::serial;
use std::error::Error;
use std::sync::Arc;

fn make_vpu(generation: SocGeneration) -> (Arc<SimDriver>, Arc<dyn Driver>, VpuWrapper) {
    let sim = Arc::new(SimDriver::with_generation(generation));
    let driver: Arc<dyn Driver> = sim.clone();
    let config = WrapperConfig {
        device: 0,
        pool: PoolSizes {
            vpc: 2,
            jpeg_dec: 1,
            png_dec: 1,
            jpeg_enc: 1,
        },
    };
    let vpu = VpuWrapper::new(driver.clone(), config).unwrap();
    (sim, driver, vpu)
}

fn nv12(driver: &Arc<dyn Driver>, width: u32, height: u32) -> Picture {
    Picture::alloc(driver, width, height, PixelFormat::Nv12, MemoryKind::Device, 0).unwrap()
}

/// An inverted crop rectangle must be rejected before any driver call.
#[test]
#[serial]
fn test_crop_invalid_rect_no_driver_call() -> Result<(), Box<dyn Error>> {
    let (sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 1920, 1080);
    let mut output = nv12(&driver, 640, 480);

    let calls_before = sim.call_count();
    let roi = Roi {
        x0: 640,
        y0: 0,
        x1: 640,
        y1: 480,
    };
    let err = vpu.crop(&input, &mut output, &roi).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    assert_eq!(sim.call_count(), calls_before);
    Ok(())
}

#[test]
#[serial]
fn test_crop_below_minimum() -> Result<(), Box<dyn Error>> {
    let (sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 1920, 1080);
    let mut output = nv12(&driver, 640, 480);

    let calls_before = sim.call_count();
    let roi = Roi {
        x0: 0,
        y0: 0,
        x1: 4,
        y1: 4,
    };
    let err = vpu.crop(&input, &mut output, &roi).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    assert_eq!(sim.call_count(), calls_before);
    Ok(())
}

#[test]
#[serial]
fn test_crop_out_of_bounds() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 1920, 1080);
    let mut output = nv12(&driver, 640, 480);
    let roi = Roi {
        x0: 1800,
        y0: 900,
        x1: 2440,
        y1: 1380,
    };
    let err = vpu.crop(&input, &mut output, &roi).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

#[test]
#[serial]
fn test_crop_succeeds() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 1920, 1080);
    let mut output = nv12(&driver, 640, 480);
    let roi = Roi {
        x0: 0,
        y0: 0,
        x1: 640,
        y1: 480,
    };
    vpu.crop(&input, &mut output, &roi)?;
    Ok(())
}

/// Ratios of exactly 1/32 and 16 are legal; one step beyond either bound
/// is not.
#[test]
#[serial]
fn test_resize_ratio_bounds() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);

    let big = nv12(&driver, 4096, 4096);
    let mut tiny = nv12(&driver, 128, 128);
    vpu.resize(&big, &mut tiny, 0)?;

    let too_big = nv12(&driver, 4224, 4224);
    let err = vpu.resize(&too_big, &mut tiny, 0).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));

    let small = nv12(&driver, 128, 128);
    let mut grown = nv12(&driver, 2048, 2048);
    vpu.resize(&small, &mut grown, 0)?;

    let mut too_grown = nv12(&driver, 2176, 2176);
    let err = vpu.resize(&small, &mut too_grown, 0).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

/// Operation results must land in device-visible memory, never host.
#[test]
#[serial]
fn test_output_must_be_device_kind() -> Result<(), Box<dyn Error>> {
    let (sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 1920, 1080);
    let host_buf = DeviceBuffer::alloc(&driver, 1920 * 1088 * 3, MemoryKind::Host, 0)?;
    let mut host_out = Picture::from_buffer(host_buf, 1920, 1080, PixelFormat::Rgb888)?;

    let calls_before = sim.call_count();
    let err = vpu.convert_color(&input, &mut host_out).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    assert_eq!(sim.call_count(), calls_before);
    Ok(())
}

#[test]
#[serial]
fn test_convert_color() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let mut input = nv12(&driver, 640, 480);
    let pattern: Vec<u8> = (0..input.buffer().len()).map(|i| (i % 199) as u8).collect();
    input.buffer_mut().write_from_slice(&pattern)?;

    let mut output =
        Picture::alloc(&driver, 640, 480, PixelFormat::Rgb888, MemoryKind::Device, 0)?;
    vpu.convert_color(&input, &mut output)?;

    let produced = output.buffer().read_to_vec()?;
    assert_eq!(&produced[..pattern.len()], pattern.as_slice());
    Ok(())
}

#[test]
#[serial]
fn test_convert_dimension_mismatch() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 640, 480);
    let mut output =
        Picture::alloc(&driver, 1280, 720, PixelFormat::Rgb888, MemoryKind::Device, 0)?;
    let err = vpu.convert_color(&input, &mut output).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

#[test]
#[serial]
fn test_pad() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let input = nv12(&driver, 640, 480);
    let mut output = nv12(&driver, 704, 544);
    let border = Border {
        top: 32,
        bottom: 32,
        left: 32,
        right: 32,
        fill: 0,
    };
    vpu.pad(&input, &mut output, &border)?;

    let mut wrong = nv12(&driver, 640, 480);
    let err = vpu.pad(&input, &mut wrong, &border).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

#[test]
#[serial]
fn test_jpeg_encode_and_decode() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let mut input = nv12(&driver, 1280, 720);
    let pattern = vec![0x42u8; input.buffer().len()];
    input.buffer_mut().write_from_slice(&pattern)?;

    let mut encoded = DeviceBuffer::alloc(&driver, 1280 * 720, MemoryKind::Media, 0)?;
    let encoded_len = vpu.jpeg_encode(&input, &mut encoded)?;
    assert!(encoded_len > 0);
    assert!(encoded_len <= encoded.len());

    let mut decoded = Picture::alloc(&driver, 1280, 720, PixelFormat::Nv12, MemoryKind::Media, 0)?;
    vpu.jpeg_decode(&encoded, &mut decoded)?;
    Ok(())
}

/// The first-generation stream backend runs the same operation surface,
/// minus padding.
#[test]
#[serial]
fn test_gen1_stream_backend() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen1);
    assert_eq!(vpu.generation(), SocGeneration::Gen1);

    let input = nv12(&driver, 1920, 1080);
    let mut resized = nv12(&driver, 1280, 720);
    vpu.resize(&input, &mut resized, 0)?;

    let mut cropped = nv12(&driver, 640, 480);
    let roi = Roi {
        x0: 0,
        y0: 0,
        x1: 640,
        y1: 480,
    };
    vpu.crop(&input, &mut cropped, &roi)?;

    let mut encoded = DeviceBuffer::alloc(&driver, 1920 * 1080, MemoryKind::Media, 0)?;
    assert!(vpu.jpeg_encode(&input, &mut encoded)? > 0);

    let mut padded = nv12(&driver, 704, 544);
    let border = Border {
        top: 32,
        bottom: 32,
        left: 32,
        right: 32,
        fill: 0,
    };
    let err = vpu.pad(&nv12(&driver, 640, 480), &mut padded, &border).unwrap_err();
    assert!(matches!(err, VpuError::DriverFail(_)));
    Ok(())
}

/// Teardown leaves no channels or allocations behind.
#[test]
#[serial]
fn test_deinit_releases_everything() -> Result<(), Box<dyn Error>> {
    let (sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    {
        let input = nv12(&driver, 1920, 1080);
        let mut output = nv12(&driver, 1280, 720);
        vpu.resize(&input, &mut output, 0)?;
    }
    vpu.deinit()?;
    assert_eq!(sim.outstanding_allocs(), 0);
    Ok(())
}
