// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::Args;
use clap::Parser;
use edgefirst_vpu::config::{VdecConfig, WrapperConfig};
use edgefirst_vpu::driver::{CodecType, Driver, PixelFormat, Roi};
use edgefirst_vpu::memory::{DeviceBuffer, MemoryKind, Picture};
use edgefirst_vpu::native::NativeDriver;
use edgefirst_vpu::sim::SimDriver;
use edgefirst_vpu::vpu::VpuWrapper;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod args;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("EdgeFirst VPU Wrapper");

    let driver: Arc<dyn Driver> = if args.native {
        Arc::new(NativeDriver::load()?)
    } else {
        Arc::new(SimDriver::new())
    };
    println!("runtime generation: {:?}", driver.generation());

    let config = WrapperConfig {
        device: args.device,
        pool: args.pool_sizes()?,
    };
    let vpu = VpuWrapper::new(driver.clone(), config)?;

    run_image_pipeline(&driver, &vpu, &args)?;
    run_decode_session(&vpu, &args)?;

    vpu.deinit()?;
    Ok(())
}

fn run_image_pipeline(
    driver: &Arc<dyn Driver>,
    vpu: &VpuWrapper,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    let (width, height) = (args.size[0], args.size[1]);
    let device = args.device;

    let mut src = Picture::alloc(driver, width, height, PixelFormat::Nv12, MemoryKind::Media, device)?;
    let pattern: Vec<u8> = (0..src.buffer().len()).map(|i| (i % 251) as u8).collect();
    let now = Instant::now();
    src.buffer_mut().write_from_slice(&pattern)?;
    let upload_time = now.elapsed();

    let mut rgb = Picture::alloc(driver, width, height, PixelFormat::Rgb888, MemoryKind::Device, device)?;
    let now = Instant::now();
    vpu.convert_color(&src, &mut rgb)?;
    let convert_time = now.elapsed();

    let mut resized = Picture::alloc(
        driver,
        args.stream_size[0],
        args.stream_size[1],
        PixelFormat::Nv12,
        MemoryKind::Device,
        device,
    )?;
    let now = Instant::now();
    vpu.resize(&src, &mut resized, 0)?;
    let resize_time = now.elapsed();

    let mut cropped = Picture::alloc(driver, 640, 480, PixelFormat::Nv12, MemoryKind::Device, device)?;
    let roi = Roi {
        x0: 0,
        y0: 0,
        x1: 640,
        y1: 480,
    };
    let now = Instant::now();
    vpu.crop(&src, &mut cropped, &roi)?;
    let crop_time = now.elapsed();

    let mut encoded = DeviceBuffer::alloc(
        driver,
        width as usize * height as usize,
        MemoryKind::Media,
        device,
    )?;
    let now = Instant::now();
    let jpeg_len = vpu.jpeg_encode(&src, &mut encoded)?;
    let encode_time = now.elapsed();

    println!(
        "image {}x{} upload: {:?} convert: {:?} resize({}x{}): {:?} crop(640x480): {:?} jpeg: {}KB {:?}",
        width,
        height,
        upload_time,
        convert_time,
        args.stream_size[0],
        args.stream_size[1],
        resize_time,
        crop_time,
        jpeg_len / 1024,
        encode_time,
    );
    Ok(())
}

fn run_decode_session(vpu: &VpuWrapper, args: &Args) -> Result<(), Box<dyn Error>> {
    let decoded = Arc::new(AtomicUsize::new(0));
    let counter = decoded.clone();

    let config = VdecConfig {
        device: args.device,
        codec: CodecType::H264,
        width: 1280,
        height: 720,
        format: PixelFormat::Nv12,
        skip_interval: args.skip_interval,
        channel_id: None,
    };
    let mut session = vpu.init_vdec(
        config,
        Box::new(move |frame| {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(frame);
        }),
    )?;

    let now = Instant::now();
    for frame_id in 0..args.frames {
        // Synthetic access unit: enough bytes to look like a small slice.
        let unit = vec![(frame_id % 251) as u8; 4096];
        session.push(unit, frame_id as u64)?;
    }
    session.flush()?;
    let elapsed = now.elapsed();
    session.deinit()?;

    println!(
        "video decode session: pushed {} units, callback delivered {} frames in {:?}",
        args.frames,
        decoded.load(Ordering::SeqCst),
        elapsed,
    );
    Ok(())
}
