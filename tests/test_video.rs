// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_vpu::config::{PoolSizes, VdecConfig, VencConfig, WrapperConfig};
use edgefirst_vpu::driver::{CodecType, Driver, PixelFormat, SocGeneration};
use edgefirst_vpu::memory::{MemoryKind, Picture};
use edgefirst_vpu::sim::SimDriver;
use edgefirst_vpu::vpu::VpuWrapper;
use edgefirst_vpu::VpuError;
use serial_test::serial;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn make_vpu(generation: SocGeneration) -> (Arc<SimDriver>, Arc<dyn Driver>, VpuWrapper) {
    let sim = Arc::new(SimDriver::with_generation(generation));
    let driver: Arc<dyn Driver> = sim.clone();
    let config = WrapperConfig {
        device: 0,
        pool: PoolSizes::default(),
    };
    let vpu = VpuWrapper::new(driver.clone(), config).unwrap();
    (sim, driver, vpu)
}

fn vdec_config() -> VdecConfig {
    VdecConfig {
        device: 0,
        codec: CodecType::H264,
        width: 1280,
        height: 720,
        format: PixelFormat::Nv12,
        skip_interval: 0,
        channel_id: None,
    }
}

fn venc_config() -> VencConfig {
    VencConfig {
        device: 0,
        codec: CodecType::H264,
        width: 1280,
        height: 720,
        format: PixelFormat::Nv12,
        key_frame_interval: 5,
        bitrate_kbps: 4000,
        channel_id: None,
    }
}

fn wait_for(counter: &AtomicUsize, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if counter.load(Ordering::SeqCst) >= expected {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Push, flush, deinit: every pushed unit comes back through the callback
/// before the flush acknowledgment, and teardown leaves no allocation
/// behind.
#[test]
#[serial]
fn test_vdec_session_flow() -> Result<(), Box<dyn Error>> {
    let (sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);
    let decoded = Arc::new(AtomicUsize::new(0));
    let counter = decoded.clone();

    let mut session = vpu.init_vdec(
        vdec_config(),
        Box::new(move |frame| {
            assert_eq!(frame.width, 1280);
            assert_eq!(frame.height, 720);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;

    for frame_id in 0..10u64 {
        session.push(vec![0x17u8; 2048], frame_id)?;
    }
    session.flush()?;
    assert_eq!(decoded.load(Ordering::SeqCst), 10);

    session.deinit()?;
    assert_eq!(sim.outstanding_allocs(), 0);
    Ok(())
}

/// A second flush without an intervening push must be rejected — only one
/// end-of-stream marker may be sent.
#[test]
#[serial]
fn test_vdec_double_flush() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);
    let mut session = vpu.init_vdec(vdec_config(), Box::new(|_frame| {}))?;

    session.push(vec![1u8; 1024], 0)?;
    session.flush()?;
    let err = session.flush().unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));

    // Pushing re-arms the end-of-stream marker.
    session.push(vec![1u8; 1024], 1)?;
    session.flush()?;
    session.deinit()?;
    Ok(())
}

/// With a skip interval of 1 only every second frame produces output.
#[test]
#[serial]
fn test_vdec_skip_interval() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);
    let decoded = Arc::new(AtomicUsize::new(0));
    let counter = decoded.clone();

    let mut config = vdec_config();
    config.skip_interval = 1;
    let mut session = vpu.init_vdec(
        config,
        Box::new(move |_frame| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;

    for frame_id in 0..10u64 {
        session.push(vec![0x2au8; 1024], frame_id)?;
    }
    session.flush()?;
    assert_eq!(decoded.load(Ordering::SeqCst), 5);
    session.deinit()?;
    Ok(())
}

#[test]
#[serial]
fn test_vdec_dimension_bounds() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);

    let mut config = vdec_config();
    config.width = 64;
    let err = vpu.init_vdec(config, Box::new(|_frame| {})).unwrap_err();
    assert!(matches!(err, VpuError::OutOfRange(_)));

    let mut config = vdec_config();
    config.height = 16384;
    let err = vpu.init_vdec(config, Box::new(|_frame| {})).unwrap_err();
    assert!(matches!(err, VpuError::OutOfRange(_)));
    Ok(())
}

/// First-generation parts decode to semi-planar YUV only, and their
/// dimension ceiling is lower.
#[test]
#[serial]
fn test_vdec_gen1_restrictions() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen1);

    let mut config = vdec_config();
    config.format = PixelFormat::Rgb888;
    let err = vpu.init_vdec(config, Box::new(|_frame| {})).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));

    let mut config = vdec_config();
    config.width = 8192;
    let err = vpu.init_vdec(config, Box::new(|_frame| {})).unwrap_err();
    assert!(matches!(err, VpuError::OutOfRange(_)));

    // Within the first-generation limits the session runs normally.
    let mut session = vpu.init_vdec(vdec_config(), Box::new(|_frame| {}))?;
    session.push(vec![3u8; 1024], 0)?;
    session.flush()?;
    session.deinit()?;
    Ok(())
}

#[test]
#[serial]
fn test_vdec_empty_unit() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);
    let mut session = vpu.init_vdec(vdec_config(), Box::new(|_frame| {}))?;
    let err = session.push(Vec::new(), 0).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    session.deinit()?;
    Ok(())
}

/// Encoded chunks arrive on the callback as host memory with the keyframe
/// cadence of the configured interval.
#[test]
#[serial]
fn test_venc_session_flow() -> Result<(), Box<dyn Error>> {
    let (sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let count = Arc::new(AtomicUsize::new(0));
    let sink = chunks.clone();
    let counter = count.clone();

    let mut session = vpu.init_venc(
        venc_config(),
        Box::new(move |chunk| {
            sink.lock().unwrap().push((chunk.pts, chunk.keyframe, chunk.data));
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;

    for _ in 0..10 {
        let frame = Picture::alloc(&driver, 1280, 720, PixelFormat::Nv12, MemoryKind::Media, 0)?;
        session.push(frame)?;
    }
    assert!(wait_for(&count, 10), "encoded chunks did not arrive in time");
    session.deinit()?;

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 10);
    for (index, (pts, keyframe, data)) in chunks.iter().enumerate() {
        assert_eq!(*pts, index as u64);
        // Interval of 5: frames 0 and 5 are forced key frames.
        assert_eq!(*keyframe, index % 5 == 0);
        assert_eq!(&data[..4], &[0u8, 0, 0, 1][..]);
    }
    drop(chunks);
    assert_eq!(sim.outstanding_allocs(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_venc_config_validation() -> Result<(), Box<dyn Error>> {
    let (_sim, _driver, vpu) = make_vpu(SocGeneration::Gen2);

    let mut config = venc_config();
    config.key_frame_interval = 0;
    let err = vpu.init_venc(config, Box::new(|_chunk| {})).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));

    let mut config = venc_config();
    config.codec = CodecType::Jpeg;
    let err = vpu.init_venc(config, Box::new(|_chunk| {})).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

#[test]
#[serial]
fn test_venc_frame_mismatch() -> Result<(), Box<dyn Error>> {
    let (_sim, driver, vpu) = make_vpu(SocGeneration::Gen2);
    let mut session = vpu.init_venc(venc_config(), Box::new(|_chunk| {}))?;
    let frame = Picture::alloc(&driver, 640, 480, PixelFormat::Nv12, MemoryKind::Media, 0)?;
    let err = session.push(frame).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    session.deinit()?;
    Ok(())
}
