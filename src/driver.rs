// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Driver contract shared by the native FFI driver and the software
//! simulation.
//!
//! The trait covers exactly the native surface the wrapper needs: device
//! context switching, the three memory families, pooled VPC/codec channels
//! with task submission and polling (second generation), and the
//! stream-plus-descriptor family (first generation).  Everything above this
//! layer is driver-agnostic.

use std::time::Duration;

/// Chip generation reported by the runtime probe.
///
/// The generation decides which dispatch backend the wrapper constructs:
/// first-generation parts submit onto an ordered stream and block on
/// synchronization, second-generation parts acquire a channel per call and
/// poll a task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocGeneration {
    Gen1,
    Gen2,
}

/// Pixel formats accepted by the wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PixelFormat {
    Nv12 = 0,
    Nv21 = 1,
    Rgb888 = 2,
    Bgr888 = 3,
}

/// Codec selector for decode and encode channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CodecType {
    H264 = 0,
    H265 = 1,
    Jpeg = 2,
    Png = 3,
}

/// Copy direction passed to the driver memcpy primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

/// Driver-native picture description: raw buffer plus geometry.
#[derive(Debug, Clone, Copy)]
pub struct PicInfo {
    pub addr: *mut u8,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub width_stride: u32,
    pub height_stride: u32,
    pub format: PixelFormat,
}

// PicInfo only carries a pointer into driver-managed memory; the wrapper
// serializes access around every native call.
unsafe impl Send for PicInfo {}

/// One encoded access unit handed to a decode channel.
#[derive(Debug, Clone, Copy)]
pub struct StreamUnit {
    pub addr: *const u8,
    pub len: usize,
    pub pts: u64,
    pub end_of_frame: bool,
    pub end_of_stream: bool,
    pub need_display: bool,
}

unsafe impl Send for StreamUnit {}

/// A decoded frame drained from a decode channel.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub addr: *mut u8,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub width_stride: u32,
    pub height_stride: u32,
    pub format: PixelFormat,
    pub pts: u64,
    /// Non-zero when the driver failed to decode this frame.
    pub flag: u32,
}

unsafe impl Send for FrameInfo {}

/// An encoded stream chunk drained from an encode channel.
///
/// The chunk memory belongs to the driver and must be returned with
/// `enc_release_stream` after its bytes have been copied out.
#[derive(Debug, Clone, Copy)]
pub struct StreamChunk {
    pub addr: *mut u8,
    pub len: usize,
    pub pts: u64,
    pub keyframe: bool,
}

unsafe impl Send for StreamChunk {}

/// Crop/paste region in pixel coordinates, end-exclusive on x1/y1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Roi {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

/// Border specification for the padding operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Border {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    pub fill: u32,
}

/// VPC operation selector carried through both dispatch backends.
#[derive(Debug, Clone, Copy)]
pub enum VpcOp {
    Crop { roi: Roi },
    Resize { interpolation: u32 },
    ConvertColor,
    MakeBorder { border: Border },
    JpegDecode,
    PngDecode,
    JpegEncode,
}

/// Decode channel attributes.
#[derive(Debug, Clone, Copy)]
pub struct DecChnAttr {
    pub codec: CodecType,
    pub pic_width: u32,
    pub pic_height: u32,
    pub pixel_format: PixelFormat,
    pub stream_buf_size: usize,
}

/// Encode channel attributes.
#[derive(Debug, Clone, Copy)]
pub struct EncChnAttr {
    pub codec: CodecType,
    pub max_pic_width: u32,
    pub max_pic_height: u32,
    pub bitrate_kbps: u32,
    pub gop: u32,
}

/// Errors surfaced by the driver layer.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("channel id occupied")]
    Occupied,

    #[error("input buffer full")]
    BufFull,

    #[error("no buffered output available")]
    BufEmpty,

    #[error("operation timed out")]
    Timeout,

    #[error("device out of memory")]
    NoMemory,

    #[error("{0} failed with code {1}")]
    Call(&'static str, i32),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// The native surface required by the wrapper core.
///
/// `NativeDriver` forwards each method to the loaded runtime library;
/// `SimDriver` implements the same semantics in software for hosts without
/// the accelerator and for the test suite.
pub trait Driver: Send + Sync {
    fn generation(&self) -> SocGeneration;
    fn device_count(&self) -> u32;
    fn set_device(&self, device: u32) -> DriverResult<()>;
    fn sys_init(&self, device: u32) -> DriverResult<()>;
    fn sys_exit(&self, device: u32) -> DriverResult<()>;

    fn alloc_host(&self, size: usize) -> DriverResult<*mut u8>;
    fn free_host(&self, ptr: *mut u8) -> DriverResult<()>;
    fn alloc_device(&self, size: usize) -> DriverResult<*mut u8>;
    fn free_device(&self, ptr: *mut u8) -> DriverResult<()>;
    fn alloc_media(&self, device: u32, size: usize) -> DriverResult<*mut u8>;
    fn free_media(&self, ptr: *mut u8) -> DriverResult<()>;
    fn memcpy(&self, dst: *mut u8, src: *const u8, len: usize, dir: CopyDirection)
        -> DriverResult<()>;

    fn vpc_create_chn(&self, chn: u32) -> DriverResult<()>;
    fn vpc_destroy_chn(&self, chn: u32) -> DriverResult<()>;
    fn vpc_submit(&self, chn: u32, op: &VpcOp, input: &PicInfo, output: &PicInfo)
        -> DriverResult<u32>;
    fn vpc_wait(&self, chn: u32, task: u32, timeout: Duration) -> DriverResult<()>;

    fn dec_create_chn(&self, chn: u32, attr: &DecChnAttr) -> DriverResult<()>;
    fn dec_destroy_chn(&self, chn: u32) -> DriverResult<()>;
    fn dec_start_recv(&self, chn: u32) -> DriverResult<()>;
    fn dec_stop_recv(&self, chn: u32) -> DriverResult<()>;
    fn dec_send_stream(&self, chn: u32, unit: &StreamUnit, output: &PicInfo, timeout: Duration)
        -> DriverResult<()>;
    fn dec_get_frame(&self, chn: u32, timeout: Duration) -> DriverResult<FrameInfo>;
    fn dec_release_frame(&self, chn: u32, frame: &FrameInfo) -> DriverResult<()>;

    fn enc_create_chn(&self, chn: u32, attr: &EncChnAttr) -> DriverResult<()>;
    fn enc_destroy_chn(&self, chn: u32) -> DriverResult<()>;
    fn enc_start_recv(&self, chn: u32) -> DriverResult<()>;
    fn enc_stop_recv(&self, chn: u32) -> DriverResult<()>;
    fn enc_send_frame(&self, chn: u32, frame: &PicInfo, force_keyframe: bool) -> DriverResult<()>;
    fn enc_get_stream(&self, chn: u32, timeout: Duration) -> DriverResult<StreamChunk>;
    fn enc_release_stream(&self, chn: u32, chunk: &StreamChunk) -> DriverResult<()>;

    fn rt_open_channel(&self) -> DriverResult<u64>;
    fn rt_close_channel(&self, chn: u64) -> DriverResult<()>;
    fn rt_create_stream(&self) -> DriverResult<u64>;
    fn rt_destroy_stream(&self, stream: u64) -> DriverResult<()>;
    fn rt_create_pic_desc(&self, info: &PicInfo) -> DriverResult<u64>;
    fn rt_destroy_pic_desc(&self, desc: u64) -> DriverResult<()>;
    fn rt_pic_desc_len(&self, desc: u64) -> DriverResult<usize>;
    fn rt_submit(&self, chn: u64, stream: u64, op: &VpcOp, input: u64, output: u64)
        -> DriverResult<()>;
    fn rt_synchronize_stream(&self, stream: u64, timeout: Duration) -> DriverResult<()>;
}
