// SPDX-License-Identifier: AGPL-3.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Raw FFI bindings for the VPU Runtime Library (`libvpu.so.1`).
//!
//! The runtime library is loaded dynamically at startup so the crate can be
//! built and run on hosts without the accelerator installed.  Structure and
//! constant definitions follow `vpu_runtime.h` from the vendor BSP; two API
//! families are exported by the same library:
//!
//! - `vpu_rt_*`: the first-generation runtime (per-client channel plus an
//!   ordered submission stream).
//! - `vpu_vpc_*` / `vpu_dec_*` / `vpu_enc_*`: the second-generation
//!   media-processor interface (per-call channels identified by integer id).

#![allow(non_camel_case_types)]

use std::ffi::OsStr;
use std::os::raw::c_int;

pub const VPU_OK: c_int = 0;
pub const VPU_ERR_CHN_OCCUPIED: c_int = -2;
pub const VPU_ERR_BUF_FULL: c_int = -3;
pub const VPU_ERR_BUF_EMPTY: c_int = -4;
pub const VPU_ERR_TIMEOUT: c_int = -5;
pub const VPU_ERR_NO_MEMORY: c_int = -6;

pub const VPU_COPY_HOST_TO_HOST: u32 = 0;
pub const VPU_COPY_HOST_TO_DEVICE: u32 = 1;
pub const VPU_COPY_DEVICE_TO_HOST: u32 = 2;
pub const VPU_COPY_DEVICE_TO_DEVICE: u32 = 3;

pub const VPU_RT_OP_CROP: u32 = 0;
pub const VPU_RT_OP_RESIZE: u32 = 1;
pub const VPU_RT_OP_CONVERT_COLOR: u32 = 2;
pub const VPU_RT_OP_JPEG_DECODE: u32 = 3;
pub const VPU_RT_OP_PNG_DECODE: u32 = 4;
pub const VPU_RT_OP_JPEG_ENCODE: u32 = 5;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct vpu_version {
    pub major: c_int,
    pub minor: c_int,
    pub patch: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_pic_info {
    pub addr: *mut u8,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub width_stride: u32,
    pub height_stride: u32,
    pub format: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_stream_unit {
    pub addr: *const u8,
    pub len: u64,
    pub pts: u64,
    pub end_of_frame: u8,
    pub end_of_stream: u8,
    pub need_display: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_frame_info {
    pub addr: *mut u8,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub width_stride: u32,
    pub height_stride: u32,
    pub format: u32,
    pub pts: u64,
    pub flag: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_enc_chunk {
    pub addr: *mut u8,
    pub len: u64,
    pub pts: u64,
    pub keyframe: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_dec_chn_attr {
    pub codec: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    pub pixel_format: u32,
    pub stream_buf_size: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_enc_chn_attr {
    pub codec: u32,
    pub max_pic_width: u32,
    pub max_pic_height: u32,
    pub bitrate_kbps: u32,
    pub gop: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_roi {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vpu_border {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    pub fill: u32,
}

macro_rules! vpu_library {
    ($(fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        /// Symbol table of the VPU runtime library.
        ///
        /// Every function pointer is resolved once at load time; the library
        /// handle is kept alive for as long as the table exists.
        pub struct vpu {
            _lib: ::libloading::Library,
            $($name: unsafe extern "C" fn($($ty),*) -> $ret,)*
        }

        impl vpu {
            /// Loads the runtime library and resolves the full symbol table.
            ///
            /// # Safety
            ///
            /// Loading a shared library executes its initializers.  The
            /// caller must ensure `path` names a genuine VPU runtime.
            pub unsafe fn new<P: AsRef<OsStr>>(path: P) -> Result<Self, ::libloading::Error> {
                let lib = ::libloading::Library::new(path)?;
                $(let $name = *lib.get(stringify!($name).as_bytes())?;)*
                Ok(Self { _lib: lib, $($name,)* })
            }

            $(
                /// # Safety
                ///
                /// Direct call into the vendor runtime; all pointer
                /// arguments must satisfy the `vpu_runtime.h` contract.
                pub unsafe fn $name(&self, $($arg: $ty),*) -> $ret {
                    (self.$name)($($arg),*)
                }
            )*
        }
    };
}

vpu_library! {
    fn vpu_runtime_version(version: *mut vpu_version) -> c_int;
    fn vpu_device_count(count: *mut u32) -> c_int;
    fn vpu_set_device(device: u32) -> c_int;
    fn vpu_sys_init(device: u32) -> c_int;
    fn vpu_sys_exit(device: u32) -> c_int;

    fn vpu_malloc_host(ptr: *mut *mut u8, size: u64) -> c_int;
    fn vpu_free_host(ptr: *mut u8) -> c_int;
    fn vpu_malloc_device(ptr: *mut *mut u8, size: u64) -> c_int;
    fn vpu_free_device(ptr: *mut u8) -> c_int;
    fn vpu_malloc_media(device: u32, ptr: *mut *mut u8, size: u64) -> c_int;
    fn vpu_free_media(ptr: *mut u8) -> c_int;
    fn vpu_memcpy(dst: *mut u8, src: *const u8, len: u64, direction: u32) -> c_int;

    fn vpu_vpc_create_chn(chn: u32) -> c_int;
    fn vpu_vpc_destroy_chn(chn: u32) -> c_int;
    fn vpu_vpc_crop(chn: u32, input: *const vpu_pic_info, output: *const vpu_pic_info,
                    roi: *const vpu_roi, task: *mut u32) -> c_int;
    fn vpu_vpc_resize(chn: u32, input: *const vpu_pic_info, output: *const vpu_pic_info,
                      interpolation: u32, task: *mut u32) -> c_int;
    fn vpu_vpc_convert_color(chn: u32, input: *const vpu_pic_info, output: *const vpu_pic_info,
                             task: *mut u32) -> c_int;
    fn vpu_vpc_make_border(chn: u32, input: *const vpu_pic_info, output: *const vpu_pic_info,
                           border: *const vpu_border, task: *mut u32) -> c_int;
    fn vpu_vpc_get_process_result(chn: u32, task: u32, timeout_ms: i32) -> c_int;

    fn vpu_dec_create_chn(chn: u32, attr: *const vpu_dec_chn_attr) -> c_int;
    fn vpu_dec_destroy_chn(chn: u32) -> c_int;
    fn vpu_dec_start_recv(chn: u32) -> c_int;
    fn vpu_dec_stop_recv(chn: u32) -> c_int;
    fn vpu_dec_send_stream(chn: u32, unit: *const vpu_stream_unit, output: *const vpu_pic_info,
                           timeout_ms: i32) -> c_int;
    fn vpu_dec_get_frame(chn: u32, frame: *mut vpu_frame_info, timeout_ms: i32) -> c_int;
    fn vpu_dec_release_frame(chn: u32, frame: *const vpu_frame_info) -> c_int;

    fn vpu_enc_create_chn(chn: u32, attr: *const vpu_enc_chn_attr) -> c_int;
    fn vpu_enc_destroy_chn(chn: u32) -> c_int;
    fn vpu_enc_start_recv(chn: u32) -> c_int;
    fn vpu_enc_stop_recv(chn: u32) -> c_int;
    fn vpu_enc_send_frame(chn: u32, frame: *const vpu_pic_info, force_keyframe: u8) -> c_int;
    fn vpu_enc_get_stream(chn: u32, chunk: *mut vpu_enc_chunk, timeout_ms: i32) -> c_int;
    fn vpu_enc_release_stream(chn: u32, chunk: *const vpu_enc_chunk) -> c_int;

    fn vpu_rt_open_channel(chn: *mut u64) -> c_int;
    fn vpu_rt_close_channel(chn: u64) -> c_int;
    fn vpu_rt_create_stream(stream: *mut u64) -> c_int;
    fn vpu_rt_destroy_stream(stream: u64) -> c_int;
    fn vpu_rt_create_pic_desc(desc: *mut u64, info: *const vpu_pic_info) -> c_int;
    fn vpu_rt_destroy_pic_desc(desc: u64) -> c_int;
    fn vpu_rt_pic_desc_len(desc: u64, len: *mut u64) -> c_int;
    fn vpu_rt_submit(chn: u64, stream: u64, op: u32, input: u64, output: u64,
                     roi: *const vpu_roi, border: *const vpu_border) -> c_int;
    fn vpu_rt_synchronize_stream(stream: u64, timeout_ms: i32) -> c_int;
}

/// Queries the runtime version, used to tell the driver generations apart.
///
/// # Safety
///
/// `lib` must be a successfully loaded runtime table.
pub unsafe fn guess_version(lib: &vpu) -> Option<vpu_version> {
    let mut version = vpu_version::default();
    if lib.vpu_runtime_version(&mut version) != VPU_OK {
        return None;
    }
    Some(version)
}
