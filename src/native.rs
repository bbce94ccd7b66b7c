// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Driver implementation over the dynamically loaded VPU runtime.

use std::time::Duration;

use tracing::info;

use vpu_sys::{guess_version, vpu, vpu_version};

use crate::driver::{
    CopyDirection, DecChnAttr, Driver, DriverError, DriverResult, EncChnAttr, FrameInfo, PicInfo,
    PixelFormat, SocGeneration, StreamChunk, StreamUnit, VpcOp,
};

/// First runtime version exposing the media-processor interface.
const VPU_MPI_2_0_0: vpu_version = vpu_version {
    major: 2,
    minor: 0,
    patch: 0,
};

/// Driver over the vendor runtime library.
pub struct NativeDriver {
    lib: vpu,
    generation: SocGeneration,
    devices: u32,
}

impl NativeDriver {
    /// Loads `libvpu.so.1` and probes the runtime generation.
    ///
    /// # Errors
    ///
    /// Fails when the library cannot be loaded (usually because the
    /// accelerator driver is not installed) or when the device enumeration
    /// call fails.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let lib = unsafe { vpu::new("libvpu.so.1") }?;
        let version = unsafe { guess_version(&lib) }.unwrap_or_default();
        let generation = if version >= VPU_MPI_2_0_0 {
            SocGeneration::Gen2
        } else {
            SocGeneration::Gen1
        };
        let mut devices = 0;
        let ret = unsafe { lib.vpu_device_count(&mut devices) };
        if ret != vpu_sys::VPU_OK {
            return Err(format!("vpu_device_count failed with code {ret}").into());
        }
        info!(?version, ?generation, devices, "VPU runtime loaded");
        Ok(NativeDriver {
            lib,
            generation,
            devices,
        })
    }

    fn check(call: &'static str, ret: std::os::raw::c_int) -> DriverResult<()> {
        match ret {
            vpu_sys::VPU_OK => Ok(()),
            vpu_sys::VPU_ERR_CHN_OCCUPIED => Err(DriverError::Occupied),
            vpu_sys::VPU_ERR_BUF_FULL => Err(DriverError::BufFull),
            vpu_sys::VPU_ERR_BUF_EMPTY => Err(DriverError::BufEmpty),
            vpu_sys::VPU_ERR_TIMEOUT => Err(DriverError::Timeout),
            vpu_sys::VPU_ERR_NO_MEMORY => Err(DriverError::NoMemory),
            code => Err(DriverError::Call(call, code)),
        }
    }
}

fn millis(timeout: Duration) -> i32 {
    timeout.as_millis().min(i32::MAX as u128) as i32
}

fn format_from_u32(value: u32) -> PixelFormat {
    match value {
        1 => PixelFormat::Nv21,
        2 => PixelFormat::Rgb888,
        3 => PixelFormat::Bgr888,
        _ => PixelFormat::Nv12,
    }
}

fn pic_info_to_sys(info: &PicInfo) -> vpu_sys::vpu_pic_info {
    vpu_sys::vpu_pic_info {
        addr: info.addr,
        size: info.size as u64,
        width: info.width,
        height: info.height,
        width_stride: info.width_stride,
        height_stride: info.height_stride,
        format: info.format as u32,
    }
}

fn unit_to_sys(unit: &StreamUnit) -> vpu_sys::vpu_stream_unit {
    vpu_sys::vpu_stream_unit {
        addr: unit.addr,
        len: unit.len as u64,
        pts: unit.pts,
        end_of_frame: unit.end_of_frame as u8,
        end_of_stream: unit.end_of_stream as u8,
        need_display: unit.need_display as u8,
    }
}

fn roi_to_sys(roi: &crate::driver::Roi) -> vpu_sys::vpu_roi {
    vpu_sys::vpu_roi {
        x0: roi.x0,
        y0: roi.y0,
        x1: roi.x1,
        y1: roi.y1,
    }
}

fn border_to_sys(border: &crate::driver::Border) -> vpu_sys::vpu_border {
    vpu_sys::vpu_border {
        top: border.top,
        bottom: border.bottom,
        left: border.left,
        right: border.right,
        fill: border.fill,
    }
}

impl Driver for NativeDriver {
    fn generation(&self) -> SocGeneration {
        self.generation
    }

    fn device_count(&self) -> u32 {
        self.devices
    }

    fn set_device(&self, device: u32) -> DriverResult<()> {
        Self::check("vpu_set_device", unsafe { self.lib.vpu_set_device(device) })
    }

    fn sys_init(&self, device: u32) -> DriverResult<()> {
        Self::check("vpu_sys_init", unsafe { self.lib.vpu_sys_init(device) })
    }

    fn sys_exit(&self, device: u32) -> DriverResult<()> {
        Self::check("vpu_sys_exit", unsafe { self.lib.vpu_sys_exit(device) })
    }

    fn alloc_host(&self, size: usize) -> DriverResult<*mut u8> {
        let mut ptr = std::ptr::null_mut();
        Self::check("vpu_malloc_host", unsafe {
            self.lib.vpu_malloc_host(&mut ptr, size as u64)
        })?;
        Ok(ptr)
    }

    fn free_host(&self, ptr: *mut u8) -> DriverResult<()> {
        Self::check("vpu_free_host", unsafe { self.lib.vpu_free_host(ptr) })
    }

    fn alloc_device(&self, size: usize) -> DriverResult<*mut u8> {
        let mut ptr = std::ptr::null_mut();
        Self::check("vpu_malloc_device", unsafe {
            self.lib.vpu_malloc_device(&mut ptr, size as u64)
        })?;
        Ok(ptr)
    }

    fn free_device(&self, ptr: *mut u8) -> DriverResult<()> {
        Self::check("vpu_free_device", unsafe { self.lib.vpu_free_device(ptr) })
    }

    fn alloc_media(&self, device: u32, size: usize) -> DriverResult<*mut u8> {
        let mut ptr = std::ptr::null_mut();
        Self::check("vpu_malloc_media", unsafe {
            self.lib.vpu_malloc_media(device, &mut ptr, size as u64)
        })?;
        Ok(ptr)
    }

    fn free_media(&self, ptr: *mut u8) -> DriverResult<()> {
        Self::check("vpu_free_media", unsafe { self.lib.vpu_free_media(ptr) })
    }

    fn memcpy(
        &self,
        dst: *mut u8,
        src: *const u8,
        len: usize,
        dir: CopyDirection,
    ) -> DriverResult<()> {
        let direction = match dir {
            CopyDirection::HostToHost => vpu_sys::VPU_COPY_HOST_TO_HOST,
            CopyDirection::HostToDevice => vpu_sys::VPU_COPY_HOST_TO_DEVICE,
            CopyDirection::DeviceToHost => vpu_sys::VPU_COPY_DEVICE_TO_HOST,
            CopyDirection::DeviceToDevice => vpu_sys::VPU_COPY_DEVICE_TO_DEVICE,
        };
        Self::check("vpu_memcpy", unsafe {
            self.lib.vpu_memcpy(dst, src, len as u64, direction)
        })
    }

    fn vpc_create_chn(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_vpc_create_chn", unsafe {
            self.lib.vpu_vpc_create_chn(chn)
        })
    }

    fn vpc_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_vpc_destroy_chn", unsafe {
            self.lib.vpu_vpc_destroy_chn(chn)
        })
    }

    fn vpc_submit(
        &self,
        chn: u32,
        op: &VpcOp,
        input: &PicInfo,
        output: &PicInfo,
    ) -> DriverResult<u32> {
        let sys_in = pic_info_to_sys(input);
        let sys_out = pic_info_to_sys(output);
        let mut task = 0;
        let ret = match op {
            VpcOp::Crop { roi } => {
                let sys_roi = roi_to_sys(roi);
                unsafe {
                    self.lib
                        .vpu_vpc_crop(chn, &sys_in, &sys_out, &sys_roi, &mut task)
                }
            }
            VpcOp::Resize { interpolation } => unsafe {
                self.lib
                    .vpu_vpc_resize(chn, &sys_in, &sys_out, *interpolation, &mut task)
            },
            VpcOp::ConvertColor => unsafe {
                self.lib
                    .vpu_vpc_convert_color(chn, &sys_in, &sys_out, &mut task)
            },
            VpcOp::MakeBorder { border } => {
                let sys_border = border_to_sys(border);
                unsafe {
                    self.lib
                        .vpu_vpc_make_border(chn, &sys_in, &sys_out, &sys_border, &mut task)
                }
            }
            VpcOp::JpegDecode | VpcOp::PngDecode | VpcOp::JpegEncode => {
                return Err(DriverError::Call("vpu_vpc_submit", -1));
            }
        };
        Self::check("vpu_vpc_submit", ret)?;
        Ok(task)
    }

    fn vpc_wait(&self, chn: u32, task: u32, timeout: Duration) -> DriverResult<()> {
        Self::check("vpu_vpc_get_process_result", unsafe {
            self.lib.vpu_vpc_get_process_result(chn, task, millis(timeout))
        })
    }

    fn dec_create_chn(&self, chn: u32, attr: &DecChnAttr) -> DriverResult<()> {
        let sys_attr = vpu_sys::vpu_dec_chn_attr {
            codec: attr.codec as u32,
            pic_width: attr.pic_width,
            pic_height: attr.pic_height,
            pixel_format: attr.pixel_format as u32,
            stream_buf_size: attr.stream_buf_size as u64,
        };
        Self::check("vpu_dec_create_chn", unsafe {
            self.lib.vpu_dec_create_chn(chn, &sys_attr)
        })
    }

    fn dec_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_dec_destroy_chn", unsafe {
            self.lib.vpu_dec_destroy_chn(chn)
        })
    }

    fn dec_start_recv(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_dec_start_recv", unsafe {
            self.lib.vpu_dec_start_recv(chn)
        })
    }

    fn dec_stop_recv(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_dec_stop_recv", unsafe {
            self.lib.vpu_dec_stop_recv(chn)
        })
    }

    fn dec_send_stream(
        &self,
        chn: u32,
        unit: &StreamUnit,
        output: &PicInfo,
        timeout: Duration,
    ) -> DriverResult<()> {
        let sys_unit = unit_to_sys(unit);
        let sys_out = pic_info_to_sys(output);
        Self::check("vpu_dec_send_stream", unsafe {
            self.lib
                .vpu_dec_send_stream(chn, &sys_unit, &sys_out, millis(timeout))
        })
    }

    fn dec_get_frame(&self, chn: u32, timeout: Duration) -> DriverResult<FrameInfo> {
        let mut frame = vpu_sys::vpu_frame_info {
            addr: std::ptr::null_mut(),
            size: 0,
            width: 0,
            height: 0,
            width_stride: 0,
            height_stride: 0,
            format: 0,
            pts: 0,
            flag: 0,
        };
        Self::check("vpu_dec_get_frame", unsafe {
            self.lib.vpu_dec_get_frame(chn, &mut frame, millis(timeout))
        })?;
        Ok(FrameInfo {
            addr: frame.addr,
            size: frame.size as usize,
            width: frame.width,
            height: frame.height,
            width_stride: frame.width_stride,
            height_stride: frame.height_stride,
            format: format_from_u32(frame.format),
            pts: frame.pts,
            flag: frame.flag,
        })
    }

    fn dec_release_frame(&self, chn: u32, frame: &FrameInfo) -> DriverResult<()> {
        let sys_frame = vpu_sys::vpu_frame_info {
            addr: frame.addr,
            size: frame.size as u64,
            width: frame.width,
            height: frame.height,
            width_stride: frame.width_stride,
            height_stride: frame.height_stride,
            format: frame.format as u32,
            pts: frame.pts,
            flag: frame.flag,
        };
        Self::check("vpu_dec_release_frame", unsafe {
            self.lib.vpu_dec_release_frame(chn, &sys_frame)
        })
    }

    fn enc_create_chn(&self, chn: u32, attr: &EncChnAttr) -> DriverResult<()> {
        let sys_attr = vpu_sys::vpu_enc_chn_attr {
            codec: attr.codec as u32,
            max_pic_width: attr.max_pic_width,
            max_pic_height: attr.max_pic_height,
            bitrate_kbps: attr.bitrate_kbps,
            gop: attr.gop,
        };
        Self::check("vpu_enc_create_chn", unsafe {
            self.lib.vpu_enc_create_chn(chn, &sys_attr)
        })
    }

    fn enc_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_enc_destroy_chn", unsafe {
            self.lib.vpu_enc_destroy_chn(chn)
        })
    }

    fn enc_start_recv(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_enc_start_recv", unsafe {
            self.lib.vpu_enc_start_recv(chn)
        })
    }

    fn enc_stop_recv(&self, chn: u32) -> DriverResult<()> {
        Self::check("vpu_enc_stop_recv", unsafe {
            self.lib.vpu_enc_stop_recv(chn)
        })
    }

    fn enc_send_frame(&self, chn: u32, frame: &PicInfo, force_keyframe: bool) -> DriverResult<()> {
        let sys_frame = pic_info_to_sys(frame);
        Self::check("vpu_enc_send_frame", unsafe {
            self.lib
                .vpu_enc_send_frame(chn, &sys_frame, force_keyframe as u8)
        })
    }

    fn enc_get_stream(&self, chn: u32, timeout: Duration) -> DriverResult<StreamChunk> {
        let mut chunk = vpu_sys::vpu_enc_chunk {
            addr: std::ptr::null_mut(),
            len: 0,
            pts: 0,
            keyframe: 0,
        };
        Self::check("vpu_enc_get_stream", unsafe {
            self.lib.vpu_enc_get_stream(chn, &mut chunk, millis(timeout))
        })?;
        Ok(StreamChunk {
            addr: chunk.addr,
            len: chunk.len as usize,
            pts: chunk.pts,
            keyframe: chunk.keyframe != 0,
        })
    }

    fn enc_release_stream(&self, chn: u32, chunk: &StreamChunk) -> DriverResult<()> {
        let sys_chunk = vpu_sys::vpu_enc_chunk {
            addr: chunk.addr,
            len: chunk.len as u64,
            pts: chunk.pts,
            keyframe: chunk.keyframe as u8,
        };
        Self::check("vpu_enc_release_stream", unsafe {
            self.lib.vpu_enc_release_stream(chn, &sys_chunk)
        })
    }

    fn rt_open_channel(&self) -> DriverResult<u64> {
        let mut chn = 0;
        Self::check("vpu_rt_open_channel", unsafe {
            self.lib.vpu_rt_open_channel(&mut chn)
        })?;
        Ok(chn)
    }

    fn rt_close_channel(&self, chn: u64) -> DriverResult<()> {
        Self::check("vpu_rt_close_channel", unsafe {
            self.lib.vpu_rt_close_channel(chn)
        })
    }

    fn rt_create_stream(&self) -> DriverResult<u64> {
        let mut stream = 0;
        Self::check("vpu_rt_create_stream", unsafe {
            self.lib.vpu_rt_create_stream(&mut stream)
        })?;
        Ok(stream)
    }

    fn rt_destroy_stream(&self, stream: u64) -> DriverResult<()> {
        Self::check("vpu_rt_destroy_stream", unsafe {
            self.lib.vpu_rt_destroy_stream(stream)
        })
    }

    fn rt_create_pic_desc(&self, info: &PicInfo) -> DriverResult<u64> {
        let sys_info = pic_info_to_sys(info);
        let mut desc = 0;
        Self::check("vpu_rt_create_pic_desc", unsafe {
            self.lib.vpu_rt_create_pic_desc(&mut desc, &sys_info)
        })?;
        Ok(desc)
    }

    fn rt_destroy_pic_desc(&self, desc: u64) -> DriverResult<()> {
        Self::check("vpu_rt_destroy_pic_desc", unsafe {
            self.lib.vpu_rt_destroy_pic_desc(desc)
        })
    }

    fn rt_pic_desc_len(&self, desc: u64) -> DriverResult<usize> {
        let mut len = 0;
        Self::check("vpu_rt_pic_desc_len", unsafe {
            self.lib.vpu_rt_pic_desc_len(desc, &mut len)
        })?;
        Ok(len as usize)
    }

    fn rt_submit(
        &self,
        chn: u64,
        stream: u64,
        op: &VpcOp,
        input: u64,
        output: u64,
    ) -> DriverResult<()> {
        let mut sys_roi = None;
        let op_code = match op {
            VpcOp::Crop { roi } => {
                sys_roi = Some(roi_to_sys(roi));
                vpu_sys::VPU_RT_OP_CROP
            }
            VpcOp::Resize { .. } => vpu_sys::VPU_RT_OP_RESIZE,
            VpcOp::ConvertColor => vpu_sys::VPU_RT_OP_CONVERT_COLOR,
            VpcOp::JpegDecode => vpu_sys::VPU_RT_OP_JPEG_DECODE,
            VpcOp::PngDecode => vpu_sys::VPU_RT_OP_PNG_DECODE,
            VpcOp::JpegEncode => vpu_sys::VPU_RT_OP_JPEG_ENCODE,
            // The first-generation runtime has no border primitive.
            VpcOp::MakeBorder { .. } => return Err(DriverError::Call("vpu_rt_submit", -1)),
        };
        let roi_ptr = sys_roi
            .as_ref()
            .map(|roi| roi as *const vpu_sys::vpu_roi)
            .unwrap_or(std::ptr::null());
        Self::check("vpu_rt_submit", unsafe {
            self.lib
                .vpu_rt_submit(chn, stream, op_code, input, output, roi_ptr, std::ptr::null())
        })
    }

    fn rt_synchronize_stream(&self, stream: u64, timeout: Duration) -> DriverResult<()> {
        Self::check("vpu_rt_synchronize_stream", unsafe {
            self.lib.vpu_rt_synchronize_stream(stream, millis(timeout))
        })
    }
}
