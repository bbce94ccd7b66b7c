// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software implementation of the driver contract.
//!
//! Used on hosts without the accelerator and by the test suite.  Memory
//! behaviour is real (allocations come from the C allocator, copies move
//! actual bytes); codec behaviour is deterministic filler output, not
//! correct imagery.  Every entry point bumps a call counter so tests can
//! assert that rejected parameters never reached the driver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::driver::{
    CopyDirection, DecChnAttr, Driver, DriverError, DriverResult, EncChnAttr, FrameInfo, PicInfo,
    SocGeneration, StreamChunk, StreamUnit, VpcOp,
};

const ENC_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocKind {
    Host,
    Device,
    Media,
}

struct DecChn {
    attr: DecChnAttr,
    started: bool,
    frames: VecDeque<FrameInfo>,
}

struct EncChn {
    attr: EncChnAttr,
    started: bool,
    chunks: VecDeque<StreamChunk>,
    frame_index: u64,
}

#[derive(Default)]
struct SimState {
    current_device: u32,
    sys_inited: HashSet<u32>,
    allocs: HashMap<usize, AllocKind>,
    vpc_chns: HashSet<u32>,
    vpc_tasks: HashSet<(u32, u32)>,
    next_task: u32,
    dec_chns: HashMap<u32, DecChn>,
    enc_chns: HashMap<u32, EncChn>,
    rt_channels: HashSet<u64>,
    rt_streams: HashSet<u64>,
    rt_descs: HashMap<u64, PicInfo>,
    next_rt_id: u64,
}

/// In-process software VPU.
pub struct SimDriver {
    generation: SocGeneration,
    devices: u32,
    calls: AtomicU64,
    state: Mutex<SimState>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::with_generation(SocGeneration::Gen2)
    }

    pub fn with_generation(generation: SocGeneration) -> Self {
        SimDriver {
            generation,
            devices: 2,
            calls: AtomicU64::new(0),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Number of driver entry points invoked since construction.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live allocations across all memory kinds.
    pub fn outstanding_allocs(&self) -> usize {
        self.state.lock().unwrap().allocs.len()
    }

    fn enter(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap()
    }

    fn alloc(&self, kind: AllocKind, size: usize) -> DriverResult<*mut u8> {
        let mut state = self.enter();
        let ptr = unsafe { libc::malloc(size) } as *mut u8;
        if ptr.is_null() {
            return Err(DriverError::NoMemory);
        }
        state.allocs.insert(ptr as usize, kind);
        Ok(ptr)
    }

    fn free(&self, kind: AllocKind, ptr: *mut u8) -> DriverResult<()> {
        let mut state = self.enter();
        match state.allocs.get(&(ptr as usize)) {
            Some(k) if *k == kind => {
                state.allocs.remove(&(ptr as usize));
                unsafe { libc::free(ptr as *mut libc::c_void) };
                Ok(())
            }
            _ => Err(DriverError::Call("vpu_free", -1)),
        }
    }

    fn free_locked(state: &mut SimState, ptr: *mut u8) {
        if state.allocs.remove(&(ptr as usize)).is_some() {
            unsafe { libc::free(ptr as *mut libc::c_void) };
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        SimDriver::new()
    }
}

/// Copies input bytes into the output buffer and zero-fills the remainder.
/// Encode operations return the synthetic payload length instead.
fn execute_op(op: &VpcOp, input: &PicInfo, output: &PicInfo) -> usize {
    let copied = input.size.min(output.size);
    unsafe {
        std::ptr::copy_nonoverlapping(input.addr as *const u8, output.addr, copied);
        if output.size > copied {
            std::ptr::write_bytes(output.addr.add(copied), 0, output.size - copied);
        }
    }
    match op {
        VpcOp::JpegEncode => {
            let payload = (input.size / 8 + 64).min(output.size);
            unsafe {
                if payload >= 2 {
                    *output.addr = 0xff;
                    *output.addr.add(1) = 0xd8;
                }
            }
            payload
        }
        _ => output.size,
    }
}

impl Driver for SimDriver {
    fn generation(&self) -> SocGeneration {
        self.generation
    }

    fn device_count(&self) -> u32 {
        self.devices
    }

    fn set_device(&self, device: u32) -> DriverResult<()> {
        let mut state = self.enter();
        if device >= self.devices {
            return Err(DriverError::Call("vpu_set_device", -1));
        }
        state.current_device = device;
        Ok(())
    }

    fn sys_init(&self, device: u32) -> DriverResult<()> {
        let mut state = self.enter();
        state.sys_inited.insert(device);
        Ok(())
    }

    fn sys_exit(&self, device: u32) -> DriverResult<()> {
        let mut state = self.enter();
        state.sys_inited.remove(&device);
        Ok(())
    }

    fn alloc_host(&self, size: usize) -> DriverResult<*mut u8> {
        self.alloc(AllocKind::Host, size)
    }

    fn free_host(&self, ptr: *mut u8) -> DriverResult<()> {
        self.free(AllocKind::Host, ptr)
    }

    fn alloc_device(&self, size: usize) -> DriverResult<*mut u8> {
        self.alloc(AllocKind::Device, size)
    }

    fn free_device(&self, ptr: *mut u8) -> DriverResult<()> {
        self.free(AllocKind::Device, ptr)
    }

    fn alloc_media(&self, _device: u32, size: usize) -> DriverResult<*mut u8> {
        self.alloc(AllocKind::Media, size)
    }

    fn free_media(&self, ptr: *mut u8) -> DriverResult<()> {
        self.free(AllocKind::Media, ptr)
    }

    fn memcpy(
        &self,
        dst: *mut u8,
        src: *const u8,
        len: usize,
        _dir: CopyDirection,
    ) -> DriverResult<()> {
        let _state = self.enter();
        if dst.is_null() || src.is_null() {
            return Err(DriverError::Call("vpu_memcpy", -1));
        }
        unsafe { std::ptr::copy_nonoverlapping(src, dst, len) };
        Ok(())
    }

    fn vpc_create_chn(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.vpc_chns.insert(chn) {
            return Err(DriverError::Occupied);
        }
        debug!(chn, "sim vpc channel created");
        Ok(())
    }

    fn vpc_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.vpc_chns.remove(&chn) {
            return Err(DriverError::Call("vpu_vpc_destroy_chn", -1));
        }
        Ok(())
    }

    fn vpc_submit(
        &self,
        chn: u32,
        op: &VpcOp,
        input: &PicInfo,
        output: &PicInfo,
    ) -> DriverResult<u32> {
        let mut state = self.enter();
        if !state.vpc_chns.contains(&chn) {
            return Err(DriverError::Call("vpu_vpc_submit", -1));
        }
        execute_op(op, input, output);
        state.next_task = state.next_task.wrapping_add(1);
        let task = state.next_task;
        state.vpc_tasks.insert((chn, task));
        Ok(task)
    }

    fn vpc_wait(&self, chn: u32, task: u32, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.vpc_tasks.remove(&(chn, task)) {
            return Err(DriverError::Call("vpu_vpc_get_process_result", -1));
        }
        Ok(())
    }

    fn dec_create_chn(&self, chn: u32, attr: &DecChnAttr) -> DriverResult<()> {
        let mut state = self.enter();
        if state.dec_chns.contains_key(&chn) {
            return Err(DriverError::Occupied);
        }
        state.dec_chns.insert(
            chn,
            DecChn {
                attr: *attr,
                started: false,
                frames: VecDeque::new(),
            },
        );
        Ok(())
    }

    fn dec_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        if state.dec_chns.remove(&chn).is_none() {
            return Err(DriverError::Call("vpu_dec_destroy_chn", -1));
        }
        Ok(())
    }

    fn dec_start_recv(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        match state.dec_chns.get_mut(&chn) {
            Some(dec) => {
                dec.started = true;
                Ok(())
            }
            None => Err(DriverError::Call("vpu_dec_start_recv", -1)),
        }
    }

    fn dec_stop_recv(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        match state.dec_chns.get_mut(&chn) {
            Some(dec) => {
                dec.started = false;
                Ok(())
            }
            None => Err(DriverError::Call("vpu_dec_stop_recv", -1)),
        }
    }

    fn dec_send_stream(
        &self,
        chn: u32,
        unit: &StreamUnit,
        output: &PicInfo,
        _timeout: Duration,
    ) -> DriverResult<()> {
        let mut state = self.enter();
        let dec = state
            .dec_chns
            .get_mut(&chn)
            .ok_or(DriverError::Call("vpu_dec_send_stream", -1))?;
        if !dec.started {
            return Err(DriverError::Call("vpu_dec_send_stream", -1));
        }
        if unit.len > dec.attr.stream_buf_size {
            return Err(DriverError::Call("vpu_dec_send_stream", -2));
        }
        if unit.end_of_stream {
            return Ok(());
        }
        if !unit.need_display || output.addr.is_null() {
            // Decoded but not handed out; nothing is queued.
            return Ok(());
        }
        unsafe { std::ptr::write_bytes(output.addr, (unit.pts & 0xff) as u8, output.size) };
        dec.frames.push_back(FrameInfo {
            addr: output.addr,
            size: output.size,
            width: output.width,
            height: output.height,
            width_stride: output.width_stride,
            height_stride: output.height_stride,
            format: output.format,
            pts: unit.pts,
            flag: 0,
        });
        Ok(())
    }

    fn dec_get_frame(&self, chn: u32, _timeout: Duration) -> DriverResult<FrameInfo> {
        let mut state = self.enter();
        let dec = state
            .dec_chns
            .get_mut(&chn)
            .ok_or(DriverError::Call("vpu_dec_get_frame", -1))?;
        dec.frames.pop_front().ok_or(DriverError::BufEmpty)
    }

    fn dec_release_frame(&self, _chn: u32, _frame: &FrameInfo) -> DriverResult<()> {
        let _state = self.enter();
        Ok(())
    }

    fn enc_create_chn(&self, chn: u32, attr: &EncChnAttr) -> DriverResult<()> {
        let mut state = self.enter();
        if state.enc_chns.contains_key(&chn) {
            return Err(DriverError::Occupied);
        }
        state.enc_chns.insert(
            chn,
            EncChn {
                attr: *attr,
                started: false,
                chunks: VecDeque::new(),
                frame_index: 0,
            },
        );
        Ok(())
    }

    fn enc_destroy_chn(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        let enc = state
            .enc_chns
            .remove(&chn)
            .ok_or(DriverError::Call("vpu_enc_destroy_chn", -1))?;
        // Unclaimed chunks go back to the allocator with the channel.
        for chunk in enc.chunks {
            Self::free_locked(&mut state, chunk.addr);
        }
        Ok(())
    }

    fn enc_start_recv(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        match state.enc_chns.get_mut(&chn) {
            Some(enc) => {
                enc.started = true;
                Ok(())
            }
            None => Err(DriverError::Call("vpu_enc_start_recv", -1)),
        }
    }

    fn enc_stop_recv(&self, chn: u32) -> DriverResult<()> {
        let mut state = self.enter();
        match state.enc_chns.get_mut(&chn) {
            Some(enc) => {
                enc.started = false;
                Ok(())
            }
            None => Err(DriverError::Call("vpu_enc_stop_recv", -1)),
        }
    }

    fn enc_send_frame(&self, chn: u32, frame: &PicInfo, force_keyframe: bool) -> DriverResult<()> {
        let mut state = self.enter();
        let enc = state
            .enc_chns
            .get_mut(&chn)
            .ok_or(DriverError::Call("vpu_enc_send_frame", -1))?;
        if !enc.started {
            return Err(DriverError::Call("vpu_enc_send_frame", -1));
        }
        let gop = enc.attr.gop.max(1) as u64;
        let keyframe = force_keyframe || enc.frame_index % gop == 0;
        let pts = enc.frame_index;
        enc.frame_index += 1;
        let payload = frame.size.min(64);
        let len = ENC_HEADER_LEN + payload;

        let ptr = unsafe { libc::malloc(len) } as *mut u8;
        if ptr.is_null() {
            return Err(DriverError::NoMemory);
        }
        unsafe {
            let header = [0u8, 0, 0, 1, keyframe as u8, 0, 0, (pts & 0xff) as u8];
            std::ptr::copy_nonoverlapping(header.as_ptr(), ptr, ENC_HEADER_LEN);
            std::ptr::copy_nonoverlapping(
                frame.addr as *const u8,
                ptr.add(ENC_HEADER_LEN),
                payload,
            );
        }
        state.allocs.insert(ptr as usize, AllocKind::Device);
        let enc = state.enc_chns.get_mut(&chn).unwrap();
        enc.chunks.push_back(StreamChunk {
            addr: ptr,
            len,
            pts,
            keyframe,
        });
        Ok(())
    }

    fn enc_get_stream(&self, chn: u32, _timeout: Duration) -> DriverResult<StreamChunk> {
        let mut state = self.enter();
        let enc = state
            .enc_chns
            .get_mut(&chn)
            .ok_or(DriverError::Call("vpu_enc_get_stream", -1))?;
        enc.chunks.pop_front().ok_or(DriverError::Timeout)
    }

    fn enc_release_stream(&self, _chn: u32, chunk: &StreamChunk) -> DriverResult<()> {
        let mut state = self.enter();
        Self::free_locked(&mut state, chunk.addr);
        Ok(())
    }

    fn rt_open_channel(&self) -> DriverResult<u64> {
        let mut state = self.enter();
        state.next_rt_id += 1;
        let id = state.next_rt_id;
        state.rt_channels.insert(id);
        Ok(id)
    }

    fn rt_close_channel(&self, chn: u64) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.rt_channels.remove(&chn) {
            return Err(DriverError::Call("vpu_rt_close_channel", -1));
        }
        Ok(())
    }

    fn rt_create_stream(&self) -> DriverResult<u64> {
        let mut state = self.enter();
        state.next_rt_id += 1;
        let id = state.next_rt_id;
        state.rt_streams.insert(id);
        Ok(id)
    }

    fn rt_destroy_stream(&self, stream: u64) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.rt_streams.remove(&stream) {
            return Err(DriverError::Call("vpu_rt_destroy_stream", -1));
        }
        Ok(())
    }

    fn rt_create_pic_desc(&self, info: &PicInfo) -> DriverResult<u64> {
        let mut state = self.enter();
        state.next_rt_id += 1;
        let id = state.next_rt_id;
        state.rt_descs.insert(id, *info);
        Ok(id)
    }

    fn rt_destroy_pic_desc(&self, desc: u64) -> DriverResult<()> {
        let mut state = self.enter();
        if state.rt_descs.remove(&desc).is_none() {
            return Err(DriverError::Call("vpu_rt_destroy_pic_desc", -1));
        }
        Ok(())
    }

    fn rt_pic_desc_len(&self, desc: u64) -> DriverResult<usize> {
        let state = self.enter();
        state
            .rt_descs
            .get(&desc)
            .map(|info| info.size)
            .ok_or(DriverError::Call("vpu_rt_pic_desc_len", -1))
    }

    fn rt_submit(
        &self,
        chn: u64,
        stream: u64,
        op: &VpcOp,
        input: u64,
        output: u64,
    ) -> DriverResult<()> {
        let mut state = self.enter();
        if !state.rt_channels.contains(&chn) || !state.rt_streams.contains(&stream) {
            return Err(DriverError::Call("vpu_rt_submit", -1));
        }
        let in_info = *state
            .rt_descs
            .get(&input)
            .ok_or(DriverError::Call("vpu_rt_submit", -1))?;
        let out_info = *state
            .rt_descs
            .get(&output)
            .ok_or(DriverError::Call("vpu_rt_submit", -1))?;
        let produced = execute_op(op, &in_info, &out_info);
        if let Some(entry) = state.rt_descs.get_mut(&output) {
            entry.size = produced;
        }
        Ok(())
    }

    fn rt_synchronize_stream(&self, stream: u64, _timeout: Duration) -> DriverResult<()> {
        let state = self.enter();
        if !state.rt_streams.contains(&stream) {
            return Err(DriverError::Call("vpu_rt_synchronize_stream", -1));
        }
        Ok(())
    }
}
