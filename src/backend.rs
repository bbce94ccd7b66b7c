// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The two dispatch back ends behind the wrapper facade.
//!
//! `StreamBackend` (first generation) owns one long-lived channel and an
//! ordered submission stream; every operation submits asynchronously and
//! blocks on stream synchronization.  `PoolBackend` (second generation)
//! owns nothing: each call borrows a channel from the process pool, submits
//! a task, polls for its completion and returns the channel — on failure
//! paths included.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::driver::{Driver, DriverError, PicInfo, StreamUnit, VpcOp};
use crate::error::{Result, VpuError};
use crate::pool::{ChannelHandle, ChannelKind, ChannelPool};

/// Bound on task-result polling and decode-frame retrieval.
const TASK_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on stream synchronization.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatch variant, fixed at wrapper construction from the generation
/// probe.
pub(crate) enum Backend {
    Stream(StreamBackend),
    Pool(PoolBackend),
}

impl Backend {
    /// Runs one validated operation and returns the produced byte count.
    pub(crate) fn execute(&self, op: &VpcOp, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        match self {
            Backend::Stream(backend) => backend.execute(op, input, output),
            Backend::Pool(backend) => backend.execute(op, input, output),
        }
    }

    pub(crate) fn deinit(&self) -> Result<()> {
        match self {
            Backend::Stream(backend) => backend.deinit(),
            Backend::Pool(_) => Ok(()),
        }
    }
}

/// Destroys a native picture descriptor when the operation leaves scope,
/// success and failure paths alike.
struct DescGuard<'a> {
    driver: &'a Arc<dyn Driver>,
    id: u64,
}

impl<'a> DescGuard<'a> {
    fn new(driver: &'a Arc<dyn Driver>, info: &PicInfo) -> Result<Self> {
        let id = driver.rt_create_pic_desc(info)?;
        Ok(DescGuard { driver, id })
    }
}

impl Drop for DescGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.driver.rt_destroy_pic_desc(self.id) {
            warn!(desc = self.id, %err, "picture descriptor destroy failed");
        }
    }
}

/// Returns a pooled channel on drop; a failing return is logged and never
/// overrides the operation result.
struct PooledChannel<'a> {
    pool: &'a ChannelPool,
    handle: Option<ChannelHandle>,
}

impl<'a> PooledChannel<'a> {
    fn get(pool: &'a ChannelPool, device: u32, kind: ChannelKind) -> Result<Self> {
        let handle = pool.get_chn(device, kind)?;
        Ok(PooledChannel {
            pool,
            handle: Some(handle),
        })
    }

    fn id(&self) -> u32 {
        self.handle.map(|handle| handle.id).unwrap_or(0)
    }
}

impl Drop for PooledChannel<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.pool.put_chn(handle.device, handle) {
                error!(?handle, %err, "channel return to pool failed");
            }
        }
    }
}

/// First-generation back end: one channel, one ordered stream.
pub(crate) struct StreamBackend {
    driver: Arc<dyn Driver>,
    device: u32,
    chn: u64,
    stream: u64,
    submit_lock: Mutex<()>,
}

impl StreamBackend {
    pub(crate) fn new(driver: Arc<dyn Driver>, device: u32) -> Result<Self> {
        driver
            .set_device(device)
            .map_err(|err| VpuError::InitFail(format!("device context switch: {err}")))?;
        let chn = driver
            .rt_open_channel()
            .map_err(|err| VpuError::InitFail(format!("runtime channel: {err}")))?;
        let stream = match driver.rt_create_stream() {
            Ok(stream) => stream,
            Err(err) => {
                if let Err(cerr) = driver.rt_close_channel(chn) {
                    warn!(%cerr, "runtime channel close failed during rollback");
                }
                return Err(VpuError::InitFail(format!("submission stream: {err}")));
            }
        };
        debug!(device, chn, stream, "stream backend ready");
        Ok(StreamBackend {
            driver,
            device,
            chn,
            stream,
            submit_lock: Mutex::new(()),
        })
    }

    fn execute(&self, op: &VpcOp, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        if matches!(op, VpcOp::MakeBorder { .. }) {
            error!("padding is not supported on first-generation parts");
            return Err(VpuError::DriverFail(DriverError::Call(
                "vpu_rt_submit",
                -1,
            )));
        }
        self.driver.set_device(self.device)?;
        let in_desc = DescGuard::new(&self.driver, input)?;
        let out_desc = DescGuard::new(&self.driver, output)?;
        {
            let _order = self.submit_lock.lock().unwrap();
            self.driver
                .rt_submit(self.chn, self.stream, op, in_desc.id, out_desc.id)?;
            self.driver
                .rt_synchronize_stream(self.stream, SYNC_TIMEOUT)?;
        }
        let produced = self.driver.rt_pic_desc_len(out_desc.id)?;
        Ok(produced)
    }

    fn deinit(&self) -> Result<()> {
        let mut last_err = None;
        if let Err(err) = self.driver.set_device(self.device) {
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self
            .driver
            .rt_synchronize_stream(self.stream, SYNC_TIMEOUT)
        {
            warn!(%err, "stream synchronize during teardown failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.rt_destroy_stream(self.stream) {
            error!(%err, "stream destroy failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.rt_close_channel(self.chn) {
            error!(%err, "runtime channel close failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Second-generation back end: acquire, submit, poll, release.
pub(crate) struct PoolBackend {
    driver: Arc<dyn Driver>,
    pool: Arc<ChannelPool>,
    device: u32,
}

impl PoolBackend {
    pub(crate) fn new(driver: Arc<dyn Driver>, pool: Arc<ChannelPool>, device: u32) -> Self {
        PoolBackend {
            driver,
            pool,
            device,
        }
    }

    fn execute(&self, op: &VpcOp, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        match op {
            VpcOp::Crop { .. }
            | VpcOp::Resize { .. }
            | VpcOp::ConvertColor
            | VpcOp::MakeBorder { .. } => self.execute_vpc(op, input, output),
            VpcOp::JpegDecode => self.execute_decode(ChannelKind::JpegDec, input, output),
            VpcOp::PngDecode => self.execute_decode(ChannelKind::PngDec, input, output),
            VpcOp::JpegEncode => self.execute_encode(input, output),
        }
    }

    fn execute_vpc(&self, op: &VpcOp, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        self.driver.set_device(self.device)?;
        let chn = PooledChannel::get(&self.pool, self.device, ChannelKind::Vpc)?;
        let task = self.driver.vpc_submit(chn.id(), op, input, output)?;
        self.driver.vpc_wait(chn.id(), task, TASK_TIMEOUT)?;
        Ok(output.size)
    }

    fn execute_decode(&self, kind: ChannelKind, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        self.driver.set_device(self.device)?;
        let chn = PooledChannel::get(&self.pool, self.device, kind)?;
        self.driver.dec_start_recv(chn.id())?;
        let result = self.run_decode(chn.id(), input, output);
        if let Err(err) = self.driver.dec_stop_recv(chn.id()) {
            warn!(chn = chn.id(), %err, "decode channel stop failed");
        }
        result
    }

    fn run_decode(&self, chn: u32, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        let unit = StreamUnit {
            addr: input.addr,
            len: input.size,
            pts: 0,
            end_of_frame: true,
            end_of_stream: false,
            need_display: true,
        };
        self.driver
            .dec_send_stream(chn, &unit, output, TASK_TIMEOUT)?;
        let frame = self.driver.dec_get_frame(chn, TASK_TIMEOUT)?;
        let decode_flag = frame.flag;
        let size = frame.size;
        if let Err(err) = self.driver.dec_release_frame(chn, &frame) {
            warn!(chn, %err, "decoded frame release failed");
        }
        if decode_flag != 0 {
            return Err(VpuError::DriverFail(DriverError::Call(
                "vpu_dec_get_frame",
                decode_flag as i32,
            )));
        }
        Ok(size)
    }

    fn execute_encode(&self, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        self.driver.set_device(self.device)?;
        let chn = PooledChannel::get(&self.pool, self.device, ChannelKind::JpegEnc)?;
        self.driver.enc_start_recv(chn.id())?;
        let result = self.run_encode(chn.id(), input, output);
        if let Err(err) = self.driver.enc_stop_recv(chn.id()) {
            warn!(chn = chn.id(), %err, "encode channel stop failed");
        }
        result
    }

    fn run_encode(&self, chn: u32, input: &PicInfo, output: &PicInfo) -> Result<usize> {
        self.driver.enc_send_frame(chn, input, true)?;
        let chunk = self.driver.enc_get_stream(chn, TASK_TIMEOUT)?;
        let result = if chunk.len > output.size {
            Err(VpuError::invalid(format!(
                "encoded stream of {} bytes exceeds output buffer of {} bytes",
                chunk.len, output.size
            )))
        } else {
            self.driver
                .memcpy(
                    output.addr,
                    chunk.addr,
                    chunk.len,
                    crate::driver::CopyDirection::DeviceToDevice,
                )
                .map_err(|err| VpuError::BadCopy(err.to_string()))
                .map(|_| chunk.len)
        };
        if let Err(err) = self.driver.enc_release_stream(chn, &chunk) {
            warn!(chn, %err, "encoded stream release failed");
        }
        result
    }
}
