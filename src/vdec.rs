// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Video decode sessions.
//!
//! Each session owns one hardware decode channel and a worker thread that
//! drains decoded frames and hands them to the user callback.  The worker is
//! driven by a control channel carrying exactly three messages: an encoded
//! unit, a flush request and a stop request.  Flushing is a rendezvous: the
//! caller sends the end-of-stream marker and waits, bounded, until the drain
//! loop observes the driver report that nothing is buffered anymore.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::VdecConfig;
use crate::driver::{DecChnAttr, Driver, DriverError, FrameInfo, PicInfo, PixelFormat, StreamUnit};
use crate::error::{Result, VpuError};
use crate::memory::{frame_size, height_stride, width_stride, DeviceBuffer, MemoryKind};
use crate::pool::MAX_CHANNEL_ID;

/// How long the caller waits for the flush acknowledgment.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on one send attempt into the driver.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);
/// Worker idle nap between control/drain rounds.
const IDLE_TICK: Duration = Duration::from_millis(2);

/// A decoded frame delivered to the session callback.
///
/// The callback owns the frame buffer; dropping it releases the memory.
pub struct DecodedFrame {
    pub buffer: DeviceBuffer,
    pub width: u32,
    pub height: u32,
    pub width_stride: u32,
    pub height_stride: u32,
    pub format: PixelFormat,
    pub frame_id: u64,
    pub channel: u32,
}

pub type DecodeCallback = Box<dyn FnMut(DecodedFrame) + Send>;

enum VdecMsg {
    Unit { data: Vec<u8>, frame_id: u64 },
    Flush { ack: mpsc::Sender<()> },
    Stop,
}

/// One active decode session.
pub struct VdecSession {
    driver: Arc<dyn Driver>,
    config: VdecConfig,
    chn: u32,
    ctrl: kanal::Sender<VdecMsg>,
    worker: Option<JoinHandle<()>>,
    eos_sent: bool,
}

impl std::fmt::Debug for VdecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdecSession")
            .field("chn", &self.chn)
            .field("eos_sent", &self.eos_sent)
            .finish_non_exhaustive()
    }
}

impl VdecSession {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        config: VdecConfig,
        callback: DecodeCallback,
    ) -> Result<Self> {
        config.validate(driver.generation())?;
        if config.device >= driver.device_count() {
            return Err(VpuError::OutOfRange(format!(
                "device {} out of range [0, {})",
                config.device,
                driver.device_count()
            )));
        }
        driver
            .set_device(config.device)
            .map_err(|err| VpuError::InitFail(format!("device context switch: {err}")))?;
        driver
            .sys_init(config.device)
            .map_err(|err| VpuError::InitFail(format!("media system init: {err}")))?;

        let attr = DecChnAttr {
            codec: config.codec,
            pic_width: config.width,
            pic_height: config.height,
            pixel_format: config.format,
            stream_buf_size: config.width as usize * config.height as usize * 3 / 2,
        };
        let chn = create_decode_channel(&driver, config.channel_id, &attr)?;
        if let Err(err) = driver.dec_start_recv(chn) {
            let _ = driver.dec_destroy_chn(chn);
            return Err(VpuError::InitFail(format!("decode channel start: {err}")));
        }

        let (ctrl, ctrl_rx) = kanal::unbounded();
        let worker_driver = driver.clone();
        let worker_config = config;
        let spawned = thread::Builder::new()
            .name("vpu_vdec".into())
            .spawn(move || decode_worker(worker_driver, worker_config, chn, ctrl_rx, callback));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let _ = driver.dec_stop_recv(chn);
                let _ = driver.dec_destroy_chn(chn);
                return Err(VpuError::InitFail(format!("decode worker spawn: {err}")));
            }
        };
        info!(device = config.device, chn, "video decode session started");
        Ok(VdecSession {
            driver,
            config,
            chn,
            ctrl,
            worker: Some(worker),
            eos_sent: false,
        })
    }

    pub fn channel(&self) -> u32 {
        self.chn
    }

    /// Queues one encoded access unit.  Frame delivery is asynchronous; the
    /// result of decoding arrives through the session callback.
    pub fn push(&mut self, data: Vec<u8>, frame_id: u64) -> Result<()> {
        if data.is_empty() {
            return Err(VpuError::invalid("encoded unit must not be empty"));
        }
        self.eos_sent = false;
        self.ctrl
            .send(VdecMsg::Unit { data, frame_id })
            .map_err(|_| VpuError::CommFailure("decode worker exited".into()))
    }

    /// Signals end-of-stream and waits, bounded, for the drain loop to
    /// acknowledge that the driver has nothing buffered anymore.
    ///
    /// # Errors
    ///
    /// `InvalidParam` when end-of-stream was already signalled without an
    /// intervening [`push`](Self::push) — only one marker may be sent.
    pub fn flush(&mut self) -> Result<()> {
        if self.eos_sent {
            warn!("end of stream was already signalled");
            return Err(VpuError::invalid("end of stream already signalled"));
        }
        let (ack, ack_rx) = mpsc::channel();
        self.ctrl
            .send(VdecMsg::Flush { ack })
            .map_err(|_| VpuError::CommFailure("decode worker exited".into()))?;
        self.eos_sent = true;
        if ack_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            warn!("flush acknowledgment timed out");
        }
        Ok(())
    }

    /// Stops the worker, joins it, and destroys the decode channel.
    /// Destruction failures are logged and do not block the remaining
    /// teardown.
    pub fn deinit(&mut self) -> Result<()> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        let _ = self.ctrl.send(VdecMsg::Stop);
        if worker.join().is_err() {
            error!("decode worker panicked");
        }
        let mut last_err = None;
        if let Err(err) = self.driver.dec_stop_recv(self.chn) {
            error!(chn = self.chn, %err, "decode channel stop failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.dec_destroy_chn(self.chn) {
            error!(chn = self.chn, %err, "decode channel destroy failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.sys_exit(self.config.device) {
            error!(device = self.config.device, %err, "media system shutdown failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        debug!(chn = self.chn, "video decode session stopped");
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for VdecSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.deinit();
        }
    }
}

/// Creates a decode channel, preferring the configured id and falling back
/// to a scan of the id space when it is taken.
fn create_decode_channel(
    driver: &Arc<dyn Driver>,
    preferred: Option<u32>,
    attr: &DecChnAttr,
) -> Result<u32> {
    if let Some(id) = preferred {
        match driver.dec_create_chn(id, attr) {
            Ok(()) => return Ok(id),
            Err(err) => {
                warn!(id, %err, "preferred decode channel unavailable, scanning");
            }
        }
    }
    for id in 0..=MAX_CHANNEL_ID {
        match driver.dec_create_chn(id, attr) {
            Ok(()) => return Ok(id),
            Err(DriverError::Occupied) => continue,
            Err(err) => {
                return Err(VpuError::InitFail(format!("decode channel creation: {err}")));
            }
        }
    }
    Err(VpuError::InitFail(
        "all decode channel ids are occupied".into(),
    ))
}

fn decode_worker(
    driver: Arc<dyn Driver>,
    config: VdecConfig,
    chn: u32,
    ctrl: kanal::Receiver<VdecMsg>,
    mut callback: DecodeCallback,
) {
    if let Err(err) = driver.set_device(config.device) {
        error!(device = config.device, %err, "decode worker device context switch failed");
        return;
    }
    // Output buffers for submitted-but-not-yet-drained frames, by frame id.
    let mut pending: HashMap<u64, DeviceBuffer> = HashMap::new();
    let mut flush_ack: Option<mpsc::Sender<()>> = None;

    'run: loop {
        let mut worked = false;
        loop {
            match ctrl.try_recv() {
                Ok(Some(VdecMsg::Unit { data, frame_id })) => {
                    worked = true;
                    submit_unit(&driver, &config, chn, &mut pending, &data, frame_id);
                }
                Ok(Some(VdecMsg::Flush { ack })) => {
                    worked = true;
                    send_eos(&driver, &config, chn);
                    flush_ack = Some(ack);
                }
                Ok(Some(VdecMsg::Stop)) | Err(_) => break 'run,
                Ok(None) => break,
            }
        }
        loop {
            match driver.dec_get_frame(chn, Duration::ZERO) {
                Ok(frame) => {
                    worked = true;
                    deliver_frame(&driver, chn, frame, &mut pending, &mut callback);
                }
                Err(DriverError::BufEmpty) => {
                    if let Some(ack) = flush_ack.take() {
                        let _ = ack.send(());
                    }
                    break;
                }
                Err(err) => {
                    warn!(chn, %err, "frame drain failed");
                    break;
                }
            }
        }
        if !worked {
            thread::sleep(IDLE_TICK);
        }
    }
    // Buffers for frames that never came back are released here.
    drop(pending);
}

fn submit_unit(
    driver: &Arc<dyn Driver>,
    config: &VdecConfig,
    chn: u32,
    pending: &mut HashMap<u64, DeviceBuffer>,
    data: &[u8],
    frame_id: u64,
) {
    let displayed = config.skip_interval == 0 || frame_id % (config.skip_interval as u64 + 1) == 0;
    let mut out_info = null_pic_info(config.format);
    if displayed {
        let ws = width_stride(config.format, config.width);
        let hs = height_stride(config.height);
        let size = frame_size(config.format, ws, hs);
        let mut buf =
            match DeviceBuffer::alloc(driver, size, MemoryKind::Media, config.device) {
                Ok(buf) => buf,
                Err(err) => {
                    error!(frame_id, %err, "output buffer allocation failed, frame dropped");
                    return;
                }
            };
        out_info = PicInfo {
            addr: buf.as_mut_ptr(),
            size: buf.len(),
            width: config.width,
            height: config.height,
            width_stride: ws,
            height_stride: hs,
            format: config.format,
        };
        pending.insert(frame_id, buf);
    }
    let unit = StreamUnit {
        addr: data.as_ptr(),
        len: data.len(),
        pts: frame_id,
        end_of_frame: true,
        end_of_stream: false,
        need_display: displayed,
    };
    loop {
        match driver.dec_send_stream(chn, &unit, &out_info, SEND_TIMEOUT) {
            Ok(()) => return,
            Err(DriverError::BufFull) => thread::sleep(IDLE_TICK),
            Err(err) => {
                error!(frame_id, %err, "stream send failed");
                pending.remove(&frame_id);
                return;
            }
        }
    }
}

fn send_eos(driver: &Arc<dyn Driver>, config: &VdecConfig, chn: u32) {
    let unit = StreamUnit {
        addr: std::ptr::null(),
        len: 0,
        pts: 0,
        end_of_frame: false,
        end_of_stream: true,
        need_display: true,
    };
    let out_info = null_pic_info(config.format);
    if let Err(err) = driver.dec_send_stream(chn, &unit, &out_info, SEND_TIMEOUT) {
        error!(chn, %err, "end-of-stream send failed");
    }
}

fn deliver_frame(
    driver: &Arc<dyn Driver>,
    chn: u32,
    frame: FrameInfo,
    pending: &mut HashMap<u64, DeviceBuffer>,
    callback: &mut DecodeCallback,
) {
    let buffer = pending.remove(&frame.pts);
    if let Err(err) = driver.dec_release_frame(chn, &frame) {
        warn!(chn, %err, "decoded frame release failed");
    }
    if frame.flag != 0 {
        warn!(chn, frame_id = frame.pts, flag = frame.flag, "frame decode failed");
        return;
    }
    match buffer {
        Some(buffer) => callback(DecodedFrame {
            buffer,
            width: frame.width,
            height: frame.height,
            width_stride: frame.width_stride,
            height_stride: frame.height_stride,
            format: frame.format,
            frame_id: frame.pts,
            channel: chn,
        }),
        None => warn!(chn, frame_id = frame.pts, "frame without a pending buffer"),
    }
}

fn null_pic_info(format: PixelFormat) -> PicInfo {
    PicInfo {
        addr: std::ptr::null_mut(),
        size: 0,
        width: 0,
        height: 0,
        width_stride: 0,
        height_stride: 0,
        format,
    }
}
