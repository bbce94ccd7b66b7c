// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Video encode sessions.
//!
//! The worker waits on the driver's stream-ready notification, copies each
//! encoded chunk into a host buffer, invokes the user callback with it, and
//! returns the driver-side slot.  Teardown joins the worker before the
//! channel is stopped, so no callback can be enqueued after `deinit`
//! returns.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::VencConfig;
use crate::driver::{CopyDirection, Driver, DriverError, EncChnAttr};
use crate::error::{Result, VpuError};
use crate::memory::Picture;
use crate::pool::MAX_CHANNEL_ID;

const IDLE_TICK: Duration = Duration::from_millis(2);

/// An encoded chunk delivered to the session callback, already copied into
/// host memory.
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub pts: u64,
    pub keyframe: bool,
}

pub type EncodeCallback = Box<dyn FnMut(EncodedChunk) + Send>;

enum VencMsg {
    Frame(Picture),
    Stop,
}

/// One active encode session.
pub struct VencSession {
    driver: Arc<dyn Driver>,
    config: VencConfig,
    chn: u32,
    ctrl: kanal::Sender<VencMsg>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for VencSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VencSession")
            .field("chn", &self.chn)
            .finish_non_exhaustive()
    }
}

impl VencSession {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        config: VencConfig,
        callback: EncodeCallback,
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

        let attr = EncChnAttr {
            codec: config.codec,
            max_pic_width: config.width,
            max_pic_height: config.height,
            bitrate_kbps: config.bitrate_kbps,
            gop: config.key_frame_interval,
        };
        let chn = create_encode_channel(&driver, config.channel_id, &attr)?;
        if let Err(err) = driver.enc_start_recv(chn) {
            let _ = driver.enc_destroy_chn(chn);
            return Err(VpuError::InitFail(format!("encode channel start: {err}")));
        }

        let (ctrl, ctrl_rx) = kanal::unbounded();
        let worker_driver = driver.clone();
        let worker_config = config;
        let spawned = thread::Builder::new()
            .name("vpu_venc".into())
            .spawn(move || encode_worker(worker_driver, worker_config, chn, ctrl_rx, callback));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let _ = driver.enc_stop_recv(chn);
                let _ = driver.enc_destroy_chn(chn);
                return Err(VpuError::InitFail(format!("encode worker spawn: {err}")));
            }
        };
        info!(device = config.device, chn, "video encode session started");
        Ok(VencSession {
            driver,
            config,
            chn,
            ctrl,
            worker: Some(worker),
        })
    }

    pub fn channel(&self) -> u32 {
        self.chn
    }

    /// Queues one frame for encoding.  Encoded output arrives through the
    /// session callback.
    pub fn push(&mut self, frame: Picture) -> Result<()> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(VpuError::invalid(format!(
                "frame {}x{} does not match session {}x{}",
                frame.width(),
                frame.height(),
                self.config.width,
                self.config.height
            )));
        }
        if !frame.buffer().kind().is_device_like() {
            return Err(VpuError::invalid(
                "encode input must be Device or Media memory",
            ));
        }
        self.ctrl
            .send(VencMsg::Frame(frame))
            .map_err(|_| VpuError::CommFailure("encode worker exited".into()))
    }

    /// Joins the worker, then stops and destroys the encode channel.
    pub fn deinit(&mut self) -> Result<()> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        let _ = self.ctrl.send(VencMsg::Stop);
        if worker.join().is_err() {
            error!("encode worker panicked");
        }
        let mut last_err = None;
        if let Err(err) = self.driver.enc_stop_recv(self.chn) {
            error!(chn = self.chn, %err, "encode channel stop failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.enc_destroy_chn(self.chn) {
            error!(chn = self.chn, %err, "encode channel destroy failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        if let Err(err) = self.driver.sys_exit(self.config.device) {
            error!(device = self.config.device, %err, "media system shutdown failed");
            last_err = Some(VpuError::DriverFail(err));
        }
        debug!(chn = self.chn, "video encode session stopped");
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for VencSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.deinit();
        }
    }
}

fn create_encode_channel(
    driver: &Arc<dyn Driver>,
    preferred: Option<u32>,
    attr: &EncChnAttr,
) -> Result<u32> {
    if let Some(id) = preferred {
        match driver.enc_create_chn(id, attr) {
            Ok(()) => return Ok(id),
            Err(err) => {
                warn!(id, %err, "preferred encode channel unavailable, scanning");
            }
        }
    }
    for id in 0..=MAX_CHANNEL_ID {
        match driver.enc_create_chn(id, attr) {
            Ok(()) => return Ok(id),
            Err(DriverError::Occupied) => continue,
            Err(err) => {
                return Err(VpuError::InitFail(format!("encode channel creation: {err}")));
            }
        }
    }
    Err(VpuError::InitFail(
        "all encode channel ids are occupied".into(),
    ))
}

fn encode_worker(
    driver: Arc<dyn Driver>,
    config: VencConfig,
    chn: u32,
    ctrl: kanal::Receiver<VencMsg>,
    mut callback: EncodeCallback,
) {
    if let Err(err) = driver.set_device(config.device) {
        error!(device = config.device, %err, "encode worker device context switch failed");
        return;
    }
    let mut frame_index: u64 = 0;

    'run: loop {
        let mut worked = false;
        loop {
            match ctrl.try_recv() {
                Ok(Some(VencMsg::Frame(frame))) => {
                    worked = true;
                    let force = frame_index % config.key_frame_interval as u64 == 0;
                    frame_index += 1;
                    if let Err(err) = driver.enc_send_frame(chn, &frame.pic_info(), force) {
                        error!(chn, %err, "frame send failed");
                    }
                }
                Ok(Some(VencMsg::Stop)) | Err(_) => break 'run,
                Ok(None) => break,
            }
        }
        loop {
            match driver.enc_get_stream(chn, Duration::ZERO) {
                Ok(chunk) => {
                    worked = true;
                    let mut data = vec![0u8; chunk.len];
                    let copied = driver.memcpy(
                        data.as_mut_ptr(),
                        chunk.addr,
                        chunk.len,
                        CopyDirection::DeviceToHost,
                    );
                    if let Err(err) = driver.enc_release_stream(chn, &chunk) {
                        warn!(chn, %err, "encoded stream release failed");
                    }
                    match copied {
                        Ok(()) => callback(EncodedChunk {
                            data,
                            pts: chunk.pts,
                            keyframe: chunk.keyframe,
                        }),
                        Err(err) => error!(chn, %err, "encoded stream copy failed"),
                    }
                }
                Err(DriverError::Timeout) | Err(DriverError::BufEmpty) => break,
                Err(err) => {
                    warn!(chn, %err, "stream drain failed");
                    break;
                }
            }
        }
        if !worked {
            thread::sleep(IDLE_TICK);
        }
    }
}
