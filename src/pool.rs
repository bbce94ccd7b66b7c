// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Process-wide registry of pre-created hardware channels.
//!
//! One blocking queue exists per `(device, ChannelKind)` pair.  A channel
//! handle is either queued here or owned by exactly one in-flight operation;
//! handles are created only during pool initialization and destroyed only at
//! teardown.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, error, info};

use crate::config::PoolSizes;
use crate::driver::{CodecType, DecChnAttr, Driver, DriverError, EncChnAttr, PixelFormat};
use crate::error::{Result, VpuError};
use crate::memory::{align_up, VPC_STRIDE_HEIGHT, VPC_STRIDE_WIDTH};

/// Highest channel id the driver accepts; creation scans `0..=MAX`.
pub const MAX_CHANNEL_ID: u32 = 127;

const MAX_JPEG_DIM: u32 = 8192;
const MAX_PNG_DIM: u32 = 4096;

/// Channel families managed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Vpc,
    JpegDec,
    PngDec,
    JpegEnc,
}

/// A pooled hardware channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u32,
    pub kind: ChannelKind,
    pub device: u32,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded multi-consumer queue with blocking pop and close semantics.
pub(crate) struct BlockingQueue<T> {
    inner: Mutex<QueueInner<T>>,
    cond: Condvar,
}

impl<T> BlockingQueue<T> {
    pub(crate) fn new() -> Self {
        BlockingQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Pushes an item, waking one blocked popper.  Returns the item back
    /// when the queue has been closed.
    pub(crate) fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(item);
        }
        inner.items.push_back(item);
        self.cond.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Closes the queue and wakes every blocked popper.
    pub(crate) fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.cond.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }
}

struct PoolInner {
    queues: HashMap<(u32, ChannelKind), Arc<BlockingQueue<ChannelHandle>>>,
    sys_inited: HashSet<u32>,
}

/// Channel pool registry.
///
/// Constructed explicitly by the embedder and torn down exactly once with
/// [`ChannelPool::deinit`]; the wrapper shares it through an `Arc`.
/// Initialization is lazy per `(device, kind)` and serialized by a single
/// pool-wide mutex so concurrent initializers never double-create channels.
pub struct ChannelPool {
    driver: Arc<dyn Driver>,
    sizes: PoolSizes,
    init_lock: Mutex<()>,
    inner: Mutex<PoolInner>,
}

impl ChannelPool {
    pub fn new(driver: Arc<dyn Driver>, sizes: PoolSizes) -> Self {
        ChannelPool {
            driver,
            sizes,
            init_lock: Mutex::new(()),
            inner: Mutex::new(PoolInner {
                queues: HashMap::new(),
                sys_inited: HashSet::new(),
            }),
        }
    }

    /// Initializes the pool for one `(device, kind)` pair.
    ///
    /// Idempotent: the first call creates the configured number of channels
    /// and every later call returns immediately.  When creation fails
    /// mid-way the channels created by this call are destroyed again and the
    /// pool stays uninitialized.
    ///
    /// # Errors
    ///
    /// `OutOfRange` for an invalid device index, `InitFail` when the device
    /// context switch fails or the channel id space `0..=`
    /// [`MAX_CHANNEL_ID`] is exhausted.
    pub fn init(&self, device: u32, kind: ChannelKind) -> Result<()> {
        let _guard = self.init_lock.lock().unwrap();
        if self.is_inited(device, kind) {
            return Ok(());
        }
        if device >= self.driver.device_count() {
            return Err(VpuError::OutOfRange(format!(
                "device {device} out of range [0, {})",
                self.driver.device_count()
            )));
        }
        self.driver
            .set_device(device)
            .map_err(|err| VpuError::InitFail(format!("device context switch: {err}")))?;

        let first_touch = !self.inner.lock().unwrap().sys_inited.contains(&device);
        if first_touch {
            self.driver
                .sys_init(device)
                .map_err(|err| VpuError::InitFail(format!("media system init: {err}")))?;
            self.inner.lock().unwrap().sys_inited.insert(device);
        }

        let count = self.sizes.count(kind);
        let queue = Arc::new(BlockingQueue::new());
        let mut created: Vec<ChannelHandle> = Vec::with_capacity(count as usize);
        let mut next_id = 0;
        for _ in 0..count {
            match self.create_channel(device, kind, &mut next_id) {
                Ok(handle) => {
                    created.push(handle);
                    if queue.push(handle).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    for handle in created {
                        if let Err(derr) = self.destroy_channel(handle) {
                            error!(?handle, %derr, "rollback channel destroy failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
        self.inner
            .lock()
            .unwrap()
            .queues
            .insert((device, kind), queue);
        info!(device, ?kind, count, "channel pool initialized");
        Ok(())
    }

    /// Whether a pool exists for the pair.  Pure lookup, no side effects.
    pub fn is_inited(&self, device: u32, kind: ChannelKind) -> bool {
        self.inner
            .lock()
            .unwrap()
            .queues
            .contains_key(&(device, kind))
    }

    /// Number of handles currently queued (not checked out).
    pub fn available(&self, device: u32, kind: ChannelKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(&(device, kind))
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    /// Acquires a channel, initializing the pool on first use.  Blocks until
    /// a handle is available or the pool is torn down.
    pub fn get_chn(&self, device: u32, kind: ChannelKind) -> Result<ChannelHandle> {
        self.init(device, kind)?;
        let queue = self
            .inner
            .lock()
            .unwrap()
            .queues
            .get(&(device, kind))
            .cloned()
            .ok_or_else(|| VpuError::CommFailure(format!("no {kind:?} pool on device {device}")))?;
        match queue.pop() {
            Some(handle) => {
                debug!(?handle, "channel checked out");
                Ok(handle)
            }
            None => Err(VpuError::CommFailure(format!(
                "{kind:?} pool on device {device} torn down"
            ))),
        }
    }

    /// Returns a channel to its pool, waking one blocked acquirer.
    ///
    /// # Errors
    ///
    /// `InvalidParam` when no pool exists for `(device, handle.kind)` — a
    /// handle that was never acquired cannot be released.
    pub fn put_chn(&self, device: u32, handle: ChannelHandle) -> Result<()> {
        let queue = self
            .inner
            .lock()
            .unwrap()
            .queues
            .get(&(device, handle.kind))
            .cloned()
            .ok_or_else(|| {
                VpuError::invalid(format!(
                    "no {:?} pool on device {device} to release channel {} into",
                    handle.kind, handle.id
                ))
            })?;
        queue.push(handle).map_err(|_| {
            VpuError::CommFailure(format!(
                "{:?} pool on device {device} closed while releasing channel {}",
                handle.kind, handle.id
            ))
        })?;
        debug!(?handle, "channel returned");
        Ok(())
    }

    /// Tears down every pool: closes the queues (unblocking waiters),
    /// destroys each queued channel, then shuts the media system down once
    /// per touched device.  Best-effort: the last error observed is
    /// returned, but draining continues for all handles and pools.
    pub fn deinit(&self) -> Result<()> {
        let _guard = self.init_lock.lock().unwrap();
        let (queues, sys_devices) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::take(&mut inner.queues),
                std::mem::take(&mut inner.sys_inited),
            )
        };
        let mut last_err = None;
        for ((device, kind), queue) in queues {
            queue.close();
            if let Err(err) = self.driver.set_device(device) {
                error!(device, %err, "device context switch during pool teardown");
                last_err = Some(VpuError::CommFailure(err.to_string()));
                continue;
            }
            while let Some(handle) = queue.try_pop() {
                if let Err(err) = self.destroy_channel(handle) {
                    error!(device, ?kind, id = handle.id, %err, "channel destroy failed");
                    last_err = Some(err);
                }
            }
        }
        for device in sys_devices {
            let result = self
                .driver
                .set_device(device)
                .and_then(|_| self.driver.sys_exit(device));
            if let Err(err) = result {
                error!(device, %err, "media system shutdown failed");
                last_err = Some(VpuError::CommFailure(err.to_string()));
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => {
                info!("channel pools torn down");
                Ok(())
            }
        }
    }

    /// Creates one channel, scanning ids upward from `*next_id` until the
    /// driver accepts one.  Every id occupied means the pool cannot grow.
    fn create_channel(
        &self,
        device: u32,
        kind: ChannelKind,
        next_id: &mut u32,
    ) -> Result<ChannelHandle> {
        while *next_id <= MAX_CHANNEL_ID {
            let id = *next_id;
            let created = match kind {
                ChannelKind::Vpc => self.driver.vpc_create_chn(id),
                ChannelKind::JpegDec => self.driver.dec_create_chn(id, &jpeg_decode_attr()),
                ChannelKind::PngDec => self.driver.dec_create_chn(id, &png_decode_attr()),
                ChannelKind::JpegEnc => self.driver.enc_create_chn(id, &jpeg_encode_attr()),
            };
            match created {
                Ok(()) => {
                    debug!(device, ?kind, id, "channel created");
                    *next_id = id + 1;
                    return Ok(ChannelHandle { id, kind, device });
                }
                Err(DriverError::Occupied) => {
                    *next_id = id + 1;
                }
                Err(err) => {
                    return Err(VpuError::InitFail(format!(
                        "{kind:?} channel creation on device {device}: {err}"
                    )));
                }
            }
        }
        Err(VpuError::InitFail(format!(
            "all {kind:?} channel ids on device {device} are occupied"
        )))
    }

    fn destroy_channel(&self, handle: ChannelHandle) -> Result<()> {
        let result = match handle.kind {
            ChannelKind::Vpc => self.driver.vpc_destroy_chn(handle.id),
            ChannelKind::JpegDec | ChannelKind::PngDec => self.driver.dec_destroy_chn(handle.id),
            ChannelKind::JpegEnc => self
                .driver
                .enc_stop_recv(handle.id)
                .and_then(|_| self.driver.enc_destroy_chn(handle.id)),
        };
        result.map_err(|err| VpuError::CommFailure(err.to_string()))
    }
}

fn jpeg_decode_attr() -> DecChnAttr {
    DecChnAttr {
        codec: CodecType::Jpeg,
        pic_width: MAX_JPEG_DIM,
        pic_height: MAX_JPEG_DIM,
        pixel_format: PixelFormat::Nv12,
        stream_buf_size: MAX_JPEG_DIM as usize * MAX_JPEG_DIM as usize,
    }
}

fn png_decode_attr() -> DecChnAttr {
    DecChnAttr {
        codec: CodecType::Png,
        pic_width: MAX_PNG_DIM,
        pic_height: MAX_PNG_DIM,
        pixel_format: PixelFormat::Rgb888,
        stream_buf_size: MAX_PNG_DIM as usize * MAX_PNG_DIM as usize,
    }
}

fn jpeg_encode_attr() -> EncChnAttr {
    let width = align_up(MAX_JPEG_DIM, VPC_STRIDE_WIDTH);
    let height = align_up(MAX_JPEG_DIM, VPC_STRIDE_HEIGHT);
    EncChnAttr {
        codec: CodecType::Jpeg,
        max_pic_width: width,
        max_pic_height: height,
        bitrate_kbps: 0,
        gop: 1,
    }
}
