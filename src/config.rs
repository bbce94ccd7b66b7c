// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Configuration surface of the wrapper: pool sizes, wrapper construction
//! options and video session parameters.

use crate::checks;
use crate::driver::{CodecType, Driver, PixelFormat, SocGeneration};
use crate::error::{Result, VpuError};
use crate::pool::ChannelKind;

/// Number of channels pre-created per `(device, kind)` pool.
///
/// All counts must be positive; the defaults match the fixed process-start
/// constants of the stock deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub vpc: u32,
    pub jpeg_dec: u32,
    pub png_dec: u32,
    pub jpeg_enc: u32,
}

impl Default for PoolSizes {
    fn default() -> Self {
        PoolSizes {
            vpc: 8,
            jpeg_dec: 4,
            png_dec: 2,
            jpeg_enc: 2,
        }
    }
}

impl PoolSizes {
    pub(crate) fn count(&self, kind: ChannelKind) -> u32 {
        match kind {
            ChannelKind::Vpc => self.vpc,
            ChannelKind::JpegDec => self.jpeg_dec,
            ChannelKind::PngDec => self.png_dec,
            ChannelKind::JpegEnc => self.jpeg_enc,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, count) in [
            ("vpc", self.vpc),
            ("jpeg_decode", self.jpeg_dec),
            ("png_decode", self.png_dec),
            ("jpeg_encode", self.jpeg_enc),
        ] {
            if count == 0 {
                return Err(VpuError::invalid(format!(
                    "{name} channel count must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Reads pool sizes from a JSON object; missing keys keep defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| VpuError::invalid(format!("pool size config: {err}")))?;
        let mut sizes = PoolSizes::default();
        let read = |key: &str, default: u32| -> u32 {
            json.get(key)
                .and_then(|value| value.as_u64())
                .map(|value| value as u32)
                .unwrap_or(default)
        };
        sizes.vpc = read("vpc", sizes.vpc);
        sizes.jpeg_dec = read("jpeg_decode", sizes.jpeg_dec);
        sizes.png_dec = read("png_decode", sizes.png_dec);
        sizes.jpeg_enc = read("jpeg_encode", sizes.jpeg_enc);
        sizes.validate()?;
        Ok(sizes)
    }
}

/// Wrapper construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapperConfig {
    pub device: u32,
    pub pool: PoolSizes,
}

impl WrapperConfig {
    pub(crate) fn validate(&self, driver: &dyn Driver) -> Result<()> {
        if self.device >= driver.device_count() {
            return Err(VpuError::OutOfRange(format!(
                "device {} out of range [0, {})",
                self.device,
                driver.device_count()
            )));
        }
        self.pool.validate()
    }
}

/// Video decode session configuration.
#[derive(Debug, Clone, Copy)]
pub struct VdecConfig {
    pub device: u32,
    pub codec: CodecType,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Every `skip_interval + 1`-th frame is displayed; 0 disables skipping.
    pub skip_interval: u32,
    /// Preferred channel id; when occupied the id space is scanned instead.
    pub channel_id: Option<u32>,
}

impl VdecConfig {
    pub(crate) fn validate(&self, generation: SocGeneration) -> Result<()> {
        match self.codec {
            CodecType::H264 | CodecType::H265 => {}
            other => {
                return Err(VpuError::invalid(format!(
                    "video decode does not accept {other:?}"
                )))
            }
        }
        checks::check_vdec_dims(generation, self.width, self.height)?;
        checks::check_session_format(generation, self.format)
    }
}

/// Video encode session configuration.
#[derive(Debug, Clone, Copy)]
pub struct VencConfig {
    pub device: u32,
    pub codec: CodecType,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Distance between forced key frames, must be positive.
    pub key_frame_interval: u32,
    pub bitrate_kbps: u32,
    pub channel_id: Option<u32>,
}

impl VencConfig {
    pub(crate) fn validate(&self, generation: SocGeneration) -> Result<()> {
        match self.codec {
            CodecType::H264 | CodecType::H265 => {}
            other => {
                return Err(VpuError::invalid(format!(
                    "video encode does not accept {other:?}"
                )))
            }
        }
        if self.key_frame_interval == 0 {
            return Err(VpuError::invalid("key frame interval must be positive"));
        }
        checks::check_vdec_dims(generation, self.width, self.height)?;
        checks::check_session_format(generation, self.format)
    }
}
