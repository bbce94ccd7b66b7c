// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_vpu::config::PoolSizes;
use edgefirst_vpu::error::{Result, VpuError};
use std::path::PathBuf;

/// Command-line arguments for the EdgeFirst VPU diagnostic tool.
///
/// The tool drives the wrapper end-to-end: buffer upload, the VPC
/// operations, JPEG encode, and a short synthetic video decode session.
/// Arguments can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Run against the software simulation
/// edgefirst-vpu --frames 60
///
/// # Run against the installed accelerator runtime
/// edgefirst-vpu --native --device 1
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Accelerator device index
    #[arg(short, long, env = "VPU_DEVICE", default_value = "0")]
    pub device: u32,

    /// Load the native VPU runtime instead of the software simulation
    #[arg(long, env = "VPU_NATIVE")]
    pub native: bool,

    /// Working resolution in pixels (width height)
    #[arg(
        long,
        env = "VPU_SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub size: Vec<u32>,

    /// Resize stage output resolution in pixels (width height)
    #[arg(
        short,
        long,
        env = "STREAM_SIZE",
        default_value = "1280 720",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub stream_size: Vec<u32>,

    /// VPC channel pool size
    #[arg(long, env = "VPC_CHANNELS")]
    pub vpc_channels: Option<u32>,

    /// JPEG decode channel pool size
    #[arg(long, env = "JPEGD_CHANNELS")]
    pub jpeg_decode_channels: Option<u32>,

    /// PNG decode channel pool size
    #[arg(long, env = "PNGD_CHANNELS")]
    pub png_decode_channels: Option<u32>,

    /// JPEG encode channel pool size
    #[arg(long, env = "JPEGE_CHANNELS")]
    pub jpeg_encode_channels: Option<u32>,

    /// Path to a JSON file with channel pool sizes
    #[arg(long, env = "POOL_CONFIG")]
    pub pool_config: Option<PathBuf>,

    /// Number of synthetic access units pushed through the decode session
    #[arg(long, default_value = "30")]
    pub frames: u32,

    /// Per-session frame skip interval (0 = no skip)
    #[arg(long, default_value = "0")]
    pub skip_interval: u32,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Resolves the channel pool sizes: config file first, then per-kind
    /// command-line overrides.
    pub fn pool_sizes(&self) -> Result<PoolSizes> {
        let mut sizes = match &self.pool_config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|err| {
                    VpuError::InvalidParam(format!("pool config {}: {err}", path.display()))
                })?;
                PoolSizes::from_json(&text)?
            }
            None => PoolSizes::default(),
        };
        if let Some(count) = self.vpc_channels {
            sizes.vpc = count;
        }
        if let Some(count) = self.jpeg_decode_channels {
            sizes.jpeg_dec = count;
        }
        if let Some(count) = self.png_decode_channels {
            sizes.png_dec = count;
        }
        if let Some(count) = self.jpeg_encode_channels {
            sizes.jpeg_enc = count;
        }
        sizes.validate()?;
        Ok(sizes)
    }
}
