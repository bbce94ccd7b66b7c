// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_vpu::config::PoolSizes;
use edgefirst_vpu::driver::Driver;
use edgefirst_vpu::pool::{ChannelHandle, ChannelKind, ChannelPool};
use edgefirst_vpu::sim::SimDriver;
use edgefirst_vpu::VpuError;
use serial_test::serial;
use std::collections::HashSet;
use std::error::Error;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn pool_with(sizes: PoolSizes) -> Arc<ChannelPool> {
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
    Arc::new(ChannelPool::new(driver, sizes))
}

fn small_sizes() -> PoolSizes {
    PoolSizes {
        vpc: 4,
        jpeg_dec: 2,
        png_dec: 1,
        jpeg_enc: 1,
    }
}

#[test]
#[serial]
fn test_init_idempotent() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    pool.init(0, ChannelKind::Vpc)?;
    assert_eq!(pool.available(0, ChannelKind::Vpc), 4);
    pool.init(0, ChannelKind::Vpc)?;
    assert_eq!(pool.available(0, ChannelKind::Vpc), 4);
    pool.deinit()?;
    Ok(())
}

/// Releasing a handle into a pool that was never created must fail without
/// side effects — a channel that was never acquired cannot be released.
#[test]
#[serial]
fn test_put_before_init() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    let handle = ChannelHandle {
        id: 0,
        kind: ChannelKind::Vpc,
        device: 0,
    };
    let err = pool.put_chn(0, handle).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    assert!(!pool.is_inited(0, ChannelKind::Vpc));
    pool.deinit()?;
    Ok(())
}

#[test]
#[serial]
fn test_get_inits_implicitly() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    let handle = pool.get_chn(0, ChannelKind::JpegDec)?;
    assert!(pool.is_inited(0, ChannelKind::JpegDec));
    assert_eq!(pool.available(0, ChannelKind::JpegDec), 1);
    pool.put_chn(0, handle)?;
    assert_eq!(pool.available(0, ChannelKind::JpegDec), 2);
    pool.deinit()?;
    Ok(())
}

/// Pool size is conserved: with all four handles checked out a fifth
/// acquirer blocks until one comes back, and then receives a handle from
/// the same id set.
#[test]
#[serial]
fn test_conservation_and_blocking() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    pool.init(0, ChannelKind::Vpc)?;

    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(pool.get_chn(0, ChannelKind::Vpc)?);
    }
    let ids: HashSet<u32> = held.iter().map(|handle| handle.id).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(pool.available(0, ChannelKind::Vpc), 0);

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let result = waiter_pool.get_chn(0, ChannelKind::Vpc);
        let _ = tx.send(result);
    });

    // The fifth acquirer must still be blocked.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    let released = held.pop().unwrap();
    pool.put_chn(0, released)?;

    let acquired = rx.recv_timeout(Duration::from_secs(2))??;
    assert!(ids.contains(&acquired.id));
    waiter.join().unwrap();

    pool.put_chn(0, acquired)?;
    for handle in held {
        pool.put_chn(0, handle)?;
    }
    assert_eq!(pool.available(0, ChannelKind::Vpc), 4);
    pool.deinit()?;
    Ok(())
}

/// Teardown must wake blocked acquirers with an error instead of leaving
/// them stuck.
#[test]
#[serial]
fn test_deinit_unblocks_waiters() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(PoolSizes {
        vpc: 1,
        ..small_sizes()
    });
    pool.init(0, ChannelKind::Vpc)?;
    let held = pool.get_chn(0, ChannelKind::Vpc)?;

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let result = waiter_pool.get_chn(0, ChannelKind::Vpc);
        let _ = tx.send(result);
    });
    thread::sleep(Duration::from_millis(100));

    pool.deinit()?;
    let result = rx.recv_timeout(Duration::from_secs(2))?;
    assert!(matches!(result, Err(VpuError::CommFailure(_))));
    waiter.join().unwrap();
    assert!(!pool.is_inited(0, ChannelKind::Vpc));

    // The held handle belongs to a pool that no longer exists.
    let err = pool.put_chn(0, held).unwrap_err();
    assert!(matches!(err, VpuError::InvalidParam(_)));
    Ok(())
}

/// Concurrent initialization must collapse into a single channel-creating
/// pass.
#[test]
#[serial]
fn test_concurrent_init() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    let mut workers = Vec::new();
    for _ in 0..8 {
        let worker_pool = pool.clone();
        workers.push(thread::spawn(move || {
            worker_pool.init(1, ChannelKind::Vpc)
        }));
    }
    for worker in workers {
        worker.join().unwrap()?;
    }
    assert_eq!(pool.available(1, ChannelKind::Vpc), 4);
    pool.deinit()?;
    Ok(())
}

#[test]
#[serial]
fn test_deinit_without_init() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    pool.deinit()?;
    Ok(())
}

#[test]
#[serial]
fn test_device_out_of_range() -> Result<(), Box<dyn Error>> {
    let pool = pool_with(small_sizes());
    let err = pool.init(42, ChannelKind::Vpc).unwrap_err();
    assert!(matches!(err, VpuError::OutOfRange(_)));
    Ok(())
}
