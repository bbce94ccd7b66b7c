use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_vpu::config::PoolSizes;
use edgefirst_vpu::driver::Driver;
use edgefirst_vpu::pool::{ChannelKind, ChannelPool};
use edgefirst_vpu::sim::SimDriver;
use std::sync::Arc;

pub fn benchmark_pool(c: &mut Criterion) {
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
    let pool = ChannelPool::new(driver, PoolSizes::default());
    pool.init(0, ChannelKind::Vpc).unwrap();

    c.bench_function("pool/get-put", |b| {
        b.iter(|| {
            let handle = pool.get_chn(0, ChannelKind::Vpc).unwrap();
            pool.put_chn(0, handle).unwrap();
        })
    });

    pool.deinit().unwrap();
}

criterion_group!(benches, benchmark_pool);
criterion_main!(benches);
