use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_vpu::config::WrapperConfig;
use edgefirst_vpu::driver::{Driver, PixelFormat};
use edgefirst_vpu::memory::{MemoryKind, Picture};
use edgefirst_vpu::sim::SimDriver;
use edgefirst_vpu::vpu::VpuWrapper;
use std::sync::Arc;

pub fn benchmark_convert(c: &mut Criterion) {
    let dims = [(320, 240), (640, 480), (960, 540), (1920, 1080), (3840, 2160)];
    let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
    let vpu = VpuWrapper::new(driver.clone(), WrapperConfig::default()).unwrap();

    let mut group = c.benchmark_group("convert/nv12-rgb888");
    for dim in dims.iter() {
        let src =
            Picture::alloc(&driver, dim.0, dim.1, PixelFormat::Nv12, MemoryKind::Device, 0)
                .unwrap();
        let mut dst =
            Picture::alloc(&driver, dim.0, dim.1, PixelFormat::Rgb888, MemoryKind::Device, 0)
                .unwrap();
        group.bench_function(format!("{}x{}", dim.0, dim.1), |b| {
            b.iter(|| vpu.convert_color(&src, &mut dst))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_convert);
criterion_main!(benches);
