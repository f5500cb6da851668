use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use voxcore::{Context, Device, Dtype, Tensor};

fn bench_elementwise(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("elementwise");

    for &n in &[1_000i64, 100_000, 1_000_000] {
        let x = Tensor::ones(&ctx, [n], Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");
        let y = Tensor::full(&ctx, [n], 2.0, Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");
        group.bench_with_input(BenchmarkId::new("add", n), &n, |b, _| {
            b.iter(|| black_box(x.add(&y).expect("add failed")))
        });
    }

    let m = Tensor::ones(&ctx, [512, 512], Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");
    let row = Tensor::ones(&ctx, [512], Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");
    group.bench_function("broadcast_add_512x512", |b| {
        b.iter(|| black_box(m.add(&row).expect("add failed")))
    });

    group.finish();
}

fn bench_reduction(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("reduction");
    let x = Tensor::ones(&ctx, [1024, 1024], Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");

    group.bench_function("sum_rows", |b| b.iter(|| black_box(x.sum(&[1], false).expect("sum failed"))));
    group.bench_function("sum_cols", |b| b.iter(|| black_box(x.sum(&[0], false).expect("sum failed"))));
    group.bench_function("argmax_all", |b| {
        b.iter(|| black_box(x.arg_max(&[0, 1], false).expect("argmax failed")))
    });

    group.finish();
}

fn bench_matmul(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("matmul");

    for &n in &[32i64, 128, 256] {
        let a = Tensor::ones(&ctx, [n, n], Dtype::FLOAT32, &Device::cpu()).expect("alloc failed");
        group.bench_with_input(BenchmarkId::new("square", n), &n, |b, _| {
            b.iter(|| black_box(a.matmul(&a).expect("matmul failed")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_elementwise, bench_reduction, bench_matmul);
criterion_main!(benches);
