use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use voxcore::{Context, Device, Dtype, HashMap, Tensor};

fn voxel_keys(ctx: &Context, n: i64) -> Tensor {
    // A dense cube with every voxel listed twice.
    let side = (n as f64).cbrt().ceil() as i32;
    let coords: Vec<i32> = (0..n)
        .flat_map(|i| {
            let v = (i / 2) as i32;
            [v % side, (v / side) % side, v / (side * side)]
        })
        .collect();
    Tensor::from_vec(ctx, coords, [n, 3], &Device::cpu()).expect("keys failed")
}

fn bench_insert(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("hashmap_insert");

    for &n in &[10_000i64, 100_000, 1_000_000] {
        let keys = voxel_keys(&ctx, n);
        let values = Tensor::zeros(&ctx, [n, 1], Dtype::FLOAT32, &Device::cpu()).expect("values failed");
        group.bench_with_input(BenchmarkId::new("voxels", n), &n, |b, &n| {
            b.iter(|| {
                let mut map = HashMap::new(&ctx, n, Dtype::INT32, [3], Dtype::FLOAT32, [1], &Device::cpu())
                    .expect("map failed");
                black_box(map.insert(&keys, &values).expect("insert failed"))
            })
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let ctx = Context::default();
    let n = 100_000;
    let keys = voxel_keys(&ctx, n);
    let values = Tensor::zeros(&ctx, [n, 1], Dtype::FLOAT32, &Device::cpu()).expect("values failed");
    let mut map = HashMap::new(&ctx, n, Dtype::INT32, [3], Dtype::FLOAT32, [1], &Device::cpu()).expect("map failed");
    map.insert(&keys, &values).expect("insert failed");

    c.bench_function("hashmap_find_100000", |b| b.iter(|| black_box(map.find(&keys).expect("find failed"))));
}

criterion_group!(benches, bench_insert, bench_find);
criterion_main!(benches);
