use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use feedfwd_core::{ops, Activation, Device, Network, DEFAULT_BLOCK_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn benchmark_feedforward(c: &mut Criterion) {
    let mut group = c.benchmark_group("feedforward");

    // (input units, hidden units, output units, batch size)
    for &(d, h, k, m) in [(4, 8, 2, 16), (64, 128, 10, 256), (784, 256, 10, 1_024)].iter() {
        let size_dims = [d, h, h, k];
        let mut rng = StdRng::seed_from_u64(0);
        let params: Vec<(Vec<f32>, Vec<f32>)> = size_dims
            .windows(2)
            .map(|dims| (random_vec(&mut rng, dims[0] * dims[1]), random_vec(&mut rng, dims[1])))
            .collect();
        let x = random_vec(&mut rng, d * m);

        let device = Device::new().unwrap();
        let mut network = Network::new(
            device,
            &size_dims,
            &[Activation::Relu, Activation::Tanh, Activation::Softmax],
        )
        .unwrap();
        network.load_params(&params).unwrap();
        network.load_input(&x, m).unwrap();

        group.throughput(Throughput::Elements((k * m) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{d}x{h}x{h}x{k}/m{m}")),
            &m,
            |b, _| {
                b.iter(|| {
                    network.feedforward(DEFAULT_BLOCK_SIZE).unwrap();
                    black_box(network.state());
                });
            },
        );
    }

    group.finish();
}

fn benchmark_set_const_val(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_const_val");
    let device = Device::new().unwrap();

    for size in [1_000, 100_000, 1_000_000].iter() {
        let mut out = device.allocate::<f32>(*size).unwrap();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &n| {
            b.iter(|| {
                ops::memory::set_const_val(&device, n, 1.0, &mut out, DEFAULT_BLOCK_SIZE).unwrap();
                black_box(out.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_feedforward, benchmark_set_const_val);
criterion_main!(benches);
