use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use ndarray::Array2;
use seizure_nn::prelude::*;

criterion_group!(benches, forward, train_step, train_step_batch, scale);
criterion_main!(benches);

fn forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward batch");
    group.throughput(criterion::Throughput::Elements(32));
    group.bench_function("mlp", forward_per_second);
}

fn train_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward and back");
    group.throughput(criterion::Throughput::Elements(1));
    group.bench_function("adam", |b| train_steps_per_second(b, 1));
}

fn train_step_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward and back batch");
    group.throughput(criterion::Throughput::Elements(32));
    group.bench_function("adam", |b| train_steps_per_second(b, 32));
}

fn scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaler");
    group.throughput(criterion::Throughput::Elements(500));
    group.bench_function("fit and transform", scaler_per_second);
}

fn signals(rows: usize) -> (Array2<f32>, Vec<usize>) {
    let x = Array2::from_shape_fn((rows, FEATURES), |(r, c)| ((r * 7 + c) % 31) as f32 - 15.);
    let y = (0..rows).map(|r| r % CLASSES).collect();
    (x, y)
}

fn network() -> Mlp {
    Mlp::new(&[FEATURES, 64, 32, CLASSES]).with_activation_hidden(Activation::Tanh)
}

fn forward_per_second(b: &mut Bencher) {
    let nn = network();
    let (x, _) = signals(32);
    b.iter(|| nn.forward(x.view()));
}

fn train_steps_per_second(b: &mut Bencher, batch: usize) {
    let mut nn = network();
    let mut opt = GradientDescent::new(OptimizerType::adam(), 0.001);
    let (x, y) = signals(batch);
    nn.set_training(true);
    b.iter(|| {
        opt.zero_grad(&mut nn);
        let loss = nn.backward(x.view(), &y, &Loss::SoftmaxAndCrossEntropy);
        opt.step(&mut nn);
        loss
    });
}

fn scaler_per_second(b: &mut Bencher) {
    let (x, _) = signals(500);
    b.iter(|| StandardScaler::fit(&x).and_then(|s| s.transform(&x)));
}
