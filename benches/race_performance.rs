use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gallop::program::{build_program, generate_pool};
use gallop::simulation::{RaceAnimator, compute_outcome, rank_field, sample_speeds};
use std::ops::ControlFlow;
use std::time::Duration;

fn bench_outcome(c: &mut Criterion) {
    let mut group = c.benchmark_group("outcome");
    let pool = generate_pool(20).unwrap();
    let program = build_program(&pool).unwrap();
    let race = &program[5];

    group.bench_function("compute_outcome", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| black_box(compute_outcome(black_box(race), &mut rng)));
    });

    group.bench_function("rank_field", |b| {
        let speeds = sample_speeds(race, &mut rand::thread_rng());
        b.iter(|| black_box(rank_field(black_box(race), black_box(&speeds))));
    });

    group.bench_function("build_program", |b| {
        b.iter(|| black_box(build_program(black_box(&pool)).unwrap()));
    });

    group.finish();
}

fn bench_animation(c: &mut Criterion) {
    let mut group = c.benchmark_group("animation");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let pool = generate_pool(20).unwrap();
    let race = build_program(&pool).unwrap().remove(0);
    let animator = RaceAnimator::new(Duration::from_millis(1), 1.5);

    group.bench_function("animate_short_race", |b| {
        b.to_async(&runtime).iter(|| async {
            let run = animator
                .animate(&race, Duration::from_millis(20), |positions| {
                    black_box(positions);
                    ControlFlow::Continue(())
                })
                .await;
            black_box(run)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_outcome, bench_animation);
criterion_main!(benches);
