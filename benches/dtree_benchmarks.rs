use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dtree::config::{GrowConfig, PruneConfig};
use dtree::data::{Attribute, AttributeSet, Table, Value};
use dtree::measure::Measure;
use dtree::{grow, prune};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

fn synthetic_table(rows: usize) -> Table {
    let attributes = Arc::new(
        AttributeSet::from_attributes(vec![
            Attribute::nominal("a", &["a0", "a1", "a2", "a3", "a4"]),
            Attribute::nominal("b", &["b0", "b1", "b2"]),
            Attribute::continuous("x"),
            Attribute::continuous("z"),
            Attribute::integer("n"),
            Attribute::nominal("class", &["c0", "c1", "c2"]),
            Attribute::continuous("y"),
        ])
        .unwrap(),
    );
    let mut rng = StdRng::seed_from_u64(0);
    let mut table = Table::new(attributes);
    for _ in 0..rows {
        let a = rng.gen_range(0..5);
        let b = rng.gen_range(0..3);
        let x: f64 = rng.gen();
        let z: f64 = rng.gen();
        let n: i64 = rng.gen_range(0..20);
        let class = if (a < 2 && x < 0.4) || rng.gen::<f64>() < 0.1 {
            0
        } else if b == 1 || z > 0.7 {
            1
        } else {
            2
        };
        let y = 2.0 * x + a as f64 - z + rng.gen_range(-0.3..0.3);
        let mut values = vec![
            Value::Nominal(a),
            Value::Nominal(b),
            Value::Real(x),
            Value::Real(z),
            Value::Integer(n),
            Value::Nominal(class),
            Value::Real(y),
        ];
        for v in values.iter_mut() {
            if rng.gen::<f64>() < 0.05 {
                *v = Value::Missing;
            }
        }
        table.push(values).unwrap();
    }
    table
}

pub fn tree_benchmarks(c: &mut Criterion) {
    let table = synthetic_table(20_000);
    let mut rng = StdRng::seed_from_u64(1);
    let (train, holdout) = table.split(0.7, &mut rng).unwrap();

    let config = GrowConfig::default().set_min_branch(2.0);
    c.bench_function("grow infgain", |b| {
        b.iter(|| grow(black_box(&train), 5, black_box(&config)).unwrap())
    });
    let subset = GrowConfig::default().set_measure(Measure::Gini).set_subset(true);
    c.bench_function("grow gini subsets", |b| {
        b.iter(|| grow(black_box(&train), 5, black_box(&subset)).unwrap())
    });
    let regression = GrowConfig::default().set_measure(Measure::SseReduction);
    c.bench_function("grow sse", |b| {
        b.iter(|| grow(black_box(&train), 6, black_box(&regression)).unwrap())
    });

    let tree = grow(&train, 5, &config).unwrap();
    c.bench_function("prune confidence", |b| {
        b.iter(|| {
            let mut t = tree.clone();
            prune(&mut t, black_box(&PruneConfig::default()), None).unwrap();
            t
        })
    });
    let largest = PruneConfig::default().set_check_largest(true);
    c.bench_function("prune holdout", |b| {
        b.iter(|| {
            let mut t = tree.clone();
            prune(&mut t, black_box(&largest), Some(&holdout)).unwrap();
            t
        })
    });
    c.bench_function("classify holdout", |b| {
        b.iter(|| tree.predict(black_box(&holdout), 1.0).unwrap())
    });

    let mut group = c.benchmark_group("grow_large");
    group.warm_up_time(Duration::from_secs(5));
    group.sample_size(10);
    let large = synthetic_table(200_000);
    group.bench_function("grow infgain 200k", |b| {
        b.iter(|| grow(black_box(&large), 5, black_box(&config)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, tree_benchmarks);
criterion_main!(benches);
