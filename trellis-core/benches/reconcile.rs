//! Reconciliation benchmarks
//!
//! Full passes through the scheduler into a `MemoryHost`: mounting keyed
//! lists, reordering them and updating a bound signal.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use trellis_core::{Element, MemoryHost, NodeId, Scheduler, Signal, View};

fn keyed_list(keys: impl IntoIterator<Item = usize>) -> View {
    keys.into_iter()
        .map(|key| Element::host("li").key(key).attr("data-key", key).child(key))
        .collect::<Vec<_>>()
        .into()
}

fn mounted(size: usize) -> (Scheduler<MemoryHost>, NodeId) {
    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    let root = scheduler.mount(container, keyed_list(0..size));
    scheduler.flush().expect("mount");
    (scheduler, root)
}

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount");
    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(mounted(size)));
        });
    }
    group.finish();
}

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_reorder");
    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("rotate", size), &size, |b, &size| {
            let (mut scheduler, root) = mounted(size);
            let mut shift = 0;
            b.iter(|| {
                shift = (shift + 1) % size;
                let order = (0..size).map(|i| (i + shift) % size);
                scheduler.render(root, keyed_list(order)).expect("render");
                scheduler.flush().expect("flush");
                scheduler.host_mut().take_ops();
            });
        });

        group.bench_with_input(BenchmarkId::new("reverse", size), &size, |b, &size| {
            let (mut scheduler, root) = mounted(size);
            let mut reversed = false;
            b.iter(|| {
                reversed = !reversed;
                let view = if reversed {
                    keyed_list((0..size).rev())
                } else {
                    keyed_list(0..size)
                };
                scheduler.render(root, view).expect("render");
                scheduler.flush().expect("flush");
                scheduler.host_mut().take_ops();
            });
        });
    }
    group.finish();
}

fn bench_bound_update(c: &mut Criterion) {
    let value = Signal::new(0i64);
    let mut scheduler = Scheduler::new(MemoryHost::new());
    let container = scheduler.host().root();
    scheduler.mount(
        container,
        Element::host("div").child(Element::host("span").child(value.clone())),
    );
    scheduler.flush().expect("mount");

    c.bench_function("bound_text_update", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            value.set(n);
            scheduler.flush().expect("flush");
            scheduler.host_mut().take_ops();
        });
    });
}

criterion_group!(benches, bench_mount, bench_reorder, bench_bound_update);
criterion_main!(benches);
