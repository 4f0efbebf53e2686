use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use pileup::{
    config::PileupConfig,
    core::Pileup,
    persist::{PileupStore, memory::MemoryStore, sqlite::SqliteStore},
    types::{Callsign, LookupInfo},
};

fn filled(store: Arc<dyn PileupStore>, size: usize, rt: &tokio::runtime::Runtime) -> (Pileup, Vec<Callsign>) {
    let config = PileupConfig {
        max_queue_size: size,
        ..PileupConfig::default()
    };
    let pileup = Pileup::new(store, &config);
    let calls: Vec<Callsign> = (0..size)
        .map(|i| Callsign::normalize(&format!("K{}A{}", i % 10, letters(i))))
        .collect();
    rt.block_on(async {
        pileup.status.set(true, "bench".into()).await.expect("activate");
        for call in &calls {
            pileup
                .queue
                .register(call.clone(), LookupInfo::default())
                .await
                .expect("register");
        }
    });
    (pileup, calls)
}

fn letters(mut n: usize) -> String {
    let mut out = String::new();
    for _ in 0..3 {
        out.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    out
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_list(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("queue_list");
    for size in [4usize, 64, 512] {
        let (memory, _) = filled(Arc::new(MemoryStore::new()), size, &rt);
        group.bench_with_input(BenchmarkId::new("memory", size), &size, |b, _| {
            b.iter(|| rt.block_on(memory.queue.list()).expect("list"));
        });
        let store = SqliteStore::open_in_memory().expect("sqlite");
        let (sqlite, _) = filled(Arc::new(store), size, &rt);
        group.bench_with_input(BenchmarkId::new("sqlite", size), &size, |b, _| {
            b.iter(|| rt.block_on(sqlite.queue.list()).expect("list"));
        });
    }
    group.finish();
}

fn bench_find_tail(c: &mut Criterion) {
    let rt = runtime();
    let (pileup, calls) = filled(Arc::new(MemoryStore::new()), 512, &rt);
    let tail = calls.last().cloned().expect("tail");
    c.bench_function("queue_find_tail_512", |b| {
        b.iter(|| rt.block_on(pileup.queue.find(&tail)).expect("find"));
    });
}

fn bench_register_advance(c: &mut Criterion) {
    let rt = runtime();
    c.bench_function("register_then_drain_64", |b| {
        b.iter(|| {
            let (pileup, _) = filled(Arc::new(MemoryStore::new()), 64, &rt);
            rt.block_on(async {
                while pileup.qso.advance("bench".into()).await.is_ok() {}
            });
        });
    });
}

criterion_group!(benches, bench_list, bench_find_tail, bench_register_advance);
criterion_main!(benches);
