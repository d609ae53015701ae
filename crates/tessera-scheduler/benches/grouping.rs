//! Grouping benchmarks

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_crypto::Signature;
use tessera_primitives::{Address, Nonce};
use tessera_scheduler::{AccountResourceDetector, ConflictGrouper, GroupStrategy, GrouperConfig};
use tessera_types::{SignedTransaction, Transaction};

/// `count` transfers over `accounts` accounts; every tenth one touches a
/// hot account
fn workload(count: u64, accounts: u64) -> Vec<SignedTransaction> {
    let mut next: HashMap<u64, Nonce> = HashMap::new();
    (0..count)
        .map(|i| {
            let from = (i * 7919) % accounts;
            let to = if i % 10 == 0 { 0 } else { (i * 104_729 + 1) % accounts };
            let nonce = next.entry(from).or_insert(0);
            let tx = Transaction::new(Address::from_low_u64(from), *nonce, Address::from_low_u64(to), "transfer");
            *nonce += 1;
            SignedTransaction::new(tx, Signature::default())
        })
        .collect()
}

fn grouper(strategy: GroupStrategy) -> ConflictGrouper {
    ConflictGrouper::new(
        Arc::new(AccountResourceDetector),
        GrouperConfig {
            strategy,
            core_count: 8,
        },
    )
    .unwrap()
}

fn bench_group_connected(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_connected");
    let grouper = grouper(GroupStrategy::Naive);
    for count in [1_000u64, 10_000] {
        let txs = workload(count, count / 2);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &txs, |b, txs| {
            b.iter(|| grouper.group_connected(black_box(txs.clone())))
        });
    }
    group.finish();
}

fn bench_schedule_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_round");
    let txs = workload(10_000, 5_000);
    group.throughput(Throughput::Elements(txs.len() as u64));
    for strategy in [GroupStrategy::Naive, GroupStrategy::MaxAddMins, GroupStrategy::MinsAddUp] {
        let grouper = grouper(strategy);
        group.bench_with_input(BenchmarkId::new("strategy", format!("{strategy:?}")), &txs, |b, txs| {
            b.iter(|| grouper.schedule_round(black_box(txs.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_group_connected, bench_schedule_round);
criterion_main!(benches);
