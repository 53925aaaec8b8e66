//! Benchmarks for routed map operations: local fast path against remote
//! dispatch over the loopback network.

use std::hint::black_box;

use atoll_map::UnorderedMap;
use atoll_rpc::{ComponentRegistry, LoopbackNetwork};
use atoll_types::{DistributionPolicy, LocalityId};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

type BenchMap = UnorderedMap<u64, u64>;

fn bench_map(rt: &Runtime, hosts: &[u32], partitions: usize) -> BenchMap {
    let network = LoopbackNetwork::new().into_shared();
    let registry = ComponentRegistry::new().with_partition::<u64, u64>();
    let localities = network.spawn_localities(3, registry);
    let policy = DistributionPolicy::new()
        .with_localities(hosts.iter().map(|&n| LocalityId::new(n)))
        .with_partitions(partitions);
    rt.block_on(BenchMap::create_with(
        localities[0].clone(),
        &policy,
        None,
        Default::default(),
    ))
    .unwrap()
}

fn bench_set_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let layouts: &[(&str, &[u32])] = &[("local", &[0]), ("remote", &[1, 2]), ("mixed", &[0, 1, 2])];

    let mut group = c.benchmark_group("set_get");
    group.throughput(Throughput::Elements(1));
    for &(name, hosts) in layouts {
        let map = bench_map(&rt, hosts, 6);
        group.bench_with_input(BenchmarkId::from_parameter(name), &map, |b, map| {
            let mut key = 0u64;
            b.iter(|| {
                key = key.wrapping_add(1);
                rt.block_on(async {
                    map.set_value(key, key).await.unwrap();
                    black_box(map.get_value(&key, false).await.unwrap());
                });
            });
        });
    }
    group.finish();
}

fn bench_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("size");
    for partitions in [3usize, 12, 48] {
        let map = bench_map(&rt, &[0, 1, 2], partitions);
        rt.block_on(async {
            for k in 0..1000u64 {
                map.set_value(k, k).await.unwrap();
            }
        });
        group.bench_with_input(BenchmarkId::from_parameter(partitions), &map, |b, map| {
            b.iter(|| rt.block_on(async { black_box(map.size().await.unwrap()) }));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_set_get, bench_size);
criterion_main!(benches);
