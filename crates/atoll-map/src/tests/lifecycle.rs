//! Registration, connection, duplication and rollback.

use std::time::Duration;

use atoll_rpc::RpcError;
use atoll_store::{MemoryPartition, PartitionStore};
use atoll_types::LocalityId;

use super::helpers::{StringMap, cluster, on, spread};
use crate::error::MapError;

async fn wait_until_unbound(locality: &atoll_rpc::Locality, name: &str) {
    for _ in 0..100 {
        if locality.resolve_name(name).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{name} is still bound");
}

#[tokio::test]
async fn test_register_then_connect_from_other_locality() {
    let (_net, localities) = cluster(3);
    let mut a = StringMap::create_with(localities[1].clone(), &spread(&localities, 6), None, Default::default())
        .await
        .unwrap();
    a.register_as("cluster_map").await.unwrap();
    assert_eq!(a.registered_name(), Some("cluster_map"));

    let b = StringMap::connect_to(localities[2].clone(), "cluster_map")
        .await
        .unwrap();
    assert_eq!(b.snapshot(), a.snapshot());
    assert_eq!(b.num_partitions(), a.num_partitions());
    assert_eq!(b.registered_name(), None);
    for part in 0..b.num_partitions() {
        assert_eq!(b.locality_of(part), a.locality_of(part));
        assert_eq!(b.is_local(part), b.locality_of(part) == LocalityId::new(2));
        assert_eq!(a.is_local(part), a.locality_of(part) == LocalityId::new(1));
    }

    a.set_value("shared".into(), 11).await.unwrap();
    assert_eq!(b.get_value(&"shared".into(), false).await.unwrap(), Some(11));
    b.erase(&"shared".into()).await.unwrap();
    assert_eq!(a.get_value(&"shared".into(), false).await.unwrap(), None);
}

#[tokio::test]
async fn test_connect_unknown_name() {
    let (_net, localities) = cluster(2);
    let err = StringMap::connect_to(localities[1].clone(), "nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, MapError::NameNotFound { ref name } if name == "nobody"));

    let mut map = StringMap::create(localities[1].clone()).await.unwrap();
    let before = map.snapshot();
    let err = map.connect("nobody").await.unwrap_err();
    assert!(matches!(err, MapError::NameNotFound { .. }));
    assert_eq!(map.snapshot(), before);
}

#[tokio::test]
async fn test_connect_replaces_manifest() {
    let (_net, localities) = cluster(2);
    let mut source = StringMap::create_with(localities[0].clone(), &on(&[0, 1], 4), None, Default::default())
        .await
        .unwrap();
    source.register_as("source").await.unwrap();
    source.set_value("k".into(), 5).await.unwrap();

    let mut other = StringMap::create(localities[1].clone()).await.unwrap();
    other.connect("source").await.unwrap();
    assert_eq!(other.num_partitions(), 4);
    assert_eq!(other.snapshot(), source.snapshot());
    assert_eq!(other.get_value(&"k".into(), false).await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let (_net, localities) = cluster(2);
    let mut first = StringMap::create(localities[0].clone()).await.unwrap();
    let mut second = StringMap::create(localities[1].clone()).await.unwrap();
    first.register_as("taken").await.unwrap();

    let err = second.register_as("taken").await.unwrap_err();
    assert!(matches!(err, MapError::Rpc(RpcError::AlreadyRegistered(_))));
    assert_eq!(second.registered_name(), None);
}

#[tokio::test]
async fn test_reregister_releases_previous_name() {
    let (_net, localities) = cluster(1);
    let mut map = StringMap::create(localities[0].clone()).await.unwrap();
    map.register_as("old").await.unwrap();
    map.register_as("new").await.unwrap();
    assert_eq!(map.registered_name(), Some("new"));
    assert!(localities[0].resolve_name("old").await.is_err());
    assert!(localities[0].resolve_name("new").await.is_ok());
}

#[tokio::test]
async fn test_drop_unregisters_on_root() {
    let (_net, localities) = cluster(2);
    let mut map = StringMap::create(localities[0].clone()).await.unwrap();
    map.register_as("short_lived").await.unwrap();
    drop(map);
    assert!(matches!(
        localities[1].resolve_name("short_lived").await,
        Err(RpcError::NameNotFound(_))
    ));
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn test_drop_unregisters_from_other_locality() {
    let (_net, localities) = cluster(3);
    let mut map = StringMap::create_with(localities[2].clone(), &spread(&localities, 3), None, Default::default())
        .await
        .unwrap();
    map.register_as("remote_owner").await.unwrap();
    drop(map);
    wait_until_unbound(&localities[0], "remote_owner").await;
}

#[tokio::test]
async fn test_drop_of_connected_map_keeps_name() {
    let (_net, localities) = cluster(2);
    let mut owner = StringMap::create(localities[0].clone()).await.unwrap();
    owner.register_as("kept").await.unwrap();
    let viewer = StringMap::connect_to(localities[1].clone(), "kept")
        .await
        .unwrap();
    drop(viewer);
    assert!(localities[1].resolve_name("kept").await.is_ok());
}

#[tokio::test]
async fn test_drop_swallows_unreachable_name_service() {
    let (net, localities) = cluster(2);
    let mut map = StringMap::create(localities[1].clone()).await.unwrap();
    map.register_as("orphan").await.unwrap();
    net.set_reachable(LocalityId::ROOT, false);
    drop(map);
    tokio::time::sleep(Duration::from_millis(20)).await;
    net.set_reachable(LocalityId::ROOT, true);
    assert!(localities[1].resolve_name("orphan").await.is_ok());
}

#[tokio::test]
async fn test_duplicate_is_independent() {
    let (_net, localities) = cluster(3);
    let mut a = StringMap::create_with(localities[0].clone(), &spread(&localities, 6), None, Default::default())
        .await
        .unwrap();
    a.register_as("original").await.unwrap();
    for i in 0..20u64 {
        a.set_value(format!("k{i}"), i).await.unwrap();
    }

    let b = a.duplicate().await.unwrap();
    assert_eq!(b.registered_name(), None);
    assert_eq!(b.num_partitions(), a.num_partitions());
    for part in 0..a.num_partitions() {
        assert_eq!(b.locality_of(part), a.locality_of(part));
        assert_ne!(b.shard_of(part), a.shard_of(part));
        assert_eq!(b.is_local(part), a.is_local(part));
    }
    assert_eq!(b.size().await.unwrap(), 20);

    b.set_value("k0".into(), 100).await.unwrap();
    b.erase(&"k1".into()).await.unwrap();
    b.set_value("extra".into(), 1).await.unwrap();
    a.erase(&"k2".into()).await.unwrap();

    assert_eq!(a.get_value(&"k0".into(), false).await.unwrap(), Some(0));
    assert_eq!(a.get_value(&"k1".into(), false).await.unwrap(), Some(1));
    assert_eq!(a.get_value(&"extra".into(), false).await.unwrap(), None);
    assert_eq!(b.get_value(&"k2".into(), false).await.unwrap(), Some(2));
    assert_eq!(a.size().await.unwrap(), 19);
    assert_eq!(b.size().await.unwrap(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_sync() {
    let (_net, localities) = cluster(2);
    let a = StringMap::create_with(localities[0].clone(), &on(&[0, 1], 2), None, Default::default())
        .await
        .unwrap();
    a.set_value_sync("k".into(), 1).unwrap();
    let b = a.duplicate_sync().unwrap();
    b.set_value_sync("k".into(), 2).unwrap();
    assert_eq!(a.value_of(&"k".into()).unwrap(), Some(1));
    assert_eq!(b.value_of(&"k".into()).unwrap(), Some(2));
}

#[tokio::test]
async fn test_clone_from_map_releases_own_name() {
    let (_net, localities) = cluster(2);
    let source = StringMap::create_with(localities[0].clone(), &on(&[0, 1], 2), None, Default::default())
        .await
        .unwrap();
    source.set_value("k".into(), 9).await.unwrap();

    let mut target = StringMap::create(localities[1].clone()).await.unwrap();
    target.register_as("target").await.unwrap();
    target.clone_from_map(&source).await.unwrap();

    assert_eq!(target.registered_name(), None);
    assert!(localities[0].resolve_name("target").await.is_err());
    assert_eq!(target.num_partitions(), 2);
    assert_eq!(target.get_value(&"k".into(), false).await.unwrap(), Some(9));

    target.set_value("k".into(), 10).await.unwrap();
    assert_eq!(source.get_value(&"k".into(), false).await.unwrap(), Some(9));
}

#[tokio::test]
async fn test_clone_from_map_attaches_copies_from_own_locality() {
    let (net, localities) = cluster(2);
    let source = StringMap::create_with(localities[0].clone(), &on(&[0, 1], 2), None, Default::default())
        .await
        .unwrap();
    let mut target = StringMap::create(localities[1].clone()).await.unwrap();
    target.clone_from_map(&source).await.unwrap();

    let here = localities[1].find_here();
    assert_eq!(target.num_partitions(), 2);
    for part in 0..target.num_partitions() {
        assert_eq!(
            target.is_local(part),
            target.locality_of(part) == here,
            "partition {part} on {}",
            target.locality_of(part)
        );
    }

    // Writes to the target's own partition take the fast path.
    let local = (0..2).find(|&p| target.is_local(p)).unwrap();
    let before = net.call_count();
    target.set_value_at(local, "mine".into(), 1).await.unwrap();
    assert_eq!(net.call_count(), before);
    let partition: std::sync::Arc<MemoryPartition<String, u64>> =
        localities[1].resolve_local(target.shard_of(local)).unwrap();
    assert_eq!(partition.size(), 1);
    assert_eq!(source.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_create_destroys_created_partitions() {
    let (net, localities) = cluster(3);
    net.set_reachable(LocalityId::new(2), false);

    let err = StringMap::create_with(localities[0].clone(), &spread(&localities, 6), None, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MapError::Rpc(RpcError::Unreachable(id)) if id == LocalityId::new(2)
    ));
    assert_eq!(localities[0].server().component_count(), 0);
    assert_eq!(localities[1].server().component_count(), 0);
}

#[tokio::test]
async fn test_failed_duplicate_destroys_copies() {
    let (net, localities) = cluster(3);
    let map = StringMap::create_with(localities[0].clone(), &spread(&localities, 3), None, Default::default())
        .await
        .unwrap();
    net.set_reachable(LocalityId::new(2), false);

    let err = map.duplicate().await.unwrap_err();
    assert!(matches!(err, MapError::Rpc(RpcError::Unreachable(_))));
    assert_eq!(localities[0].server().component_count(), 1);
    assert_eq!(localities[1].server().component_count(), 1);
}

#[tokio::test]
async fn test_failed_clone_from_map_keeps_target() {
    let (net, localities) = cluster(2);
    let source = StringMap::create_with(localities[0].clone(), &on(&[0, 1], 2), None, Default::default())
        .await
        .unwrap();
    let mut target = StringMap::create(localities[0].clone()).await.unwrap();
    target.register_as("stays").await.unwrap();
    target.set_value("mine".into(), 1).await.unwrap();
    net.set_reachable(LocalityId::new(1), false);

    assert!(target.clone_from_map(&source).await.is_err());
    assert_eq!(target.registered_name(), Some("stays"));
    assert_eq!(target.num_partitions(), 1);
    assert_eq!(target.get_value(&"mine".into(), false).await.unwrap(), Some(1));
}
