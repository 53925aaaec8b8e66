//! Tests for the atoll-rpc crate.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atoll_store::{MemoryPartition, PartitionStore};
    use atoll_types::{LocalityId, ManifestEntry, ManifestSnapshot, ShardId};

    use crate::component::{ComponentRegistry, ShardComponent, partition_type_name};
    use crate::error::RpcError;
    use crate::locality::Locality;
    use crate::loopback::LoopbackNetwork;
    use crate::message::{Request, Response, decode_frame, encode_frame, from_wire, to_wire};

    type Partition = MemoryPartition<String, u64>;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new().with_partition::<String, u64>()
    }

    fn cluster(n: u32) -> (Arc<LoopbackNetwork>, Vec<Arc<Locality>>) {
        let network = LoopbackNetwork::new().into_shared();
        let localities = network.spawn_localities(n, registry());
        (network, localities)
    }

    fn type_name() -> String {
        partition_type_name::<String, u64>()
    }

    fn key(k: &str) -> Vec<u8> {
        to_wire(k).unwrap()
    }

    #[test]
    fn test_request_roundtrip_postcard() {
        let requests = vec![
            Request::BulkCreate {
                type_name: "t".into(),
                count: 3,
                bucket_count: Some(16),
            },
            Request::GetValue {
                shard_id: ShardId::from_data(b"s"),
                key: vec![1, 2, 3],
                erase: true,
            },
            Request::Size {
                shard_ids: vec![ShardId::from_data(b"a"), ShardId::from_data(b"b")],
            },
            Request::UnregisterName { name: "m".into() },
        ];
        for request in requests {
            let frame = encode_frame(&request).unwrap();
            let decoded: Request = decode_frame(&frame).unwrap();
            assert_eq!(request, decoded);
        }
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = decode_frame::<Response>(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, RpcError::Serialization(_)));
    }

    #[test]
    fn test_registry_unknown_type() {
        let err = ComponentRegistry::new().construct("nope", 0).err().unwrap();
        assert_eq!(err, RpcError::UnknownComponentType("nope".into()));
        assert!(registry().contains(&type_name()));
        assert_eq!(registry().type_names(), vec![type_name()]);
    }

    #[test]
    fn test_root_hosts_name_service() {
        let (_net, localities) = cluster(2);
        assert!(localities[0].server().hosts_names());
        assert!(!localities[1].server().hosts_names());
    }

    #[tokio::test]
    async fn test_find_all_localities_sorted() {
        let (_net, localities) = cluster(3);
        let all = localities[2].find_all_localities();
        assert_eq!(
            all,
            vec![LocalityId::new(0), LocalityId::new(1), LocalityId::new(2)]
        );
        assert_eq!(localities[2].find_here(), LocalityId::new(2));
    }

    #[tokio::test]
    async fn test_bulk_create_remote_and_access() {
        let (net, localities) = cluster(2);
        let here = &localities[0];
        let there = LocalityId::new(1);

        let ids = here
            .bulk_create(there, &type_name(), 3, Some(64))
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(localities[1].server().component_count(), 3);
        assert_eq!(localities[0].server().component_count(), 0);

        here.set_value(there, ids[0], key("a"), to_wire(&7u64).unwrap())
            .await
            .unwrap();
        let got = here.get_value(there, ids[0], key("a"), false).await.unwrap();
        assert_eq!(from_wire::<u64>(&got.unwrap()).unwrap(), 7);

        assert_eq!(here.size_of(there, ids.clone()).await.unwrap(), 1);
        assert_eq!(here.erase(there, ids[0], key("a")).await.unwrap(), 1);
        assert_eq!(here.erase(there, ids[0], key("a")).await.unwrap(), 0);
        assert!(net.call_count() >= 6);
    }

    #[tokio::test]
    async fn test_local_invoke_skips_transport() {
        let (net, localities) = cluster(2);
        let here = &localities[0];
        let ids = here
            .bulk_create(here.find_here(), &type_name(), 2, None)
            .await
            .unwrap();
        here.set_value(here.find_here(), ids[1], key("x"), to_wire(&1u64).unwrap())
            .await
            .unwrap();
        assert_eq!(net.call_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_local_downcasts() {
        let (_net, localities) = cluster(1);
        let here = &localities[0];
        let ids = here
            .bulk_create(here.find_here(), &type_name(), 1, None)
            .await
            .unwrap();

        let partition: Arc<Partition> = here.resolve_local(ids[0]).unwrap();
        partition.set_value("direct".into(), 5).unwrap();
        let got = here
            .get_value(here.find_here(), ids[0], key("direct"), false)
            .await
            .unwrap();
        assert_eq!(from_wire::<u64>(&got.unwrap()).unwrap(), 5);

        let wrong = here.resolve_local::<MemoryPartition<u32, u32>>(ids[0]);
        assert_eq!(wrong.err(), Some(RpcError::TypeMismatch(ids[0])));

        let missing = ShardId::from_data(b"missing");
        assert_eq!(
            here.resolve_local::<Partition>(missing).err(),
            Some(RpcError::ShardNotFound(missing))
        );
    }

    #[tokio::test]
    async fn test_copy_is_independent() {
        let (_net, localities) = cluster(2);
        let here = &localities[0];
        let there = LocalityId::new(1);
        let ids = here.bulk_create(there, &type_name(), 1, None).await.unwrap();
        here.set_value(there, ids[0], key("a"), to_wire(&1u64).unwrap())
            .await
            .unwrap();

        let copy = here.copy_component(there, ids[0]).await.unwrap();
        assert_ne!(copy, ids[0]);
        here.erase(there, ids[0], key("a")).await.unwrap();

        assert_eq!(here.size_of(there, vec![ids[0]]).await.unwrap(), 0);
        assert_eq!(here.size_of(there, vec![copy]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_destroy_then_access_fails() {
        let (_net, localities) = cluster(2);
        let here = &localities[0];
        let there = LocalityId::new(1);
        let ids = here.bulk_create(there, &type_name(), 1, None).await.unwrap();
        here.destroy_component(there, ids[0]).await.unwrap();

        let err = here
            .get_value(there, ids[0], key("a"), false)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::ShardNotFound(ids[0]));
        // Destroying twice is tolerated.
        here.destroy_component(there, ids[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_type_over_the_wire() {
        let (_net, localities) = cluster(2);
        let err = localities[0]
            .bulk_create(LocalityId::new(1), "not-registered", 1, None)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::UnknownComponentType("not-registered".into()));
    }

    #[tokio::test]
    async fn test_capacity_error_crosses_the_wire() {
        let network = LoopbackNetwork::new().into_shared();
        let mut registry = ComponentRegistry::new();
        registry.register(
            "bounded",
            Arc::new(|_: usize| {
                Arc::new(Partition::new().with_max_entries(1)) as Arc<dyn ShardComponent>
            }),
        );
        let localities = network.spawn_localities(2, registry);
        let there = LocalityId::new(1);
        let ids = localities[0]
            .bulk_create(there, "bounded", 1, None)
            .await
            .unwrap();
        localities[0]
            .set_value(there, ids[0], key("a"), to_wire(&1u64).unwrap())
            .await
            .unwrap();
        let err = localities[0]
            .set_value(there, ids[0], key("b"), to_wire(&2u64).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Store(atoll_store::StoreError::CapacityExceeded { limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_name_service_lifecycle() {
        let (_net, localities) = cluster(3);
        let client = &localities[2];
        let snapshot = ManifestSnapshot::new(vec![ManifestEntry {
            shard_id: ShardId::from_data(b"p0"),
            locality: LocalityId::new(1),
        }]);

        client.register_name("m", snapshot.clone()).await.unwrap();
        assert_eq!(
            client.register_name("m", snapshot.clone()).await.unwrap_err(),
            RpcError::AlreadyRegistered("m".into())
        );
        assert_eq!(localities[1].resolve_name("m").await.unwrap(), snapshot);

        client.unregister_name("m").await.unwrap();
        client.unregister_name("m").await.unwrap();
        assert_eq!(
            client.resolve_name("m").await.unwrap_err(),
            RpcError::NameNotFound("m".into())
        );
    }

    #[tokio::test]
    async fn test_name_request_to_non_root_rejected() {
        let (_net, localities) = cluster(2);
        let err = localities[0]
            .invoke(
                LocalityId::new(1),
                Request::ResolveName { name: "m".into() },
            )
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::NotRoot(LocalityId::new(1)));
    }

    #[tokio::test]
    async fn test_unreachable_locality() {
        let (net, localities) = cluster(2);
        let there = LocalityId::new(1);
        net.set_reachable(there, false);
        let err = localities[0]
            .bulk_create(there, &type_name(), 1, None)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Unreachable(there));

        net.set_reachable(there, true);
        assert!(
            localities[0]
                .bulk_create(there, &type_name(), 1, None)
                .await
                .is_ok()
        );
        let err = localities[0]
            .size_of(LocalityId::new(9), vec![])
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Unreachable(LocalityId::new(9)));
    }

    #[tokio::test]
    #[ntest::timeout(10000)]
    async fn test_latency_is_applied() {
        let network = LoopbackNetwork::new().latency(20, 20).seed(7).into_shared();
        let localities = network.spawn_localities(2, registry());
        let start = std::time::Instant::now();
        localities[0]
            .bulk_create(LocalityId::new(1), &type_name(), 1, None)
            .await
            .unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(20));
    }
}
