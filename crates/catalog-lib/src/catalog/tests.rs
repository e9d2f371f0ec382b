//! End-to-end tests for catalog assembly
//!
//! These drive the provider with an in-memory shape source, a static price
//! table and the real unavailability tracker.

use crate::catalog::InstanceTypeProvider;
use crate::config::{ImageFamily, KubeletConfig, NodeConfig, ProviderOptions};
use crate::fixtures::{prices_for, ShapeBuilder, StaticShapeSource, REGION};
use crate::models::{CapacityType, Shape, GIB, MIB};
use crate::offerings::{StaticPriceProvider, UnavailableOfferings};
use std::sync::Arc;

fn shapes() -> Vec<Shape> {
    vec![
        ShapeBuilder::general("Standard_D4s_v3", 4, 16.0).build(),
        ShapeBuilder::general("Standard_D2s_v3", 2, 8.0).build(),
        ShapeBuilder::general("Standard_E4s_v3", 4, 32.0)
            .zones(REGION, &[])
            .build(),
        // Filtered out before assembly
        ShapeBuilder::general("Standard_B1s", 1, 1.0).build(),
    ]
}

struct Harness {
    source: Arc<StaticShapeSource>,
    pricing: Arc<StaticPriceProvider>,
    unavailable: Arc<UnavailableOfferings>,
    provider: InstanceTypeProvider,
}

fn harness_with(shapes: Vec<Shape>) -> Harness {
    let pricing = Arc::new(prices_for(&shapes));
    let source = Arc::new(StaticShapeSource::new(shapes));
    let unavailable = Arc::new(UnavailableOfferings::new());
    let provider = InstanceTypeProvider::new(
        ProviderOptions::default(),
        source.clone(),
        pricing.clone(),
        unavailable.clone(),
    )
    .unwrap();

    Harness {
        source,
        pricing,
        unavailable,
        provider,
    }
}

fn harness() -> Harness {
    harness_with(shapes())
}

mod catalog_build_tests {
    use super::*;
    use crate::requirements::{FEATURE_FLAGS, LABEL_ZONE, WELL_KNOWN_LABELS};
    use crate::shapes::{keys, EphemeralPlacement};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_catalog_is_sorted_and_filtered() {
        let h = harness();
        let catalog = h.provider.list(&NodeConfig::default()).await.unwrap();

        let names: Vec<&str> = catalog.iter().map(|it| it.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Standard_D2s_v3", "Standard_D4s_v3", "Standard_E4s_v3"]
        );
    }

    #[tokio::test]
    async fn test_every_instance_type_carries_every_well_known_key() {
        let mut shapes = shapes();
        shapes.push(
            ShapeBuilder::general("Standard_NC24ads_A100_v4", 24, 220.0)
                .capability(keys::GPUS, "1")
                .build(),
        );
        let h = harness_with(shapes);
        let catalog = h.provider.list(&NodeConfig::default()).await.unwrap();
        assert_eq!(catalog.len(), 4);

        for instance_type in &catalog {
            for key in WELL_KNOWN_LABELS {
                assert!(
                    instance_type.requirements.contains_key(key),
                    "{} missing {}",
                    instance_type.name,
                    key
                );
            }
            for (_, key) in FEATURE_FLAGS {
                assert!(instance_type.requirements.contains_key(key));
            }
        }
    }

    #[tokio::test]
    async fn test_offerings_are_exclusive_per_zone_and_capacity_type() {
        let h = harness();
        let catalog = h.provider.list(&NodeConfig::default()).await.unwrap();

        for instance_type in &catalog {
            let pairs: HashSet<(String, CapacityType)> = instance_type
                .offerings
                .iter()
                .map(|o| (o.zone.clone(), o.capacity_type))
                .collect();
            assert_eq!(pairs.len(), instance_type.offerings.len());
        }

        let non_zonal = catalog
            .iter()
            .find(|it| it.name == "Standard_E4s_v3")
            .unwrap();
        assert_eq!(non_zonal.offerings.len(), 2);
        assert_eq!(non_zonal.offerings.zones(), vec![String::new()]);
        assert_eq!(non_zonal.requirements.values(LABEL_ZONE), vec![""]);
    }

    #[tokio::test]
    async fn test_capacity_and_overhead() {
        let h = harness();
        let node = NodeConfig {
            os_disk_size_gb: 64,
            ..Default::default()
        };
        let catalog = h.provider.list(&node).await.unwrap();
        let d2 = catalog
            .iter()
            .find(|it| it.name == "Standard_D2s_v3")
            .unwrap();

        assert_eq!(d2.capacity.cpu_millicores, 2000);
        assert_eq!(d2.capacity.ephemeral_storage_bytes, 64 * GIB);
        assert_eq!(d2.capacity.pods, 250);
        assert_eq!(d2.overhead.kube_reserved.cpu_millicores, 100);
        assert_eq!(d2.overhead.kube_reserved.memory_bytes, 1843 * MIB);
        assert!(!d2.os_disk.is_ephemeral());
        assert_eq!(
            d2.allocatable().cpu_millicores,
            d2.capacity.cpu_millicores - 100
        );
    }

    #[tokio::test]
    async fn test_shapes_without_prices_are_skipped() {
        let h = harness();
        let unpriced = ShapeBuilder::general("Standard_F8s_v2", 8, 16.0).build();
        h.source.set_shapes(vec![unpriced]);
        h.provider.shapes().refresh().await.unwrap();

        let catalog = h.provider.list(&NodeConfig::default()).await.unwrap();
        assert!(catalog.is_empty());

        h.pricing.set_on_demand("Standard_F8s_v2", 0.34);
        // Pricing is not part of the key; a new node class rebuilds
        let catalog = h
            .provider
            .list(&NodeConfig {
                os_disk_size_gb: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].offerings.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_shapes_are_skipped_not_fatal() {
        let mut shapes = shapes();
        shapes.push(ShapeBuilder::general("Experimental-Large", 8, 32.0).build());
        shapes.push(
            ShapeBuilder::general("Standard_D8s_v3", 8, 32.0)
                .architecture("")
                .build(),
        );
        let h = harness_with(shapes);

        let catalog = h.provider.list(&NodeConfig::default()).await.unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.iter().all(|it| it.name != "Experimental-Large"));
        assert!(catalog.iter().all(|it| it.name != "Standard_D8s_v3"));
    }

    #[tokio::test]
    async fn test_encryption_at_host_and_image_compatibility() {
        let mut shapes = shapes();
        shapes.push(
            ShapeBuilder::general("Standard_D8s_v3", 8, 32.0)
                .capability(keys::ENCRYPTION_AT_HOST, "False")
                .build(),
        );
        shapes.push(
            ShapeBuilder::general("Standard_D4ps_v5", 4, 16.0)
                .architecture("Arm64")
                .capability(keys::HYPERV_GENERATIONS, "V1")
                .build(),
        );
        let h = harness_with(shapes);

        let plain = h.provider.list(&NodeConfig::default()).await.unwrap();
        assert!(plain.iter().any(|it| it.name == "Standard_D8s_v3"));
        assert!(plain.iter().all(|it| it.name != "Standard_D4ps_v5"));

        let encrypted = h
            .provider
            .list(&NodeConfig {
                encryption_at_host: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(encrypted.iter().all(|it| it.name != "Standard_D8s_v3"));
        assert_eq!(encrypted.len(), 3);
    }

    #[tokio::test]
    async fn test_ephemeral_os_disk_plan() {
        let shape = ShapeBuilder::general("Standard_D8ds_v5", 8, 32.0)
            .capability(keys::EPHEMERAL_OS_DISK, "True")
            .capability(keys::MAX_RESOURCE_VOLUME_MB, &(300 * 1024).to_string())
            .build();
        let h = harness_with(vec![shape]);

        let fits = h.provider.list(&NodeConfig::default()).await.unwrap();
        assert_eq!(fits[0].os_disk.placement, EphemeralPlacement::ResourceDisk);
        assert_eq!(fits[0].os_disk.size_gb, 128);

        let too_big = h
            .provider
            .list(&NodeConfig {
                os_disk_size_gb: 512,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!too_big[0].os_disk.is_ephemeral());
        assert_eq!(too_big[0].os_disk.size_gb, 128);
        assert_eq!(too_big[0].capacity.ephemeral_storage_bytes, 128 * GIB);
    }

    #[tokio::test]
    async fn test_upstream_failure_and_lookup() {
        let h = harness();
        let shape = h.provider.get_shape("Standard_D4s_v3").await.unwrap();
        assert_eq!(shape.vcpus(), 4);

        let err = h.provider.get_shape("Standard_B1s").await.unwrap_err();
        assert!(err.is_not_found());

        h.source.set_failing(true);
        let err = h.provider.shapes().refresh().await.unwrap_err();
        assert!(!err.is_not_found());
    }
}

mod cache_tests {
    use super::*;
    use crate::offerings::PriceProvider;
    use crate::shapes::keys;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cache_key_sensitivity() {
        let h = harness();
        let base = NodeConfig::default();
        let key = h.provider.cache_key(1, &base).unwrap();

        assert_eq!(key, h.provider.cache_key(1, &NodeConfig::default()).unwrap());
        assert_ne!(key, h.provider.cache_key(2, &base).unwrap());

        let variants = vec![
            NodeConfig {
                image_family: ImageFamily::AzureLinux,
                ..Default::default()
            },
            NodeConfig {
                os_disk_size_gb: 64,
                ..Default::default()
            },
            NodeConfig {
                encryption_at_host: true,
                ..Default::default()
            },
            NodeConfig {
                kubelet: KubeletConfig {
                    max_pods: Some(30),
                    ..Default::default()
                },
                ..Default::default()
            },
            NodeConfig {
                kubelet: KubeletConfig {
                    pods_per_core: Some(10),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for variant in &variants {
            assert_ne!(key, h.provider.cache_key(1, variant).unwrap(), "{:?}", variant);
        }

        h.unavailable
            .mark_unavailable("Standard_D4s_v3", "westus2-1", CapacityType::Spot, "test");
        assert_ne!(key, h.provider.cache_key(1, &base).unwrap());
    }

    #[tokio::test]
    async fn test_hit_returns_equal_but_separate_lists() {
        let h = harness();
        let node = NodeConfig::default();

        let first = h.provider.list(&node).await.unwrap();
        let second = h.provider.list(&node).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.as_ptr(), second.as_ptr());
        // Served from cache: the records themselves are shared
        assert!(first
            .iter()
            .zip(second.iter())
            .all(|(a, b)| Arc::ptr_eq(a, b)));
    }

    #[tokio::test]
    async fn test_mutating_a_returned_list_does_not_leak() {
        let h = harness();
        let node = NodeConfig::default();

        let mut first = h.provider.list(&node).await.unwrap();
        let expected = first.clone();
        first.reverse();
        first.pop();

        let second = h.provider.list(&node).await.unwrap();
        assert_eq!(second, expected);
    }

    #[tokio::test]
    async fn test_unavailability_change_rebuilds() {
        let h = harness();
        let node = NodeConfig::default();

        let before = h.provider.list(&node).await.unwrap();
        assert!(before.iter().all(|it| it.offerings.iter().all(|o| o.available)));

        h.unavailable
            .mark_unavailable("Standard_D4s_v3", "westus2-1", CapacityType::Spot, "capacity");
        let after = h.provider.list(&node).await.unwrap();
        let d4 = after.iter().find(|it| it.name == "Standard_D4s_v3").unwrap();
        let unavailable: Vec<_> = d4.offerings.iter().filter(|o| !o.available).collect();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].zone, "westus2-1");
    }

    #[tokio::test]
    async fn test_node_class_change_does_not_refilter_shapes() {
        let h = harness();
        h.provider.list(&NodeConfig::default()).await.unwrap();
        h.provider
            .list(&NodeConfig {
                image_family: ImageFamily::AzureLinux,
                os_disk_size_gb: 64,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_shape_set_change_rebuilds() {
        let h = harness();
        let node = NodeConfig::default();
        let before = h.provider.list(&node).await.unwrap();

        let mut shapes = shapes();
        shapes.push(
            ShapeBuilder::general("Standard_D8s_v3", 8, 32.0)
                .capability(keys::PREMIUM_IO, "True")
                .build(),
        );
        h.pricing.set_on_demand("Standard_D8s_v3", 0.38);
        h.source.set_shapes(shapes);
        h.provider.shapes().refresh().await.unwrap();

        let after = h.provider.list(&node).await.unwrap();
        assert_eq!(after.len(), before.len() + 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_upstream_fetch() {
        let h = harness();
        let provider = Arc::new(h.provider);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider.list(&NodeConfig::default()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 3);
        }

        assert_eq!(h.source.calls(), 1);
    }

    /// Price table that counts lookups, one batch per catalog build
    struct CountingPrices {
        inner: StaticPriceProvider,
        lookups: AtomicUsize,
    }

    impl PriceProvider for CountingPrices {
        fn on_demand_price(&self, shape: &str) -> Option<f64> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.on_demand_price(shape)
        }

        fn spot_price(&self, shape: &str) -> Option<f64> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.spot_price(shape)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_build_once() {
        let shapes = shapes();
        let pricing = Arc::new(CountingPrices {
            inner: prices_for(&shapes),
            lookups: AtomicUsize::new(0),
        });
        let unavailable = Arc::new(UnavailableOfferings::new());
        let provider = Arc::new(
            InstanceTypeProvider::new(
                ProviderOptions::default(),
                Arc::new(StaticShapeSource::new(shapes)),
                pricing.clone(),
                unavailable.clone(),
            )
            .unwrap(),
        );
        let node = NodeConfig::default();

        provider.list(&node).await.unwrap();
        let per_build = pricing.lookups.load(Ordering::SeqCst);
        assert!(per_build > 0);

        // New key for every caller below
        unavailable.mark_unavailable("Standard_D4s_v3", "westus2-1", CapacityType::Spot, "test");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let provider = provider.clone();
            let node = node.clone();
            handles.push(tokio::spawn(async move { provider.list(&node).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 3);
        }

        assert_eq!(pricing.lookups.load(Ordering::SeqCst), 2 * per_build);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_entries() {
        let shapes = shapes();
        let pricing = Arc::new(prices_for(&shapes));
        let provider = InstanceTypeProvider::new(
            ProviderOptions {
                catalog_ttl_secs: 0,
                ..Default::default()
            },
            Arc::new(StaticShapeSource::new(shapes)),
            pricing,
            Arc::new(UnavailableOfferings::new()),
        )
        .unwrap();

        provider.list(&NodeConfig::default()).await.unwrap();
        assert_eq!(provider.sweep(), 1);
        assert_eq!(provider.sweep(), 0);
    }
}
