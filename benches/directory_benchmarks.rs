use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use imaging_hub::identity::Role;
use imaging_hub::modules::directory::cache::TtlCache;
use imaging_hub::modules::directory::models::ImageRecord;
use imaging_hub::modules::directory::TenantDirectory;
use imaging_hub::realtime::{ConnectionHandle, ConnectionRegistry};
use imaging_hub::store::MemoryStore;

fn directory() -> TenantDirectory {
    let store = Arc::new(MemoryStore::new());
    for h in 0..50 {
        store.add_hospital(&format!("h{}", h), Some(&format!("http://pacs-h{}:8042", h)));
        store.add_user(&format!("doc-{}", h), Role::Doctor, Some(&format!("h{}", h)));
    }
    for i in 0..1_000 {
        store.add_image(ImageRecord {
            id: format!("img-{}", i),
            owner_hospital_id: format!("h{}", i % 50),
            archive_native_id: format!("native-{}", i),
            medical_record_id: None,
            description: None,
        });
    }
    TenantDirectory::new(store.clone(), store, None, Duration::from_secs(300))
}

fn benchmark_resolve_endpoint(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let dir = directory();
    // 预热缓存 / Warm the cache
    rt.block_on(async {
        for i in 0..1_000 {
            let _ = dir.resolve_endpoint(Some("doc-1"), Some(&format!("img-{}", i))).await;
        }
    });

    c.bench_function("resolve_endpoint_image_cache_hit", |b| {
        b.iter(|| rt.block_on(dir.resolve_endpoint(black_box(Some("doc-1")), black_box(Some("img-42")))))
    });

    c.bench_function("resolve_endpoint_acting_doctor_cache_hit", |b| {
        b.iter(|| rt.block_on(dir.resolve_endpoint(black_box(Some("doc-7")), black_box(None))))
    });
}

fn benchmark_ttl_cache(c: &mut Criterion) {
    let cache = TtlCache::new(Duration::from_secs(300));
    for i in 0..10_000 {
        cache.insert(&format!("k{}", i), format!("v{}", i));
    }
    c.bench_function("ttl_cache_get_hit", |b| b.iter(|| cache.get(black_box("k5000"))));
    c.bench_function("ttl_cache_get_miss", |b| b.iter(|| cache.get(black_box("absent"))));
}

fn benchmark_fan_out(c: &mut Criterion) {
    for connections in [1usize, 4, 16] {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for n in 0..connections {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.join("doc-b", ConnectionHandle::new(format!("c{}", n), tx));
            receivers.push(rx);
        }
        let data = json!({ "id": "n-1", "title": "Medical image shared with you" });
        c.bench_function(&format!("publish_fan_out_{}_connections", connections), |b| {
            b.iter(|| {
                let delivered = registry.publish(black_box("doc-b"), "notification", &data);
                for rx in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
                delivered
            })
        });
    }
}

criterion_group!(benches, benchmark_resolve_endpoint, benchmark_ttl_cache, benchmark_fan_out);
criterion_main!(benches);
