use ferrous_container::middleware::CacheMiddleware;
use ferrous_container::{
    Container, ContainerOptions, DiError, DiResult, Resolver, ServiceId, Symbol,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn bind_pair(container: &Container, lifetime_singleton: bool) {
    let a = |r: Resolver| async move { r.resolve::<u8>("b").await.map(|v| *v) };
    let b = |r: Resolver| async move { r.resolve::<u8>("a").await.map(|v| *v) };
    if lifetime_singleton {
        container.bind_singleton("a", a).bind_singleton("b", b);
    } else {
        container.bind_transient("a", a).bind_transient("b", b);
    }
}

fn names(path: &[ServiceId]) -> Vec<String> {
    path.iter().map(ServiceId::display_name).collect()
}

#[tokio::test]
async fn mutual_dependency_reports_full_path() {
    let container = Container::new();
    bind_pair(&container, false);

    match container.resolve::<u8>("a").await {
        Err(DiError::CircularResolution(path)) => {
            assert_eq!(names(&path), vec!["a", "b", "a"]);
        }
        other => panic!("expected circular resolution, got {:?}", other),
    }
}

#[tokio::test]
async fn error_message_lists_the_cycle() {
    let container = Container::new();
    bind_pair(&container, false);

    let err = container.resolve::<u8>("b").await.unwrap_err();
    assert_eq!(err.to_string(), "Circular resolution: 'b' -> 'a' -> 'b'");
    assert!(err.is_structural());
}

#[tokio::test]
async fn self_dependency_is_detected() {
    let container = Container::new();
    container.bind_transient("self", |r: Resolver| async move {
        r.resolve::<u8>("self").await.map(|v| *v)
    });

    assert!(matches!(
        container.resolve::<u8>("self").await,
        Err(DiError::CircularResolution(path)) if path.len() == 2
    ));
}

#[tokio::test]
async fn singleton_cycle_fails_instead_of_waiting() {
    let container = Container::new();
    bind_pair(&container, true);

    let result = tokio::time::timeout(Duration::from_secs(5), container.resolve::<u8>("a"))
        .await
        .expect("resolution must not hang");
    assert!(matches!(result, Err(DiError::CircularResolution(_))));

    // Nothing was published, so the bindings are still resolvable once fixed.
    container.bind_instance("b", 7u8);
    assert_eq!(*container.resolve::<u8>("a").await.unwrap(), 7);
}

#[tokio::test]
async fn cycle_through_cache_middleware_does_not_deadlock() {
    let container = Container::new();
    container.use_middleware(CacheMiddleware::new());
    bind_pair(&container, false);

    let result = tokio::time::timeout(Duration::from_secs(5), container.resolve::<u8>("a"))
        .await
        .expect("resolution must not hang");
    assert!(matches!(result, Err(DiError::CircularResolution(_))));
}

#[tokio::test]
async fn symbols_with_equal_descriptions_do_not_form_a_cycle() {
    let outer = Symbol::new("service");
    let inner = Symbol::new("service");

    let container = Container::new();
    let dependency = inner.clone();
    container
        .bind_transient(&outer, move |r: Resolver| {
            let dependency = dependency.clone();
            async move { r.resolve::<u8>(dependency).await.map(|v| *v + 1) }
        })
        .bind_instance(&inner, 1u8);

    assert_eq!(*container.resolve::<u8>(&outer).await.unwrap(), 2);
}

#[tokio::test]
async fn long_acyclic_chains_hit_the_depth_limit() {
    let container = Container::with_options(ContainerOptions { max_depth: 16 });
    for i in 0..32u32 {
        container.bind_transient(format!("link-{i}"), move |r: Resolver| async move {
            r.resolve::<u32>(format!("link-{}", i + 1)).await.map(|v| *v)
        });
    }
    container.bind_instance("link-32", 32u32);

    assert!(matches!(
        container.resolve::<u32>("link-0").await,
        Err(DiError::DepthExceeded(16))
    ));
    assert_eq!(*container.resolve::<u32>("link-20").await.unwrap(), 32);
}

fn bind_slow_pair(container: &Container, lifetime_singleton: bool) {
    let a = |r: Resolver| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        r.resolve::<u8>("b").await.map(|v| *v)
    };
    let b = |r: Resolver| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        r.resolve::<u8>("a").await.map(|v| *v)
    };
    if lifetime_singleton {
        container.bind_singleton("a", a).bind_singleton("b", b);
    } else {
        container.bind_transient("a", a).bind_transient("b", b);
    }
}

async fn resolve_both_ends(container: &Container) -> (DiResult<Arc<u8>>, DiResult<Arc<u8>>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(container.resolve::<u8>("a"), container.resolve::<u8>("b"))
    })
    .await
    .expect("resolutions from both ends of a cycle must not hang")
}

#[tokio::test]
async fn singleton_cycle_resolved_from_both_ends_fails() {
    let container = Container::new();
    bind_slow_pair(&container, true);

    let (a, b) = resolve_both_ends(&container).await;
    assert!(matches!(a, Err(DiError::CircularResolution(_))), "{a:?}");
    assert!(matches!(b, Err(DiError::CircularResolution(_))), "{b:?}");

    container.bind_instance("b", 7u8);
    assert_eq!(*container.resolve::<u8>("a").await.unwrap(), 7);
}

#[tokio::test]
async fn cached_cycle_resolved_from_both_ends_fails() {
    let cache = CacheMiddleware::new();
    let container = Container::new();
    container.use_middleware(cache.clone());
    bind_slow_pair(&container, false);

    let (a, b) = resolve_both_ends(&container).await;
    assert!(matches!(a, Err(DiError::CircularResolution(_))), "{a:?}");
    assert!(matches!(b, Err(DiError::CircularResolution(_))), "{b:?}");
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cycle_across_spawned_roots_fails() {
    let container = Container::new();
    bind_slow_pair(&container, true);

    let left = tokio::spawn({
        let container = container.clone();
        async move { container.resolve::<u8>("a").await }
    });
    let right = tokio::spawn({
        let container = container.clone();
        async move { container.resolve::<u8>("b").await }
    });

    let (left, right) = tokio::time::timeout(Duration::from_secs(5), async {
        (left.await.unwrap(), right.await.unwrap())
    })
    .await
    .expect("spawned resolutions must not hang");
    assert!(matches!(left, Err(DiError::CircularResolution(_))));
    assert!(matches!(right, Err(DiError::CircularResolution(_))));
}

#[tokio::test]
async fn concurrent_roots_sharing_a_dependency_are_not_a_cycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let container = Container::new();
    container
        .bind_singleton("pool", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(5u8)
            }
        })
        .bind_singleton("users", |r: Resolver| async move {
            r.resolve::<u8>("pool").await.map(|v| *v + 1)
        })
        .bind_singleton("orders", |r: Resolver| async move {
            r.resolve::<u8>("pool").await.map(|v| *v + 2)
        });

    let (users, orders) = tokio::join!(
        container.resolve::<u8>("users"),
        container.resolve::<u8>("orders")
    );
    assert_eq!(*users.unwrap(), 6);
    assert_eq!(*orders.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
