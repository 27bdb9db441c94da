use ferrous_container::{
    CancellationToken, Container, DiError, DiResult, Injectable, Lifetime, Resolver, ServiceId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Database {
    url: String,
}

#[derive(Debug)]
struct UserService {
    db: Arc<Database>,
}

fn counting_container(lifetime: Lifetime) -> (Container, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let container = Container::new();
    container.bind("counted", lifetime, move |_| {
        let counter = Arc::clone(&counter);
        async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
    });
    (container, calls)
}

#[tokio::test]
async fn singleton_is_constructed_once() {
    let (container, calls) = counting_container(Lifetime::Singleton);

    let first = container.resolve::<usize>("counted").await.unwrap();
    let second = container.resolve::<usize>("counted").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_runs_factory_every_time() {
    let (container, calls) = counting_container(Lifetime::Transient);

    let first = container.resolve::<usize>("counted").await.unwrap();
    let second = container.resolve::<usize>("counted").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!((*first, *second), (0, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rebinding_invalidates_singleton() {
    let container = Container::new();
    container.bind_singleton("db", |_| async { Ok(Database { url: "old".into() }) });
    let old = container.resolve::<Database>("db").await.unwrap();

    container.bind_singleton("db", |_| async { Ok(Database { url: "new".into() }) });
    let new = container.resolve::<Database>("db").await.unwrap();

    assert_eq!(old.url, "old");
    assert_eq!(new.url, "new");
    assert_eq!(container.len(), 1);
}

#[tokio::test]
async fn factories_resolve_dependencies() {
    let container = Container::new();
    container
        .bind_instance("db", Database { url: "postgres://localhost".into() })
        .bind_transient("users", |r: Resolver| async move {
            Ok(UserService { db: r.resolve("db").await? })
        });

    let users = container.resolve::<UserService>("users").await.unwrap();
    let db = container.resolve::<Database>("db").await.unwrap();
    assert!(Arc::ptr_eq(&users.db, &db));
}

#[tokio::test]
async fn missing_binding_is_reported() {
    let container = Container::new();
    match container.resolve::<Database>("db").await {
        Err(DiError::BindingNotFound(id)) => assert_eq!(id, ServiceId::name("db")),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn try_resolve_only_hides_the_requested_id() {
    let container = Container::new();
    container.bind_transient("users", |r: Resolver| async move {
        Ok(UserService { db: r.resolve("db").await? })
    });

    assert!(container.try_resolve::<Database>("db").await.unwrap().is_none());
    assert!(matches!(
        container.try_resolve::<UserService>("users").await,
        Err(DiError::BindingNotFound(id)) if id == ServiceId::name("db")
    ));
}

#[tokio::test]
async fn factory_errors_reach_the_caller() {
    let container = Container::new();
    container.bind_transient::<Database, _, _>("db", |_| async {
        Err(DiError::failed("connection refused"))
    });

    let err = container.resolve::<Database>("db").await.unwrap_err();
    assert_eq!(err.to_string(), "connection refused");
}

#[tokio::test]
async fn failed_singleton_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let container = Container::new();
    container.bind_singleton("flaky", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(DiError::failed("first attempt fails")),
                n => Ok(n),
            }
        }
    });

    assert!(container.resolve::<usize>("flaky").await.is_err());
    assert_eq!(*container.resolve::<usize>("flaky").await.unwrap(), 1);
    assert_eq!(*container.resolve::<usize>("flaky").await.unwrap(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_resolves_share_one_construction() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let container = Container::new();
    container.bind_singleton("slow", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(String::from("ready"))
        }
    });

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve::<String>("slow").await })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn cancelled_singleton_publishes_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let container = Container::new();
    container.bind_singleton("blocking", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::future::pending::<()>().await;
            }
            Ok(String::from("built"))
        }
    });

    let token = CancellationToken::new();
    let pending = {
        let container = container.clone();
        let token = token.clone();
        tokio::spawn(async move { container.resolve_with_cancel::<String>("blocking", &token).await })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    token.cancel();

    assert!(matches!(pending.await.unwrap(), Err(DiError::Cancelled)));
    assert_eq!(*container.resolve::<String>("blocking").await.unwrap(), "built");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn already_cancelled_token_skips_resolution() {
    let (container, calls) = counting_container(Lifetime::Transient);
    let token = CancellationToken::new();
    token.cancel();

    assert!(matches!(
        container.resolve_with_cancel::<usize>("counted", &token).await,
        Err(DiError::Cancelled)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct Repository {
    db: Arc<Database>,
}

#[ferrous_container::async_trait]
impl Injectable for Repository {
    async fn inject(resolver: Resolver) -> DiResult<Self> {
        Ok(Repository {
            db: resolver.resolve("db").await?,
        })
    }
}

#[tokio::test]
async fn injectables_bind_under_their_type() {
    let container = Container::new();
    container
        .bind_instance("db", Database { url: "sqlite::memory:".into() })
        .register::<Repository>(Lifetime::Singleton);

    assert!(container.is_bound(ServiceId::of::<Repository>()));
    let first = container.get::<Repository>().await.unwrap();
    let second = container.resolver().get::<Repository>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.db.url, "sqlite::memory:");
}
