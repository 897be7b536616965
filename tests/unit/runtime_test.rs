//! Tests for tokio spawner utilities

use pending_limiter::core::Spawn;
use pending_limiter::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_tokio_spawner_current() {
    let spawner = TokioSpawner::current();
    assert_eq!(
        spawner.handle().runtime_flavor(),
        tokio::runtime::RuntimeFlavor::CurrentThread
    );

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send("current").unwrap();
    });

    assert_eq!(rx.await.expect("oneshot result"), "current");
}

#[test]
fn test_tokio_spawner_owned_runtime() {
    let spawner = TokioSpawner::with_worker_threads(1).expect("runtime");

    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(async move {
        let name = std::thread::current().name().map(str::to_string);
        tx.send(name).unwrap();
    });

    let name = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("spawned task ran");
    assert_eq!(name.as_deref(), Some("pending-limiter"));
}
