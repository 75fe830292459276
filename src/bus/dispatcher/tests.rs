use super::*;
use crate::bus::listener_fn;
use crate::test_utils::{make_message, CountingListener};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration, Instant};

fn noop() -> Arc<dyn Listener> {
    listener_fn(|_| async {})
}

async fn expect_deliveries(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Arc<Message>>,
    n: usize,
) {
    for _ in 0..n {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
    }
}

async fn expect_silence(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Arc<Message>>) {
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delivery_from_concurrent_senders() {
    let d = Arc::new(Dispatcher::new());
    let (listener, mut rx) = CountingListener::new();
    d.register(listener.clone());

    let mut senders = Vec::new();
    for i in 0..6 {
        let d = Arc::clone(&d);
        senders.push(tokio::spawn(async move {
            d.send(make_message("shop+sale://a", &format!("m{}", i)))
        }));
    }
    for s in senders {
        assert_eq!(s.await.unwrap(), 1);
    }

    expect_deliveries(&mut rx, 6).await;
    expect_silence(&mut rx).await;
    assert_eq!(listener.count(), 6);
}

#[tokio::test]
async fn test_no_delivery_after_unregister() {
    let d = Dispatcher::new();
    let (listener, mut rx) = CountingListener::new();
    let handle = d.register(listener.clone());

    d.send(make_message("shop+sale://a", "before"));
    expect_deliveries(&mut rx, 1).await;

    assert!(d.unregister(handle));
    assert_eq!(d.send(make_message("shop+sale://a", "after")), 0);
    expect_silence(&mut rx).await;
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_zero_unregister() {
    let d = Dispatcher::new();
    let handle = d.register(noop());
    assert!(d.unregister(handle));
    assert_eq!(d.count(), 0);

    // Second removal is a no-op
    assert!(!d.unregister(handle));
    assert_eq!(d.count(), 0);
}

#[test]
fn test_simple_registration() {
    let d = Dispatcher::new();
    let handle = d.register(noop());
    assert_eq!(d.count(), 1);
    d.unregister(handle);
    assert_eq!(d.count(), 0);
}

#[test]
fn test_double_registration_gives_independent_handles() {
    let d = Dispatcher::new();
    let listener = noop();
    let h1 = d.register(Arc::clone(&listener));
    let h2 = d.register(Arc::clone(&listener));
    assert_ne!(h1, h2);
    assert_eq!(d.count(), 2);

    assert!(d.unregister(h1));
    assert_eq!(d.count(), 1);
    assert!(d.unregister(h2));
    assert_eq!(d.count(), 0);
}

#[tokio::test]
async fn test_double_registration_delivers_twice() {
    let d = Dispatcher::new();
    let (listener, mut rx) = CountingListener::new();
    let h1 = d.register(listener.clone());
    d.register(listener.clone());

    assert_eq!(d.send(make_message("shop+sale://a", "x")), 2);
    expect_deliveries(&mut rx, 2).await;

    d.unregister(h1);
    assert_eq!(d.send(make_message("shop+sale://a", "y")), 1);
    expect_deliveries(&mut rx, 1).await;
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn test_unregister_first_middle_last() {
    for victim in 0..3 {
        let d = Dispatcher::new();
        let mut listeners = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let (listener, rx) = CountingListener::new();
            handles.push(d.register(listener.clone()));
            listeners.push((listener, rx));
        }
        assert_eq!(d.count(), 3);

        d.unregister(handles[victim]);
        assert_eq!(d.count(), 2);

        d.send(make_message("shop+sale://a", "x"));
        for (i, (listener, rx)) in listeners.iter_mut().enumerate() {
            if i == victim {
                expect_silence(rx).await;
                assert_eq!(listener.count(), 0);
            } else {
                expect_deliveries(rx, 1).await;
            }
        }
    }
}

#[test]
fn test_stats_track_registry_size() {
    let stats = Arc::new(RuntimeStatistics::new());
    let d = Dispatcher::with_stats(Arc::clone(&stats));
    let h1 = d.register(noop());
    d.register(noop());
    assert_eq!(stats.snapshot().active_listeners, 2);
    d.unregister(h1);
    assert_eq!(stats.snapshot().active_listeners, 1);
}

#[test]
fn test_send_outside_runtime_is_dropped() {
    let d = Dispatcher::new();
    d.register(noop());
    assert_eq!(d.send(make_message("shop+sale://a", "x")), 0);
}

#[tokio::test]
async fn test_send_without_listeners() {
    let d = Dispatcher::new();
    assert_eq!(d.send(make_message("shop+sale://a", "x")), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_unregister_send() {
    let d = Arc::new(Dispatcher::new());
    let delivered = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let d = Arc::clone(&d);
        let delivered = Arc::clone(&delivered);
        tasks.push(tokio::spawn(async move {
            let mut targeted = 0;
            for _ in 0..50 {
                let delivered = Arc::clone(&delivered);
                let handle = d.register(listener_fn(move |_| {
                    let delivered = Arc::clone(&delivered);
                    async move {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                }));
                targeted += d.send(make_message("shop+sale://a", "x"));
                tokio::task::yield_now().await;
                assert!(d.unregister(handle));
            }
            targeted
        }));
    }
    let mut targeted = 0;
    for t in tasks {
        targeted += t.await.unwrap();
    }

    assert_eq!(d.count(), 0);
    assert_eq!(d.stats().snapshot().active_listeners, 0);

    // Every targeted listener runs, even if it was unregistered meanwhile
    assert!(targeted >= 16 * 50);
    timeout(Duration::from_secs(2), async {
        while delivered.load(Ordering::Relaxed) < targeted {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("deliveries did not complete");
    assert_eq!(delivered.load(Ordering::Relaxed), targeted);
}

/// Does its work synchronously, before returning a future.
struct BlockingListener {
    done: mpsc::UnboundedSender<()>,
}

impl Listener for BlockingListener {
    fn on_message(&self, _message: Arc<Message>) -> BoxFuture<'static, ()> {
        std::thread::sleep(Duration::from_millis(300));
        let _ = self.done.send(());
        Box::pin(async {})
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_not_blocked_by_synchronous_listener() {
    let d = Dispatcher::new();
    let (done, mut done_rx) = mpsc::unbounded_channel();
    d.register(Arc::new(BlockingListener { done }));

    let started = Instant::now();
    assert_eq!(d.send(make_message("shop+sale://a", "x")), 1);
    assert!(started.elapsed() < Duration::from_millis(100));

    timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .expect("listener never ran")
        .expect("channel closed");
}

#[tokio::test]
async fn test_send_defers_delivery_to_spawned_task() {
    let d = Dispatcher::new();
    let (listener, mut rx) = CountingListener::new();
    d.register(listener.clone());

    // Current-thread runtime: nothing runs until this task yields
    d.send(make_message("shop+sale://a", "x"));
    assert_eq!(listener.count(), 0);

    expect_deliveries(&mut rx, 1).await;
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_handle_display() {
    let d = Dispatcher::new();
    let handle = d.register(noop());
    assert_eq!(handle.to_string(), "#0");
}
