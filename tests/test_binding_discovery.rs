//! Binding discovery tests
//!
//! Exercises the wait-for-file behavior with short real intervals: the file
//! showing up late, the first line winning, malformed files failing at once,
//! and the overall timeout.

use sensor_adapter::discovery::{
    BindingDiscovery, BrokerAddress, DiscoveryError, PollSchedule,
};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;

fn quick_discovery(timeout: Option<Duration>) -> BindingDiscovery {
    BindingDiscovery::new(
        "connections.txt",
        1883,
        PollSchedule {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(50),
            timeout,
        },
    )
}

#[tokio::test]
async fn test_waits_for_late_binding_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("connections.txt");

    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        std::fs::write(writer_path, "sensor/dev01=10.0.0.5\n").unwrap();
    });

    let (_tx, mut rx) = watch::channel(false);
    let started = Instant::now();
    let resolved = quick_discovery(Some(Duration::from_secs(5)))
        .resolve(dir.path(), &mut rx)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(resolved.binding.topic, "sensor/dev01");
    assert_eq!(resolved.broker, BrokerAddress::new("10.0.0.5", 1883));
    assert_eq!(resolved.path, path);
}

#[tokio::test]
async fn test_file_created_empty_then_written_is_read_once_complete() {
    use std::io::Write;

    let dir = TempDir::new().unwrap();
    let mut file = std::fs::File::create(dir.path().join("connections.txt")).unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        file.write_all(b"sensor/dev01=10.0.0.5\n").unwrap();
        file.flush().unwrap();
    });

    let (_tx, mut rx) = watch::channel(false);
    let resolved = quick_discovery(Some(Duration::from_secs(5)))
        .resolve(dir.path(), &mut rx)
        .await
        .unwrap();

    assert_eq!(resolved.binding.topic, "sensor/dev01");
    assert_eq!(resolved.broker, BrokerAddress::new("10.0.0.5", 1883));
}

#[tokio::test]
async fn test_first_line_wins() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("connections.txt"),
        "sensor/dev01=10.0.0.5\nthermo/dev02=10.0.0.6\n",
    )
    .unwrap();

    let (_tx, mut rx) = watch::channel(false);
    let resolved = quick_discovery(None)
        .resolve(dir.path(), &mut rx)
        .await
        .unwrap();

    assert_eq!(resolved.binding.component, "sensor");
    assert_eq!(resolved.binding.component_id, "dev01");
    assert_eq!(resolved.broker.host, "10.0.0.5");
    assert_eq!(resolved.entries.len(), 2);
}

#[tokio::test]
async fn test_broker_port_comes_from_configuration() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("connections.txt"), "sensor/dev01=broker.local").unwrap();

    let discovery = BindingDiscovery::new(
        "connections.txt",
        8883,
        PollSchedule {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(20),
            timeout: None,
        },
    );
    let (_tx, mut rx) = watch::channel(false);
    let resolved = discovery.resolve(dir.path(), &mut rx).await.unwrap();

    assert_eq!(resolved.broker.to_string(), "broker.local:8883");
}

#[tokio::test]
async fn test_malformed_file_fails_without_waiting() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("connections.txt"), "sensor/dev01\n").unwrap();

    let (_tx, mut rx) = watch::channel(false);
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        quick_discovery(None).resolve(dir.path(), &mut rx),
    )
    .await
    .expect("a malformed file must not be polled again");

    assert!(matches!(result, Err(DiscoveryError::Malformed { .. })));
}

#[tokio::test]
async fn test_topic_without_two_segments_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("connections.txt"), "sensor=10.0.0.5\n").unwrap();

    let (_tx, mut rx) = watch::channel(false);
    let result = quick_discovery(None).resolve(dir.path(), &mut rx).await;

    assert!(matches!(result, Err(DiscoveryError::InvalidTopic { .. })));
}

#[tokio::test]
async fn test_file_that_never_appears_times_out() {
    let dir = TempDir::new().unwrap();
    let (_tx, mut rx) = watch::channel(false);

    let result = quick_discovery(Some(Duration::from_millis(200)))
        .resolve(dir.path(), &mut rx)
        .await;

    match result {
        Err(DiscoveryError::Timeout { path, .. }) => assert!(path.ends_with("connections.txt")),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dropped_shutdown_sender_keeps_waiting() {
    let dir = TempDir::new().unwrap();
    let (tx, mut rx) = watch::channel(false);
    drop(tx);

    let writer_dir = dir.path().to_path_buf();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(writer_dir.join("connections.txt"), "sensor/dev01=10.0.0.5").unwrap();
    });

    let resolved = quick_discovery(Some(Duration::from_secs(5)))
        .resolve(dir.path(), &mut rx)
        .await
        .unwrap();

    assert_eq!(resolved.binding.topic, "sensor/dev01");
}
