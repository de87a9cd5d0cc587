use bambu_status_broadcaster::{
    determine_role, relay_lines, BroadcastOptions, OwnerEndpoint, Role, StatusBroadcaster,
};
use bambu_status_format::{DisplayRecord, StatusClass};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;

async fn owner(path: &Path) -> OwnerEndpoint {
    match determine_role(path).await.unwrap() {
        Role::Owner(endpoint) => endpoint,
        Role::Relay(_) => panic!("expected to become owner of {:?}", path),
    }
}

async fn relay(path: &Path) -> UnixStream {
    match determine_role(path).await.unwrap() {
        Role::Relay(stream) => stream,
        Role::Owner(_) => panic!("expected to find an owner on {:?}", path),
    }
}

async fn wait_for_clients(broadcaster: &StatusBroadcaster, expected: usize) {
    for _ in 0..50 {
        if broadcaster.client_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(broadcaster.client_count().await, expected);
}

async fn read_line_within(reader: &mut BufReader<UnixStream>, limit: Duration) -> Option<String> {
    let mut line = String::new();
    match tokio::time::timeout(limit, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => Some(line),
        _ => None,
    }
}

fn record(text: &str) -> DisplayRecord {
    DisplayRecord {
        text: text.to_string(),
        tooltip: "Job: test".to_string(),
        class: StatusClass::Running,
    }
}

#[tokio::test]
async fn test_broadcaster_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test.sock");

    let broadcaster = StatusBroadcaster::default();

    // Start broadcaster
    broadcaster.start(owner(&socket_path).await).await.unwrap();
    assert!(socket_path.exists());
    assert_eq!(broadcaster.socket_path().await.as_deref(), Some(socket_path.as_path()));

    // Stop broadcaster
    broadcaster.stop().await.unwrap();
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_second_instance_becomes_relay() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_roles.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    // Never a second owner while the first is listening
    let second = determine_role(&socket_path).await.unwrap();
    assert_eq!(second.name(), "relay");

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_to_multiple_clients() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_multi.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    let mut readers = Vec::new();
    for _ in 0..3 {
        readers.push(BufReader::new(relay(&socket_path).await));
    }
    wait_for_clients(&broadcaster, 3).await;

    let delivered = broadcaster.broadcast_record(&record("first")).await.unwrap();
    assert_eq!(delivered, 3);
    broadcaster.broadcast_record(&record("second")).await.unwrap();

    for reader in &mut readers {
        let first = read_line_within(reader, Duration::from_secs(1)).await.unwrap();
        let second = read_line_within(reader, Duration::from_secs(1)).await.unwrap();

        let first: DisplayRecord = serde_json::from_str(&first).unwrap();
        let second: DisplayRecord = serde_json::from_str(&second).unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(second.text, "second");
    }

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_client_catches_up_with_latest_line() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_catchup.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    let line = r#"{"text":"42% (1h 30m)","tooltip":"","class":"running"}"#;
    broadcaster.broadcast_line("{\"text\":\"old\"}").await;
    broadcaster.broadcast_line(line).await;

    let mut reader = BufReader::new(relay(&socket_path).await);
    let received = read_line_within(&mut reader, Duration::from_secs(1)).await.unwrap();
    assert_eq!(received, format!("{}\n", line));

    // Nothing else is queued for it
    assert!(read_line_within(&mut reader, Duration::from_millis(100)).await.is_none());

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_dead_client_is_pruned_without_affecting_others() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_prune.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    let mut alive = BufReader::new(relay(&socket_path).await);
    let dead = relay(&socket_path).await;
    wait_for_clients(&broadcaster, 2).await;

    drop(dead);
    broadcaster.broadcast_line("{\"text\":\"after\"}").await;

    let received = read_line_within(&mut alive, Duration::from_secs(1)).await.unwrap();
    assert_eq!(received, "{\"text\":\"after\"}\n");

    // Either the liveness reader or the failed write removes it
    wait_for_clients(&broadcaster, 1).await;

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_stalled_client_times_out() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_stall.sock");

    let broadcaster = StatusBroadcaster::new(BroadcastOptions {
        write_timeout: Duration::from_millis(200),
    });
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    // Never reads, so the kernel buffer fills up
    let _stalled = relay(&socket_path).await;
    let mut reader = BufReader::new(relay(&socket_path).await);
    wait_for_clients(&broadcaster, 2).await;

    let big = format!("{{\"text\":\"{}\"}}", "x".repeat(4 * 1024 * 1024));
    let expected_len = big.len() + 1;
    let consumer = tokio::spawn(async move {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.len()
    });

    let delivered = tokio::time::timeout(Duration::from_secs(10), broadcaster.broadcast_line(&big))
        .await
        .expect("a stalled relay must not block the broadcast");

    assert_eq!(delivered, 1);
    assert_eq!(consumer.await.unwrap(), expected_len);
    assert_eq!(broadcaster.client_count().await, 1);

    broadcaster.stop().await.unwrap();
}

#[tokio::test]
async fn test_relay_copies_stream_until_owner_stops() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_relay.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();

    let stream = relay(&socket_path).await;
    let relay_task = tokio::spawn(async move {
        let mut out = Vec::new();
        let relayed = relay_lines(stream, &mut out).await.unwrap();
        (relayed, out)
    });
    wait_for_clients(&broadcaster, 1).await;

    broadcaster.broadcast_line("{\"text\":\"a\"}").await;
    broadcaster.broadcast_line("{\"text\":\"b\"}").await;

    // Closing the owner side ends the relay
    broadcaster.stop().await.unwrap();

    let (relayed, out) = tokio::time::timeout(Duration::from_secs(2), relay_task)
        .await
        .expect("relay should end when the owner goes away")
        .unwrap();

    assert_eq!(relayed, 2);
    assert_eq!(out, b"{\"text\":\"a\"}\n{\"text\":\"b\"}\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_closes_relays_that_join_during_shutdown() {
    use tokio::io::AsyncReadExt;

    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_stop_race.sock");

    let broadcaster = StatusBroadcaster::default();
    broadcaster.start(owner(&socket_path).await).await.unwrap();
    broadcaster.broadcast_line("{\"text\":\"latest\"}").await;

    let mut joining = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let path = socket_path.clone();
        joining.spawn(async move { UnixStream::connect(&path).await.ok() });
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    broadcaster.stop().await.unwrap();

    // Every relay that got in must see its stream end
    while let Some(joined) = joining.join_next().await {
        if let Some(mut stream) = joined.unwrap() {
            let mut rest = Vec::new();
            let ended = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest)).await;
            assert!(ended.is_ok(), "relay left hanging after stop");
        }
    }
    assert_eq!(broadcaster.client_count().await, 0);
}
