use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bambu_status_broadcaster::{determine_role, relay_lines, Role, StatusBroadcaster};
use bambu_status_daemon::StatusPipeline;
use bambu_status_format::{DisplayRecord, Layout, StatusClass};
use tempfile::tempdir;
use tokio::net::UnixStream;

const RUNNING_PUSH: &[u8] = br#"{"print":{
    "gcode_state":"RUNNING",
    "bed_temper":59.8,"bed_target_temper":60,
    "nozzle_temper":219.5,"nozzle_target_temper":220,
    "chamber_temper":31,
    "layer_num":12,"total_layer_num":240,
    "mc_percent":42,"mc_remaining_time":90,
    "subtask_name":"benchy"}}"#;

async fn start_owner(path: &Path) -> Arc<StatusBroadcaster> {
    let endpoint = match determine_role(path).await.unwrap() {
        Role::Owner(endpoint) => endpoint,
        Role::Relay(_) => panic!("expected to own {:?}", path),
    };
    let broadcaster = Arc::new(StatusBroadcaster::default());
    broadcaster.start(endpoint).await.unwrap();
    broadcaster
}

async fn attach_relay(path: &Path) -> UnixStream {
    match determine_role(path).await.unwrap() {
        Role::Relay(stream) => stream,
        Role::Owner(_) => panic!("a second instance must not become owner"),
    }
}

#[tokio::test]
async fn test_late_relay_receives_owner_line_verbatim() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("waybar-bambu-status.sock");

    let broadcaster = start_owner(&socket_path).await;
    let pipeline = StatusPipeline::new(Layout::Detailed, Arc::clone(&broadcaster));

    // No relays yet
    let line = pipeline.handle_payload(RUNNING_PUSH).await.unwrap();
    assert!(line.contains("42%"));
    assert!(line.contains("1h 30m"));

    let stream = attach_relay(&socket_path).await;
    let relay = tokio::spawn(async move {
        let mut out = Vec::new();
        relay_lines(stream, &mut out).await.unwrap();
        out
    });

    // Give the acceptor time to hand over the catch-up line
    for _ in 0..50 {
        if broadcaster.client_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    broadcaster.stop().await.unwrap();

    let out = tokio::time::timeout(Duration::from_secs(2), relay)
        .await
        .expect("relay should end with the owner")
        .unwrap();
    assert_eq!(out, format!("{}\n", line).into_bytes());
}

#[tokio::test]
async fn test_relays_follow_owner_records_in_order() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("waybar-printer.sock");

    let broadcaster = start_owner(&socket_path).await;
    let pipeline = StatusPipeline::new(Layout::Compact, Arc::clone(&broadcaster));

    let mut relays = Vec::new();
    for _ in 0..2 {
        let stream = attach_relay(&socket_path).await;
        relays.push(tokio::spawn(async move {
            let mut out = Vec::new();
            relay_lines(stream, &mut out).await.unwrap();
            String::from_utf8(out).unwrap()
        }));
    }
    for _ in 0..50 {
        if broadcaster.client_count().await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pipeline.handle_payload(RUNNING_PUSH).await.unwrap();
    // Dropped: nothing goes out for it
    assert!(pipeline.handle_payload(b"{\"print\":{}}").await.is_none());
    pipeline
        .handle_payload(br#"{"print":{"gcode_state":"FINISH","bed_temper":40,"mc_percent":100}}"#)
        .await
        .unwrap();

    broadcaster.stop().await.unwrap();

    for relay in relays {
        let out = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        let records: Vec<DisplayRecord> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].class, StatusClass::Running);
        assert!(records[0].text.contains("42% (59.80°C)"));
        assert_eq!(records[1].class, StatusClass::Idle);
    }
}

#[tokio::test]
async fn test_owner_socket_removed_on_stop() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("status.sock");

    let broadcaster = start_owner(&socket_path).await;
    assert!(socket_path.exists());

    broadcaster.stop().await.unwrap();
    assert!(!socket_path.exists());

    // The next instance takes over as owner
    let next = determine_role(&socket_path).await.unwrap();
    assert_eq!(next.name(), "owner");
}
