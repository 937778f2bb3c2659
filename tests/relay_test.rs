mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{HangingTransport, ScriptedTransport, relay_config, started, wait_for_entries};
use relaybox::controller::{ControllerError, RelayController};
use relaybox::ingress::{ProtocolError, push_file};
use relaybox::ledger::DeliveryStatus;
use relaybox::worker::Ingress;

async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    reply
}

#[tokio::test]
async fn test_network_push_is_relayed_and_recorded() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let controller = started(transport.clone(), &temp).await;
    let addr = controller.status().await.receiver_addr.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(br#"{"file_name": "zc1_hello.bin", "file_size": 5}"#)
        .await
        .unwrap();
    let mut ack = [0u8; 3];
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, b"ACK");
    stream.write_all(b"hello").await.unwrap();
    assert_eq!(read_all(&mut stream).await, b"SUCCESS");

    let entries = wait_for_entries(&controller, 1).await;
    let entry = &entries[0];
    assert_eq!(entry.file_name, "zc1_hello.bin");
    assert_eq!(entry.file_size, 5);
    assert_eq!(entry.ingress, Ingress::Network);
    assert_eq!(entry.targets, vec!["zc1"]);
    assert_eq!(entry.destinations.len(), 1);
    assert_eq!(entry.destinations[0].status, DeliveryStatus::Success);
    assert_eq!(entry.destinations[0].target_path, "/home/pi/rx/zc1_hello.bin");

    let landed = temp.path().join("incoming/zc1_hello.bin");
    assert_eq!(std::fs::read(landed).unwrap(), b"hello");
    assert_eq!(std::fs::read(temp.path().join("outgoing/zc1_hello.bin")).unwrap(), b"hello");

    // The rename into the landing directory must not produce a second job
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(controller.metrics().snapshot().jobs_detected, 1);
    assert_eq!(transport.deliveries(), vec![("zc1".to_string(), "zc1_hello.bin".to_string())]);

    controller.stop().await;
}

#[tokio::test]
async fn test_truncated_push_is_quarantined_not_relayed() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let controller = started(transport.clone(), &temp).await;
    let addr = controller.status().await.receiver_addr.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(br#"{"file_name": "zc1_short.bin", "file_size": 5}"#)
        .await
        .unwrap();
    let mut ack = [0u8; 3];
    stream.read_exact(&mut ack).await.unwrap();
    stream.write_all(b"hel").await.unwrap();
    stream.shutdown().await.unwrap();

    let reply = read_all(&mut stream).await;
    assert!(reply.starts_with(b"ERROR: "), "reply: {}", String::from_utf8_lossy(&reply));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(controller.metrics().snapshot().jobs_detected, 0);
    assert!(transport.deliveries().is_empty());
    assert!(!temp.path().join("incoming/zc1_short.bin").exists());

    let quarantined: Vec<_> = std::fs::read_dir(temp.path().join("incoming/.quarantine"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert!(quarantined[0].ends_with("_zc1_short.bin"));

    controller.stop().await;
}

#[tokio::test]
async fn test_path_traversal_name_rejected() {
    let temp = TempDir::new().unwrap();
    let controller = started(Arc::new(ScriptedTransport::default()), &temp).await;
    let addr = controller.status().await.receiver_addr.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(br#"{"file_name": "../escape.bin", "file_size": 1}"#)
        .await
        .unwrap();
    let reply = read_all(&mut stream).await;
    assert!(reply.starts_with(b"ERROR: "));
    assert!(!temp.path().join("escape.bin").exists());

    controller.stop().await;
}

#[tokio::test]
async fn test_push_client_round_trip() {
    let temp = TempDir::new().unwrap();
    let controller = started(Arc::new(ScriptedTransport::default()), &temp).await;
    let addr = controller.status().await.receiver_addr.unwrap();

    let source = temp.path().join("all_report.txt");
    std::fs::write(&source, b"report body").unwrap();
    let sent = push_file(addr, &source, Duration::from_secs(5)).await.unwrap();
    assert_eq!(sent, 11);

    let entries = wait_for_entries(&controller, 1).await;
    let mut targets = entries[0].targets.clone();
    targets.sort();
    assert_eq!(targets, vec!["zc1", "zc2", "zc3"]);

    controller.stop().await;
}

#[tokio::test]
async fn test_push_client_reports_rejection() {
    let temp = TempDir::new().unwrap();
    let mut config = relay_config(&temp);
    config.limits.max_file_bytes = "4B".parse().unwrap();
    let controller = RelayController::new(Arc::new(ScriptedTransport::default()));
    controller.start(Some(config)).await.unwrap();
    let addr = controller.status().await.receiver_addr.unwrap();

    let source = temp.path().join("zc1_big.bin");
    std::fs::write(&source, b"too large").unwrap();
    let err = push_file(addr, &source, Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Rejected(_)), "got {err:?}");

    controller.stop().await;
}

#[tokio::test]
async fn test_watcher_detects_new_file() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let controller = started(transport.clone(), &temp).await;

    std::fs::write(temp.path().join("incoming/plain.bin"), b"abc").unwrap();

    let entries = wait_for_entries(&controller, 1).await;
    assert_eq!(entries[0].file_name, "plain.bin");
    assert_eq!(entries[0].ingress, Ingress::Watcher);
    assert_eq!(entries[0].targets, vec!["zc2"]);
    assert_eq!(transport.deliveries(), vec![("zc2".to_string(), "plain.bin".to_string())]);

    controller.stop().await;
}

#[tokio::test]
async fn test_failed_destination_does_not_affect_others() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::refusing(&["zc3"]));
    let controller = started(transport.clone(), &temp).await;

    let file = temp.path().join("all_data.bin");
    std::fs::write(&file, b"payload").unwrap();
    controller.submit_file(&file).await.unwrap();

    let entries = wait_for_entries(&controller, 1).await;
    let entry = &entries[0];
    assert_eq!(entry.ingress, Ingress::Manual);
    assert_eq!(entry.destinations.len(), 3);
    assert!(entry.record_for("zc1").unwrap().status.is_success());
    assert!(entry.record_for("zc2").unwrap().status.is_success());
    match &entry.record_for("zc3").unwrap().status {
        DeliveryStatus::Failed(reason) => assert!(reason.contains("refused"), "reason: {reason}"),
        other => panic!("zc3 should have failed, got {other}"),
    }

    let snapshot = controller.metrics().snapshot();
    assert_eq!(snapshot.deliveries_succeeded, 2);
    assert_eq!(snapshot.deliveries_failed, 1);

    // The ledger file on disk carries no credential
    let files: Vec<_> = std::fs::read_dir(temp.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    assert_eq!(files.len(), 1);
    let raw = std::fs::read_to_string(&files[0]).unwrap();
    assert!(!raw.contains("s3cret"));
    assert!(raw.contains("\"device\": \"zc3\"") || raw.contains("\"device\":\"zc3\""));

    controller.stop().await;
}

#[tokio::test]
async fn test_submit_requires_running_relay_and_existing_file() {
    let temp = TempDir::new().unwrap();
    let controller = RelayController::with_config(Arc::new(ScriptedTransport::default()), relay_config(&temp)).unwrap();

    let file = temp.path().join("zc1_a.bin");
    std::fs::write(&file, b"a").unwrap();
    assert!(matches!(controller.submit_file(&file).await, Err(ControllerError::NotRunning)));
    // A stopped relay answers NotRunning before looking at the path
    let missing = temp.path().join("missing.bin");
    assert!(matches!(controller.submit_file(&missing).await, Err(ControllerError::NotRunning)));
    assert!(matches!(
        controller.relay_bundle(&temp.path().join("absent")).await,
        Err(ControllerError::NotRunning)
    ));

    controller.start(None).await.unwrap();
    assert!(matches!(
        controller.submit_file(&missing).await,
        Err(ControllerError::InvalidPath(_))
    ));

    controller.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_reports() {
    let temp = TempDir::new().unwrap();
    let controller = started(Arc::new(ScriptedTransport::default()), &temp).await;

    let file = temp.path().join("zc1_stop.bin");
    std::fs::write(&file, b"x").unwrap();
    controller.submit_file(&file).await.unwrap();

    let report = controller.stop().await;
    assert!(report.was_running);
    assert!(report.incomplete.is_empty());
    assert!(!controller.status().await.active);

    let again = controller.stop().await;
    assert!(!again.was_running);
    assert_eq!(again.drained, 0);

    // Everything accepted before stop reached the ledger
    assert_eq!(controller.ledger().unwrap().recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_restart_keeps_ledger() {
    let temp = TempDir::new().unwrap();
    let controller = started(Arc::new(ScriptedTransport::default()), &temp).await;

    let file = temp.path().join("zc1_first.bin");
    std::fs::write(&file, b"1").unwrap();
    controller.submit_file(&file).await.unwrap();
    wait_for_entries(&controller, 1).await;

    controller.start(None).await.unwrap();
    let file = temp.path().join("zc1_second.bin");
    std::fs::write(&file, b"2").unwrap();
    controller.submit_file(&file).await.unwrap();

    let entries = wait_for_entries(&controller, 2).await;
    assert_eq!(entries[0].file_name, "zc1_second.bin");
    assert_eq!(entries[1].file_name, "zc1_first.bin");

    controller.stop().await;
}

#[tokio::test]
async fn test_bundle_skips_metadata_file() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let controller = started(transport.clone(), &temp).await;

    let bundle = temp.path().join("bundle");
    std::fs::create_dir_all(bundle.join("nested")).unwrap();
    std::fs::write(bundle.join("config.json"), b"{}").unwrap();
    std::fs::write(bundle.join("zc1_a.bin"), b"a").unwrap();
    std::fs::write(bundle.join("nested/b.bin"), b"bb").unwrap();

    let report = controller.relay_bundle(&bundle).await.unwrap();
    assert_eq!(report.submitted.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.failed.is_empty());

    let entries = wait_for_entries(&controller, 2).await;
    assert!(entries.iter().all(|e| e.ingress == Ingress::Bundle));
    assert!(entries.iter().all(|e| e.file_name != "config.json"));

    controller.stop().await;
}

#[tokio::test]
async fn test_event_log_records_lifecycle() {
    let temp = TempDir::new().unwrap();
    let controller = started(Arc::new(ScriptedTransport::default()), &temp).await;

    let file = temp.path().join("zc1_events.bin");
    std::fs::write(&file, b"e").unwrap();
    controller.submit_file(&file).await.unwrap();
    wait_for_entries(&controller, 1).await;
    controller.stop().await;

    let log = std::fs::read_dir(temp.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("relay_events_"))
        .expect("event log written");
    let text = std::fs::read_to_string(log).unwrap();
    let detected = text.find("detected").unwrap();
    let dispatching = text.find("dispatching").unwrap();
    let completed = text.find("completed").unwrap();
    assert!(detected < dispatching && dispatching < completed);
}

#[tokio::test]
async fn test_stop_is_bounded_by_grace_with_hung_transfers() {
    let temp = TempDir::new().unwrap();
    let mut config = relay_config(&temp);
    config.limits.dispatch_workers = 1;
    config.limits.queue_capacity = 1;
    config.limits.shutdown_grace_secs = 1;
    config.limits.transfer_timeout_secs = 30;
    let controller = RelayController::new(Arc::new(HangingTransport));
    controller.start(Some(config)).await.unwrap();

    // One job hangs in the worker, one waits in its channel, two block on enqueue
    for i in 0..4 {
        std::fs::write(temp.path().join(format!("incoming/zc1_hang{i}.bin")), b"x").unwrap();
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.metrics().snapshot().jobs_detected < 4 {
        assert!(Instant::now() < deadline, "files were not detected");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let started_at = Instant::now();
    let report = controller.stop().await;
    let took = started_at.elapsed();

    assert!(took < Duration::from_secs(3), "stop took {took:?} with a 1s grace period");
    assert!(report.was_running);
    assert_eq!(report.incomplete.len(), 4);

    let status = tokio::time::timeout(Duration::from_secs(1), controller.status())
        .await
        .unwrap();
    assert!(!status.active);
}
