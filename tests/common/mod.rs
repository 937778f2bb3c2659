#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use relaybox::config::Config;
use relaybox::controller::RelayController;
use relaybox::ledger::LedgerEntry;
use relaybox::routing::Destination;
use relaybox::transport::{SendOptions, TransferError, Transport};

/// Records every delivery and refuses the destinations it was told to
#[derive(Default)]
pub struct ScriptedTransport {
    refuse: HashSet<String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn refusing(names: &[&str]) -> Self {
        Self {
            refuse: names.iter().map(|n| n.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, local: &Path, dest: &Destination, _: &SendOptions) -> Result<String, TransferError> {
        if self.refuse.contains(&dest.name) {
            return Err(TransferError::Connect {
                endpoint: dest.endpoint(),
                reason: "connection refused".into(),
            });
        }
        let file_name = local.file_name().unwrap().to_string_lossy().into_owned();
        self.sent.lock().unwrap().push((dest.name.clone(), file_name.clone()));
        Ok(dest.remote_path_for(&file_name))
    }
}

/// Never finishes a transfer
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _: &Path, _: &Destination, _: &SendOptions) -> Result<String, TransferError> {
        std::future::pending().await
    }
}

/// Three destinations, `zc1_` routed to zc1 only, `all_` to everyone, default zc2
pub fn relay_config_json(temp: &TempDir) -> Value {
    json!({
        "incoming_dir": temp.path().join("incoming"),
        "outgoing_dir": temp.path().join("outgoing"),
        "log_dir": temp.path().join("logs"),
        "destinations": [
            {"name": "zc1", "ip": "10.0.0.1", "user": "pi", "password": "s3cret-one", "target_dir": "/home/pi/rx"},
            {"name": "zc2", "ip": "10.0.0.2", "user": "pi", "password": "env:ZC2_PASSWORD", "target_dir": "/home/pi/rx"},
            {"name": "zc3", "ip": "10.0.0.3", "user": "pi", "password": "s3cret-three", "target_dir": "/data/in"}
        ],
        "file_patterns": {
            "zc1_": ["zc1"],
            "all_": "all"
        },
        "default_target": ["zc2"],
        "server_port": 0,
        "bind_host": "127.0.0.1",
        "limits": {
            "quiescence_ms": 100,
            "receive_idle_timeout_secs": 2,
            "shutdown_grace_secs": 5
        }
    })
}

pub fn relay_config(temp: &TempDir) -> Config {
    Config::from_json(relay_config_json(temp)).unwrap()
}

pub async fn started(transport: Arc<dyn Transport>, temp: &TempDir) -> Arc<RelayController> {
    let controller = Arc::new(RelayController::new(transport));
    controller.start(Some(relay_config(temp))).await.unwrap();
    controller
}

/// Poll the ledger until it holds `count` entries
pub async fn wait_for_entries(controller: &RelayController, count: usize) -> Vec<LedgerEntry> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(ledger) = controller.ledger() {
            let entries = ledger.recent(100).unwrap();
            if entries.len() >= count {
                return entries;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} ledger entries"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
