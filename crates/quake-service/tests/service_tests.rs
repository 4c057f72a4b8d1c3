//! Service lifecycle tests with an in-memory feed connector.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use feed_supervisor::{Connector, FeedError, FeedSocket, FeedSupervisor, Inbound, SupervisorConfig};
use mock_transport::RecordingSender;
use quake_core::CanonicalJsonParser;
use quake_service::{DisasterService, FeedToggle, ServiceConfig};

const CENC_REPORT: &str = r#"{
    "id": "cenc-1",
    "source": "cenc_fanstudio",
    "disaster_type": "EARTHQUAKE",
    "data": {
        "kind": "earthquake",
        "id": "cenc-1",
        "event_id": "cenc-1",
        "magnitude": 5.2,
        "intensity": 6.0,
        "latitude": 30.1,
        "longitude": 103.0,
        "place_name": "Sichuan Lushan"
    }
}"#;

/// Yields its frames once, then stays open.
struct FrameSocket {
    frames: VecDeque<Inbound>,
}

#[async_trait]
impl FeedSocket for FrameSocket {
    async fn next_message(&mut self) -> Result<Option<Inbound>, FeedError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => std::future::pending().await,
        }
    }

    async fn ping(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[derive(Default)]
struct FrameConnector {
    frames: Vec<String>,
    uris: StdMutex<Vec<String>>,
}

impl FrameConnector {
    fn new(frames: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        })
    }

    fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FrameConnector {
    async fn connect(
        &self,
        uri: &str,
        _config: &SupervisorConfig,
    ) -> Result<Box<dyn FeedSocket>, FeedError> {
        self.uris.lock().unwrap().push(uri.to_string());
        Ok(Box::new(FrameSocket {
            frames: self.frames.iter().cloned().map(Inbound::Text).collect(),
        }))
    }
}

fn fan_studio_only() -> ServiceConfig {
    let mut config = ServiceConfig {
        targets: vec!["ops".to_string()],
        ..Default::default()
    };
    config.data_sources.p2p_earthquake = FeedToggle { enabled: false };
    config.data_sources.wolfx = FeedToggle { enabled: false };
    config
}

fn service(config: ServiceConfig, connector: Arc<FrameConnector>) -> (DisasterService, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::new());
    let supervisor = FeedSupervisor::with_connector(config.websocket.to_supervisor_config(), connector);
    let service = DisasterService::with_parts(
        config,
        supervisor,
        sender.clone(),
        None,
        Arc::new(CanonicalJsonParser),
    )
    .unwrap();
    (service, sender)
}

async fn wait_for_deliveries(sender: &RecordingSender, expected: usize) -> usize {
    for _ in 0..100 {
        let count = sender.count().await;
        if count >= expected {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sender.count().await
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_frame_is_delivered() {
        let connector = FrameConnector::new(&[r#"{"type":"heartbeat"}"#, "not json", CENC_REPORT]);
        let (service, sender) = service(fan_studio_only(), connector.clone());

        service.start().await.unwrap();
        assert_eq!(wait_for_deliveries(&sender, 1).await, 1);

        let sent = sender.sent_to("ops").await;
        assert!(sent[0].text.contains("Sichuan Lushan"));
        assert_eq!(connector.uris(), vec!["wss://ws.fanstudio.tech/all"]);

        service.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let connector = FrameConnector::new(&[CENC_REPORT]);
        let (service, sender) = service(fan_studio_only(), connector.clone());

        service.start().await.unwrap();
        service.start().await.unwrap();
        wait_for_deliveries(&sender, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(connector.uris().len(), 1);
        assert_eq!(sender.count().await, 1);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_status_reports_connections_and_stats() {
        let connector = FrameConnector::new(&[CENC_REPORT, CENC_REPORT]);
        let (service, sender) = service(fan_studio_only(), connector);

        let before = service.status().await;
        assert!(!before.running);
        assert_eq!(before.uptime, "not running");

        service.start().await.unwrap();
        wait_for_deliveries(&sender, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = service.status().await;
        assert!(status.running);
        assert_eq!(status.connections.len(), 1);
        assert_eq!(status.connections[0].name, "fan_studio_all");
        assert_eq!(status.stats.received, 2);
        assert_eq!(status.stats.delivered, 1);
        assert_eq!(status.stats.duplicates, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], true);

        service.stop().await;
    }

    #[tokio::test]
    async fn test_stop_refuses_restart() {
        let connector = FrameConnector::new(&[]);
        let (service, _sender) = service(fan_studio_only(), connector);

        service.start().await.unwrap();
        service.stop().await;
        assert!(!service.status().await.running);
        assert!(service.supervisor().is_stopped());
        assert!(service.orchestrator().fusion().is_closed());

        assert!(service.start().await.is_err());
    }
}

mod endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_enabled_sources_become_connections() {
        let connector = FrameConnector::new(&[]);
        let mut config = ServiceConfig::default();
        config.data_sources.global_quake = FeedToggle { enabled: true };
        let (service, _) = service(config, connector);

        let names: Vec<String> = service.connection_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["fan_studio_all", "p2p_main", "wolfx_all", "global_quake"]);

        let fan = &service.connection_specs()[0];
        assert_eq!(fan.backup_uri.as_deref(), Some("wss://ws.fanstudio.hk/all"));
    }

    #[tokio::test]
    async fn test_poll_targets_follow_toggle() {
        let mut config = ServiceConfig::default();
        let (service_off, _) = service(config.clone(), FrameConnector::new(&[]));
        assert!(service_off.poll_targets().is_empty());

        config.http_polling.enabled = true;
        config.http_polling.interval_seconds = 120;
        let (service_on, _) = service(config, FrameConnector::new(&[]));
        let targets = service_on.poll_targets();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.interval == Duration::from_secs(120)));
        assert_eq!(targets[0].url, "https://api.wolfx.jp/cenc_eqlist.json");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = ServiceConfig::default();
        config.websocket.max_message_size = 0;
        let supervisor = FeedSupervisor::with_connector(
            config.websocket.to_supervisor_config(),
            FrameConnector::new(&[]),
        );
        let result = DisasterService::with_parts(
            config,
            supervisor,
            Arc::new(RecordingSender::new()),
            None,
            Arc::new(CanonicalJsonParser),
        );
        assert!(result.is_err());
    }
}
