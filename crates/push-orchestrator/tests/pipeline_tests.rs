//! End-to-end tests for the push pipeline.

use std::sync::Arc;
use std::time::Duration;

use broadcaster::Broadcaster;
use chrono::{DateTime, Utc};
use mock_transport::{RecordingSender, StaticRenderer};
use push_orchestrator::{
    FilterStage, OrchestratorError, PlainTextBuilder, PushConfig, PushOrchestrator, SubmitOutcome,
};
use quake_core::{DataSource, DisasterEvent, DisasterType, EarthquakeData, EventTime, MapRenderer};

fn quake(source: DataSource, id: &str, magnitude: f64, lat: f64, lon: f64, at: DateTime<Utc>) -> DisasterEvent {
    let mut eq = EarthquakeData::new(id, lat, lon);
    eq.magnitude = Some(magnitude);
    eq.depth = Some(10.0);
    eq.shock_time = Some(EventTime::from(at));
    eq.place_name = "Kinki".to_string();
    DisasterEvent::earthquake(source, DisasterType::Earthquake, eq)
}

fn eew_report(source: DataSource, event_id: &str, updates: u32, is_final: bool) -> DisasterEvent {
    let mut event = quake(source, &format!("{}-{}", event_id, updates), 5.5, 35.0, 135.0, Utc::now());
    event.disaster_type = DisasterType::EarthquakeWarning;
    let eq = event.as_earthquake_mut().unwrap();
    eq.event_id = event_id.to_string();
    eq.updates = updates;
    eq.is_final = is_final;
    eq.scale = Some(3.0);
    event
}

fn cenc(source: DataSource, id: &str, intensity: Option<f64>) -> DisasterEvent {
    let mut event = quake(source, id, 5.0, 30.5, 103.0, Utc::now());
    event.as_earthquake_mut().unwrap().intensity = intensity;
    event
}

fn build(
    config: PushConfig,
    sender: Arc<RecordingSender>,
    destinations: &[&str],
    renderer: Option<Arc<dyn MapRenderer>>,
) -> Arc<PushOrchestrator> {
    let broadcaster = Broadcaster::new(sender, destinations.iter().map(|d| d.to_string()).collect());
    Arc::new(
        PushOrchestrator::new(config, broadcaster, Arc::new(PlainTextBuilder::default()), renderer)
            .unwrap(),
    )
}

mod dedup_tests {
    use super::*;

    #[tokio::test]
    async fn test_near_simultaneous_feeds_deliver_once() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], None);
        let now = Utc::now();

        let a = quake(DataSource::JmaP2pInfo, "p2p-1", 6.0, 35.0, 135.0, now);
        let b = quake(DataSource::JmaWolfxInfo, "wolfx-1", 6.1, 35.05, 135.02, now + chrono::Duration::seconds(10));

        assert!(pipeline.submit(a).await.is_delivered());
        assert_eq!(pipeline.submit(b).await, SubmitOutcome::Duplicate);
        assert_eq!(sender.count().await, 1);
        assert_eq!(pipeline.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn test_ninety_minutes_apart_delivers_twice() {
        let sender = Arc::new(RecordingSender::new());
        let config = PushConfig {
            max_event_age_minutes: 180,
            ..Default::default()
        };
        let pipeline = build(config, sender.clone(), &["ops"], None);
        let now = Utc::now();

        let earlier = quake(DataSource::JmaP2pInfo, "p2p-1", 6.0, 35.0, 135.0, now - chrono::Duration::minutes(90));
        let later = quake(DataSource::JmaWolfxInfo, "wolfx-1", 6.1, 35.05, 135.02, now);

        assert!(pipeline.submit(earlier).await.is_delivered());
        assert!(pipeline.submit(later).await.is_delivered());
        assert_eq!(sender.count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_never_reaches_throttle() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], None);

        assert!(pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await.is_delivered());
        assert_eq!(
            pipeline.submit(eew_report(DataSource::JmaWolfx, "ev", 1, false)).await,
            SubmitOutcome::Duplicate
        );
        assert_eq!(pipeline.filters().throttle_len().await, 1);
    }
}

mod filter_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_throttle_end_to_end() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], None);

        let mut delivered = Vec::new();
        for n in 1..=7 {
            let outcome = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", n, n == 7)).await;
            if outcome.is_delivered() {
                delivered.push(n);
            } else {
                assert_eq!(outcome, SubmitOutcome::Filtered(FilterStage::ReportThrottle));
            }
        }

        assert_eq!(delivered, vec![1, 3, 6, 7]);
        assert_eq!(pipeline.stats().filtered, 3);
    }

    #[tokio::test]
    async fn test_below_threshold_is_filtered() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], None);

        let small = quake(DataSource::UsgsFanstudio, "us-1", 3.0, 35.0, 135.0, Utc::now());
        assert_eq!(
            pipeline.submit(small).await,
            SubmitOutcome::Filtered(FilterStage::SourceClass)
        );
        assert_eq!(sender.count().await, 0);
    }

    #[tokio::test]
    async fn test_simulation_leaves_no_state() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], None);
        let event = eew_report(DataSource::JmaP2p, "ev", 1, false);

        let report = pipeline.simulate(&event).await;
        assert!(report.would_deliver());
        assert!(report.message.unwrap().contains("Report #1"));
        assert_eq!(sender.count().await, 0);

        assert!(pipeline.submit(event.clone()).await.is_delivered());
        let again = pipeline.simulate(&event).await;
        assert!(again.duplicate);
        assert!(!again.would_deliver());
    }
}

mod fusion_tests {
    use super::*;

    fn fusion_config() -> PushConfig {
        PushConfig::default().with_fusion(true, 10.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_donor_enriches_pending_report() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(fusion_config(), sender.clone(), &["ops"], None);

        let waiter = {
            let pipeline = pipeline.clone();
            let event = cenc(DataSource::CencFanstudio, "fan-1", None);
            tokio::spawn(async move { pipeline.submit(event).await })
        };
        tokio::time::sleep(Duration::from_secs(3)).await;

        let donor = cenc(DataSource::CencWolfx, "wolfx-1", Some(6.0));
        assert_eq!(pipeline.submit(donor).await, SubmitOutcome::DonorConsumed { fused: true });

        assert!(waiter.await.unwrap().is_delivered());
        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.text.contains("Max intensity: 6.0"));
        assert_eq!(pipeline.stats().fused, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_donor_delivers_after_timeout() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(fusion_config(), sender.clone(), &["ops"], None);

        let start = tokio::time::Instant::now();
        let outcome = pipeline.submit(cenc(DataSource::CencFanstudio, "fan-1", None)).await;

        assert!(outcome.is_delivered());
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(!sender.sent().await[0].1.text.contains("intensity"));
        assert_eq!(pipeline.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn test_unmatched_donor_is_dropped() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(fusion_config(), sender.clone(), &["ops"], None);

        let donor = cenc(DataSource::CencWolfx, "wolfx-1", Some(6.0));
        assert_eq!(pipeline.submit(donor).await, SubmitOutcome::DonorConsumed { fused: false });
        assert_eq!(sender.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_fusion() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(fusion_config(), sender.clone(), &["ops"], None);

        let waiter = {
            let pipeline = pipeline.clone();
            let event = cenc(DataSource::CencFanstudio, "fan-1", None);
            tokio::spawn(async move { pipeline.submit(event).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        pipeline.close().await;

        assert_eq!(waiter.await.unwrap(), SubmitOutcome::Cancelled);
        assert_eq!(sender.count().await, 0);
    }
}

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_failure_still_delivers() {
        let sender = Arc::new(RecordingSender::failing_for(["broken"]));
        let pipeline = build(PushConfig::default(), sender.clone(), &["a", "broken", "c"], None);

        let outcome = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert_eq!(outcome, SubmitOutcome::Delivered { succeeded: 2, failed: 1 });
        assert_eq!(sender.sent_to("c").await.len(), 1);
    }

    #[tokio::test]
    async fn test_all_destinations_failing() {
        let sender = Arc::new(RecordingSender::failing_for(["a", "b"]));
        let pipeline = build(PushConfig::default(), sender, &["a", "b"], None);

        let outcome = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert_eq!(outcome, SubmitOutcome::AllDestinationsFailed);
        assert!(!outcome.is_delivered());
        assert_eq!(pipeline.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_no_destinations_records_nothing() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender, &[], None);

        let outcome = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert_eq!(outcome, SubmitOutcome::NoDestinations);
        assert!(pipeline.deduplicator().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender, &["ops"], None);

        let mut event = eew_report(DataSource::JmaP2p, "ev", 1, false);
        event.id = String::new();
        assert!(matches!(pipeline.submit(event).await, SubmitOutcome::Invalid(_)));
        assert!(pipeline.deduplicator().is_empty().await);

        let next = pipeline.submit(eew_report(DataSource::JmaP2p, "ev2", 1, false)).await;
        assert!(next.is_delivered());
    }

    #[tokio::test]
    async fn test_unbounded_fusion_wait_is_refused_at_construction() {
        let broadcaster = Broadcaster::new(Arc::new(RecordingSender::new()), vec!["ops".to_string()]);
        let result = PushOrchestrator::new(
            PushConfig::default().with_fusion(true, 1e20),
            broadcaster,
            Arc::new(PlainTextBuilder::default()),
            None,
        );
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_silence() {
        let sender = Arc::new(RecordingSender::new());
        let config = PushConfig {
            startup_silence_seconds: 30,
            ..Default::default()
        };
        let pipeline = build(config, sender, &["ops"], None);

        let first = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert_eq!(first, SubmitOutcome::Silenced);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let later = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert!(later.is_delivered());
    }
}

mod map_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_map_follows_primary_without_blocking_it() {
        let sender = Arc::new(RecordingSender::new());
        let renderer = Arc::new(StaticRenderer::new("/tmp/map.png").with_delay(Duration::from_secs(5)));
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], Some(renderer.clone() as Arc<dyn MapRenderer>));

        let outcome = pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await;
        assert!(outcome.is_delivered());
        assert_eq!(sender.count().await, 1);

        pipeline.flush_artifacts().await;
        let sent = sender.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.has_attachments());
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_map_throttled_between_reports() {
        let sender = Arc::new(RecordingSender::new());
        let renderer = Arc::new(StaticRenderer::new("/tmp/map.png"));
        let mut config = PushConfig::default();
        config.report_control.jma_report_n = 1;
        let pipeline = build(config, sender.clone(), &["ops"], Some(renderer.clone() as Arc<dyn MapRenderer>));

        for n in 1..=5 {
            assert!(pipeline.submit(eew_report(DataSource::JmaP2p, "ev", n, false)).await.is_delivered());
        }
        pipeline.flush_artifacts().await;

        // Reports 1 and 5 carry a map.
        assert_eq!(renderer.calls(), 2);
        assert_eq!(sender.count().await, 7);
    }

    #[tokio::test]
    async fn test_failed_render_does_not_affect_delivery() {
        let sender = Arc::new(RecordingSender::new());
        let renderer = Arc::new(StaticRenderer::failing());
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], Some(renderer.clone() as Arc<dyn MapRenderer>));

        assert!(pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await.is_delivered());
        pipeline.flush_artifacts().await;

        assert_eq!(renderer.calls(), 1);
        assert_eq!(sender.count().await, 1);
    }

    #[tokio::test]
    async fn test_report_feeds_get_no_map() {
        let sender = Arc::new(RecordingSender::new());
        let renderer = Arc::new(StaticRenderer::new("/tmp/map.png"));
        let pipeline = build(PushConfig::default(), sender.clone(), &["ops"], Some(renderer.clone() as Arc<dyn MapRenderer>));

        let report = quake(DataSource::JmaP2pInfo, "info-1", 6.0, 35.0, 135.0, Utc::now());
        assert!(pipeline.submit(report).await.is_delivered());
        pipeline.flush_artifacts().await;
        assert_eq!(renderer.calls(), 0);
    }
}

mod housekeeping_tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_entries_survive_housekeeping() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender, &["ops"], None);

        assert!(pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await.is_delivered());
        let purged = pipeline.housekeeping().await;

        assert_eq!(purged.dedup, 0);
        assert_eq!(purged.throttle, 0);
        assert_eq!(pipeline.deduplicator().len().await, 1);
    }

    #[tokio::test]
    async fn test_zero_retention_purges_on_schedule() {
        let sender = Arc::new(RecordingSender::new());
        let mut config = PushConfig::default();
        config.dedup.retention_minutes = 0;
        let pipeline = build(config, sender, &["ops"], None);

        assert!(pipeline.submit(eew_report(DataSource::JmaP2p, "ev", 1, false)).await.is_delivered());
        assert_eq!(pipeline.deduplicator().len().await, 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let purged = pipeline.housekeeping().await;
        assert_eq!(purged.dedup, 1);
        assert_eq!(purged.throttle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_housekeeping_stops_with_orchestrator() {
        let sender = Arc::new(RecordingSender::new());
        let pipeline = build(PushConfig::default(), sender, &["ops"], None);

        let task = pipeline.spawn_housekeeping(Duration::from_secs(60));
        drop(pipeline);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(task.is_finished());
    }
}
