//! Single-slot rendezvous between a fast feed and a slower, richer donor.
//!
//! An interceptable report waits up to the policy timeout for a donor report
//! of the same earthquake. Every waiter is resolved exactly once: whoever
//! removes its entry from the pending map, under the lock, owns the
//! resolution. The waiter's own timeout path only removes the entry if it
//! still carries the waiter's ticket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use indexmap::IndexMap;
use quake_core::{DataSource, DisasterEvent};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::config::{DedupConfig, FusionPolicy};
use crate::dedup::QuakeFix;

/// How an intercepted report left the rendezvous.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionOutcome {
    /// A donor supplied intensity.
    Fused(DisasterEvent),
    /// No donor arrived within the timeout; the report is unmodified.
    TimedOut(DisasterEvent),
    /// A newer report for the same event replaced this wait.
    Superseded,
    /// The rendezvous was closed.
    Cancelled,
}

/// What happened to a donor report.
#[derive(Debug, Clone, PartialEq)]
pub enum DonorOutcome {
    Fused { event_id: String },
    NoPending,
    MissingIntensity,
}

#[derive(Debug)]
enum Resolution {
    Donated { intensity: f64, donor_id: String },
    Superseded,
    Cancelled,
}

struct Pending {
    ticket: u64,
    fix: Option<QuakeFix>,
    tx: oneshot::Sender<Resolution>,
}

pub struct FusionRendezvous {
    policy: FusionPolicy,
    tolerances: DedupConfig,
    pending: Mutex<IndexMap<String, Pending>>,
    next_ticket: AtomicU64,
    closed: AtomicBool,
}

impl FusionRendezvous {
    pub fn new(policy: FusionPolicy, tolerances: DedupConfig) -> Self {
        Self {
            policy,
            tolerances,
            pending: Mutex::new(IndexMap::new()),
            next_ticket: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    pub fn is_interceptable(&self, source: DataSource) -> bool {
        self.policy.enabled && source == self.policy.interceptable
    }

    pub fn is_donor(&self, source: DataSource) -> bool {
        self.policy.enabled && source == self.policy.donor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn fix_of(event: &DisasterEvent) -> Option<QuakeFix> {
        let time = event.event_time().unwrap_or_else(Utc::now);
        event.as_earthquake().and_then(|eq| QuakeFix::of(eq, time))
    }

    /// Park the report until a donor arrives or the timeout elapses.
    pub async fn intercept(&self, event: DisasterEvent) -> FusionOutcome {
        let event_id = event.event_id().to_string();
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if self.is_closed() {
                return FusionOutcome::Cancelled;
            }
            let entry = Pending {
                ticket,
                fix: Self::fix_of(&event),
                tx,
            };
            if let Some(previous) = pending.shift_remove(&event_id) {
                info!("Report for {} supersedes the pending one", event_id);
                let _ = previous.tx.send(Resolution::Superseded);
            }
            pending.insert(event_id.clone(), entry);
        }
        debug!("Waiting up to {:?} for a donor for {}", self.policy.timeout(), event_id);

        match tokio::time::timeout(self.policy.timeout(), &mut rx).await {
            Ok(Ok(resolution)) => Self::apply(event, resolution),
            Ok(Err(_)) => FusionOutcome::Cancelled,
            Err(_) => {
                let mut pending = self.pending.lock().await;
                let ours = pending.get(&event_id).is_some_and(|p| p.ticket == ticket);
                if ours {
                    pending.shift_remove(&event_id);
                    drop(pending);
                    info!("No donor for {} within {:?}", event_id, self.policy.timeout());
                    return FusionOutcome::TimedOut(event);
                }
                drop(pending);
                // Someone removed our entry before we got the lock and sent
                // the resolution while holding it.
                match rx.try_recv() {
                    Ok(resolution) => Self::apply(event, resolution),
                    Err(_) => FusionOutcome::Cancelled,
                }
            }
        }
    }

    fn apply(mut event: DisasterEvent, resolution: Resolution) -> FusionOutcome {
        match resolution {
            Resolution::Donated { intensity, donor_id } => {
                if let Some(eq) = event.as_earthquake_mut() {
                    eq.intensity = Some(intensity);
                }
                info!("Fused {} with intensity {} from {}", event.id, intensity, donor_id);
                FusionOutcome::Fused(event)
            }
            Resolution::Superseded => FusionOutcome::Superseded,
            Resolution::Cancelled => FusionOutcome::Cancelled,
        }
    }

    /// Hand a donor report to the waiter it matches.
    ///
    /// Matches on `event_id` first, then on the earliest waiter within the
    /// duplicate tolerances.
    pub async fn offer(&self, donor: &DisasterEvent) -> DonorOutcome {
        let Some(intensity) = donor.as_earthquake().and_then(|eq| eq.intensity) else {
            debug!("Donor {} carries no intensity", donor.id);
            return DonorOutcome::MissingIntensity;
        };
        let donor_fix = Self::fix_of(donor);

        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| !p.tx.is_closed());

        let key = if pending.contains_key(donor.event_id()) {
            Some(donor.event_id().to_string())
        } else {
            pending
                .iter()
                .find(|(_, p)| match (&p.fix, &donor_fix) {
                    (Some(waiting), Some(offered)) => waiting.matches(offered, &self.tolerances),
                    _ => false,
                })
                .map(|(k, _)| k.clone())
        };
        let Some(entry) = key.and_then(|k| pending.shift_remove_entry(&k)) else {
            debug!("Donor {} has no pending report", donor.id);
            return DonorOutcome::NoPending;
        };

        let (event_id, waiter) = entry;
        let resolution = Resolution::Donated {
            intensity,
            donor_id: donor.id.clone(),
        };
        if waiter.tx.send(resolution).is_err() {
            warn!("Waiter for {} went away before fusion", event_id);
            return DonorOutcome::NoPending;
        }
        DonorOutcome::Fused { event_id }
    }

    /// Cancel every waiter and refuse new ones.
    pub async fn close(&self) {
        let mut pending = self.pending.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        let drained = pending.len();
        for (_, waiter) in pending.drain(..) {
            let _ = waiter.tx.send(Resolution::Cancelled);
        }
        if drained > 0 {
            info!("Cancelled {} pending fusion waits", drained);
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drop entries whose waiter has gone away without resolving.
    pub async fn purge_stale(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, p| !p.tx.is_closed());
        before - pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::DateTime;
    use quake_core::{DisasterType, EarthquakeData, EventTime};
    use tokio::time::Instant;

    fn policy() -> FusionPolicy {
        FusionPolicy {
            enabled: true,
            ..Default::default()
        }
    }

    fn cenc(source: DataSource, event_id: &str, intensity: Option<f64>, at: DateTime<Utc>) -> DisasterEvent {
        let mut eq = EarthquakeData::new(format!("{}-{}", source, event_id), 30.0, 103.0);
        eq.event_id = event_id.to_string();
        eq.magnitude = Some(5.0);
        eq.intensity = intensity;
        eq.shock_time = Some(EventTime::from(at));
        DisasterEvent::earthquake(source, DisasterType::Earthquake, eq)
    }

    fn rendezvous() -> Arc<FusionRendezvous> {
        Arc::new(FusionRendezvous::new(policy(), DedupConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_delivers_unmodified_at_deadline() {
        let fusion = rendezvous();
        let event = cenc(DataSource::CencFanstudio, "e1", None, Utc::now());

        let start = Instant::now();
        let outcome = fusion.intercept(event.clone()).await;
        let waited = start.elapsed();

        assert_eq!(outcome, FusionOutcome::TimedOut(event));
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_millis(10_010));
        assert_eq!(fusion.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_donor_just_before_deadline_fuses_immediately() {
        let fusion = rendezvous();
        let now = Utc::now();
        let start = Instant::now();

        let waiter = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "e1", None, now);
            tokio::spawn(async move { (fusion.intercept(event).await, Instant::now()) })
        };

        tokio::time::sleep(Duration::from_millis(9_990)).await;
        let donor = cenc(DataSource::CencWolfx, "e1", Some(6.0), now);
        assert_eq!(
            fusion.offer(&donor).await,
            DonorOutcome::Fused {
                event_id: "e1".to_string()
            }
        );

        let (outcome, resumed_at) = waiter.await.unwrap();
        let FusionOutcome::Fused(fused) = outcome else {
            panic!("expected fusion, got {:?}", outcome);
        };
        assert_eq!(fused.as_earthquake().unwrap().intensity, Some(6.0));
        assert!(resumed_at.duration_since(start) < Duration::from_secs(10));

        // The entry is gone, so a late donor finds nothing.
        assert_eq!(fusion.offer(&donor).await, DonorOutcome::NoPending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_donor_matches_by_location_and_time() {
        let fusion = rendezvous();
        let now = Utc::now();

        let waiter = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "fan-123", None, now);
            tokio::spawn(async move { fusion.intercept(event).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;

        let donor = cenc(DataSource::CencWolfx, "wolfx-987", Some(5.5), now + chrono::Duration::seconds(3));
        assert_eq!(
            fusion.offer(&donor).await,
            DonorOutcome::Fused {
                event_id: "fan-123".to_string()
            }
        );
        assert!(matches!(waiter.await.unwrap(), FusionOutcome::Fused(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_report_supersedes_pending() {
        let fusion = rendezvous();
        let now = Utc::now();

        let first = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "e1", None, now);
            tokio::spawn(async move { fusion.intercept(event).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "e1", None, now);
            tokio::spawn(async move { fusion.intercept(event).await })
        };

        assert_eq!(first.await.unwrap(), FusionOutcome::Superseded);
        assert!(matches!(second.await.unwrap(), FusionOutcome::TimedOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_waiters() {
        let fusion = rendezvous();
        let waiter = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "e1", None, Utc::now());
            tokio::spawn(async move { fusion.intercept(event).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        fusion.close().await;
        assert_eq!(waiter.await.unwrap(), FusionOutcome::Cancelled);

        let late = cenc(DataSource::CencFanstudio, "e2", None, Utc::now());
        assert_eq!(fusion.intercept(late).await, FusionOutcome::Cancelled);
        assert_eq!(fusion.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_donor_without_intensity_or_waiter() {
        let fusion = rendezvous();
        let now = Utc::now();
        assert_eq!(
            fusion.offer(&cenc(DataSource::CencWolfx, "e1", None, now)).await,
            DonorOutcome::MissingIntensity
        );
        assert_eq!(
            fusion.offer(&cenc(DataSource::CencWolfx, "e1", Some(4.0), now)).await,
            DonorOutcome::NoPending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_is_purged() {
        let fusion = rendezvous();
        let waiter = {
            let fusion = fusion.clone();
            let event = cenc(DataSource::CencFanstudio, "e1", None, Utc::now());
            tokio::spawn(async move { fusion.intercept(event).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        waiter.abort();
        let _ = waiter.await;

        assert_eq!(fusion.purge_stale().await, 1);
        assert_eq!(fusion.pending_count().await, 0);
    }

    #[test]
    fn test_policy_roles() {
        let fusion = FusionRendezvous::new(policy(), DedupConfig::default());
        assert!(fusion.is_interceptable(DataSource::CencFanstudio));
        assert!(fusion.is_donor(DataSource::CencWolfx));
        assert!(!fusion.is_donor(DataSource::CencFanstudio));

        let off = FusionRendezvous::new(FusionPolicy::default(), DedupConfig::default());
        assert!(!off.is_interceptable(DataSource::CencFanstudio));
    }
}
