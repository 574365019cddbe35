// src/alerts.rs

//! Alert lifecycle management
//!
//! Owns every raised alert from creation through acknowledgment,
//! resolution, and retirement. Near-simultaneous duplicates collapse via
//! a 5-minute deduplication bucket, repeat alerts are suppressed while an
//! unresolved alert for the same metric is inside its cooldown window,
//! and settled alerts age out of the active index while the bounded
//! history log retains them.
//!
//! The manager is written to from a single owner (the engine loop); it
//! has no interior locking of its own.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::error::{FoghornError, FoghornResult};
use crate::types::{AlertId, AlertStats, AnomalyAlert, MetricName, Severity};

/// Width of the deduplication bucket
const DEDUP_BUCKET_SECONDS: i64 = 300;
/// Most history entries retained (oldest evicted first)
const HISTORY_CAP: usize = 1000;
/// Low-severity alerts acknowledge themselves after this long
const AUTO_ACK_MINUTES: i64 = 5;
/// Resolved alerts leave the active index after this long
const PURGE_HOURS: i64 = 24;
/// Resolution faster than this without an ack counts as a false positive
const FALSE_POSITIVE_MINUTES: i64 = 5;

/// Key identifying an alert's deduplication window
fn bucket_key(metric: &str, timestamp: DateTime<Utc>) -> (MetricName, i64) {
    (
        metric.to_string(),
        timestamp.timestamp().div_euclid(DEDUP_BUCKET_SECONDS),
    )
}

/// Result of a maintenance sweep
#[derive(Debug, Default)]
pub struct MaintenanceOutcome {
    /// Low-severity alerts that auto-acknowledged this sweep
    pub auto_acknowledged: Vec<AnomalyAlert>,
    /// Resolved alerts dropped from the active index
    pub purged: usize,
}

/// Stateful manager for the full alert lifecycle
pub struct AlertLifecycleManager {
    /// Live alerts keyed by id (includes resolved ones until purged)
    active: HashMap<AlertId, AnomalyAlert>,
    /// Dedup index from bucket key to the surviving alert
    buckets: HashMap<(MetricName, i64), AlertId>,
    /// When each metric last raised, for cooldown checks
    last_raised: HashMap<MetricName, (AlertId, DateTime<Utc>)>,
    /// Append-only log of raised alerts, bounded to `HISTORY_CAP`
    history: VecDeque<AnomalyAlert>,
    stats: AlertStats,
}

impl AlertLifecycleManager {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
            buckets: HashMap::new(),
            last_raised: HashMap::new(),
            history: VecDeque::new(),
            stats: AlertStats::default(),
        }
    }

    /// Admit freshly detected alerts, returning only those actually raised.
    ///
    /// Per alert, in order: same-bucket duplicates collapse to the
    /// higher-confidence candidate (keeping the stored alert's id and
    /// timestamp); outside the bucket, a metric still inside `cooldown`
    /// of an unresolved alert is suppressed entirely; otherwise the alert
    /// is indexed and logged.
    pub fn ingest(
        &mut self,
        now: DateTime<Utc>,
        alerts: Vec<AnomalyAlert>,
        cooldown: Duration,
    ) -> Vec<AnomalyAlert> {
        let mut raised = Vec::new();
        for alert in alerts {
            let key = bucket_key(&alert.metric, alert.timestamp);

            if let Some(existing_id) = self.buckets.get(&key).copied() {
                if let Some(existing) = self.active.get_mut(&existing_id) {
                    if !existing.resolved {
                        if alert.confidence > existing.confidence {
                            existing.value = alert.value;
                            existing.expected_range = alert.expected_range;
                            existing.severity = alert.severity;
                            existing.confidence = alert.confidence;
                            existing.patterns = alert.patterns;
                            existing.context = alert.context;
                            existing.recommendations = alert.recommendations;
                            let updated = existing.clone();
                            self.update_history(&updated);
                            debug!(
                                metric = %updated.metric,
                                confidence = updated.confidence,
                                "Duplicate superseded by higher-confidence candidate"
                            );
                        }
                        self.stats.deduplicated += 1;
                        continue;
                    }
                }
            }

            if let Some((last_id, last_at)) = self.last_raised.get(&alert.metric) {
                let unresolved = self
                    .active
                    .get(last_id)
                    .map(|a| !a.resolved)
                    .unwrap_or(false);
                if unresolved && now - *last_at < cooldown {
                    self.stats.suppressed += 1;
                    debug!(
                        metric = %alert.metric,
                        "Alert suppressed inside cooldown window"
                    );
                    continue;
                }
            }

            self.buckets.insert(key, alert.id);
            self.last_raised
                .insert(alert.metric.clone(), (alert.id, alert.timestamp));
            self.push_history(alert.clone());
            self.active.insert(alert.id, alert.clone());
            self.stats.raised += 1;
            raised.push(alert);
        }
        raised
    }

    /// Acknowledge an alert.
    ///
    /// `Ok(Some(alert))` on a state change, `Ok(None)` when already
    /// acknowledged (idempotent), `Err(UnknownAlert)` for ids not in the
    /// active index.
    pub fn acknowledge(&mut self, id: AlertId) -> FoghornResult<Option<AnomalyAlert>> {
        let alert = self
            .active
            .get_mut(&id)
            .ok_or_else(|| FoghornError::unknown_alert(id.to_string()))?;
        if alert.acknowledged {
            return Ok(None);
        }
        alert.acknowledged = true;
        let updated = alert.clone();
        self.update_history(&updated);
        Ok(Some(updated))
    }

    /// Resolve an alert at the given time.
    ///
    /// Same contract as [`acknowledge`](Self::acknowledge): idempotent on
    /// repeats, `UnknownAlert` on unknown ids.
    pub fn resolve(
        &mut self,
        id: AlertId,
        timestamp: DateTime<Utc>,
    ) -> FoghornResult<Option<AnomalyAlert>> {
        let alert = self
            .active
            .get_mut(&id)
            .ok_or_else(|| FoghornError::unknown_alert(id.to_string()))?;
        if alert.resolved {
            return Ok(None);
        }
        alert.resolved = true;
        alert.resolved_at = Some(timestamp);
        self.stats.resolved += 1;
        if !alert.acknowledged
            && timestamp - alert.timestamp < Duration::minutes(FALSE_POSITIVE_MINUTES)
        {
            self.stats.false_positives += 1;
        }
        let updated = alert.clone();
        self.update_history(&updated);
        Ok(Some(updated))
    }

    /// Periodic sweep: auto-acknowledge stale low-severity alerts and
    /// purge long-resolved ones from the active index
    pub fn maintain(&mut self, now: DateTime<Utc>) -> MaintenanceOutcome {
        let mut outcome = MaintenanceOutcome::default();

        let auto_ack_after = Duration::minutes(AUTO_ACK_MINUTES);
        for alert in self.active.values_mut() {
            if alert.severity == Severity::Low
                && !alert.acknowledged
                && !alert.resolved
                && now - alert.timestamp >= auto_ack_after
            {
                alert.acknowledged = true;
                self.stats.auto_acknowledged += 1;
                outcome.auto_acknowledged.push(alert.clone());
            }
        }
        for alert in &outcome.auto_acknowledged {
            self.update_history(alert);
        }

        let purge_before = now - Duration::hours(PURGE_HOURS);
        let purgeable: Vec<AlertId> = self
            .active
            .values()
            .filter(|a| a.resolved && a.resolved_at.map(|t| t <= purge_before).unwrap_or(false))
            .map(|a| a.id)
            .collect();
        for id in purgeable {
            if let Some(alert) = self.active.remove(&id) {
                let key = bucket_key(&alert.metric, alert.timestamp);
                if self.buckets.get(&key) == Some(&id) {
                    self.buckets.remove(&key);
                }
                if self
                    .last_raised
                    .get(&alert.metric)
                    .map(|(last_id, _)| *last_id == id)
                    .unwrap_or(false)
                {
                    self.last_raised.remove(&alert.metric);
                }
                outcome.purged += 1;
            }
        }

        if outcome.purged > 0 || !outcome.auto_acknowledged.is_empty() {
            debug!(
                purged = outcome.purged,
                auto_acknowledged = outcome.auto_acknowledged.len(),
                "Alert maintenance sweep"
            );
        }
        outcome
    }

    /// Unresolved alerts, newest first
    pub fn active_alerts(&self) -> Vec<AnomalyAlert> {
        let mut alerts: Vec<AnomalyAlert> = self
            .active
            .values()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    pub fn unresolved_count(&self) -> usize {
        self.active.values().filter(|a| !a.resolved).count()
    }

    pub fn get(&self, id: AlertId) -> Option<&AnomalyAlert> {
        self.active.get(&id)
    }

    pub fn history(&self) -> &VecDeque<AnomalyAlert> {
        &self.history
    }

    pub fn stats(&self) -> &AlertStats {
        &self.stats
    }

    /// Rebuild the manager from an exported history log.
    ///
    /// The history is the durable record; the active and dedup indexes
    /// are derived from it.
    pub fn restore(history: Vec<AnomalyAlert>, stats: AlertStats) -> Self {
        let mut manager = Self::new();
        manager.stats = stats;
        for alert in history {
            if !alert.resolved {
                manager
                    .buckets
                    .insert(bucket_key(&alert.metric, alert.timestamp), alert.id);
                manager
                    .last_raised
                    .entry(alert.metric.clone())
                    .and_modify(|(id, at)| {
                        if alert.timestamp > *at {
                            *id = alert.id;
                            *at = alert.timestamp;
                        }
                    })
                    .or_insert((alert.id, alert.timestamp));
            }
            manager.active.insert(alert.id, alert.clone());
            manager.push_history(alert);
        }
        manager
    }

    fn push_history(&mut self, alert: AnomalyAlert) {
        self.history.push_back(alert);
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    /// Keep the history entry for an alert in step with its live state
    fn update_history(&mut self, alert: &AnomalyAlert) {
        if let Some(entry) = self.history.iter_mut().rev().find(|a| a.id == alert.id) {
            *entry = alert.clone();
        }
    }
}

impl Default for AlertLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectorKind;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn base_time() -> DateTime<Utc> {
        // On a 5-minute boundary so bucket membership is predictable
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    fn alert(metric: &str, at: DateTime<Utc>, severity: Severity, confidence: f64) -> AnomalyAlert {
        AnomalyAlert {
            id: Uuid::new_v4(),
            timestamp: at,
            metric: metric.to_string(),
            value: 99.0,
            expected_range: (10.0, 80.0),
            severity,
            confidence,
            patterns: vec!["threshold_violation".to_string()],
            context: HashMap::new(),
            recommendations: Vec::new(),
            acknowledged: false,
            resolved: false,
            resolved_at: None,
        }
    }

    fn cooldown() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn same_bucket_duplicates_collapse_to_higher_confidence() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();

        let first = alert("cpu_usage", t0, Severity::Medium, 0.6);
        let raised = manager.ingest(t0, vec![first], cooldown());
        assert_eq!(raised.len(), 1);

        // One minute later, same 5-minute bucket, higher confidence
        let t1 = t0 + Duration::minutes(1);
        let second = alert("cpu_usage", t1, Severity::High, 0.9);
        let raised = manager.ingest(t1, vec![second], cooldown());
        assert!(raised.is_empty());

        let active = manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert!((active[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(active[0].severity, Severity::High);
        assert_eq!(manager.stats().deduplicated, 1);
        assert_eq!(manager.stats().raised, 1);
    }

    #[test]
    fn lower_confidence_duplicate_is_dropped() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();

        manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.9)], cooldown());
        let t1 = t0 + Duration::minutes(2);
        manager.ingest(t1, vec![alert("cpu_usage", t1, Severity::Low, 0.6)], cooldown());

        let active = manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert!((active[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn cooldown_suppresses_then_releases() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());

        // 5 minutes later: outside the dedup bucket, inside cooldown
        let t1 = t0 + Duration::minutes(5);
        let raised = manager.ingest(t1, vec![alert("cpu_usage", t1, Severity::High, 0.8)], cooldown());
        assert!(raised.is_empty());
        assert_eq!(manager.stats().suppressed, 1);

        // 16 minutes after the original: cooldown elapsed
        let t2 = t0 + Duration::minutes(16);
        let raised = manager.ingest(t2, vec![alert("cpu_usage", t2, Severity::High, 0.8)], cooldown());
        assert_eq!(raised.len(), 1);
        assert_eq!(manager.unresolved_count(), 2);
    }

    #[test]
    fn resolved_alert_does_not_hold_cooldown() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());
        manager.resolve(raised[0].id, t0 + Duration::minutes(6)).unwrap();

        let t1 = t0 + Duration::minutes(7);
        let raised = manager.ingest(t1, vec![alert("cpu_usage", t1, Severity::High, 0.8)], cooldown());
        assert_eq!(raised.len(), 1);
    }

    #[test]
    fn acknowledge_is_idempotent_and_fails_on_unknown_ids() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());
        let id = raised[0].id;

        let first = manager.acknowledge(id).unwrap();
        assert!(first.is_some());
        let second = manager.acknowledge(id).unwrap();
        assert!(second.is_none());

        let unknown = manager.acknowledge(Uuid::new_v4());
        assert!(matches!(unknown, Err(FoghornError::UnknownAlert { .. })));
    }

    #[test]
    fn resolve_is_idempotent_and_fails_on_unknown_ids() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());
        let id = raised[0].id;

        let first = manager.resolve(id, t0 + Duration::minutes(10)).unwrap();
        assert!(first.is_some());
        assert!(first.unwrap().resolved_at.is_some());
        let second = manager.resolve(id, t0 + Duration::minutes(11)).unwrap();
        assert!(second.is_none());

        let unknown = manager.resolve(Uuid::new_v4(), t0);
        assert!(matches!(unknown, Err(FoghornError::UnknownAlert { .. })));
    }

    #[test]
    fn low_severity_alerts_auto_acknowledge_after_five_minutes() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        manager.ingest(t0, vec![alert("queue_depth", t0, Severity::Low, 0.7)], cooldown());

        let early = manager.maintain(t0 + Duration::minutes(4));
        assert!(early.auto_acknowledged.is_empty());

        let due = manager.maintain(t0 + Duration::minutes(5));
        assert_eq!(due.auto_acknowledged.len(), 1);
        assert!(due.auto_acknowledged[0].acknowledged);
        assert_eq!(manager.stats().auto_acknowledged, 1);

        // Higher severities never auto-acknowledge
        let t1 = t0 + Duration::minutes(30);
        manager.ingest(t1, vec![alert("cpu_usage", t1, Severity::High, 0.8)], cooldown());
        let later = manager.maintain(t1 + Duration::minutes(10));
        assert!(later.auto_acknowledged.is_empty());
    }

    #[test]
    fn resolved_alerts_purge_after_a_day() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());
        let id = raised[0].id;
        manager.resolve(id, t0 + Duration::hours(1)).unwrap();

        let before = manager.maintain(t0 + Duration::hours(24));
        assert_eq!(before.purged, 0);
        assert!(manager.get(id).is_some());

        let after = manager.maintain(t0 + Duration::hours(25) + Duration::minutes(1));
        assert_eq!(after.purged, 1);
        assert!(manager.get(id).is_none());
        // History still remembers the alert
        assert_eq!(manager.history().len(), 1);
    }

    #[test]
    fn history_is_capped_fifo() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        for i in 0..1005 {
            let metric = format!("metric_{}", i);
            manager.ingest(t0, vec![alert(&metric, t0, Severity::High, 0.8)], cooldown());
        }
        assert_eq!(manager.history().len(), 1000);
        assert_eq!(manager.history().front().unwrap().metric, "metric_5");
        assert_eq!(manager.history().back().unwrap().metric, "metric_1004");
    }

    #[test]
    fn fast_unacknowledged_resolution_counts_as_false_positive() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::High, 0.8)], cooldown());
        manager.resolve(raised[0].id, t0 + Duration::minutes(3)).unwrap();
        assert_eq!(manager.stats().false_positives, 1);

        let t1 = t0 + Duration::minutes(20);
        let raised = manager.ingest(t1, vec![alert("error_rate", t1, Severity::High, 0.8)], cooldown());
        let id = raised[0].id;
        manager.acknowledge(id).unwrap();
        manager.resolve(id, t1 + Duration::minutes(2)).unwrap();
        // Acknowledged first, so not a false positive
        assert_eq!(manager.stats().false_positives, 1);
    }

    #[test]
    fn restore_rebuilds_indexes_from_history() {
        let mut manager = AlertLifecycleManager::new();
        let t0 = base_time();
        let raised = manager.ingest(t0, vec![alert("cpu_usage", t0, Severity::Critical, 0.9)], cooldown());
        let id = raised[0].id;
        let t1 = t0 + Duration::minutes(20);
        manager.ingest(t1, vec![alert("error_rate", t1, Severity::Medium, 0.7)], cooldown());

        let restored = AlertLifecycleManager::restore(
            manager.history().iter().cloned().collect(),
            manager.stats().clone(),
        );
        assert_eq!(restored.unresolved_count(), 2);
        assert_eq!(restored.get(id).unwrap().severity, Severity::Critical);
        assert_eq!(restored.stats().raised, 2);

        // Cooldown state survives the rebuild
        let mut restored = restored;
        let t2 = t1 + Duration::minutes(6);
        let raised = restored.ingest(t2, vec![alert("error_rate", t2, Severity::Medium, 0.7)], cooldown());
        assert!(raised.is_empty());
    }
}
