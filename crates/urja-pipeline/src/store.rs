//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Time-series store seam and the bundled in-memory implementation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::resample;
use crate::errors::{PipelineError, Result};
use crate::range::{Granularity, TimeRange};
use crate::sample::{ConsumptionReading, EnergySample};

/// Persistent consumption storage keyed by user.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync + 'static {
    /// Append samples for `user_id`, returning how many were stored.
    ///
    /// Samples the store refuses, such as ones already past retention, are not
    /// counted.
    async fn write(&self, user_id: &str, samples: &[EnergySample]) -> Result<usize>;

    /// Raw samples for `user_id` at or after `since`, in timestamp order.
    async fn samples_since(&self, user_id: &str, since: DateTime<Utc>)
        -> Result<Vec<EnergySample>>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;

    /// Mean-aggregated readings covering `range`, windowed by `granularity` or the
    /// range default.
    async fn query(
        &self,
        user_id: &str,
        range: TimeRange,
        granularity: Option<Granularity>,
    ) -> Result<Vec<ConsumptionReading>> {
        let since = Utc::now() - range.span();
        let samples = self.samples_since(user_id, since).await?;
        let granularity = granularity.unwrap_or_else(|| range.default_granularity());
        Ok(resample(&samples, granularity)
            .iter()
            .map(ConsumptionReading::from)
            .collect())
    }
}

/// Current figures derived from a user's stored samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesStats {
    pub current_consumption: f64,
    pub today_total: f64,
    pub estimated_cost: f64,
    pub active_devices: usize,
    pub timestamp: DateTime<Utc>,
}

/// Compute [`TimeSeriesStats`] as of `now`.
///
/// `currentConsumption` sums the most recent timestamp, today's figures start at
/// UTC midnight and active devices are those reporting within the last hour.
pub async fn realtime_stats(
    store: &dyn TimeSeriesStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<TimeSeriesStats> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    let hour_ago = now - Duration::hours(1);
    let since = midnight.min(hour_ago);
    let samples = store.samples_since(user_id, since).await?;

    let latest = samples
        .iter()
        .filter(|s| s.timestamp <= now)
        .map(|s| s.timestamp)
        .max();
    let current_consumption = latest
        .map(|at| {
            samples
                .iter()
                .filter(|s| s.timestamp == at)
                .fold(0.0, |acc, s| acc + s.consumption_kwh)
        })
        .unwrap_or(0.0);

    let today: Vec<&EnergySample> = samples
        .iter()
        .filter(|s| s.timestamp >= midnight && s.timestamp <= now)
        .collect();
    let active_devices = samples
        .iter()
        .filter(|s| s.timestamp >= hour_ago && s.timestamp <= now)
        .map(|s| s.device_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    Ok(TimeSeriesStats {
        current_consumption,
        today_total: today.iter().fold(0.0, |acc, s| acc + s.consumption_kwh),
        estimated_cost: today.iter().fold(0.0, |acc, s| acc + s.cost_local),
        active_devices,
        timestamp: latest.unwrap_or(now),
    })
}

/// Process-local store trimmed to a retention window on every write.
#[derive(Debug)]
pub struct InMemoryStore {
    retention: Duration,
    users: RwLock<HashMap<String, Vec<EnergySample>>>,
}

impl InMemoryStore {
    pub fn new(retention: std::time::Duration) -> Result<Self> {
        let retention = Duration::from_std(retention)
            .map_err(|err| PipelineError::InvalidConfig(format!("store retention: {err}")))?;
        Ok(Self {
            retention,
            users: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryStore {
    async fn write(&self, user_id: &str, samples: &[EnergySample]) -> Result<usize> {
        let cutoff = Utc::now() - self.retention;
        let fresh: Vec<EnergySample> = samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();
        let refused = samples.len() - fresh.len();
        let written = fresh.len();

        let mut users = self.users.write();
        let series = users.entry(user_id.to_owned()).or_default();
        series.extend(fresh);
        series.sort_by_key(|s| s.timestamp);
        let before = series.len();
        series.retain(|s| s.timestamp >= cutoff);
        let expired = before - series.len();
        debug!(user_id, written, refused, expired, "store write");
        Ok(written)
    }

    async fn samples_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<EnergySample>> {
        let users = self.users.read();
        Ok(users
            .get(user_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(device: &str, at: DateTime<Utc>, kwh: f64) -> EnergySample {
        EnergySample::from(ConsumptionReading {
            timestamp: at,
            consumption_kwh: kwh,
            cost_local: kwh * 6.5,
            device_id: Some(device.to_owned()),
        })
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(std::time::Duration::from_secs(24 * 60 * 60)).unwrap()
    }

    #[tokio::test]
    async fn write_trims_expired_samples() {
        let store = store();
        let now = Utc::now();
        let written = store
            .write(
                "u1",
                &[
                    reading("dev_001", now - Duration::hours(30), 1.0),
                    reading("dev_001", now - Duration::minutes(5), 2.0),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
        let kept = store
            .samples_since("u1", now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].consumption_kwh, 2.0);
        assert!(store
            .samples_since("someone-else", now - Duration::days(7))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn write_counts_only_samples_inside_retention() {
        let store = store();
        let stale: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
        let written = store
            .write("u1", &[reading("dev_001", stale, 1.0)])
            .await
            .unwrap();
        assert_eq!(written, 0);
        let stats = realtime_stats(&store, "u1", Utc::now()).await.unwrap();
        assert_eq!(stats.active_devices, 0);
    }

    #[tokio::test]
    async fn stats_for_an_empty_user_are_positive_zero() {
        let stats = realtime_stats(&store(), "nobody", Utc::now()).await.unwrap();
        assert!(stats.today_total == 0.0 && stats.today_total.is_sign_positive());
        assert!(stats.estimated_cost.is_sign_positive());
        assert!(stats.current_consumption.is_sign_positive());
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("-0.0"));
    }

    #[tokio::test]
    async fn query_resamples_into_readings() {
        let store = store();
        let now = Utc::now();
        store
            .write(
                "u1",
                &[
                    reading("dev_001", now - Duration::minutes(3), 1.0),
                    reading("dev_001", now - Duration::minutes(2), 3.0),
                ],
            )
            .await
            .unwrap();
        let readings = store
            .query("u1", TimeRange::Hour, Some("1h".parse().unwrap()))
            .await
            .unwrap();
        let total: f64 = readings.iter().map(|r| r.consumption_kwh).sum();
        // Both samples fall in one or two hourly windows depending on the wall clock.
        assert!(readings.len() == 1 && total == 2.0 || readings.len() == 2 && total == 4.0);
        assert!(readings
            .iter()
            .all(|r| r.device_id.as_deref() == Some("dev_001")));
    }

    #[tokio::test]
    async fn stats_cover_latest_batch_and_today() {
        let store = store();
        let now = Utc::now();
        let latest = now - Duration::seconds(10);
        store
            .write(
                "u1",
                &[
                    reading("dev_001", latest, 1.0),
                    reading("dev_002", latest, 0.5),
                    reading("dev_003", latest - Duration::seconds(30), 0.25),
                ],
            )
            .await
            .unwrap();
        let stats = realtime_stats(&store, "u1", now).await.unwrap();
        assert_eq!(stats.current_consumption, 1.5);
        assert_eq!(stats.active_devices, 3);
        assert_eq!(stats.timestamp, latest);
    }
}
