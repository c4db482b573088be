//! Daily health sync.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use stride_common::{HealthSample, Logger, Result, Store};
use tracing::{Instrument, info, warn};

use crate::device::DeviceClient;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSyncReport {
    pub sample: HealthSample,
    /// Sources that returned data.
    pub fetched: Vec<&'static str>,
    /// Sources whose request failed.
    pub failed: Vec<&'static str>,
}

/// Pulls one day of recovery metrics from the device into the store.
pub struct HealthSync {
    device: Arc<dyn DeviceClient>,
    store: Arc<dyn Store>,
    log: Logger,
}

impl HealthSync {
    pub fn new(device: Arc<dyn DeviceClient>, store: Arc<dyn Store>, log: Logger) -> Self {
        Self { device, store, log }
    }

    /// Fetch the daily summary, sleep, HRV and body battery for `date`.
    ///
    /// Each source is optional; a failing one is recorded in the report and
    /// the rest still land. Only a connect or store failure is an error.
    pub async fn sync_day(&self, user_id: &str, date: NaiveDate) -> Result<HealthSyncReport> {
        let span = self.log.with_user(user_id).span();
        async {
            let report = match self.device.connect().await {
                Ok(()) => Ok(self.collect(user_id, date).await),
                Err(e) => Err(e),
            };
            if let Err(e) = self.device.disconnect().await {
                warn!(error = %e, "Device disconnect failed");
            }
            let report = report?;

            if !report.sample.is_empty() {
                self.store.upsert_health(&report.sample).await?;
            }
            info!(
                date = %date,
                fetched = ?report.fetched,
                failed = ?report.failed,
                "Health sync finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn collect(&self, user_id: &str, date: NaiveDate) -> HealthSyncReport {
        let device = &self.device;
        let (daily, sleep, hrv, battery) = tokio::join!(
            device.daily_summary(date),
            device.sleep(date),
            device.hrv(date),
            device.body_battery(date),
        );

        let mut report = HealthSyncReport {
            sample: HealthSample {
                user_id: user_id.to_string(),
                date,
                ..Default::default()
            },
            fetched: Vec::new(),
            failed: Vec::new(),
        };

        if let Some(daily) = report.track("daily", daily) {
            report.sample.resting_hr = daily.resting_hr;
            report.sample.stress = daily.stress_avg;
            report.sample.steps = daily.steps;
        }
        if let Some(sleep) = report.track("sleep", sleep) {
            report.sample.sleep_hours = sleep.duration_s.map(|s| f64::from(s) / 3600.0);
            report.sample.sleep_score = sleep.score;
        }
        if let Some(hrv) = report.track("hrv", hrv) {
            report.sample.hrv_ms = hrv.last_night_avg_ms;
        }
        if let Some(battery) = report.track("body_battery", battery) {
            report.sample.body_battery = battery.highest.or(battery.charged);
        }
        report
    }
}

impl HealthSyncReport {
    fn track<T>(&mut self, source: &'static str, result: Result<Option<T>>) -> Option<T> {
        match result {
            Ok(Some(value)) => {
                self.fetched.push(source);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(source = source, error = %e, "Health source failed");
                self.failed.push(source);
                None
            }
        }
    }
}
