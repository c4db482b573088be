//! Fitness device API client.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use stride_common::{CoachError, Result, Split};
use tokio::sync::Mutex;
use tracing::debug;

const SERVICE: &str = "device";

/// A recorded activity as listed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceActivity {
    pub activity_id: String,
    /// Activity type key, e.g. "running", "trail_running", "cycling".
    pub kind: String,
    pub name: String,
    /// Start time in the athlete's local time.
    pub start_local: NaiveDateTime,
    pub duration_s: f64,
    pub distance_m: f64,
    #[serde(default)]
    pub avg_hr: Option<u32>,
    #[serde(default)]
    pub max_hr: Option<u32>,
}

/// Detail view of one activity. Lap data is only sometimes embedded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetail {
    #[serde(default)]
    pub laps: Vec<Split>,
    #[serde(default)]
    pub split_summaries: Vec<Split>,
}

impl ActivityDetail {
    /// Embedded lap data, preferring laps over split summaries.
    pub fn embedded_splits(self) -> Vec<Split> {
        if self.laps.is_empty() {
            self.split_summaries
        } else {
            self.laps
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    #[serde(default)]
    pub resting_hr: Option<u32>,
    #[serde(default)]
    pub stress_avg: Option<u32>,
    #[serde(default)]
    pub steps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    #[serde(default)]
    pub duration_s: Option<u32>,
    #[serde(default)]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    #[serde(default)]
    pub last_night_avg_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyBattery {
    #[serde(default)]
    pub charged: Option<u32>,
    #[serde(default)]
    pub highest: Option<u32>,
}

/// The external fitness-tracker API. Calls between `connect` and
/// `disconnect` share one authenticated session.
///
/// A client may be shared by concurrent callers. Every `connect` is paired
/// with one `disconnect`, and one caller's `disconnect` must not end the
/// session another caller is still using.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Short provider tag used to qualify external ids.
    fn provider(&self) -> &str;

    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;

    /// Most recent activities, newest first.
    async fn recent_activities(&self, limit: usize) -> Result<Vec<DeviceActivity>>;
    async fn activity_splits(&self, activity_id: &str) -> Result<Vec<Split>>;
    async fn activity_detail(&self, activity_id: &str) -> Result<ActivityDetail>;

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>>;
    async fn sleep(&self, date: NaiveDate) -> Result<Option<SleepSummary>>;
    async fn hrv(&self, date: NaiveDate) -> Result<Option<HrvSummary>>;
    async fn body_battery(&self, date: NaiveDate) -> Result<Option<BodyBattery>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API token; falls back to `STRIDE_DEVICE_TOKEN`.
    pub token: Option<String>,
}

fn default_provider() -> String {
    "garmin".into()
}

fn default_base_url() -> String {
    "http://localhost:8089/api".into()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            token: None,
        }
    }
}

impl DeviceConfig {
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("STRIDE_DEVICE_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    session_token: String,
}

/// The gateway session shared by every caller of one client.
#[derive(Default)]
struct SharedSession {
    token: Option<String>,
    holders: usize,
}

/// HTTP client for a device gateway exposing JSON endpoints.
///
/// One client is shared across pipelines and users. Each `connect` takes a
/// hold on a single gateway session and each `disconnect` releases one; the
/// session is only closed when the last holder releases it.
pub struct HttpDeviceClient {
    provider: String,
    base_url: String,
    token: String,
    session: Mutex<SharedSession>,
    http_client: reqwest::Client,
}

impl HttpDeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let token = config.resolve_token().ok_or_else(|| {
            CoachError::Config("device token missing (set device.token or STRIDE_DEVICE_TOKEN)".into())
        })?;
        Ok(Self {
            provider: config.provider.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            session: Mutex::new(SharedSession::default()),
            http_client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn session_token(&self) -> Result<String> {
        self.session
            .lock()
            .await
            .token
            .clone()
            .ok_or_else(|| CoachError::integration(SERVICE, "not connected", false))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let token = self.session_token().await?;
        let url = self.url(path);
        debug!(url = %url, "Device request");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CoachError::integration(SERVICE, format!("request failed: {e}"), true))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::http_status(SERVICE, status.as_u16(), body));
        }

        response.json().await.map(Some).map_err(|e| {
            CoachError::integration(SERVICE, format!("failed to parse {path}: {e}"), false)
        })
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn connect(&self) -> Result<()> {
        // Held across the login so concurrent callers share one session.
        let mut session = self.session.lock().await;
        if session.token.is_some() {
            session.holders += 1;
            debug!(holders = session.holders, "Reusing device session");
            return Ok(());
        }

        let response = self
            .http_client
            .post(self.url("auth/session"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| CoachError::integration(SERVICE, format!("connect failed: {e}"), true))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::http_status(SERVICE, status.as_u16(), body));
        }
        let login: SessionResponse = response.json().await.map_err(|e| {
            CoachError::integration(SERVICE, format!("bad session response: {e}"), false)
        })?;
        session.token = Some(login.session_token);
        session.holders = 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.holders > 1 {
            session.holders -= 1;
            return Ok(());
        }
        session.holders = 0;
        let Some(token) = session.token.take() else {
            return Ok(());
        };
        self.http_client
            .delete(self.url("auth/session"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CoachError::integration(SERVICE, format!("disconnect failed: {e}"), true))?;
        Ok(())
    }

    async fn recent_activities(&self, limit: usize) -> Result<Vec<DeviceActivity>> {
        Ok(self
            .get(&format!("activities?limit={limit}"))
            .await?
            .unwrap_or_default())
    }

    async fn activity_splits(&self, activity_id: &str) -> Result<Vec<Split>> {
        Ok(self
            .get(&format!("activities/{activity_id}/splits"))
            .await?
            .unwrap_or_default())
    }

    async fn activity_detail(&self, activity_id: &str) -> Result<ActivityDetail> {
        self.get(&format!("activities/{activity_id}"))
            .await?
            .ok_or_else(|| CoachError::not_found("activity", activity_id))
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        self.get(&format!("wellness/daily/{date}")).await
    }

    async fn sleep(&self, date: NaiveDate) -> Result<Option<SleepSummary>> {
        self.get(&format!("wellness/sleep/{date}")).await
    }

    async fn hrv(&self, date: NaiveDate) -> Result<Option<HrvSummary>> {
        self.get(&format!("wellness/hrv/{date}")).await
    }

    async fn body_battery(&self, date: NaiveDate) -> Result<Option<BodyBattery>> {
        self.get(&format!("wellness/body-battery/{date}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpDeviceClient {
        HttpDeviceClient::new(&DeviceConfig {
            provider: "garmin".into(),
            base_url: "http://gateway:8089/api/".into(),
            token: Some("tok".into()),
        })
        .unwrap()
    }

    #[test]
    fn builds_urls_without_double_slashes() {
        let c = client();
        assert_eq!(c.url("/activities?limit=5"), "http://gateway:8089/api/activities?limit=5");
        assert_eq!(c.url("wellness/hrv/2026-03-01"), "http://gateway:8089/api/wellness/hrv/2026-03-01");
    }

    #[tokio::test]
    async fn calls_require_a_session() {
        let c = client();
        let err = c.recent_activities(5).await.unwrap_err();
        assert!(err.to_string().contains("not connected"));
        // Disconnecting without a session is a no-op.
        assert!(c.disconnect().await.is_ok());
    }

    #[test]
    fn embedded_splits_prefer_laps() {
        let lap = Split { index: 1, distance_m: 1000.0, duration_s: 290.0, avg_hr: None };
        let summary = Split { index: 1, distance_m: 5000.0, duration_s: 1500.0, avg_hr: None };
        let detail = ActivityDetail { laps: vec![lap.clone()], split_summaries: vec![summary.clone()] };
        assert_eq!(detail.embedded_splits(), vec![lap]);
        let detail = ActivityDetail { laps: vec![], split_summaries: vec![summary.clone()] };
        assert_eq!(detail.embedded_splits(), vec![summary]);
    }

    #[test]
    fn activity_parses_with_optional_hr() {
        let activity: DeviceActivity = serde_json::from_value(serde_json::json!({
            "activity_id": "9001",
            "kind": "running",
            "name": "Morning Run",
            "start_local": "2026-03-02T06:45:00",
            "duration_s": 2400.0,
            "distance_m": 8000.0
        }))
        .unwrap();
        assert_eq!(activity.avg_hr, None);
        assert_eq!(activity.start_local.date(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }
}
