//! Stage bookkeeping for pipelines.
//!
//! A pipeline runs its stages in a fixed order through a [`StageRecorder`].
//! Each stage is timed and recorded as succeeded, failed or skipped. A failed
//! stage is recorded and the pipeline carries on with whatever does not
//! depend on it.
//!
//! # Example
//!
//! ```ignore
//! let mut stages = StageRecorder::new(log);
//! let ctx = stages.run("context", loader.load(user, tz)).await;
//! match &ctx {
//!     Some(ctx) => { stages.run("briefing", harness.execute(&coach, ctx, opts)).await; }
//!     None => stages.skip("briefing", "context unavailable"),
//! }
//! let records = stages.finish();
//! ```

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use stride_common::{Logger, Result};
use tracing::{Instrument, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Result of a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Failure message, or the reason a stage was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured details of the failure (agent and phase, service, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_context: Option<serde_json::Value>,
}

pub struct StageRecorder {
    records: Vec<StageRecord>,
    log: Logger,
}

impl StageRecorder {
    pub fn new(log: Logger) -> Self {
        Self {
            records: Vec::new(),
            log,
        }
    }

    /// Run one stage, recording its outcome. Returns the value on success
    /// and `None` on failure; the error itself ends up in the record.
    pub async fn run<T, F>(&mut self, name: &str, stage: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = self.log.scoped("stage", name).span();
        let started = Instant::now();
        let outcome = stage.instrument(span.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                info!(parent: &span, stage = %name, duration_ms, "Stage succeeded");
                self.records.push(StageRecord {
                    name: name.to_string(),
                    status: StageStatus::Succeeded,
                    duration_ms,
                    error_code: None,
                    error: None,
                    error_context: None,
                });
                Some(value)
            }
            Err(e) => {
                warn!(parent: &span, stage = %name, duration_ms, code = e.code(), error = %e, "Stage failed");
                self.records.push(StageRecord {
                    name: name.to_string(),
                    status: StageStatus::Failed,
                    duration_ms,
                    error_code: Some(e.code().to_string()),
                    error: Some(e.to_string()),
                    error_context: Some(e.context()).filter(|c| !c.is_null()),
                });
                None
            }
        }
    }

    /// Record a success for a stage that reports its outcome as a value.
    pub fn succeed(&mut self, name: &str, duration_ms: u64) {
        info!(parent: &self.log.span(), stage = %name, duration_ms, "Stage succeeded");
        self.records.push(StageRecord {
            name: name.to_string(),
            status: StageStatus::Succeeded,
            duration_ms,
            error_code: None,
            error: None,
            error_context: None,
        });
    }

    /// Record a failure that was reported as a value rather than an error.
    pub fn fail(&mut self, name: &str, code: &str, message: impl Into<String>, duration_ms: u64) {
        let message = message.into();
        warn!(parent: &self.log.span(), stage = %name, code = %code, error = %message, "Stage failed");
        self.records.push(StageRecord {
            name: name.to_string(),
            status: StageStatus::Failed,
            duration_ms,
            error_code: Some(code.to_string()),
            error: Some(message),
            error_context: None,
        });
    }

    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        info!(parent: &self.log.span(), stage = %name, reason = %reason, "Stage skipped");
        self.records.push(StageRecord {
            name: name.to_string(),
            status: StageStatus::Skipped,
            duration_ms: 0,
            error_code: None,
            error: Some(reason),
            error_context: None,
        });
    }

    pub fn any_failed(&self) -> bool {
        self.records.iter().any(|r| r.status == StageStatus::Failed)
    }

    pub fn finish(self) -> Vec<StageRecord> {
        self.records
    }
}
