//! Skills: deterministic, non-LLM operations run as pipeline stages.
//!
//! - [`ContextLoader`] gathers everything a pipeline run needs in one batch.
//! - [`ActivitySync`] reconciles the latest device activity with the plan.
//! - [`HealthSync`] pulls one day of recovery metrics from the device.
//!
//! The fitness device is reached through the [`DeviceClient`] trait;
//! [`HttpDeviceClient`] is the production implementation.

pub mod activity_sync;
pub mod context;
pub mod device;
pub mod health_sync;

pub use activity_sync::{ActivitySync, SyncAction, SyncConfig, SyncFailure, SyncOptions, SyncOutcome};
pub use context::{ContextConfig, ContextLoader, today_in};
pub use device::{
    ActivityDetail, BodyBattery, DailySummary, DeviceActivity, DeviceClient, DeviceConfig,
    HrvSummary, HttpDeviceClient, SleepSummary,
};
pub use health_sync::{HealthSync, HealthSyncReport};
