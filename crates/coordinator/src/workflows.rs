//! The workflow orchestrator.
//!
//! A [`Coordinator`] owns every component of a deployment and runs the named
//! pipelines. Each pipeline is one sequential flow through a
//! [`StageRecorder`]: a failed stage is recorded and the run carries on with
//! whatever does not depend on it. Pipelines never return errors; the
//! outcome of each stage is in the [`PipelineResult`].
//!
//! | Pipeline | Stages |
//! |---|---|
//! | morning briefing | health_sync → context → readiness, briefing |
//! | chat reply | route → context → reply |
//! | post activity | sync → context → analysis, plan_adjustment, recovery |
//! | weekly review | context → weekly_summary → plan_review |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use stride_agents::{
    AgentHarness, AgentResult, AnalystAgent, CoachAgent, CoachAgentDef, ExecuteOptions,
    PlannerAgent, StageRecord, StageRecorder, TextSink, ToolRegistry, WellnessAgent,
};
use stride_common::{AgentContext, ChatTurn, CoachError, Logger, Result, Store, TaskKind};
use stride_llm::{ConversationService, LlmClient, build_conversation_service, build_llm_client};
use stride_skills::{
    ActivitySync, ContextLoader, DeviceClient, HealthSync, HealthSyncReport, HttpDeviceClient,
    SyncAction, SyncOptions, SyncOutcome, today_in,
};
use stride_store::SqliteStore;
use stride_whiteboard::Whiteboard;
use tracing::{Instrument, info, warn};

use crate::config::StrideConfig;
use crate::router::{MessageRouter, RouteResult};
use crate::session::SessionCache;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub pipeline: &'static str,
    pub user_id: String,
    pub date: NaiveDate,
    pub stages: Vec<StageRecord>,
    /// Agent results keyed by stage name.
    pub outputs: BTreeMap<String, AgentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteResult>,
    /// Text for the user, when the pipeline produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSyncReport>,
    /// True iff no stage failed.
    pub success: bool,
    pub duration_ms: u64,
}

impl PipelineResult {
    fn new(pipeline: &'static str, user_id: &str, date: NaiveDate) -> Self {
        Self {
            pipeline,
            user_id: user_id.to_string(),
            date,
            stages: Vec::new(),
            outputs: BTreeMap::new(),
            route: None,
            reply: None,
            session_id: None,
            sync: None,
            health: None,
            success: false,
            duration_ms: 0,
        }
    }

    fn finish(mut self, stages: StageRecorder, started: Instant) -> Self {
        self.success = !stages.any_failed();
        self.stages = stages.finish();
        self.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pipeline = self.pipeline,
            success = self.success,
            duration_ms = self.duration_ms,
            "Pipeline finished"
        );
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// The external pieces a coordinator runs against.
pub struct CoordinatorParts {
    pub store: Arc<dyn Store>,
    pub conversation: Arc<dyn ConversationService>,
    /// Completion client for the router's classifier tier.
    pub classifier: Option<Arc<dyn LlmClient>>,
    /// Fitness device. Without one the sync stages cannot run.
    pub device: Option<Arc<dyn DeviceClient>>,
}

pub struct Coordinator {
    loader: ContextLoader,
    harness: AgentHarness,
    router: MessageRouter,
    whiteboard: Whiteboard,
    activity_sync: Option<ActivitySync>,
    health_sync: Option<HealthSync>,
    sessions: SessionCache,
    coach: CoachAgentDef,
    wellness: WellnessAgent,
    analyst: AnalystAgent,
    planner: PlannerAgent,
    log: Logger,
}

impl Coordinator {
    pub fn new(config: &StrideConfig, parts: CoordinatorParts, log: Logger) -> Result<Self> {
        let store = parts.store;
        let whiteboard = Whiteboard::new(
            store.clone(),
            config.whiteboard.clone(),
            log.child("whiteboard"),
        );
        let loader = ContextLoader::new(
            store.clone(),
            whiteboard.clone(),
            config.context.clone(),
            log.child("context"),
        );
        let harness = AgentHarness::new(
            parts.conversation,
            ToolRegistry::standard(whiteboard.clone()),
            config.harness.clone(),
            log.child("harness"),
        );
        let router = MessageRouter::new(
            config.router.clone(),
            parts.classifier,
            log.child("router"),
        )?;

        let activity_sync = parts.device.clone().map(|device| {
            ActivitySync::new(
                device,
                store.clone(),
                config.sync.clone(),
                log.child("activity_sync"),
            )
            .with_whiteboard(whiteboard.clone())
        });
        let health_sync = parts
            .device
            .map(|device| HealthSync::new(device, store.clone(), log.child("health_sync")));

        info!(
            device = activity_sync.is_some(),
            default_agent = %config.router.default_agent,
            "Coordinator ready"
        );

        Ok(Self {
            loader,
            harness,
            router,
            whiteboard,
            activity_sync,
            health_sync,
            sessions: SessionCache::new(Duration::from_secs(config.session.ttl_secs)),
            coach: CoachAgentDef::with_default_config(),
            wellness: WellnessAgent::with_default_config(),
            analyst: AnalystAgent::with_default_config(),
            planner: PlannerAgent::with_default_config(),
            log,
        })
    }

    /// Build every component from configuration: the SQLite store, the
    /// conversation service, the classifier and the device client.
    ///
    /// A classifier that cannot be built is logged and left out, so routing
    /// falls back to keywords. A missing device token leaves the device out.
    pub fn from_config(config: &StrideConfig, log: Logger) -> Result<Self> {
        if let Some(parent) = config.store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.store.path)?);
        let conversation = build_conversation_service(&config.llm)?;

        let classifier = match &config.router.classifier {
            Some(classifier) => match build_llm_client(classifier) {
                Ok(client) => {
                    info!(model = %classifier.model, "Router classifier initialized");
                    Some(client)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to initialize router classifier, using keyword fallback");
                    None
                }
            },
            None => None,
        };

        let device: Option<Arc<dyn DeviceClient>> = if config.device.resolve_token().is_some() {
            Some(Arc::new(HttpDeviceClient::new(&config.device)?))
        } else {
            info!("No device token configured; sync stages will not run");
            None
        };

        Self::new(
            config,
            CoordinatorParts {
                store,
                conversation,
                classifier,
                device,
            },
            log,
        )
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.whiteboard
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// End the conversations behind session ids the cache has let go of.
    async fn end_dropped_sessions(&self) {
        for session_id in self.sessions.drain_dropped() {
            self.harness.end_session(&session_id).await;
        }
    }

    /// The agent registered under `id`.
    pub fn agent(&self, id: &str) -> Option<&dyn CoachAgent> {
        let agents: [&dyn CoachAgent; 4] =
            [&self.coach, &self.wellness, &self.analyst, &self.planner];
        agents.into_iter().find(|a| a.id() == id)
    }

    /// Pull last night's recovery data, then have the wellness agent assess
    /// readiness and the coach write the day's briefing.
    pub async fn morning_briefing(
        &self,
        user_id: &str,
        timezone: Tz,
        date: Option<NaiveDate>,
    ) -> PipelineResult {
        let started = Instant::now();
        let date = date.unwrap_or_else(|| today_in(timezone));
        let log = self.log.with_user(user_id).scoped("pipeline", "morning_briefing");
        let mut stages = StageRecorder::new(log.clone());
        let mut result = PipelineResult::new("morning_briefing", user_id, date);

        async {
            match &self.health_sync {
                Some(health) => {
                    result.health = stages.run("health_sync", health.sync_day(user_id, date)).await;
                }
                None => stages.skip("health_sync", "no device configured"),
            }

            let Some(ctx) = stages
                .run("context", self.loader.load_at(user_id, timezone, date))
                .await
            else {
                skip_all(&mut stages, &["readiness", "briefing"], "context unavailable");
                return;
            };

            self.agent_stage(&mut stages, &mut result, "readiness", &self.wellness, &ctx, TaskKind::ReadinessCheck)
                .await;
            if let Some(briefing) = self
                .agent_stage(&mut stages, &mut result, "briefing", &self.coach, &ctx, TaskKind::MorningBriefing)
                .await
            {
                result.reply = Some(briefing);
            }
        }
        .instrument(log.span())
        .await;

        result.finish(stages, started)
    }

    /// Route a chat message and answer it with the chosen agent, resuming
    /// the user's cached session with that agent. When `on_text` is given,
    /// reply text is streamed to it as it arrives.
    pub async fn chat_reply(
        &self,
        user_id: &str,
        timezone: Tz,
        message: &str,
        history: &[ChatTurn],
        on_text: Option<TextSink<'_>>,
    ) -> PipelineResult {
        let started = Instant::now();
        let log = self.log.with_user(user_id).scoped("pipeline", "chat_reply");
        let mut stages = StageRecorder::new(log.clone());
        let mut result = PipelineResult::new("chat_reply", user_id, today_in(timezone));

        async {
            let route_started = Instant::now();
            let route = self.router.route(message, history).await;
            stages.succeed("route", route_started.elapsed().as_millis() as u64);
            let agent_id = route.agent_id.clone();
            result.route = Some(route);

            let Some(ctx) = stages
                .run("context", self.loader.load_at(user_id, timezone, result.date))
                .await
            else {
                stages.skip("reply", "context unavailable");
                return;
            };
            let ctx = ctx.with_task(TaskKind::chat(message, history.to_vec()));

            let resume = self.sessions.get(user_id, &agent_id);
            let options = ExecuteOptions {
                resume_session: resume.clone(),
                ..Default::default()
            };
            let reply = stages
                .run("reply", async {
                    let agent = self
                        .agent(&agent_id)
                        .ok_or_else(|| CoachError::not_found("agent", &agent_id))?;
                    match on_text {
                        Some(sink) => self.harness.execute_streaming(agent, &ctx, options, sink).await,
                        None => self.harness.execute(agent, &ctx, options).await,
                    }
                })
                .await;

            match reply {
                Some(reply) => {
                    self.sessions.put(user_id, &agent_id, reply.session_id.clone());
                    result.reply = Some(reply.text.clone());
                    result.session_id = Some(reply.session_id.clone());
                    result.outputs.insert("reply".into(), reply);
                }
                None if resume.is_some() => {
                    // The next message starts a fresh conversation.
                    self.sessions.invalidate(user_id, &agent_id);
                }
                None => {}
            }
            self.end_dropped_sessions().await;
        }
        .instrument(log.span())
        .await;

        result.finish(stages, started)
    }

    /// Sync the day's device activity, then analyse it, adjust the plan and
    /// check recovery. Runs without agents when there is nothing new.
    pub async fn post_activity(
        &self,
        user_id: &str,
        timezone: Tz,
        options: SyncOptions,
    ) -> PipelineResult {
        const AFTER_SYNC: &[&str] = &["context", "analysis", "plan_adjustment", "recovery"];

        let started = Instant::now();
        let date = options.date.unwrap_or_else(|| today_in(timezone));
        let log = self.log.with_user(user_id).scoped("pipeline", "post_activity");
        let mut stages = StageRecorder::new(log.clone());
        let mut result = PipelineResult::new("post_activity", user_id, date);

        async {
            let Some(sync) = &self.activity_sync else {
                stages.fail("sync", "CONFIG_ERROR", "no device configured", 0);
                skip_all(&mut stages, AFTER_SYNC, "sync failed");
                return;
            };

            let sync_started = Instant::now();
            let outcome = sync
                .sync(
                    user_id,
                    timezone,
                    SyncOptions {
                        date: Some(date),
                        ..options
                    },
                )
                .await;
            let sync_ms = sync_started.elapsed().as_millis() as u64;

            let workout = match &outcome.error {
                Some(error) => {
                    stages.fail("sync", &error.code, error.message.clone(), sync_ms);
                    skip_all(&mut stages, AFTER_SYNC, "sync failed");
                    None
                }
                None => {
                    stages.succeed("sync", sync_ms);
                    match (outcome.action, &outcome.record) {
                        (Some(SyncAction::Created | SyncAction::Updated), Some(record)) => {
                            Some(record.clone())
                        }
                        (Some(SyncAction::AlreadySynced), _) => {
                            skip_all(&mut stages, AFTER_SYNC, "activity already synced");
                            None
                        }
                        _ => {
                            skip_all(&mut stages, AFTER_SYNC, "no activity to analyse");
                            None
                        }
                    }
                }
            };
            result.sync = Some(outcome);

            let Some(workout) = workout else {
                return;
            };

            let Some(ctx) = stages
                .run("context", self.loader.load_at(user_id, timezone, workout.date))
                .await
            else {
                skip_all(&mut stages, &AFTER_SYNC[1..], "context unavailable");
                return;
            };

            let workout_id = workout.id;
            self.agent_stage(
                &mut stages,
                &mut result,
                "analysis",
                &self.analyst,
                &ctx,
                TaskKind::ActivityAnalysis {
                    workout_id: workout_id.clone(),
                },
            )
            .await;
            self.agent_stage(
                &mut stages,
                &mut result,
                "plan_adjustment",
                &self.planner,
                &ctx,
                TaskKind::PlanAdjustment {
                    workout_id: workout_id.clone(),
                },
            )
            .await;
            self.agent_stage(
                &mut stages,
                &mut result,
                "recovery",
                &self.wellness,
                &ctx,
                TaskKind::RecoveryCheck { workout_id },
            )
            .await;
        }
        .instrument(log.span())
        .await;

        result.finish(stages, started)
    }

    /// Summarise the training week (Monday to `date`) and review the plan
    /// against it. The plan review runs without the summary if it failed.
    pub async fn weekly_review(
        &self,
        user_id: &str,
        timezone: Tz,
        date: Option<NaiveDate>,
    ) -> PipelineResult {
        let started = Instant::now();
        let date = date.unwrap_or_else(|| today_in(timezone));
        let week_start = week_start(date);
        let log = self.log.with_user(user_id).scoped("pipeline", "weekly_review");
        let mut stages = StageRecorder::new(log.clone());
        let mut result = PipelineResult::new("weekly_review", user_id, date);

        async {
            let Some(ctx) = stages
                .run("context", self.loader.load_at(user_id, timezone, date))
                .await
            else {
                skip_all(&mut stages, &["weekly_summary", "plan_review"], "context unavailable");
                return;
            };

            let summary = self
                .agent_stage(
                    &mut stages,
                    &mut result,
                    "weekly_summary",
                    &self.analyst,
                    &ctx,
                    TaskKind::WeeklySummary { week_start },
                )
                .await;
            self.agent_stage(
                &mut stages,
                &mut result,
                "plan_review",
                &self.planner,
                &ctx,
                TaskKind::WeeklyReview {
                    week_start,
                    summary,
                },
            )
            .await;
        }
        .instrument(log.span())
        .await;

        result.finish(stages, started)
    }

    /// Run one agent as a stage. Returns the reply text on success.
    async fn agent_stage(
        &self,
        stages: &mut StageRecorder,
        result: &mut PipelineResult,
        name: &str,
        agent: &dyn CoachAgent,
        ctx: &AgentContext,
        task: TaskKind,
    ) -> Option<String> {
        let ctx = ctx.with_task(task);
        let output = stages
            .run(name, self.harness.execute(agent, &ctx, ExecuteOptions::default()))
            .await?;
        let text = output.text.clone();
        result.outputs.insert(name.to_string(), output);
        Some(text)
    }
}

fn skip_all(stages: &mut StageRecorder, names: &[&str], reason: &str) {
    for name in names {
        stages.skip(name, reason);
    }
}

/// Monday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(week_start(sunday), monday);
        assert_eq!(week_start(monday), monday);
    }
}
