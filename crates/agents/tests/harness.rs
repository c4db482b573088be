//! Harness behaviour against scripted conversations.
//!
//! The conversation service is replaced by `ScriptedConversation`, so every
//! test states exactly which messages the model "sent".

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use serde_json::json;
use stride_agents::{
    AgentHarness, AgentResult, AnalystAgent, CoachAgentDef, ExecuteOptions, ExecutionObserver,
    HarnessConfig, PlannerAgent, ToolRegistry, WellnessAgent,
};
use stride_common::{
    AgentContext, CoachError, ContextSnapshot, EntryFilter, EntryType, ExecutionPhase, Logger,
    Store, TaskKind,
};
use stride_llm::scripted::{ScriptStep, ScriptedConversation};
use stride_llm::{ConversationMessage, ResultSubtype};
use stride_store::SqliteStore;
use stride_whiteboard::{Whiteboard, WhiteboardConfig};

struct Fixture {
    service: ScriptedConversation,
    harness: AgentHarness,
    whiteboard: Whiteboard,
    ctx: AgentContext,
}

fn fixture() -> Fixture {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let whiteboard = Whiteboard::new(store.clone(), WhiteboardConfig::default(), Logger::disabled());
    let service = ScriptedConversation::new();
    let harness = AgentHarness::new(
        Arc::new(service.clone()),
        ToolRegistry::standard(whiteboard.clone()),
        HarnessConfig {
            max_turns: 3,
            max_budget_usd: Some(0.5),
        },
        Logger::disabled(),
    );
    let ctx = AgentContext::new(
        "u1",
        chrono_tz::Europe::Berlin,
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        ContextSnapshot::default(),
        store,
    );
    Fixture {
        service,
        harness,
        whiteboard,
        ctx,
    }
}

fn assert_agent_error(err: &CoachError, expected: ExecutionPhase) {
    match err {
        CoachError::Agent { agent_id, phase, .. } => {
            assert_eq!(*phase, expected, "unexpected phase in {err}");
            assert!(!agent_id.is_empty());
        }
        other => panic!("expected an agent error, got {other:?}"),
    }
}

#[tokio::test]
async fn runs_to_the_terminal_result() {
    let f = fixture();
    f.service.push_reply("Easy 40 minutes today, keep it conversational.");

    let ctx = f.ctx.with_task(TaskKind::MorningBriefing);
    let coach = CoachAgentDef::with_default_config();
    let result = f.harness.execute(&coach, &ctx, ExecuteOptions::default()).await.unwrap();

    assert_eq!(result.agent_id, "coach");
    assert_eq!(result.text, "Easy 40 minutes today, keep it conversational.");
    assert_eq!(result.session_id, "scripted-session");
    assert_eq!(result.num_turns, 1);
    assert_eq!(result.usage.input_tokens, 100);

    let request = &f.service.requests()[0];
    assert!(request.system_prompt.contains("endurance running coach"));
    assert!(request.system_prompt.contains("Plan: none active"));
    assert!(request.user_prompt.contains("morning briefing for 2026-03-02"));
    assert_eq!(request.max_turns, 3);
    assert_eq!(request.max_budget_usd, Some(0.5));
    assert!(!request.include_partial);
}

#[tokio::test]
async fn tools_are_namespaced_under_the_agent() {
    let f = fixture();
    f.service.push_reply("ok");

    let wellness = WellnessAgent::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::ReadinessCheck);
    f.harness.execute(&wellness, &ctx, ExecuteOptions::default()).await.unwrap();

    let server = f.service.requests()[0].tool_server.clone().unwrap();
    assert_eq!(server.name, "wellness");
    let mut names = server.qualified_names();
    names.sort();
    assert_eq!(
        names,
        vec![
            "mcp__wellness__get_health_metrics",
            "mcp__wellness__post_to_whiteboard",
            "mcp__wellness__read_whiteboard",
        ]
    );
}

#[tokio::test]
async fn tool_writes_surface_through_the_collector() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::tool(
            "post_to_whiteboard",
            json!({
                "entry_type": "alert",
                "content": "HRV 20% under baseline, swap intervals for an easy run",
                "priority": 80,
                "tags": ["hrv"]
            }),
        ),
        ScriptStep::assistant(""),
        ScriptStep::assistant("Take it easy today."),
        ScriptStep::success("Take it easy today.", 2),
    ]);

    let wellness = WellnessAgent::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::ReadinessCheck);
    let result = f.harness.execute(&wellness, &ctx, ExecuteOptions::default()).await.unwrap();

    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "post_to_whiteboard");
    assert!(!result.tool_calls[0].is_error);
    assert_eq!(result.whiteboard_posts.len(), 1);
    let post = &result.whiteboard_posts[0];
    assert_eq!(post.author, "wellness");
    assert_eq!(post.entry_type, EntryType::Alert);
    assert_eq!(post.priority, 80);
    assert_eq!(post.context_date, Some(ctx.date));

    let stored = f
        .whiteboard
        .query("u1", EntryFilter::default().tagged("hrv"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn failing_tools_report_errors_and_the_run_continues() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::tool(
            "post_to_whiteboard",
            json!({ "entry_type": "gossip", "content": "x" }),
        ),
        ScriptStep::assistant("Noted."),
        ScriptStep::success("Noted.", 1),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::chat("post something", vec![]));
    let result = f.harness.execute(&coach, &ctx, ExecuteOptions::default()).await.unwrap();

    assert_eq!(result.tool_calls.len(), 1);
    assert!(result.tool_calls[0].is_error);
    assert!(result.tool_calls[0].output.contains("VALIDATION_ERROR"));
    assert!(result.whiteboard_posts.is_empty());
}

#[tokio::test]
async fn endless_conversation_stops_at_the_turn_cap() {
    let f = fixture();
    f.service.push_script(vec![ScriptStep::Endless("still thinking".into())]);

    let coach = CoachAgentDef::with_default_config();
    let err = f
        .harness
        .execute(&coach, &f.ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Conversation);
    assert!(err.to_string().contains("exceeded 3 turns"));
}

#[tokio::test]
async fn per_call_turn_cap_overrides_the_default() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::assistant("one"),
        ScriptStep::assistant("two"),
        ScriptStep::success("done", 2),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let options = ExecuteOptions {
        max_turns: Some(1),
        ..Default::default()
    };
    let err = f.harness.execute(&coach, &f.ctx, options).await.unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Conversation);
    assert_eq!(f.service.requests()[0].max_turns, 1);
}

#[tokio::test]
async fn stream_without_a_result_is_fatal() {
    let f = fixture();
    f.service.push_script(vec![ScriptStep::assistant("partial answer")]);

    let coach = CoachAgentDef::with_default_config();
    let err = f
        .harness
        .execute(&coach, &f.ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    match err {
        CoachError::NoResult { agent_id, turns } => {
            assert_eq!(agent_id, "coach");
            assert_eq!(turns, 1);
        }
        other => panic!("expected NoResult, got {other:?}"),
    }
}

#[tokio::test]
async fn unsuccessful_terminal_result_is_an_error() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::assistant("..."),
        ScriptStep::terminal(ResultSubtype::ErrorMaxBudget, 1),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let err = f
        .harness
        .execute(&coach, &f.ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Result);
    assert!(err.to_string().contains("error_max_budget"));
}

#[tokio::test]
async fn service_errors_are_wrapped_with_the_phase() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::assistant("starting"),
        ScriptStep::Fail("connection reset".into()),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let err = f
        .harness
        .execute(&coach, &f.ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Conversation);
    assert!(err.to_string().contains("connection reset"));

    // No script queued: opening the conversation itself fails.
    let err = f
        .harness
        .execute(&coach, &f.ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Conversation);
}

#[tokio::test]
async fn unsupported_task_fails_at_prompt_time() {
    let f = fixture();
    let planner = PlannerAgent::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::MorningBriefing);

    let err = f
        .harness
        .execute(&planner, &ctx, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Prompt);
    assert!(err.to_string().contains("morning_briefing"));
    assert!(f.service.requests().is_empty());
}

#[tokio::test]
async fn streaming_delivers_fragments_then_whole_turns() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::partial("Easy "),
        ScriptStep::partial("run."),
        ScriptStep::assistant("Easy run."),
        ScriptStep::assistant(" Hydrate."),
        ScriptStep::success("Easy run. Hydrate.", 2),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let mut received = Vec::new();
    let mut sink = |text: &str| -> stride_common::Result<()> {
        received.push(text.to_string());
        Ok(())
    };
    let result = f
        .harness
        .execute_streaming(&coach, &f.ctx, ExecuteOptions::default(), &mut sink)
        .await
        .unwrap();

    assert_eq!(received, vec!["Easy ", "run.", " Hydrate."]);
    assert_eq!(result.text, "Easy run. Hydrate.");
    assert!(f.service.requests()[0].include_partial);
}

#[tokio::test]
async fn failing_sink_aborts_with_stream_phase() {
    let f = fixture();
    f.service.push_script(vec![
        ScriptStep::partial("Hello"),
        ScriptStep::success("Hello", 1),
    ]);

    let coach = CoachAgentDef::with_default_config();
    let mut sink = |_: &str| -> stride_common::Result<()> {
        Err(CoachError::integration("client", "socket closed", false))
    };
    let err = f
        .harness
        .execute_streaming(&coach, &f.ctx, ExecuteOptions::default(), &mut sink)
        .await
        .unwrap_err();
    assert_agent_error(&err, ExecutionPhase::Stream);
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    messages: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl ExecutionObserver for Counting {
    fn on_start(&self, _agent_id: &str, _task: &TaskKind) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_message(&self, _agent_id: &str, _message: &ConversationMessage) {
        self.messages.fetch_add(1, Ordering::SeqCst);
    }
    fn on_complete(&self, _result: &AgentResult) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_error(&self, _agent_id: &str, _error: &CoachError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn observers_see_the_lifecycle() {
    let f = fixture();
    f.service.push_reply("fine");
    f.service.push_script(vec![ScriptStep::assistant("no result")]);

    let observer = Arc::new(Counting::default());
    let options = ExecuteOptions::default().with_observer(observer.clone());
    let coach = CoachAgentDef::with_default_config();

    f.harness.execute(&coach, &f.ctx, options.clone()).await.unwrap();
    f.harness.execute(&coach, &f.ctx, options).await.unwrap_err();

    assert_eq!(observer.started.load(Ordering::SeqCst), 2);
    assert_eq!(observer.messages.load(Ordering::SeqCst), 3);
    assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resume_session_is_passed_through() {
    let f = fixture();
    f.service.push_reply("welcome back");

    let coach = CoachAgentDef::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::chat("and tomorrow?", vec![]));
    f.harness
        .execute(&coach, &ctx, ExecuteOptions::resume("sess-42"))
        .await
        .unwrap();
    assert_eq!(
        f.service.requests()[0].resume_session.as_deref(),
        Some("sess-42")
    );
}

#[tokio::test]
async fn weekly_review_carries_the_summary_when_present() {
    let f = fixture();
    f.service.push_reply("plan ok").push_reply("plan ok");
    let planner = PlannerAgent::with_default_config();
    let week_start = NaiveDate::from_ymd_opt(2026, 2, 23).unwrap();

    let with = f.ctx.with_task(TaskKind::WeeklyReview {
        week_start,
        summary: Some("Volume up 12%, long run strong".into()),
    });
    let without = f.ctx.with_task(TaskKind::WeeklyReview {
        week_start,
        summary: None,
    });
    f.harness.execute(&planner, &with, ExecuteOptions::default()).await.unwrap();
    f.harness.execute(&planner, &without, ExecuteOptions::default()).await.unwrap();

    let requests = f.service.requests();
    assert!(requests[0].user_prompt.contains("Volume up 12%"));
    assert!(!requests[1].user_prompt.contains("Analyst summary"));
}

#[tokio::test]
async fn analyst_falls_back_to_tools_for_unknown_workouts() {
    let f = fixture();
    f.service.push_reply("analysed");
    let analyst = AnalystAgent::with_default_config();
    let ctx = f.ctx.with_task(TaskKind::ActivityAnalysis {
        workout_id: "wo_missing".into(),
    });
    f.harness.execute(&analyst, &ctx, ExecuteOptions::default()).await.unwrap();
    assert!(f.service.requests()[0].user_prompt.contains("fetch it with get_workouts"));
}
