//! Router behaviour with a scripted classifier.
//!
//! The classifier is a `ScriptedClient`, so each test states exactly what
//! the model replied, or that the call failed.

use std::sync::Arc;

use stride_common::{ChatTurn, CoachError, Logger};
use stride_coordinator::{MessageRouter, RouteTier, RouterConfig};
use stride_llm::scripted::ScriptedClient;

fn router_with(client: &ScriptedClient) -> MessageRouter {
    MessageRouter::new(
        RouterConfig::default(),
        Some(Arc::new(client.clone())),
        Logger::disabled(),
    )
    .unwrap()
}

fn history(n: usize) -> Vec<ChatTurn> {
    (0..n)
        .flat_map(|i| {
            [
                ChatTurn::user(format!("question {i}")),
                ChatTurn::assistant("coach", format!("answer {i}")),
            ]
        })
        .collect()
}

// ============================================================================
// Quick match
// ============================================================================

#[tokio::test]
async fn test_quick_match_is_deterministic_regardless_of_history() {
    let client = ScriptedClient::new();
    let router = router_with(&client);

    for turns in [0, 1, 5] {
        let result = router
            .route("My achilles injury is flaring up again", &history(turns))
            .await;
        assert_eq!(result.agent_id, "wellness");
        assert_eq!(result.tier, RouteTier::QuickMatch);
        assert!(result.confidence >= 0.9);
        assert_eq!(result.elapsed_ms, 0);
    }

    // The classifier was never consulted.
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_greeting_routes_to_coach() {
    let client = ScriptedClient::new();
    let router = router_with(&client);

    let result = router.route("Good morning!", &[]).await;
    assert_eq!(result.agent_id, "coach");
    assert_eq!(result.tier, RouteTier::QuickMatch);
}

// ============================================================================
// Classifier
// ============================================================================

#[tokio::test]
async fn test_classifier_decision_is_used() {
    let client = ScriptedClient::new();
    client.push_ok(
        "```json\n{\"agent\": \"coach\", \"confidence\": 0.82, \"reasoning\": \"pacing question\"}\n```",
    );
    let router = router_with(&client);

    let result = router.route("Should Thursday be faster than last week?", &[]).await;
    assert_eq!(result.agent_id, "coach");
    assert_eq!(result.tier, RouteTier::Classifier);
    assert_eq!(result.confidence, 0.82);
    assert_eq!(result.reasoning, "pacing question");

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, Some(0.1));
    assert!(
        requests[0]
            .system_prompt
            .as_deref()
            .unwrap()
            .contains("wellness")
    );
}

#[tokio::test]
async fn test_classifier_sees_only_last_four_turns() {
    let client = ScriptedClient::new();
    client.push_ok(r#"{"agent": "wellness", "confidence": 0.7, "reasoning": "follow-up"}"#);
    let router = router_with(&client);

    // Three exchanges make six turns; only the last four are sent.
    router.route("what about tomorrow then?", &history(3)).await;

    let requests = client.requests();
    let input = &requests[0].messages[0].content;
    assert!(!input.contains("question 0"));
    assert!(!input.contains("answer 0"));
    assert!(input.contains("question 1"));
    assert!(input.contains("answer 2"));
    assert!(input.ends_with("Message: what about tomorrow then?"));
}

#[tokio::test]
async fn test_classifier_reply_with_braces_inside_strings() {
    let client = ScriptedClient::new();
    client.push_ok(
        r#"Routing now: {"agent": "wellness", "confidence": 0.8, "reasoning": "said {rest} day, wants a \"}\" break"} hope that helps"#,
    );
    let router = router_with(&client);

    let result = router.route("I've felt off since the weekend", &[]).await;
    assert_eq!(result.agent_id, "wellness");
    assert_eq!(result.tier, RouteTier::Classifier);
    assert_eq!(result.confidence, 0.8);
    assert_eq!(result.reasoning, r#"said {rest} day, wants a "}" break"#);
}

// ============================================================================
// Fallback never throws
// ============================================================================

#[tokio::test]
async fn test_classifier_error_falls_back_to_keywords() {
    let client = ScriptedClient::new();
    client.push_err(CoachError::http_status("classifier", 503, "overloaded"));
    let router = router_with(&client);

    let result = router
        .route("Slept four hours, legs sore, totally exhausted", &[])
        .await;
    assert_eq!(result.agent_id, "wellness");
    assert_eq!(result.tier, RouteTier::Fallback);
    assert!((0.0..=1.0).contains(&result.confidence));
}

#[tokio::test]
async fn test_unparseable_reply_falls_back_to_keywords() {
    let client = ScriptedClient::new();
    client
        .push_ok("I think the coach should take this one.")
        .push_ok(r#"{"agent": "nutritionist", "confidence": 0.9}"#)
        .push_ok(r#"{"agent": "coach", "confidence": "#);
    let router = router_with(&client);

    for _ in 0..3 {
        let result = router.route("tempo pace for the marathon block?", &[]).await;
        assert_eq!(result.agent_id, "coach");
        assert_eq!(result.tier, RouteTier::Fallback);
    }
}

#[tokio::test]
async fn test_fallback_tie_uses_default_agent() {
    let client = ScriptedClient::new();
    client.push_err(CoachError::integration("classifier", "timeout", true));
    let config = RouterConfig {
        default_agent: "wellness".into(),
        ..Default::default()
    };
    let router =
        MessageRouter::new(config, Some(Arc::new(client.clone())), Logger::disabled()).unwrap();

    let result = router.route("anything interesting to report?", &[]).await;
    assert_eq!(result.agent_id, "wellness");
    assert_eq!(result.tier, RouteTier::Fallback);
}

#[tokio::test]
async fn test_no_classifier_goes_straight_to_keywords() {
    let router = MessageRouter::new(RouterConfig::default(), None, Logger::disabled()).unwrap();
    let result = router.route("how many km this week?", &[]).await;
    assert_eq!(result.agent_id, "coach");
    assert_eq!(result.tier, RouteTier::Fallback);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_default_agent_must_be_routable() {
    let config = RouterConfig {
        default_agent: "planner".into(),
        ..Default::default()
    };
    let err = MessageRouter::new(config, None, Logger::disabled())
        .err()
        .unwrap();
    assert_eq!(err.code(), "CONFIG_ERROR");
    assert!(err.to_string().contains("planner"));
}
