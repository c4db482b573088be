//! Message routing: which agent answers a free-text message.
//!
//! Three tiers, tried in order:
//!
//! 1. **Quick match**: configured regex rules for unambiguous literals
//!    (explicit mentions, greetings). Pure, no I/O, confidence ≥ 0.9.
//! 2. **Classifier**: one low-temperature completion call given the agent
//!    descriptions and the last few turns. The reply is parsed defensively.
//! 3. **Keyword fallback**: overlap between the message and each agent's
//!    keyword set. Ties go to the default agent.
//!
//! [`MessageRouter::route`] never fails. Every failure path resolves to a
//! valid [`RouteResult`].

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use stride_common::message::recent_turns;
use stride_common::{ChatTurn, CoachError, Logger, Result};
use stride_llm::{ChatMessage, LlmClient, LlmConfig, LlmRequest};
use tracing::{Instrument, debug, info, warn};

const MAX_REASONING_CHARS: usize = 200;

/// An agent the router may pick, with what the classifier is told about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutableAgent {
    pub id: String,
    pub description: String,
    /// Keyword set for the fallback tier.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A literal pattern that routes without asking the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickMatchRule {
    pub agent: String,
    /// Regular expression matched against the raw message.
    pub pattern: String,
    #[serde(default = "default_quick_confidence")]
    pub confidence: f64,
}

fn default_quick_confidence() -> f64 {
    0.95
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Completion client for the classifier tier. Unset skips the tier.
    #[serde(default)]
    pub classifier: Option<LlmConfig>,

    /// Agent chosen on keyword ties.
    #[serde(default = "default_agent")]
    pub default_agent: String,

    #[serde(default = "default_agents")]
    pub agents: Vec<RoutableAgent>,

    /// Evaluated in order; the first match wins.
    #[serde(default = "default_quick_matches")]
    pub quick_matches: Vec<QuickMatchRule>,

    /// Chat turns handed to the classifier.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_agent() -> String {
    "coach".into()
}

fn default_history_window() -> usize {
    4
}

fn default_temperature() -> f32 {
    0.1
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn default_agents() -> Vec<RoutableAgent> {
    vec![
        RoutableAgent {
            id: "coach".into(),
            description: "Training: workouts, paces, the plan, races, what to run next.".into(),
            keywords: words(&[
                "run", "running", "workout", "training", "plan", "pace", "tempo", "interval",
                "intervals", "long run", "race", "marathon", "half", "10k", "5k", "mileage",
                "km", "miles", "easy run", "speed", "schedule",
            ]),
        },
        RoutableAgent {
            id: "wellness".into(),
            description: "Recovery: sleep, HRV, soreness, injuries, stress, fatigue, rest days."
                .into(),
            keywords: words(&[
                "sleep", "tired", "fatigue", "fatigued", "sore", "soreness", "pain", "injury",
                "injured", "hrv", "stress", "recovery", "recover", "rest", "sick", "ill",
                "body battery", "resting heart rate", "ache", "exhausted",
            ]),
        },
    ]
}

fn default_quick_matches() -> Vec<QuickMatchRule> {
    let rule = |agent: &str, pattern: &str, confidence: f64| QuickMatchRule {
        agent: agent.into(),
        pattern: pattern.into(),
        confidence,
    };
    vec![
        rule("coach", r"(?i)@coach\b", 0.99),
        rule("wellness", r"(?i)@wellness\b", 0.99),
        rule(
            "wellness",
            r"(?i)\b(injur(y|ies|ed)|hrv|body battery|sleep score)\b",
            0.92,
        ),
        rule(
            "coach",
            r"(?i)^\s*(hi|hello|hey|good (morning|afternoon|evening))\b[\s!.,]*$",
            0.9,
        ),
    ]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            classifier: None,
            default_agent: default_agent(),
            agents: default_agents(),
            quick_matches: default_quick_matches(),
            history_window: default_history_window(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTier {
    QuickMatch,
    Classifier,
    Fallback,
}

/// The routing decision for one message. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub agent_id: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
    pub elapsed_ms: u64,
    pub tier: RouteTier,
}

struct CompiledRule {
    agent: String,
    regex: Regex,
    confidence: f64,
}

#[derive(Deserialize)]
struct ClassifierReply {
    #[serde(alias = "agent_id")]
    agent: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct MessageRouter {
    config: RouterConfig,
    rules: Vec<CompiledRule>,
    classifier: Option<Arc<dyn LlmClient>>,
    log: Logger,
}

impl MessageRouter {
    /// Compiles the quick-match rules. An invalid pattern or a rule naming
    /// an unknown agent is a configuration error.
    pub fn new(
        config: RouterConfig,
        classifier: Option<Arc<dyn LlmClient>>,
        log: Logger,
    ) -> Result<Self> {
        let known = |id: &str| config.agents.iter().any(|a| a.id == id);
        if !known(&config.default_agent) {
            return Err(CoachError::Config(format!(
                "default agent '{}' is not a routable agent",
                config.default_agent
            )));
        }

        let mut rules = Vec::with_capacity(config.quick_matches.len());
        for rule in &config.quick_matches {
            if !known(&rule.agent) {
                return Err(CoachError::Config(format!(
                    "quick-match rule routes to unknown agent '{}'",
                    rule.agent
                )));
            }
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                CoachError::Config(format!("invalid quick-match pattern '{}': {e}", rule.pattern))
            })?;
            rules.push(CompiledRule {
                agent: rule.agent.clone(),
                regex,
                confidence: rule.confidence.clamp(0.9, 1.0),
            });
        }

        Ok(Self {
            config,
            rules,
            classifier,
            log,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Pick the agent for `message`.
    pub async fn route(&self, message: &str, history: &[ChatTurn]) -> RouteResult {
        if let Some(result) = self.quick_match(message) {
            debug!(parent: &self.log.span(), agent = %result.agent_id, "Quick match");
            return result;
        }

        let started = Instant::now();
        let span = self.log.span();
        async {
            if let Some(classifier) = &self.classifier {
                match self.classify(classifier.as_ref(), message, history).await {
                    Ok(mut result) => {
                        result.elapsed_ms = started.elapsed().as_millis() as u64;
                        info!(
                            agent = %result.agent_id,
                            confidence = result.confidence,
                            elapsed_ms = result.elapsed_ms,
                            "Classifier routed message"
                        );
                        return result;
                    }
                    Err(e) => {
                        warn!(error = %e, "Classifier failed, using keyword fallback");
                    }
                }
            }

            let mut result = self.keyword_fallback(message);
            result.elapsed_ms = started.elapsed().as_millis() as u64;
            info!(
                agent = %result.agent_id,
                confidence = result.confidence,
                "Keyword fallback routed message"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Tier 1. Pure: the same message always gives the same answer.
    pub fn quick_match(&self, message: &str) -> Option<RouteResult> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(message))
            .map(|rule| RouteResult {
                agent_id: rule.agent.clone(),
                confidence: rule.confidence,
                reasoning: format!("matched pattern {}", rule.regex.as_str()),
                elapsed_ms: 0,
                tier: RouteTier::QuickMatch,
            })
    }

    async fn classify(
        &self,
        client: &dyn LlmClient,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<RouteResult> {
        let request = LlmRequest {
            system_prompt: Some(self.classifier_prompt()),
            messages: vec![ChatMessage::user(self.classifier_input(message, history))],
            temperature: Some(self.config.temperature),
            max_tokens: Some(150),
        };
        let response = client.complete(request).await?;
        self.parse_reply(&response.content)
    }

    fn classifier_prompt(&self) -> String {
        let mut prompt = String::from(
            "You route messages from a runner to the right assistant.\n\nAssistants:\n",
        );
        for agent in &self.config.agents {
            prompt.push_str(&format!("- {}: {}\n", agent.id, agent.description));
        }
        prompt.push_str(
            "\nReply with one JSON object and nothing else:\n\
             {\"agent\": \"<id>\", \"confidence\": <0..1>, \"reasoning\": \"<one line>\"}",
        );
        prompt
    }

    fn classifier_input(&self, message: &str, history: &[ChatTurn]) -> String {
        let turns = recent_turns(history, self.config.history_window);
        if turns.is_empty() {
            return format!("Message: {message}");
        }
        let mut input = String::from("Recent conversation:\n");
        for turn in turns {
            input.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.content));
        }
        input.push_str(&format!("\nMessage: {message}"));
        input
    }

    fn parse_reply(&self, content: &str) -> Result<RouteResult> {
        let json = extract_json_object(content).ok_or_else(|| {
            CoachError::validation(
                "classifier",
                format!(
                    "no JSON object in reply: {}",
                    content.chars().take(120).collect::<String>()
                ),
            )
        })?;
        let reply: ClassifierReply = serde_json::from_str(json)?;

        let agent = reply.agent.trim().to_lowercase();
        if !self.config.agents.iter().any(|a| a.id == agent) {
            return Err(CoachError::validation(
                "classifier",
                format!("unknown agent '{agent}'"),
            ));
        }

        let reasoning = reply
            .reasoning
            .map(|r| r.chars().take(MAX_REASONING_CHARS).collect::<String>())
            .unwrap_or_else(|| "no reasoning given".into());

        Ok(RouteResult {
            agent_id: agent,
            confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            reasoning,
            elapsed_ms: 0,
            tier: RouteTier::Classifier,
        })
    }

    /// Tier 3. Scores each agent by how many of its keywords occur in the
    /// message; ties go to the default agent.
    pub fn keyword_fallback(&self, message: &str) -> RouteResult {
        let text = normalize(message);
        let scores: Vec<(&str, usize)> = self
            .config
            .agents
            .iter()
            .map(|agent| {
                let hits = agent
                    .keywords
                    .iter()
                    .filter(|k| text.contains(&normalize(k)))
                    .count();
                (agent.id.as_str(), hits)
            })
            .collect();

        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        let leaders: Vec<&str> = scores
            .iter()
            .filter(|(_, s)| *s == best)
            .map(|(id, _)| *id)
            .collect();
        let runner_up = scores
            .iter()
            .map(|(_, s)| *s)
            .filter(|s| *s < best)
            .max()
            .unwrap_or(0);

        let (agent_id, confidence, reasoning) = match leaders.as_slice() {
            [only] if best > 0 => {
                let margin = (best - runner_up).min(3) as f64;
                (
                    only.to_string(),
                    0.5 + 0.1 * margin,
                    format!("{best} keyword hits for {only}"),
                )
            }
            _ => (
                self.config.default_agent.clone(),
                0.3,
                format!("keyword tie at {best} hits, using default agent"),
            ),
        };

        RouteResult {
            agent_id,
            confidence,
            reasoning,
            elapsed_ms: 0,
            tier: RouteTier::Fallback,
        }
    }
}

/// Lowercased words separated by single spaces, padded so that phrase
/// containment only matches on word boundaries.
fn normalize(text: &str) -> String {
    let joined = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!(" {joined} ")
}

/// Extract the first balanced JSON object from text that may surround it
/// with prose or code fences.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
