//! Error types for Stride.

use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Phase of agent execution an [`CoachError::Agent`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// Building the system or user prompt from the context.
    Prompt,
    /// Registering the agent's tools with the conversation service.
    Tools,
    /// Opening the conversation or reading a message from it.
    Conversation,
    /// Delivering streamed text to the caller.
    Stream,
    /// Interpreting the terminal result.
    Result,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Tools => "tools",
            Self::Conversation => "conversation",
            Self::Stream => "stream",
            Self::Result => "result",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Agent {agent_id} failed during {phase}: {message}")]
    Agent {
        agent_id: String,
        phase: ExecutionPhase,
        message: String,
    },

    #[error("Agent {agent_id} conversation ended after {turns} turns without a result")]
    NoResult { agent_id: String, turns: u32 },

    #[error("Integration error ({service}): {message}")]
    Integration {
        service: String,
        message: String,
        retryable: bool,
        status: Option<u16>,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoachError {
    pub fn agent(
        agent_id: impl Into<String>,
        phase: ExecutionPhase,
        message: impl Into<String>,
    ) -> Self {
        Self::Agent {
            agent_id: agent_id.into(),
            phase,
            message: message.into(),
        }
    }

    pub fn integration(
        service: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::Integration {
            service: service.into(),
            message: message.into(),
            retryable,
            status: None,
        }
    }

    /// Integration failure derived from an HTTP status. 429 and 5xx are retryable.
    pub fn http_status(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Integration {
            service: service.into(),
            message: format!("HTTP {status}: {}", body.into()),
            retryable: status == 429 || (500..600).contains(&status),
            status: Some(status),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Agent { .. } => "AGENT_ERROR",
            Self::NoResult { .. } => "NO_RESULT",
            Self::Integration { .. } => "INTEGRATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Integration { retryable: true, .. })
    }

    /// Structured context for result payloads and logs.
    pub fn context(&self) -> serde_json::Value {
        match self {
            Self::Agent {
                agent_id, phase, ..
            } => json!({ "agent_id": agent_id, "phase": phase.as_str() }),
            Self::NoResult { agent_id, turns } => json!({ "agent_id": agent_id, "turns": turns }),
            Self::Integration {
                service,
                retryable,
                status,
                ..
            } => json!({ "service": service, "retryable": retryable, "status": status }),
            Self::NotFound { resource, id } => json!({ "resource": resource, "id": id }),
            Self::Validation { field, .. } => json!({ "field": field }),
            _ => serde_json::Value::Null,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoachError>;
