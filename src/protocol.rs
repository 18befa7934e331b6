//! Broadcast topic protocol
//!
//! Every phase transition travels over the per-activity topic as a JSON
//! envelope `{"status": ..., "payload": {...}}`. Only two statuses exist;
//! anything else is rejected by the parser and ignored (with a log line) by
//! the subscriber, so one malformed message cannot take down a session view.

use crate::types::ActivityId;
use serde::{Deserialize, Serialize};

pub const STATUS_NEXT_QUESTION: &str = "NEXT_QUESTION";
pub const STATUS_FINISH_QUIZ: &str = "FINISH_QUIZ";

/// Topic name for an activity's broadcast channel.
pub fn activity_topic(activity_id: ActivityId) -> String {
    format!("topic/activity/{activity_id}")
}

/// Phase-transition event carried on the broadcast topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    NextQuestion { question_index: usize },
    FinishQuiz,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
    #[error("NEXT_QUESTION envelope is missing questionIndex")]
    MissingQuestionIndex,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "questionIndex", skip_serializing_if = "Option::is_none")]
    question_index: Option<usize>,
}

impl SessionEvent {
    /// Serialize to the wire envelope.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let envelope = match self {
            SessionEvent::NextQuestion { question_index } => Envelope {
                status: STATUS_NEXT_QUESTION.to_string(),
                payload: Payload {
                    question_index: Some(*question_index),
                },
            },
            SessionEvent::FinishQuiz => Envelope {
                status: STATUS_FINISH_QUIZ.to_string(),
                payload: Payload::default(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse a raw topic message. Unknown statuses and missing fields come
    /// back as errors so the caller can log and skip them.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        match envelope.status.as_str() {
            STATUS_NEXT_QUESTION => match envelope.payload.question_index {
                Some(question_index) => Ok(SessionEvent::NextQuestion { question_index }),
                None => Err(ProtocolError::MissingQuestionIndex),
            },
            STATUS_FINISH_QUIZ => Ok(SessionEvent::FinishQuiz),
            _ => Err(ProtocolError::UnknownStatus(envelope.status)),
        }
    }
}
