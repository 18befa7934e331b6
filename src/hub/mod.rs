//! In-process session hub
//!
//! Reference implementation of both collaborator seams: the authoritative
//! session store (phase commands, roster, scoring, leaderboard snapshots)
//! and the broadcast transport (per-activity topics). Tests and the
//! simulator binary run entire sessions against it without a server.
//!
//! Phase transitions for one activity are serialized under the sessions
//! write lock, which is held across the broadcast so subscribers observe
//! events in command order.

mod scoring;
mod session;

use crate::api::{ApiError, SessionBackend};
use crate::protocol::SessionEvent;
use crate::transport::{TopicSubscription, TopicTransport, TransportError};
use crate::types::{
    ActivityId, ChoiceId, Participant, Question, QuestionId, ScoreEntry, Session, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Everything the hub knows about one live activity.
struct ActivityRecord {
    session: Session,
    teacher_id: UserId,
    questions: Vec<Question>,
    roster: Vec<Participant>,
    scores: HashMap<UserId, u32>,
    /// Guards against double awards for the same participant and question.
    awarded: HashSet<(UserId, QuestionId)>,
    created_at: DateTime<Utc>,
}

pub struct LocalHub {
    sessions: RwLock<HashMap<ActivityId, ActivityRecord>>,
    topics: RwLock<HashMap<ActivityId, Vec<mpsc::Sender<String>>>>,
    subscriber_capacity: usize,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHub {
    pub fn new() -> Self {
        Self::with_subscriber_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_subscriber_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            subscriber_capacity: capacity,
        }
    }

    /// Current server-side view of a session, if the activity is open.
    pub async fn session(&self, activity_id: ActivityId) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(&activity_id).map(|record| record.session.clone())
    }

    /// Current roster for an activity.
    pub async fn roster(&self, activity_id: ActivityId) -> Result<Vec<Participant>, ApiError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&activity_id)
            .map(|record| record.roster.clone())
            .ok_or(ApiError::UnknownActivity(activity_id))
    }

    /// Broadcast an event to every subscriber of the activity topic.
    ///
    /// Slow subscribers lose the message (the channel is bounded and this
    /// never blocks a phase command); closed subscribers are pruned here.
    async fn publish(&self, activity_id: ActivityId, event: SessionEvent) {
        let raw = match event.encode() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(activity_id, error = %e, "failed to encode broadcast, dropping it");
                return;
            }
        };

        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(&activity_id) else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(raw.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(activity_id, "subscriber lagging, dropping broadcast for it");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        tracing::debug!(activity_id, ?event, subscribers = subscribers.len(), "broadcast sent");
    }

    /// Drop every subscription for an activity. Used when a session record
    /// is destroyed; subscribers observe end-of-stream.
    async fn close_topic(&self, activity_id: ActivityId) {
        self.topics.write().await.remove(&activity_id);
    }
}

#[async_trait]
impl TopicTransport for LocalHub {
    async fn subscribe(
        &self,
        activity_id: ActivityId,
    ) -> Result<TopicSubscription, TransportError> {
        {
            let sessions = self.sessions.read().await;
            if !sessions.contains_key(&activity_id) {
                return Err(TransportError::UnknownTopic(activity_id));
            }
        }

        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.topics.write().await.entry(activity_id).or_default().push(tx);
        Ok(TopicSubscription::new(rx))
    }
}

#[async_trait]
impl SessionBackend for LocalHub {
    async fn next_question(
        &self,
        activity_id: ActivityId,
        question_index: usize,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        self.advance_session(activity_id, question_index, teacher_id).await
    }

    async fn finish_quiz(
        &self,
        activity_id: ActivityId,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        self.finish_session(activity_id, teacher_id).await
    }

    async fn fetch_leaderboard(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<ScoreEntry>, ApiError> {
        self.score_snapshot(activity_id).await
    }

    async fn award_choice(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<(), ApiError> {
        self.record_choice_award(activity_id, user_id, question_id, choice_id).await
    }

    async fn award_translation(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        sequence: &[ChoiceId],
    ) -> Result<(), ApiError> {
        self.record_translation_award(activity_id, user_id, question_id, sequence).await
    }

    async fn leave(&self, activity_id: ActivityId, user_id: &UserId) -> Result<(), ApiError> {
        self.remove_participant(activity_id, user_id).await
    }
}
