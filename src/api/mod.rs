//! Backend collaborator contracts
//!
//! The coordinator consumes a small REST surface: teacher commands that
//! advance or finish the quiz, score awards, leaderboard snapshots, and the
//! roster leave call. `SessionBackend` is the injectable seam for all of it;
//! [`http::HttpBackend`] talks to the real server and the in-process hub
//! implements the same trait for tests and the simulator.

pub mod http;

pub use http::HttpBackend;

use crate::types::{ActivityId, ChoiceId, QuestionId, ScoreEntry, UserId};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend answered with status {0}")]
    Status(u16),
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("activity {0} does not exist")]
    UnknownActivity(ActivityId),
    #[error("user {0} may not drive this session")]
    NotTeacher(UserId),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("question {0} does not exist in this activity")]
    UnknownQuestion(QuestionId),
}

/// Command and query surface of the session backend.
///
/// Phase commands succeed only for the session's teacher; the server
/// broadcasts the resulting event to the activity topic, which is how every
/// client (including the teacher's own room) observes the transition.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Advance the session to `question_index`.
    async fn next_question(
        &self,
        activity_id: ActivityId,
        question_index: usize,
        teacher_id: &UserId,
    ) -> Result<(), ApiError>;

    /// End the quiz.
    async fn finish_quiz(&self, activity_id: ActivityId, teacher_id: &UserId)
        -> Result<(), ApiError>;

    /// Current persisted score snapshot for the activity.
    async fn fetch_leaderboard(&self, activity_id: ActivityId)
        -> Result<Vec<ScoreEntry>, ApiError>;

    /// Submit a single-choice answer for scoring.
    async fn award_choice(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<(), ApiError>;

    /// Submit an ordered-phrase answer for scoring.
    async fn award_translation(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        sequence: &[ChoiceId],
    ) -> Result<(), ApiError>;

    /// Remove a participant from the roster.
    async fn leave(&self, activity_id: ActivityId, user_id: &UserId) -> Result<(), ApiError>;
}
