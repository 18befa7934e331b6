use serde::{Deserialize, Serialize};

/// ID types shared across the crate
pub type ActivityId = u64;
pub type QuestionId = u64;
pub type ChoiceId = u64;
pub type UserId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Teacher,
    Student,
}

/// Coarse lifecycle phase of a session, as tracked server-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Waiting,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    PictureChoice,
    OrderedPhrase,
    WordChoice,
}

impl GameType {
    /// Whether answers for this game type are an ordered sequence of choices
    /// rather than a single pick.
    pub fn is_ordered(&self) -> bool {
        matches!(self, GameType::OrderedPhrase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub choice_id: ChoiceId,
    pub text: String,
    pub correct: bool,
    /// Position in the correct sequence; only meaningful for ORDERED_PHRASE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: QuestionId,
    pub game_type: GameType,
    pub prompt: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

/// Server-side view of one live activity run. Clients hold a derived,
/// possibly-stale mirror via their progression state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub activity_id: ActivityId,
    pub phase: SessionPhase,
    pub current_question_index: usize,
    pub question_count: usize,
}

/// One row of the persisted score snapshot returned by the leaderboard
/// endpoint. Carries no identity beyond the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub user_id: UserId,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
    pub role: Role,
}

/// What a participant has selected for one question. Single-choice game
/// types carry one pick, ordered-phrase carries the sequence built so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSelection {
    Single(ChoiceId),
    Ordered(Vec<ChoiceId>),
}

/// A not-yet-submitted answer. At most one exists per participant at any
/// time; superseded by newer input or consumed by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub question_index: usize,
    pub question_id: QuestionId,
    pub selection: AnswerSelection,
}
