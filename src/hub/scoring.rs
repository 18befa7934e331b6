//! Answer evaluation and score snapshots
//!
//! The hub owns correctness evaluation; clients submit raw selections and
//! never learn more than the resulting totals. Awards are accepted for any
//! question of an open activity, current or not, because flushes always
//! arrive after the broadcast that moved the session on.

use super::LocalHub;
use crate::api::ApiError;
use crate::types::{ActivityId, ChoiceId, GameType, QuestionId, ScoreEntry, UserId};

const POINTS_PER_CORRECT: u32 = 10;

impl LocalHub {
    pub(crate) async fn record_choice_award(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;

        let correct = {
            let question = record
                .questions
                .iter()
                .find(|q| q.question_id == question_id)
                .ok_or(ApiError::UnknownQuestion(question_id))?;
            question
                .choices
                .iter()
                .any(|c| c.choice_id == choice_id && c.correct)
        };

        let key = (user_id.clone(), question_id);
        if !record.awarded.insert(key) {
            tracing::debug!(activity_id, user = %user_id, question_id, "duplicate award ignored");
            return Ok(());
        }

        let total = record.scores.entry(user_id.clone()).or_insert(0);
        if correct {
            *total += POINTS_PER_CORRECT;
        }
        tracing::debug!(activity_id, user = %user_id, question_id, correct, total = *total, "choice scored");
        Ok(())
    }

    pub(crate) async fn record_translation_award(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        sequence: &[ChoiceId],
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;

        let correct = {
            let question = record
                .questions
                .iter()
                .find(|q| q.question_id == question_id)
                .ok_or(ApiError::UnknownQuestion(question_id))?;
            question.game_type == GameType::OrderedPhrase
                && sequence == expected_sequence(question).as_slice()
        };

        let key = (user_id.clone(), question_id);
        if !record.awarded.insert(key) {
            tracing::debug!(activity_id, user = %user_id, question_id, "duplicate award ignored");
            return Ok(());
        }

        let total = record.scores.entry(user_id.clone()).or_insert(0);
        if correct {
            *total += POINTS_PER_CORRECT;
        }
        tracing::debug!(activity_id, user = %user_id, question_id, correct, total = *total, "translation scored");
        Ok(())
    }

    /// Score snapshot in the shape the leaderboard endpoint serves. Sorted
    /// by user id so repeated fetches are comparable.
    pub(crate) async fn score_snapshot(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<ScoreEntry>, ApiError> {
        let sessions = self.sessions.read().await;
        let record = sessions
            .get(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;

        let mut snapshot: Vec<ScoreEntry> = record
            .scores
            .iter()
            .map(|(user_id, score)| ScoreEntry {
                user_id: user_id.clone(),
                score: *score,
            })
            .collect();
        snapshot.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(snapshot)
    }
}

/// Choice ids of an ordered-phrase question in their correct order. Choices
/// without an `order` value are distractors and not part of the phrase.
fn expected_sequence(question: &crate::types::Question) -> Vec<ChoiceId> {
    let mut ordered: Vec<(u32, ChoiceId)> = question
        .choices
        .iter()
        .filter_map(|c| c.order.map(|position| (position, c.choice_id)))
        .collect();
    ordered.sort_by_key(|(position, _)| *position);
    ordered.into_iter().map(|(_, choice_id)| choice_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SessionBackend;
    use crate::types::{Choice, Participant, Question, Role};

    fn teacher() -> Participant {
        Participant {
            user_id: "t1".to_string(),
            display_name: "Ms. Vance".to_string(),
            role: Role::Teacher,
        }
    }

    fn choice(id: ChoiceId, correct: bool) -> Choice {
        Choice {
            choice_id: id,
            text: format!("choice {id}"),
            correct,
            order: None,
        }
    }

    fn phrase_choice(id: ChoiceId, position: u32) -> Choice {
        Choice {
            choice_id: id,
            text: format!("word {id}"),
            correct: true,
            order: Some(position),
        }
    }

    fn quiz() -> Vec<Question> {
        vec![
            Question {
                question_id: 100,
                game_type: GameType::WordChoice,
                prompt: "the dog".to_string(),
                choices: vec![choice(10, true), choice(11, false), choice(12, false)],
            },
            Question {
                question_id: 101,
                game_type: GameType::OrderedPhrase,
                prompt: "the dog runs".to_string(),
                choices: vec![
                    phrase_choice(20, 1),
                    phrase_choice(21, 2),
                    phrase_choice(22, 3),
                ],
            },
        ]
    }

    async fn hub_with_session() -> LocalHub {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz()).await.unwrap();
        hub
    }

    #[tokio::test]
    async fn test_correct_choice_scores_wrong_choice_records_zero() {
        let hub = hub_with_session().await;
        hub.award_choice(1, &"s1".to_string(), 100, 10).await.unwrap();
        hub.award_choice(1, &"s2".to_string(), 100, 11).await.unwrap();

        let snapshot = hub.fetch_leaderboard(1).await.unwrap();
        assert_eq!(
            snapshot,
            vec![
                ScoreEntry { user_id: "s1".to_string(), score: POINTS_PER_CORRECT },
                ScoreEntry { user_id: "s2".to_string(), score: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_award_is_ignored() {
        let hub = hub_with_session().await;
        hub.award_choice(1, &"s1".to_string(), 100, 10).await.unwrap();
        hub.award_choice(1, &"s1".to_string(), 100, 10).await.unwrap();
        hub.award_choice(1, &"s1".to_string(), 100, 11).await.unwrap();

        let snapshot = hub.fetch_leaderboard(1).await.unwrap();
        assert_eq!(snapshot[0].score, POINTS_PER_CORRECT);
    }

    #[tokio::test]
    async fn test_unknown_question_is_rejected() {
        let hub = hub_with_session().await;
        let err = hub.award_choice(1, &"s1".to_string(), 999, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::UnknownQuestion(999)));
    }

    #[tokio::test]
    async fn test_translation_requires_exact_order() {
        let hub = hub_with_session().await;
        hub.award_translation(1, &"s1".to_string(), 101, &[20, 21, 22]).await.unwrap();
        hub.award_translation(1, &"s2".to_string(), 101, &[21, 20, 22]).await.unwrap();
        hub.award_translation(1, &"s3".to_string(), 101, &[20, 21]).await.unwrap();

        let snapshot = hub.fetch_leaderboard(1).await.unwrap();
        assert_eq!(snapshot[0].score, POINTS_PER_CORRECT);
        assert_eq!(snapshot[1].score, 0);
        assert_eq!(snapshot[2].score, 0);
    }

    #[tokio::test]
    async fn test_translation_against_single_choice_question_scores_zero() {
        let hub = hub_with_session().await;
        hub.award_translation(1, &"s1".to_string(), 100, &[10]).await.unwrap();
        let snapshot = hub.fetch_leaderboard(1).await.unwrap();
        assert_eq!(snapshot[0].score, 0);
    }

    #[tokio::test]
    async fn test_scores_survive_leave() {
        let hub = hub_with_session().await;
        hub.join(
            1,
            Participant {
                user_id: "s1".to_string(),
                display_name: "Ana".to_string(),
                role: Role::Student,
            },
        )
        .await
        .unwrap();
        hub.award_choice(1, &"s1".to_string(), 100, 10).await.unwrap();

        hub.leave(1, &"s1".to_string()).await.unwrap();
        let snapshot = hub.fetch_leaderboard(1).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, "s1");
    }

    #[test]
    fn test_expected_sequence_sorts_by_order_and_skips_distractors() {
        let question = Question {
            question_id: 5,
            game_type: GameType::OrderedPhrase,
            prompt: "scrambled".to_string(),
            choices: vec![
                phrase_choice(32, 3),
                phrase_choice(30, 1),
                choice(99, false),
                phrase_choice(31, 2),
            ],
        };
        assert_eq!(expected_sequence(&question), vec![30, 31, 32]);
    }
}
