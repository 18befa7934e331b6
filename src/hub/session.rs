//! Session lifecycle and phase commands
//!
//! All mutation happens under the sessions write lock; the resulting
//! broadcast goes out before the lock is released, so every subscriber sees
//! phase events in the order commands were accepted.

use super::{ActivityRecord, LocalHub};
use crate::api::ApiError;
use crate::protocol::SessionEvent;
use crate::types::{ActivityId, Participant, Question, Role, Session, SessionPhase, UserId};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

impl LocalHub {
    /// Open a fresh activity in WAITING with the teacher as the sole roster
    /// member. Students join afterwards via [`LocalHub::join`].
    pub async fn open_activity(
        &self,
        activity_id: ActivityId,
        teacher: Participant,
        questions: Vec<Question>,
    ) -> Result<(), ApiError> {
        if teacher.role != Role::Teacher {
            return Err(ApiError::NotTeacher(teacher.user_id));
        }
        if questions.is_empty() {
            return Err(ApiError::InvalidTransition(
                "an activity needs at least one question".to_string(),
            ));
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&activity_id) {
            return Err(ApiError::InvalidTransition(format!(
                "activity {activity_id} is already open"
            )));
        }

        tracing::info!(
            activity_id,
            teacher = %teacher.user_id,
            questions = questions.len(),
            "activity opened"
        );
        sessions.insert(
            activity_id,
            ActivityRecord {
                session: Session {
                    activity_id,
                    phase: SessionPhase::Waiting,
                    current_question_index: 0,
                    question_count: questions.len(),
                },
                teacher_id: teacher.user_id.clone(),
                questions,
                roster: vec![teacher],
                scores: HashMap::new(),
                awarded: HashSet::new(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Add a participant to the roster (idempotent per user id) and return
    /// the roster as of this join. The returned roster is what seeds the
    /// joining client's leaderboard.
    pub async fn join(
        &self,
        activity_id: ActivityId,
        participant: Participant,
    ) -> Result<Vec<Participant>, ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;

        if record.session.phase == SessionPhase::Finished {
            return Err(ApiError::InvalidTransition(
                "cannot join a finished session".to_string(),
            ));
        }

        match record
            .roster
            .iter_mut()
            .find(|p| p.user_id == participant.user_id)
        {
            Some(existing) => *existing = participant,
            None => {
                tracing::info!(activity_id, user = %participant.user_id, "participant joined");
                record.roster.push(participant);
            }
        }
        Ok(record.roster.clone())
    }

    pub(crate) async fn advance_session(
        &self,
        activity_id: ActivityId,
        question_index: usize,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;
        if record.teacher_id != *teacher_id {
            return Err(ApiError::NotTeacher(teacher_id.clone()));
        }

        let session = &mut record.session;
        match session.phase {
            SessionPhase::Waiting if question_index == 0 => {
                session.phase = SessionPhase::InProgress;
                session.current_question_index = 0;
                tracing::info!(activity_id, "quiz started");
            }
            SessionPhase::InProgress if question_index == session.current_question_index => {
                // Same index again: no state change, but re-broadcast so a
                // client that missed the first delivery can catch up.
                tracing::debug!(activity_id, question_index, "re-broadcasting current question");
            }
            SessionPhase::InProgress
                if question_index == session.current_question_index + 1
                    && question_index < session.question_count =>
            {
                session.current_question_index = question_index;
                tracing::info!(activity_id, question_index, "advanced to next question");
            }
            _ => {
                return Err(ApiError::InvalidTransition(format!(
                    "cannot move a {:?} session at question {} to question {question_index}",
                    session.phase, session.current_question_index
                )));
            }
        }

        self.publish(activity_id, SessionEvent::NextQuestion { question_index })
            .await;
        Ok(())
    }

    pub(crate) async fn finish_session(
        &self,
        activity_id: ActivityId,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;
        if record.teacher_id != *teacher_id {
            return Err(ApiError::NotTeacher(teacher_id.clone()));
        }

        match record.session.phase {
            SessionPhase::InProgress => {
                record.session.phase = SessionPhase::Finished;
                let runtime = Utc::now() - record.created_at;
                tracing::info!(activity_id, seconds = runtime.num_seconds(), "quiz finished");
            }
            SessionPhase::Finished => {
                tracing::debug!(activity_id, "re-broadcasting finish");
            }
            SessionPhase::Waiting => {
                return Err(ApiError::InvalidTransition(
                    "cannot finish a quiz that never started".to_string(),
                ));
            }
        }

        self.publish(activity_id, SessionEvent::FinishQuiz).await;
        Ok(())
    }

    /// Remove a participant from the roster. Their score rows stay, so they
    /// keep appearing in snapshots. When the last participant leaves, the
    /// session record and its topic are destroyed.
    pub(crate) async fn remove_participant(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&activity_id)
            .ok_or(ApiError::UnknownActivity(activity_id))?;

        let before = record.roster.len();
        record.roster.retain(|p| p.user_id != *user_id);
        if record.roster.len() == before {
            tracing::debug!(activity_id, user = %user_id, "leave for unknown participant ignored");
            return Ok(());
        }
        tracing::info!(activity_id, user = %user_id, "participant left");

        if record.roster.is_empty() {
            sessions.remove(&activity_id);
            drop(sessions);
            self.close_topic(activity_id).await;
            tracing::info!(activity_id, "all participants gone, session destroyed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SessionBackend;
    use crate::transport::TopicTransport;
    use crate::types::GameType;

    fn teacher() -> Participant {
        Participant {
            user_id: "t1".to_string(),
            display_name: "Ms. Vance".to_string(),
            role: Role::Teacher,
        }
    }

    fn student(id: &str, name: &str) -> Participant {
        Participant {
            user_id: id.to_string(),
            display_name: name.to_string(),
            role: Role::Student,
        }
    }

    fn quiz(len: usize) -> Vec<Question> {
        (0..len)
            .map(|i| Question {
                question_id: 100 + i as u64,
                game_type: GameType::WordChoice,
                prompt: format!("question {i}"),
                choices: vec![],
            })
            .collect()
    }

    async fn open_started_session(hub: &LocalHub, activity_id: ActivityId) {
        hub.open_activity(activity_id, teacher(), quiz(3)).await.unwrap();
        hub.next_question(activity_id, 0, &"t1".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_activity_rejects_duplicates_and_non_teachers() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(1)).await.unwrap();

        let again = hub.open_activity(1, teacher(), quiz(1)).await.unwrap_err();
        assert!(matches!(again, ApiError::InvalidTransition(_)));

        let student_led = hub.open_activity(2, student("s1", "Ana"), quiz(1)).await.unwrap_err();
        assert!(matches!(student_led, ApiError::NotTeacher(u) if u == "s1"));

        let empty = hub.open_activity(3, teacher(), vec![]).await.unwrap_err();
        assert!(matches!(empty, ApiError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_join_is_idempotent_per_user() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(1)).await.unwrap();

        let roster = hub.join(1, student("s1", "Ana")).await.unwrap();
        assert_eq!(roster.len(), 2);

        let roster = hub.join(1, student("s1", "Ana B.")).await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].display_name, "Ana B.");
    }

    #[tokio::test]
    async fn test_quiz_starts_only_at_question_zero() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(3)).await.unwrap();

        let err = hub.next_question(1, 1, &"t1".to_string()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition(_)));

        hub.next_question(1, 0, &"t1".to_string()).await.unwrap();
        let session = hub.session(1).await.unwrap();
        assert_eq!(session.phase, SessionPhase::InProgress);
        assert_eq!(session.current_question_index, 0);
    }

    #[tokio::test]
    async fn test_only_the_teacher_may_drive_the_session() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(3)).await.unwrap();
        hub.join(1, student("s1", "Ana")).await.unwrap();

        let err = hub.next_question(1, 0, &"s1".to_string()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotTeacher(u) if u == "s1"));

        hub.next_question(1, 0, &"t1".to_string()).await.unwrap();
        let err = hub.finish_quiz(1, &"s1".to_string()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotTeacher(_)));
    }

    #[tokio::test]
    async fn test_advance_rejects_skips_and_past_the_end() {
        let hub = LocalHub::new();
        open_started_session(&hub, 1).await;

        let skip = hub.next_question(1, 2, &"t1".to_string()).await.unwrap_err();
        assert!(matches!(skip, ApiError::InvalidTransition(_)));

        hub.next_question(1, 1, &"t1".to_string()).await.unwrap();
        hub.next_question(1, 2, &"t1".to_string()).await.unwrap();
        let past_end = hub.next_question(1, 3, &"t1".to_string()).await.unwrap_err();
        assert!(matches!(past_end, ApiError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_repeated_index_rebroadcasts_without_state_change() {
        let hub = LocalHub::new();
        open_started_session(&hub, 1).await;
        let mut sub = hub.subscribe(1).await.unwrap();

        hub.next_question(1, 0, &"t1".to_string()).await.unwrap();
        assert_eq!(hub.session(1).await.unwrap().current_question_index, 0);
        assert!(sub.next().await.unwrap().contains("\"questionIndex\":0"));
    }

    #[tokio::test]
    async fn test_finish_lifecycle() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(2)).await.unwrap();

        let too_early = hub.finish_quiz(1, &"t1".to_string()).await.unwrap_err();
        assert!(matches!(too_early, ApiError::InvalidTransition(_)));

        hub.next_question(1, 0, &"t1".to_string()).await.unwrap();
        hub.finish_quiz(1, &"t1".to_string()).await.unwrap();
        assert_eq!(hub.session(1).await.unwrap().phase, SessionPhase::Finished);

        // finishing again only re-broadcasts
        hub.finish_quiz(1, &"t1".to_string()).await.unwrap();

        let after_finish = hub.next_question(1, 1, &"t1".to_string()).await.unwrap_err();
        assert!(matches!(after_finish, ApiError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_last_leave_destroys_the_session() {
        let hub = LocalHub::new();
        hub.open_activity(1, teacher(), quiz(1)).await.unwrap();
        hub.join(1, student("s1", "Ana")).await.unwrap();

        hub.leave(1, &"zzz".to_string()).await.unwrap();
        hub.leave(1, &"s1".to_string()).await.unwrap();
        assert!(hub.session(1).await.is_some());

        hub.leave(1, &"t1".to_string()).await.unwrap();
        assert!(hub.session(1).await.is_none());
        assert!(matches!(
            hub.subscribe(1).await.unwrap_err(),
            crate::transport::TransportError::UnknownTopic(1)
        ));
    }
}
