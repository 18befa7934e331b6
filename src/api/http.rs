//! REST implementation of the backend contract
//!
//! Thin reqwest wrapper around the collaborator endpoints. Transport
//! failures map to `ApiError::Request`, non-success statuses to
//! `ApiError::Status`, except on the phase commands where the statuses the
//! server uses for authorization and sequencing rejections get their own
//! variants.

use super::{ApiError, SessionBackend};
use crate::types::{ActivityId, ChoiceId, QuestionId, ScoreEntry, UserId};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap();

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn command_error(
        status: reqwest::StatusCode,
        activity_id: ActivityId,
        teacher_id: &UserId,
    ) -> ApiError {
        match status.as_u16() {
            401 | 403 => ApiError::NotTeacher(teacher_id.clone()),
            404 => ApiError::UnknownActivity(activity_id),
            409 => ApiError::InvalidTransition(format!(
                "server rejected the command for activity {activity_id}"
            )),
            code => ApiError::Status(code),
        }
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn next_question(
        &self,
        activity_id: ActivityId,
        question_index: usize,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/activities/{activity_id}/next-question")))
            .query(&[
                ("questionIndex", question_index.to_string()),
                ("teacherId", teacher_id.clone()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::command_error(response.status(), activity_id, teacher_id));
        }
        Ok(())
    }

    async fn finish_quiz(
        &self,
        activity_id: ActivityId,
        teacher_id: &UserId,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/activities/{activity_id}/finish-quiz")))
            .query(&[("teacherId", teacher_id.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::command_error(response.status(), activity_id, teacher_id));
        }
        Ok(())
    }

    async fn fetch_leaderboard(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<ScoreEntry>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/activities/{activity_id}/leaderboard")))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<ScoreEntry>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn award_choice(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/scores/award/{activity_id}/{user_id}/{question_id}")))
            .query(&[("choiceId", choice_id.to_string())])
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn award_translation(
        &self,
        activity_id: ActivityId,
        user_id: &UserId,
        question_id: QuestionId,
        sequence: &[ChoiceId],
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!(
                "/scores/award/translation/{activity_id}/{user_id}/{question_id}"
            )))
            .json(&sequence)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn leave(&self, activity_id: ActivityId, user_id: &UserId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/activities/{activity_id}/leave")))
            .query(&[("userId", user_id.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:8080/");
        assert_eq!(
            backend.url("/activities/7/leaderboard"),
            "http://localhost:8080/activities/7/leaderboard"
        );
    }

    #[test]
    fn test_command_error_mapping() {
        let teacher = "t1".to_string();
        assert!(matches!(
            HttpBackend::command_error(reqwest::StatusCode::FORBIDDEN, 1, &teacher),
            ApiError::NotTeacher(u) if u == "t1"
        ));
        assert!(matches!(
            HttpBackend::command_error(reqwest::StatusCode::NOT_FOUND, 1, &teacher),
            ApiError::UnknownActivity(1)
        ));
        assert!(matches!(
            HttpBackend::command_error(reqwest::StatusCode::CONFLICT, 1, &teacher),
            ApiError::InvalidTransition(_)
        ));
        assert!(matches!(
            HttpBackend::command_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, 1, &teacher),
            ApiError::Status(500)
        ));
    }
}
