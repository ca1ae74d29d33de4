use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::gateway::{
    AnswerUpsert, ExamGateway, RoomStatus, StartedAttempt, SubmitOutcome, error::GatewayResult,
};

use super::{
    config::HttpGatewayConfig,
    error::{HttpGatewayError, HttpResult},
    models::{RoomStatusResponse, StartAttemptRequest, SubmitResponse},
};

/// Exam API client backed by reqwest. Cloning is cheap; the connection pool
/// is shared.
#[derive(Clone)]
pub struct HttpExamGateway {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl HttpExamGateway {
    /// Build a client from the given configuration.
    pub fn new(config: HttpGatewayConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| HttpGatewayError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            token: config.token.map(Arc::<str>::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        if let Some(ref token) = self.token {
            builder.bearer_auth(token.as_ref())
        } else {
            builder
        }
    }

    async fn send_json<T>(builder: reqwest::RequestBuilder, path: &str) -> HttpResult<T>
    where
        T: DeserializeOwned,
    {
        let response = builder
            .send()
            .await
            .map_err(|source| HttpGatewayError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpGatewayError::RequestStatus {
                path: path.to_string(),
                status,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| HttpGatewayError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn send_ack(builder: reqwest::RequestBuilder, path: &str) -> HttpResult<()> {
        let response = builder
            .send()
            .await
            .map_err(|source| HttpGatewayError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HttpGatewayError::RequestStatus {
                path: path.to_string(),
                status,
            })
        }
    }
}

impl ExamGateway for HttpExamGateway {
    fn start_attempt(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> BoxFuture<'static, GatewayResult<StartedAttempt>> {
        let this = self.clone();
        Box::pin(async move {
            let path = "attempts/start";
            let builder = this.request(Method::POST, path).json(&StartAttemptRequest {
                exam_id,
                student_id,
            });
            Self::send_json::<StartedAttempt>(builder, path)
                .await
                .map_err(|err| err.into_gateway("start-attempt"))
        })
    }

    fn save_answer(
        &self,
        attempt_id: Uuid,
        upsert: AnswerUpsert,
    ) -> BoxFuture<'static, GatewayResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let path = format!("attempts/{attempt_id}/answers/{}", upsert.question_id);
            let builder = this.request(Method::PUT, &path).json(&upsert);
            Self::send_ack(builder, &path)
                .await
                .map_err(|err| err.into_gateway("save-answer"))
        })
    }

    fn room_status(&self, room_id: Uuid) -> BoxFuture<'static, GatewayResult<RoomStatus>> {
        let this = self.clone();
        Box::pin(async move {
            let path = format!("rooms/{room_id}/status");
            let builder = this.request(Method::GET, &path);
            Self::send_json::<RoomStatusResponse>(builder, &path)
                .await
                .map(|response| response.status)
                .map_err(|err| err.into_gateway("poll-room-status"))
        })
    }

    fn submit_attempt(
        &self,
        attempt_id: Uuid,
    ) -> BoxFuture<'static, GatewayResult<SubmitOutcome>> {
        let this = self.clone();
        Box::pin(async move {
            let path = format!("attempts/{attempt_id}/submit");
            let builder = this.request(Method::POST, &path);
            match Self::send_json::<SubmitResponse>(builder, &path).await {
                Ok(response) => Ok(response.status.into()),
                // The API reports a replayed submit of a finalized attempt as
                // a conflict; the contract treats that as success.
                Err(HttpGatewayError::RequestStatus {
                    status: StatusCode::CONFLICT,
                    ..
                }) => Ok(SubmitOutcome::AlreadySubmitted),
                Err(err) => Err(err.into_gateway("submit-attempt")),
            }
        })
    }
}
