//! REST client for the agent-facing endpoints.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use toolq_core::job::Job;
use toolq_core::pool::{AgentView, QueueStatus};
use toolq_core::types::JobId;
use toolq_core::worker::{
    CompleteReport, FailReport, HeartbeatRequest, ProgressReport, ReleaseRequest,
};

use crate::error::AgentError;

/// The server operations a worker needs.
///
/// [`ApiClient`] talks HTTP; tests drive the worker against an in-process
/// scheduler instead.
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn heartbeat(&self, agent_id: &str, name: Option<String>)
        -> Result<AgentView, AgentError>;

    /// `Ok(None)` when there is nothing to hand out.
    async fn claim(&self, agent_id: &str) -> Result<Option<Job>, AgentError>;

    async fn report_progress(
        &self,
        job_id: JobId,
        agent_id: &str,
        progress: serde_json::Value,
    ) -> Result<Job, AgentError>;

    async fn complete(
        &self,
        job_id: JobId,
        agent_id: &str,
        result_ref: String,
    ) -> Result<Job, AgentError>;

    async fn fail(
        &self,
        job_id: JobId,
        agent_id: &str,
        error_message: String,
    ) -> Result<Job, AgentError>;

    async fn release(&self, job_id: JobId, agent_id: &str) -> Result<Job, AgentError>;

    async fn queue_status(&self) -> Result<QueueStatus, AgentError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// HTTP implementation of [`QueueApi`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` includes the `/api/v1` prefix.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        read_data(response).await
    }
}

/// Unwrap a `{ "data": ... }` envelope or turn an error body into
/// [`AgentError::Api`].
async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AgentError> {
    let status = response.status();
    if status.is_success() {
        let envelope: Envelope<T> = response.json().await?;
        return Ok(envelope.data);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.error),
        Err(_) => ("UNKNOWN".to_string(), text),
    };
    Err(AgentError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl QueueApi for ApiClient {
    async fn heartbeat(
        &self,
        agent_id: &str,
        name: Option<String>,
    ) -> Result<AgentView, AgentError> {
        self.post(
            &format!("/agents/{agent_id}/heartbeat"),
            &HeartbeatRequest { name },
        )
        .await
    }

    async fn claim(&self, agent_id: &str) -> Result<Option<Job>, AgentError> {
        let response = self
            .http
            .post(self.url(&format!("/agents/{agent_id}/claim")))
            .send()
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        read_data(response).await.map(Some)
    }

    async fn report_progress(
        &self,
        job_id: JobId,
        agent_id: &str,
        progress: serde_json::Value,
    ) -> Result<Job, AgentError> {
        let body = ProgressReport {
            agent_id: agent_id.to_string(),
            progress,
        };
        self.post(&format!("/jobs/{job_id}/progress"), &body).await
    }

    async fn complete(
        &self,
        job_id: JobId,
        agent_id: &str,
        result_ref: String,
    ) -> Result<Job, AgentError> {
        let body = CompleteReport {
            agent_id: agent_id.to_string(),
            result_ref,
        };
        self.post(&format!("/jobs/{job_id}/complete"), &body).await
    }

    async fn fail(
        &self,
        job_id: JobId,
        agent_id: &str,
        error_message: String,
    ) -> Result<Job, AgentError> {
        let body = FailReport {
            agent_id: agent_id.to_string(),
            error_message,
        };
        self.post(&format!("/jobs/{job_id}/fail"), &body).await
    }

    async fn release(&self, job_id: JobId, agent_id: &str) -> Result<Job, AgentError> {
        let body = ReleaseRequest {
            agent_id: agent_id.to_string(),
        };
        self.post(&format!("/jobs/{job_id}/release"), &body).await
    }

    async fn queue_status(&self) -> Result<QueueStatus, AgentError> {
        let response = self.http.get(self.url("/queue/status")).send().await?;
        read_data(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:3000/api/v1/");
        assert_eq!(
            client.url("/queue/status"),
            "http://localhost:3000/api/v1/queue/status"
        );
    }

    #[test]
    fn error_body_matches_server_envelope() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"Job x not found","code":"NOT_FOUND"}"#).unwrap();
        assert_eq!(body.code, "NOT_FOUND");
        assert_eq!(body.error, "Job x not found");
    }
}
