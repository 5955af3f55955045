//! HTTP client for the transcode job service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::config::TranscodeConfig;

use super::{JobStatus, SubmitJobRequest, TranscodeError, TranscodeOutput, TranscodeService};

/// Transcode job service reached over HTTP.
///
/// Endpoints:
/// - `POST {url}/jobs` with `{asset_id, source_location}`
/// - `GET {url}/jobs/{asset_id}` returning `{"status": ...}`
/// - `GET {url}/jobs/{asset_id}/result` returning the job output
pub struct HttpTranscodeClient {
    client: Client,
    base_url: String,
}

impl HttpTranscodeClient {
    /// Create a new client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout_secs: u32) -> Result<Self, TranscodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .build()
            .map_err(|e| TranscodeError::Unreachable(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration. Returns `None` when no URL is configured.
    pub fn from_config(config: &TranscodeConfig) -> Result<Option<Self>, TranscodeError> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, config.timeout_secs))
            .transpose()
    }

    fn job_url(&self, asset_id: &str) -> String {
        format!(
            "{}/jobs/{}",
            self.base_url,
            urlencoding::encode(asset_id)
        )
    }

    /// Map non-success responses to errors.
    async fn check(asset_id: &str, response: Response) -> Result<Response, TranscodeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TranscodeError::JobNotFound(asset_id.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(TranscodeError::Api {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl TranscodeService for HttpTranscodeClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, asset_id: &str, source_location: &str) -> Result<(), TranscodeError> {
        let url = format!("{}/jobs", self.base_url);
        let body = SubmitJobRequest {
            asset_id: asset_id.to_string(),
            source_location: source_location.to_string(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        Self::check(asset_id, response).await?;

        debug!("Submitted transcode job for asset {}", asset_id);
        Ok(())
    }

    async fn status(&self, asset_id: &str) -> Result<JobStatus, TranscodeError> {
        let response = self.client.get(self.job_url(asset_id)).send().await?;
        let response = Self::check(asset_id, response).await?;
        response
            .json::<JobStatus>()
            .await
            .map_err(|e| TranscodeError::InvalidResponse(e.to_string()))
    }

    async fn result(&self, asset_id: &str) -> Result<TranscodeOutput, TranscodeError> {
        let url = format!("{}/result", self.job_url(asset_id));
        let response = self.client.get(&url).send().await?;
        let response = Self::check(asset_id, response).await?;
        response
            .json::<TranscodeOutput>()
            .await
            .map_err(|e| TranscodeError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = HttpTranscodeClient::new("http://transcoder:7000/", 5).unwrap();
        assert_eq!(client.job_url("abc"), "http://transcoder:7000/jobs/abc");
    }

    #[test]
    fn test_from_config_without_url() {
        let config = TranscodeConfig::default();
        assert!(HttpTranscodeClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Port 9 (discard) is almost never listening.
        let client = HttpTranscodeClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.status("asset-1").await.unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::Unreachable(_) | TranscodeError::Timeout
        ));
    }
}
