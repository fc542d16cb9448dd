use std::time::Duration;

use actix_web::web::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use shared::{DetectResponse, ErrorResponse};
use url::Url;

use crate::config::endpoint;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("An error occurred while requesting '{url}'.")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("The detection service at '{url}' responded with {status}: {message}")]
    Upstream {
        url: String,
        status: u16,
        message: String,
    },
}

/// A file received from the browser, forwarded as-is.
#[derive(Debug, Clone)]
pub struct RelayFile {
    pub filename: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// HTTP client for the detection service. Every call is bounded by the
/// client timeout and never retried.
#[derive(Clone)]
pub struct DetectionClient {
    http: Client,
    base_url: Url,
}

impl DetectionClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn endpoint(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    pub async fn reset(&self) -> Result<(), RelayError> {
        let url = self.endpoint("reset");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| RelayError::Request {
                url: url.clone(),
                source,
            })?;

        ensure_success(&url, response).await?;
        Ok(())
    }

    /// Sends the whole batch as one multipart request under the `files` field.
    pub async fn submit(&self, files: Vec<RelayFile>) -> Result<DetectResponse, RelayError> {
        let url = self.endpoint("detect");

        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes.to_vec()).file_name(file.filename);
            let part = match file.content_type {
                Some(content_type) => {
                    part.mime_str(&content_type)
                        .map_err(|source| RelayError::Request {
                            url: url.clone(),
                            source,
                        })?
                }
                None => part,
            };
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| RelayError::Request {
                url: url.clone(),
                source,
            })?;

        ensure_success(&url, response)
            .await?
            .json::<DetectResponse>()
            .await
            .map_err(|source| RelayError::Request { url, source })
    }
}

async fn ensure_success(url: &str, response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(RelayError::Upstream {
        url: url.to_string(),
        status: status.as_u16(),
        message,
    })
}
