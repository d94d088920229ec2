//! HTTP client for the download service.
//!
//! # Design
//! - `TaskApi` and `CookieApi` are the seams the tracker depends on; tests swap in fakes.
//! - Any non-2xx status query means the task is unknown to the service.
//! - Connection failures, timeouts and undecodable bodies are transient.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use rushia_api_models::{
    COOKIE_PATH, CookieUploaded, DOWNLOAD_PATH, DownloadAccepted, DownloadRequest, ErrorDetail,
    STATUS_PATH, TaskStatusResponse, UPLOAD_COOKIE_PATH,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{TrackerError, TrackerResult};
use crate::model::{MediaFormat, TaskSnapshot};

const SUBMIT_FALLBACK: &str = "Failed to create download task";
const COOKIE_UPLOAD_FALLBACK: &str = "Failed to upload cookie file";
const COOKIE_DELETE_FALLBACK: &str = "Failed to delete cookie file";

/// Validated parameters for a task submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    url: String,
    format: MediaFormat,
    cookie_id: Option<String>,
}

impl SubmitRequest {
    /// Validate and normalise submission parameters.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Validation`] when `url` is blank.
    pub fn new(url: &str, format: MediaFormat, cookie_id: Option<String>) -> TrackerResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TrackerError::Validation {
                field: "url",
                reason: "Please enter a video URL",
            });
        }
        Ok(Self {
            url: url.to_string(),
            format,
            cookie_id: cookie_id.filter(|id| !id.trim().is_empty()),
        })
    }

    /// Trimmed source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requested format.
    #[must_use]
    pub const fn format(&self) -> MediaFormat {
        self.format
    }

    /// Cookie to attach, if any.
    #[must_use]
    pub fn cookie_id(&self) -> Option<&str> {
        self.cookie_id.as_deref()
    }
}

/// Task creation and status queries.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Create a task and return its id.
    async fn submit(&self, request: &SubmitRequest) -> TrackerResult<String>;

    /// Fetch the current state of `task_id`.
    async fn query(&self, task_id: &str) -> TrackerResult<TaskSnapshot>;
}

/// Cookie file management.
#[async_trait]
pub trait CookieApi: Send + Sync {
    /// Upload a Netscape-format cookie file and return its id.
    async fn upload_cookie(&self, path: &Path) -> TrackerResult<String>;

    /// Delete a previously uploaded cookie file.
    async fn delete_cookie(&self, cookie_id: &str) -> TrackerResult<()>;
}

/// Delete `cookie_id`, logging and swallowing any failure.
pub async fn clear_cookie(api: &dyn CookieApi, cookie_id: &str) {
    if let Err(err) = api.delete_cookie(cookie_id).await {
        debug!(cookie_id, error = %err, "cookie deletion failed; ignoring");
    }
}

/// [`TaskApi`] and [`CookieApi`] over HTTP.
#[derive(Clone)]
pub struct HttpTaskClient {
    client: Client,
    base_url: Url,
}

impl HttpTaskClient {
    /// Client issuing requests relative to `base_url` with a preconfigured `reqwest` client.
    #[must_use]
    pub const fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL serving a completed artifact.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Validation`] when the base URL cannot carry a path.
    pub fn artifact_url(&self, filename: &str) -> TrackerResult<Url> {
        self.endpoint(DOWNLOAD_PATH, Some(filename))
    }

    /// Stream a completed artifact to `dest`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Artifact`] for a non-2xx answer,
    /// [`TrackerError::Transient`] for network failures and
    /// [`TrackerError::Store`] when `dest` cannot be written.
    #[instrument(name = "client.fetch_artifact", skip(self, dest), fields(dest = %dest.display()))]
    pub async fn fetch_artifact(&self, filename: &str, dest: &Path) -> TrackerResult<u64> {
        let url = self.artifact_url(filename)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| TrackerError::transient("fetch_artifact", None, err))?;
        if !response.status().is_success() {
            return Err(TrackerError::Artifact {
                filename: filename.to_string(),
                status: response.status().as_u16(),
            });
        }

        let store_error = |operation: &'static str, source: std::io::Error| TrackerError::Store {
            operation,
            key: dest.display().to_string(),
            source,
        };
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|err| store_error("create_artifact", err))?;
        let mut stream = response.bytes_stream();
        let mut written = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| TrackerError::transient("fetch_artifact", None, err))?;
            file.write_all(&chunk)
                .await
                .map_err(|err| store_error("write_artifact", err))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|err| store_error("write_artifact", err))?;
        debug!(bytes = written, "artifact saved");
        Ok(written)
    }

    fn endpoint(&self, path: &str, tail: Option<&str>) -> TrackerResult<Url> {
        let invalid = || TrackerError::Validation {
            field: "api_url",
            reason: "API URL cannot be used as a base for requests",
        };
        let mut url = self.base_url.join(path).map_err(|_| invalid())?;
        if let Some(tail) = tail {
            url.path_segments_mut().map_err(|()| invalid())?.push(tail);
        }
        Ok(url)
    }
}

/// Pull the `detail` field out of an error body, falling back to `fallback`.
async fn problem_message(response: Response, fallback: &str) -> String {
    let bytes = response.bytes().await.unwrap_or_default();
    serde_json::from_slice::<ErrorDetail>(&bytes)
        .ok()
        .and_then(|problem| problem.detail)
        .filter(|detail| !detail.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl TaskApi for HttpTaskClient {
    #[instrument(name = "client.submit", skip(self, request), fields(format = %request.format()))]
    async fn submit(&self, request: &SubmitRequest) -> TrackerResult<String> {
        let body = DownloadRequest {
            url: request.url().to_string(),
            format: request.format().wire().to_string(),
            cookie_id: request.cookie_id().map(str::to_string),
        };
        let response = self
            .client
            .post(self.endpoint(DOWNLOAD_PATH, None)?)
            .json(&body)
            .send()
            .await
            .map_err(|err| TrackerError::transient("submit", None, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Submission {
                message: problem_message(response, SUBMIT_FALLBACK).await,
                status: Some(status.as_u16()),
            });
        }

        let accepted: DownloadAccepted = response
            .json()
            .await
            .map_err(|err| TrackerError::transient("submit", None, err))?;
        debug!(task_id = %accepted.task_id, "task accepted");
        Ok(accepted.task_id)
    }

    #[instrument(name = "client.query", skip(self))]
    async fn query(&self, task_id: &str) -> TrackerResult<TaskSnapshot> {
        let response = self
            .client
            .get(self.endpoint(STATUS_PATH, Some(task_id))?)
            .send()
            .await
            .map_err(|err| TrackerError::transient("query", Some(task_id), err))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "status query rejected");
            return Err(TrackerError::NotFound {
                task_id: task_id.to_string(),
            });
        }

        let body: TaskStatusResponse = response
            .json()
            .await
            .map_err(|err| TrackerError::transient("query", Some(task_id), err))?;
        Ok(TaskSnapshot::from(body))
    }
}

#[async_trait]
impl CookieApi for HttpTaskClient {
    #[instrument(name = "client.upload_cookie", skip(self), fields(path = %path.display()))]
    async fn upload_cookie(&self, path: &Path) -> TrackerResult<String> {
        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_txt {
            return Err(TrackerError::Validation {
                field: "cookie_file",
                reason: "Please select a .txt cookie file",
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| TrackerError::Store {
                operation: "read_cookie",
                key: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "cookies.txt".to_string(), |name| name.to_string_lossy().into_owned());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/plain")
            .map_err(|err| TrackerError::transient("upload_cookie", None, err))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint(UPLOAD_COOKIE_PATH, None)?)
            .multipart(form)
            .send()
            .await
            .map_err(|err| TrackerError::transient("upload_cookie", None, err))?;
        if !response.status().is_success() {
            return Err(TrackerError::Cookie {
                operation: "upload",
                message: problem_message(response, COOKIE_UPLOAD_FALLBACK).await,
            });
        }

        let uploaded: CookieUploaded = response
            .json()
            .await
            .map_err(|err| TrackerError::transient("upload_cookie", None, err))?;
        Ok(uploaded.cookie_id)
    }

    #[instrument(name = "client.delete_cookie", skip(self))]
    async fn delete_cookie(&self, cookie_id: &str) -> TrackerResult<()> {
        let response = self
            .client
            .delete(self.endpoint(COOKIE_PATH, Some(cookie_id))?)
            .send()
            .await
            .map_err(|err| TrackerError::transient("delete_cookie", None, err))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(TrackerError::Cookie {
            operation: "delete",
            message: problem_message(response, COOKIE_DELETE_FALLBACK).await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpTaskClient {
        HttpTaskClient::new(Client::new(), base.parse().expect("url"))
    }

    #[test]
    fn submit_request_rejects_blank_urls() {
        let err = SubmitRequest::new("   ", MediaFormat::Audio, None).expect_err("blank");
        assert!(matches!(err, TrackerError::Validation { field: "url", .. }));

        let request = SubmitRequest::new(" https://x/watch?v=abc ", MediaFormat::Video, Some(" ".into()))
            .expect("valid");
        assert_eq!(request.url(), "https://x/watch?v=abc");
        assert_eq!(request.cookie_id(), None);
    }

    #[test]
    fn endpoints_escape_opaque_segments() {
        let client = client("http://127.0.0.1:8000");
        let url = client.endpoint(STATUS_PATH, Some("a/b c")).expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/api/status/a%2Fb%20c");
        let artifact = client.artifact_url("Song.m4a").expect("artifact url");
        assert_eq!(artifact.as_str(), "http://127.0.0.1:8000/api/download/Song.m4a");
    }
}
