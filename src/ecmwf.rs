use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, FROM, HeaderMap, HeaderValue, LOCATION, RETRY_AFTER, USER_AGENT};
use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ApiCredentials;
use crate::domain::RequestSpec;
use crate::error::RetrieveError;

/// Remote side of a retrieval: runs one bounded request and leaves the
/// result at `destination`.
pub trait ArchiveClient: Send + Sync {
    fn submit(&self, request: &RequestSpec, destination: &Path) -> Result<(), RetrieveError>;
}

/// Client for the public-dataset service of the ECMWF Web API.
#[derive(Clone)]
pub struct EcmwfHttpClient {
    client: Client,
    downloader: Client,
    credentials: ApiCredentials,
    poll_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct TaskStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    href: String,
}

struct Reply {
    code: StatusCode,
    location: Option<String>,
    retry_after: Option<Duration>,
    body: TaskStatus,
}

impl EcmwfHttpClient {
    pub fn new(credentials: ApiCredentials) -> Result<Self, RetrieveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ecmwf-retrieve/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            FROM,
            HeaderValue::from_str(&credentials.email)
                .map_err(|err| RetrieveError::MissingCredentials(err.to_string()))?,
        );
        headers.insert(
            "X-ECMWF-KEY",
            HeaderValue::from_str(&credentials.key)
                .map_err(|err| RetrieveError::MissingCredentials(err.to_string()))?,
        );
        // Queue waits and downloads are unbounded; only connecting may time out.
        let client = Client::builder()
            .default_headers(headers.clone())
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .redirect(Policy::none())
            .build()
            .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))?;
        let downloader = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))?;
        Ok(Self {
            client,
            downloader,
            credentials,
            poll_interval: Duration::from_secs(30),
        })
    }

    pub fn from_environment() -> Result<Self, RetrieveError> {
        Self::new(ApiCredentials::load()?)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn requests_url(&self, dataset: &str) -> String {
        format!(
            "{}/datasets/{}/requests",
            self.credentials.url.trim_end_matches('/'),
            dataset
        )
    }

    fn send(builder: RequestBuilder) -> Result<Response, RetrieveError> {
        builder
            .send()
            .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))
    }

    fn read_reply(response: Response) -> Result<Reply, RetrieveError> {
        let code = response.status();
        if !(code.is_success() || code == StatusCode::SEE_OTHER) {
            let message = response
                .text()
                .unwrap_or_else(|_| "ECMWF request failed".to_string());
            return Err(RetrieveError::ArchiveStatus {
                status: code.as_u16(),
                message,
            });
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response
            .text()
            .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))?;
        let body = if text.trim().is_empty() {
            TaskStatus::default()
        } else {
            serde_json::from_str(&text)
                .map_err(|err| RetrieveError::ArchiveHttp(format!("unexpected reply: {err}")))?
        };
        Ok(Reply {
            code,
            location,
            retry_after,
            body,
        })
    }

    fn download(&self, href: &str, destination: &Path) -> Result<(), RetrieveError> {
        let mut response = Self::send(self.downloader.get(href))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ECMWF download failed".to_string());
            return Err(RetrieveError::ArchiveStatus { status, message });
        }

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".ecmwf-download")
            .tempfile_in(parent)
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| RetrieveError::ArchiveHttp(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn cleanup(&self, location: &str) {
        match Self::send(self.client.delete(location)) {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(
                location,
                status = response.status().as_u16(),
                "failed to delete remote request"
            ),
            Err(err) => warn!(location, error = %err, "failed to delete remote request"),
        }
    }
}

impl ArchiveClient for EcmwfHttpClient {
    fn submit(&self, request: &RequestSpec, destination: &Path) -> Result<(), RetrieveError> {
        let url = self.requests_url(request.dataset()?);
        info!(url = %url, destination = %destination.display(), "submitting request");

        let mut reply = Self::read_reply(Self::send(self.client.post(&url).json(request))?)?;
        let mut location: Option<String> = None;

        let href = loop {
            let status = reply.body.status.clone().unwrap_or_default();
            if status == "aborted" {
                let reason = reply
                    .body
                    .reason
                    .clone()
                    .or_else(|| reply.body.error.clone())
                    .unwrap_or_else(|| "no reason given".to_string());
                if let Some(location) = &location {
                    self.cleanup(location);
                }
                return Err(RetrieveError::Archive(reason));
            }

            let finished = status == "complete"
                || (status.is_empty() && reply.code == StatusCode::OK);
            if finished {
                let href = reply
                    .body
                    .result
                    .as_ref()
                    .map(|result| result.href.clone())
                    .or_else(|| reply.body.href.clone())
                    .ok_or_else(|| {
                        RetrieveError::ArchiveHttp("completed request without result".to_string())
                    })?;
                break href;
            }

            if let Some(next) = reply.location.clone().or_else(|| reply.body.href.clone()) {
                location = Some(next);
            }
            let Some(poll_url) = location.clone() else {
                return Err(RetrieveError::ArchiveHttp(
                    "pending request without a location to poll".to_string(),
                ));
            };
            let delay = reply.retry_after.unwrap_or(self.poll_interval);
            debug!(status = %status, delay_secs = delay.as_secs(), "request pending");
            thread::sleep(delay);
            reply = Self::read_reply(Self::send(self.client.get(&poll_url))?)?;
        };

        let result = self.download(&href, destination);
        if let Some(location) = &location {
            self.cleanup(location);
        }
        result?;
        info!(destination = %destination.display(), "request complete");
        Ok(())
    }
}
