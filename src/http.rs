//! HTTP capability consumed by the step executor.

use crate::error::TransportError;
use crate::model::{HttpMethod, ResponseSnapshot};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method as ReqMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// A fully bound request, ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub payload: Option<Value>,
    /// File uploaded as a multipart `file` part next to the payload.
    pub attachment: Option<PathBuf>,
}

/// Sends one request and returns one response.
///
/// Timeouts, TLS and connection handling belong to the implementation.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        request: &OutboundRequest,
    ) -> Result<ResponseSnapshot, TransportError>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn convert_method(method: HttpMethod) -> ReqMethod {
        match method {
            HttpMethod::Get => ReqMethod::GET,
            HttpMethod::Post => ReqMethod::POST,
            HttpMethod::Put => ReqMethod::PUT,
            HttpMethod::Delete => ReqMethod::DELETE,
            HttpMethod::Patch => ReqMethod::PATCH,
            HttpMethod::Head => ReqMethod::HEAD,
            HttpMethod::Options => ReqMethod::OPTIONS,
        }
    }

    async fn multipart_form(
        path: &Path,
        payload: Option<&Value>,
    ) -> Result<Form, TransportError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| {
            TransportError::Attachment {
                path: path.display().to_string(),
                source,
            }
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let request_error = |e: reqwest::Error| TransportError::Request {
            url: path.display().to_string(),
            reason: e.to_string(),
        };

        let file = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime_for(&file_name))
            .map_err(request_error)?;
        let data = serde_json::to_string(payload.unwrap_or(&Value::Null))
            .unwrap_or_else(|_| "null".to_string());
        let data = Part::text(data)
            .mime_str("application/json")
            .map_err(request_error)?;

        Ok(Form::new().part("file", file).part("data", data))
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// MIME type sent for an uploaded file.
pub fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else if lower.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(skip(self, request), fields(url = %request.url, method = %request.method))]
    async fn send(
        &self,
        request: &OutboundRequest,
    ) -> Result<ResponseSnapshot, TransportError> {
        let url = url::Url::parse(&request.url).map_err(|e| {
            TransportError::InvalidUrl {
                url: request.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut req_builder = self
            .client
            .request(Self::convert_method(request.method), url)
            .timeout(self.timeout);

        if let Some(path) = &request.attachment {
            for (name, value) in &request.headers {
                // multipart sets its own boundary content type
                if !name.eq_ignore_ascii_case("content-type") {
                    req_builder = req_builder.header(name, value);
                }
            }
            debug!("Uploading attachment {}", path.display());
            let form =
                Self::multipart_form(path, request.payload.as_ref()).await?;
            req_builder = req_builder.multipart(form);
        } else {
            for (name, value) in &request.headers {
                req_builder = req_builder.header(name, value);
            }
            if let Some(payload) = &request.payload {
                req_builder = req_builder.json(payload);
            }
        }

        debug!("Sending {} request to {}", request.method, request.url);
        let start = Instant::now();
        let response =
            req_builder
                .send()
                .await
                .map_err(|e| TransportError::Request {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let body =
            response
                .text()
                .await
                .map_err(|e| TransportError::Request {
                    url: request.url.clone(),
                    reason: format!("failed to read response body: {e}"),
                })?;
        let elapsed = start.elapsed();

        info!(
            "Received status {} from {} in {} ms",
            status,
            request.url,
            elapsed.as_millis()
        );
        Ok(ResponseSnapshot::from_parts(status, headers, body, elapsed))
    }
}
