//! HTTP client for the Ecuro Light REST API.
//!
//! Every call is a single request with a fixed timeout. Failures, whether the
//! upstream answered with a non-success status or the request never
//! completed, are normalized into one [`UpstreamError`] shape so tool handlers
//! can surface them to the caller as ordinary content.
use std::{fmt, sync::Arc, time::Duration};

use base64::Engine;
use reqwest::{
    Method, RequestBuilder, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::Serialize;
use serde_json::Value;

use crate::directory::{DentistDirectory, DirectoryError};

pub const DEFAULT_BASE_URL: &str = "https://clinics.api.ecuro.com.br/api/v1/ecuro-light";
pub const ACCESS_TOKEN_HEADER: &str = "app-access-token";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BINARY_MIME_TYPE: &str = "image/png";
const JSON_MIME_TYPE: &str = "application/json";
const TEXT_ACCEPT: &str = "text/csv, text/plain, */*";

#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Status reported alongside an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Code(u16),
    /// The request never produced a response (timeout, DNS, connection reset).
    Unknown,
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamStatus::Code(code) => code.fmt(f),
            UpstreamStatus::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Ecuro API Error ({status}): {message}")]
pub struct UpstreamError {
    pub status: UpstreamStatus,
    pub message: String,
}

impl UpstreamError {
    fn transport(error: reqwest::Error) -> Self {
        let status = error
            .status()
            .map(|s| UpstreamStatus::Code(s.as_u16()))
            .unwrap_or(UpstreamStatus::Unknown);
        UpstreamError {
            status,
            message: error.to_string(),
        }
    }

    fn from_response(status: StatusCode, body: &[u8]) -> Self {
        UpstreamError {
            status: UpstreamStatus::Code(status.as_u16()),
            message: failure_message(status, body),
        }
    }
}

/// Pick the most useful message from an error body: `error`, then `message`,
/// then a generic status line.
fn failure_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        for key in ["error", "message"] {
            match map.get(key) {
                Some(Value::String(text)) if !text.is_empty() => return text.clone(),
                Some(Value::Null) | Some(Value::String(_)) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    format!("Request failed with status code {}", status.as_u16())
}

/// Encode raw bytes as a `data:` URI.
pub fn data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_BINARY_MIME_TYPE);
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// A client bound to one base URL and one access token.
///
/// Cloning is cheap and clones share the connection pool. Dentist lookups go
/// to the optional [`DentistDirectory`].
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    directory: Option<DentistDirectory>,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MIME_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME_TYPE));
        match HeaderValue::from_str(&config.access_token) {
            Ok(mut token) => {
                token.set_sensitive(true);
                headers.insert(ACCESS_TOKEN_HEADER, token);
            }
            Err(_) => {
                tracing::warn!(
                    "access token contains characters not allowed in a header, ignoring it"
                );
            }
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').into(),
            directory: None,
        })
    }

    pub fn with_directory(self, directory: DentistDirectory) -> Self {
        Self {
            directory: Some(directory),
            ..self
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn directory(&self) -> Result<&DentistDirectory, DirectoryError> {
        self.directory.as_ref().ok_or(DirectoryError::NotConfigured)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
        let request = builder.build().map_err(UpstreamError::transport)?;
        let method = request.method().clone();
        let path = request.url().path().to_string();
        tracing::debug!(%method, %path, "upstream request");
        let response = self.http.execute(request).await.map_err(|e| {
            tracing::warn!(%method, %path, error = %e, "upstream request failed");
            UpstreamError::transport(e)
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        let error = UpstreamError::from_response(status, &body);
        tracing::warn!(
            %method,
            %path,
            status = status.as_u16(),
            message = %error.message,
            "upstream returned an error"
        );
        Err(error)
    }

    async fn send_json(&self, builder: RequestBuilder) -> Result<Value, UpstreamError> {
        let response = self.send(builder).await?;
        let body = response.bytes().await.map_err(UpstreamError::transport)?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned())))
    }

    pub async fn get<Q>(&self, path: &str, query: &Q) -> Result<Value, UpstreamError>
    where
        Q: Serialize + ?Sized,
    {
        self.send_json(self.request(Method::GET, path).query(query))
            .await
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<Value, UpstreamError>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    pub async fn put<B>(&self, path: &str, body: Option<&B>) -> Result<Value, UpstreamError>
    where
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::PUT, path);
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        self.send_json(builder).await
    }

    pub async fn get_text<Q>(&self, path: &str, query: &Q) -> Result<String, UpstreamError>
    where
        Q: Serialize + ?Sized,
    {
        let builder = self
            .request(Method::GET, path)
            .header(ACCEPT, TEXT_ACCEPT)
            .query(query);
        let response = self.send(builder).await?;
        response.text().await.map_err(UpstreamError::transport)
    }

    pub async fn get_binary_as_data_uri(&self, path: &str) -> Result<String, UpstreamError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(UpstreamError::transport)?;
        Ok(data_uri(content_type.as_deref(), &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_prefers_error_field() {
        let body = br#"{"error":"clinic not found","message":"ignored"}"#;
        assert_eq!(
            failure_message(StatusCode::NOT_FOUND, body),
            "clinic not found"
        );
    }

    #[test]
    fn test_failure_message_falls_back_to_message_field() {
        let body = br#"{"status":"error","message":"token expired"}"#;
        assert_eq!(
            failure_message(StatusCode::UNAUTHORIZED, body),
            "token expired"
        );
    }

    #[test]
    fn test_failure_message_without_json_body() {
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>"),
            "Request failed with status code 502"
        );
    }

    #[test]
    fn test_upstream_error_display() {
        let error = UpstreamError {
            status: UpstreamStatus::Code(422),
            message: "invalid date".into(),
        };
        assert_eq!(error.to_string(), "Ecuro API Error (422): invalid date");
        let error = UpstreamError {
            status: UpstreamStatus::Unknown,
            message: "timed out".into(),
        };
        assert_eq!(error.to_string(), "Ecuro API Error (unknown): timed out");
    }

    #[test]
    fn test_data_uri_defaults_to_png() {
        assert_eq!(data_uri(None, b"abc"), "data:image/png;base64,YWJj");
        assert_eq!(
            data_uri(Some("image/svg+xml"), b"abc"),
            "data:image/svg+xml;base64,YWJj"
        );
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = UpstreamConfig {
            access_token: "secret-token".into(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
    }
}
