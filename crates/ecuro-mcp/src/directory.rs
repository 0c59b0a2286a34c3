//! Read-only client for the dentist directory kept in the clinic's Supabase
//! project, queried through its PostgREST endpoint.
use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde_json::Value;

pub const DENTIST_TABLE: &str = "dentist_specialities_expanded";
const API_KEY_HEADER: &str = "apikey";

#[derive(Clone)]
pub struct DirectoryConfig {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Dentist directory is not configured: set SUPABASE_URL and SUPABASE_KEY")]
    NotConfigured,
    #[error("Supabase Error: {0}")]
    Query(String),
}

/// PostgREST reports failures as `{"message": ..., "code": ..., "hint": ...}`.
fn query_failure(status: StatusCode, body: &[u8]) -> DirectoryError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_owned))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
    DirectoryError::Query(message)
}

#[derive(Clone)]
pub struct DentistDirectory {
    http: reqwest::Client,
    table_url: Arc<str>,
}

impl fmt::Debug for DentistDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DentistDirectory")
            .field("table_url", &self.table_url)
            .finish_non_exhaustive()
    }
}

impl DentistDirectory {
    pub fn new(config: DirectoryConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        match (
            HeaderValue::from_str(&config.key),
            HeaderValue::from_str(&format!("Bearer {}", config.key)),
        ) {
            (Ok(mut key), Ok(mut bearer)) => {
                key.set_sensitive(true);
                bearer.set_sensitive(true);
                headers.insert(API_KEY_HEADER, key);
                headers.insert(AUTHORIZATION, bearer);
            }
            _ => tracing::warn!("directory key contains characters not allowed in a header"),
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        let table_url = format!(
            "{}/rest/v1/{DENTIST_TABLE}",
            config.url.trim_end_matches('/')
        );
        Ok(Self {
            http,
            table_url: table_url.into(),
        })
    }

    /// Every row whose columns equal the given values.
    pub async fn find(&self, filters: &[(&str, &str)]) -> Result<Vec<Value>, DirectoryError> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        query.extend(
            filters
                .iter()
                .map(|(column, value)| (column.to_string(), format!("eq.{value}"))),
        );
        tracing::debug!(table = DENTIST_TABLE, ?filters, "directory query");
        let response = self
            .http
            .get(&*self.table_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "directory request failed");
                DirectoryError::Query(e.to_string())
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::Query(e.to_string()))?;
        if !status.is_success() {
            let error = query_failure(status, &body);
            tracing::warn!(status = status.as_u16(), %error, "directory returned an error");
            return Err(error);
        }
        match serde_json::from_slice(&body) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(Value::Null) => Ok(Vec::new()),
            Ok(other) => Ok(vec![other]),
            Err(e) => Err(DirectoryError::Query(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failure_uses_postgrest_message() {
        let body = br#"{"code":"42703","message":"column dentist.nome does not exist"}"#;
        assert_eq!(
            query_failure(StatusCode::BAD_REQUEST, body).to_string(),
            "Supabase Error: column dentist.nome does not exist"
        );
        assert_eq!(
            query_failure(StatusCode::UNAUTHORIZED, b"").to_string(),
            "Supabase Error: Request failed with status code 401"
        );
    }

    #[test]
    fn test_table_url_and_redacted_debug() {
        let config = DirectoryConfig {
            url: "https://project.supabase.co/".into(),
            key: "service-role-key".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(!format!("{config:?}").contains("service-role-key"));
        let directory = DentistDirectory::new(config).unwrap();
        assert_eq!(
            &*directory.table_url,
            "https://project.supabase.co/rest/v1/dentist_specialities_expanded"
        );
    }
}
