use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// One decoded inventory row: flat field-name to scalar mapping.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("service error: {0}")]
    Service(String),
}

/// Client for an AdminService-style OData endpoint exposing WMI inventory
/// classes. Issues authenticated GETs only; filter grammar is the caller's
/// responsibility, including single-quote escaping of interpolated literals.
#[derive(Debug, Clone)]
pub struct AdminClient {
    base_url: Url,
    http: Client,
}

impl AdminClient {
    pub fn new(base_url: &str, verify_tls: bool) -> Result<Self> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let parsed = Url::parse(&normalized).context("parsing AdminService base URL")?;
        let http = Client::builder()
            .user_agent(HeaderValue::from_static("serialctl/0.1"))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    /// Fetch rows from an inventory class, optionally filtered and projected.
    /// `$filter` and `$select` are appended independently only when provided;
    /// the filter value is percent-encoded as a query-string component.
    pub fn query(
        &self,
        class: &str,
        filter: Option<&str>,
        select: Option<&[&str]>,
    ) -> Result<Vec<Row>, QueryError> {
        let url = self
            .base_url
            .join(class)
            .map_err(|e| QueryError::Service(format!("joining class `{class}`: {e}")))?;

        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = filter {
            pairs.push(("$filter", filter.to_string()));
        }
        if let Some(fields) = select {
            pairs.push(("$select", fields.join(",")));
        }

        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static("serialctl/0.1"));
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }

        let response = request.send().map_err(QueryError::Transport)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(QueryError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(QueryError::Service(format!(
                "HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }

        let text = response.text().map_err(QueryError::Transport)?;
        decode_rows(&text)
    }
}

/// Decode the OData envelope: the `value` field holds the row array; an
/// otherwise-valid body without `value` means zero rows, any other top-level
/// shape is a service error.
fn decode_rows(body: &str) -> Result<Vec<Row>, QueryError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| QueryError::Service(format!("response body is not JSON: {e}")))?;
    let object = json
        .as_object()
        .ok_or_else(|| QueryError::Service("unexpected top-level response shape".into()))?;

    match object.get("value") {
        None => Ok(Vec::new()),
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| {
                row.as_object()
                    .cloned()
                    .ok_or_else(|| QueryError::Service("non-object row in `value` array".into()))
            })
            .collect(),
        Some(_) => Err(QueryError::Service("`value` is not an array".into())),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
