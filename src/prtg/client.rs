//! HTTP client for the PRTG table endpoint.

use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::normalize::body_snippet;
use crate::error::PrtgError;

/// Columns requested when pulling a single sensor row.
const SENSOR_COLUMNS: &str = "objid,name,probe,group,device,status,lastvalue,lastcheck,lastup,lastdown,uptime,downtime,interval,coverage,message,priority";

pub const DEFAULT_TIMEOUT_SECS: i64 = 15;

/// Candidate credentials for a connection test.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCandidate {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub passhash: String,
    #[serde(default)]
    pub verify_tls: Option<bool>,
    #[serde(default)]
    pub timeout: Option<i64>,
    /// Configuration record to persist the outcome onto.
    #[serde(default)]
    pub id: Option<i64>,
}

/// Result of a connection test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
}

/// Normalize a user-supplied endpoint: trim, default to https when no
/// scheme is given, drop any trailing slash.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", trimmed.trim_end_matches('/'))
    }
}

/// Apply the configured timeout, falling back to the default when the
/// stored value is not positive.
pub fn effective_timeout(secs: i64) -> Duration {
    let secs = if secs > 0 { secs } else { DEFAULT_TIMEOUT_SECS };
    Duration::from_secs(secs as u64)
}

/// Build a client with the TLS verification toggle, timeout and redirect
/// cap shared by all PRTG calls.
pub(crate) fn build_client(
    verify_tls: bool,
    timeout: Duration,
) -> Result<reqwest::Client, PrtgError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(!verify_tls)
        .redirect(Policy::limited(3))
        .build()
        .map_err(|e| PrtgError::Transport(e.to_string()))
}

/// GET a PRTG URL and return the body text.
///
/// Transport failures map to `Transport`; HTTP >= 400 maps to `Protocol`
/// with an `"HTTP <code>"` message carrying a tag-stripped body snippet.
async fn get_text(
    url: &str,
    query: &[(&str, &str)],
    verify_tls: bool,
    timeout: Duration,
) -> Result<String, PrtgError> {
    let client = build_client(verify_tls, timeout)?;

    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| PrtgError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| PrtgError::Transport(e.to_string()))?;

    if status >= 400 {
        let snippet = body_snippet(&body);
        let message = if snippet.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} - {}", status, snippet)
        };
        return Err(PrtgError::Protocol {
            code: status,
            message,
        });
    }

    Ok(body)
}

/// Probe the table endpoint with candidate credentials.
///
/// Asks for exactly one sensor row with a minimal column set. Missing
/// input is the only `Err`; every upstream failure is folded into an
/// unsuccessful `TestOutcome`.
pub async fn test_connection(candidate: &ConnectionCandidate) -> Result<TestOutcome, PrtgError> {
    let endpoint = normalize_endpoint(&candidate.endpoint);
    let username = candidate.username.trim();
    let passhash = candidate.passhash.trim();

    if endpoint.is_empty() || username.is_empty() || passhash.is_empty() {
        return Err(PrtgError::Validation(
            "Endpoint, username and passhash are required.".to_string(),
        ));
    }

    let verify_tls = candidate.verify_tls.unwrap_or(true);
    let timeout = effective_timeout(candidate.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let query = [
        ("content", "sensors"),
        ("count", "1"),
        ("username", username),
        ("passhash", passhash),
        ("columns", "objid"),
    ];

    let url = format!("{}/api/table.json", endpoint);
    let body = match get_text(&url, &query, verify_tls, timeout).await {
        Ok(body) => body,
        Err(PrtgError::Transport(message)) => {
            return Ok(TestOutcome {
                success: false,
                message,
                http_code: None,
            })
        }
        Err(PrtgError::Protocol { code, message }) => {
            return Ok(TestOutcome {
                success: false,
                message,
                http_code: Some(code),
            })
        }
        Err(e) => return Err(e),
    };

    if serde_json::from_str::<Value>(&body).is_err() {
        return Ok(TestOutcome {
            success: false,
            message: "Invalid JSON received from PRTG".to_string(),
            http_code: None,
        });
    }

    Ok(TestOutcome {
        success: true,
        message: "OK".to_string(),
        http_code: None,
    })
}

/// Pull the single sensor row for `sensor_id` from the table endpoint.
pub async fn fetch_sensor_row(
    endpoint: &str,
    username: &str,
    passhash: &str,
    sensor_id: &str,
    verify_tls: bool,
    timeout: Duration,
) -> Result<Map<String, Value>, PrtgError> {
    let query = [
        ("content", "sensors"),
        ("columns", SENSOR_COLUMNS),
        ("filter_objid", sensor_id),
        ("username", username),
        ("passhash", passhash),
    ];

    let url = format!("{}/api/table.json", endpoint);
    let body = get_text(&url, &query, verify_tls, timeout).await?;

    let decoded: Value = serde_json::from_str(&body).map_err(|_| PrtgError::Protocol {
        code: 0,
        message: "JSON inválido retornado do PRTG.".to_string(),
    })?;

    decoded
        .get("sensors")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| PrtgError::NotFound("Sensor não encontrado no PRTG.".to_string()))
}
